//! Capacitance measurement
//!
//! RC charge timing against the 63.2% point of the supply, so the elapsed
//! time equals R x C directly and the conversion stays in integer
//! arithmetic. Auto-ranges between the Rh path (tens of picofarads to
//! about 2 µF) and the Rl path (microfarads to about a millifarad); the
//! calibrated stray-capacitance offset is subtracted from the result.

use tracing::{debug, trace};

use crate::classify::outcome::Capacitor;
use crate::classify::session::ClassificationSession;
use crate::constants::{adc, cap, network, timing};
use crate::hw::frontend::{AnalogFrontend, PinLevel, PullClass, PullDir};
use crate::hw::probe::ProbeId;
use crate::instrument::{DischargeStatus, Instrument};
use crate::scale::ScaledValue;

/// Charge timing result for one path
pub(crate) enum ChargeTiming {
    /// Target reached after this many microseconds
    Reached(u64),
    /// Budget exhausted; the capacitance is too large for this path
    TimedOut,
}

impl<F: AnalogFrontend> Instrument<F> {
    /// Measure the capacitance across one probe pair and write it to the
    /// pair's session slot.
    ///
    /// Does nothing when the probes were not safely discharged or when the
    /// pair holds no measurable capacitance.
    pub fn measure_capacitance(
        &mut self,
        session: &mut ClassificationSession,
        p_high: ProbeId,
        p_low: ProbeId,
    ) {
        if self.discharge != DischargeStatus::Ok {
            return;
        }

        // Fine path first: Rh charge timing covers picofarads to ~2 µF.
        let pf = match self.time_charge(p_high, p_low, PullClass::High) {
            Some(ChargeTiming::Reached(t_us)) => {
                let r = (network::RH_OHMS + self.cal.ri_high as u32 / 10) as u64;
                t_us * 1_000_000 / r
            }
            Some(ChargeTiming::TimedOut) => {
                // Too big for Rh; retime through Rl.
                match self.time_charge(p_high, p_low, PullClass::Low) {
                    Some(ChargeTiming::Reached(t_us)) => {
                        let r = (network::RL_OHMS + self.cal.ri_high as u32 / 10) as u64;
                        t_us * 1_000_000 / r
                    }
                    _ => {
                        debug!(high = %p_high, low = %p_low, "capacitance beyond range");
                        return;
                    }
                }
            }
            None => return,
        };

        // Stray capacitance of leads and PCB, measured by self calibration.
        let pf = pf.saturating_sub(self.cal.cap_zero as u64);
        if pf == 0 {
            return;
        }

        debug!(high = %p_high, low = %p_low, pf, "capacitance measured");
        session.set_capacitor(Capacitor {
            pin_a: p_high.min(p_low),
            pin_b: p_high.max(p_low),
            value: ScaledValue::from_u64(pf, -12),
        });
    }

    /// Discharge the pair, then count ticks charging through the given
    /// pull class until the 63.2% point. Returns None when the pair cannot
    /// be discharged (an externally biased or leaky DUT).
    pub(crate) fn time_charge(
        &mut self,
        p_high: ProbeId,
        p_low: ProbeId,
        class: PullClass,
    ) -> Option<ChargeTiming> {
        if !self.discharge_pair(p_high, p_low) {
            return None;
        }

        let channel = self.net.adc_channel(p_high);
        let target_counts =
            (cap::CHARGE_TARGET_MV as u32 * adc::FULL_SCALE / self.adc.vcc_mv() as u32) as u16;

        self.net.set_direct_drive(p_low, PinLevel::Low);
        self.net.set_pull_resistor(p_high, class, PullDir::Up);

        let mut result = ChargeTiming::TimedOut;
        for tick in 1..=cap::FINE_MAX_TICKS {
            self.net.fe().delay_us(cap::FINE_TICK_US);
            let raw = self.net.fe().read_adc(channel, false);
            if raw >= target_counts {
                let t_us = tick as u64 * cap::FINE_TICK_US as u64;
                trace!(?class, tick, "charge target reached");
                result = ChargeTiming::Reached(t_us);
                break;
            }
            self.net.fe().pet_watchdog();
        }

        self.net.idle_all();
        Some(result)
    }

    /// Drain the pair through Rl until the probe reads empty
    pub(crate) fn discharge_pair(&mut self, p_high: ProbeId, p_low: ProbeId) -> bool {
        self.net.set_direct_drive(p_low, PinLevel::Low);
        self.net.set_pull_resistor(p_high, PullClass::Low, PullDir::Down);

        let channel = self.net.adc_channel(p_high);
        let mut ok = false;
        for _ in 0..(cap::DRAIN_MAX_POLLS) {
            self.net.fe().delay_us(cap::DRAIN_POLL_MS * 1000);
            let raw = self.net.fe().read_adc(channel, false);
            let mv = (raw as u32 * self.adc.vcc_mv() as u32 / adc::FULL_SCALE) as u16;
            if mv < timing::DISCHARGE_DONE_MV {
                ok = true;
                break;
            }
            self.net.fe().pet_watchdog();
        }

        self.net.idle_all();
        if !ok {
            debug!(high = %p_high, low = %p_low, "pair will not discharge");
        }
        ok
    }
}
