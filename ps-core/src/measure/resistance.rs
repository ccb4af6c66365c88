//! Resistance measurement
//!
//! Two methods cover eight decades: the voltage-divider procedure
//! (`check_resistor`) for everything above ~10 Ω, and the pulsed-current
//! method (`small_resistor`) below that, where divider noise dominates.
//!
//! # How It Works
//!
//! 1. **Capacitor gate**: after charging through Rl, a discharge path
//!    through Rh must collapse the voltage immediately; anything that
//!    sustains charge against 470 kΩ is not a resistor.
//!
//! 2. **Dual dividers**: the value is computed from both current
//!    directions, each estimate weighted by its ADC resolution (readings
//!    below the bandgap threshold resolve ~4.4x finer and get a 4:1
//!    weight).
//!
//! 3. **Reverse reconciliation**: resistors are symmetric, so the opposite
//!    scan direction must confirm the value inside a magnitude-dependent
//!    tolerance band before the pair is trusted.

use tracing::{debug, trace};

use crate::classify::outcome::Resistor;
use crate::classify::session::ClassificationSession;
use crate::constants::{network, res};
use crate::hw::frontend::{AnalogFrontend, PinLevel, PullClass, PullDir};
use crate::hw::probe::ProbeId;
use crate::instrument::{DischargeStatus, Instrument};
use crate::scale::{cmp_scaled, ScaledValue};

use std::cmp::Ordering;

/// Outcome of the divider-based value computation
enum DividerValue {
    /// No resistor for this pair/direction
    NotResistive,
    /// Plausible coarse value
    Computed(ScaledValue),
    /// Divider model broke down on a very low resistance; remeasure with
    /// the pulsed method (explicit flag, not a sentinel value)
    NeedsSmallRemeasure,
}

/// Weight of a divider estimate: readings below the bandgap threshold have
/// ~1.1 mV/count resolution instead of ~4.9 mV and count four times
fn estimate_weight(reading_mv: u16) -> u64 {
    if reading_mv < crate::constants::adc::BANDGAP_THRESHOLD_MV {
        res::FINE_WEIGHT
    } else {
        1
    }
}

impl<F: AnalogFrontend> Instrument<F> {
    /// Probe one pair/direction for a resistor and reconcile it into the
    /// session's candidate list.
    ///
    /// Called once per each of the six ordered probe pairs; both directions
    /// of a pair must agree before a resistor is trusted.
    pub fn check_resistor(
        &mut self,
        session: &mut ClassificationSession,
        p_high: ProbeId,
        p_low: ProbeId,
    ) {
        // Phase A: p_low sinks directly, p_high sources through its pulls.
        self.net.set_direct_drive(p_low, PinLevel::Low);
        self.net.set_pull_resistor(p_high, PullClass::Low, PullDir::Up);
        let u_rl_h = self.read_probe_settled_major(p_high, false);
        let u_ri_l = self.read_probe(p_low, false);

        // Capacitor gate: discharge through Rh must collapse the voltage.
        self.net.set_pull_resistor(p_high, PullClass::High, PullDir::Down);
        let u_gate = self.read_probe_settled_major(p_high, false);
        if u_gate > res::CAP_DISCHARGE_MAX_MV {
            trace!(high = %p_high, low = %p_low, u_gate, "holds charge, not resistive");
            self.net.idle_all();
            return;
        }

        self.net.set_pull_resistor(p_high, PullClass::High, PullDir::Up);
        let u_rh_h = self.read_probe_settled_minor(p_high, false);

        // Phase B: reverse the supply assignment; p_low sources directly,
        // p_high sinks through its pulls.
        self.net.set_pull_resistor(p_high, PullClass::High, PullDir::Off);
        self.net.set_direct_drive(p_low, PinLevel::High);
        self.net.set_pull_resistor(p_high, PullClass::Low, PullDir::Down);
        let u_rl_l = self.read_probe_settled_major(p_high, false);
        let u_ri_h = self.read_probe(p_low, false);

        self.net.set_pull_resistor(p_high, PullClass::High, PullDir::Down);
        let u_rh_l = self.read_probe_settled_major(p_high, false);

        self.net.idle_all();

        trace!(
            high = %p_high, low = %p_low,
            u_rl_h, u_ri_l, u_rh_h, u_rl_l, u_ri_h, u_rh_l,
            "divider readings"
        );

        // Magnitude routing: the pair must look ohmic from at least one
        // divider and must not be open on the Rh divider.
        let in_range = (u_rl_h >= res::RL_HIGH_MIN_MV || u_rh_h <= res::RH_HIGH_MAX_MV)
            && u_rh_h < res::RH_OPEN_MV;
        if !in_range {
            return;
        }

        let value = if u_rl_l < res::RL_LOW_ROUTE_MV {
            self.compute_rh_value(u_rh_h, u_rh_l)
        } else {
            self.compute_rl_value(u_rl_h, u_ri_l, u_rl_l, u_ri_h)
        };

        let (coarse, needs_small) = match value {
            DividerValue::NotResistive => return,
            DividerValue::Computed(v) => (v, false),
            // Keep the original coarse fallback of 0.1 Ω for the
            // acceptance band when the divider model collapsed.
            DividerValue::NeedsSmallRemeasure => (ScaledValue::new(1, -1), true),
        };

        let mut final_value = coarse;
        let is_small =
            cmp_scaled(coarse.magnitude, coarse.exponent, res::SMALL_LIMIT_01, -1) == Ordering::Less;
        if (needs_small || is_small) && self.discharge == DischargeStatus::Ok {
            let small_001 = self.small_resistor(p_high, p_low, true);
            // The pulsed method is only trusted near the coarse estimate;
            // outside a 100% band it measured the wrong magnitude.
            let coarse_001 = coarse.to_u64_at(-2).unwrap_or(u64::MAX);
            if (small_001 as u64) <= 2 * coarse_001 {
                final_value = ScaledValue::new(small_001, -2);
            }
        }

        self.reconcile_resistor(session, p_high, p_low, final_value);
    }

    /// Rh-based value for large resistances (≳ 19.5 kΩ), ohm-scale
    fn compute_rh_value(&self, u_rh_h: u16, u_rh_l: u16) -> DividerValue {
        let vcc = self.adc.vcc_mv() as u64;
        let rh = network::RH_OHMS as u64;

        // Pulled up: Vcc - Rh - DUT - ground.
        let r1 = rh * u_rh_h as u64 / (vcc - u_rh_h as u64);
        let w1 = estimate_weight(u_rh_h);

        let ohms = if u_rh_l == 0 {
            r1
        } else {
            // Pulled down: Vcc - DUT - Rh - ground.
            let r2 = rh * (vcc - u_rh_l as u64) / u_rh_l as u64;
            let w2 = estimate_weight(u_rh_l);
            (r1 * w1 + r2 * w2) / (w1 + w2)
        };

        let ohms = ohms + res::RH_OFFSET_OHMS;
        DividerValue::Computed(ScaledValue::from_u64(ohms * 10, -1))
    }

    /// Rl-based value for mid and low resistances, 0.1 Ω scale
    fn compute_rl_value(&self, u_rl_h: u16, u_ri_l: u16, u_rl_l: u16, u_ri_h: u16) -> DividerValue {
        let vcc = self.adc.vcc_mv() as u64;

        // A divider only makes sense with monotonic readings; a very low
        // resistance collapses the model entirely.
        if u_rl_h < u_ri_l || u_ri_h < u_rl_l {
            if u_rl_l > res::SMALL_FALLBACK_MV {
                return DividerValue::NeedsSmallRemeasure;
            }
            return DividerValue::NotResistive;
        }

        let rl_ri_high = (network::RL_01 + self.cal.ri_high as u32) as u64;
        let rl_ri_low = (network::RL_01 + self.cal.ri_low as u32) as u64;

        // Pulled up: Vcc - RiH - Rl - DUT - RiL - ground.
        let u1 = (u_rl_h as u64).min(vcc - 1); // avoid dividing by zero at the rail
        let r1 = (u1 - u_ri_l as u64) * rl_ri_high / (vcc - u1);
        let w1 = estimate_weight(u_rl_h);

        let r01 = if u_rl_l == 0 {
            r1
        } else {
            // Pulled down: Vcc - driver - DUT - Rl - RiL - ground.
            let r2 = (u_ri_h as u64 - u_rl_l as u64) * rl_ri_low / u_rl_l as u64;
            let w2 = estimate_weight(u_rl_l);
            (r1 * w1 + r2 * w2) / (w1 + w2)
        };

        DividerValue::Computed(ScaledValue::from_u64(r01, -1))
    }

    /// Merge a directional measurement with the opposite direction.
    ///
    /// A confirming value inside the tolerance band is not recorded twice;
    /// a mismatch is ambiguous evidence and is discarded rather than stored
    /// as a second resistor on the same pins.
    fn reconcile_resistor(
        &mut self,
        session: &mut ClassificationSession,
        p_high: ProbeId,
        p_low: ProbeId,
        value: ScaledValue,
    ) {
        if let Some(existing) = session.find_resistor(p_high, p_low) {
            let tol_pct = tolerance_pct(&existing.value);
            let within = within_tolerance(&existing.value, &value, tol_pct);
            if within {
                trace!(high = %p_high, low = %p_low, "reverse direction confirms resistor");
            } else {
                debug!(
                    high = %p_high, low = %p_low,
                    existing = existing.value.magnitude, new = value.magnitude,
                    "directional mismatch, discarding"
                );
            }
            return;
        }

        debug!(high = %p_high, low = %p_low, magnitude = value.magnitude, exponent = value.exponent, "resistor found");
        session.push_resistor(Resistor {
            pin_a: p_high,
            pin_b: p_low,
            value,
        });
    }

    /// Pulsed-current measurement for resistances below ~10 Ω, in 0.01 Ω
    /// units.
    ///
    /// Drives 100 short current pulses through Rl and accumulates
    /// bandgap-referenced samples on both sides of the DUT, then applies
    /// Ohm's law with the calibrated driver resistance. Returns 0 without
    /// driving anything when the probes were not safely discharged.
    pub fn small_resistor(&mut self, p_high: ProbeId, p_low: ProbeId, auto_zero: bool) -> u32 {
        if self.discharge != DischargeStatus::Ok {
            return 0;
        }

        self.net.set_direct_drive(p_low, PinLevel::Low);
        let chan_high = self.net.adc_channel(p_high);
        let chan_low = self.net.adc_channel(p_low);

        let mut acc = [0u64; 2];
        for (i, chan) in [chan_high, chan_low].into_iter().enumerate() {
            // Reference settling: burn one bandgap conversion first.
            let _ = self.net.fe().read_adc(chan, true);
            for _ in 0..res::SMALL_PULSES {
                self.net.set_pull_resistor(p_high, PullClass::Low, PullDir::Up);
                self.net.fe().delay_us(res::SMALL_PULSE_US);
                acc[i] += self.net.fe().read_adc(chan, true) as u64;
                self.net.set_pull_resistor(p_high, PullClass::Low, PullDir::Off);
                self.net.fe().pet_watchdog();
            }
        }
        self.net.idle_all();
        self.adc.mark_bandgap_used();

        let scale = crate::constants::adc::FULL_SCALE as u64 * res::SMALL_PULSES as u64;
        let bandgap = self.adc.bandgap_mv() as u64;
        let u_high = acc[0] * bandgap / scale;
        let u_low = acc[1] * bandgap / scale;
        let vcc = self.adc.vcc_mv() as u64;
        trace!(u_high, u_low, "pulsed readings");

        if u_high <= u_low || u_high >= vcc {
            return 0;
        }

        // I = (Vcc - U_high) / (Rl + RiH), R = (U_high - U_low) / I.
        let rl_ri = (network::RL_001 + self.cal.ri_high as u32 * 10) as u64;
        let mut r_001 = (u_high - u_low) * rl_ri / (vcc - u_high);

        if auto_zero {
            let zero = self.cal.r_zero as u64;
            r_001 = r_001.saturating_sub(zero);
        }

        r_001.min(u32::MAX as u64) as u32
    }

    /// Verify that exactly one resistor sits across the given pair.
    ///
    /// Resets the candidate list, scans the pair once, and checks the
    /// optional upper limit in kilohm. Self calibration uses this to
    /// confirm expected fixed resistances.
    pub fn check_single_resistor(
        &mut self,
        session: &mut ClassificationSession,
        p_high: ProbeId,
        p_low: ProbeId,
        max_kohm: u32,
    ) -> bool {
        session.resistors.clear();
        self.net.idle_all();
        self.check_resistor(session, p_high, p_low);

        if session.resistors.len() != 1 {
            return false;
        }
        if max_kohm > 0 {
            let v = &session.resistors[0].value;
            if cmp_scaled(v.magnitude, v.exponent, max_kohm, 3) == Ordering::Greater {
                return false;
            }
        }
        true
    }
}

/// Tolerance (percent) for reverse-direction reconciliation, widening as
/// absolute noise starts to dominate the value
fn tolerance_pct(value: &ScaledValue) -> u64 {
    if cmp_scaled(value.magnitude, value.exponent, 2, 0) != Ordering::Less {
        res::TOL_NORMAL_PCT
    } else if cmp_scaled(value.magnitude, value.exponent, 1, -1) != Ordering::Less {
        res::TOL_LOW_PCT
    } else {
        res::TOL_TINY_PCT
    }
}

/// Relative-band check at a common exponent
fn within_tolerance(reference: &ScaledValue, candidate: &ScaledValue, pct: u64) -> bool {
    let e = reference.exponent.min(candidate.exponent);
    let (Some(a), Some(b)) = (reference.to_u64_at(e), candidate.to_u64_at(e)) else {
        return false;
    };
    let diff = a.abs_diff(b);
    diff.checked_mul(100).map(|d| d <= pct * a).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tolerance_bands() {
        // >= 2 Ω: 5%
        assert_eq!(tolerance_pct(&ScaledValue::new(1000, -1)), 5);
        assert_eq!(tolerance_pct(&ScaledValue::new(20, -1)), 5);
        // < 2 Ω: 50%
        assert_eq!(tolerance_pct(&ScaledValue::new(19, -1)), 50);
        assert_eq!(tolerance_pct(&ScaledValue::new(15, -2)), 50);
        // < 0.1 Ω: 500%
        assert_eq!(tolerance_pct(&ScaledValue::new(9, -2)), 500);
    }

    #[test]
    fn test_within_tolerance_mixed_exponents() {
        // 100 Ω vs 104 Ω at 5%
        let a = ScaledValue::new(1000, -1);
        let b = ScaledValue::new(10_400, -2);
        assert!(within_tolerance(&a, &b, 5));

        // 100 Ω vs 106 Ω at 5%
        let c = ScaledValue::new(10_600, -2);
        assert!(!within_tolerance(&a, &c, 5));

        // near-zero band accepts up to 6x
        let tiny = ScaledValue::new(2, -2);
        assert!(within_tolerance(&tiny, &ScaledValue::new(11, -2), 500));
        assert!(!within_tolerance(&tiny, &ScaledValue::new(13, -2), 500));
    }

    #[test]
    fn test_estimate_weight() {
        assert_eq!(estimate_weight(989), res::FINE_WEIGHT);
        assert_eq!(estimate_weight(990), 1);
        assert_eq!(estimate_weight(4700), 1);
    }
}
