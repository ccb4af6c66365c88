//! Three-terminal semiconductor probing
//!
//! Run once per probe permutation with the third probe as the control
//! terminal. The sequence follows the same baseline / stimulus / response
//! pattern as every other probe routine:
//!
//! 1. **Conduction delta**: the output pair is biased through Rl and the
//!    control terminal is driven; a collector/drain swing above the
//!    threshold means controlled conduction.
//!
//! 2. **Latch test**: if conduction survives removing the control drive
//!    (and an anode-current interruption resets it), the device is a
//!    thyristor; triggering in both polarities upgrades it to a triac.
//!
//! 3. **Gate-current split**: re-driving the control through Rh separates
//!    bipolar parts (measurable base current, hFE from the Rh divider)
//!    from insulated gates (control rail-parked, threshold voltage read
//!    out by discharging the gate).

use tracing::debug;

use crate::classify::outcome::{BjtCandidate, FetCandidate, SemiKind, ThyristorCandidate};
use crate::classify::session::ClassificationSession;
use crate::constants::{network, tran};
use crate::hw::frontend::{AnalogFrontend, PinLevel, PullClass, PullDir};
use crate::hw::probe::ProbeId;
use crate::instrument::Instrument;

impl<F: AnalogFrontend> Instrument<F> {
    /// Probe the permutation for transistor-like behavior in both
    /// polarities and record candidates in the session.
    pub fn check_semiconductors(
        &mut self,
        session: &mut ClassificationSession,
        p_high: ProbeId,
        p_low: ProbeId,
        p_third: ProbeId,
    ) {
        self.check_n_type(session, p_high, p_low, p_third);
        self.check_p_type(session, p_high, p_low, p_third);
    }

    /// NPN / N-channel / thyristor orientation: p_high as collector/drain/
    /// anode, p_low as emitter/source/cathode, p_third as base/gate.
    fn check_n_type(
        &mut self,
        session: &mut ClassificationSession,
        p_high: ProbeId,
        p_low: ProbeId,
        p_third: ProbeId,
    ) {
        let vcc = self.adc.vcc_mv();

        // Baseline with the control terminal parked at the off rail; a
        // floating control (charged gate, leaky base) would corrupt it.
        self.net.idle_all();
        self.net.set_direct_drive(p_low, PinLevel::Low);
        self.net.set_pull_resistor(p_high, PullClass::Low, PullDir::Up);
        self.net.set_pull_resistor(p_third, PullClass::High, PullDir::Down);
        let u_off = self.read_probe_settled_major(p_high, false);

        // Conduction with the control held low is either a depletion-mode
        // channel or something two-terminal (resistor, junction). Only a
        // channel responds to the gate moving to the other rail.
        if u_off <= tran::LATCH_HOLD_MAX_MV {
            self.net.set_pull_resistor(p_third, PullClass::High, PullDir::Up);
            let u_gate_hi = self.read_probe_settled_major(p_high, false);
            self.net.idle_all();
            if u_gate_hi.abs_diff(u_off) >= tran::PINCH_DELTA_MV {
                debug!(drain = %p_high, source = %p_low, gate = %p_third, "depletion N-channel");
                // No negative gate supply, so the pinch-off voltage itself
                // is not measurable; the kind still names the structure.
                session.fet = Some(FetCandidate {
                    kind: SemiKind::NJfet,
                    gate: p_third,
                    drain: p_high,
                    source: p_low,
                    vth_mv: 0,
                });
            }
            return;
        }

        // Stimulate the control terminal through Rl.
        self.net.set_pull_resistor(p_third, PullClass::Low, PullDir::Up);
        let u_on = self.read_probe_settled_major(p_high, false);

        if u_off.saturating_sub(u_on) < tran::COLLECTOR_SWING_MIN_MV {
            self.net.idle_all();
            return;
        }

        // Latch test: remove the control drive and actively drain the
        // control terminal through Rh, else a charged MOSFET gate keeps
        // the channel on and fakes a latch. A real thyristor holds via its
        // anode current with the gate grounded through 470 kΩ.
        self.net.set_pull_resistor(p_third, PullClass::High, PullDir::Down);
        let u_latch = self.read_probe_settled_major(p_high, false);
        if u_latch <= tran::LATCH_HOLD_MAX_MV {
            // Interrupt the anode current; a real thyristor must drop out.
            self.net.set_pull_resistor(p_high, PullClass::Low, PullDir::Off);
            self.net.fe().delay_us(crate::constants::adc::SETTLE_MINOR_MS * 1000);
            self.net.set_pull_resistor(p_high, PullClass::Low, PullDir::Up);
            let u_recover = self.read_probe_settled_minor(p_high, false);
            self.net.idle_all();

            if u_recover > tran::LATCH_HOLD_MAX_MV {
                debug!(gate = %p_third, anode = %p_high, cathode = %p_low, "thyristor latch");
                record_thyristor(session, p_third, p_high, p_low);
            }
            return;
        }

        // BJT vs insulated gate: re-drive the control through Rh.
        self.net.set_pull_resistor(p_third, PullClass::High, PullDir::Up);
        let u_on2 = self.read_probe_settled_major(p_high, false);
        let u_ctrl = self.read_probe(p_third, false);

        if u_off.saturating_sub(u_on2) < tran::RH_DRIVE_SWING_MIN_MV {
            // Conducts with a 7 mA base drive but not with 10 µA: outside
            // any gain this tester can resolve; leave it unrecorded.
            self.net.idle_all();
            return;
        }

        if u_ctrl >= vcc - tran::GATE_LEAK_MAX_MV {
            // Gate parked at the rail: no control current flows.
            let vth = self.gate_threshold_n(p_high, p_low, p_third);
            self.net.idle_all();
            debug!(gate = %p_third, drain = %p_high, source = %p_low, vth, "N-channel enhancement FET");
            session.fet = Some(FetCandidate {
                kind: SemiKind::NMosEnhancement,
                gate: p_third,
                drain: p_high,
                source: p_low,
                vth_mv: vth,
            });
            return;
        }

        self.net.idle_all();

        // hFE from the Rh base divider: Ic = (Vcc - Uc)/Rl, Ib = (Vcc - Ub)/Rh.
        let ic_num = (vcc - u_on2) as u64 * network::RH_OHMS as u64;
        let ib_num = ((vcc - u_ctrl) as u64 * network::RL_OHMS as u64).max(1);
        let hfe = (ic_num / ib_num) as u32;
        debug!(collector = %p_high, base = %p_third, emitter = %p_low, hfe, "NPN conduction");
        record_bjt(
            session,
            BjtCandidate {
                kind: SemiKind::Npn,
                collector: p_high,
                base: p_third,
                emitter: p_low,
                hfe,
            },
        );
    }

    /// PNP / P-channel orientation: p_high as emitter/source, p_low as
    /// collector/drain, control pulled toward ground.
    fn check_p_type(
        &mut self,
        session: &mut ClassificationSession,
        p_high: ProbeId,
        p_low: ProbeId,
        p_third: ProbeId,
    ) {
        self.net.idle_all();
        self.net.set_direct_drive(p_high, PinLevel::High);
        self.net.set_pull_resistor(p_low, PullClass::Low, PullDir::Down);
        self.net.set_pull_resistor(p_third, PullClass::High, PullDir::Up);
        let u_off = self.read_probe_settled_major(p_low, false);

        if u_off > tran::LATCH_HOLD_MAX_MV {
            // Already conducting without control drive; the depletion case
            // is handled in the N-type orientation.
            self.net.idle_all();
            return;
        }

        self.net.set_pull_resistor(p_third, PullClass::Low, PullDir::Down);
        let u_on = self.read_probe_settled_major(p_low, false);

        if u_on.saturating_sub(u_off) < tran::COLLECTOR_SWING_MIN_MV {
            self.net.idle_all();
            return;
        }

        // Gate-current split through Rh toward ground.
        self.net.set_pull_resistor(p_third, PullClass::High, PullDir::Down);
        let u_on2 = self.read_probe_settled_major(p_low, false);
        let u_ctrl = self.read_probe(p_third, false);

        if u_on2.saturating_sub(u_off) < tran::RH_DRIVE_SWING_MIN_MV {
            self.net.idle_all();
            return;
        }

        if u_ctrl <= tran::GATE_LEAK_MAX_MV {
            let vth = self.gate_threshold_p(p_high, p_low, p_third);
            self.net.idle_all();
            debug!(gate = %p_third, drain = %p_low, source = %p_high, vth, "P-channel enhancement FET");
            session.fet = Some(FetCandidate {
                kind: SemiKind::PMosEnhancement,
                gate: p_third,
                drain: p_low,
                source: p_high,
                vth_mv: vth,
            });
            return;
        }

        self.net.idle_all();

        // Ic = Uc/Rl, Ib = Ub/Rh.
        let ic_num = u_on2 as u64 * network::RH_OHMS as u64;
        let ib_num = (u_ctrl as u64 * network::RL_OHMS as u64).max(1);
        let hfe = (ic_num / ib_num) as u32;
        debug!(collector = %p_low, base = %p_third, emitter = %p_high, hfe, "PNP conduction");
        record_bjt(
            session,
            BjtCandidate {
                kind: SemiKind::Pnp,
                collector: p_low,
                base: p_third,
                emitter: p_high,
                hfe,
            },
        );
    }

    /// Gate threshold of an N-channel enhancement FET: charge the gate,
    /// float it, discharge it through Rh and catch the gate voltage at the
    /// moment the drain releases.
    fn gate_threshold_n(&mut self, p_drain: ProbeId, p_source: ProbeId, p_gate: ProbeId) -> u16 {
        let drain_chan = self.net.adc_channel(p_drain);
        let gate_chan = self.net.adc_channel(p_gate);
        let vcc = self.adc.vcc_mv() as u32;
        let release_counts =
            (tran::VTH_DRAIN_RELEASE_MV as u32 * crate::constants::adc::FULL_SCALE / vcc) as u16;

        self.net.set_direct_drive(p_source, PinLevel::Low);
        self.net.set_pull_resistor(p_drain, PullClass::Low, PullDir::Up);
        self.net.set_pull_resistor(p_gate, PullClass::Low, PullDir::Up);
        self.net.fe().delay_us(crate::constants::adc::SETTLE_MINOR_MS * 1000);

        // Float the gate, then bleed it down through Rh.
        self.net.set_pull_resistor(p_gate, PullClass::High, PullDir::Down);

        let mut vth = 0u16;
        for _ in 0..tran::VTH_MAX_POLLS {
            self.net.fe().delay_us(tran::VTH_POLL_US);
            let drain_raw = self.net.fe().read_adc(drain_chan, false);
            if drain_raw >= release_counts {
                let gate_raw = self.net.fe().read_adc(gate_chan, false) as u32;
                vth = (gate_raw * vcc / crate::constants::adc::FULL_SCALE) as u16;
                break;
            }
            self.net.fe().pet_watchdog();
        }
        vth
    }

    /// P-channel mirror of the threshold readout; reported gate-source
    /// magnitude, bled from ground toward the rail
    fn gate_threshold_p(&mut self, p_source: ProbeId, p_drain: ProbeId, p_gate: ProbeId) -> u16 {
        let drain_chan = self.net.adc_channel(p_drain);
        let gate_chan = self.net.adc_channel(p_gate);
        let vcc = self.adc.vcc_mv() as u32;
        let release_counts =
            ((vcc - tran::VTH_DRAIN_RELEASE_MV as u32) * crate::constants::adc::FULL_SCALE / vcc) as u16;

        self.net.set_direct_drive(p_source, PinLevel::High);
        self.net.set_pull_resistor(p_drain, PullClass::Low, PullDir::Down);
        self.net.set_pull_resistor(p_gate, PullClass::Low, PullDir::Down);
        self.net.fe().delay_us(crate::constants::adc::SETTLE_MINOR_MS * 1000);

        self.net.set_pull_resistor(p_gate, PullClass::High, PullDir::Up);

        let mut vth = 0u16;
        for _ in 0..tran::VTH_MAX_POLLS {
            self.net.fe().delay_us(tran::VTH_POLL_US);
            let drain_raw = self.net.fe().read_adc(drain_chan, false);
            if drain_raw <= release_counts {
                let gate_raw = self.net.fe().read_adc(gate_chan, false) as u32;
                let gate_mv = gate_raw * vcc / crate::constants::adc::FULL_SCALE;
                vth = (vcc - gate_mv) as u16;
                break;
            }
            self.net.fe().pet_watchdog();
        }
        vth
    }
}

/// Keep the strongest bipolar evidence: the correct orientation beats
/// inverse-mode conduction through its higher gain
fn record_bjt(session: &mut ClassificationSession, candidate: BjtCandidate) {
    match &session.bjt {
        Some(existing) if existing.hfe >= candidate.hfe => {}
        _ => session.bjt = Some(candidate),
    }
}

/// Record a latch; a second trigger with anode and cathode swapped marks
/// the device as bidirectional (triac)
fn record_thyristor(
    session: &mut ClassificationSession,
    gate: ProbeId,
    anode: ProbeId,
    cathode: ProbeId,
) {
    if let Some(existing) = &mut session.thyristor {
        if existing.anode == cathode && existing.cathode == anode {
            existing.bidirectional = true;
            return;
        }
    }
    session.thyristor = Some(ThyristorCandidate {
        gate,
        anode,
        cathode,
        bidirectional: false,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::probe::ProbeId;

    fn p(i: u8) -> ProbeId {
        ProbeId::from_index(i)
    }

    #[test]
    fn test_record_bjt_keeps_higher_gain() {
        let mut s = ClassificationSession::new();
        record_bjt(&mut s, BjtCandidate {
            kind: SemiKind::Npn,
            collector: p(0), base: p(2), emitter: p(1),
            hfe: 11,
        });
        // Inverse-mode reading with lower gain must not displace it
        record_bjt(&mut s, BjtCandidate {
            kind: SemiKind::Npn,
            collector: p(1), base: p(2), emitter: p(0),
            hfe: 4,
        });
        assert_eq!(s.bjt.unwrap().hfe, 11);

        record_bjt(&mut s, BjtCandidate {
            kind: SemiKind::Npn,
            collector: p(0), base: p(2), emitter: p(1),
            hfe: 220,
        });
        assert_eq!(s.bjt.unwrap().hfe, 220);
    }

    #[test]
    fn test_swapped_latch_becomes_triac() {
        let mut s = ClassificationSession::new();
        record_thyristor(&mut s, p(2), p(0), p(1));
        assert!(!s.thyristor.unwrap().bidirectional);
        record_thyristor(&mut s, p(2), p(1), p(0));
        let t = s.thyristor.unwrap();
        assert!(t.bidirectional);
        assert_eq!(t.anode, p(0));
    }
}
