//! Component classification
//!
//! The top-level scan: one cycle discharges the probes, checks for the
//! all-shorted menu gesture, runs every measurement sub-procedure over all
//! six ordered probe pairs, conditionally measures capacitance, and
//! resolves the aggregated evidence into a single component type.
//!
//! No permutation may be skipped - a resistor only drops voltage when
//! current flows in the conducting direction relative to any parallel
//! junction, so full coverage needs all six orderings.

pub(crate) mod outcome;
mod report;
pub(crate) mod session;

pub use outcome::{
    BjtCandidate, Capacitor, ComponentType, Diode, FetCandidate, Resistor, SemiKind,
    ThyristorCandidate,
};
pub use report::{
    bjt_display_vf, diode_pairing, find_series_pair, render_report, series_exclusion,
    CycleReport, CycleStats, DiodePairing,
};
pub use session::ClassificationSession;

use tracing::{debug, info};

use crate::constants::cap;
use crate::hw::frontend::AnalogFrontend;
use crate::hw::probe::ProbeId;
use crate::instrument::{DischargeStatus, Instrument};
use crate::scale::cmp_scaled;

use std::cmp::Ordering;

/// The six ordered (source, sink) probe assignments; the remaining probe
/// acts as the control terminal for the semiconductor tests
pub const SCAN_ORDER: [(u8, u8); 6] = [(0, 1), (1, 0), (0, 2), (2, 0), (1, 2), (2, 1)];

/// Run one full classification cycle: discharge, short gesture, six scans,
/// conditional capacitance probe, decision.
///
/// The cycle is atomic: all candidate state lives in the session created
/// here and nothing is observable until the report is returned.
pub fn run_cycle<F: AnalogFrontend>(inst: &mut Instrument<F>) -> CycleReport {
    let mut session = ClassificationSession::new();

    if let DischargeStatus::Failed { probe, mv } = inst.discharge_probes() {
        info!(probe = %probe, mv, "cycle aborted, probes not discharged");
        session.outcome = ComponentType::Error;
        return CycleReport::from_session(session, false);
    }

    if inst.all_probes_shorted() == 3 {
        debug!("all probes shorted, menu gesture");
        session.outcome = ComponentType::ShortedSupply;
        return CycleReport::from_session(session, true);
    }

    for (hi, lo) in SCAN_ORDER {
        let high = ProbeId::from_index(hi);
        let low = ProbeId::from_index(lo);
        let third = high.third(low);
        inst.check_probes(&mut session, high, low, third);
    }

    // Capacitance only where nothing else claimed the probes: across all
    // pairs when the scan stayed empty, or reverse-biased across a single
    // junction for the junction-capacitance display.
    if scan_found_nothing(&session) {
        for (a, b) in [(0u8, 1u8), (0, 2), (1, 2)] {
            inst.measure_capacitance(
                &mut session,
                ProbeId::from_index(a),
                ProbeId::from_index(b),
            );
        }
    } else if only_plain_diodes(&session) {
        let pairing = diode_pairing(&session.diodes);
        if !matches!(pairing, Some(DiodePairing::AntiParallel)) {
            // Reverse biased, so the junction blocks while its capacitance
            // charges. Anti-parallel pairs conduct both ways - measuring
            // capacitance across them is meaningless.
            let d = session.diodes[0];
            inst.measure_capacitance(&mut session, d.cathode, d.anode);
        }
    }

    decide(&mut session);
    CycleReport::from_session(session, false)
}

impl<F: AnalogFrontend> Instrument<F> {
    /// All detection sub-procedures for one directional probe assignment
    pub fn check_probes(
        &mut self,
        session: &mut ClassificationSession,
        high: ProbeId,
        low: ProbeId,
        third: ProbeId,
    ) {
        debug!(high = %high, low = %low, third = %third, "scanning permutation");
        self.check_resistor(session, high, low);
        self.check_diode(session, high, low);
        self.check_semiconductors(session, high, low, third);
    }
}

fn scan_found_nothing(session: &ClassificationSession) -> bool {
    session.resistors.is_empty()
        && session.diodes.is_empty()
        && session.bjt.is_none()
        && session.fet.is_none()
        && session.thyristor.is_none()
}

fn only_plain_diodes(session: &ClassificationSession) -> bool {
    !session.diodes.is_empty()
        && session.diodes.len() <= 2
        && session.resistors.is_empty()
        && session.bjt.is_none()
        && session.fet.is_none()
        && session.thyristor.is_none()
}

/// Resolve the aggregated evidence into the final component type
fn decide(session: &mut ClassificationSession) {
    if session.outcome != ComponentType::None {
        return;
    }

    session.outcome = if let Some(t) = &session.thyristor {
        if t.bidirectional {
            ComponentType::Triac
        } else {
            ComponentType::Thyristor
        }
    } else if session.bjt.is_some() {
        ComponentType::Bjt
    } else if session.fet.is_some() {
        ComponentType::Fet
    } else if !session.diodes.is_empty() {
        match session.diodes.len() {
            1 | 2 => ComponentType::Diode,
            _ => {
                // Three junctions: two of them in series get mis-read as a
                // third. The first cathode->anode chain marks the pair.
                if find_series_pair(&session.diodes).is_some() {
                    session.diodes_in_series = true;
                    ComponentType::Diode
                } else {
                    ComponentType::Error
                }
            }
        }
    } else if !session.resistors.is_empty() {
        ComponentType::Resistor
    } else if capacitor_reportable(session) {
        ComponentType::Capacitor
    } else {
        ComponentType::None
    };

    info!(outcome = ?session.outcome, "cycle decided");
}

fn capacitor_reportable(session: &ClassificationSession) -> bool {
    session.best_capacitor().is_some_and(|c| {
        cmp_scaled(c.value.magnitude, c.value.exponent, cap::MIN_REPORT_PF, -12)
            != Ordering::Less
    })
}
