//! Cycle report and presentation-selection logic
//!
//! The report is the immutable result of one cycle. The selection rules in
//! here (diode pairing, series-resistor exclusion, gain-dependent forward
//! voltage) are genuinely part of classification - they choose WHAT to
//! present; the sink only renders it.

use serde::{Deserialize, Serialize};

use crate::classify::outcome::{
    BjtCandidate, Capacitor, ComponentType, Diode, FetCandidate, Resistor, SemiKind,
    ThyristorCandidate,
};
use crate::classify::session::ClassificationSession;
use crate::constants::tran;
use crate::display::{DisplaySink, Unit};
use crate::error::Result;
use crate::hw::probe::ProbeId;
use crate::scale::ScaledValue;

/// Everything one classification cycle produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub outcome: ComponentType,
    pub resistors: Vec<Resistor>,
    pub diodes: Vec<Diode>,
    pub capacitor: Option<Capacitor>,
    pub bjt: Option<BjtCandidate>,
    pub fet: Option<FetCandidate>,
    pub thyristor: Option<ThyristorCandidate>,
    pub diodes_in_series: bool,
    /// Set by the all-probes-shorted gesture: the runner should enter the
    /// menu instead of displaying a component
    pub menu_requested: bool,
}

impl CycleReport {
    pub(crate) fn from_session(session: ClassificationSession, menu_requested: bool) -> Self {
        let capacitor = session.best_capacitor().copied();
        Self {
            outcome: session.outcome,
            resistors: session.resistors,
            diodes: session.diodes,
            capacitor,
            bjt: session.bjt,
            fet: session.fet,
            thyristor: session.thyristor,
            diodes_in_series: session.diodes_in_series,
            menu_requested,
        }
    }

    /// Diagnostic JSON dump of the full report
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Consecutive-cycle counters driven by the report renderer
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleStats {
    pub passed: u32,
    pub missed: u32,
}

/// Relationship of exactly two discovered diodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiodePairing {
    CommonAnode(ProbeId),
    CommonCathode(ProbeId),
    /// A1==C2 and C1==A2: both directions conduct, so capacitance across
    /// the pair is meaningless and its display is suppressed
    AntiParallel,
    Unrelated,
}

/// Classify the pairing of exactly two diodes; None for other counts
pub fn diode_pairing(diodes: &[Diode]) -> Option<DiodePairing> {
    if diodes.len() != 2 {
        return None;
    }
    let (a, b) = (&diodes[0], &diodes[1]);
    Some(if a.anode == b.cathode && a.cathode == b.anode {
        DiodePairing::AntiParallel
    } else if a.anode == b.anode {
        DiodePairing::CommonAnode(a.anode)
    } else if a.cathode == b.cathode {
        DiodePairing::CommonCathode(a.cathode)
    } else {
        DiodePairing::Unrelated
    })
}

/// Find the series chain among three diodes: the first ordered pair (i, j)
/// with `cathode(i) == anode(j)`, scanned i outer then j inner. The third
/// "diode" spanning the chain is the measurement artifact.
pub fn find_series_pair(diodes: &[Diode]) -> Option<(usize, usize)> {
    for i in 0..diodes.len() {
        for j in 0..diodes.len() {
            if i == j {
                continue;
            }
            if diodes[i].cathode == diodes[j].anode {
                return Some((i, j));
            }
        }
    }
    None
}

/// Three resistors can only be two real ones plus their series sum read
/// across the outer pins. The largest value is the artifact; the common
/// pin of the remaining two identifies the junction point. Returns the
/// excluded index and the common pin.
pub fn series_exclusion(resistors: &[Resistor]) -> Option<(usize, ProbeId)> {
    if resistors.len() != 3 {
        return None;
    }
    let mut largest = 0;
    for i in 1..3 {
        if resistors[i].value > resistors[largest].value {
            largest = i;
        }
    }
    let kept: Vec<&Resistor> = resistors
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != largest)
        .map(|(_, r)| r)
        .collect();
    let common = kept[0].common_pin(kept[1])?;
    Some((largest, common))
}

/// Forward voltage to display for a bipolar part.
///
/// The two test currents sit three decades apart, so `slope` is the Vf
/// change per decade. Which point to report depends on the base current a
/// real circuit would use, which correlates with the gain class: power
/// parts (hFE < 100) run near the high test current, signal parts
/// interpolate one decade down, small-signal parts one decade up from the
/// low test current.
pub fn bjt_display_vf(hfe: u32, vf_high_mv: u16, vf_low_mv: u16) -> u16 {
    let slope = vf_high_mv.saturating_sub(vf_low_mv) / tran::VF_DECADE_SPAN;
    if hfe < tran::HFE_POWER_MAX {
        vf_high_mv
    } else if hfe < tran::HFE_SIGNAL_MAX {
        vf_high_mv - slope
    } else {
        vf_low_mv + slope
    }
}

/// Render a cycle report and update the consecutive counters.
///
/// A recognized component bumps `passed` and clears `missed`; a cycle with
/// nothing recognizable does the opposite.
pub fn render_report(report: &CycleReport, sink: &mut dyn DisplaySink, stats: &mut CycleStats) {
    match report.outcome {
        ComponentType::None => {
            stats.missed += 1;
            stats.passed = 0;
            sink.show_text("No component found\n");
            return;
        }
        ComponentType::Error => {
            stats.missed += 1;
            stats.passed = 0;
            sink.show_text("Probes not discharged!\n");
            return;
        }
        _ => {
            stats.passed += 1;
            stats.missed = 0;
        }
    }

    match report.outcome {
        ComponentType::Resistor => render_resistors(report, sink),
        ComponentType::Diode => render_diodes(report, sink),
        ComponentType::Bjt => render_bjt(report, sink),
        ComponentType::Fet => render_fet(report, sink),
        ComponentType::Thyristor | ComponentType::Triac => render_thyristor(report, sink),
        ComponentType::Capacitor => render_capacitor(report, sink),
        ComponentType::ShortedSupply => sink.show_text("Probes shorted\n"),
        ComponentType::None | ComponentType::Error => unreachable!(),
    }
}

fn show_pins(sink: &mut dyn DisplaySink, a: ProbeId, b: ProbeId) {
    sink.show_pin(a);
    sink.show_text("-");
    sink.show_pin(b);
}

fn render_resistors(report: &CycleReport, sink: &mut dyn DisplaySink) {
    sink.show_text("Resistor\n");

    if let Some((excluded, common)) = series_exclusion(&report.resistors) {
        // Two real resistors joined at the common pin; the third reading
        // was their series sum.
        for (i, r) in report.resistors.iter().enumerate() {
            if i == excluded {
                continue;
            }
            show_pins(sink, r.pin_a, r.pin_b);
            sink.show_text(" ");
            sink.show_value(r.value, Unit::Ohm);
            sink.show_text("\n");
        }
        sink.show_text("common pin ");
        sink.show_pin(common);
        sink.show_text("\n");
        return;
    }

    for r in &report.resistors {
        show_pins(sink, r.pin_a, r.pin_b);
        sink.show_text(" ");
        sink.show_value(r.value, Unit::Ohm);
        sink.show_text("\n");
    }
}

fn render_diodes(report: &CycleReport, sink: &mut dyn DisplaySink) {
    if report.diodes_in_series {
        render_series_diodes(report, sink);
        return;
    }

    match report.diodes.len() {
        1 => {
            let d = &report.diodes[0];
            sink.show_text("Diode  A=");
            sink.show_pin(d.anode);
            sink.show_text(" C=");
            sink.show_pin(d.cathode);
            sink.show_text("\nVf=");
            sink.show_value(ScaledValue::new(d.vf_high_mv as u32, -3), Unit::Volt);
            sink.show_text("\n");
            show_junction_capacitance(report, sink);
        }
        2 => {
            let pairing = diode_pairing(&report.diodes);
            match pairing {
                Some(DiodePairing::AntiParallel) => {
                    sink.show_text("2 diodes anti-parallel\n");
                }
                Some(DiodePairing::CommonAnode(pin)) => {
                    sink.show_text("2 diodes, common anode ");
                    sink.show_pin(pin);
                    sink.show_text("\n");
                }
                Some(DiodePairing::CommonCathode(pin)) => {
                    sink.show_text("2 diodes, common cathode ");
                    sink.show_pin(pin);
                    sink.show_text("\n");
                }
                _ => sink.show_text("2 diodes\n"),
            }
            for d in &report.diodes {
                sink.show_text("A=");
                sink.show_pin(d.anode);
                sink.show_text(" C=");
                sink.show_pin(d.cathode);
                sink.show_text(" Vf=");
                sink.show_value(ScaledValue::new(d.vf_high_mv as u32, -3), Unit::Volt);
                sink.show_text("\n");
            }
            if !matches!(pairing, Some(DiodePairing::AntiParallel)) {
                show_junction_capacitance(report, sink);
            }
        }
        _ => sink.show_text("3 diodes\n"),
    }
}

fn render_series_diodes(report: &CycleReport, sink: &mut dyn DisplaySink) {
    let Some((i, j)) = find_series_pair(&report.diodes) else {
        sink.show_text("3 diodes\n");
        return;
    };
    sink.show_text("2 diodes in series\n");
    for d in [&report.diodes[i], &report.diodes[j]] {
        sink.show_text("A=");
        sink.show_pin(d.anode);
        sink.show_text(" C=");
        sink.show_pin(d.cathode);
        sink.show_text(" Vf=");
        sink.show_value(ScaledValue::new(d.vf_high_mv as u32, -3), Unit::Volt);
        sink.show_text("\n");
    }
}

fn show_junction_capacitance(report: &CycleReport, sink: &mut dyn DisplaySink) {
    if let Some(c) = &report.capacitor {
        sink.show_text("Cj=");
        sink.show_value(c.value, Unit::Farad);
        sink.show_text("\n");
    }
}

fn render_bjt(report: &CycleReport, sink: &mut dyn DisplaySink) {
    let Some(bjt) = &report.bjt else {
        sink.show_text("Transistor?\n");
        return;
    };

    sink.show_text(bjt.kind.label());
    sink.show_text("  B=");
    sink.show_pin(bjt.base);
    sink.show_text(" C=");
    sink.show_pin(bjt.collector);
    sink.show_text(" E=");
    sink.show_pin(bjt.emitter);
    sink.show_text(&format!("\nhFE={}\n", bjt.hfe));

    // The base-emitter junction was collected by the diode scan; report
    // its forward voltage at the gain-matched test point.
    let be = report.diodes.iter().find(|d| match bjt.kind {
        SemiKind::Npn => d.anode == bjt.base && d.cathode == bjt.emitter,
        _ => d.anode == bjt.emitter && d.cathode == bjt.base,
    });
    if let Some(d) = be {
        let vf = bjt_display_vf(bjt.hfe, d.vf_high_mv, d.vf_low_mv);
        sink.show_text("Vbe=");
        sink.show_value(ScaledValue::new(vf as u32, -3), Unit::Volt);
        sink.show_text("\n");
    }

    // Power parts often carry a collector-emitter freewheel diode.
    let protection = report.diodes.iter().find(|d| match bjt.kind {
        SemiKind::Npn => d.anode == bjt.emitter && d.cathode == bjt.collector,
        _ => d.anode == bjt.collector && d.cathode == bjt.emitter,
    });
    if protection.is_some() {
        sink.show_text("protection diode C-E\n");
    }
}

fn render_fet(report: &CycleReport, sink: &mut dyn DisplaySink) {
    let Some(fet) = &report.fet else {
        sink.show_text("FET?\n");
        return;
    };

    sink.show_text(fet.kind.label());
    sink.show_text("  G=");
    sink.show_pin(fet.gate);
    sink.show_text(" D=");
    sink.show_pin(fet.drain);
    sink.show_text(" S=");
    sink.show_pin(fet.source);
    sink.show_text("\nVth=");
    sink.show_value(ScaledValue::new(fet.vth_mv as u32, -3), Unit::Volt);
    sink.show_text("\n");
}

fn render_thyristor(report: &CycleReport, sink: &mut dyn DisplaySink) {
    let Some(t) = &report.thyristor else {
        sink.show_text("Thyristor?\n");
        return;
    };

    if t.bidirectional {
        sink.show_text("Triac  G=");
    } else {
        sink.show_text("Thyristor  G=");
    }
    sink.show_pin(t.gate);
    sink.show_text(" A=");
    sink.show_pin(t.anode);
    sink.show_text(" C=");
    sink.show_pin(t.cathode);
    sink.show_text("\n");
}

fn render_capacitor(report: &CycleReport, sink: &mut dyn DisplaySink) {
    let Some(c) = &report.capacitor else {
        sink.show_text("Capacitor?\n");
        return;
    };
    sink.show_text("Capacitor\n");
    show_pins(sink, c.pin_a, c.pin_b);
    sink.show_text(" ");
    sink.show_value(c.value, Unit::Farad);
    sink.show_text("\n");
}
