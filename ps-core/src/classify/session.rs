//! Per-cycle candidate state
//!
//! One `ClassificationSession` is created at the start of a classification
//! cycle, filled by the six probe-pair scans, and consumed by the decision
//! step. It never outlives the cycle, so partial candidate lists are not
//! observable from outside.

use tracing::debug;

use crate::classify::outcome::{
    BjtCandidate, Capacitor, ComponentType, Diode, FetCandidate, Resistor, ThyristorCandidate,
};
use crate::constants::limits;
use crate::hw::probe::ProbeId;

#[derive(Debug)]
pub struct ClassificationSession {
    pub resistors: Vec<Resistor>,
    pub diodes: Vec<Diode>,
    /// One slot per unordered probe pair, overwritten per measurement call
    pub capacitors: [Option<Capacitor>; 3],
    pub bjt: Option<BjtCandidate>,
    pub fet: Option<FetCandidate>,
    pub thyristor: Option<ThyristorCandidate>,
    pub outcome: ComponentType,
    /// Set when three diodes collapsed into a series pair ("in series" mode)
    pub diodes_in_series: bool,
}

impl ClassificationSession {
    pub fn new() -> Self {
        Self {
            resistors: Vec::with_capacity(limits::MAX_CANDIDATES),
            diodes: Vec::with_capacity(limits::MAX_CANDIDATES),
            capacitors: [None; 3],
            bjt: None,
            fet: None,
            thyristor: None,
            outcome: ComponentType::None,
            diodes_in_series: false,
        }
    }

    /// Clear everything for a fresh cycle
    pub fn reset(&mut self) {
        self.resistors.clear();
        self.diodes.clear();
        self.capacitors = [None; 3];
        self.bjt = None;
        self.fet = None;
        self.thyristor = None;
        self.outcome = ComponentType::None;
        self.diodes_in_series = false;
    }

    /// Record a resistor; silently dropped once the three slots are full
    pub fn push_resistor(&mut self, r: Resistor) {
        if self.resistors.len() >= limits::MAX_CANDIDATES {
            debug!(pin_a = %r.pin_a, pin_b = %r.pin_b, "resistor slots full, dropping");
            return;
        }
        self.resistors.push(r);
    }

    /// Record a diode unless the same directed junction is already known;
    /// silently dropped once the three slots are full
    pub fn push_diode(&mut self, d: Diode) {
        if self
            .diodes
            .iter()
            .any(|k| k.anode == d.anode && k.cathode == d.cathode)
        {
            return;
        }
        if self.diodes.len() >= limits::MAX_CANDIDATES {
            debug!(anode = %d.anode, cathode = %d.cathode, "diode slots full, dropping");
            return;
        }
        self.diodes.push(d);
    }

    /// Resistor already recorded for this unordered pair, if any
    pub fn find_resistor(&self, a: ProbeId, b: ProbeId) -> Option<&Resistor> {
        self.resistors.iter().find(|r| r.same_pair(a, b))
    }

    /// Slot index for an unordered probe pair: (1,2)->0, (1,3)->1, (2,3)->2
    pub fn capacitor_slot(a: ProbeId, b: ProbeId) -> usize {
        a.index() + b.index() - 1
    }

    /// Write a capacitance measurement to its pair's slot (overwrite, not
    /// accumulate: capacitance is measured per explicit pair)
    pub fn set_capacitor(&mut self, cap: Capacitor) {
        let slot = Self::capacitor_slot(cap.pin_a, cap.pin_b);
        self.capacitors[slot] = Some(cap);
    }

    /// Largest measured capacitance, if any
    pub fn best_capacitor(&self) -> Option<&Capacitor> {
        self.capacitors
            .iter()
            .flatten()
            .max_by(|a, b| a.value.cmp(&b.value))
    }
}

impl Default for ClassificationSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scale::ScaledValue;

    fn p(i: u8) -> ProbeId {
        ProbeId::from_index(i)
    }

    fn r(a: u8, b: u8, ohms01: u32) -> Resistor {
        Resistor {
            pin_a: p(a),
            pin_b: p(b),
            value: ScaledValue::new(ohms01, -1),
        }
    }

    #[test]
    fn test_resistor_cap_is_silent() {
        let mut s = ClassificationSession::new();
        s.push_resistor(r(0, 1, 100));
        s.push_resistor(r(0, 2, 200));
        s.push_resistor(r(1, 2, 300));
        s.push_resistor(r(1, 2, 400));
        assert_eq!(s.resistors.len(), 3);
        assert_eq!(s.resistors[2].value.magnitude, 300);
    }

    #[test]
    fn test_diode_dedupe_is_directional() {
        let mut s = ClassificationSession::new();
        let d = Diode { anode: p(0), cathode: p(1), vf_high_mv: 650, vf_low_mv: 500 };
        s.push_diode(d);
        s.push_diode(d);
        assert_eq!(s.diodes.len(), 1);

        // The reverse direction is a distinct junction (anti-parallel pair)
        let rev = Diode { anode: p(1), cathode: p(0), vf_high_mv: 650, vf_low_mv: 500 };
        s.push_diode(rev);
        assert_eq!(s.diodes.len(), 2);
    }

    #[test]
    fn test_capacitor_slots() {
        assert_eq!(ClassificationSession::capacitor_slot(p(0), p(1)), 0);
        assert_eq!(ClassificationSession::capacitor_slot(p(0), p(2)), 1);
        assert_eq!(ClassificationSession::capacitor_slot(p(1), p(2)), 2);
    }
}
