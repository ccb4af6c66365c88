//! Classification outcome types and candidate records
//!
//! The candidate lists are bounded at three entries because three probes
//! admit at most three pairwise relationships; a fourth detection is
//! evidence of a scan artifact and is dropped, never stored.

use serde::{Deserialize, Serialize};

use crate::hw::probe::ProbeId;
use crate::scale::ScaledValue;

/// The single classification outcome of one probing cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComponentType {
    None,
    Diode,
    Bjt,
    Fet,
    Thyristor,
    Triac,
    Resistor,
    Capacitor,
    ShortedSupply,
    Error,
}

/// A resistor discovered between two probes
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Resistor {
    pub pin_a: ProbeId,
    pub pin_b: ProbeId,
    /// Ohm-based scaled value (0.1 Ω or 0.01 Ω resolution)
    pub value: ScaledValue,
}

impl Resistor {
    /// Same unordered probe pair, either orientation
    pub fn same_pair(&self, a: ProbeId, b: ProbeId) -> bool {
        (self.pin_a == a && self.pin_b == b) || (self.pin_a == b && self.pin_b == a)
    }

    /// The endpoint shared with another resistor, if any
    pub fn common_pin(&self, other: &Resistor) -> Option<ProbeId> {
        for pin in [self.pin_a, self.pin_b] {
            if pin == other.pin_a || pin == other.pin_b {
                return Some(pin);
            }
        }
        None
    }
}

/// A diode (or diode-like junction) with its forward voltage at both test
/// currents. Protection diodes of a transistor count as diodes too.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Diode {
    pub anode: ProbeId,
    pub cathode: ProbeId,
    /// Forward voltage at the ~7 mA Rl test current, millivolts
    pub vf_high_mv: u16,
    /// Forward voltage at the ~10 µA Rh test current, millivolts
    pub vf_low_mv: u16,
}

/// A capacitance measured across one probe pair
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Capacitor {
    pub pin_a: ProbeId,
    pub pin_b: ProbeId,
    /// Farad-based scaled value (exponents -12 to -3)
    pub value: ScaledValue,
}

/// Named semiconductor structure; illegal channel/polarity combinations
/// are unrepresentable by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SemiKind {
    Npn,
    Pnp,
    NJfet,
    PJfet,
    NMosEnhancement,
    NMosDepletion,
    PMosEnhancement,
    PMosDepletion,
}

impl SemiKind {
    pub fn label(self) -> &'static str {
        match self {
            SemiKind::Npn => "NPN",
            SemiKind::Pnp => "PNP",
            SemiKind::NJfet => "N-JFET",
            SemiKind::PJfet => "P-JFET",
            SemiKind::NMosEnhancement => "N-E-MOS",
            SemiKind::NMosDepletion => "N-D-MOS",
            SemiKind::PMosEnhancement => "P-E-MOS",
            SemiKind::PMosDepletion => "P-D-MOS",
        }
    }
}

/// Bipolar transistor candidate; a single slot, overwritten on new evidence
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BjtCandidate {
    pub kind: SemiKind,
    pub collector: ProbeId,
    pub base: ProbeId,
    pub emitter: ProbeId,
    /// Current gain from the Rh base divider
    pub hfe: u32,
}

/// Field-effect transistor candidate
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FetCandidate {
    pub kind: SemiKind,
    pub gate: ProbeId,
    pub drain: ProbeId,
    pub source: ProbeId,
    /// Gate threshold voltage, millivolts
    pub vth_mv: u16,
}

/// Thyristor/triac candidate
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ThyristorCandidate {
    pub gate: ProbeId,
    pub anode: ProbeId,
    pub cathode: ProbeId,
    /// A second trigger with anode/cathode swapped upgrades this to a triac
    pub bidirectional: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(i: u8) -> ProbeId {
        ProbeId::from_index(i)
    }

    #[test]
    fn test_same_pair_ignores_orientation() {
        let r = Resistor {
            pin_a: p(0),
            pin_b: p(2),
            value: ScaledValue::new(1000, -1),
        };
        assert!(r.same_pair(p(0), p(2)));
        assert!(r.same_pair(p(2), p(0)));
        assert!(!r.same_pair(p(0), p(1)));
    }

    #[test]
    fn test_common_pin() {
        let ab = Resistor { pin_a: p(0), pin_b: p(1), value: ScaledValue::new(1000, -1) };
        let bc = Resistor { pin_a: p(1), pin_b: p(2), value: ScaledValue::new(2000, -1) };
        let ca = Resistor { pin_a: p(2), pin_b: p(0), value: ScaledValue::new(3000, -1) };
        assert_eq!(ab.common_pin(&bc), Some(p(1)));
        assert_eq!(bc.common_pin(&ca), Some(p(2)));
        assert_eq!(ab.common_pin(&ca), Some(p(0)));
    }
}
