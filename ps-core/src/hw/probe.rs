//! Probe identities and the reconfigurable resistor network
//!
//! Each of the three probes owns a low-value (Rl) and a high-value (Rh)
//! pull resistor plus a direct I/O pin, all reachable through a fixed
//! probe-to-pin table. The network wrapper enforces the one-pull-class-per-
//! probe invariant and provides the idle-state reset every measurement must
//! end with.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::hw::frontend::{AnalogFrontend, PinLevel, PullClass, PullDir};

/// One of the three physical probes, internally indexed 0..=2.
///
/// User-facing output numbers probes 1..=3; `Display` renders that form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProbeId(u8);

impl ProbeId {
    /// All probes in index order
    pub const ALL: [ProbeId; 3] = [ProbeId(0), ProbeId(1), ProbeId(2)];

    /// Build from the internal 0..=2 index; out-of-range indices are
    /// clamped to the last probe (the table has exactly three rows)
    pub const fn from_index(index: u8) -> Self {
        if index > 2 {
            ProbeId(2)
        } else {
            ProbeId(index)
        }
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// User-facing probe number, 1..=3
    pub const fn number(self) -> u8 {
        self.0 + 1
    }

    /// The probe that is neither `self` nor `other`
    pub fn third(self, other: ProbeId) -> ProbeId {
        ProbeId(3 - self.0 - other.0)
    }
}

impl fmt::Display for ProbeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// Fixed per-probe pin assignment: ADC channel, resistor switch pins,
/// direct I/O pin. Mirrors the reference hardware's MCU wiring; loaded
/// once and immutable thereafter.
#[derive(Debug, Clone, Copy)]
pub struct ProbePin {
    pub adc_channel: u8,
    pub rl_pin: u8,
    pub rh_pin: u8,
    pub io_pin: u8,
}

/// Probe-to-pin map for the reference front end
pub const PROBE_PINS: [ProbePin; 3] = [
    ProbePin { adc_channel: 0, rl_pin: 0, rh_pin: 1, io_pin: 0 },
    ProbePin { adc_channel: 1, rl_pin: 2, rh_pin: 3, io_pin: 1 },
    ProbePin { adc_channel: 2, rl_pin: 4, rh_pin: 5, io_pin: 2 },
];

/// The reconfigurable pull network over the analog front end.
///
/// Invariant: at most one pull-resistor class is attached per probe at a
/// time; attaching one detaches the other first. The idle state (all
/// probes high-impedance, all pulls detached) must be restored before the
/// next measurement, else stale bias corrupts subsequent readings.
pub struct ProbeNetwork<F: AnalogFrontend> {
    fe: F,
    attached: [Option<PullClass>; 3],
}

impl<F: AnalogFrontend> ProbeNetwork<F> {
    pub fn new(fe: F) -> Self {
        Self {
            fe,
            attached: [None; 3],
        }
    }

    /// Direct access to the front end (raw conversions, delays)
    pub fn fe(&mut self) -> &mut F {
        &mut self.fe
    }

    /// ADC channel for a probe, from the static pin table
    pub fn adc_channel(&self, probe: ProbeId) -> u8 {
        PROBE_PINS[probe.index()].adc_channel
    }

    /// Attach a pull resistor in the given direction, or detach it with
    /// [`PullDir::Off`]. Detaches the other class first if needed.
    pub fn set_pull_resistor(&mut self, probe: ProbeId, class: PullClass, dir: PullDir) {
        trace!(probe = %probe, ?class, ?dir, "pull");
        if dir == PullDir::Off {
            self.fe.set_pull(probe, class, PullDir::Off);
            if self.attached[probe.index()] == Some(class) {
                self.attached[probe.index()] = None;
            }
            return;
        }

        if let Some(other) = self.attached[probe.index()] {
            if other != class {
                self.fe.set_pull(probe, other, PullDir::Off);
            }
        }
        self.fe.set_pull(probe, class, dir);
        self.attached[probe.index()] = Some(class);
    }

    /// Drive a probe pin push-pull
    pub fn set_direct_drive(&mut self, probe: ProbeId, level: PinLevel) {
        trace!(probe = %probe, ?level, "drive");
        self.fe.set_drive(probe, level);
    }

    /// Float a probe pin
    pub fn set_hiz(&mut self, probe: ProbeId) {
        self.fe.set_hiz(probe);
    }

    /// Return every probe to the idle state: high impedance, no pulls
    pub fn idle_all(&mut self) {
        for probe in ProbeId::ALL {
            self.fe.set_pull(probe, PullClass::Low, PullDir::Off);
            self.fe.set_pull(probe, PullClass::High, PullDir::Off);
            self.fe.set_hiz(probe);
            self.attached[probe.index()] = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::frontend::MockAnalogFrontend;
    use mockall::predicate::eq;

    #[test]
    fn test_probe_numbers() {
        assert_eq!(ProbeId::from_index(0).number(), 1);
        assert_eq!(ProbeId::from_index(2).number(), 3);
        assert_eq!(ProbeId::from_index(9).number(), 3);
    }

    #[test]
    fn test_third_probe() {
        let [a, b, c] = ProbeId::ALL;
        assert_eq!(a.third(b), c);
        assert_eq!(c.third(a), b);
        assert_eq!(b.third(c), a);
    }

    #[test]
    fn test_attach_other_class_detaches_first() {
        let probe = ProbeId::from_index(1);
        let mut fe = MockAnalogFrontend::new();
        fe.expect_set_pull()
            .with(eq(probe), eq(PullClass::Low), eq(PullDir::Up))
            .times(1)
            .return_const(());
        fe.expect_set_pull()
            .with(eq(probe), eq(PullClass::Low), eq(PullDir::Off))
            .times(1)
            .return_const(());
        fe.expect_set_pull()
            .with(eq(probe), eq(PullClass::High), eq(PullDir::Down))
            .times(1)
            .return_const(());

        let mut net = ProbeNetwork::new(fe);
        net.set_pull_resistor(probe, PullClass::Low, PullDir::Up);
        net.set_pull_resistor(probe, PullClass::High, PullDir::Down);
    }
}
