//! Analog front end port
//!
//! Everything the measurement engine needs from the hardware: a blocking
//! 10-bit ADC conversion, the per-probe pull-resistor switches, direct pin
//! drive, and a delay source. Implementations are the real MCU bindings or
//! the simulator in [`crate::hw::sim`]; the engine never touches registers
//! directly.

use crate::hw::probe::ProbeId;

/// Which pull resistor of a probe is being switched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullClass {
    /// Low-value resistor (Rl, ~680 Ω)
    Low,
    /// High-value resistor (Rh, ~470 kΩ)
    High,
}

/// Direction a pull resistor is attached in, or detached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullDir {
    Up,
    Down,
    Off,
}

/// Logic level for direct pin drive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinLevel {
    Low,
    High,
}

/// Hardware access consumed by the engine.
///
/// All operations are immediate register-style writes; analog settling after
/// a reconfiguration is the caller's responsibility (see the voltage
/// reader's settle wrappers). `delay_us` is the only time source - the
/// simulator advances its virtual clock here, which is what makes the
/// timing-based measurements deterministic under test.
#[cfg_attr(test, mockall::automock)]
pub trait AnalogFrontend {
    /// One blocking ADC conversion on the given channel, 0..=1023.
    /// `bandgap` selects the internal ~1.1 V reference instead of Vcc.
    fn read_adc(&mut self, channel: u8, bandgap: bool) -> u16;

    /// Attach or detach one pull resistor of a probe
    fn set_pull(&mut self, probe: ProbeId, class: PullClass, dir: PullDir);

    /// Drive a probe pin push-pull
    fn set_drive(&mut self, probe: ProbeId, level: PinLevel);

    /// Float a probe pin (input, no drive)
    fn set_hiz(&mut self, probe: ProbeId);

    /// Busy-wait for the given number of microseconds
    fn delay_us(&mut self, us: u32);

    /// Liveness hook for long loops; resets a hardware watchdog where one
    /// exists, no-op elsewhere
    fn pet_watchdog(&mut self) {}
}
