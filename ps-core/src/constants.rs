//! Constants and configuration values for Partscope
//!
//! Centralizes all magic numbers, thresholds, and configuration defaults.
//! This is the SINGLE SOURCE OF TRUTH for all measurement parameters.
//! Never use magic numbers in other files - add them here first.
//!
//! The millivolt thresholds in `res`, `dio` and `tran` encode the resistor
//! ratios of the reference analog front end (Rl = 680 Ω, Rh = 470 kΩ at
//! Vcc = 5 V). They are calibrated hardware assumptions, not tunables.

/// ADC and voltage-reader parameters
pub mod adc {
    /// Nominal supply voltage in millivolts, used as the default ADC reference
    pub const VCC_MV: u16 = 5000;

    /// Nominal internal bandgap reference voltage in millivolts
    pub const BANDGAP_MV: u16 = 1100;

    /// Full-scale count of the 10-bit converter
    pub const FULL_SCALE: u32 = 1024;

    /// Default number of conversions averaged per voltage reading
    pub const DEFAULT_SAMPLE_COUNT: u16 = 25;

    /// Sample index after which the low-signal escalation check runs
    pub const ESCALATE_CHECK_AFTER: u16 = 5;

    /// Accumulated raw count below which the reader restarts on the bandgap
    /// reference (signal too small for the Vcc reference to resolve)
    pub const ESCALATE_RAW_LIMIT: u32 = 1024;

    /// Settling time before the discard conversion after a reference switch
    /// (datasheet-mandated reference stabilization)
    pub const REF_SETTLE_US: u32 = 100;

    /// Settle delay for minor circuit changes (pull direction flip)
    pub const SETTLE_MINOR_MS: u32 = 5;

    /// Settle delay after reconfiguring the probe network (class or drive
    /// changes); mandatory before trusting a reading
    pub const SETTLE_MAJOR_MS: u32 = 20;

    /// Readings below this are taken on the bandgap reference, giving
    /// ~1.1 mV per count instead of ~4.9 mV
    pub const BANDGAP_THRESHOLD_MV: u16 = 990;

    /// Pseudo-channel selecting the internal bandgap as the ADC input
    /// (used by the self test to read the reference against Vcc)
    pub const BANDGAP_CHANNEL: u8 = 14;
}

/// Probe resistor network values
pub mod network {
    /// Low-value pull resistor per probe, in ohms
    pub const RL_OHMS: u32 = 680;

    /// High-value pull resistor per probe, in ohms
    pub const RH_OHMS: u32 = 470_000;

    /// Rl expressed in 0.1 Ω units (divider math scale)
    pub const RL_01: u32 = RL_OHMS * 10;

    /// Rl expressed in 0.01 Ω units (small-resistance math scale)
    pub const RL_001: u32 = RL_OHMS * 100;

    /// Default calibrated internal pull-down driver resistance, 0.1 Ω units
    pub const DEFAULT_RI_LOW_01: u16 = 190;

    /// Default calibrated internal pull-up driver resistance, 0.1 Ω units
    pub const DEFAULT_RI_HIGH_01: u16 = 230;

    /// Default probe-lead zero offset for small resistances, 0.01 Ω units
    pub const DEFAULT_R_ZERO_001: u16 = 20;

    /// Default stray capacitance offset, picofarads
    pub const DEFAULT_CAP_ZERO_PF: u8 = 39;
}

/// Resistance measurement thresholds (millivolts unless noted)
pub mod res {
    /// Maximum residual voltage after the Rh discharge gate for the DUT to
    /// count as resistive; above this it is capacitive or open
    pub const CAP_DISCHARGE_MAX_MV: u16 = 20;

    /// U_Rl_H at or above this routes to value computation (DUT ≳ 5.1 kΩ)
    pub const RL_HIGH_MIN_MV: u16 = 4400;

    /// U_Rh_H at or below this routes to value computation (DUT ≲ 9.3 kΩ)
    pub const RH_HIGH_MAX_MV: u16 = 97;

    /// U_Rh_H at or above this means the pair is effectively open
    pub const RH_OPEN_MV: u16 = 4972;

    /// U_Rl_L below this selects the Rh-based divider (DUT ≳ 19.5 kΩ)
    pub const RL_LOW_ROUTE_MV: u16 = 169;

    /// U_Rl_L above this, with non-monotonic divider readings, flags the
    /// pair for small-resistance remeasurement
    pub const SMALL_FALLBACK_MV: u16 = 4750;

    /// Weight given to a divider estimate whose probe reading was below the
    /// bandgap threshold (finer ADC resolution), against 1 for the other
    pub const FINE_WEIGHT: u64 = 4;

    /// Fixed offset added to Rh-based results, ohms
    pub const RH_OFFSET_OHMS: u64 = 700;

    /// Results below this (0.1 Ω units, i.e. < 10 Ω) are remeasured with
    /// the pulsed-current method
    pub const SMALL_LIMIT_01: u32 = 100;

    /// Number of current pulses per side in the pulsed-current method
    pub const SMALL_PULSES: u32 = 100;

    /// Width of each measurement pulse, microseconds
    pub const SMALL_PULSE_US: u32 = 20;

    /// Reverse-direction tolerance: percent for values >= 2 Ω
    pub const TOL_NORMAL_PCT: u64 = 5;

    /// Reverse-direction tolerance: percent for values < 2 Ω
    pub const TOL_LOW_PCT: u64 = 50;

    /// Reverse-direction tolerance: percent for values < 0.1 Ω
    /// (absolute noise dominates near zero, so the band is 0..500%)
    pub const TOL_TINY_PCT: u64 = 500;
}

/// Capacitance measurement parameters
pub mod cap {
    /// Charge target, 0.632 x Vcc, so the pulse count gives t = RC directly
    pub const CHARGE_TARGET_MV: u16 = 3160;

    /// Poll period while draining the pair before a timing run, milliseconds
    pub const DRAIN_POLL_MS: u32 = 10;

    /// Drain poll budget (large electrolytics need seconds through Rl)
    pub const DRAIN_MAX_POLLS: u32 = 500;

    /// Charge-timing tick width, microseconds
    pub const FINE_TICK_US: u32 = 20;

    /// Tick budget per charge-timing path (1 s of virtual time)
    pub const FINE_MAX_TICKS: u32 = 50_000;

    /// Smallest capacitance reported by the classifier, picofarads
    pub const MIN_REPORT_PF: u32 = 25;
}

/// Diode measurement parameters
pub mod dio {
    /// Minimum plausible forward voltage, millivolts
    pub const VF_MIN_MV: u16 = 150;

    /// Maximum plausible forward voltage, millivolts (covers LED strings)
    pub const VF_MAX_MV: u16 = 4600;

    /// Nominal high test current through Rl, microamps
    pub const HIGH_TEST_CURRENT_UA: u32 = 7000;

    /// Nominal low test current through Rh, microamps
    pub const LOW_TEST_CURRENT_UA: u32 = 10;
}

/// Transistor and thyristor detection parameters
pub mod tran {
    /// Minimum collector-side swing (millivolts) between base-off and
    /// base-on for the pair to count as controlled conduction
    pub const COLLECTOR_SWING_MIN_MV: u16 = 1500;

    /// Minimum collector-side swing with the ~10 µA Rh control drive; a
    /// gain of ~15 already moves the collector this far
    pub const RH_DRIVE_SWING_MIN_MV: u16 = 100;

    /// Gate reading within this of the rail means no measurable gate
    /// current flows (insulated gate, not a base-emitter junction)
    pub const GATE_LEAK_MAX_MV: u16 = 200;

    /// hFE below this selects the high-current Vf for display (power part)
    pub const HFE_POWER_MAX: u32 = 100;

    /// hFE below this (and >= HFE_POWER_MAX) selects the interpolated
    /// high-current Vf (signal transistor)
    pub const HFE_SIGNAL_MAX: u32 = 250;

    /// Decades of test-current span between the two diode test currents
    pub const VF_DECADE_SPAN: u16 = 3;

    /// Gate-discharge sampling period for the threshold readout, microseconds
    pub const VTH_POLL_US: u32 = 200;

    /// Gate-discharge sampling budget
    pub const VTH_MAX_POLLS: u32 = 500;

    /// Drain counted as released (channel off) once it crosses half rail
    /// during the gate-discharge threshold readout, millivolts
    pub const VTH_DRAIN_RELEASE_MV: u16 = 2500;

    /// Conduction held at or below this after the control drive is removed
    /// means the device latched (thyristor behavior), millivolts
    pub const LATCH_HOLD_MAX_MV: u16 = 1500;

    /// Minimum change of the output node when the control rail flips, for
    /// a conducting-at-rest channel to count as a depletion device,
    /// millivolts
    pub const PINCH_DELTA_MV: u16 = 500;
}

/// Timing for discharge and scan sequencing
pub mod timing {
    /// Poll period while discharging probes, milliseconds
    pub const DISCHARGE_POLL_MS: u32 = 20;

    /// Total discharge budget before declaring an error, milliseconds
    pub const DISCHARGE_TIMEOUT_MS: u32 = 2000;

    /// A probe below this after discharge counts as empty, millivolts
    pub const DISCHARGE_DONE_MV: u16 = 100;

    /// Poll period while waiting for the user to change probe wiring
    /// during self test / self calibration, milliseconds
    pub const PROMPT_POLL_MS: u32 = 100;

    /// Budget for probe-wiring prompts, milliseconds
    pub const PROMPT_TIMEOUT_MS: u32 = 30_000;
}

/// Structural limits
pub mod limits {
    /// Candidate slots per component kind; at most 3 probes means at most
    /// 3 pairwise relationships, and a 4th detection is dropped
    pub const MAX_CANDIDATES: usize = 3;

    /// A probe pair reading at or below this through Rl counts as shorted,
    /// millivolts (direct short leaves only the driver resistances in the
    /// divider)
    pub const SHORTED_PAIR_MAX_MV: u16 = 200;

    /// Samples required per self-calibration category before committing
    /// (3 probe positions x 5 repeats)
    pub const CAL_SAMPLES: usize = 15;

    /// Repeats per probe position during self calibration
    pub const CAL_REPEATS: usize = 5;

    /// Maximum plausible probe-lead resistance, 0.01 Ω units (1.00 Ω)
    pub const CAL_LEAD_MAX_001: u16 = 100;

    /// Maximum plausible stray-capacitance offset, picofarads
    pub const CAL_CAP_ZERO_MAX_PF: u32 = 100;
}
