//! Partscope Core Library
//!
//! The component classification and measurement engine of the partscope
//! tester: given three probes on an unknown two- or three-terminal part,
//! it detects residual charge and shorts, scans all six probe-pair
//! permutations, measures the part and decides what it is.
//!
//! # Features
//!
//! - **Classification**: resistor, capacitor, diode networks, BJT, FET,
//!   thyristor and triac discrimination from divider voltages alone
//! - **Measurement**: weighted dual-divider resistance, pulsed-current
//!   milliohms, RC charge-timing capacitance, two-current forward voltage
//! - **Integer arithmetic**: all engine math is deterministic scaled-value
//!   arithmetic; no floating point in any decision path
//! - **Hardware seam**: everything reaches the analog world through the
//!   [`hw::AnalogFrontend`] trait; a circuit-solving simulator ships for
//!   bench and test use
//! - **Calibration**: checksummed persistent record for driver
//!   resistances and zero offsets, with a guarded self-calibration
//!
//! # Module Structure
//!
//! - `hw/` - front end port, probe network, voltage reader, simulator
//! - `measure/` - resistance, capacitance, diode, transistor routines
//! - `classify/` - session state, the six-permutation scan, decision rules
//!
//! # Example
//!
//! ```no_run
//! use ps_core::{run_cycle, CalibrationConfig, Instrument, SimFrontend};
//!
//! let sim = SimFrontend::from_spec("resistor:4.7k").unwrap();
//! let mut instrument = Instrument::new(sim, CalibrationConfig::default());
//! let report = run_cycle(&mut instrument);
//! println!("{:?}", report.outcome);
//! ```

// Grouped modules
pub mod classify;
pub mod hw;
pub mod measure;

// Standalone modules
pub mod calibration;
pub mod constants;
pub mod display;
pub mod error;
pub mod instrument;
pub mod scale;
pub mod selftest;

// Re-export primary types from hw/
pub use hw::{
    AnalogFrontend, DutModel, PinLevel, ProbeId, ProbeNetwork, PullClass, PullDir, SimFrontend,
    VoltageReader, parse_dut,
};

// Re-export the instrument and cycle entry points
pub use classify::{
    bjt_display_vf, diode_pairing, find_series_pair, render_report, run_cycle, series_exclusion,
    BjtCandidate, Capacitor, ClassificationSession, ComponentType, CycleReport, CycleStats, Diode,
    DiodePairing, FetCandidate, Resistor, SemiKind, ThyristorCandidate,
};
pub use instrument::{DischargeStatus, Instrument};

// Re-export value arithmetic
pub use scale::{cmp_scaled, round_to_display, ScaledValue};

// Re-export calibration types
pub use calibration::{
    invalidate_calibration_cache, CalibrationConfig, CalibrationStore, RECORD_LEN,
};

// Re-export display formatting
pub use display::{format_value, DisplaySink, TextDisplay, Unit};

// Re-export self test / self calibration
pub use selftest::{run_self_calibration, run_self_test};

// Re-export error types
pub use error::{PartscopeError, Result};
