//! Self test and self calibration against the simulated front end
//!
//! The calibration rounds need a human to change the probe wiring half
//! way through, so with a static DUT model the procedure must stop at the
//! matching guard without touching the store.

use ps_core::{
    run_self_calibration, run_self_test, CalibrationConfig, CalibrationStore, Instrument,
    PartscopeError, SimFrontend, TextDisplay,
};
use tempfile::TempDir;

fn instrument(spec: &str) -> Instrument<SimFrontend> {
    let sim = SimFrontend::from_spec(spec).expect("valid DUT spec");
    Instrument::new(sim, CalibrationConfig::default())
}

#[test]
fn self_test_runs_all_scenarios_on_open_probes() {
    let mut inst = instrument("open");
    let mut sink = TextDisplay::new();
    run_self_test(&mut inst, &mut sink).unwrap();

    let out = sink.rendered();
    for label in ["T1", "T2", "T3", "T4", "T5", "T6"] {
        assert!(out.contains(label), "missing {label} in: {out}");
    }
    // The bandgap readout sits near 1.1 V.
    assert!(out.contains("Vref="), "missing reference readout: {out}");
}

#[test]
fn self_calibration_requires_shorted_probes() {
    let dir = TempDir::new().unwrap();
    let store = CalibrationStore::new(dir.path().join("frontend.cal"));

    let mut inst = instrument("open");
    let mut sink = TextDisplay::new();
    let err = run_self_calibration(&mut inst, &store, &mut sink).unwrap_err();
    assert!(matches!(err, PartscopeError::ProbesNotShorted), "got {err:?}");

    // Nothing may be persisted by a failed run.
    assert!(!dir.path().join("frontend.cal").exists());
}

#[test]
fn self_calibration_stops_at_the_disconnect_prompt() {
    let dir = TempDir::new().unwrap();
    let store = CalibrationStore::new(dir.path().join("frontend.cal"));

    // Probes stay clipped together forever, so the disconnect prompt must
    // time out instead of committing anything.
    let mut inst = instrument("short");
    let mut sink = TextDisplay::new();
    let err = run_self_calibration(&mut inst, &store, &mut sink).unwrap_err();
    assert!(matches!(err, PartscopeError::ProbesNotOpen), "got {err:?}");
    assert!(!dir.path().join("frontend.cal").exists());

    // The lead-resistance round ran before the prompt.
    assert!(sink.rendered().contains("lead resistance"));
}
