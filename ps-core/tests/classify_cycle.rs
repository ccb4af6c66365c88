//! End-to-end classification cycles against the simulated front end
//!
//! Each test wires a DUT model to the probes and runs full cycles through
//! the public entry point, asserting on the decided component type and the
//! measured values.

use ps_core::{
    run_cycle, render_report, CalibrationConfig, ComponentType, CycleStats, Instrument,
    ScaledValue, SemiKind, SimFrontend, TextDisplay,
};

fn instrument(spec: &str) -> Instrument<SimFrontend> {
    let sim = SimFrontend::from_spec(spec).expect("valid DUT spec");
    Instrument::new(sim, CalibrationConfig::default())
}

/// Value in milliohms for range assertions
fn milliohms(v: &ScaledValue) -> u64 {
    v.to_u64_at(-3).expect("resistance fits")
}

/// Value in picofarads for range assertions
fn picofarads(v: &ScaledValue) -> u64 {
    v.to_u64_at(-12).expect("capacitance fits")
}

#[test]
fn resistor_330_is_found_once_with_correct_value() {
    let mut inst = instrument("resistor:330");
    let report = run_cycle(&mut inst);

    assert_eq!(report.outcome, ComponentType::Resistor);
    // Both scan directions ran; agreement within tolerance must merge
    // into a single record, never two.
    assert_eq!(report.resistors.len(), 1);

    let r = &report.resistors[0];
    assert!(r.same_pair(ps_core::ProbeId::from_index(0), ps_core::ProbeId::from_index(1)));
    let m = milliohms(&r.value);
    assert!((320_000..340_000).contains(&m), "330 Ω read as {m} mΩ");
}

#[test]
fn resistor_4k7_uses_the_rl_divider() {
    let mut inst = instrument("resistor:4.7k");
    let report = run_cycle(&mut inst);

    assert_eq!(report.outcome, ComponentType::Resistor);
    assert_eq!(report.resistors.len(), 1);
    let m = milliohms(&report.resistors[0].value);
    assert!((4_560_000..4_840_000).contains(&m), "4.7 kΩ read as {m} mΩ");
}

#[test]
fn resistor_100k_uses_the_rh_divider() {
    let mut inst = instrument("resistor:100k:2-3");
    let report = run_cycle(&mut inst);

    assert_eq!(report.outcome, ComponentType::Resistor);
    assert_eq!(report.resistors.len(), 1);
    let r = &report.resistors[0];
    assert!(r.same_pair(ps_core::ProbeId::from_index(1), ps_core::ProbeId::from_index(2)));
    let m = milliohms(&r.value);
    // The Rh path carries the fixed hardware offset, so the band is wider.
    assert!((98_000_000..103_000_000).contains(&m), "100 kΩ read as {m} mΩ");
}

#[test]
fn resistor_5_ohm_is_refined_to_centiohm_resolution() {
    let mut inst = instrument("resistor:5");
    let report = run_cycle(&mut inst);

    assert_eq!(report.outcome, ComponentType::Resistor);
    assert_eq!(report.resistors.len(), 1);

    let r = &report.resistors[0];
    // The pulsed-current override reports in 0.01 Ω units.
    assert_eq!(r.value.exponent, -2);
    let m = milliohms(&r.value);
    assert!((4_600..5_400).contains(&m), "5 Ω read as {m} mΩ");
}

#[test]
fn open_probes_find_nothing_and_bump_the_missed_counter() {
    let mut inst = instrument("open");
    let report = run_cycle(&mut inst);
    assert_eq!(report.outcome, ComponentType::None);
    assert!(report.resistors.is_empty());
    assert!(report.diodes.is_empty());

    let mut sink = TextDisplay::new();
    let mut stats = CycleStats { passed: 3, missed: 0 };
    render_report(&report, &mut sink, &mut stats);
    assert_eq!(stats.missed, 1);
    assert_eq!(stats.passed, 0);
}

#[test]
fn all_probes_shorted_requests_the_menu() {
    let mut inst = instrument("short");
    let report = run_cycle(&mut inst);
    assert_eq!(report.outcome, ComponentType::ShortedSupply);
    assert!(report.menu_requested);
    // The scan never ran, so no candidates exist.
    assert!(report.resistors.is_empty());
    assert!(report.diodes.is_empty());
}

#[test]
fn shorted_pair_reads_as_milliohm_resistor() {
    let mut inst = instrument("short:1-2");
    let report = run_cycle(&mut inst);

    assert_eq!(report.outcome, ComponentType::Resistor);
    assert_eq!(report.resistors.len(), 1);
    let r = &report.resistors[0];
    assert_eq!(r.value.exponent, -2);
    assert!(milliohms(&r.value) < 500, "short read as {} mΩ", milliohms(&r.value));
}

#[test]
fn silicon_diode_reports_both_forward_voltages() {
    let mut inst = instrument("diode:650");
    let report = run_cycle(&mut inst);

    assert_eq!(report.outcome, ComponentType::Diode);
    assert_eq!(report.diodes.len(), 1);

    let d = &report.diodes[0];
    assert_eq!(d.anode.number(), 1);
    assert_eq!(d.cathode.number(), 2);
    assert!((600..700).contains(&d.vf_high_mv), "Vf high {}", d.vf_high_mv);
    assert!(
        d.vf_low_mv < d.vf_high_mv,
        "low-current Vf {} must sit below {}",
        d.vf_low_mv,
        d.vf_high_mv
    );
}

#[test]
fn led_reports_high_forward_voltage() {
    let mut inst = instrument("led");
    let report = run_cycle(&mut inst);

    assert_eq!(report.outcome, ComponentType::Diode);
    assert_eq!(report.diodes.len(), 1);
    assert!((1800..2050).contains(&report.diodes[0].vf_high_mv));
}

#[test]
fn anti_parallel_diodes_suppress_capacitance_display() {
    let mut inst = instrument("antiparallel");
    let report = run_cycle(&mut inst);

    assert_eq!(report.outcome, ComponentType::Diode);
    assert_eq!(report.diodes.len(), 2);
    // Both junctions across the same pair, opposite directions.
    assert_eq!(report.diodes[0].anode, report.diodes[1].cathode);
    assert_eq!(report.diodes[0].cathode, report.diodes[1].anode);
    // No junction capacitance was measured across a pair that conducts
    // both ways.
    assert!(report.capacitor.is_none());

    let mut sink = TextDisplay::new();
    let mut stats = CycleStats::default();
    render_report(&report, &mut sink, &mut stats);
    assert!(sink.rendered().contains("anti-parallel"));
}

#[test]
fn npn_transistor_with_pinout_and_gain() {
    let mut inst = instrument("npn:200");
    let report = run_cycle(&mut inst);

    assert_eq!(report.outcome, ComponentType::Bjt);
    let bjt = report.bjt.expect("BJT candidate");
    assert_eq!(bjt.kind, SemiKind::Npn);
    assert_eq!(bjt.collector.number(), 1);
    assert_eq!(bjt.base.number(), 2);
    assert_eq!(bjt.emitter.number(), 3);
    assert!((150..260).contains(&bjt.hfe), "hFE {}", bjt.hfe);

    // The base junctions surface as diodes with the base as common anode.
    assert!(report
        .diodes
        .iter()
        .any(|d| d.anode == bjt.base && d.cathode == bjt.emitter));
}

#[test]
fn pnp_transistor_mirrors_the_pinout() {
    let mut inst = instrument("pnp:200");
    let report = run_cycle(&mut inst);

    assert_eq!(report.outcome, ComponentType::Bjt);
    let bjt = report.bjt.expect("BJT candidate");
    assert_eq!(bjt.kind, SemiKind::Pnp);
    assert_eq!(bjt.collector.number(), 1);
    assert_eq!(bjt.base.number(), 2);
    assert_eq!(bjt.emitter.number(), 3);
    assert!((150..260).contains(&bjt.hfe), "hFE {}", bjt.hfe);
}

#[test]
fn nmos_enhancement_fet_with_threshold() {
    let mut inst = instrument("nmos:2000");
    let report = run_cycle(&mut inst);

    assert_eq!(report.outcome, ComponentType::Fet);
    let fet = report.fet.expect("FET candidate");
    assert_eq!(fet.kind, SemiKind::NMosEnhancement);
    assert_eq!(fet.drain.number(), 1);
    assert_eq!(fet.gate.number(), 2);
    assert_eq!(fet.source.number(), 3);
    assert!((1700..2150).contains(&fet.vth_mv), "Vth {}", fet.vth_mv);
}

#[test]
fn pmos_enhancement_fet_with_threshold() {
    let mut inst = instrument("pmos:2000");
    let report = run_cycle(&mut inst);

    assert_eq!(report.outcome, ComponentType::Fet);
    let fet = report.fet.expect("FET candidate");
    assert_eq!(fet.kind, SemiKind::PMosEnhancement);
    assert_eq!(fet.drain.number(), 1);
    assert_eq!(fet.gate.number(), 2);
    assert_eq!(fet.source.number(), 3);
    assert!((1700..2150).contains(&fet.vth_mv), "Vth {}", fet.vth_mv);
}

#[test]
fn thyristor_latches_and_is_not_a_transistor() {
    let mut inst = instrument("scr");
    let report = run_cycle(&mut inst);

    assert_eq!(report.outcome, ComponentType::Thyristor);
    let t = report.thyristor.expect("thyristor candidate");
    assert_eq!(t.anode.number(), 1);
    assert_eq!(t.gate.number(), 2);
    assert_eq!(t.cathode.number(), 3);
    assert!(!t.bidirectional);
    assert!(report.bjt.is_none(), "latch must not be recorded as a BJT");
}

#[test]
fn triac_latches_in_both_polarities() {
    let mut inst = instrument("triac");
    let report = run_cycle(&mut inst);

    assert_eq!(report.outcome, ComponentType::Triac);
    assert!(report.thyristor.expect("candidate").bidirectional);
}

#[test]
fn film_capacitor_100n_times_on_the_rh_path() {
    let mut inst = instrument("cap:100n");
    let report = run_cycle(&mut inst);

    assert_eq!(report.outcome, ComponentType::Capacitor);
    let c = report.capacitor.expect("capacitor");
    assert_eq!(c.pin_a.number(), 1);
    assert_eq!(c.pin_b.number(), 2);
    let pf = picofarads(&c.value);
    assert!((90_000..110_000).contains(&pf), "100 nF read as {pf} pF");
}

#[test]
fn electrolytic_10u_falls_back_to_the_rl_path() {
    let mut inst = instrument("cap:10u");
    let report = run_cycle(&mut inst);

    assert_eq!(report.outcome, ComponentType::Capacitor);
    let pf = picofarads(&report.capacitor.expect("capacitor").value);
    assert!((9_200_000..11_200_000).contains(&pf), "10 µF read as {pf} pF");
}

#[test]
fn small_ceramic_470p_survives_the_zero_offset() {
    let mut inst = instrument("cap:470p");
    let report = run_cycle(&mut inst);

    assert_eq!(report.outcome, ComponentType::Capacitor);
    let pf = picofarads(&report.capacitor.expect("capacitor").value);
    assert!((380..560).contains(&pf), "470 pF read as {pf} pF");
}

#[test]
fn single_resistor_check_enforces_the_limit() {
    use ps_core::{ClassificationSession, ProbeId};
    let p = |i: u8| ProbeId::from_index(i);

    let mut inst = instrument("resistor:330");
    let mut session = ClassificationSession::new();
    inst.discharge_probes();

    // 330 Ω sits under a 1 kΩ limit and passes with no limit at all.
    assert!(inst.check_single_resistor(&mut session, p(0), p(1), 1));
    assert!(inst.check_single_resistor(&mut session, p(0), p(1), 0));
    // Nothing across the other pair.
    assert!(!inst.check_single_resistor(&mut session, p(0), p(2), 0));

    let mut inst = instrument("resistor:4.7k");
    let mut session = ClassificationSession::new();
    inst.discharge_probes();
    assert!(!inst.check_single_resistor(&mut session, p(0), p(1), 1));
    assert!(inst.check_single_resistor(&mut session, p(0), p(1), 10));
}

#[test]
fn charged_supercap_blocks_the_cycle() {
    use ps_core::{DutModel, ProbeId};

    // 10 mF holding 3 V: the Rl discharge path cannot drain it inside the
    // budget, so the cycle must abort instead of driving current into it.
    let mut sim = SimFrontend::new(DutModel::Capacitor {
        a: ProbeId::from_index(0),
        b: ProbeId::from_index(1),
        farads: 10e-3,
    });
    sim.precharge(3000.0);

    let mut inst = Instrument::new(sim, CalibrationConfig::default());
    let report = run_cycle(&mut inst);
    assert_eq!(report.outcome, ComponentType::Error);
    assert!(report.resistors.is_empty());

    let mut sink = TextDisplay::new();
    let mut stats = CycleStats::default();
    render_report(&report, &mut sink, &mut stats);
    assert_eq!(stats.missed, 1);
    assert!(sink.rendered().contains("not discharged"));
}

#[test]
fn charged_film_cap_drains_and_measures() {
    use ps_core::{DutModel, ProbeId};

    // 100 µF at 3 V drains through Rl well inside the budget and then
    // measures normally.
    let mut sim = SimFrontend::new(DutModel::Capacitor {
        a: ProbeId::from_index(0),
        b: ProbeId::from_index(1),
        farads: 100e-6,
    });
    sim.precharge(3000.0);

    let mut inst = Instrument::new(sim, CalibrationConfig::default());
    let report = run_cycle(&mut inst);
    assert_eq!(report.outcome, ComponentType::Capacitor);
}

#[test]
fn repeated_cycles_are_independent() {
    let mut inst = instrument("resistor:330");
    let first = run_cycle(&mut inst);
    let second = run_cycle(&mut inst);

    assert_eq!(first.outcome, ComponentType::Resistor);
    assert_eq!(second.outcome, ComponentType::Resistor);
    assert_eq!(first.resistors.len(), second.resistors.len());
    let a = milliohms(&first.resistors[0].value);
    let b = milliohms(&second.resistors[0].value);
    assert_eq!(a, b, "deterministic sim must reproduce the value");
}
