//! Self test and self calibration
//!
//! The self test exercises six fixed measurement scenarios purely for
//! diagnostic display; nothing is decided or persisted. Self calibration
//! runs five measurement rounds against known wiring (probes clipped
//! together, then removed), filters each sample through a plausibility
//! check, and commits the new record only when every category collected
//! its full sample count - a partial update would mix calibration states.

use tracing::{debug, info, warn};

use crate::calibration::{CalibrationConfig, CalibrationStore};
use crate::classify::ClassificationSession;
use crate::constants::{adc, limits, network, timing};
use crate::display::{DisplaySink, Unit};
use crate::error::{PartscopeError, Result};
use crate::hw::frontend::{AnalogFrontend, PinLevel, PullClass, PullDir};
use crate::hw::probe::ProbeId;
use crate::instrument::{DischargeStatus, Instrument};
use crate::measure::capacitance::ChargeTiming;
use crate::scale::ScaledValue;

/// The three unordered probe pairs, used by every calibration round
const PAIRS: [(u8, u8); 3] = [(0, 1), (0, 2), (1, 2)];

/// Run the six diagnostic scenarios, rendering every reading.
///
/// Expects the probes clipped together for the resistor-matching tests;
/// scenario four prompts for their removal and waits.
pub fn run_self_test<F: AnalogFrontend>(
    inst: &mut Instrument<F>,
    sink: &mut dyn DisplaySink,
) -> Result<()> {
    info!("self test started");

    // T1: bandgap reference against the supply.
    let mv = {
        let channel = adc::BANDGAP_CHANNEL;
        inst.adc.read_settled_major(inst.net.fe(), channel, false)
    };
    sink.show_text("T1 Vref=");
    sink.show_value(ScaledValue::new(mv as u32, -3), Unit::Volt);
    sink.show_text("\n");

    // T2/T3: Rl and Rh matching across all shorted pairs. With equal
    // resistors the divider sits at half rail; the displayed offset from
    // half rail is the mismatch.
    for (label, class) in [("T2", PullClass::Low), ("T3", PullClass::High)] {
        for (a, b) in PAIRS {
            let high = ProbeId::from_index(a);
            let low = ProbeId::from_index(b);
            inst.net.set_pull_resistor(high, class, PullDir::Up);
            inst.net.set_pull_resistor(low, class, PullDir::Down);
            let mv = inst.read_probe_settled_major(high, false);
            inst.net.idle_all();

            sink.show_text(&format!("{label} "));
            sink.show_pin(high);
            sink.show_text("-");
            sink.show_pin(low);
            sink.show_text(" ");
            sink.show_value(ScaledValue::new(mv as u32, -3), Unit::Volt);
            sink.show_text("\n");
        }
    }

    // T4: manual step.
    sink.show_text("T4 remove probes!\n");
    wait_probes_open(inst)?;

    // T5/T6: each probe alone against its Rh resistor, both rails.
    for (label, dir) in [("T5", PullDir::Down), ("T6", PullDir::Up)] {
        for probe in ProbeId::ALL {
            inst.net.set_pull_resistor(probe, PullClass::High, dir);
            let mv = inst.read_probe_settled_major(probe, false);
            inst.net.idle_all();

            sink.show_text(&format!("{label} "));
            sink.show_pin(probe);
            sink.show_text(" ");
            sink.show_value(ScaledValue::new(mv as u32, -3), Unit::Volt);
            sink.show_text("\n");
        }
    }

    info!("self test finished");
    Ok(())
}

/// Collected samples for the four calibrated quantities
#[derive(Debug, Default)]
struct CalSamples {
    lead_001: Vec<u32>,
    ri_low_01: Vec<u32>,
    ri_high_01: Vec<u32>,
    cap_zero_pf: Vec<u32>,
}

/// Run the five calibration rounds and commit the new record.
///
/// Starts with the probes clipped together, prompts for their removal
/// half-way. Every category must deliver all fifteen samples
/// (3 positions x 5 repeats) through its plausibility filter, otherwise
/// the existing calibration stays untouched.
pub fn run_self_calibration<F: AnalogFrontend>(
    inst: &mut Instrument<F>,
    store: &CalibrationStore,
    sink: &mut dyn DisplaySink,
) -> Result<CalibrationConfig> {
    info!("self calibration started");
    let mut samples = CalSamples::default();

    if let DischargeStatus::Failed { probe, .. } = inst.discharge_probes() {
        return Err(PartscopeError::ProbesNotDischarged { probe: probe.number() });
    }
    if inst.all_probes_shorted() != 3 {
        return Err(PartscopeError::ProbesNotShorted);
    }

    // Every clipped pair must read as exactly one near-zero resistor
    // before its readings are trusted as calibration input.
    let mut session = ClassificationSession::new();
    for (a, b) in PAIRS {
        if !inst.check_single_resistor(
            &mut session,
            ProbeId::from_index(a),
            ProbeId::from_index(b),
            1,
        ) {
            return Err(PartscopeError::ProbesNotShorted);
        }
    }

    // Round 1: probe-lead resistance through the shorted clips.
    sink.show_text("cal 1/5 lead resistance\n");
    for _ in 0..limits::CAL_REPEATS {
        for (a, b) in PAIRS {
            let r = inst.small_resistor(ProbeId::from_index(a), ProbeId::from_index(b), false);
            if r < limits::CAL_LEAD_MAX_001 as u32 {
                samples.lead_001.push(r);
            } else {
                warn!(r_001 = r, "implausible lead resistance sample");
            }
        }
    }

    // Round 2: manual step.
    sink.show_text("cal 2/5 remove probes!\n");
    wait_probes_open(inst)?;

    // Round 3: pull-down driver resistance. Driving a pin low against its
    // own Rl pull-up leaves Vcc across RiH + Rl + RiL; the pin voltage
    // isolates the low-side driver.
    sink.show_text("cal 3/5 driver low\n");
    for _ in 0..limits::CAL_REPEATS {
        for probe in ProbeId::ALL {
            inst.net.set_direct_drive(probe, PinLevel::Low);
            inst.net.set_pull_resistor(probe, PullClass::Low, PullDir::Up);
            let u = inst.read_probe_settled_major(probe, false) as u64;
            inst.net.idle_all();

            let vcc = inst.adc.vcc_mv() as u64;
            if u == 0 || u >= vcc {
                continue;
            }
            let ri = (u * network::RL_01 as u64 / (vcc - u)) as u32;
            if ri > 0 && ri < 1000 {
                samples.ri_low_01.push(ri);
            }
        }
    }

    // Round 4: pull-up driver resistance, mirrored.
    sink.show_text("cal 4/5 driver high\n");
    for _ in 0..limits::CAL_REPEATS {
        for probe in ProbeId::ALL {
            inst.net.set_direct_drive(probe, PinLevel::High);
            inst.net.set_pull_resistor(probe, PullClass::Low, PullDir::Down);
            let u = inst.read_probe_settled_major(probe, false) as u64;
            inst.net.idle_all();

            let vcc = inst.adc.vcc_mv() as u64;
            if u == 0 || u >= vcc {
                continue;
            }
            let ri = ((vcc - u) * network::RL_01 as u64 / u) as u32;
            if ri > 0 && ri < 1000 {
                samples.ri_high_01.push(ri);
            }
        }
    }

    // Round 5: stray capacitance of the open probes, from the raw charge
    // timer (the stored offset must not be subtracted from itself).
    sink.show_text("cal 5/5 stray capacitance\n");
    for _ in 0..limits::CAL_REPEATS {
        for (a, b) in PAIRS {
            let high = ProbeId::from_index(a);
            let low = ProbeId::from_index(b);
            if let Some(ChargeTiming::Reached(t_us)) =
                inst.time_charge(high, low, PullClass::High)
            {
                let pf = (t_us * 1_000_000 / network::RH_OHMS as u64) as u32;
                if pf <= limits::CAL_CAP_ZERO_MAX_PF {
                    samples.cap_zero_pf.push(pf);
                } else {
                    warn!(pf, "implausible stray capacitance sample");
                }
            }
        }
    }

    // All-or-nothing commit.
    let counts = [
        samples.lead_001.len(),
        samples.ri_low_01.len(),
        samples.ri_high_01.len(),
        samples.cap_zero_pf.len(),
    ];
    if counts.iter().any(|&n| n != limits::CAL_SAMPLES) {
        warn!(?counts, "incomplete calibration sample sets");
        return Err(PartscopeError::calibration(format!(
            "sample counts {counts:?}, need {} each",
            limits::CAL_SAMPLES
        )));
    }

    let cfg = CalibrationConfig {
        ri_low: average(&samples.ri_low_01) as u16,
        ri_high: average(&samples.ri_high_01) as u16,
        r_zero: average(&samples.lead_001) as u16,
        cap_zero: average(&samples.cap_zero_pf) as u8,
        ref_offset: inst.cal.ref_offset,
        comp_offset: inst.cal.comp_offset,
    };

    store.save(&cfg)?;
    inst.cal = cfg;
    debug!(?cfg, "calibration committed");
    sink.show_text("calibration done\n");
    Ok(cfg)
}

fn average(samples: &[u32]) -> u32 {
    if samples.is_empty() {
        return 0;
    }
    let sum: u64 = samples.iter().map(|&s| s as u64).sum();
    (sum / samples.len() as u64) as u32
}

/// Poll until no probe pair reads shorted anymore
fn wait_probes_open<F: AnalogFrontend>(inst: &mut Instrument<F>) -> Result<()> {
    let mut waited_ms = 0;
    while inst.all_probes_shorted() != 0 {
        inst.net.fe().delay_us(timing::PROMPT_POLL_MS * 1000);
        waited_ms += timing::PROMPT_POLL_MS;
        if waited_ms >= timing::PROMPT_TIMEOUT_MS {
            return Err(PartscopeError::ProbesNotOpen);
        }
    }
    Ok(())
}
