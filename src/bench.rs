//! Bench runner: wires the measurement engine to the simulated front end
//!
//! The real instrument runs the classification loop against its analog
//! board; the bench binary runs the same loop against a simulated device
//! under test described on the command line, rendering results through the
//! text display sink.

use std::path::PathBuf;

use anyhow::Context;
use tracing::{info, warn};

use ps_core::{
    render_report, run_cycle, run_self_calibration, run_self_test, CalibrationStore, CycleStats,
    DisplaySink, Instrument, SimFrontend, TextDisplay,
};

pub const USAGE: &str = "\
partscope - component identification and measurement bench

USAGE:
    partscope <dut-spec> [OPTIONS]

DUT SPECS:
    open                    nothing connected
    short                   all probes clipped together (menu gesture)
    short:1-2               direct short across a probe pair
    resistor:<val>[:pins]   e.g. resistor:4.7k or resistor:330:1-3
    diode[:vf_mv][:pins]    silicon junction, led for a 1.9 V one
    antiparallel            two junctions head to tail
    npn[:hfe] | pnp[:hfe]   bipolar transistor, C=1 B=2 E=3
    nmos[:vth] | pmos[:vth] enhancement MOSFET, D=1 G=2 S=3
    scr | triac             latching devices, A=1 G=2 C=3
    cap:<val>[:pins]        e.g. cap:100n or cap:10u

OPTIONS:
    --cycles <n>     run n classification cycles (default 1)
    --json           append the JSON report after the display output
    --self-test      run the diagnostic self test first
    --calibrate      run self calibration first (use with 'short')
    --cal-file <p>   calibration store path (default: user config dir)
    --help           show this help
";

/// Parsed command line
#[derive(Debug, Clone)]
pub struct BenchOptions {
    pub dut: String,
    pub cycles: u32,
    pub json: bool,
    pub self_test: bool,
    pub calibrate: bool,
    pub cal_file: Option<PathBuf>,
}

impl Default for BenchOptions {
    fn default() -> Self {
        Self {
            dut: "open".to_string(),
            cycles: 1,
            json: false,
            self_test: false,
            calibrate: false,
            cal_file: None,
        }
    }
}

/// Parse the argument list (without the program name). Returns None when
/// the caller asked for help.
pub fn parse_args(args: &[String]) -> anyhow::Result<Option<BenchOptions>> {
    let mut opts = BenchOptions::default();
    let mut dut_seen = false;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--help" | "-h" => return Ok(None),
            "--json" => opts.json = true,
            "--self-test" => opts.self_test = true,
            "--calibrate" => opts.calibrate = true,
            "--cycles" => {
                let n = iter.next().context("--cycles needs a number")?;
                opts.cycles = n.parse().with_context(|| format!("bad cycle count '{n}'"))?;
            }
            "--cal-file" => {
                let p = iter.next().context("--cal-file needs a path")?;
                opts.cal_file = Some(PathBuf::from(p));
            }
            other if other.starts_with('-') => {
                anyhow::bail!("unknown option '{other}' (try --help)");
            }
            spec => {
                if dut_seen {
                    anyhow::bail!("only one DUT spec allowed, got '{spec}' too");
                }
                opts.dut = spec.to_string();
                dut_seen = true;
            }
        }
    }

    if !dut_seen {
        anyhow::bail!("missing DUT spec (try --help)");
    }
    Ok(Some(opts))
}

/// Run the bench and return everything that should reach the terminal
pub fn run(opts: &BenchOptions) -> anyhow::Result<String> {
    let sim = SimFrontend::from_spec(&opts.dut)?;

    let store = match &opts.cal_file {
        Some(path) => CalibrationStore::new(path),
        None => CalibrationStore::new(
            CalibrationStore::default_path().context("no config directory available")?,
        ),
    };
    let (cal, valid) = store.load();
    if !valid {
        warn!("calibration store invalid or missing, using defaults");
    }

    let mut inst = Instrument::new(sim, cal);
    let mut sink = TextDisplay::new();
    let mut stats = CycleStats::default();
    let mut json_out = String::new();

    if opts.self_test {
        run_self_test(&mut inst, &mut sink)?;
    }
    if opts.calibrate {
        run_self_calibration(&mut inst, &store, &mut sink)?;
    }

    for cycle in 1..=opts.cycles {
        info!(cycle, dut = %opts.dut, "running classification cycle");
        let report = run_cycle(&mut inst);

        if report.menu_requested {
            // The all-shorted gesture skips classification entirely.
            sink.show_text("menu: all probes shorted\n");
        } else {
            render_report(&report, &mut sink, &mut stats);
        }

        if opts.json {
            json_out.push_str(&report.to_json()?);
            json_out.push('\n');
        }
    }

    info!(passed = stats.passed, missed = stats.missed, "bench finished");

    let mut out = sink.rendered();
    if !json_out.is_empty() {
        out.push('\n');
        out.push_str(&json_out);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_args_basic() {
        let opts = parse_args(&args(&["resistor:4.7k"])).unwrap().unwrap();
        assert_eq!(opts.dut, "resistor:4.7k");
        assert_eq!(opts.cycles, 1);
        assert!(!opts.json);
    }

    #[test]
    fn test_parse_args_flags() {
        let opts = parse_args(&args(&["npn:350", "--cycles", "3", "--json"]))
            .unwrap()
            .unwrap();
        assert_eq!(opts.cycles, 3);
        assert!(opts.json);
    }

    #[test]
    fn test_parse_args_help_and_errors() {
        assert!(parse_args(&args(&["--help"])).unwrap().is_none());
        assert!(parse_args(&args(&[])).is_err());
        assert!(parse_args(&args(&["open", "--frobnicate"])).is_err());
        assert!(parse_args(&args(&["open", "second"])).is_err());
    }
}
