/*
 * Integration tests for the partscope bench binary
 *
 * These drive the bench entry points end to end: argument parsing, the
 * simulated front end, full classification cycles and the rendered output.
 */

use partscope::bench::{parse_args, run, BenchOptions};
use serial_test::serial;
use tempfile::TempDir;

fn options(dut: &str, dir: &TempDir) -> BenchOptions {
    BenchOptions {
        dut: dut.to_string(),
        cal_file: Some(dir.path().join("frontend.cal")),
        ..BenchOptions::default()
    }
}

#[test]
#[serial]
fn test_resistor_bench_output() {
    let dir = TempDir::new().unwrap();
    let out = run(&options("resistor:4.7k", &dir)).unwrap();
    assert!(out.contains("Resistor"), "output was: {out}");
    assert!(out.contains("1-2"), "output was: {out}");
    assert!(out.contains("kΩ"), "output was: {out}");
}

#[test]
#[serial]
fn test_diode_bench_output() {
    let dir = TempDir::new().unwrap();
    let out = run(&options("diode:650", &dir)).unwrap();
    assert!(out.contains("Diode"), "output was: {out}");
    assert!(out.contains("A=1"), "output was: {out}");
    assert!(out.contains("C=2"), "output was: {out}");
}

#[test]
#[serial]
fn test_shorted_probes_enter_menu() {
    let dir = TempDir::new().unwrap();
    let out = run(&options("short", &dir)).unwrap();
    assert!(out.contains("menu"), "output was: {out}");
    // Classification output must not appear.
    assert!(!out.contains("Resistor"), "output was: {out}");
}

#[test]
#[serial]
fn test_open_probes_report_nothing() {
    let dir = TempDir::new().unwrap();
    let out = run(&options("open", &dir)).unwrap();
    assert!(out.contains("No component found"), "output was: {out}");
}

#[test]
#[serial]
fn test_json_report_is_appended() {
    let dir = TempDir::new().unwrap();
    let mut opts = options("npn:200", &dir);
    opts.json = true;
    let out = run(&opts).unwrap();
    assert!(out.contains("\"outcome\""), "output was: {out}");
    assert!(out.contains("Bjt"), "output was: {out}");
}

#[test]
#[serial]
fn test_multiple_cycles_run() {
    let dir = TempDir::new().unwrap();
    let mut opts = options("led", &dir);
    opts.cycles = 3;
    let out = run(&opts).unwrap();
    assert_eq!(out.matches("Diode").count(), 3, "output was: {out}");
}

#[test]
fn test_arg_parsing_round_trip() {
    let args: Vec<String> = vec!["cap:100n".into(), "--cycles".into(), "2".into()];
    let opts = parse_args(&args).unwrap().unwrap();
    assert_eq!(opts.dut, "cap:100n");
    assert_eq!(opts.cycles, 2);
}
