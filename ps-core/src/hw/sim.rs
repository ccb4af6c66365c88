//! Simulated analog front end
//!
//! A hardware-out-of-the-loop stand-in for the real probe network: the
//! measurement engine drives it through the same [`AnalogFrontend`] trait
//! as real hardware, while a small quasi-static circuit solver produces
//! the node voltages a device under test would show. Time is virtual - it
//! advances only through `delay_us` - so timing-based measurements are
//! fully deterministic.
//!
//! The solver is intentionally simple: every probe collapses to a Thevenin
//! source (direct drive, Rl, Rh, or floating), the DUT model connects two
//! or three of the nodes, and nonlinear elements (junctions, transistors,
//! latches) are solved by bisection or a short fixed-point iteration.
//! Floating-point math is fine here; only the engine itself is bound to
//! integer arithmetic.

use regex::Regex;
use tracing::trace;

use crate::constants::adc;
use crate::constants::network;
use crate::error::{PartscopeError, Result};
use crate::hw::frontend::{AnalogFrontend, PinLevel, PullClass, PullDir};
use crate::hw::probe::ProbeId;

/// Driver resistance of a pin driven low, ohms
const DRIVER_LOW_OHMS: f64 = 19.0;
/// Driver resistance of a pin driven high, ohms
const DRIVER_HIGH_OHMS: f64 = 23.0;
/// Probe lead resistance in series with every two-terminal DUT, ohms
const LEAD_OHMS: f64 = 0.2;
/// Junction voltage change per decade of current, millivolts
const SLOPE_MV_PER_DECADE: f64 = 50.0;
/// Reference current the nominal forward voltage is specified at, amps
const VF_REF_CURRENT_A: f64 = 0.007;
/// Gate capacitance of the MOSFET model, farads
const GATE_CAP_F: f64 = 10e-9;
/// Collector-emitter saturation voltage of the BJT model, millivolts
const VCE_SAT_MV: f64 = 100.0;
/// On resistance of the MOSFET channel model, ohms
const RDS_ON_OHMS: f64 = 1.0;
/// Thyristor on-state voltage, millivolts
const SCR_VAK_MV: f64 = 900.0;
/// Gate current needed to trigger the latch models, amps
const SCR_TRIGGER_A: f64 = 0.001;
/// Anode current below which a latch drops out, amps
const SCR_HOLD_A: f64 = 0.003;
/// Gate junction voltage of the latch models, millivolts
const SCR_VGK_MV: f64 = 700.0;

/// Device-under-test models the simulator can stand in for
#[derive(Debug, Clone, PartialEq)]
pub enum DutModel {
    /// Nothing between the probes
    Open,
    /// All three probes clipped together (the menu gesture)
    AllShorted,
    /// Direct short between two probes
    Short { a: ProbeId, b: ProbeId },
    Resistor { a: ProbeId, b: ProbeId, ohms: f64 },
    /// Junction with the nominal forward voltage at ~7 mA
    Diode { anode: ProbeId, cathode: ProbeId, vf_mv: f64 },
    /// Two junctions head to tail across the same pair
    AntiParallel { a: ProbeId, b: ProbeId, vf_ab_mv: f64, vf_ba_mv: f64 },
    Bjt {
        npn: bool,
        collector: ProbeId,
        base: ProbeId,
        emitter: ProbeId,
        hfe: f64,
        vbe_mv: f64,
    },
    /// Enhancement MOSFET with body diode
    Mosfet {
        n_channel: bool,
        gate: ProbeId,
        drain: ProbeId,
        source: ProbeId,
        vth_mv: f64,
    },
    Thyristor { gate: ProbeId, anode: ProbeId, cathode: ProbeId },
    Triac { gate: ProbeId, a: ProbeId, b: ProbeId },
    Capacitor { a: ProbeId, b: ProbeId, farads: f64 },
}

/// Pull/drive state of one simulated probe pin
#[derive(Debug, Clone, Copy, Default)]
struct PinState {
    rl: Option<PullDir>,
    rh: Option<PullDir>,
    drive: Option<PinLevel>,
}

/// The simulated front end
pub struct SimFrontend {
    dut: DutModel,
    pins: [PinState; 3],
    clock_us: u64,
    /// Capacitor model state: voltage from pin a to pin b, millivolts
    cap_mv: f64,
    /// MOSFET gate voltage state, millivolts (a floating gate holds it)
    gate_mv: f64,
    /// Latch state of the thyristor/triac models; for the triac the sign
    /// selects the conduction direction
    latched: Option<bool>,
    vcc_mv: f64,
}

impl SimFrontend {
    pub fn new(dut: DutModel) -> Self {
        Self {
            dut,
            pins: [PinState::default(); 3],
            clock_us: 0,
            cap_mv: 0.0,
            gate_mv: 0.0,
            latched: None,
            vcc_mv: adc::VCC_MV as f64,
        }
    }

    /// Build from a textual DUT description, e.g. `resistor:4.7k`,
    /// `diode:650:1-2`, `npn:200`, `cap:100n`, `short`, `open`
    pub fn from_spec(spec: &str) -> Result<Self> {
        parse_dut(spec).map(Self::new)
    }

    /// Virtual time elapsed since construction
    pub fn clock_us(&self) -> u64 {
        self.clock_us
    }

    /// Preload the capacitor model with a stored voltage, to exercise the
    /// residual-charge protection of the discharge pass
    pub fn precharge(&mut self, mv: f64) {
        self.cap_mv = mv;
    }

    /// Thevenin equivalent (millivolts, ohms) of everything attached to a
    /// probe pin, None when the pin floats
    fn thevenin(&self, index: usize) -> Option<(f64, f64)> {
        let pin = &self.pins[index];
        let mut sources: Vec<(f64, f64)> = Vec::new();

        if let Some(level) = pin.drive {
            match level {
                PinLevel::High => sources.push((self.vcc_mv, DRIVER_HIGH_OHMS)),
                PinLevel::Low => sources.push((0.0, DRIVER_LOW_OHMS)),
            }
        }
        if let Some(dir) = pin.rl {
            sources.push(pull_source(self.vcc_mv, network::RL_OHMS as f64, dir));
        }
        if let Some(dir) = pin.rh {
            sources.push(pull_source(self.vcc_mv, network::RH_OHMS as f64, dir));
        }

        combine_sources(&sources)
    }

    /// Quasi-static node voltages of the three probes, millivolts
    fn node_voltages(&self) -> [f64; 3] {
        let th = [self.thevenin(0), self.thevenin(1), self.thevenin(2)];
        let mut v = [
            th[0].map_or(0.0, |(u, _)| u),
            th[1].map_or(0.0, |(u, _)| u),
            th[2].map_or(0.0, |(u, _)| u),
        ];

        match &self.dut {
            DutModel::Open => {}
            DutModel::AllShorted => {
                let attached: Vec<(f64, f64)> = th.iter().flatten().copied().collect();
                if let Some((u, _)) = combine_sources(&attached) {
                    v = [u, u, u];
                }
            }
            DutModel::Short { a, b } => {
                solve_resistor(&mut v, th, a.index(), b.index(), LEAD_OHMS);
            }
            DutModel::Resistor { a, b, ohms } => {
                solve_resistor(&mut v, th, a.index(), b.index(), ohms + LEAD_OHMS);
            }
            DutModel::Diode { anode, cathode, vf_mv } => {
                solve_diode(&mut v, th, anode.index(), cathode.index(), *vf_mv);
            }
            DutModel::AntiParallel { a, b, vf_ab_mv, vf_ba_mv } => {
                let (ai, bi) = (a.index(), b.index());
                let va = th[ai].map_or(0.0, |(u, _)| u);
                let vb = th[bi].map_or(0.0, |(u, _)| u);
                if va >= vb {
                    solve_diode(&mut v, th, ai, bi, *vf_ab_mv);
                } else {
                    solve_diode(&mut v, th, bi, ai, *vf_ba_mv);
                }
            }
            DutModel::Capacitor { a, b, .. } => {
                solve_voltage_source(&mut v, th, a.index(), b.index(), self.cap_mv, LEAD_OHMS);
            }
            DutModel::Bjt { npn, collector, base, emitter, hfe, vbe_mv } => {
                solve_bjt(
                    &mut v,
                    th,
                    *npn,
                    collector.index(),
                    base.index(),
                    emitter.index(),
                    *hfe,
                    *vbe_mv,
                    self.vcc_mv,
                );
            }
            DutModel::Mosfet { n_channel, gate, drain, source, vth_mv } => {
                self.solve_mosfet(&mut v, th, *n_channel, gate.index(), drain.index(), source.index(), *vth_mv);
            }
            DutModel::Thyristor { gate, anode, cathode } => {
                if self.latched.is_some() {
                    solve_voltage_source(&mut v, th, anode.index(), cathode.index(), SCR_VAK_MV, 1.0);
                }
                // Gate-cathode junction conducts whenever the gate is driven.
                let ki = cathode.index();
                let vk = v[ki];
                if let Some((ug, rg)) = th[gate.index()] {
                    let ig = junction_current(ug - vk, rg, SCR_VGK_MV);
                    v[gate.index()] = if ig > 0.0 { vk + vf_at(SCR_VGK_MV, ig) } else { ug };
                } else {
                    v[gate.index()] = vk;
                }
            }
            DutModel::Triac { gate, a, b } => {
                match self.latched {
                    Some(true) => solve_voltage_source(&mut v, th, a.index(), b.index(), SCR_VAK_MV, 1.0),
                    Some(false) => solve_voltage_source(&mut v, th, b.index(), a.index(), SCR_VAK_MV, 1.0),
                    None => {}
                }
                let vref = v[a.index()].min(v[b.index()]);
                if let Some((ug, rg)) = th[gate.index()] {
                    let ig = junction_current(ug - vref, rg, SCR_VGK_MV);
                    v[gate.index()] = if ig > 0.0 { vref + vf_at(SCR_VGK_MV, ig) } else { ug };
                } else {
                    v[gate.index()] = vref;
                }
            }
        }

        v
    }

    fn solve_mosfet(
        &self,
        v: &mut [f64; 3],
        th: [Option<(f64, f64)>; 3],
        n_channel: bool,
        gi: usize,
        di: usize,
        si: usize,
        vth_mv: f64,
    ) {
        // Insulated gate: the node follows the stored gate charge.
        v[gi] = self.gate_mv;

        let vs = th[si].map_or(0.0, |(u, _)| u);
        let vgs = if n_channel {
            self.gate_mv - vs
        } else {
            vs - self.gate_mv
        };

        if vgs > vth_mv {
            solve_resistor(v, th, di, si, RDS_ON_OHMS);
            v[gi] = self.gate_mv;
        } else {
            // Channel off; the body diode still conducts source to drain
            // (drain to source for P-channel).
            if n_channel {
                solve_diode(v, th, si, di, 700.0);
            } else {
                solve_diode(v, th, di, si, 700.0);
            }
            v[gi] = self.gate_mv;
        }
    }

    /// Advance the virtual clock and every stateful model element
    fn advance(&mut self, dt_us: u64) {
        self.clock_us += dt_us;
        let dt_s = dt_us as f64 * 1e-6;

        if let DutModel::Capacitor { a, b, farads } = &self.dut {
            // RC relaxation toward the open-circuit voltage across the cap.
            let (ai, bi) = (a.index(), b.index());
            match (self.thevenin(ai), self.thevenin(bi)) {
                (Some((ua, ra)), Some((ub, rb))) => {
                    let target = ua - ub;
                    let tau = (ra + rb + LEAD_OHMS) * farads;
                    self.cap_mv += (target - self.cap_mv) * (1.0 - (-dt_s / tau).exp());
                }
                _ => {
                    // One or both plates floating: charge is retained.
                }
            }
        }

        if let DutModel::Mosfet { gate, .. } = &self.dut {
            if let Some((ug, rg)) = self.thevenin(gate.index()) {
                let tau = rg * GATE_CAP_F;
                self.gate_mv += (ug - self.gate_mv) * (1.0 - (-dt_s / tau).exp());
            }
        }

        self.update_latch();
    }

    /// Trigger and holding-current bookkeeping for the latch models
    fn update_latch(&mut self) {
        match &self.dut {
            DutModel::Thyristor { gate, anode, cathode } => {
                let th_g = self.thevenin(gate.index());
                let th_a = self.thevenin(anode.index());
                let th_k = self.thevenin(cathode.index());

                if self.latched.is_some() {
                    // Drop out when the anode current falls below holding.
                    let held = match (th_a, th_k) {
                        (Some((ua, ra)), Some((uk, rk))) => {
                            (ua - uk - SCR_VAK_MV) / ((ra + rk + 1.0) * 1000.0) >= SCR_HOLD_A
                        }
                        _ => false,
                    };
                    if !held {
                        self.latched = None;
                    }
                } else if let (Some((ug, rg)), Some((ua, _)), Some((uk, rk))) = (th_g, th_a, th_k) {
                    let ig = junction_current(ug - uk, rg + rk, SCR_VGK_MV);
                    if ig >= SCR_TRIGGER_A && ua - uk > SCR_VAK_MV {
                        trace!("thyristor triggered");
                        self.latched = Some(true);
                    }
                }
            }
            DutModel::Triac { gate, a, b } => {
                let th_g = self.thevenin(gate.index());
                let th_a = self.thevenin(a.index());
                let th_b = self.thevenin(b.index());

                if let Some(dir) = self.latched {
                    let (hi, lo) = if dir { (th_a, th_b) } else { (th_b, th_a) };
                    let held = match (hi, lo) {
                        (Some((uh, rh)), Some((ul, rl))) => {
                            (uh - ul - SCR_VAK_MV) / ((rh + rl + 1.0) * 1000.0) >= SCR_HOLD_A
                        }
                        _ => false,
                    };
                    if !held {
                        self.latched = None;
                    }
                } else if let (Some((ug, rg)), Some((ua, _)), Some((ub, _))) = (th_g, th_a, th_b) {
                    // A triac triggers from gate current of either sign,
                    // referenced to the lower main terminal.
                    let vref = ua.min(ub);
                    let ig = junction_current((ug - vref).abs(), rg, SCR_VGK_MV);
                    let bias = ua - ub;
                    if ig >= SCR_TRIGGER_A && bias.abs() > SCR_VAK_MV {
                        trace!(direction = bias > 0.0, "triac triggered");
                        self.latched = Some(bias > 0.0);
                    }
                }
            }
            _ => {}
        }
    }
}

impl AnalogFrontend for SimFrontend {
    fn read_adc(&mut self, channel: u8, bandgap: bool) -> u16 {
        self.update_latch();
        let mv = if channel == adc::BANDGAP_CHANNEL {
            adc::BANDGAP_MV as f64
        } else {
            let index = crate::hw::probe::PROBE_PINS
                .iter()
                .position(|p| p.adc_channel == channel)
                .unwrap_or(0);
            self.node_voltages()[index]
        };

        let vref = if bandgap {
            adc::BANDGAP_MV as f64
        } else {
            self.vcc_mv
        };
        let counts = (mv / vref * adc::FULL_SCALE as f64) as i64;
        counts.clamp(0, adc::FULL_SCALE as i64 - 1) as u16
    }

    fn set_pull(&mut self, probe: ProbeId, class: PullClass, dir: PullDir) {
        let slot = match class {
            PullClass::Low => &mut self.pins[probe.index()].rl,
            PullClass::High => &mut self.pins[probe.index()].rh,
        };
        *slot = match dir {
            PullDir::Off => None,
            d => Some(d),
        };
    }

    fn set_drive(&mut self, probe: ProbeId, level: PinLevel) {
        self.pins[probe.index()].drive = Some(level);
    }

    fn set_hiz(&mut self, probe: ProbeId) {
        self.pins[probe.index()].drive = None;
    }

    fn delay_us(&mut self, us: u32) {
        self.advance(us as u64);
    }
}

/// Thevenin source of one pull resistor
fn pull_source(vcc_mv: f64, r_ohms: f64, dir: PullDir) -> (f64, f64) {
    match dir {
        PullDir::Up => (vcc_mv, r_ohms + DRIVER_HIGH_OHMS),
        _ => (0.0, r_ohms + DRIVER_LOW_OHMS),
    }
}

/// Parallel combination of Thevenin sources
fn combine_sources(sources: &[(f64, f64)]) -> Option<(f64, f64)> {
    if sources.is_empty() {
        return None;
    }
    let mut g_total = 0.0;
    let mut weighted = 0.0;
    for &(u, r) in sources {
        let g = 1.0 / r;
        g_total += g;
        weighted += u * g;
    }
    Some((weighted / g_total, 1.0 / g_total))
}

/// Resistor between two nodes; untouched nodes keep their Thevenin voltage
fn solve_resistor(
    v: &mut [f64; 3],
    th: [Option<(f64, f64)>; 3],
    ai: usize,
    bi: usize,
    ohms: f64,
) {
    match (th[ai], th[bi]) {
        (Some((ua, ra)), Some((ub, rb))) => {
            let i = (ua - ub) / ((ra + rb + ohms) * 1000.0); // amps
            v[ai] = ua - i * ra * 1000.0;
            v[bi] = ub + i * rb * 1000.0;
        }
        (Some((ua, _)), None) => {
            v[ai] = ua;
            v[bi] = ua; // no current, no drop
        }
        (None, Some((ub, _))) => {
            v[bi] = ub;
            v[ai] = ub;
        }
        (None, None) => {}
    }
}

/// Ideal voltage source (capacitor plate voltage, latch on-state) with a
/// small series resistance between two nodes
fn solve_voltage_source(
    v: &mut [f64; 3],
    th: [Option<(f64, f64)>; 3],
    ai: usize,
    bi: usize,
    source_mv: f64,
    series_ohms: f64,
) {
    match (th[ai], th[bi]) {
        (Some((ua, ra)), Some((ub, rb))) => {
            let i = (ua - ub - source_mv) / ((ra + rb + series_ohms) * 1000.0);
            v[ai] = ua - i * ra * 1000.0;
            v[bi] = ub + i * rb * 1000.0;
        }
        (Some((ua, _)), None) => {
            v[ai] = ua;
            v[bi] = ua - source_mv;
        }
        (None, Some((ub, _))) => {
            v[bi] = ub;
            v[ai] = ub + source_mv;
        }
        (None, None) => {
            v[ai] = source_mv.max(0.0);
            v[bi] = 0.0;
        }
    }
}

/// Forward voltage of a junction at the given current, millivolts
fn vf_at(vf_nominal_mv: f64, i_a: f64) -> f64 {
    if i_a <= 0.0 {
        return 0.0;
    }
    (vf_nominal_mv + SLOPE_MV_PER_DECADE * (i_a / VF_REF_CURRENT_A).log10()).max(0.0)
}

/// Junction current through a source resistance, solved by bisection on
/// `delta = I*R + Vf(I)`; zero when the junction blocks
fn junction_current(delta_mv: f64, r_ohms: f64, vf_nominal_mv: f64) -> f64 {
    if delta_mv <= 0.0 {
        return 0.0;
    }
    let f = |i: f64| delta_mv - i * r_ohms * 1000.0 - vf_at(vf_nominal_mv, i);
    if f(1e-9) <= 0.0 {
        return 0.0; // blocked below nanoamp leakage
    }

    let mut lo = 1e-9;
    let mut hi = delta_mv / (r_ohms * 1000.0);
    for _ in 0..60 {
        let mid = (lo + hi) / 2.0;
        if f(mid) > 0.0 {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    (lo + hi) / 2.0
}

/// Diode between two nodes, anode at `ai`
fn solve_diode(v: &mut [f64; 3], th: [Option<(f64, f64)>; 3], ai: usize, ci: usize, vf_mv: f64) {
    match (th[ai], th[ci]) {
        (Some((ua, ra)), Some((uc, rc))) => {
            let i = junction_current(ua - uc, ra + rc, vf_mv);
            if i > 0.0 {
                v[ai] = ua - i * ra * 1000.0;
                v[ci] = uc + i * rc * 1000.0;
            }
        }
        (Some((ua, _)), None) => {
            // No current path: leakage equalizes the floating node.
            v[ai] = ua;
            v[ci] = ua;
        }
        (None, Some((uc, _))) => {
            v[ci] = uc;
            v[ai] = uc;
        }
        (None, None) => {}
    }
}

/// Bipolar transistor: base-emitter junction plus a saturating collector
/// current sink. PNP devices are solved as their mirror image around Vcc.
#[allow(clippy::too_many_arguments)]
fn solve_bjt(
    v: &mut [f64; 3],
    th: [Option<(f64, f64)>; 3],
    npn: bool,
    ci: usize,
    bi: usize,
    ei: usize,
    hfe: f64,
    vbe_mv: f64,
    vcc_mv: f64,
) {
    let mirror = |opt: Option<(f64, f64)>| opt.map(|(u, r)| (vcc_mv - u, r));
    let th_eff: [Option<(f64, f64)>; 3] = if npn {
        th
    } else {
        [mirror(th[0]), mirror(th[1]), mirror(th[2])]
    };

    let mut veff = [
        th_eff[0].map_or(0.0, |(u, _)| u),
        th_eff[1].map_or(0.0, |(u, _)| u),
        th_eff[2].map_or(0.0, |(u, _)| u),
    ];

    match (th_eff[ci], th_eff[bi], th_eff[ei]) {
        (_, None, _) => {
            // Base floating: everything blocks; floating nodes follow the
            // emitter side through leakage.
            let settle = th_eff[ei].or(th_eff[ci]).map_or(0.0, |(u, _)| u);
            if th_eff[ci].is_none() {
                veff[ci] = settle;
            }
            if th_eff[ei].is_none() {
                veff[ei] = settle;
            }
            veff[bi] = th_eff[bi].map_or(settle, |(u, _)| u);
        }
        (Some((uc, rc)), Some((ub, rb)), None) => {
            // Emitter floating: only the base-collector junction is
            // reachable - this is what the diode scan sees.
            let i = junction_current(ub - uc, rb + rc, vbe_mv);
            if i > 0.0 {
                veff[bi] = ub - i * rb * 1000.0;
                veff[ci] = uc + i * rc * 1000.0;
            }
            veff[ei] = veff[bi] - vf_at(vbe_mv, 1e-9);
        }
        (None, Some((ub, rb)), Some((ue, re))) => {
            // Collector floating: plain base-emitter junction.
            let i = junction_current(ub - ue, rb + re, vbe_mv);
            if i > 0.0 {
                veff[bi] = ub - i * rb * 1000.0;
                veff[ei] = ue + i * re * 1000.0;
            }
            veff[ci] = veff[bi];
        }
        (None, Some(_), None) => {
            // Only the base is connected: no junction has both terminals
            // reachable, so nothing conducts and the nodes keep their
            // default voltages (base at its source, others at leakage zero).
        }
        (Some((uc, rc)), Some((ub, rb)), Some((ue, re))) => {
            // Bisect the base node: the base network current must equal
            // the sum of the base-emitter and base-collector junction
            // currents, each solved through its own series resistance.
            let currents = |vb: f64| {
                let i_be = junction_current(vb - ue, re, vbe_mv);
                let i_bc = junction_current(vb - uc, rc, vbe_mv);
                let ve_est = ue + i_be * re * 1000.0;
                let ic_sat = ((uc - (ve_est + VCE_SAT_MV)) / (rc * 1000.0)).max(0.0);
                let ic = (hfe * i_be).min(ic_sat);
                (i_be, i_bc, ic)
            };
            let mismatch = |vb: f64| {
                let (i_be, i_bc, _) = currents(vb);
                (ub - vb) / (rb * 1000.0) - i_be - i_bc
            };

            let mut lo = ue.min(uc).min(ub);
            let mut hi = ub.max(lo);
            if mismatch(lo) <= 0.0 {
                hi = lo; // base network cannot source anything
            }
            for _ in 0..60 {
                let mid = (lo + hi) / 2.0;
                if mismatch(mid) > 0.0 {
                    lo = mid;
                } else {
                    hi = mid;
                }
            }
            let vb = (lo + hi) / 2.0;
            let (i_be, i_bc, ic) = currents(vb);

            veff[bi] = vb;
            veff[ei] = ue + (i_be + ic) * re * 1000.0;
            veff[ci] = uc - (ic - i_bc) * rc * 1000.0;
        }
    }

    for i in 0..3 {
        v[i] = if npn { veff[i] } else { vcc_mv - veff[i] };
    }
}

// ============================================================================
// DUT description parsing
// ============================================================================

/// Parse a textual DUT description.
///
/// Grammar: `kind[:param][:pins]` where pins is like `1-2`. Values accept
/// SI suffixes (`4.7k`, `100n`, `2M`).
pub fn parse_dut(spec: &str) -> Result<DutModel> {
    let parts: Vec<&str> = spec.split(':').collect();
    let kind = parts[0].to_ascii_lowercase();

    let p = |i: u8| ProbeId::from_index(i);

    match kind.as_str() {
        "open" => Ok(DutModel::Open),
        "short" => match parts.get(1) {
            None | Some(&"all") => Ok(DutModel::AllShorted),
            Some(pins) => {
                let (a, b) = parse_pins(spec, pins)?;
                Ok(DutModel::Short { a, b })
            }
        },
        "resistor" | "r" => {
            let ohms = parse_value(spec, parts.get(1).copied().ok_or_else(|| missing(spec))?)?;
            let (a, b) = parse_opt_pins(spec, parts.get(2))?;
            Ok(DutModel::Resistor { a, b, ohms })
        }
        "diode" | "d" => {
            let vf_mv = match parts.get(1) {
                Some(v) => parse_value(spec, v)?,
                None => 650.0,
            };
            let (anode, cathode) = parse_opt_pins(spec, parts.get(2))?;
            Ok(DutModel::Diode { anode, cathode, vf_mv })
        }
        "led" => {
            let (anode, cathode) = parse_opt_pins(spec, parts.get(1))?;
            Ok(DutModel::Diode { anode, cathode, vf_mv: 1900.0 })
        }
        "antiparallel" => {
            let (a, b) = parse_opt_pins(spec, parts.get(1))?;
            Ok(DutModel::AntiParallel { a, b, vf_ab_mv: 650.0, vf_ba_mv: 650.0 })
        }
        "npn" | "pnp" => {
            let hfe = match parts.get(1) {
                Some(v) => parse_value(spec, v)?,
                None => 200.0,
            };
            Ok(DutModel::Bjt {
                npn: kind == "npn",
                collector: p(0),
                base: p(1),
                emitter: p(2),
                hfe,
                vbe_mv: 650.0,
            })
        }
        "nmos" | "pmos" => {
            let vth_mv = match parts.get(1) {
                Some(v) => parse_value(spec, v)?,
                None => 2000.0,
            };
            Ok(DutModel::Mosfet {
                n_channel: kind == "nmos",
                drain: p(0),
                gate: p(1),
                source: p(2),
                vth_mv,
            })
        }
        "thyristor" | "scr" => Ok(DutModel::Thyristor {
            anode: p(0),
            gate: p(1),
            cathode: p(2),
        }),
        "triac" => Ok(DutModel::Triac {
            a: p(0),
            gate: p(1),
            b: p(2),
        }),
        "capacitor" | "cap" | "c" => {
            let farads = parse_value(spec, parts.get(1).copied().ok_or_else(|| missing(spec))?)?;
            let (a, b) = parse_opt_pins(spec, parts.get(2))?;
            Ok(DutModel::Capacitor { a, b, farads })
        }
        _ => Err(PartscopeError::invalid_dut(spec, format!("unknown kind '{kind}'"))),
    }
}

fn missing(spec: &str) -> PartscopeError {
    PartscopeError::invalid_dut(spec, "missing value")
}

/// Parse a value with an optional SI suffix
fn parse_value(spec: &str, text: &str) -> Result<f64> {
    let re = Regex::new(r"^([0-9]+(?:\.[0-9]+)?)\s*([pnumkM]?)$").expect("static regex");
    let caps = re
        .captures(text.trim())
        .ok_or_else(|| PartscopeError::invalid_dut(spec, format!("bad value '{text}'")))?;

    let number: f64 = caps[1].parse().expect("matched digits");
    let multiplier = match &caps[2] {
        "p" => 1e-12,
        "n" => 1e-9,
        "u" => 1e-6,
        "m" => 1e-3,
        "k" => 1e3,
        "M" => 1e6,
        _ => 1.0,
    };
    Ok(number * multiplier)
}

fn parse_opt_pins(spec: &str, part: Option<&&str>) -> Result<(ProbeId, ProbeId)> {
    match part {
        Some(pins) => parse_pins(spec, pins),
        None => Ok((ProbeId::from_index(0), ProbeId::from_index(1))),
    }
}

/// Parse a `1-2` style probe pair (user-facing numbers)
fn parse_pins(spec: &str, text: &str) -> Result<(ProbeId, ProbeId)> {
    let err = || PartscopeError::invalid_dut(spec, format!("bad pins '{text}'"));
    let (a, b) = text.split_once('-').ok_or_else(err)?;
    let a: u8 = a.parse().map_err(|_| err())?;
    let b: u8 = b.parse().map_err(|_| err())?;
    if !(1..=3).contains(&a) || !(1..=3).contains(&b) || a == b {
        return Err(err());
    }
    Ok((ProbeId::from_index(a - 1), ProbeId::from_index(b - 1)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(i: u8) -> ProbeId {
        ProbeId::from_index(i)
    }

    #[test]
    fn test_parse_dut_specs() {
        assert_eq!(parse_dut("open").unwrap(), DutModel::Open);
        assert_eq!(parse_dut("short").unwrap(), DutModel::AllShorted);
        assert_eq!(
            parse_dut("resistor:4.7k:1-3").unwrap(),
            DutModel::Resistor { a: p(0), b: p(2), ohms: 4700.0 }
        );
        assert_eq!(
            parse_dut("cap:100n").unwrap(),
            DutModel::Capacitor { a: p(0), b: p(1), farads: 100e-9 }
        );
        assert!(matches!(
            parse_dut("npn:350").unwrap(),
            DutModel::Bjt { npn: true, hfe, .. } if hfe == 350.0
        ));
        assert!(parse_dut("resistor").is_err());
        assert!(parse_dut("frobnicator:12").is_err());
        assert!(parse_dut("resistor:10:1-1").is_err());
    }

    #[test]
    fn test_resistor_divider_voltage() {
        // 330 Ω between probes 1-2, probe 1 pulled up through Rl, probe 2
        // driven low: the divider should sit near 1.66 V.
        let mut sim = SimFrontend::new(parse_dut("resistor:330").unwrap());
        sim.set_drive(p(1), PinLevel::Low);
        sim.set_pull(p(0), PullClass::Low, PullDir::Up);
        sim.delay_us(1000);

        let raw = sim.read_adc(0, false);
        let mv = raw as u32 * 5000 / 1024;
        assert!((1600..1720).contains(&mv), "divider voltage {mv} mV");
    }

    #[test]
    fn test_open_probe_reads_rail() {
        let mut sim = SimFrontend::new(DutModel::Open);
        sim.set_pull(p(0), PullClass::High, PullDir::Up);
        assert_eq!(sim.read_adc(0, false), 1023);
        sim.set_pull(p(0), PullClass::High, PullDir::Down);
        assert_eq!(sim.read_adc(0, false), 0);
    }

    #[test]
    fn test_diode_blocks_reverse() {
        let mut sim = SimFrontend::new(parse_dut("diode:650").unwrap());
        // Forward: anode (probe 1) pulled up, cathode grounded.
        sim.set_drive(p(1), PinLevel::Low);
        sim.set_pull(p(0), PullClass::Low, PullDir::Up);
        let forward = sim.read_adc(0, false) as u32 * 5000 / 1024;
        assert!((600..900).contains(&forward), "forward {forward} mV");

        // Reverse: cathode pulled up, anode grounded: rail voltage.
        sim.set_hiz(p(1));
        sim.set_pull(p(0), PullClass::Low, PullDir::Off);
        sim.set_drive(p(0), PinLevel::Low);
        sim.set_pull(p(1), PullClass::Low, PullDir::Up);
        let reverse = sim.read_adc(1, false) as u32 * 5000 / 1024;
        assert!(reverse > 4900, "reverse {reverse} mV");
    }

    #[test]
    fn test_capacitor_charges_through_rl() {
        let mut sim = SimFrontend::new(parse_dut("cap:100n").unwrap());
        sim.set_drive(p(1), PinLevel::Low);
        sim.set_pull(p(0), PullClass::Low, PullDir::Up);

        // tau = ~703 Ω x 100 nF = 70 µs; after one tau the plate sits
        // near 63% of the rail.
        sim.delay_us(70);
        let mv = sim.read_adc(0, false) as u32 * 5000 / 1024;
        assert!((2900..3400).contains(&mv), "one-tau voltage {mv} mV");

        sim.delay_us(100_000);
        let mv = sim.read_adc(0, false) as u32 * 5000 / 1024;
        assert!(mv > 4900, "fully charged {mv} mV");
    }

    #[test]
    fn test_npn_conducts_with_base_drive() {
        let mut sim = SimFrontend::new(parse_dut("npn:200").unwrap());
        // C=1, B=2, E=3.
        sim.set_drive(p(2), PinLevel::Low);
        sim.set_pull(p(0), PullClass::Low, PullDir::Up);
        sim.delay_us(1000);
        let off = sim.read_adc(0, false) as u32 * 5000 / 1024;
        assert!(off > 4900, "collector floating high, got {off}");

        sim.set_pull(p(1), PullClass::Low, PullDir::Up);
        sim.delay_us(1000);
        let on = sim.read_adc(0, false) as u32 * 5000 / 1024;
        assert!(on < 600, "collector saturated, got {on}");
    }

    #[test]
    fn test_thyristor_latches_until_interrupted() {
        let mut sim = SimFrontend::new(parse_dut("scr").unwrap());
        // A=1, G=2, C=3.
        sim.set_drive(p(2), PinLevel::Low);
        sim.set_pull(p(0), PullClass::Low, PullDir::Up);
        sim.delay_us(1000);
        assert!(sim.latched.is_none());

        // Gate pulse through Rl.
        sim.set_pull(p(1), PullClass::Low, PullDir::Up);
        sim.delay_us(1000);
        assert!(sim.latched.is_some());

        // Removing the gate keeps the latch.
        sim.set_pull(p(1), PullClass::Low, PullDir::Off);
        sim.delay_us(1000);
        assert!(sim.latched.is_some());

        // Interrupting the anode current drops it out.
        sim.set_pull(p(0), PullClass::Low, PullDir::Off);
        sim.delay_us(1000);
        assert!(sim.latched.is_none());
    }
}
