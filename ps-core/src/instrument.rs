//! The instrument: probe network, voltage reader and calibration bundled
//!
//! One `Instrument` owns the analog front end for the duration of the
//! process. The measurement modules (`measure::*`) and the classifier add
//! their routines as methods, so every probing sequence goes through the
//! same settle and idle-state discipline.

use tracing::{debug, warn};

use crate::calibration::CalibrationConfig;
use crate::constants::{limits, timing};
use crate::hw::adc::VoltageReader;
use crate::hw::frontend::{AnalogFrontend, PinLevel, PullClass, PullDir};
use crate::hw::probe::{ProbeId, ProbeNetwork};

/// Result of the pre-measurement discharge pass.
///
/// `Failed` blocks every current-driving measurement of the cycle: the DUT
/// either holds residual charge or an external voltage is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DischargeStatus {
    Ok,
    Failed { probe: ProbeId, mv: u16 },
}

pub struct Instrument<F: AnalogFrontend> {
    pub(crate) net: ProbeNetwork<F>,
    pub(crate) adc: VoltageReader,
    pub(crate) cal: CalibrationConfig,
    pub(crate) discharge: DischargeStatus,
}

impl<F: AnalogFrontend> Instrument<F> {
    pub fn new(fe: F, cal: CalibrationConfig) -> Self {
        let adc = VoltageReader::new(&cal);
        Self {
            net: ProbeNetwork::new(fe),
            adc,
            cal,
            discharge: DischargeStatus::Ok,
        }
    }

    pub fn calibration(&self) -> &CalibrationConfig {
        &self.cal
    }

    pub fn discharge_status(&self) -> DischargeStatus {
        self.discharge
    }

    /// Immediate averaged reading of a probe, millivolts
    pub(crate) fn read_probe(&mut self, probe: ProbeId, bandgap: bool) -> u16 {
        let channel = self.net.adc_channel(probe);
        self.adc.read(self.net.fe(), channel, bandgap)
    }

    /// Reading after the short settle (pull-direction flip level changes)
    pub(crate) fn read_probe_settled_minor(&mut self, probe: ProbeId, bandgap: bool) -> u16 {
        let channel = self.net.adc_channel(probe);
        self.adc.read_settled_minor(self.net.fe(), channel, bandgap)
    }

    /// Reading after the long settle; required after network reconfiguration
    pub(crate) fn read_probe_settled_major(&mut self, probe: ProbeId, bandgap: bool) -> u16 {
        let channel = self.net.adc_channel(probe);
        self.adc.read_settled_major(self.net.fe(), channel, bandgap)
    }

    /// Drain residual charge from all probes through the Rl resistors.
    ///
    /// Polls until every probe reads below the empty threshold or the
    /// budget runs out; a probe still holding voltage afterwards marks the
    /// cycle as not safely discharged.
    pub fn discharge_probes(&mut self) -> DischargeStatus {
        self.net.idle_all();
        for probe in ProbeId::ALL {
            self.net.set_pull_resistor(probe, PullClass::Low, PullDir::Down);
        }

        let mut elapsed_ms = 0;
        let status = loop {
            self.net.fe().delay_us(timing::DISCHARGE_POLL_MS * 1000);
            elapsed_ms += timing::DISCHARGE_POLL_MS;

            let mut worst: Option<(ProbeId, u16)> = None;
            for probe in ProbeId::ALL {
                let mv = self.read_probe(probe, false);
                if mv >= timing::DISCHARGE_DONE_MV {
                    match worst {
                        Some((_, w)) if w >= mv => {}
                        _ => worst = Some((probe, mv)),
                    }
                }
            }

            match worst {
                None => break DischargeStatus::Ok,
                Some((probe, mv)) if elapsed_ms >= timing::DISCHARGE_TIMEOUT_MS => {
                    warn!(probe = %probe, mv, "probe not discharged");
                    break DischargeStatus::Failed { probe, mv };
                }
                Some(_) => {}
            }
        };

        self.net.idle_all();
        self.discharge = status;
        status
    }

    /// Count probe pairs that read as direct shorts.
    ///
    /// A short leaves only the driver resistances in the Rl divider, so the
    /// sourced probe collapses to a few hundred millivolts. Three shorted
    /// pairs means all probes are tied together - the "enter menu" gesture.
    pub fn all_probes_shorted(&mut self) -> u8 {
        let mut count = 0;
        for (a, b) in [(0u8, 1u8), (0, 2), (1, 2)] {
            let high = ProbeId::from_index(a);
            let low = ProbeId::from_index(b);

            self.net.set_direct_drive(low, PinLevel::Low);
            self.net.set_pull_resistor(high, PullClass::Low, PullDir::Up);
            let mv = self.read_probe_settled_major(high, false);
            if mv <= limits::SHORTED_PAIR_MAX_MV {
                count += 1;
            }

            self.net.idle_all();
        }
        debug!(count, "shorted pair check");
        count
    }
}
