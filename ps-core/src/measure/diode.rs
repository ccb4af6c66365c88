//! Diode detection and forward-voltage measurement
//!
//! A junction is probed at two test currents roughly three decades apart:
//! ~7 mA through Rl and ~10 µA through Rh. Both forward voltages are kept
//! in the record; their difference carries the logarithmic slope the
//! classifier needs for the gain-dependent Vf display. The two-current
//! retention test is also what separates a junction from a resistor: a
//! resistor's divider voltage collapses by orders of magnitude when the
//! source resistor grows from 680 Ω to 470 kΩ, a diode's forward voltage
//! drops only by the logarithmic slope.

use tracing::debug;

use crate::classify::outcome::Diode;
use crate::classify::session::ClassificationSession;
use crate::constants::dio;
use crate::hw::frontend::{AnalogFrontend, PinLevel, PullClass, PullDir};
use crate::hw::probe::ProbeId;
use crate::instrument::Instrument;

impl<F: AnalogFrontend> Instrument<F> {
    /// Probe one anode/cathode orientation for a conducting junction and
    /// record it in the session's diode list.
    pub fn check_diode(
        &mut self,
        session: &mut ClassificationSession,
        p_anode: ProbeId,
        p_cathode: ProbeId,
    ) {
        // High test current: Rl sources ~7 mA into the junction.
        self.net.set_direct_drive(p_cathode, PinLevel::Low);
        self.net.set_pull_resistor(p_anode, PullClass::Low, PullDir::Up);
        let u_anode = self.read_probe_settled_major(p_anode, false);
        let u_sink = self.read_probe(p_cathode, false);
        let vf_high = u_anode.saturating_sub(u_sink);

        if vf_high < dio::VF_MIN_MV || vf_high > dio::VF_MAX_MV {
            self.net.idle_all();
            return;
        }

        // Drain the pair before the low-current phase: a large capacitor
        // would otherwise hold the Rl-phase voltage and fake the retention
        // test below. A junction loses nothing by this.
        if !self.discharge_pair(p_anode, p_cathode) {
            self.net.idle_all();
            return;
        }

        // Low test current: Rh sources ~10 µA; the driver drop is
        // negligible here, the anode reading is the forward voltage.
        self.net.set_direct_drive(p_cathode, PinLevel::Low);
        self.net.set_pull_resistor(p_anode, PullClass::High, PullDir::Up);
        let vf_low = self.read_probe_settled_major(p_anode, false);

        self.net.idle_all();

        // Junction test: the forward voltage must survive a three-decade
        // current reduction. Resistive conduction fails this by a mile.
        if vf_low as u32 * 2 <= vf_high as u32 || vf_low > vf_high {
            return;
        }

        debug!(anode = %p_anode, cathode = %p_cathode, vf_high, vf_low, "diode found");
        session.push_diode(Diode {
            anode: p_anode,
            cathode: p_cathode,
            vf_high_mv: vf_high,
            vf_low_mv: vf_low,
        });
    }
}
