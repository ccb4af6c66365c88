//! Hardware interaction: the analog front end port, the probe network,
//! the averaging voltage reader, and the simulated front end

pub mod adc;
pub mod frontend;
pub mod probe;
pub mod sim;

pub use adc::VoltageReader;
pub use frontend::{AnalogFrontend, PinLevel, PullClass, PullDir};
pub use probe::{ProbeId, ProbeNetwork, ProbePin, PROBE_PINS};
pub use sim::{parse_dut, DutModel, SimFrontend};
