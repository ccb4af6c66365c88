//! Measurement routines, implemented as methods on [`crate::Instrument`]
//!
//! Each module owns one measurement technique; all of them share the
//! settle/idle discipline of the probe network and the candidate lists of
//! the classification session.

pub mod capacitance;
pub mod diode;
pub mod resistance;
pub mod transistor;
