//! Error types, re-exported from the shared error crate

pub use ps_error::{PartscopeError, Result};
