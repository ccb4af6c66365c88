//! Unified error handling for Partscope
//!
//! This crate provides a single error type used across all Partscope
//! components. It uses thiserror for ergonomic error definitions with proper
//! Display and Error trait impls.

use std::io;
use std::path::PathBuf;

/// Result type alias using PartscopeError
pub type Result<T> = std::result::Result<T, PartscopeError>;

/// Unified error type for all Partscope operations
#[derive(thiserror::Error, Debug)]
pub enum PartscopeError {
    // ============================================================================
    // I/O and File System Errors
    // ============================================================================
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: io::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: io::Error,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    // ============================================================================
    // Calibration Store Errors
    // ============================================================================
    #[error("Calibration record checksum mismatch in {path}")]
    CalibrationChecksum {
        path: PathBuf,
    },

    #[error("Calibration record in {path} has wrong size: {len} bytes (expected {expected})")]
    CalibrationSize {
        path: PathBuf,
        len: usize,
        expected: usize,
    },

    #[error("Self-calibration failed: {0}")]
    CalibrationRejected(String),

    #[error("No calibration store location available")]
    NoStoreLocation,

    // ============================================================================
    // Measurement Errors
    // ============================================================================
    /// Probes carry residual charge or an external voltage; all
    /// current-driving measurements are blocked until this clears.
    #[error("Probe {probe} is not safely discharged")]
    ProbesNotDischarged {
        probe: u8,
    },

    #[error("Probes must be connected together for this step")]
    ProbesNotShorted,

    #[error("Probes must be disconnected for this step")]
    ProbesNotOpen,

    // ============================================================================
    // Bench / Simulation Errors
    // ============================================================================
    #[error("Invalid device description '{spec}': {reason}")]
    InvalidDutSpec {
        spec: String,
        reason: String,
    },

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Generic(String),

    #[error("Operation not supported: {0}")]
    NotSupported(String),
}

impl PartscopeError {
    /// Create a generic error from a string
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic(msg.into())
    }

    /// Create an invalid-DUT-spec error
    pub fn invalid_dut(spec: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDutSpec {
            spec: spec.into(),
            reason: reason.into(),
        }
    }

    /// Create a self-calibration rejection from a string
    pub fn calibration(msg: impl Into<String>) -> Self {
        Self::CalibrationRejected(msg.into())
    }
}

// Allow converting from String to PartscopeError
impl From<String> for PartscopeError {
    fn from(s: String) -> Self {
        Self::Generic(s)
    }
}

// Allow converting from &str to PartscopeError
impl From<&str> for PartscopeError {
    fn from(s: &str) -> Self {
        Self::Generic(s.to_string())
    }
}
