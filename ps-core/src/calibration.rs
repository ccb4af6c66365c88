//! Calibration record and persistent store
//!
//! The front end's internal driver resistances, the probe-lead zero offset,
//! the stray-capacitance offset and the reference trims are measured once
//! by self calibration and persisted as a fixed 10-byte little-endian
//! record guarded by an additive checksum (low byte of the sum of the other
//! nine bytes). A mismatch on load falls back silently to the hard-coded
//! defaults; the caller only sees `valid = false`.
//!
//! A process-wide read cache mirrors the settings cache pattern: loads hit
//! the disk once, saves refresh the cache.

use std::fs;
use std::path::PathBuf;
use std::sync::{OnceLock, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::constants::network;
use crate::error::{PartscopeError, Result};

/// Size of the on-disk record: six fields plus the checksum byte
pub const RECORD_LEN: usize = 10;

/// Persistent calibration values for one front end.
///
/// Resistances are in 0.1 Ω units except `r_zero` (0.01 Ω); `cap_zero` is
/// picofarads; the trims are signed millivolt offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Internal driver resistance in pull-down mode, 0.1 Ω units
    pub ri_low: u16,
    /// Internal driver resistance in pull-up mode, 0.1 Ω units
    pub ri_high: u16,
    /// Probe-lead resistance subtracted from pulsed measurements, 0.01 Ω units
    pub r_zero: u16,
    /// Stray capacitance subtracted from capacitance results, picofarads
    pub cap_zero: u8,
    /// Bandgap reference trim, millivolts
    pub ref_offset: i8,
    /// Analog comparator offset trim, millivolts
    pub comp_offset: i8,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            ri_low: network::DEFAULT_RI_LOW_01,
            ri_high: network::DEFAULT_RI_HIGH_01,
            r_zero: network::DEFAULT_R_ZERO_001,
            cap_zero: network::DEFAULT_CAP_ZERO_PF,
            ref_offset: 0,
            comp_offset: 0,
        }
    }
}

impl CalibrationConfig {
    /// Serialize to the fixed record layout, checksum last
    pub fn to_bytes(&self) -> [u8; RECORD_LEN] {
        let mut buf = [0u8; RECORD_LEN];
        buf[0..2].copy_from_slice(&self.ri_low.to_le_bytes());
        buf[2..4].copy_from_slice(&self.ri_high.to_le_bytes());
        buf[4..6].copy_from_slice(&self.r_zero.to_le_bytes());
        buf[6] = self.cap_zero;
        buf[7] = self.ref_offset as u8;
        buf[8] = self.comp_offset as u8;
        buf[9] = checksum(&buf[..RECORD_LEN - 1]);
        buf
    }

    /// Parse a record, returning None on checksum mismatch
    pub fn from_bytes(buf: &[u8; RECORD_LEN]) -> Option<Self> {
        if checksum(&buf[..RECORD_LEN - 1]) != buf[RECORD_LEN - 1] {
            return None;
        }
        Some(Self {
            ri_low: u16::from_le_bytes([buf[0], buf[1]]),
            ri_high: u16::from_le_bytes([buf[2], buf[3]]),
            r_zero: u16::from_le_bytes([buf[4], buf[5]]),
            cap_zero: buf[6],
            ref_offset: buf[7] as i8,
            comp_offset: buf[8] as i8,
        })
    }
}

/// Additive checksum: low byte of the byte sum (not a CRC)
fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

// ============================================================================
// Cached calibration (avoid disk I/O on every access)
// ============================================================================

static CAL_CACHE: OnceLock<RwLock<Option<CalibrationConfig>>> = OnceLock::new();

fn cache() -> &'static RwLock<Option<CalibrationConfig>> {
    CAL_CACHE.get_or_init(|| RwLock::new(None))
}

/// Drop the cached record so the next access reloads from disk
pub fn invalidate_calibration_cache() {
    if let Ok(mut guard) = cache().write() {
        *guard = None;
    }
}

/// Persistent store for the calibration record
pub struct CalibrationStore {
    path: PathBuf,
}

impl CalibrationStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default store location under the user config directory
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("partscope").join("frontend.cal"))
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Load the record, falling back to defaults on any failure.
    ///
    /// Returns the config plus a validity flag; a missing or corrupt store
    /// is not an error (the defaults match the reference hardware), but the
    /// caller may want to surface a "Checksum Error" notice.
    pub fn load(&self) -> (CalibrationConfig, bool) {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "no calibration store, using defaults");
                return (CalibrationConfig::default(), false);
            }
        };

        let buf: [u8; RECORD_LEN] = match raw.as_slice().try_into() {
            Ok(buf) => buf,
            Err(_) => {
                warn!(
                    path = %self.path.display(),
                    len = raw.len(),
                    "calibration record has wrong size, using defaults"
                );
                return (CalibrationConfig::default(), false);
            }
        };

        match CalibrationConfig::from_bytes(&buf) {
            Some(cfg) => (cfg, true),
            None => {
                warn!(path = %self.path.display(), "calibration checksum mismatch, using defaults");
                (CalibrationConfig::default(), false)
            }
        }
    }

    /// Load through the process-wide cache
    pub fn load_cached(&self) -> CalibrationConfig {
        if let Ok(guard) = cache().read() {
            if let Some(cfg) = *guard {
                return cfg;
            }
        }
        let (cfg, _) = self.load();
        if let Ok(mut guard) = cache().write() {
            *guard = Some(cfg);
        }
        cfg
    }

    /// Write the whole record atomically (all fields plus a recomputed
    /// checksum, staged to a temp file and renamed into place) and refresh
    /// the cache
    pub fn save(&self, cfg: &CalibrationConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| PartscopeError::FileWrite {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let tmp = self.path.with_extension("cal.tmp");
        fs::write(&tmp, cfg.to_bytes()).map_err(|source| PartscopeError::FileWrite {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &self.path).map_err(|source| PartscopeError::FileWrite {
            path: self.path.clone(),
            source,
        })?;

        if let Ok(mut guard) = cache().write() {
            *guard = Some(*cfg);
        }
        debug!(path = %self.path.display(), "calibration saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    fn sample() -> CalibrationConfig {
        CalibrationConfig {
            ri_low: 192,
            ri_high: 228,
            r_zero: 31,
            cap_zero: 42,
            ref_offset: -8,
            comp_offset: 3,
        }
    }

    #[test]
    #[serial]
    fn test_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = CalibrationStore::new(dir.path().join("frontend.cal"));
        store.save(&sample()).unwrap();

        let (loaded, valid) = store.load();
        assert!(valid);
        assert_eq!(loaded, sample());
    }

    #[test]
    #[serial]
    fn test_single_byte_corruption_falls_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("frontend.cal");
        let store = CalibrationStore::new(&path);
        store.save(&sample()).unwrap();

        let good = fs::read(&path).unwrap();
        for i in 0..RECORD_LEN {
            let mut bad = good.clone();
            bad[i] ^= 0x5a;
            fs::write(&path, &bad).unwrap();

            let (loaded, valid) = store.load();
            assert!(!valid, "corrupting byte {i} must fail the checksum");
            assert_eq!(loaded, CalibrationConfig::default());
        }
    }

    #[test]
    #[serial]
    fn test_wrong_size_falls_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("frontend.cal");
        fs::write(&path, [0u8; 7]).unwrap();

        let (loaded, valid) = CalibrationStore::new(&path).load();
        assert!(!valid);
        assert_eq!(loaded, CalibrationConfig::default());
    }

    #[test]
    #[serial]
    fn test_missing_store_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let store = CalibrationStore::new(dir.path().join("nope.cal"));
        let (loaded, valid) = store.load();
        assert!(!valid);
        assert_eq!(loaded, CalibrationConfig::default());
    }

    #[test]
    #[serial]
    fn test_cache_refreshes_on_save() {
        let dir = TempDir::new().unwrap();
        let store = CalibrationStore::new(dir.path().join("frontend.cal"));

        invalidate_calibration_cache();
        let first = store.load_cached();
        assert_eq!(first, CalibrationConfig::default());

        store.save(&sample()).unwrap();
        assert_eq!(store.load_cached(), sample());

        invalidate_calibration_cache();
        assert_eq!(store.load_cached(), sample());
    }
}
