//! Caching and profiling
//!
//! - file fingerprints deciding entry validity
//! - the locked LRU entry store with optional disk persistence
//! - the tree/result cache facade with parallel warming
//! - a labelled time and memory profiler

pub mod ast_cache;
pub mod entry;
pub mod fingerprint;
pub mod persist;
pub mod profiler;
pub mod store;

pub use ast_cache::{
    result_key, tree_key, AstCache, CacheReport, CancellationToken, OptimizeReport, WarmFailure,
    WarmReport,
};
pub use entry::{CacheEntry, Payload};
pub use fingerprint::{is_current, normalize_path, FileFingerprint, DEFAULT_MTIME_TOLERANCE_SECS};
pub use persist::DiskCache;
pub use profiler::{PerformanceProfiler, ProfileSample};
pub use store::{CacheStats, CacheStore};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// `[cache]` section of the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// With caching off every lookup misses and nothing is stored.
    pub enabled: bool,

    /// Cache directory
    pub dir: PathBuf,

    pub max_entries: usize,

    /// Byte budget in megabytes; fractional values are allowed.
    pub max_size_mb: f64,

    pub persist: bool,

    /// zstd-compress persisted entries
    pub compress: bool,

    pub mtime_tolerance_secs: f64,

    /// Fraction of the byte budget to shrink to once it is exceeded.
    pub eviction_headroom: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::from(".ast_cache"),
            max_entries: 1000,
            max_size_mb: 100.0,
            persist: true,
            compress: true,
            mtime_tolerance_secs: DEFAULT_MTIME_TOLERANCE_SECS,
            eviction_headroom: 0.9,
        }
    }
}

impl CacheConfig {
    /// Defaults without persistence.
    pub fn in_memory() -> Self {
        Self {
            persist: false,
            ..Self::default()
        }
    }

    /// Defaults persisting under `dir`.
    pub fn persistent(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    pub fn max_bytes(&self) -> usize {
        (self.max_size_mb.max(0.0) * 1024.0 * 1024.0) as usize
    }
}
