//! File identity used to decide whether a cache entry is still valid.

use crate::errors::{AnalyzerError, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, Metadata};
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Mtime differences strictly below this many seconds still count as equal.
pub const DEFAULT_MTIME_TOLERANCE_SECS: f64 = 1.0;

/// Path, modification time and size of a source file at one instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileFingerprint {
    pub path: String,
    /// Seconds since the Unix epoch.
    pub mtime: f64,
    pub size: u64,
}

impl FileFingerprint {
    pub fn compute(path: &Path) -> Result<Self> {
        let normalized = normalize_path(path);
        let metadata = fs::metadata(&normalized).map_err(|e| AnalyzerError::from_io(path, e))?;
        Ok(Self::from_metadata(
            normalized.to_string_lossy().into_owned(),
            &metadata,
        ))
    }

    pub fn from_metadata(path: String, metadata: &Metadata) -> Self {
        Self {
            path,
            mtime: metadata.modified().map(system_time_secs).unwrap_or(0.0),
            size: metadata.len(),
        }
    }

    /// Same path and size, mtimes less than `tolerance` seconds apart.
    pub fn matches(&self, other: &FileFingerprint, tolerance: f64) -> bool {
        self.path == other.path && self.size == other.size && (self.mtime - other.mtime).abs() < tolerance
    }

    /// Whether the file this fingerprint was taken from is unchanged.
    pub fn is_current(&self, tolerance: f64) -> bool {
        is_current(self, Path::new(&self.path), tolerance)
    }
}

impl PartialEq for FileFingerprint {
    fn eq(&self, other: &Self) -> bool {
        self.matches(other, DEFAULT_MTIME_TOLERANCE_SECS)
    }
}

/// True iff the file at `path` exists and its size and mtime still agree
/// with `fingerprint`.
pub fn is_current(fingerprint: &FileFingerprint, path: &Path, tolerance: f64) -> bool {
    match fs::metadata(normalize_path(path)) {
        Ok(metadata) => {
            let mtime = metadata.modified().map(system_time_secs).unwrap_or(0.0);
            metadata.len() == fingerprint.size && (mtime - fingerprint.mtime).abs() < tolerance
        }
        Err(_) => false,
    }
}

/// Absolute form of `path` with `.` and `..` resolved lexically.
///
/// Symlinks are left alone so the result does not depend on the file still
/// existing.
pub fn normalize_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

pub fn path_key(path: &Path) -> String {
    normalize_path(path).to_string_lossy().into_owned()
}

pub(crate) fn system_time_secs(time: SystemTime) -> f64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

pub(crate) fn now_secs() -> f64 {
    system_time_secs(SystemTime::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_fingerprint_tracks_changes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("module.py");
        fs::write(&path, "x = 1\n").unwrap();

        let fingerprint = FileFingerprint::compute(&path).unwrap();
        assert!(fingerprint.is_current(DEFAULT_MTIME_TOLERANCE_SECS));
        assert_eq!(fingerprint.size, 6);

        let mut file = fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "y = 2").unwrap();
        assert!(!fingerprint.is_current(DEFAULT_MTIME_TOLERANCE_SECS));
    }

    #[test]
    fn test_mtime_tolerance() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("module.py");
        fs::write(&path, "x = 1\n").unwrap();
        let fingerprint = FileFingerprint::compute(&path).unwrap();

        let file = File::options().write(true).open(&path).unwrap();
        let modified = fs::metadata(&path).unwrap().modified().unwrap();
        file.set_modified(modified + Duration::from_millis(500)).unwrap();
        assert!(is_current(&fingerprint, &path, 1.0));

        file.set_modified(modified + Duration::from_secs(5)).unwrap();
        assert!(!is_current(&fingerprint, &path, 1.0));
    }

    #[test]
    fn test_missing_file() {
        let fingerprint = FileFingerprint {
            path: "/nonexistent/module.py".to_string(),
            mtime: 0.0,
            size: 0,
        };
        assert!(!fingerprint.is_current(DEFAULT_MTIME_TOLERANCE_SECS));
        assert!(FileFingerprint::compute(Path::new("/nonexistent/module.py"))
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_equality_uses_tolerance() {
        let a = FileFingerprint {
            path: "/a.py".to_string(),
            mtime: 100.0,
            size: 10,
        };
        let b = FileFingerprint { mtime: 100.9, ..a.clone() };
        let c = FileFingerprint { mtime: 102.0, ..a.clone() };
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_mtime_difference_at_tolerance_is_a_change() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("module.py");
        fs::write(&path, "x = 1\n").unwrap();

        let mut fingerprint = FileFingerprint::compute(&path).unwrap();
        fingerprint.mtime -= 1.0;
        assert!(!is_current(&fingerprint, &path, 1.0));

        let a = FileFingerprint {
            path: "/a.py".to_string(),
            mtime: 100.0,
            size: 10,
        };
        let b = FileFingerprint { mtime: 101.0, ..a.clone() };
        assert!(!a.matches(&b, 1.0));
        assert_ne!(a, b);
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(
            normalize_path(Path::new("/src/./pkg/../mod.py")),
            PathBuf::from("/src/mod.py")
        );
        assert!(normalize_path(Path::new("relative.py")).is_absolute());
    }
}
