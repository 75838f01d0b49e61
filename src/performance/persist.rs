//! One file per cache entry, JSON with optional zstd compression.
//!
//! File names are derived from a hash of the entry key; the key itself is
//! stored inside the record. Readers detect compression from the zstd frame
//! magic, so toggling compression never strands existing files.

use crate::performance::entry::{EntryRecord, EntryRecordRef};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];
const PLAIN_EXT: &str = "json";
const COMPRESSED_EXT: &str = "json.zst";

/// Disk cache directory
pub struct DiskCache {
    root: PathBuf,
    compress: bool,
    /// Compression level (1-22)
    compression_level: i32,
}

impl DiskCache {
    pub fn new(root: PathBuf, compress: bool) -> io::Result<Self> {
        fs::create_dir_all(&root)?;

        Ok(Self {
            root,
            compress,
            compression_level: 3,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn stem(key: &str) -> String {
        let hex = blake3::hash(key.as_bytes()).to_hex();
        hex.as_str()[..32].to_string()
    }

    fn entry_path(&self, key: &str, compressed: bool) -> PathBuf {
        let ext = if compressed { COMPRESSED_EXT } else { PLAIN_EXT };
        self.root.join(format!("{}.{}", Self::stem(key), ext))
    }

    fn is_entry_file(path: &Path) -> bool {
        path.file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| {
                name.ends_with(&format!(".{}", PLAIN_EXT)) || name.ends_with(&format!(".{}", COMPRESSED_EXT))
            })
    }

    /// Write a record atomically: temp file first, then rename.
    pub(crate) fn write(&self, record: &EntryRecordRef<'_>) -> io::Result<()> {
        let json = serde_json::to_vec(record).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let bytes = if self.compress {
            zstd::encode_all(&json[..], self.compression_level)?
        } else {
            json
        };

        let path = self.entry_path(record.key, self.compress);
        let temp_path = path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        fs::rename(&temp_path, &path)?;

        // a copy in the other format would shadow this one on the next load
        remove_if_exists(&self.entry_path(record.key, !self.compress))
    }

    pub fn remove(&self, key: &str) -> io::Result<()> {
        remove_if_exists(&self.entry_path(key, true))?;
        remove_if_exists(&self.entry_path(key, false))
    }

    /// Every entry file with its decoded record, or the reason it could not
    /// be decoded.
    pub(crate) fn load_all(&self) -> io::Result<Vec<(PathBuf, io::Result<EntryRecord>)>> {
        let mut loaded = Vec::new();
        for dir_entry in fs::read_dir(&self.root)? {
            let path = match dir_entry {
                Ok(dir_entry) => dir_entry.path(),
                Err(_) => continue,
            };
            if !Self::is_entry_file(&path) {
                continue;
            }
            let record = fs::read(&path).and_then(|bytes| decode(&bytes));
            loaded.push((path, record));
        }
        loaded.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(loaded)
    }

    pub fn remove_file(&self, path: &Path) -> io::Result<()> {
        remove_if_exists(path)
    }

    /// Remove every entry file; returns how many were removed.
    pub fn clear(&self) -> io::Result<usize> {
        let mut removed = 0;
        for dir_entry in fs::read_dir(&self.root)?.flatten() {
            let path = dir_entry.path();
            if Self::is_entry_file(&path) {
                fs::remove_file(path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Total size of entry files in bytes
    pub fn total_size(&self) -> io::Result<u64> {
        let mut total = 0u64;
        for dir_entry in fs::read_dir(&self.root)?.flatten() {
            if Self::is_entry_file(&dir_entry.path()) {
                if let Ok(metadata) = dir_entry.metadata() {
                    total += metadata.len();
                }
            }
        }
        Ok(total)
    }
}

fn decode(bytes: &[u8]) -> io::Result<EntryRecord> {
    let json = if bytes.starts_with(&ZSTD_MAGIC) {
        zstd::decode_all(bytes)?
    } else {
        bytes.to_vec()
    };
    serde_json::from_slice(&json).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AnalysisResult;
    use crate::performance::entry::{CacheEntry, Payload};
    use crate::performance::fingerprint::FileFingerprint;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn entry(key: &str) -> CacheEntry {
        let fingerprint = FileFingerprint {
            path: "/project/a.py".to_string(),
            mtime: 1.0,
            size: 1,
        };
        let result = AnalysisResult::from_violations("/project/a.py", Vec::new());
        CacheEntry::new(key, Payload::Result(Arc::new(result)), fingerprint, 0.5)
    }

    #[test]
    fn test_compressed_and_plain_files_both_load() {
        let temp = TempDir::new().unwrap();
        let compressed = DiskCache::new(temp.path().to_path_buf(), true).unwrap();
        compressed.write(&entry("a").record()).unwrap();

        let plain = DiskCache::new(temp.path().to_path_buf(), false).unwrap();
        plain.write(&entry("b").record()).unwrap();

        let loaded = plain.load_all().unwrap();
        let mut keys: Vec<_> = loaded
            .into_iter()
            .map(|(_, record)| record.unwrap().key)
            .collect();
        keys.sort();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn test_rewrite_in_other_format_replaces_file() {
        let temp = TempDir::new().unwrap();
        DiskCache::new(temp.path().to_path_buf(), true)
            .unwrap()
            .write(&entry("a").record())
            .unwrap();
        let plain = DiskCache::new(temp.path().to_path_buf(), false).unwrap();
        plain.write(&entry("a").record()).unwrap();

        assert_eq!(plain.load_all().unwrap().len(), 1);
    }

    #[test]
    fn test_malformed_file_reports_error() {
        let temp = TempDir::new().unwrap();
        let disk = DiskCache::new(temp.path().to_path_buf(), true).unwrap();
        fs::write(temp.path().join("deadbeef.json"), b"{not json").unwrap();
        fs::write(temp.path().join("notes.txt"), b"ignored").unwrap();

        let loaded = disk.load_all().unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded[0].1.is_err());
    }

    #[test]
    fn test_remove_and_clear() {
        let temp = TempDir::new().unwrap();
        let disk = DiskCache::new(temp.path().to_path_buf(), true).unwrap();
        disk.write(&entry("a").record()).unwrap();
        disk.write(&entry("b").record()).unwrap();
        assert!(disk.total_size().unwrap() > 0);

        disk.remove("a").unwrap();
        disk.remove("missing").unwrap();
        assert_eq!(disk.clear().unwrap(), 1);
        assert!(disk.load_all().unwrap().is_empty());
    }
}
