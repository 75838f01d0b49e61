//! Keyed entry store with LRU eviction and optional disk persistence.
//!
//! All state sits behind one mutex. Every public method takes it exactly
//! once; helpers below operate on the already-locked state, so no operation
//! ever needs to re-acquire it. Disk IO happens while the lock is held,
//! computation (parsing, analysis) never does.

use crate::performance::entry::{CacheEntry, Payload};
use crate::performance::fingerprint::{is_current, FileFingerprint};
use crate::performance::persist::DiskCache;
use crate::performance::CacheConfig;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// Cache statistics for monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
    pub evictions: u64,
    pub disk_writes: u64,
    pub disk_errors: u64,
    pub entries: usize,
    pub total_size_bytes: usize,
    pub max_entries: usize,
    pub max_size_bytes: usize,
    /// Hits plus misses.
    pub total_requests: u64,
    pub hit_rate_percent: f64,
    pub memory_usage_mb: f64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.hits as f64 / self.total_requests as f64
        }
    }

    /// Fraction of the byte budget in use.
    pub fn memory_utilization(&self) -> f64 {
        if self.max_size_bytes == 0 {
            0.0
        } else {
            self.total_size_bytes as f64 / self.max_size_bytes as f64
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    hits: u64,
    misses: u64,
    invalidations: u64,
    evictions: u64,
    disk_writes: u64,
    disk_errors: u64,
}

#[derive(Default)]
struct StoreState {
    entries: HashMap<String, CacheEntry>,
    total_size: usize,
    counters: Counters,
    clock: u64,
}

impl StoreState {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

pub struct CacheStore {
    config: CacheConfig,
    disk: Option<DiskCache>,
    state: Mutex<StoreState>,
}

impl CacheStore {
    /// Open a store. With persistence on, the cache directory is created and
    /// every valid entry in it is loaded; invalid or unreadable files are
    /// deleted. A directory that cannot be created disables persistence.
    pub fn new(config: CacheConfig) -> Self {
        let disk = if config.enabled && config.persist {
            match DiskCache::new(config.dir.clone(), config.compress) {
                Ok(disk) => Some(disk),
                Err(e) => {
                    warn!(dir = %config.dir.display(), error = %e, "cache directory unavailable, persistence disabled");
                    None
                }
            }
        } else {
            None
        };

        let store = Self {
            config,
            disk,
            state: Mutex::new(StoreState::default()),
        };
        store.load();
        store
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn is_persistent(&self) -> bool {
        self.disk.is_some()
    }

    fn load(&self) {
        let Some(disk) = &self.disk else {
            return;
        };
        let files = match disk.load_all() {
            Ok(files) => files,
            Err(e) => {
                warn!(error = %e, "failed to read cache directory");
                return;
            }
        };

        let mut state = self.state.lock();
        let mut loaded = 0;
        let mut discarded = 0;
        for (path, record) in files {
            let entry = record
                .map_err(|e| e.to_string())
                .and_then(|record| {
                    if is_current(&record.fingerprint, Path::new(&record.fingerprint.path), self.config.mtime_tolerance_secs) {
                        record.into_entry().map_err(|e| e.to_string())
                    } else {
                        Err("source file changed or missing".to_string())
                    }
                });

            match entry {
                Ok(mut entry) => {
                    entry.touched = state.tick();
                    state.total_size += entry.size_bytes;
                    if let Some(old) = state.entries.insert(entry.key.clone(), entry) {
                        state.total_size -= old.size_bytes;
                    }
                    loaded += 1;
                }
                Err(reason) => {
                    debug!(file = %path.display(), %reason, "discarding persisted entry");
                    if let Err(e) = disk.remove_file(&path) {
                        warn!(file = %path.display(), error = %e, "failed to delete stale cache file");
                    }
                    discarded += 1;
                }
            }
        }

        self.enforce_limits(&mut state);
        info!(loaded, discarded, dir = %disk.root().display(), "cache loaded from disk");
    }

    /// Look up `key`. A hit whose source file changed is removed and counted
    /// as an invalidation and a miss.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        if !self.config.enabled {
            return None;
        }
        let mut state = self.state.lock();

        let valid = state.entries.get(key).map(|entry| {
            is_current(
                &entry.fingerprint,
                Path::new(&entry.fingerprint.path),
                self.config.mtime_tolerance_secs,
            )
        });

        match valid {
            None => {
                state.counters.misses += 1;
                return None;
            }
            Some(false) => {
                self.remove_entry(&mut state, key);
                state.counters.invalidations += 1;
                state.counters.misses += 1;
                debug!(key, "cache entry invalidated");
                return None;
            }
            Some(true) => {}
        }

        let clock = state.tick();
        state.counters.hits += 1;
        let entry = state.entries.get_mut(key)?;
        entry.touch(clock);
        Some(entry.clone())
    }

    /// Whether `key` holds an entry whose source is unchanged. Touches
    /// neither statistics nor recency.
    pub fn contains_current(&self, key: &str) -> bool {
        let state = self.state.lock();
        state.entries.get(key).is_some_and(|entry| {
            is_current(
                &entry.fingerprint,
                Path::new(&entry.fingerprint.path),
                self.config.mtime_tolerance_secs,
            )
        })
    }

    pub fn put(&self, key: impl Into<String>, payload: Payload, fingerprint: FileFingerprint, compute_duration_ms: f64) {
        self.insert_entry(CacheEntry::new(key, payload, fingerprint, compute_duration_ms));
    }

    /// Insert a prepared entry as is, replacing any entry under its key, then
    /// evict down to the limits.
    pub fn insert_entry(&self, mut entry: CacheEntry) {
        if !self.config.enabled {
            return;
        }
        let mut state = self.state.lock();
        entry.touched = state.tick();
        entry.persisted = false;

        let key = entry.key.clone();
        if let Some(old) = state.entries.remove(&key) {
            state.total_size -= old.size_bytes;
        }
        state.total_size += entry.size_bytes;
        state.entries.insert(key.clone(), entry);

        self.persist(&mut state, &key);
        self.enforce_limits(&mut state);
    }

    /// Remove `key`. Returns whether it was present.
    pub fn invalidate(&self, key: &str) -> bool {
        let mut state = self.state.lock();
        let removed = self.remove_entry(&mut state, key).is_some();
        if removed {
            state.counters.invalidations += 1;
        }
        removed
    }

    /// Remove every entry whose fingerprint names `path`. Returns the count.
    pub fn invalidate_by_path(&self, path: &str) -> usize {
        let mut state = self.state.lock();
        let keys: Vec<String> = state
            .entries
            .values()
            .filter(|entry| entry.fingerprint.path == path)
            .map(|entry| entry.key.clone())
            .collect();
        for key in &keys {
            self.remove_entry(&mut state, key);
        }
        state.counters.invalidations += keys.len() as u64;
        keys.len()
    }

    /// Remove every entry whose source changed. Returns the count.
    pub fn purge_invalid(&self) -> usize {
        let mut state = self.state.lock();
        let stale: Vec<String> = state
            .entries
            .values()
            .filter(|entry| {
                !is_current(
                    &entry.fingerprint,
                    Path::new(&entry.fingerprint.path),
                    self.config.mtime_tolerance_secs,
                )
            })
            .map(|entry| entry.key.clone())
            .collect();
        for key in &stale {
            self.remove_entry(&mut state, key);
        }
        state.counters.invalidations += stale.len() as u64;
        stale.len()
    }

    /// Write every entry whose disk copy is out of date. Returns the number
    /// written; with nothing changed since the last flush this is zero.
    pub fn flush(&self) -> usize {
        if self.disk.is_none() {
            return 0;
        }
        let mut state = self.state.lock();
        let mut dirty: Vec<String> = state
            .entries
            .values()
            .filter(|entry| !entry.persisted)
            .map(|entry| entry.key.clone())
            .collect();
        dirty.sort();

        dirty
            .iter()
            .filter(|key| self.persist(&mut state, key))
            .count()
    }

    /// Drop every entry and, when persistent, every entry file. Counters
    /// restart from zero.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.total_size = 0;
        state.counters = Counters::default();
        state.clock = 0;
        if let Some(disk) = &self.disk {
            match disk.clear() {
                Ok(removed) => debug!(removed, "cache files removed"),
                Err(e) => {
                    state.counters.disk_errors += 1;
                    warn!(error = %e, "failed to clear cache directory");
                }
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        let counters = state.counters;
        let total_requests = counters.hits + counters.misses;
        let hit_rate_percent = if total_requests == 0 {
            0.0
        } else {
            counters.hits as f64 * 100.0 / total_requests as f64
        };
        CacheStats {
            hits: counters.hits,
            misses: counters.misses,
            invalidations: state.counters.invalidations,
            evictions: state.counters.evictions,
            disk_writes: state.counters.disk_writes,
            disk_errors: state.counters.disk_errors,
            entries: state.entries.len(),
            total_size_bytes: state.total_size,
            max_entries: self.config.max_entries,
            max_size_bytes: self.config.max_bytes(),
            total_requests,
            hit_rate_percent,
            memory_usage_mb: state.total_size as f64 / (1024.0 * 1024.0),
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.state.lock().entries.contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.state.lock().entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    fn remove_entry(&self, state: &mut StoreState, key: &str) -> Option<CacheEntry> {
        let entry = state.entries.remove(key)?;
        state.total_size -= entry.size_bytes;
        if let Some(disk) = &self.disk {
            if let Err(e) = disk.remove(key) {
                state.counters.disk_errors += 1;
                warn!(key, error = %e, "failed to delete cache file");
            }
        }
        Some(entry)
    }

    /// Write one entry to disk. Failures keep the entry in memory only.
    fn persist(&self, state: &mut StoreState, key: &str) -> bool {
        let Some(disk) = &self.disk else {
            return false;
        };
        let Some(entry) = state.entries.get_mut(key) else {
            return false;
        };
        match disk.write(&entry.record()) {
            Ok(()) => {
                entry.persisted = true;
                state.counters.disk_writes += 1;
                true
            }
            Err(e) => {
                state.counters.disk_errors += 1;
                warn!(key, error = %e, "failed to persist cache entry");
                false
            }
        }
    }

    /// Evict least recently used entries until the entry count is within
    /// `max_entries`, then, if the byte budget is exceeded, until the total
    /// size is at or below `eviction_headroom` of it.
    fn enforce_limits(&self, state: &mut StoreState) -> usize {
        let max_entries = self.config.max_entries;
        let max_bytes = self.config.max_bytes();
        if state.entries.len() <= max_entries && state.total_size <= max_bytes {
            return 0;
        }

        let mut order: Vec<(f64, u64, u64, String)> = state
            .entries
            .values()
            .map(|e| (e.accessed_at, e.access_count, e.touched, e.key.clone()))
            .collect();
        order.sort_by(|a, b| {
            a.0.total_cmp(&b.0)
                .then(a.1.cmp(&b.1))
                .then(a.2.cmp(&b.2))
                .then_with(|| a.3.cmp(&b.3))
        });
        let mut victims = order.into_iter().map(|(_, _, _, key)| key);

        let mut evicted = 0;
        while state.entries.len() > max_entries {
            let Some(key) = victims.next() else { break };
            if self.remove_entry(state, &key).is_some() {
                evicted += 1;
            }
        }

        if state.total_size > max_bytes {
            let target = (max_bytes as f64 * self.config.eviction_headroom) as usize;
            while state.total_size > target {
                let Some(key) = victims.next() else { break };
                if self.remove_entry(state, &key).is_some() {
                    evicted += 1;
                }
            }
        }

        state.counters.evictions += evicted as u64;
        debug!(evicted, entries = state.entries.len(), size = state.total_size, "cache eviction");
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AnalysisResult;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn source_file(dir: &TempDir, name: &str) -> FileFingerprint {
        let path = dir.path().join(name);
        fs::write(&path, "x = 1\n").unwrap();
        FileFingerprint::compute(&path).unwrap()
    }

    fn result_entry(key: &str, fingerprint: FileFingerprint, accessed_at: f64) -> CacheEntry {
        let result = Arc::new(AnalysisResult::from_violations(fingerprint.path.clone(), Vec::new()));
        CacheEntry::with_times(key, Payload::Result(result), fingerprint, 1.0, 0.0, accessed_at, 0)
    }

    #[test]
    fn test_get_counts_hits_and_misses() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(CacheConfig::in_memory());
        let fingerprint = source_file(&dir, "a.py");

        assert!(store.get("a").is_none());
        store.insert_entry(result_entry("a", fingerprint, 1.0));
        let hit = store.get("a").unwrap();
        assert_eq!(hit.access_count, 1);

        let stats = store.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn test_stats_report_rates() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(CacheConfig::in_memory());
        store.insert_entry(result_entry("a", source_file(&dir, "a.py"), 1.0));

        store.get("a");
        store.get("a");
        store.get("a");
        store.get("missing");

        let stats = store.stats();
        assert_eq!(stats.total_requests, 4);
        assert!((stats.hit_rate_percent - 75.0).abs() < 1e-9);
        assert!((stats.memory_usage_mb - stats.total_size_bytes as f64 / (1024.0 * 1024.0)).abs() < 1e-12);
        assert!(stats.memory_usage_mb > 0.0);
    }

    #[test]
    fn test_clear_resets_counters() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(CacheConfig {
            max_entries: 1,
            ..CacheConfig::in_memory()
        });
        store.insert_entry(result_entry("a", source_file(&dir, "a.py"), 1.0));
        store.insert_entry(result_entry("b", source_file(&dir, "b.py"), 2.0));
        assert!(store.get("b").is_some());
        assert!(store.get("missing").is_none());

        let before = store.stats();
        assert_eq!((before.hits, before.misses, before.evictions), (1, 1, 1));

        store.clear();
        let after = store.stats();
        assert_eq!(after, CacheStats {
            max_entries: 1,
            max_size_bytes: after.max_size_bytes,
            ..CacheStats::default()
        });
        assert!(store.is_empty());
    }

    #[test]
    fn test_entry_limit_evicts_oldest_access() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(CacheConfig {
            max_entries: 3,
            ..CacheConfig::in_memory()
        });

        for (key, accessed) in [("a", 5.0), ("b", 1.0), ("c", 3.0), ("d", 4.0), ("e", 2.0)] {
            store.insert_entry(result_entry(key, source_file(&dir, &format!("{key}.py")), accessed));
        }

        assert_eq!(store.keys(), vec!["a", "c", "d"]);
        assert_eq!(store.stats().evictions, 2);
    }

    #[test]
    fn test_byte_budget_evicts_to_headroom() {
        let dir = TempDir::new().unwrap();
        let sample = result_entry("k0", source_file(&dir, "k0.py"), 0.0);
        let per_entry = sample.size_bytes;
        let budget = per_entry * 10;
        let store = CacheStore::new(CacheConfig {
            max_size_mb: budget as f64 / (1024.0 * 1024.0),
            ..CacheConfig::in_memory()
        });

        for i in 0..12 {
            let key = format!("k{i}");
            store.insert_entry(result_entry(&key, source_file(&dir, "k0.py"), i as f64));
        }

        let stats = store.stats();
        assert!(stats.total_size_bytes <= (stats.max_size_bytes as f64 * 0.9) as usize);
        assert!(!store.contains_key("k0"));
        assert!(store.contains_key("k11"));
    }

    #[test]
    fn test_changed_source_invalidates_once() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(CacheConfig::in_memory());
        let fingerprint = source_file(&dir, "a.py");
        let path = fingerprint.path.clone();
        store.insert_entry(result_entry("a", fingerprint, 1.0));

        fs::write(&path, "x = 1\ny = 2\n").unwrap();

        assert!(store.get("a").is_none());
        assert!(store.get("a").is_none());
        let stats = store.stats();
        assert_eq!(stats.invalidations, 1);
        assert_eq!(stats.entries, 0);
    }

    #[test]
    fn test_invalidate_by_path() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(CacheConfig::in_memory());
        let a = source_file(&dir, "a.py");
        let b = source_file(&dir, "b.py");
        store.insert_entry(result_entry("a::ast", a.clone(), 1.0));
        store.insert_entry(result_entry("a::analysis", a.clone(), 1.0));
        store.insert_entry(result_entry("b::ast", b, 1.0));

        assert_eq!(store.invalidate_by_path(&a.path), 2);
        assert_eq!(store.keys(), vec!["b::ast"]);
        assert!(!store.invalidate("missing"));
    }

    #[test]
    fn test_persisted_entries_survive_reopen() {
        let cache_dir = TempDir::new().unwrap();
        let src = TempDir::new().unwrap();
        let config = CacheConfig::persistent(cache_dir.path());
        let kept = source_file(&src, "kept.py");
        let changed = source_file(&src, "changed.py");

        {
            let store = CacheStore::new(config.clone());
            store.insert_entry(result_entry("kept", kept, 1.0));
            store.insert_entry(result_entry("changed", changed.clone(), 1.0));
            assert_eq!(store.stats().disk_writes, 2);
        }
        fs::write(&changed.path, "changed = True\n").unwrap();

        let reopened = CacheStore::new(config);
        assert_eq!(reopened.keys(), vec!["kept"]);
        assert_eq!(fs::read_dir(cache_dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_flush_writes_only_dirty_entries() {
        let cache_dir = TempDir::new().unwrap();
        let src = TempDir::new().unwrap();
        let store = CacheStore::new(CacheConfig::persistent(cache_dir.path()));
        store.insert_entry(result_entry("a", source_file(&src, "a.py"), 1.0));

        assert_eq!(store.flush(), 0);
        store.get("a");
        assert_eq!(store.flush(), 1);
        assert_eq!(store.flush(), 0);
    }

    #[test]
    fn test_disabled_store_never_holds_entries() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::new(CacheConfig {
            enabled: false,
            ..CacheConfig::in_memory()
        });
        store.insert_entry(result_entry("a", source_file(&dir, "a.py"), 1.0));
        assert!(store.get("a").is_none());
        assert!(store.is_empty());
    }
}
