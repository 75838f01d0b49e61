//! Tree and analysis-result caching keyed by source file.
//!
//! Trees live under `<path>::ast`, results under `<path>::analysis_<kind>`,
//! where `<path>` is the normalized absolute file path. Any entry is served
//! only while its file's fingerprint still holds.

use crate::analysis::AnalysisResult;
use crate::ast::ParsedTree;
use crate::performance::entry::Payload;
use crate::performance::fingerprint::{path_key, FileFingerprint};
use crate::performance::profiler::duration_ms;
use crate::performance::store::{CacheStats, CacheStore};
use crate::performance::CacheConfig;
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

pub const TREE_TAG: &str = "ast";

pub fn tree_key(path: &Path) -> String {
    format!("{}::{}", path_key(path), TREE_TAG)
}

pub fn result_key(path: &Path, kind: &str) -> String {
    format!("{}::analysis_{}", path_key(path), kind)
}

/// Shared flag checked by `warm` before each file.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WarmFailure {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WarmReport {
    pub requested: usize,
    pub parsed: usize,
    pub already_cached: usize,
    pub cancelled: usize,
    pub failed: Vec<WarmFailure>,
    pub duration_ms: f64,
}

enum WarmOutcome {
    Parsed,
    Cached,
    Cancelled,
    Failed(WarmFailure),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct OptimizeReport {
    pub invalidated: usize,
    pub persisted: usize,
    pub entries: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheReport {
    pub stats: CacheStats,
    pub hit_rate: f64,
    pub memory_utilization: f64,
    pub recommendations: Vec<String>,
}

pub struct AstCache {
    store: CacheStore,
}

impl AstCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            store: CacheStore::new(config),
        }
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn config(&self) -> &CacheConfig {
        self.store.config()
    }

    pub fn get_tree(&self, path: &Path) -> Option<Arc<ParsedTree>> {
        let entry = self.store.get(&tree_key(path))?;
        entry.payload.as_tree().cloned()
    }

    /// Cache `tree` for `path`. Returns false, caching nothing, when the file
    /// cannot be fingerprinted.
    pub fn put_tree(&self, path: &Path, tree: Arc<ParsedTree>, compute_duration_ms: f64) -> bool {
        match FileFingerprint::compute(path) {
            Ok(fingerprint) => {
                self.store_tree(fingerprint, tree, compute_duration_ms);
                true
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "not caching tree");
                false
            }
        }
    }

    pub fn get_result(&self, path: &Path, kind: &str) -> Option<Arc<AnalysisResult>> {
        let entry = self.store.get(&result_key(path, kind))?;
        entry.payload.as_result().cloned()
    }

    pub fn put_result(
        &self,
        path: &Path,
        kind: &str,
        result: Arc<AnalysisResult>,
        compute_duration_ms: f64,
    ) -> bool {
        match FileFingerprint::compute(path) {
            Ok(fingerprint) => {
                self.store_result(fingerprint, kind, result, compute_duration_ms);
                true
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "not caching result");
                false
            }
        }
    }

    /// Cache under a fingerprint taken before the tree was computed, so a
    /// file edited meanwhile is seen as changed on the next lookup.
    pub(crate) fn store_tree(&self, fingerprint: FileFingerprint, tree: Arc<ParsedTree>, compute_duration_ms: f64) {
        let key = tree_key(Path::new(&fingerprint.path));
        self.store.put(key, Payload::Tree(tree), fingerprint, compute_duration_ms);
    }

    pub(crate) fn store_result(
        &self,
        fingerprint: FileFingerprint,
        kind: &str,
        result: Arc<AnalysisResult>,
        compute_duration_ms: f64,
    ) {
        let key = result_key(Path::new(&fingerprint.path), kind);
        self.store.put(key, Payload::Result(result), fingerprint, compute_duration_ms);
    }

    /// Drop every entry derived from `path`. Returns how many were removed.
    pub fn invalidate_file(&self, path: &Path) -> usize {
        let removed = self.store.invalidate_by_path(&path_key(path));
        debug!(path = %path.display(), removed, "file invalidated");
        removed
    }

    /// Parse and cache every path not already cached, `concurrency` files at
    /// a time.
    pub fn warm(&self, paths: &[PathBuf], concurrency: usize) -> WarmReport {
        self.warm_with_cancel(paths, concurrency, &CancellationToken::new())
    }

    /// Like [`warm`](Self::warm), but files not yet started when `cancel`
    /// fires are skipped and reported as cancelled. Files in progress finish.
    #[instrument(skip_all, fields(files = paths.len(), concurrency = concurrency))]
    pub fn warm_with_cancel(
        &self,
        paths: &[PathBuf],
        concurrency: usize,
        cancel: &CancellationToken,
    ) -> WarmReport {
        let started = Instant::now();
        let outcomes: Vec<WarmOutcome> = match rayon::ThreadPoolBuilder::new()
            .num_threads(concurrency.max(1))
            .thread_name(|i| format!("ast-warm-{}", i))
            .build()
        {
            Ok(pool) => pool.install(|| {
                paths
                    .par_iter()
                    .map(|path| self.warm_one(path, cancel))
                    .collect()
            }),
            Err(e) => {
                warn!(error = %e, "warm pool unavailable, warming sequentially");
                paths.iter().map(|path| self.warm_one(path, cancel)).collect()
            }
        };

        let mut report = WarmReport {
            requested: paths.len(),
            ..WarmReport::default()
        };
        for outcome in outcomes {
            match outcome {
                WarmOutcome::Parsed => report.parsed += 1,
                WarmOutcome::Cached => report.already_cached += 1,
                WarmOutcome::Cancelled => report.cancelled += 1,
                WarmOutcome::Failed(failure) => report.failed.push(failure),
            }
        }
        report.duration_ms = duration_ms(started.elapsed());

        info!(
            parsed = report.parsed,
            cached = report.already_cached,
            failed = report.failed.len(),
            cancelled = report.cancelled,
            duration_ms = report.duration_ms,
            "cache warmed"
        );
        report
    }

    fn warm_one(&self, path: &Path, cancel: &CancellationToken) -> WarmOutcome {
        if cancel.is_cancelled() {
            return WarmOutcome::Cancelled;
        }
        if self.store.contains_current(&tree_key(path)) {
            return WarmOutcome::Cached;
        }

        let failed = |reason: String| {
            debug!(path = %path.display(), %reason, "warm failed");
            WarmOutcome::Failed(WarmFailure {
                path: path.to_path_buf(),
                reason,
            })
        };

        let fingerprint = match FileFingerprint::compute(path) {
            Ok(fingerprint) => fingerprint,
            Err(e) => return failed(e.to_string()),
        };
        let started = Instant::now();
        match ParsedTree::from_file(path) {
            Ok(tree) => {
                self.store_tree(fingerprint, Arc::new(tree), duration_ms(started.elapsed()));
                WarmOutcome::Parsed
            }
            Err(e) => failed(e.to_string()),
        }
    }

    /// Drop entries whose sources changed and write out entries whose disk
    /// copies are stale. A second call with nothing changed in between does
    /// no work.
    pub fn optimize(&self) -> OptimizeReport {
        let invalidated = self.store.purge_invalid();
        let persisted = self.store.flush();
        let report = OptimizeReport {
            invalidated,
            persisted,
            entries: self.store.len(),
        };
        info!(invalidated, persisted, entries = report.entries, "cache optimized");
        report
    }

    pub fn stats(&self) -> CacheStats {
        self.store.stats()
    }

    pub fn clear(&self) {
        self.store.clear();
    }

    /// Statistics with tuning suggestions.
    pub fn report(&self) -> CacheReport {
        let stats = self.stats();
        let hit_rate = stats.hit_rate();
        let memory_utilization = stats.memory_utilization();
        let lookups = stats.hits + stats.misses;

        let mut recommendations = Vec::new();
        if lookups >= 10 && hit_rate < 0.5 {
            recommendations.push(format!(
                "Hit rate is {:.0}%; warm the cache before analysis runs",
                hit_rate * 100.0
            ));
        }
        if memory_utilization > 0.9 {
            recommendations.push("Cache is near its size budget; raise max_size_mb".to_string());
        }
        if stats.evictions > stats.entries as u64 {
            recommendations.push(format!(
                "{} evictions for {} live entries; raise max_entries",
                stats.evictions, stats.entries
            ));
        }
        if stats.invalidations > stats.hits && stats.invalidations > 0 {
            recommendations.push("Sources change faster than they are reused; caching gains little".to_string());
        }
        if stats.disk_errors > 0 {
            recommendations.push(format!(
                "{} cache file operations failed; check the cache directory",
                stats.disk_errors
            ));
        }

        CacheReport {
            stats,
            hit_rate,
            memory_utilization,
            recommendations,
        }
    }
}
