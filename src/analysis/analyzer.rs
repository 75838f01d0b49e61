//! Cached, profiled analysis of files.

use crate::analysis::detector::ConnascenceDetector;
use crate::analysis::violations::AnalysisResult;
use crate::ast::ParsedTree;
use crate::errors::Result;
use crate::frontend::config::Config;
use crate::infrastructure::PerformanceMetrics;
use crate::performance::profiler::duration_ms;
use crate::performance::{AstCache, FileFingerprint, PerformanceProfiler};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument, warn};

/// Result kind under which connascence results are cached.
pub const ANALYSIS_KIND: &str = "connascence";

#[derive(Debug)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub result: Result<Arc<AnalysisResult>>,
}

pub struct ConnascenceAnalyzer {
    cache: Arc<AstCache>,
    detector: ConnascenceDetector,
    profiler: Arc<PerformanceProfiler>,
    /// Suffix that keeps concurrent measurements of one path apart.
    runs: AtomicU64,
}

impl ConnascenceAnalyzer {
    pub fn new(
        cache: Arc<AstCache>,
        detector: ConnascenceDetector,
        profiler: Arc<PerformanceProfiler>,
    ) -> Self {
        Self {
            cache,
            detector,
            profiler,
            runs: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let metrics = Arc::new(PerformanceMetrics::new());
        Self::new(
            Arc::new(AstCache::new(config.cache.clone())),
            ConnascenceDetector::new(config.thresholds.clone(), config.traversal.clone()),
            Arc::new(PerformanceProfiler::new(metrics)),
        )
    }

    pub fn cache(&self) -> &Arc<AstCache> {
        &self.cache
    }

    pub fn profiler(&self) -> &Arc<PerformanceProfiler> {
        &self.profiler
    }

    pub fn detector(&self) -> &ConnascenceDetector {
        &self.detector
    }

    /// Analyze one file, reusing a cached result or tree when the file is
    /// unchanged.
    ///
    /// Fails with `NotFound` when the file does not exist and with `Parse`
    /// when it is not valid Python.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub fn analyze_file(&self, path: &Path) -> Result<Arc<AnalysisResult>> {
        let metrics = self.profiler.metrics();
        if let Some(result) = self.cache.get_result(path, ANALYSIS_KIND) {
            metrics.increment("results_cached");
            debug!("cached result reused");
            return Ok(result);
        }

        let run = self.runs.fetch_add(1, Ordering::Relaxed);
        let label = format!("analyze:{}#{}", path.display(), run);
        self.profiler.start(&label);
        let outcome = self.compute(path);
        self.profiler.end(&label);

        match &outcome {
            Ok(result) => {
                metrics.increment("files_analyzed");
                metrics.add("violations", result.total as u64);
            }
            Err(e) => {
                metrics.increment("files_failed");
                warn!(error = %e, "analysis failed");
            }
        }
        outcome
    }

    fn compute(&self, path: &Path) -> Result<Arc<AnalysisResult>> {
        let fingerprint = FileFingerprint::compute(path)?;

        let tree = match self.cache.get_tree(path) {
            Some(tree) => {
                self.profiler.metrics().increment("trees_cached");
                tree
            }
            None => {
                let started = Instant::now();
                let tree = Arc::new(ParsedTree::from_file(path)?);
                self.cache
                    .store_tree(fingerprint.clone(), Arc::clone(&tree), duration_ms(started.elapsed()));
                tree
            }
        };

        let started = Instant::now();
        let result = Arc::new(self.detector.detect(&tree));
        self.cache.store_result(
            fingerprint,
            ANALYSIS_KIND,
            Arc::clone(&result),
            duration_ms(started.elapsed()),
        );
        Ok(result)
    }

    /// Analyze `paths` with up to `concurrency` files in flight. Outcomes come
    /// back in input order; one file failing does not affect the others.
    pub fn analyze_batch(&self, paths: &[PathBuf], concurrency: usize) -> Vec<FileOutcome> {
        let analyze = |path: &PathBuf| FileOutcome {
            path: path.clone(),
            result: self.analyze_file(path),
        };

        match rayon::ThreadPoolBuilder::new()
            .num_threads(concurrency.max(1))
            .thread_name(|i| format!("analyze-{}", i))
            .build()
        {
            Ok(pool) => pool.install(|| paths.par_iter().map(analyze).collect()),
            Err(e) => {
                warn!(error = %e, "analysis pool unavailable, analyzing sequentially");
                paths.iter().map(analyze).collect()
            }
        }
    }
}

impl Default for ConnascenceAnalyzer {
    fn default() -> Self {
        Self::from_config(&Config {
            cache: crate::performance::CacheConfig::in_memory(),
            ..Config::default()
        })
    }
}
