//! Labelled wall-clock and resident-memory measurements.

use crate::infrastructure::metrics::PerformanceMetrics;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use sysinfo::System;
use tracing::{debug, trace};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileSample {
    pub label: String,
    pub duration_ms: f64,
    pub memory_before_bytes: u64,
    pub memory_after_bytes: u64,
    pub memory_delta_bytes: i64,
}

struct ActiveProfile {
    started: Instant,
    memory_before: u64,
}

/// Tracks open measurements by label and feeds finished ones into
/// [`PerformanceMetrics`].
///
/// Finished samples are aggregated under the label's prefix, the text before
/// the first `:`, so per-file labels such as `analyze:/src/a.py` roll up into
/// one `analyze` timing.
pub struct PerformanceProfiler {
    active: DashMap<String, ActiveProfile>,
    metrics: Arc<PerformanceMetrics>,
    system: Option<Mutex<System>>,
}

impl PerformanceProfiler {
    pub fn new(metrics: Arc<PerformanceMetrics>) -> Self {
        Self {
            active: DashMap::new(),
            metrics,
            system: Some(Mutex::new(System::new())),
        }
    }

    /// A profiler that reports zero memory and only measures time.
    pub fn timing_only(metrics: Arc<PerformanceMetrics>) -> Self {
        Self {
            active: DashMap::new(),
            metrics,
            system: None,
        }
    }

    pub fn metrics(&self) -> &Arc<PerformanceMetrics> {
        &self.metrics
    }

    /// Open a measurement. Starting a label that is already open restarts it.
    pub fn start(&self, label: &str) {
        let memory_before = self.resident_memory();
        if self
            .active
            .insert(
                label.to_string(),
                ActiveProfile {
                    started: Instant::now(),
                    memory_before,
                },
            )
            .is_some()
        {
            debug!(label, "profile restarted");
        }
    }

    /// Close a measurement. Returns `None` if `label` was never started.
    pub fn end(&self, label: &str) -> Option<ProfileSample> {
        let (_, active) = self.active.remove(label)?;
        let duration = active.started.elapsed();
        let memory_after = self.resident_memory();
        let sample = ProfileSample {
            label: label.to_string(),
            duration_ms: duration_ms(duration),
            memory_before_bytes: active.memory_before,
            memory_after_bytes: memory_after,
            memory_delta_bytes: memory_after as i64 - active.memory_before as i64,
        };

        let group = metric_group(label);
        self.metrics.record_timing(group, duration);
        if self.system.is_some() {
            self.metrics.record_memory_delta(group, sample.memory_delta_bytes);
        }
        trace!(label, duration_ms = sample.duration_ms, delta = sample.memory_delta_bytes, "profile finished");
        Some(sample)
    }

    /// Measure `f` under `label`.
    pub fn measure<T>(&self, label: &str, f: impl FnOnce() -> T) -> (T, Option<ProfileSample>) {
        self.start(label);
        let value = f();
        (value, self.end(label))
    }

    pub fn is_active(&self, label: &str) -> bool {
        self.active.contains_key(label)
    }

    /// Resident set size of this process in bytes, or 0 where the platform
    /// does not expose it.
    pub fn resident_memory(&self) -> u64 {
        let Some(system) = &self.system else {
            return 0;
        };
        let Ok(pid) = sysinfo::get_current_pid() else {
            return 0;
        };
        let mut system = system.lock();
        if !system.refresh_process(pid) {
            return 0;
        }
        system.process(pid).map(|p| p.memory()).unwrap_or(0)
    }
}

impl Default for PerformanceProfiler {
    fn default() -> Self {
        Self::new(Arc::new(PerformanceMetrics::new()))
    }
}

fn metric_group(label: &str) -> &str {
    label.split(':').next().unwrap_or(label)
}

pub(crate) fn duration_ms(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}
