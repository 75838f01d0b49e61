//! Timing, memory and counter aggregation for analysis runs

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

/// Aggregates named timings, memory deltas and counters.
pub struct PerformanceMetrics {
    timings: RwLock<HashMap<String, Vec<Duration>>>,
    memory_deltas: RwLock<HashMap<String, Vec<i64>>>,
    counters: RwLock<HashMap<String, u64>>,
    start_time: Instant,
}

impl PerformanceMetrics {
    pub fn new() -> Self {
        Self {
            timings: RwLock::new(HashMap::new()),
            memory_deltas: RwLock::new(HashMap::new()),
            counters: RwLock::new(HashMap::new()),
            start_time: Instant::now(),
        }
    }

    pub fn record_timing(&self, name: impl Into<String>, duration: Duration) {
        self.timings.write().entry(name.into()).or_default().push(duration);
    }

    pub fn record_memory_delta(&self, name: impl Into<String>, delta_bytes: i64) {
        self.memory_deltas
            .write()
            .entry(name.into())
            .or_default()
            .push(delta_bytes);
    }

    pub fn increment(&self, name: impl Into<String>) {
        self.add(name, 1);
    }

    pub fn add(&self, name: impl Into<String>, value: u64) {
        *self.counters.write().entry(name.into()).or_default() += value;
    }

    pub fn timing_stats(&self, name: &str) -> Option<TimingStats> {
        self.timings.read().get(name).map(|d| TimingStats::from_durations(d))
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters.read().get(name).copied().unwrap_or(0)
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn reset(&self) {
        self.timings.write().clear();
        self.memory_deltas.write().clear();
        self.counters.write().clear();
    }

    pub fn summary(&self) -> MetricsSummary {
        let timings = self
            .timings
            .read()
            .iter()
            .map(|(name, durations)| (name.clone(), TimingStats::from_durations(durations)))
            .collect();

        let memory = self
            .memory_deltas
            .read()
            .iter()
            .map(|(name, deltas)| (name.clone(), MemoryStats::from_deltas(deltas)))
            .collect();

        let counters = self
            .counters
            .read()
            .iter()
            .map(|(name, value)| (name.clone(), *value))
            .collect();

        MetricsSummary {
            uptime_ms: self.uptime().as_secs_f64() * 1000.0,
            timings,
            memory,
            counters,
        }
    }
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Timing distribution in milliseconds.
#[derive(Debug, Clone, Serialize)]
pub struct TimingStats {
    pub count: usize,
    pub total_ms: f64,
    pub mean_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
}

impl TimingStats {
    fn from_durations(durations: &[Duration]) -> Self {
        let mut sorted: Vec<f64> = durations.iter().map(|d| d.as_secs_f64() * 1000.0).collect();
        if sorted.is_empty() {
            return Self {
                count: 0,
                total_ms: 0.0,
                mean_ms: 0.0,
                min_ms: 0.0,
                max_ms: 0.0,
                p50_ms: 0.0,
                p95_ms: 0.0,
            };
        }
        sorted.sort_by(f64::total_cmp);

        let count = sorted.len();
        let total_ms: f64 = sorted.iter().sum();
        let percentile = |p: f64| sorted[((count as f64 * p) as usize).min(count - 1)];

        Self {
            count,
            total_ms,
            mean_ms: total_ms / count as f64,
            min_ms: sorted[0],
            max_ms: sorted[count - 1],
            p50_ms: percentile(0.50),
            p95_ms: percentile(0.95),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MemoryStats {
    pub samples: usize,
    pub total_delta_bytes: i64,
    pub max_delta_bytes: i64,
}

impl MemoryStats {
    fn from_deltas(deltas: &[i64]) -> Self {
        Self {
            samples: deltas.len(),
            total_delta_bytes: deltas.iter().sum(),
            max_delta_bytes: deltas.iter().copied().max().unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub uptime_ms: f64,
    pub timings: BTreeMap<String, TimingStats>,
    pub memory: BTreeMap<String, MemoryStats>,
    pub counters: BTreeMap<String, u64>,
}

impl MetricsSummary {
    /// Human-readable report
    pub fn report(&self) -> String {
        let mut lines = vec![
            format!("Uptime: {:.2}ms", self.uptime_ms),
            String::new(),
            "=== Timings ===".to_string(),
        ];

        for (name, stats) in &self.timings {
            lines.push(format!(
                "{}: count={} total={:.2}ms mean={:.2}ms p95={:.2}ms max={:.2}ms",
                name, stats.count, stats.total_ms, stats.mean_ms, stats.p95_ms, stats.max_ms
            ));
        }

        if !self.memory.is_empty() {
            lines.push(String::new());
            lines.push("=== Memory ===".to_string());
            for (name, stats) in &self.memory {
                lines.push(format!(
                    "{}: samples={} total_delta={}B max_delta={}B",
                    name, stats.samples, stats.total_delta_bytes, stats.max_delta_bytes
                ));
            }
        }

        lines.push(String::new());
        lines.push("=== Counters ===".to_string());
        for (name, value) in &self.counters {
            lines.push(format!("{}: {}", name, value));
        }

        lines.join("\n")
    }
}

/// Records the elapsed time under its name when dropped.
pub struct ScopedTimer<'a> {
    metrics: &'a PerformanceMetrics,
    name: String,
    start: Instant,
}

impl<'a> ScopedTimer<'a> {
    pub fn new(metrics: &'a PerformanceMetrics, name: impl Into<String>) -> Self {
        Self {
            metrics,
            name: name.into(),
            start: Instant::now(),
        }
    }
}

impl Drop for ScopedTimer<'_> {
    fn drop(&mut self) {
        self.metrics.record_timing(self.name.as_str(), self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_timing() {
        let metrics = PerformanceMetrics::new();

        metrics.record_timing("parse", Duration::from_millis(100));
        metrics.record_timing("parse", Duration::from_millis(200));
        metrics.record_timing("parse", Duration::from_millis(150));

        let stats = metrics.timing_stats("parse").unwrap();
        assert_eq!(stats.count, 3);
        assert!((stats.min_ms - 100.0).abs() < 1e-6);
        assert!((stats.max_ms - 200.0).abs() < 1e-6);
        assert!((stats.mean_ms - 150.0).abs() < 1e-6);
    }

    #[test]
    fn test_counters_and_memory() {
        let metrics = PerformanceMetrics::new();

        metrics.increment("files");
        metrics.increment("files");
        metrics.add("bytes", 1000);
        metrics.record_memory_delta("analyze", 4096);
        metrics.record_memory_delta("analyze", -1024);

        assert_eq!(metrics.counter("files"), 2);
        assert_eq!(metrics.counter("bytes"), 1000);
        let summary = metrics.summary();
        assert_eq!(summary.memory["analyze"].total_delta_bytes, 3072);
        assert_eq!(summary.memory["analyze"].max_delta_bytes, 4096);
    }

    #[test]
    fn test_scoped_timer() {
        let metrics = PerformanceMetrics::new();
        {
            let _timer = ScopedTimer::new(&metrics, "sleep");
            thread::sleep(Duration::from_millis(10));
        }

        let stats = metrics.timing_stats("sleep").unwrap();
        assert_eq!(stats.count, 1);
        assert!(stats.total_ms >= 10.0);
    }

    #[test]
    fn test_summary_report() {
        let metrics = PerformanceMetrics::new();
        metrics.record_timing("parse", Duration::from_millis(50));
        metrics.increment("files");

        let report = metrics.summary().report();
        assert!(report.contains("parse"));
        assert!(report.contains("files"));

        metrics.reset();
        assert!(metrics.summary().timings.is_empty());
    }
}
