//! Cross-cutting support: logging setup and metrics aggregation.

pub mod logging;
pub mod metrics;

pub use logging::{
    init_dev_logging, init_logging, init_prod_logging, LogConfig, LogFormat, LogOutput,
    LoggingSettings,
};
pub use metrics::{MemoryStats, MetricsSummary, PerformanceMetrics, ScopedTimer, TimingStats};
