//! Logging setup
//!
//! Everything in the crate logs through `tracing`. The binary installs a
//! subscriber once at startup from the `[logging]` config section and the
//! command line; library users bring their own.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::Level;
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, MakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Compact,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    Stderr,
    /// Daily rotated files
    File { directory: String, prefix: String },
}

/// `[logging]` section of the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub format: LogFormat,
    /// Write rotated log files here instead of stderr.
    pub directory: Option<String>,
    pub span_events: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::Compact,
            directory: None,
            span_events: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    pub format: LogFormat,
    pub output: LogOutput,
    pub span_events: bool,
    /// Extra filter directives, e.g. "connascence::performance=trace"
    pub filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::WARN,
            format: LogFormat::Compact,
            output: LogOutput::Stderr,
            span_events: false,
            filter: None,
        }
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the config file section. Each `verbose` step raises the
    /// level by one, up to trace.
    pub fn from_settings(settings: &LoggingSettings, verbose: u8) -> Self {
        let base = settings.level.parse::<Level>().unwrap_or(Level::WARN);
        let level = (0..verbose).fold(base, |level, _| raise(level));
        let output = match &settings.directory {
            Some(directory) => LogOutput::File {
                directory: directory.clone(),
                prefix: "connascence".to_string(),
            },
            None => LogOutput::Stderr,
        };

        Self {
            level,
            format: settings.format,
            output,
            span_events: settings.span_events,
            filter: None,
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.span_events = enabled;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }
}

fn raise(level: Level) -> Level {
    match level {
        Level::ERROR => Level::WARN,
        Level::WARN => Level::INFO,
        Level::INFO => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Install the global subscriber.
///
/// Keep the returned guard alive until exit so buffered lines are flushed.
/// Returns `None` without touching anything if a subscriber is already set.
pub fn init_logging(config: LogConfig) -> Option<WorkerGuard> {
    let filter = build_filter(&config);

    let (layer, guard) = match &config.output {
        LogOutput::Stdout => {
            let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());
            (format_layer(&config, writer), guard)
        }
        LogOutput::Stderr => {
            let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());
            (format_layer(&config, writer), guard)
        }
        LogOutput::File { directory, prefix } => {
            let appender = rolling::daily(directory, prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (format_layer(&config, writer), guard)
        }
    };

    match tracing_subscriber::registry().with(layer.with_filter(filter)).try_init() {
        Ok(()) => Some(guard),
        Err(_) => None,
    }
}

fn format_layer<W>(config: &LogConfig, writer: W) -> Box<dyn Layer<Registry> + Send + Sync>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_writer(writer)
        .with_span_events(span_events_config(config.span_events));
    match config.format {
        LogFormat::Pretty => layer.pretty().boxed(),
        LogFormat::Compact => layer.compact().boxed(),
        LogFormat::Json => layer.json().boxed(),
    }
}

fn build_filter(config: &LogConfig) -> EnvFilter {
    let base_filter = EnvFilter::from_default_env().add_directive(config.level.into());

    match &config.filter {
        Some(filter_str) => filter_str.split(',').fold(base_filter, |filter, directive| {
            filter.add_directive(directive.parse().unwrap_or_else(|_| {
                tracing::warn!("Invalid filter directive: {}", directive);
                config.level.into()
            }))
        }),
        None => base_filter,
    }
}

fn span_events_config(enabled: bool) -> FmtSpan {
    if enabled {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    }
}

/// Debug-level pretty logging to stderr with span events.
pub fn init_dev_logging() -> Option<WorkerGuard> {
    init_logging(LogConfig {
        level: Level::DEBUG,
        format: LogFormat::Pretty,
        output: LogOutput::Stderr,
        span_events: true,
        filter: Some("connascence=debug".to_string()),
    })
}

/// JSON lines into daily files under `log_dir`.
pub fn init_prod_logging(log_dir: impl AsRef<Path>) -> Option<WorkerGuard> {
    init_logging(LogConfig {
        level: Level::INFO,
        format: LogFormat::Json,
        output: LogOutput::File {
            directory: log_dir.as_ref().to_string_lossy().to_string(),
            prefix: "connascence".to_string(),
        },
        span_events: false,
        filter: Some("connascence=info".to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = LogConfig::new()
            .with_level(Level::DEBUG)
            .with_format(LogFormat::Json)
            .with_span_events(true)
            .with_filter("connascence=trace");

        assert_eq!(config.level, Level::DEBUG);
        assert_eq!(config.format, LogFormat::Json);
        assert!(config.span_events);
        assert_eq!(config.filter, Some("connascence=trace".to_string()));
    }

    #[test]
    fn test_verbosity_raises_level() {
        let settings = LoggingSettings::default();
        assert_eq!(LogConfig::from_settings(&settings, 0).level, Level::WARN);
        assert_eq!(LogConfig::from_settings(&settings, 2).level, Level::DEBUG);
        assert_eq!(LogConfig::from_settings(&settings, 9).level, Level::TRACE);
    }

    #[test]
    fn test_directory_selects_file_output() {
        let settings = LoggingSettings {
            directory: Some("/var/log/connascence".to_string()),
            level: "info".to_string(),
            ..LoggingSettings::default()
        };
        let config = LogConfig::from_settings(&settings, 0);
        assert_eq!(config.level, Level::INFO);
        assert!(matches!(config.output, LogOutput::File { .. }));
    }
}
