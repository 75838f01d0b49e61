use crate::analysis::Thresholds;
use crate::ast::TraversalConfig;
use crate::errors::{AnalyzerError, Result};
use crate::infrastructure::LoggingSettings;
use crate::performance::CacheConfig;
use glob::Pattern;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

pub const CONFIG_FILE_NAME: &str = ".connascence.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub analysis: AnalysisSettings,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub traversal: TraversalConfig,

    #[serde(default)]
    pub thresholds: Thresholds,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSettings {
    /// Files analyzed at once; 0 means one per CPU.
    #[serde(default)]
    pub concurrency: usize,
}

impl AnalysisSettings {
    pub fn effective_concurrency(&self) -> usize {
        if self.concurrency == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            self.concurrency
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default)]
    pub include: Vec<String>,

    #[serde(default)]
    pub exclude: Vec<String>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            include: vec!["**/*.py".to_string()],
            exclude: vec![
                "**/__pycache__/**".to_string(),
                "**/venv/**".to_string(),
                "**/.venv/**".to_string(),
                "**/node_modules/**".to_string(),
                "**/.ast_cache/**".to_string(),
            ],
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| AnalyzerError::Config(format!("failed to read {}: {}", path.display(), e)))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AnalyzerError::Config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let headroom = self.cache.eviction_headroom;
        if !(headroom > 0.0 && headroom <= 1.0) {
            return Err(AnalyzerError::Config(format!(
                "cache.eviction_headroom must be in (0, 1], got {}",
                headroom
            )));
        }
        if self.cache.mtime_tolerance_secs < 0.0 {
            return Err(AnalyzerError::Config(
                "cache.mtime_tolerance_secs must not be negative".to_string(),
            ));
        }
        if self.thresholds.god_object_critical < self.thresholds.god_object_methods {
            return Err(AnalyzerError::Config(
                "thresholds.god_object_critical is below god_object_methods".to_string(),
            ));
        }
        for pattern in self.paths.include.iter().chain(&self.paths.exclude) {
            Pattern::new(pattern)
                .map_err(|e| AnalyzerError::Config(format!("bad path pattern '{}': {}", pattern, e)))?;
        }
        Ok(())
    }

    /// Nearest `.connascence.toml` from the current directory upwards, or the
    /// defaults. A file that fails to load is reported and skipped.
    pub fn discover() -> Self {
        let mut current = std::env::current_dir().ok();

        while let Some(dir) = current {
            let config_path = dir.join(CONFIG_FILE_NAME);
            if config_path.exists() {
                match Self::load(&config_path) {
                    Ok(config) => {
                        debug!(path = %config_path.display(), "config loaded");
                        return config;
                    }
                    Err(e) => warn!(path = %config_path.display(), error = %e, "ignoring config"),
                }
            }
            current = dir.parent().map(Path::to_path_buf);
        }

        Self::default()
    }

    fn matches(path: &Path, pattern: &str) -> bool {
        Pattern::new(pattern).is_ok_and(|p| p.matches_path(path))
    }

    /// Whether `path` passes the exclude, then include patterns.
    pub fn should_check(&self, path: &Path) -> bool {
        if self.paths.exclude.iter().any(|p| Self::matches(path, p)) {
            return false;
        }
        self.paths.include.is_empty() || self.paths.include.iter().any(|p| Self::matches(path, p))
    }

    /// Expand files and directories into the sorted list of sources to check.
    /// Files named explicitly are kept even if the patterns would skip them.
    pub fn collect_sources(&self, roots: &[PathBuf]) -> Vec<PathBuf> {
        let mut sources = Vec::new();
        for root in roots {
            if root.is_dir() {
                sources.extend(
                    WalkDir::new(root)
                        .follow_links(false)
                        .into_iter()
                        .filter_map(|entry| entry.ok())
                        .filter(|entry| entry.file_type().is_file())
                        .map(|entry| entry.into_path())
                        .filter(|path| self.should_check(path)),
                );
            } else {
                sources.push(root.clone());
            }
        }
        sources.sort();
        sources.dedup();
        sources
    }

    pub fn generate_default() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate config"))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| AnalyzerError::Config(format!("failed to serialize config: {}", e)))?;

        fs::write(path, content).map_err(|e| AnalyzerError::from_io(path, e))
    }
}
