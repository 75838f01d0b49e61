use crate::analysis::{AnalysisResult, ConnascenceAnalyzer, FileOutcome, Severity};
use crate::errors::Result;
use crate::frontend::config::{Config, CONFIG_FILE_NAME};
use crate::infrastructure::{init_logging, LogConfig};
use crate::performance::AstCache;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "connascence")]
#[command(about = "Connascence and complexity analysis for Python sources", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Configuration file; defaults to the nearest .connascence.toml
    #[arg(short, long, global = true, env = "CONNASCENCE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Raise log verbosity (repeatable)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Analyze files and directories
    Analyze {
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Files analyzed at once (default: from config, else one per CPU)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Analyze without reading or writing the cache
        #[arg(long)]
        no_cache: bool,
    },

    /// Parse files into the cache ahead of analysis
    Warm {
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Cache maintenance
    #[command(subcommand)]
    Cache(CacheCommands),

    /// Write a default .connascence.toml in the current directory
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Clone, Copy, Subcommand)]
pub enum CacheCommands {
    /// Show statistics and tuning suggestions
    Stats,
    /// Remove every entry, in memory and on disk
    Clear,
    /// Drop stale entries and persist the rest
    Optimize,
}

#[derive(Serialize)]
struct FileReport<'a> {
    path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a AnalysisResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct BatchReport<'a> {
    files: Vec<FileReport<'a>>,
    analyzed: usize,
    failed: usize,
    violations: usize,
}

fn load_config(cli: &Cli) -> Result<Config> {
    match &cli.config {
        Some(path) => Config::load(path),
        None => Ok(Config::discover()),
    }
}

/// Execute a parsed command line and return the process exit code.
pub fn run(cli: Cli) -> Result<i32> {
    let mut config = load_config(&cli)?;
    let _guard = init_logging(LogConfig::from_settings(&config.logging, cli.verbose));

    match cli.command {
        Commands::Analyze {
            paths,
            format,
            workers,
            no_cache,
        } => {
            if no_cache {
                config.cache.enabled = false;
            }
            let workers = workers.unwrap_or_else(|| config.analysis.effective_concurrency());
            let sources = config.collect_sources(&paths);
            let analyzer = ConnascenceAnalyzer::from_config(&config);
            let outcomes = analyzer.analyze_batch(&sources, workers);
            let code = print_outcomes(&outcomes, format)?;
            if config.cache.enabled {
                analyzer.cache().optimize();
            }
            Ok(code)
        }
        Commands::Warm { paths, workers } => {
            let workers = workers.unwrap_or_else(|| config.analysis.effective_concurrency());
            let sources = config.collect_sources(&paths);
            let cache = AstCache::new(config.cache.clone());
            let report = cache.warm(&sources, workers);
            cache.optimize();

            println!(
                "Warmed {} of {} files ({} already cached) in {:.1} ms",
                report.parsed, report.requested, report.already_cached, report.duration_ms
            );
            for failure in &report.failed {
                eprintln!("skipped {}: {}", failure.path.display(), failure.reason);
            }
            Ok(0)
        }
        Commands::Cache(command) => {
            let cache = AstCache::new(config.cache.clone());
            match command {
                CacheCommands::Stats => {
                    let report = cache.report();
                    let stats = &report.stats;
                    println!("entries:      {} / {}", stats.entries, stats.max_entries);
                    println!(
                        "hit rate:     {:.1}% of {} requests",
                        stats.hit_rate_percent, stats.total_requests
                    );
                    println!("memory:       {:.2} MB", stats.memory_usage_mb);
                    println!(
                        "size:         {} / {} bytes ({:.1}%)",
                        stats.total_size_bytes,
                        stats.max_size_bytes,
                        report.memory_utilization * 100.0
                    );
                    println!("disk writes:  {}", stats.disk_writes);
                    println!("disk errors:  {}", stats.disk_errors);
                    for recommendation in &report.recommendations {
                        println!("hint: {}", recommendation);
                    }
                }
                CacheCommands::Clear => {
                    let entries = cache.stats().entries;
                    cache.clear();
                    println!("Cleared {} entries", entries);
                }
                CacheCommands::Optimize => {
                    let report = cache.optimize();
                    println!(
                        "Removed {} stale entries, persisted {}, {} remain",
                        report.invalidated, report.persisted, report.entries
                    );
                }
            }
            Ok(0)
        }
        Commands::Init { force } => {
            let path = PathBuf::from(CONFIG_FILE_NAME);
            if path.exists() && !force {
                eprintln!("{} already exists; pass --force to overwrite", path.display());
                return Ok(1);
            }
            Config::default().save(&path)?;
            info!(path = %path.display(), "config written");
            println!("Wrote {}", path.display());
            Ok(0)
        }
    }
}

/// Print outcomes and compute the exit code: 1 when any file has a high or
/// critical violation or failed to parse.
fn print_outcomes(outcomes: &[FileOutcome], format: OutputFormat) -> Result<i32> {
    let mut failing = false;
    let mut analyzed = 0;
    let mut failed = 0;
    let mut violations = 0;

    for outcome in outcomes {
        match &outcome.result {
            Ok(result) => {
                analyzed += 1;
                violations += result.total;
                if result.max_severity().is_some_and(|s| s >= Severity::High) {
                    failing = true;
                }
            }
            Err(e) => {
                failed += 1;
                if e.is_parse() {
                    failing = true;
                }
                warn!(path = %outcome.path.display(), error = %e, "file skipped");
            }
        }
    }

    match format {
        OutputFormat::Json => {
            let report = BatchReport {
                files: outcomes
                    .iter()
                    .map(|outcome| FileReport {
                        path: outcome.path.display().to_string(),
                        result: outcome.result.as_ref().ok().map(|r| r.as_ref()),
                        error: outcome.result.as_ref().err().map(|e| e.to_string()),
                    })
                    .collect(),
                analyzed,
                failed,
                violations,
            };
            let json = serde_json::to_string_pretty(&report).map_err(std::io::Error::from)?;
            println!("{}", json);
        }
        OutputFormat::Text => {
            for outcome in outcomes {
                match &outcome.result {
                    Ok(result) => {
                        for violation in result.iter() {
                            println!("{}:{}", outcome.path.display(), violation);
                        }
                    }
                    Err(e) => eprintln!("skipped {}: {}", outcome.path.display(), e),
                }
            }
            println!(
                "{} violation{} in {} file{} ({} skipped)",
                violations,
                if violations == 1 { "" } else { "s" },
                analyzed,
                if analyzed == 1 { "" } else { "s" },
                failed
            );
        }
    }

    Ok(if failing { 1 } else { 0 })
}

/// Entry point for the CLI binary.
pub fn main() -> i32 {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            2
        }
    }
}
