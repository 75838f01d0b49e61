//! Frontend components
//!
//! The parser, CLI, and configuration that form the user-facing surface of
//! the analyzer.

pub mod cli;
pub mod config;
pub mod parser;

pub use cli::main as cli_main;
pub use config::Config;
pub use parser::parse_module;
