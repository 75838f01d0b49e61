use crate::errors::{AnalyzerError, Result};
use rustpython_parser::ast::Mod;
use rustpython_parser::{parse, Mode};
use tracing::{debug, instrument};

/// Parse Python source into a module tree. `source_path` is only used in
/// diagnostics.
#[instrument(skip(source), fields(source_len = source.len()))]
pub fn parse_module(source: &str, source_path: &str) -> Result<Mod> {
    debug!("Parsing module");
    parse(source, Mode::Module, source_path).map_err(|e| {
        debug!(error = %e, "Failed to parse module");
        AnalyzerError::parse(source_path, e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        assert!(parse_module("x = 1 + 2", "<string>").is_ok());
    }

    #[test]
    fn test_parse_function() {
        let source = r#"
def add(x: int, y: int) -> int:
    return x + y
"#;
        assert!(parse_module(source, "<string>").is_ok());
    }

    #[test]
    fn test_parse_error_carries_path() {
        let err = parse_module("def broken(:\n    pass", "broken.py").unwrap_err();
        assert!(err.is_parse());
        assert!(err.to_string().contains("broken.py"));
    }
}
