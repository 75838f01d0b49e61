use connascence::{CacheConfig, Config, ConnascenceAnalyzer, Severity, ViolationType};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn analyzer() -> ConnascenceAnalyzer {
    ConnascenceAnalyzer::from_config(&Config {
        cache: CacheConfig::in_memory(),
        ..Config::default()
    })
}

fn write(dir: &TempDir, name: &str, source: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, source).unwrap();
    path
}

#[test]
fn test_eight_parameter_function() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "params.py",
        "def configure(host, port, user, password, timeout, retries, verbose, debug):\n    return host\n",
    );

    let result = analyzer().analyze_file(&path).unwrap();

    let found = result.of_type(ViolationType::ParameterCoupling);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].severity, Severity::Medium);
    assert_eq!(found[0].line, 1);
    assert_eq!(result.total, 1);
}

#[test]
fn test_twenty_five_method_class() {
    let dir = TempDir::new().unwrap();
    let mut source = String::from("class Manager:\n");
    for i in 0..25 {
        source.push_str(&format!("    def action_{i}(self):\n        return self\n"));
    }
    let path = write(&dir, "god.py", &source);

    let result = analyzer().analyze_file(&path).unwrap();

    let found = result.of_type(ViolationType::GodObject);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].severity, Severity::Medium);
    assert_eq!(result.total, 1);
}

#[test]
fn test_clean_file_has_no_violations() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "clean.py", "def add(a, b):\n    return a + b\n");

    let result = analyzer().analyze_file(&path).unwrap();
    assert!(result.is_clean());
    assert_eq!(result.max_severity(), None);
}

#[test]
fn test_json_output_shape() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "magic.py", "if status == 'pending':\n    retry = 17\n");

    let result = analyzer().analyze_file(&path).unwrap();
    let json: serde_json::Value = serde_json::to_value(result.as_ref()).unwrap();

    let magic = &json["violations"]["magic_literal"];
    assert_eq!(magic.as_array().unwrap().len(), 2);
    assert_eq!(magic[0]["type"], "magic_literal");
    assert_eq!(magic[0]["severity"], "low");
}

#[test]
fn test_case_pattern_literals_are_checked() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "cases.py",
        "def expiry(code):\n    match code:\n        case 404:\n            return 0\n        case 86400:\n            return 1\n",
    );

    let result = analyzer().analyze_file(&path).unwrap();

    let literals = result.of_type(ViolationType::MagicLiteral);
    assert_eq!(literals.len(), 1);
    assert_eq!(literals[0].line, 5);
    assert_eq!(literals[0].severity, Severity::Low);
}
