use std::path::{Path, PathBuf};
use std::time::Duration;

use mutscope::Language;
use mutscope::config::{ConfigError, FileConfig, Settings};
use tempfile::TempDir;

fn parse(text: &str) -> Result<FileConfig, ConfigError> {
    FileConfig::parse(text, Path::new("mutscope.toml"))
}

#[test]
fn defaults_without_any_config() {
    let s = Settings::resolve(FileConfig::default(), FileConfig::default(), Some(Language::Python)).unwrap();
    assert_eq!(s.test_cmd, "pytest");
    assert_eq!(s.timeout_factor, 5.0);
    assert_eq!(s.baseline_timeout, Duration::from_secs(600));
    assert_eq!(s.order, 1);
    assert_eq!(s.hom_strategy, "first-to-last");
    assert_eq!(s.percentage, 100);
    assert!(s.operators.is_empty());
    assert!(s.extra_args.contains(&"--tb=short".to_string()));
}

#[test]
fn file_keys_are_parsed() {
    let file = parse(
        r#"
test_cmd = "cargo test"
timeout_factor = 2.5
baseline_timeout_secs = 30
order = 3
hom_strategy = "random"
seed = 9
operators = ["arith", "boundary"]
coverage_report = "cov.json"
"#,
    )
    .unwrap();
    let s = Settings::resolve(FileConfig::default(), file, Some(Language::Rust)).unwrap();
    assert_eq!(s.test_cmd, "cargo test");
    assert_eq!(s.timeout_factor, 2.5);
    assert_eq!(s.baseline_timeout, Duration::from_secs(30));
    assert_eq!(s.order, 3);
    assert_eq!(s.hom_strategy, "random");
    assert_eq!(s.seed, Some(9));
    assert_eq!(s.operators, vec!["arith", "boundary"]);
    assert_eq!(s.coverage_report, Some(PathBuf::from("cov.json")));
    assert_eq!(s.extra_args, vec!["--", "--test-threads=1"]);
}

#[test]
fn command_line_wins_over_the_file() {
    let file = parse("test_cmd = \"pytest\"\norder = 2\nextra_args = []\n").unwrap();
    let overrides = FileConfig {
        test_cmd: Some("npx jest".to_string()),
        ..FileConfig::default()
    };
    let s = Settings::resolve(overrides, file, Some(Language::JavaScript)).unwrap();
    assert_eq!(s.test_cmd, "npx jest");
    assert_eq!(s.order, 2);
    assert!(s.extra_args.is_empty());
}

#[test]
fn unknown_keys_are_rejected() {
    let err = parse("test_command = \"pytest\"\n").unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
    assert!(err.to_string().starts_with("invalid config mutscope.toml"));
}

#[test]
fn invalid_values_are_rejected() {
    for text in [
        "timeout_factor = 0.0",
        "timeout_factor = -1.0",
        "timeout_factor = inf",
        "timeout_factor = nan",
        "timeout_factor = 1e20",
        "order = 0",
        "percentage = 0",
        "percentage = 101",
    ] {
        let file = parse(text).unwrap();
        let err = Settings::resolve(FileConfig::default(), file, None).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)), "{text}");
    }
}

#[test]
fn load_finds_the_default_file() {
    let dir = TempDir::new().unwrap();
    assert_eq!(FileConfig::load(None, dir.path()).unwrap(), FileConfig::default());

    std::fs::write(dir.path().join("mutscope.toml"), "percentage = 40\n").unwrap();
    assert_eq!(FileConfig::load(None, dir.path()).unwrap().percentage, Some(40));
}

#[test]
fn load_reports_a_missing_explicit_file() {
    let dir = TempDir::new().unwrap();
    let err = FileConfig::load(Some(&dir.path().join("custom.toml")), dir.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
}

#[test]
fn command_line_timeout_factor_must_be_finite() {
    let overrides = FileConfig {
        timeout_factor: Some(f64::INFINITY),
        ..FileConfig::default()
    };
    let err = Settings::resolve(overrides, FileConfig::default(), None).unwrap_err();
    assert!(err.to_string().starts_with("timeout factor must be in"));

    let overrides = FileConfig {
        timeout_factor: Some(Settings::MAX_TIMEOUT_FACTOR),
        ..FileConfig::default()
    };
    assert!(Settings::resolve(overrides, FileConfig::default(), None).is_ok());
}
