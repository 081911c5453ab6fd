//! `mutscope.toml` and the settings a run resolves from it and the command line.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::Language;
use crate::runner::default_extra_args;

pub const CONFIG_FILE: &str = "mutscope.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{0}")]
    Invalid(String),
}

/// Every key is optional; the command line wins over the file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub test_cmd: Option<String>,
    pub extra_args: Option<Vec<String>>,
    pub timeout_factor: Option<f64>,
    pub baseline_timeout_secs: Option<u64>,
    pub order: Option<usize>,
    pub hom_strategy: Option<String>,
    pub percentage: Option<u8>,
    pub seed: Option<u64>,
    pub operators: Option<Vec<String>>,
    pub coverage_report: Option<PathBuf>,
}

impl FileConfig {
    pub fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `explicit`, or `mutscope.toml` in `dir` when it exists.
    pub fn load(explicit: Option<&Path>, dir: &Path) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(p) => p.to_path_buf(),
            None => {
                let default = dir.join(CONFIG_FILE);
                if !default.exists() {
                    return Ok(FileConfig::default());
                }
                default
            }
        };
        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let config = Self::parse(&text, &path)?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub test_cmd: String,
    pub extra_args: Vec<String>,
    pub timeout_factor: f64,
    pub baseline_timeout: Duration,
    pub order: usize,
    pub hom_strategy: String,
    pub percentage: u8,
    pub seed: Option<u64>,
    pub operators: Vec<String>,
    pub coverage_report: Option<PathBuf>,
}

impl Settings {
    pub const DEFAULT_TEST_CMD: &str = "pytest";
    pub const DEFAULT_TIMEOUT_FACTOR: f64 = 5.0;
    pub const DEFAULT_BASELINE_TIMEOUT: Duration = Duration::from_secs(600);
    pub const DEFAULT_STRATEGY: &str = "first-to-last";
    pub const MAX_TIMEOUT_FACTOR: f64 = 1000.0;

    /// Fill the gaps in `overrides` from `file`, then from defaults.
    pub fn resolve(overrides: FileConfig, file: FileConfig, language: Option<Language>) -> Result<Self, ConfigError> {
        let settings = Settings {
            test_cmd: overrides
                .test_cmd
                .or(file.test_cmd)
                .unwrap_or_else(|| Self::DEFAULT_TEST_CMD.to_string()),
            extra_args: overrides
                .extra_args
                .or(file.extra_args)
                .unwrap_or_else(|| default_extra_args(language)),
            timeout_factor: overrides
                .timeout_factor
                .or(file.timeout_factor)
                .unwrap_or(Self::DEFAULT_TIMEOUT_FACTOR),
            baseline_timeout: overrides
                .baseline_timeout_secs
                .or(file.baseline_timeout_secs)
                .map(Duration::from_secs)
                .unwrap_or(Self::DEFAULT_BASELINE_TIMEOUT),
            order: overrides.order.or(file.order).unwrap_or(1),
            hom_strategy: overrides
                .hom_strategy
                .or(file.hom_strategy)
                .unwrap_or_else(|| Self::DEFAULT_STRATEGY.to_string()),
            percentage: overrides.percentage.or(file.percentage).unwrap_or(100),
            seed: overrides.seed.or(file.seed),
            operators: overrides.operators.or(file.operators).unwrap_or_default(),
            coverage_report: overrides.coverage_report.or(file.coverage_report),
        };
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let factor = self.timeout_factor;
        if !factor.is_finite() || factor <= 0.0 || factor > Self::MAX_TIMEOUT_FACTOR {
            return Err(ConfigError::Invalid(format!(
                "timeout factor must be in (0, {}], got {}",
                Self::MAX_TIMEOUT_FACTOR,
                factor
            )));
        }
        if self.order == 0 {
            return Err(ConfigError::Invalid("order must be at least 1".to_string()));
        }
        if self.percentage == 0 || self.percentage > 100 {
            return Err(ConfigError::Invalid(format!(
                "percentage must be between 1 and 100, got {}",
                self.percentage
            )));
        }
        Ok(())
    }
}
