use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::binder::DEFAULT_ORACLE_TIMEOUT;
use crate::domain::proof::BackendMode;
use crate::registry::DEFAULT_LEDGER_TIMEOUT;
use crate::retry::RetryPolicy;
use crate::threshold::DEFAULT_PROVER_TIMEOUT;

/// Pipeline configuration loaded from TOML. Every section is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub retry: RetryPolicy,
    pub timeouts: Timeouts,
    pub prover: ProverConfig,
}

/// Per-collaborator call deadlines (e.g. "10s", "5m"). Parsed via humantime.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    #[serde(with = "humantime_serde")]
    pub ledger: Duration,
    #[serde(with = "humantime_serde")]
    pub oracle: Duration,
    #[serde(with = "humantime_serde")]
    pub prover: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            ledger: DEFAULT_LEDGER_TIMEOUT,
            oracle: DEFAULT_ORACLE_TIMEOUT,
            prover: DEFAULT_PROVER_TIMEOUT,
        }
    }
}

/// Proving backend selection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProverConfig {
    /// `simulated` is only accepted by builds with the `simulation` feature.
    pub mode: BackendMode,
    /// Directory containing the `threshold/` Noir package.
    pub circuits_dir: PathBuf,
}

impl Default for ProverConfig {
    fn default() -> Self {
        Self {
            mode: BackendMode::Live,
            circuits_dir: PathBuf::from("circuits"),
        }
    }
}

/// Errors from config loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

impl PipelineConfig {
    /// Load and validate a config from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a config from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Validation(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if self.retry.multiplier == 0 {
            return Err(ConfigError::Validation(
                "retry.multiplier must be at least 1".into(),
            ));
        }
        if self.retry.initial_backoff > self.retry.max_backoff {
            return Err(ConfigError::Validation(
                "retry.initial_backoff must not exceed retry.max_backoff".into(),
            ));
        }

        for (name, timeout) in [
            ("ledger", self.timeouts.ledger),
            ("oracle", self.timeouts.oracle),
            ("prover", self.timeouts.prover),
        ] {
            if timeout.is_zero() {
                return Err(ConfigError::Validation(format!(
                    "timeouts.{name} must be greater than zero"
                )));
            }
        }

        if self.prover.mode == BackendMode::Simulated && !cfg!(feature = "simulation") {
            return Err(ConfigError::Validation(
                "prover.mode = \"simulated\" requires a build with the `simulation` feature"
                    .into(),
            ));
        }

        Ok(())
    }
}
