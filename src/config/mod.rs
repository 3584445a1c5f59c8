//! Engine configuration.
//!
//! Aggregates configuration from all modules into a single Config struct
//! that can be loaded from YAML files or environment variables.

mod storage;

pub use storage::{SqliteConfig, StorageConfig, StorageType};

use std::time::Duration;

use serde::Deserialize;

use crate::commission::Rounding;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "referral.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "REFERRAL_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "REFERRAL";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "REFERRAL_LOG";

/// Sponsor-chain depth used when a plan has no chain settings.
pub const DEFAULT_MAX_DEPTH: u32 = 10;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub placement: PlacementConfig,
    pub commission: CommissionConfig,
}

/// Retry policy for placements that lose a slot race.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlacementConfig {
    /// Attempts before giving up with a contention error (including the first).
    pub max_attempts: usize,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            min_delay_ms: 5,
            max_delay_ms: 200,
        }
    }
}

impl PlacementConfig {
    pub fn min_delay(&self) -> Duration {
        Duration::from_millis(self.min_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CommissionConfig {
    /// Chain depth used for plans without chain settings.
    pub default_max_depth: u32,
    pub rounding: Rounding,
}

impl Default for CommissionConfig {
    fn default() -> Self {
        Self {
            default_max_depth: DEFAULT_MAX_DEPTH,
            rounding: Rounding::default(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `referral.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config: Config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.placement.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "placement.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.placement.min_delay_ms > self.placement.max_delay_ms {
            return Err(ConfigError::Invalid(
                "placement.min_delay_ms exceeds placement.max_delay_ms".to_string(),
            ));
        }
        if self.commission.default_max_depth == 0 {
            return Err(ConfigError::Invalid(
                "commission.default_max_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.storage.storage_type, StorageType::Sqlite);
        assert_eq!(config.placement.max_attempts, 8);
        assert_eq!(config.commission.default_max_depth, DEFAULT_MAX_DEPTH);
        assert_eq!(config.commission.rounding, Rounding::HalfUp);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let mut config = Config::default();
        config.placement.max_attempts = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_inverted_delays() {
        let mut config = Config::default();
        config.placement.min_delay_ms = 500;
        config.placement.max_delay_ms = 10;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_load_from_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.yaml");
        std::fs::write(
            &path,
            "storage:\n  type: memory\nplacement:\n  max_attempts: 3\ncommission:\n  default_max_depth: 4\n  rounding: half_even\n",
        )
        .unwrap();

        let config = Config::load(path.to_str()).unwrap();
        assert_eq!(config.storage.storage_type, StorageType::Memory);
        assert_eq!(config.placement.max_attempts, 3);
        assert_eq!(config.commission.default_max_depth, 4);
        assert_eq!(config.commission.rounding, Rounding::HalfEven);
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let result = Config::load(Some("/nonexistent/referral-engine.yaml"));
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }
}
