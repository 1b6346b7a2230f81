//! Configuration loading from multiple sources

use crate::{AppConfig, ConfigError, Result};
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use std::path::Path;
use tracing::debug;

/// Default prefix for environment overrides
pub const ENV_PREFIX: &str = "AUCTION_SETTLEMENT";

/// Separates a section from its key in environment variable names
const ENV_KEY_SEPARATOR: &str = "__";

/// Configuration loader with support for multiple formats and sources
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a file
    ///
    /// Supports TOML, YAML, and JSON formats based on file extension
    pub fn from_file(path: &Path) -> Result<AppConfig> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| ConfigError::LoadError("No file extension found".to_string()))?;

        let content = std::fs::read_to_string(path)?;
        debug!(path = %path.display(), format = extension, "Loading configuration file");

        match extension {
            "toml" => Self::from_toml(&content),
            "yaml" | "yml" => Self::from_yaml(&content),
            "json" => Self::from_json(&content),
            _ => Err(ConfigError::LoadError(format!(
                "Unsupported file extension: {}",
                extension
            ))),
        }
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<AppConfig> {
        toml::from_str(content).map_err(ConfigError::from)
    }

    /// Load configuration from YAML string
    pub fn from_yaml(content: &str) -> Result<AppConfig> {
        serde_yaml::from_str(content).map_err(ConfigError::from)
    }

    /// Load configuration from JSON string
    pub fn from_json(content: &str) -> Result<AppConfig> {
        serde_json::from_str(content).map_err(ConfigError::from)
    }

    /// Load configuration from environment variables
    ///
    /// Uses default prefix "AUCTION_SETTLEMENT"
    pub fn from_env() -> Result<AppConfig> {
        Self::from_env_with_prefix(ENV_PREFIX)
    }

    /// Load configuration from environment variables with custom prefix
    ///
    /// Environment variables should be in the format: PREFIX_SECTION__KEY
    /// For example: AUCTION_SETTLEMENT_COORDINATOR__THRESHOLD=0.75
    pub fn from_env_with_prefix(prefix: &str) -> Result<AppConfig> {
        let config = Config::builder().add_source(env_source(prefix)).build()?;

        config.try_deserialize().map_err(ConfigError::from)
    }

    /// Merge two configurations, with overlay taking precedence
    ///
    /// Sections are replaced whole; logging directives accumulate.
    pub fn merge(base: AppConfig, overlay: AppConfig) -> AppConfig {
        AppConfig {
            environment: overlay.environment,
            logging: {
                let mut logging = overlay.logging;
                let mut directives = base.logging.directives;
                for directive in logging.directives {
                    if !directives.contains(&directive) {
                        directives.push(directive);
                    }
                }
                logging.directives = directives;
                logging
            },
            metrics: overlay.metrics,
            settlement: overlay.settlement,
            circuit_breaker: overlay.circuit_breaker,
            retry: overlay.retry,
            mev: overlay.mev,
            phantom: overlay.phantom,
            coordinator: overlay.coordinator,
        }
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment values override individual keys of the file, not whole
    /// sections.
    pub fn from_file_with_env(path: &Path, env_prefix: &str) -> Result<AppConfig> {
        Self::builder().add_file(path, true).add_env(env_prefix).build()
    }

    /// Build configuration using the config crate's builder pattern
    ///
    /// This allows for more complex configuration scenarios with multiple sources
    pub fn builder() -> ConfigLoaderBuilder {
        ConfigLoaderBuilder {
            builder: Config::builder(),
        }
    }
}

fn env_source(prefix: &str) -> Environment {
    Environment::with_prefix(prefix)
        .prefix_separator("_")
        .separator(ENV_KEY_SEPARATOR)
        .try_parsing(true)
}

/// Builder for complex configuration loading scenarios
pub struct ConfigLoaderBuilder {
    builder: ConfigBuilder<config::builder::DefaultState>,
}

impl ConfigLoaderBuilder {
    /// Add a configuration file source
    pub fn add_file(mut self, path: &Path, required: bool) -> Self {
        let format = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => FileFormat::Toml,
            Some("yaml") | Some("yml") => FileFormat::Yaml,
            Some("json") => FileFormat::Json,
            _ => FileFormat::Toml, // Default to TOML
        };

        self.builder = self
            .builder
            .add_source(File::from(path).format(format).required(required));
        self
    }

    /// Add environment variable source with prefix
    pub fn add_env(mut self, prefix: &str) -> Self {
        self.builder = self.builder.add_source(env_source(prefix));
        self
    }

    /// Set a default value for a dotted key such as `retry.max_attempts`
    pub fn set_default(mut self, key: &str, value: &str) -> Result<Self> {
        self.builder = self.builder.set_default(key, value)?;
        Ok(self)
    }

    /// Build the final configuration
    pub fn build(self) -> Result<AppConfig> {
        let config = self.builder.build()?;
        config.try_deserialize().map_err(ConfigError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Environment as DeployEnvironment;
    use auction_settlement_phantom::PricingMechanism;
    use rust_decimal::Decimal;

    #[test]
    fn test_load_from_toml() {
        let toml = r#"
            environment = "testnet"

            [logging]
            level = "debug"

            [coordinator]
            threshold = 0.75
            vote_timeout_ms = 2000

            [phantom]
            min_improvement_bps = 2
            mechanism = "vcg"
        "#;

        let config = ConfigLoader::from_toml(toml).unwrap();
        assert_eq!(config.environment, DeployEnvironment::Testnet);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.coordinator.threshold, 0.75);
        assert_eq!(config.coordinator.vote_timeout_ms, 2000);
        // Unset keys fall back to their defaults
        assert_eq!(config.coordinator.heartbeat_multiplier, 3);
        assert_eq!(config.phantom.min_improvement_bps, Decimal::from(2));
        assert_eq!(config.phantom.mechanism, PricingMechanism::Vcg);
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn test_load_from_yaml() {
        let yaml = r#"
environment: mainnet
settlement:
  require_consensus: true
  max_concurrent_settlements: 250
circuit_breaker:
  failure_threshold: 8
        "#;

        let config = ConfigLoader::from_yaml(yaml).unwrap();
        assert_eq!(config.environment, DeployEnvironment::Mainnet);
        assert!(config.settlement.require_consensus);
        assert_eq!(config.settlement.max_concurrent_settlements, 250);
        assert_eq!(config.circuit_breaker.failure_threshold, 8);
    }

    #[test]
    fn test_load_from_json() {
        let json = r#"
{
  "retry": {
    "max_attempts": 5,
    "retryable": ["timeout"]
  },
  "mev": {
    "bond_bps": 250
  }
}
        "#;

        let config = ConfigLoader::from_json(json).unwrap();
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.retryable, vec!["timeout".to_string()]);
        assert_eq!(config.mev_config().bond_percentage, Decimal::new(25, 3));
    }

    #[test]
    fn test_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settlement.ini");
        std::fs::write(&path, "level = debug").unwrap();

        assert!(matches!(
            ConfigLoader::from_file(&path),
            Err(ConfigError::LoadError(_))
        ));
    }

    #[test]
    fn test_builder_defaults() {
        let config = ConfigLoader::builder()
            .set_default("retry.max_attempts", "7")
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(config.retry.max_attempts, 7);
        assert_eq!(config.retry.base_delay_ms, 100);
    }

    #[test]
    fn test_merge_configs() {
        let mut base = AppConfig::default();
        base.logging.directives = vec!["hyper=warn".to_string()];
        base.retry.max_attempts = 9;

        let mut overlay = AppConfig {
            environment: DeployEnvironment::Testnet,
            ..Default::default()
        };
        overlay.logging.level = "debug".to_string();
        overlay.logging.directives = vec!["auction_settlement=trace".to_string()];

        let merged = ConfigLoader::merge(base, overlay);
        assert_eq!(merged.environment, DeployEnvironment::Testnet);
        assert_eq!(merged.logging.level, "debug");
        assert_eq!(
            merged.logging.filter_directive(),
            "debug,hyper=warn,auction_settlement=trace"
        );
        assert_eq!(merged.retry.max_attempts, 3);
    }
}
