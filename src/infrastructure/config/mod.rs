//! Configuration loading and the runtime config store.

pub mod store;

pub use store::ConfigStore;

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid port: 0")]
    InvalidPort,

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid quorum threshold: {0}. Must be within [0, 1]")]
    InvalidQuorumThreshold(f64),

    #[error("Invalid quorum agents: {0}. Must be between 1 and 3")]
    InvalidQuorumAgents(usize),

    #[error("Invalid max_agent_iterations: {0}. Must be at least 2")]
    InvalidAgentIterations(usize),

    #[error("Invalid {0}: must be positive")]
    InvalidInterval(&'static str),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. guardian.yaml (deployment config)
    /// 3. Environment variables (GUARDIAN_* prefix, highest priority)
    pub fn load() -> Result<Config> {
        Self::load_with_file("guardian.yaml")
    }

    /// Load configuration using a specific YAML file.
    pub fn load_with_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("GUARDIAN_"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.port == 0 {
            return Err(ConfigError::InvalidPort);
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.log_level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.log_level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.log_format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.log_format.clone()));
        }

        if !(0.0..=1.0).contains(&config.quorum_threshold) {
            return Err(ConfigError::InvalidQuorumThreshold(config.quorum_threshold));
        }

        if config.quorum_agents == 0 || config.quorum_agents > 3 {
            return Err(ConfigError::InvalidQuorumAgents(config.quorum_agents));
        }

        if config.max_agent_iterations < 2 {
            return Err(ConfigError::InvalidAgentIterations(
                config.max_agent_iterations,
            ));
        }

        for (name, value) in [
            ("fast_loop_interval_seconds", config.fast_loop_interval_seconds),
            ("scan_interval_seconds", config.scan_interval_seconds),
            ("anomaly_suppression_window", config.anomaly_suppression_window),
            ("anomaly_batch_window", config.anomaly_batch_window),
            ("correlation_window_seconds", config.correlation_window_seconds),
            ("correlation_debounce_seconds", config.correlation_debounce_seconds),
            ("correlation_expiry_seconds", config.correlation_expiry_seconds),
            ("max_actions_per_hour", config.max_actions_per_hour),
            ("escalation_threshold", config.escalation_threshold),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidInterval(name));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        ConfigLoader::validate(&config).expect("default config should be valid");
    }

    #[test]
    fn test_validate_zero_port() {
        let config = Config {
            port: 0,
            ..Default::default()
        };
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidPort
        ));
    }

    #[test]
    fn test_validate_bad_log_level() {
        let config = Config {
            log_level: "verbose".to_string(),
            ..Default::default()
        };
        match ConfigLoader::validate(&config).unwrap_err() {
            ConfigError::InvalidLogLevel(level) => assert_eq!(level, "verbose"),
            other => panic!("expected InvalidLogLevel, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_quorum_threshold_bounds() {
        let config = Config {
            quorum_threshold: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidQuorumThreshold(_)
        ));
    }

    #[test]
    fn test_validate_zero_interval() {
        let config = Config {
            fast_loop_interval_seconds: 0,
            ..Default::default()
        };
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidInterval("fast_loop_interval_seconds")
        ));
    }

    #[test]
    fn test_yaml_file_overrides_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "port: 9200\nmax_actions_per_hour: 5\nlog_format: pretty"
        )
        .unwrap();
        file.flush().unwrap();

        let config = ConfigLoader::load_with_file(file.path()).unwrap();
        assert_eq!(config.port, 9200);
        assert_eq!(config.max_actions_per_hour, 5);
        assert_eq!(config.log_format, "pretty");
        // Untouched fields keep defaults
        assert_eq!(config.fast_loop_interval_seconds, 30);
    }
}
