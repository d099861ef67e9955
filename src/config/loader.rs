//! Configuration file loading.

use crate::config::{Config, validate_config};
use std::path::Path;
use thiserror::Error;
use tracing::warn;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("configuration validation failed: {0}")]
    ValidationError(String),
}

/// Load configuration from a YAML file.
///
/// This function reads the file, parses the YAML, and validates the configuration.
/// Validation warnings are logged and do not fail the load.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();

    let contents = std::fs::read_to_string(path)?;
    let config = parse_config(&contents)?;

    for warning in validate_config(&config).map_err(ConfigError::ValidationError)? {
        warn!(path = %path.display(), "{}", warning);
    }

    Ok(config)
}

/// Parse configuration from a YAML string without validating it.
pub fn parse_config(contents: &str) -> Result<Config, ConfigError> {
    // An empty document is a valid, all-defaults configuration.
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    Ok(serde_yaml::from_str(contents)?)
}
