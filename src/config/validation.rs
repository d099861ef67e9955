//! Configuration validation.

use crate::config::{Config, Policy};
use std::collections::HashSet;

/// Validate the configuration.
///
/// Rejects:
/// - An unknown log level
/// - Duplicate server endpoints
/// - A zero forward timeout
/// - A metrics path that does not start with `/`
/// - An empty session header name
///
/// An unknown policy, an empty server list and blank endpoint entries are
/// tolerated by the selection algorithms, so they only produce warnings.
///
/// # Returns
///
/// The list of warnings if valid, or an error message describing the problems.
pub fn validate_config(config: &Config) -> Result<Vec<String>, String> {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let lb = &config.load_balancing;

    if lb.policy.trim().is_empty() {
        warnings.push("no load balancing policy configured; requests will be rejected".to_string());
    } else if Policy::parse(&lb.policy).is_none() {
        warnings.push(format!(
            "unknown load balancing policy '{}', expected one of: {}",
            lb.policy,
            Policy::ALL.map(|p| p.as_str()).join(", ")
        ));
    }

    if lb.servers.is_empty() {
        warnings.push("no servers configured; requests will be rejected".to_string());
    }

    let mut seen = HashSet::new();
    for (index, endpoint) in lb.servers.iter().enumerate() {
        if endpoint.trim().is_empty() {
            warnings.push(format!("server entry {} has an empty endpoint", index));
            continue;
        }
        if !seen.insert(endpoint.as_str()) {
            errors.push(format!("duplicate server endpoint: {}", endpoint));
        }
    }

    if config.listener.forward_timeout.is_zero() {
        errors.push("forward_timeout must be greater than zero".to_string());
    }

    if config.listener.session_header.trim().is_empty() {
        errors.push("session_header cannot be empty".to_string());
    }

    if !config.global.metrics.path.starts_with('/') {
        errors.push(format!(
            "metrics path '{}' must start with '/'",
            config.global.metrics.path
        ));
    }

    // Validate log level
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.global.log_level.to_lowercase().as_str()) {
        errors.push(format!(
            "invalid log level '{}', must be one of: {}",
            config.global.log_level,
            valid_levels.join(", ")
        ));
    }

    if errors.is_empty() {
        Ok(warnings)
    } else {
        Err(errors.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::*;
    use std::time::Duration;

    fn minimal_config() -> Config {
        Config {
            load_balancing: LoadBalancingConfig::new(
                "RoundRobin",
                ["http://127.0.0.1:9001", "http://127.0.0.1:9002"],
            ),
            ..Config::default()
        }
    }

    #[test]
    fn test_valid_config() {
        let warnings = validate_config(&minimal_config()).unwrap();
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_unknown_policy_is_warning() {
        let mut config = minimal_config();
        config.load_balancing.policy = "Random".to_string();
        let warnings = validate_config(&config).unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("unknown load balancing policy 'Random'"));
    }

    #[test]
    fn test_empty_servers_is_warning() {
        let mut config = minimal_config();
        config.load_balancing.servers.clear();
        let warnings = validate_config(&config).unwrap();
        assert!(warnings.iter().any(|w| w.contains("no servers configured")));
    }

    #[test]
    fn test_blank_endpoint_is_warning() {
        let mut config = minimal_config();
        config.load_balancing.servers.push("   ".to_string());
        let warnings = validate_config(&config).unwrap();
        assert!(warnings.iter().any(|w| w.contains("server entry 2")));
    }

    #[test]
    fn test_duplicate_servers() {
        let mut config = minimal_config();
        config
            .load_balancing
            .servers
            .push("http://127.0.0.1:9001".to_string());
        let result = validate_config(&config);
        assert!(result.unwrap_err().contains("duplicate server endpoint"));
    }

    #[test]
    fn test_zero_forward_timeout() {
        let mut config = minimal_config();
        config.listener.forward_timeout = Duration::ZERO;
        let result = validate_config(&config);
        assert!(result.unwrap_err().contains("forward_timeout"));
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = minimal_config();
        config.global.log_level = "verbose".to_string();
        let result = validate_config(&config);
        assert!(result.unwrap_err().contains("invalid log level"));
    }

    #[test]
    fn test_errors_are_joined() {
        let mut config = minimal_config();
        config.global.log_level = "verbose".to_string();
        config.global.metrics.path = "metrics".to_string();
        let err = validate_config(&config).unwrap_err();
        assert!(err.contains("; "));
        assert!(err.contains("must start with '/'"));
    }
}
