//! Configuration data types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Global settings
    #[serde(default)]
    pub global: GlobalConfig,

    /// Inbound listener settings
    #[serde(default)]
    pub listener: ListenerConfig,

    /// Selection policy and upstream servers
    #[serde(default)]
    pub load_balancing: LoadBalancingConfig,
}

/// Global configuration settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GlobalConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::Json,
            metrics: MetricsConfig::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Metrics endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    /// Whether metrics endpoint is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Address to bind metrics server
    #[serde(default = "default_metrics_address")]
    pub address: SocketAddr,

    /// Path for metrics endpoint
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            address: default_metrics_address(),
            path: default_metrics_path(),
        }
    }
}

/// Inbound HTTP listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListenerConfig {
    /// Address and port to listen on
    #[serde(default = "default_listen_address")]
    pub listen: SocketAddr,

    /// Upper bound on a single forwarded exchange
    #[serde(default = "default_forward_timeout", with = "humantime_serde")]
    pub forward_timeout: Duration,

    /// Request header carrying the sticky session id
    #[serde(default = "default_session_header")]
    pub session_header: String,

    /// Cookie carrying the sticky session id, consulted when the header is absent
    #[serde(default = "default_session_cookie")]
    pub session_cookie: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_address(),
            forward_timeout: default_forward_timeout(),
            session_header: default_session_header(),
            session_cookie: default_session_cookie(),
        }
    }
}

/// The load-balancing snapshot: selection policy plus ordered upstream endpoints.
///
/// The policy is kept as the raw identifier so that an unknown value can be
/// carried through to the factory and reported there instead of failing the load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct LoadBalancingConfig {
    /// Policy identifier, see [`Policy`]
    #[serde(default)]
    pub policy: String,

    /// Upstream endpoints, in priority order
    #[serde(default)]
    pub servers: Vec<String>,
}

impl LoadBalancingConfig {
    /// Build a snapshot from a policy identifier and endpoint list.
    pub fn new<I, S>(policy: impl Into<String>, servers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            policy: policy.into(),
            servers: servers.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse the configured policy identifier.
    pub fn parsed_policy(&self) -> Option<Policy> {
        Policy::parse(&self.policy)
    }
}

/// Server-selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Policy {
    RoundRobin,
    WeightedRoundRobin,
    LeastConnections,
    StickySession,
}

impl Policy {
    /// Every recognised policy.
    pub const ALL: [Policy; 4] = [
        Policy::RoundRobin,
        Policy::WeightedRoundRobin,
        Policy::LeastConnections,
        Policy::StickySession,
    ];

    /// Resolve a policy identifier. Returns `None` for anything unrecognised.
    pub fn parse(identifier: &str) -> Option<Self> {
        match identifier.trim() {
            "RoundRobin" => Some(Policy::RoundRobin),
            "WeightedRoundRobin" => Some(Policy::WeightedRoundRobin),
            "LeastConnections" => Some(Policy::LeastConnections),
            "StickySession" => Some(Policy::StickySession),
            _ => None,
        }
    }

    /// The canonical identifier for this policy.
    pub fn as_str(&self) -> &'static str {
        match self {
            Policy::RoundRobin => "RoundRobin",
            Policy::WeightedRoundRobin => "WeightedRoundRobin",
            Policy::LeastConnections => "LeastConnections",
            Policy::StickySession => "StickySession",
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Json
}

fn default_true() -> bool {
    true
}

fn default_metrics_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9090))
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_listen_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_forward_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_session_header() -> String {
    "x-session-id".to_string()
}

fn default_session_cookie() -> String {
    "session_id".to_string()
}

/// Custom serde module for humantime durations.
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
