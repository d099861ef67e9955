//! Upstream server identity.

use std::fmt;

/// A backend server, identified by its endpoint (e.g. `http://10.0.0.1:8080`).
///
/// The endpoint is both the server's identity and its network destination.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Server {
    endpoint: String,
}

impl Server {
    /// Create a server from its endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }

    /// The endpoint string.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// An empty or whitespace-only endpoint cannot be routed to.
    pub fn is_valid(&self) -> bool {
        is_valid_endpoint(&self.endpoint)
    }
}

impl fmt::Display for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.endpoint)
    }
}

impl From<&str> for Server {
    fn from(endpoint: &str) -> Self {
        Self::new(endpoint)
    }
}

impl From<String> for Server {
    fn from(endpoint: String) -> Self {
        Self::new(endpoint)
    }
}

/// Whether a configured endpoint string is usable.
pub(crate) fn is_valid_endpoint(endpoint: &str) -> bool {
    !endpoint.trim().is_empty()
}
