//! Least-connections load balancing algorithm.

use super::{Releaser, Selector, distinct_endpoints};
use crate::backend::Server;
use crate::backend::server::is_valid_endpoint;
use crate::config::{LoadBalancingConfig, Policy};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

/// Least-connections load balancer.
///
/// Sends requests to the server with the fewest active connections.
/// Ties go to the server listed first in the configuration.
pub struct LeastConnections {
    /// Active connection count per server, in configured order.
    state: Mutex<Vec<(String, u32)>>,
}

impl LeastConnections {
    /// Create a least-connections load balancer with no servers.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(Vec::new()),
        }
    }

    /// Create a least-connections load balancer from a configuration snapshot.
    pub fn from_config(snapshot: &LoadBalancingConfig) -> Self {
        let lc = Self::new();
        lc.on_configuration_changed(snapshot);
        lc
    }

    /// Active connections for `server`, or `None` if it is not tracked.
    pub fn connection_count(&self, server: &Server) -> Option<u32> {
        self.state
            .lock()
            .iter()
            .find(|(endpoint, _)| endpoint == server.endpoint())
            .map(|(_, count)| *count)
    }

    /// The servers currently tracked, in order.
    pub fn servers(&self) -> Vec<Server> {
        self.state
            .lock()
            .iter()
            .map(|(endpoint, _)| Server::new(endpoint.as_str()))
            .collect()
    }
}

impl Default for LeastConnections {
    fn default() -> Self {
        Self::new()
    }
}

impl Selector for LeastConnections {
    fn policy(&self) -> Policy {
        Policy::LeastConnections
    }

    fn select(&self, _session_id: Option<&str>) -> Option<Server> {
        let mut servers = self.state.lock();

        if servers.is_empty() {
            warn!(policy = %Policy::LeastConnections, "no servers loaded in configuration");
            return None;
        }

        // Find server with minimum connections; strict comparison keeps the first on ties.
        let mut selected: Option<usize> = None;
        for (index, (endpoint, count)) in servers.iter().enumerate() {
            if !is_valid_endpoint(endpoint) {
                continue;
            }
            if selected.is_none_or(|best| *count < servers[best].1) {
                selected = Some(index);
            }
        }

        let Some(index) = selected else {
            warn!(policy = %Policy::LeastConnections, "no valid server entries in configuration");
            return None;
        };

        let (endpoint, count) = &mut servers[index];
        *count += 1;

        debug!(
            policy = %Policy::LeastConnections,
            server = %endpoint,
            connections = *count,
            "selected server"
        );
        Some(Server::new(endpoint.as_str()))
    }

    fn on_configuration_changed(&self, snapshot: &LoadBalancingConfig) {
        let next: Vec<(String, u32)> =
            distinct_endpoints(Policy::LeastConnections, &snapshot.servers)
                .into_iter()
                .map(|endpoint| (endpoint, 0))
                .collect();
        let count = next.len();

        *self.state.lock() = next;

        info!(policy = %Policy::LeastConnections, servers = count, "selection state rebuilt");
    }
}

impl Releaser for LeastConnections {
    fn release(&self, server: &Server) {
        let mut servers = self.state.lock();

        match servers
            .iter_mut()
            .find(|(endpoint, _)| endpoint == server.endpoint())
        {
            // Prevent underflow
            Some((_, count)) if *count > 0 => {
                *count -= 1;
                debug!(
                    policy = %Policy::LeastConnections,
                    server = %server,
                    connections = *count,
                    "released connection"
                );
            }
            Some(_) => {
                debug!(policy = %Policy::LeastConnections, server = %server, "release with no active connections ignored");
            }
            None => {
                debug!(policy = %Policy::LeastConnections, server = %server, "release for untracked server ignored");
            }
        }
    }
}
