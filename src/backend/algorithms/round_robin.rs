//! Round-robin load balancing algorithm.

use super::{Selector, distinct_endpoints};
use crate::backend::Server;
use crate::backend::server::is_valid_endpoint;
use crate::config::{LoadBalancingConfig, Policy};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

/// Round-robin load balancer.
///
/// Hands out servers in configured order, wrapping around at the end.
pub struct RoundRobin {
    state: Mutex<RoundRobinState>,
}

#[derive(Default)]
struct RoundRobinState {
    servers: Vec<String>,
    /// Position of the next server to hand out.
    cursor: usize,
}

impl RoundRobin {
    /// Create a round-robin load balancer with no servers.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RoundRobinState::default()),
        }
    }

    /// Create a round-robin load balancer from a configuration snapshot.
    pub fn from_config(snapshot: &LoadBalancingConfig) -> Self {
        let rr = Self::new();
        rr.on_configuration_changed(snapshot);
        rr
    }

    /// Position of the next server to hand out.
    pub fn cursor(&self) -> usize {
        self.state.lock().cursor
    }

    /// The servers currently in rotation.
    pub fn servers(&self) -> Vec<Server> {
        self.state
            .lock()
            .servers
            .iter()
            .map(|endpoint| Server::new(endpoint.as_str()))
            .collect()
    }
}

impl Default for RoundRobin {
    fn default() -> Self {
        Self::new()
    }
}

impl Selector for RoundRobin {
    fn policy(&self) -> Policy {
        Policy::RoundRobin
    }

    fn select(&self, _session_id: Option<&str>) -> Option<Server> {
        let mut state = self.state.lock();

        if state.servers.is_empty() {
            warn!(policy = %Policy::RoundRobin, "no servers loaded in configuration");
            return None;
        }

        let index = state.cursor;
        state.cursor = (index + 1) % state.servers.len();

        let endpoint = &state.servers[index];
        if !is_valid_endpoint(endpoint) {
            warn!(policy = %Policy::RoundRobin, index, "no server found at index");
            return None;
        }

        debug!(policy = %Policy::RoundRobin, server = %endpoint, index, "selected server");
        Some(Server::new(endpoint.as_str()))
    }

    fn on_configuration_changed(&self, snapshot: &LoadBalancingConfig) {
        let next = RoundRobinState {
            servers: distinct_endpoints(Policy::RoundRobin, &snapshot.servers),
            cursor: 0,
        };
        let count = next.servers.len();

        *self.state.lock() = next;

        info!(policy = %Policy::RoundRobin, servers = count, "selection state rebuilt");
    }
}
