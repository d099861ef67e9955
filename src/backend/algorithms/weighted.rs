//! Weighted round-robin load balancing algorithm.

use super::{Selector, distinct_endpoints};
use crate::backend::Server;
use crate::backend::server::is_valid_endpoint;
use crate::config::{LoadBalancingConfig, Policy};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

/// Turns granted per position in the configured order.
const WEIGHT_STEP: u32 = 5;

/// Weighted round-robin load balancer.
///
/// Each server gets a budget of turns when the configuration is loaded:
/// `(server_count - index) * 5`, so servers listed earlier get more turns.
/// Servers with budget left are visited in rotation. Once every budget is spent
/// selection returns `None` until the next configuration change refills them.
pub struct WeightedRoundRobin {
    state: Mutex<WeightedState>,
}

#[derive(Default)]
struct WeightedState {
    /// Endpoint and remaining weight, in configured order.
    entries: Vec<(String, u32)>,
    /// Position right after the last served entry.
    cursor: usize,
}

impl WeightedState {
    fn build(servers: Vec<String>) -> Self {
        let count = servers.len() as u32;
        let entries = servers
            .into_iter()
            .enumerate()
            .map(|(index, endpoint)| {
                let weight = if is_valid_endpoint(&endpoint) {
                    (count - index as u32) * WEIGHT_STEP
                } else {
                    0
                };
                (endpoint, weight)
            })
            .collect();

        Self { entries, cursor: 0 }
    }
}

impl WeightedRoundRobin {
    /// Create a weighted round-robin load balancer with no servers.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(WeightedState::default()),
        }
    }

    /// Create a weighted round-robin load balancer from a configuration snapshot.
    pub fn from_config(snapshot: &LoadBalancingConfig) -> Self {
        let wrr = Self::new();
        wrr.on_configuration_changed(snapshot);
        wrr
    }

    /// Remaining turns for `server`, or `None` if it is not configured.
    pub fn remaining_weight(&self, server: &Server) -> Option<u32> {
        self.state
            .lock()
            .entries
            .iter()
            .find(|(endpoint, _)| endpoint == server.endpoint())
            .map(|(_, weight)| *weight)
    }

    /// Total turns left across all servers.
    pub fn total_remaining(&self) -> u32 {
        self.state.lock().entries.iter().map(|(_, w)| *w).sum()
    }

    /// The servers currently configured, in order.
    pub fn servers(&self) -> Vec<Server> {
        self.state
            .lock()
            .entries
            .iter()
            .map(|(endpoint, _)| Server::new(endpoint.as_str()))
            .collect()
    }
}

impl Default for WeightedRoundRobin {
    fn default() -> Self {
        Self::new()
    }
}

impl Selector for WeightedRoundRobin {
    fn policy(&self) -> Policy {
        Policy::WeightedRoundRobin
    }

    fn select(&self, _session_id: Option<&str>) -> Option<Server> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let len = state.entries.len();
        if len == 0 {
            warn!(policy = %Policy::WeightedRoundRobin, "no servers loaded in configuration");
            return None;
        }

        for step in 0..len {
            let index = (state.cursor + step) % len;
            let (endpoint, weight) = &mut state.entries[index];

            if *weight > 0 {
                *weight -= 1;
                state.cursor = (index + 1) % len;

                debug!(
                    policy = %Policy::WeightedRoundRobin,
                    server = %endpoint,
                    remaining = *weight,
                    "selected server"
                );
                return Some(Server::new(endpoint.as_str()));
            }
        }

        // Full cycle without budget. Weights are only refilled by a reload.
        state.cursor = (state.cursor + 1) % len;
        warn!(policy = %Policy::WeightedRoundRobin, "all server weights exhausted");
        None
    }

    fn on_configuration_changed(&self, snapshot: &LoadBalancingConfig) {
        let next = WeightedState::build(distinct_endpoints(
            Policy::WeightedRoundRobin,
            &snapshot.servers,
        ));
        let count = next.entries.len();

        *self.state.lock() = next;

        info!(policy = %Policy::WeightedRoundRobin, servers = count, "selection state rebuilt");
    }
}
