//! Server-selection algorithms.
//!
//! Every algorithm owns its selection state behind a single lock and rebuilds
//! that state wholesale whenever it is told the configuration changed.

mod least_conn;
mod round_robin;
mod sticky;
mod weighted;

pub use least_conn::LeastConnections;
pub use round_robin::RoundRobin;
pub use sticky::StickySession;
pub use weighted::WeightedRoundRobin;

use crate::backend::Server;
use crate::config::{LoadBalancingConfig, Policy};
use std::collections::HashSet;
use tracing::warn;

/// Base capability shared by every selection algorithm.
pub trait Selector: Send + Sync {
    /// The policy this algorithm implements.
    fn policy(&self) -> Policy;

    /// Select the next backend server.
    ///
    /// # Arguments
    ///
    /// * `session_id` - Session identifier, required by sticky sessions and
    ///   ignored by every other policy
    ///
    /// # Returns
    ///
    /// The selected server, or `None` if no server can be handed out.
    fn select(&self, session_id: Option<&str>) -> Option<Server>;

    /// Discard the current state and rebuild it from `snapshot`.
    fn on_configuration_changed(&self, snapshot: &LoadBalancingConfig);
}

/// Optional capability for algorithms that track in-flight work per server.
pub trait Releaser: Selector {
    /// Signal that an exchange with `server` has finished.
    ///
    /// Releasing a server that is not tracked, or whose count is already zero,
    /// is a no-op: the connection outlived a configuration reload.
    fn release(&self, server: &Server);
}

/// Copy the configured endpoints, dropping repeats while keeping first-seen order.
fn distinct_endpoints(policy: Policy, servers: &[String]) -> Vec<String> {
    let mut seen = HashSet::with_capacity(servers.len());
    let mut distinct = Vec::with_capacity(servers.len());

    for endpoint in servers {
        if seen.insert(endpoint.as_str()) {
            distinct.push(endpoint.clone());
        } else {
            warn!(policy = %policy, server = %endpoint, "ignoring duplicate server endpoint");
        }
    }

    distinct
}
