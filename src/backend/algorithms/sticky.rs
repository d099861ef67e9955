//! Sticky-session load balancing algorithm.

use super::{Selector, distinct_endpoints};
use crate::backend::Server;
use crate::backend::server::is_valid_endpoint;
use crate::config::{LoadBalancingConfig, Policy};
use parking_lot::RwLock;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use tracing::{debug, info, warn};

/// Sticky-session load balancer.
///
/// Maps a session id onto the server list by hash, so a session keeps hitting
/// the same server for as long as the server list is unchanged. A reload may
/// move sessions to other servers.
pub struct StickySession {
    servers: RwLock<Vec<String>>,
}

impl StickySession {
    /// Create a sticky-session load balancer with no servers.
    pub fn new() -> Self {
        Self {
            servers: RwLock::new(Vec::new()),
        }
    }

    /// Create a sticky-session load balancer from a configuration snapshot.
    pub fn from_config(snapshot: &LoadBalancingConfig) -> Self {
        let sticky = Self::new();
        sticky.on_configuration_changed(snapshot);
        sticky
    }

    /// The servers sessions are spread across, in order.
    pub fn servers(&self) -> Vec<Server> {
        self.servers
            .read()
            .iter()
            .map(|endpoint| Server::new(endpoint.as_str()))
            .collect()
    }
}

impl Default for StickySession {
    fn default() -> Self {
        Self::new()
    }
}

/// Stable within a process: `DefaultHasher::new` uses fixed keys.
fn session_hash(session_id: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    session_id.hash(&mut hasher);
    hasher.finish()
}

impl Selector for StickySession {
    fn policy(&self) -> Policy {
        Policy::StickySession
    }

    fn select(&self, session_id: Option<&str>) -> Option<Server> {
        let Some(session_id) = session_id else {
            warn!(policy = %Policy::StickySession, "no session id provided");
            return None;
        };

        let servers = self.servers.read();

        if servers.is_empty() {
            warn!(policy = %Policy::StickySession, "no servers loaded in configuration");
            return None;
        }

        let index = (session_hash(session_id) % servers.len() as u64) as usize;
        let endpoint = &servers[index];

        if !is_valid_endpoint(endpoint) {
            warn!(policy = %Policy::StickySession, index, "no server found at index");
            return None;
        }

        debug!(
            policy = %Policy::StickySession,
            session = session_id,
            server = %endpoint,
            "selected server"
        );
        Some(Server::new(endpoint.as_str()))
    }

    fn on_configuration_changed(&self, snapshot: &LoadBalancingConfig) {
        let next = distinct_endpoints(Policy::StickySession, &snapshot.servers);
        let count = next.len();

        *self.servers.write() = next;

        info!(policy = %Policy::StickySession, servers = count, "selection state rebuilt");
    }
}
