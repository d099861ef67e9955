//! Policy-to-algorithm resolution.

use crate::backend::Server;
use crate::backend::algorithms::{
    LeastConnections, Releaser, RoundRobin, Selector, StickySession, WeightedRoundRobin,
};
use crate::config::{LoadBalancingConfig, Policy};
use std::sync::Arc;
use tracing::{debug, warn};

/// A handle to one live algorithm instance.
///
/// Cloning the handle shares the instance and its selection state.
#[derive(Clone)]
pub enum AlgorithmHandle {
    RoundRobin(Arc<RoundRobin>),
    WeightedRoundRobin(Arc<WeightedRoundRobin>),
    LeastConnections(Arc<LeastConnections>),
    StickySession(Arc<StickySession>),
}

impl AlgorithmHandle {
    /// The base selection capability.
    pub fn selector(&self) -> &dyn Selector {
        match self {
            AlgorithmHandle::RoundRobin(rr) => rr.as_ref(),
            AlgorithmHandle::WeightedRoundRobin(wrr) => wrr.as_ref(),
            AlgorithmHandle::LeastConnections(lc) => lc.as_ref(),
            AlgorithmHandle::StickySession(sticky) => sticky.as_ref(),
        }
    }

    /// The release capability, if this algorithm tracks in-flight work.
    pub fn releaser(&self) -> Option<&dyn Releaser> {
        match self {
            AlgorithmHandle::LeastConnections(lc) => Some(lc.as_ref()),
            _ => None,
        }
    }

    /// Select the next server.
    pub fn select(&self, session_id: Option<&str>) -> Option<Server> {
        self.selector().select(session_id)
    }

    /// Release `server` if this algorithm tracks in-flight work; otherwise a no-op.
    pub fn release(&self, server: &Server) {
        if let Some(releaser) = self.releaser() {
            releaser.release(server);
        }
    }

    /// The policy implemented by this handle.
    pub fn policy(&self) -> Policy {
        self.selector().policy()
    }
}

impl std::fmt::Debug for AlgorithmHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AlgorithmHandle").field(&self.policy()).finish()
    }
}

/// Maps policy identifiers to the live algorithm instances.
///
/// One instance per policy is created up front and lives as long as the
/// factory. Configuration changes are forwarded to every instance so that a
/// policy switch finds its algorithm already primed with the current servers.
pub struct AlgorithmFactory {
    round_robin: Arc<RoundRobin>,
    weighted: Arc<WeightedRoundRobin>,
    least_connections: Arc<LeastConnections>,
    sticky: Arc<StickySession>,
}

impl AlgorithmFactory {
    /// Create all algorithms from the initial snapshot.
    pub fn new(snapshot: &LoadBalancingConfig) -> Self {
        Self {
            round_robin: Arc::new(RoundRobin::from_config(snapshot)),
            weighted: Arc::new(WeightedRoundRobin::from_config(snapshot)),
            least_connections: Arc::new(LeastConnections::from_config(snapshot)),
            sticky: Arc::new(StickySession::from_config(snapshot)),
        }
    }

    /// Resolve a policy identifier. Returns `None` for unrecognised identifiers.
    pub fn resolve(&self, identifier: &str) -> Option<AlgorithmHandle> {
        match Policy::parse(identifier) {
            Some(policy) => Some(self.resolve_policy(policy)),
            None => {
                warn!(policy = identifier, "unsupported load balancing policy");
                None
            }
        }
    }

    /// Resolve a parsed policy.
    pub fn resolve_policy(&self, policy: Policy) -> AlgorithmHandle {
        match policy {
            Policy::RoundRobin => AlgorithmHandle::RoundRobin(Arc::clone(&self.round_robin)),
            Policy::WeightedRoundRobin => {
                AlgorithmHandle::WeightedRoundRobin(Arc::clone(&self.weighted))
            }
            Policy::LeastConnections => {
                AlgorithmHandle::LeastConnections(Arc::clone(&self.least_connections))
            }
            Policy::StickySession => AlgorithmHandle::StickySession(Arc::clone(&self.sticky)),
        }
    }

    /// Rebuild every algorithm's state from the new snapshot.
    pub fn on_configuration_changed(&self, snapshot: &LoadBalancingConfig) {
        debug!(
            policy = %snapshot.policy,
            servers = snapshot.servers.len(),
            "propagating configuration change to algorithms"
        );
        for policy in Policy::ALL {
            self.resolve_policy(policy)
                .selector()
                .on_configuration_changed(snapshot);
        }
    }
}
