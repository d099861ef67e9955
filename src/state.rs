//! Shared application state.

use crate::backend::AlgorithmFactory;
use crate::config::{Config, LoadBalancingConfig};
use crate::util::ShutdownSignal;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

/// Shared state accessible from all tasks.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Current configuration, swapped atomically on reload.
    config: ArcSwap<Config>,

    /// Live algorithm instances, one per policy.
    factory: AlgorithmFactory,

    /// Serializes reloads so that swap order matches rebuild order.
    reload_lock: Mutex<()>,

    /// Shutdown signal.
    shutdown: ShutdownSignal,
}

impl AppState {
    /// Create new application state.
    pub fn new(config: Config) -> Self {
        let factory = AlgorithmFactory::new(&config.load_balancing);
        Self {
            inner: Arc::new(AppStateInner {
                config: ArcSwap::from_pointee(config),
                factory,
                reload_lock: Mutex::new(()),
                shutdown: ShutdownSignal::new(),
            }),
        }
    }

    /// Get the current configuration.
    pub fn config(&self) -> Arc<Config> {
        self.inner.config.load_full()
    }

    /// Get the current load-balancing snapshot.
    pub fn snapshot(&self) -> LoadBalancingConfig {
        self.inner.config.load().load_balancing.clone()
    }

    /// Get the algorithm factory.
    pub fn factory(&self) -> &AlgorithmFactory {
        &self.inner.factory
    }

    /// Replace the configuration and rebuild every algorithm's state from it.
    pub fn apply(&self, new_config: Config) {
        let _reload = self.inner.reload_lock.lock();

        let new_config = Arc::new(new_config);
        self.inner.config.store(Arc::clone(&new_config));
        self.inner
            .factory
            .on_configuration_changed(&new_config.load_balancing);

        info!(
            policy = %new_config.load_balancing.policy,
            servers = new_config.load_balancing.servers.len(),
            "configuration applied"
        );
    }

    /// Get the shutdown signal.
    pub fn shutdown(&self) -> &ShutdownSignal {
        &self.inner.shutdown
    }

    /// Trigger shutdown.
    pub fn trigger_shutdown(&self) {
        self.inner.shutdown.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Server;

    fn config(policy: &str, servers: &[&str]) -> Config {
        Config {
            load_balancing: LoadBalancingConfig::new(policy, servers.iter().copied()),
            ..Config::default()
        }
    }

    #[test]
    fn test_initial_snapshot() {
        let state = AppState::new(config("RoundRobin", &["http://a:1", "http://b:1"]));
        let snapshot = state.snapshot();
        assert_eq!(snapshot.policy, "RoundRobin");
        assert_eq!(snapshot.servers.len(), 2);
    }

    #[test]
    fn test_apply_swaps_and_rebuilds() {
        let state = AppState::new(config("RoundRobin", &["http://a:1", "http://b:1"]));
        let rr = state.factory().resolve("RoundRobin").unwrap();
        assert_eq!(rr.select(None), Some(Server::new("http://a:1")));

        state.apply(config("LeastConnections", &["http://c:1"]));

        assert_eq!(state.snapshot().policy, "LeastConnections");
        assert_eq!(rr.select(None), Some(Server::new("http://c:1")));

        let lc = state.factory().resolve(&state.snapshot().policy).unwrap();
        assert_eq!(lc.select(None), Some(Server::new("http://c:1")));
    }

    #[test]
    fn test_apply_empty_servers() {
        let state = AppState::new(config("RoundRobin", &["http://a:1"]));
        state.apply(config("RoundRobin", &[]));

        let rr = state.factory().resolve("RoundRobin").unwrap();
        assert!(rr.select(None).is_none());
    }

    #[test]
    fn test_clone_shares_state() {
        let state = AppState::new(config("RoundRobin", &["http://a:1"]));
        let other = state.clone();
        other.apply(config("StickySession", &["http://a:1"]));
        assert_eq!(state.config().load_balancing.policy, "StickySession");
    }

    #[tokio::test]
    async fn test_trigger_shutdown() {
        let state = AppState::new(Config::default());
        let mut rx = state.shutdown().subscribe();
        state.trigger_shutdown();
        assert!(rx.recv().await.is_ok());
    }
}
