//! Metrics collector using prometheus-client.
//!
//! Provides metrics for requests, latency, server selection, in-flight
//! exchanges and configuration reloads.

use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use std::sync::Arc;
use std::time::Duration;

/// Labels for request metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RequestLabels {
    pub policy: String,
    pub status: String,
}

/// Labels keyed by policy only.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct PolicyLabels {
    pub policy: String,
}

/// Labels for per-server selection counts.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct SelectionLabels {
    pub policy: String,
    pub server: String,
}

/// Labels for selection failures.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct FailureLabels {
    pub policy: String,
    pub reason: FailureReason,
}

/// Why no server could be handed out.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum FailureReason {
    UnknownPolicy,
    NoServer,
    NoSession,
}

/// Collects and stores all metrics.
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<MetricsCollectorInner>,
}

struct MetricsCollectorInner {
    /// Total requests counter.
    requests_total: Family<RequestLabels, Counter>,
    /// Request duration histogram (in seconds).
    request_duration_seconds: Family<PolicyLabels, Histogram>,
    /// Selections per server.
    selections_total: Family<SelectionLabels, Counter>,
    /// Requests for which no server was selected.
    selection_failures_total: Family<FailureLabels, Counter>,
    /// Exchanges currently being forwarded.
    in_flight: Family<PolicyLabels, Gauge>,
    /// Applied configuration reloads.
    config_reloads_total: Counter,
    /// The prometheus registry.
    registry: Registry,
}

impl MetricsCollector {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let requests_total = Family::<RequestLabels, Counter>::default();
        let request_duration_seconds = Family::<PolicyLabels, Histogram>::new_with_constructor(
            || {
                // Buckets: 1ms, 2.5ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s
                Histogram::new(exponential_buckets(0.001, 2.5, 13))
            },
        );
        let selections_total = Family::<SelectionLabels, Counter>::default();
        let selection_failures_total = Family::<FailureLabels, Counter>::default();
        let in_flight = Family::<PolicyLabels, Gauge>::default();
        let config_reloads_total = Counter::default();

        registry.register(
            "libra_requests",
            "Total number of requests processed",
            requests_total.clone(),
        );
        registry.register(
            "libra_request_duration_seconds",
            "Request duration in seconds",
            request_duration_seconds.clone(),
        );
        registry.register(
            "libra_selections",
            "Total number of servers handed out per policy",
            selections_total.clone(),
        );
        registry.register(
            "libra_selection_failures",
            "Total number of requests for which no server was selected",
            selection_failures_total.clone(),
        );
        registry.register(
            "libra_in_flight",
            "Number of exchanges currently being forwarded",
            in_flight.clone(),
        );
        registry.register(
            "libra_config_reloads",
            "Total number of applied configuration reloads",
            config_reloads_total.clone(),
        );

        Self {
            inner: Arc::new(MetricsCollectorInner {
                requests_total,
                request_duration_seconds,
                selections_total,
                selection_failures_total,
                in_flight,
                config_reloads_total,
                registry,
            }),
        }
    }

    /// Get the prometheus registry for encoding.
    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Record a completed request.
    pub fn record_request(&self, policy: &str, status: u16, duration: Duration) {
        let labels = RequestLabels {
            policy: policy.to_string(),
            status: status.to_string(),
        };
        self.inner.requests_total.get_or_create(&labels).inc();

        let policy_labels = PolicyLabels {
            policy: policy.to_string(),
        };
        self.inner
            .request_duration_seconds
            .get_or_create(&policy_labels)
            .observe(duration.as_secs_f64());
    }

    /// Record a server being handed out.
    pub fn record_selection(&self, policy: &str, server: &str) {
        let labels = SelectionLabels {
            policy: policy.to_string(),
            server: server.to_string(),
        };
        self.inner.selections_total.get_or_create(&labels).inc();
    }

    /// Record a request for which no server was selected.
    pub fn record_selection_failure(&self, policy: &str, reason: FailureReason) {
        let labels = FailureLabels {
            policy: policy.to_string(),
            reason,
        };
        self.inner.selection_failures_total.get_or_create(&labels).inc();
    }

    /// Increment in-flight exchanges.
    pub fn exchange_started(&self, policy: &str) {
        let labels = PolicyLabels {
            policy: policy.to_string(),
        };
        self.inner.in_flight.get_or_create(&labels).inc();
    }

    /// Decrement in-flight exchanges.
    pub fn exchange_finished(&self, policy: &str) {
        let labels = PolicyLabels {
            policy: policy.to_string(),
        };
        self.inner.in_flight.get_or_create(&labels).dec();
    }

    /// Current in-flight exchanges for a policy.
    pub fn in_flight(&self, policy: &str) -> i64 {
        let labels = PolicyLabels {
            policy: policy.to_string(),
        };
        self.inner.in_flight.get_or_create(&labels).get()
    }

    /// Record an applied configuration reload.
    pub fn config_reloaded(&self) {
        self.inner.config_reloads_total.inc();
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
