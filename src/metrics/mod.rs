//! Metrics collection and exposition.

mod collector;
mod server;

pub use collector::{FailureReason, MetricsCollector};
pub use server::MetricsServer;
