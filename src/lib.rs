//! libra - an HTTP reverse proxy that spreads requests over a server pool
//!
//! This crate provides:
//! - Four server-selection policies (round robin, weighted round robin,
//!   least connections, sticky sessions) resolved by name at request time
//! - Hot configuration reload that rebuilds every policy's state
//! - A dispatcher that forwards requests and reports failures as problem+json
//! - Prometheus metrics

pub mod backend;
pub mod config;
pub mod frontend;
pub mod metrics;
pub mod proxy;
pub mod state;
pub mod util;

pub use config::Config;
pub use state::AppState;
