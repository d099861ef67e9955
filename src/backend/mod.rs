//! Upstream servers and the server-selection algorithms.

pub mod algorithms;
mod factory;
mod server;

pub use algorithms::{Releaser, Selector};
pub use factory::{AlgorithmFactory, AlgorithmHandle};
pub use server::Server;
