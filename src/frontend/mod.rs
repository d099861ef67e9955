//! Client-facing HTTP listener.

mod listener;

pub use listener::FrontendListener;
