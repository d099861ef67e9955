//! Request dispatch and HTTP forwarding to the selected server.

mod dispatcher;
mod forwarder;
mod problem;

pub use dispatcher::{DispatchError, Dispatcher, SERVED_BY_HEADER, session_id};
pub use forwarder::{
    DEFAULT_CONNECT_TIMEOUT, ForwardError, Forwarder, HttpForwarder, ProxyBody, target_uri,
};
pub use problem::{PROBLEM_CONTENT_TYPE, ProblemDetails, problem_response};
