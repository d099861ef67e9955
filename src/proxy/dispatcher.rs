//! Request dispatch: policy resolution, server selection and forwarding.

use crate::backend::{AlgorithmHandle, Server};
use crate::config::{Config, Policy};
use crate::metrics::{FailureReason, MetricsCollector};
use crate::proxy::forwarder::{ForwardError, Forwarder, ProxyBody};
use crate::proxy::problem::problem_response;
use crate::state::AppState;
use crate::util::{REQUEST_ID_HEADER, RequestId};
use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::body::{Body, Frame, SizeHint};
use hyper::header::{COOKIE, HeaderMap, HeaderName, HeaderValue};
use hyper::{Request, Response, StatusCode};
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

/// Response header naming the server that handled the request.
pub const SERVED_BY_HEADER: &str = "x-served-by";

const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Why a request could not be served.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("unsupported load balancing policy '{policy}'")]
    UnknownPolicy { policy: String },

    #[error("no server available for policy {policy}")]
    NoServerAvailable { policy: Policy },

    #[error("policy {policy} requires a session id")]
    SessionRequired { policy: Policy },

    #[error("forwarding to {server} failed: {source}")]
    Forward {
        server: String,
        #[source]
        source: ForwardError,
    },

    #[error("server {server} did not respond within {after:?}")]
    Timeout { server: String, after: Duration },
}

impl DispatchError {
    /// HTTP status reported to the client.
    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::UnknownPolicy { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            DispatchError::NoServerAvailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            DispatchError::SessionRequired { .. } => StatusCode::BAD_REQUEST,
            DispatchError::Forward { .. } => StatusCode::BAD_GATEWAY,
            DispatchError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Selection failure reason, for failures that happen before a server is chosen.
    pub fn reason(&self) -> Option<FailureReason> {
        match self {
            DispatchError::UnknownPolicy { .. } => Some(FailureReason::UnknownPolicy),
            DispatchError::NoServerAvailable { .. } => Some(FailureReason::NoServer),
            DispatchError::SessionRequired { .. } => Some(FailureReason::NoSession),
            DispatchError::Forward { .. } | DispatchError::Timeout { .. } => None,
        }
    }
}

/// Routes each request to a server chosen by the configured policy.
pub struct Dispatcher<F> {
    state: AppState,
    forwarder: F,
    metrics: MetricsCollector,
}

impl<F: Forwarder> Dispatcher<F> {
    /// Create a dispatcher over shared state.
    pub fn new(state: AppState, forwarder: F, metrics: MetricsCollector) -> Self {
        Self {
            state,
            forwarder,
            metrics,
        }
    }

    /// The shared application state.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// The metrics collector.
    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Serve one request. Failures become problem responses.
    #[instrument(skip_all, fields(
        method = %req.method(),
        uri = %req.uri(),
        client = %client_addr,
    ))]
    pub async fn dispatch<B>(&self, req: Request<B>, client_addr: SocketAddr) -> Response<ProxyBody>
    where
        B: Body<Data = Bytes, Error = hyper::Error> + Send + Sync + 'static,
    {
        let start = Instant::now();
        let request_id = RequestId::from_headers_or_short(req.headers());
        let instance = req.uri().path().to_string();

        // One snapshot per request; a concurrent reload affects the next one.
        let config = self.state.config();
        let policy_label = config
            .load_balancing
            .parsed_policy()
            .map(|policy| policy.as_str())
            .unwrap_or("unknown");

        let mut response = match self.route(req, &config, client_addr, &request_id).await {
            Ok(response) => response,
            Err(e) => {
                if let Some(reason) = e.reason() {
                    self.metrics.record_selection_failure(policy_label, reason);
                }
                warn!(
                    request_id = %request_id,
                    status = e.status().as_u16(),
                    error = %e,
                    "request not served"
                );
                problem_response(e.status(), e.to_string(), instance)
            }
        };

        if let Ok(value) = HeaderValue::from_str(request_id.as_str()) {
            response
                .headers_mut()
                .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
        }

        let duration = start.elapsed();
        let status = response.status().as_u16();
        self.metrics.record_request(policy_label, status, duration);

        info!(
            request_id = %request_id,
            policy = policy_label,
            status,
            duration_ms = duration.as_millis(),
            "request dispatched"
        );

        response
    }

    async fn route<B>(
        &self,
        mut req: Request<B>,
        config: &Config,
        client_addr: SocketAddr,
        request_id: &RequestId,
    ) -> Result<Response<ProxyBody>, DispatchError>
    where
        B: Body<Data = Bytes, Error = hyper::Error> + Send + Sync + 'static,
    {
        let snapshot = &config.load_balancing;
        let handle = self
            .state
            .factory()
            .resolve(&snapshot.policy)
            .ok_or_else(|| DispatchError::UnknownPolicy {
                policy: snapshot.policy.clone(),
            })?;
        let policy = handle.policy();

        let session = session_id(
            req.headers(),
            &config.listener.session_header,
            &config.listener.session_cookie,
        );

        let server = match handle.select(session.as_deref()) {
            Some(server) => server,
            None if policy == Policy::StickySession && session.is_none() => {
                return Err(DispatchError::SessionRequired { policy });
            }
            None => return Err(DispatchError::NoServerAvailable { policy }),
        };

        debug!(
            request_id = %request_id,
            policy = %policy,
            server = %server,
            "server selected"
        );
        self.metrics.record_selection(policy.as_str(), server.endpoint());

        // Released when the response body ends, or on any early exit below.
        let guard = ReleaseGuard::new(handle, server.clone(), self.metrics.clone());

        add_forwarding_headers(req.headers_mut(), client_addr, request_id);
        let req = req.map(|body| body.boxed());

        let forward_timeout = config.listener.forward_timeout;
        let response = match timeout(forward_timeout, self.forwarder.forward(req, &server)).await {
            Ok(Ok(response)) => response,
            Ok(Err(source)) => {
                return Err(DispatchError::Forward {
                    server: server.endpoint().to_string(),
                    source,
                });
            }
            Err(_) => {
                return Err(DispatchError::Timeout {
                    server: server.endpoint().to_string(),
                    after: forward_timeout,
                });
            }
        };

        let (mut parts, body) = response.into_parts();
        if let Ok(value) = HeaderValue::from_str(server.endpoint()) {
            parts
                .headers
                .insert(HeaderName::from_static(SERVED_BY_HEADER), value);
        }

        let body = ReleaseOnDrop {
            inner: body,
            guard: Some(guard),
        };
        Ok(Response::from_parts(parts, body.boxed()))
    }
}

/// Extract the session id: the session header first, then the session cookie.
///
/// Empty values count as absent.
pub fn session_id(headers: &HeaderMap, header_name: &str, cookie_name: &str) -> Option<String> {
    let from_header = headers
        .get(header_name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if let Some(value) = from_header {
        return Some(value.to_string());
    }

    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|pair| pair.split_once('='))
        .find(|(name, _)| name.trim() == cookie_name)
        .map(|(_, value)| value.trim().trim_matches('"'))
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn add_forwarding_headers(headers: &mut HeaderMap, client_addr: SocketAddr, request_id: &RequestId) {
    let client_ip = client_addr.ip().to_string();
    let forwarded_for = match headers
        .get(FORWARDED_FOR_HEADER)
        .and_then(|value| value.to_str().ok())
    {
        Some(existing) => format!("{}, {}", existing, client_ip),
        None => client_ip,
    };
    if let Ok(value) = HeaderValue::from_str(&forwarded_for) {
        headers.insert(HeaderName::from_static(FORWARDED_FOR_HEADER), value);
    }
    if let Ok(value) = HeaderValue::from_str(request_id.as_str()) {
        headers.insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
}

/// Tracks one in-flight exchange. Dropping it releases the server.
struct ReleaseGuard {
    handle: AlgorithmHandle,
    server: Server,
    metrics: MetricsCollector,
}

impl ReleaseGuard {
    fn new(handle: AlgorithmHandle, server: Server, metrics: MetricsCollector) -> Self {
        metrics.exchange_started(handle.policy().as_str());
        Self {
            handle,
            server,
            metrics,
        }
    }
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.handle.release(&self.server);
        self.metrics.exchange_finished(self.handle.policy().as_str());
    }
}

/// Response body that releases its server once the body is finished or dropped.
struct ReleaseOnDrop {
    inner: ProxyBody,
    guard: Option<ReleaseGuard>,
}

impl Body for ReleaseOnDrop {
    type Data = Bytes;
    type Error = hyper::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        let frame = ready!(Pin::new(&mut this.inner).poll_frame(cx));
        if matches!(frame, None | Some(Err(_))) {
            this.guard.take();
        }
        Poll::Ready(frame)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
