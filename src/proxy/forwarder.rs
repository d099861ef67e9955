//! Forwarding a request to a chosen upstream server.

use crate::backend::Server;
use bytes::Bytes;
use http_body_util::BodyExt;
use http_body_util::combinators::BoxBody;
use hyper::header::{HOST, HeaderValue};
use hyper::{Request, Response, Uri};
use hyper_util::rt::TokioIo;
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Body type used for both directions of a proxied exchange.
pub type ProxyBody = BoxBody<Bytes, hyper::Error>;

/// Default connect timeout for upstream connections.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Forwarding error.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("invalid server endpoint '{0}'")]
    InvalidEndpoint(String),

    #[error("unsupported scheme '{scheme}' for server {endpoint}")]
    UnsupportedScheme { scheme: String, endpoint: String },

    #[error("failed to connect to server: {0}")]
    Connect(#[from] io::Error),

    #[error("connection timeout after {0:?}")]
    ConnectTimeout(Duration),

    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),
}

/// Sends a request to a server and hands back its response.
///
/// Implementations must not buffer the response body; it is streamed to the
/// client as-is.
pub trait Forwarder: Send + Sync + 'static {
    fn forward(
        &self,
        req: Request<ProxyBody>,
        server: &Server,
    ) -> impl Future<Output = Result<Response<ProxyBody>, ForwardError>> + Send;
}

/// HTTP/1.1 forwarder using one upstream connection per exchange.
#[derive(Debug, Clone)]
pub struct HttpForwarder {
    connect_timeout: Duration,
}

impl HttpForwarder {
    /// Create a forwarder with the given connect timeout.
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for HttpForwarder {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

impl Forwarder for HttpForwarder {
    async fn forward(
        &self,
        mut req: Request<ProxyBody>,
        server: &Server,
    ) -> Result<Response<ProxyBody>, ForwardError> {
        let path = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let target = target_uri(server, path)?;

        let authority = target
            .authority()
            .ok_or_else(|| ForwardError::InvalidEndpoint(server.endpoint().to_string()))?
            .clone();
        let port = authority.port_u16().unwrap_or(80);
        let host = authority.host().trim_start_matches('[').trim_end_matches(']');

        debug!(server = %server, target = %target, "connecting to server");

        let stream = match timeout(
            self.connect_timeout,
            TcpStream::connect((host, port)),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => return Err(ForwardError::ConnectTimeout(self.connect_timeout)),
        };
        if let Err(e) = stream.set_nodelay(true) {
            warn!(error = %e, "failed to set TCP_NODELAY on server connection");
        }

        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream)).await?;

        tokio::spawn(async move {
            if let Err(e) = conn.await {
                warn!(error = %e, "server connection error");
            }
        });

        // Origin-form on the wire; the authority travels in the Host header.
        *req.uri_mut() = target
            .path_and_query()
            .cloned()
            .map(Uri::from)
            .unwrap_or_else(|| Uri::from_static("/"));
        if let Ok(host) = HeaderValue::from_str(authority.as_str()) {
            req.headers_mut().insert(HOST, host);
        }

        let response = sender.send_request(req).await?;
        Ok(response.map(|body| body.boxed()))
    }
}

/// Build the upstream URI `{endpoint}/{path}` for a request path.
///
/// Endpoints without a scheme are treated as `http`. Exactly one `/` separates
/// the endpoint (which may carry a base path) from the request path.
pub fn target_uri(server: &Server, path_and_query: &str) -> Result<Uri, ForwardError> {
    let endpoint = server.endpoint().trim();
    if endpoint.is_empty() {
        return Err(ForwardError::InvalidEndpoint(endpoint.to_string()));
    }

    let base = if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("http://{}", endpoint)
    };

    let joined = format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path_and_query.trim_start_matches('/')
    );

    let uri: Uri = joined
        .parse()
        .map_err(|_| ForwardError::InvalidEndpoint(server.endpoint().to_string()))?;

    match uri.scheme_str() {
        Some("http") => {}
        Some(other) => {
            return Err(ForwardError::UnsupportedScheme {
                scheme: other.to_string(),
                endpoint: server.endpoint().to_string(),
            });
        }
        None => return Err(ForwardError::InvalidEndpoint(server.endpoint().to_string())),
    }

    if uri.authority().is_none() {
        return Err(ForwardError::InvalidEndpoint(server.endpoint().to_string()));
    }

    Ok(uri)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_uri_joins_with_single_slash() {
        let server = Server::new("http://10.0.0.1:8080");
        let uri = target_uri(&server, "/api/users?page=2").unwrap();
        assert_eq!(uri.to_string(), "http://10.0.0.1:8080/api/users?page=2");

        let server = Server::new("http://10.0.0.1:8080/");
        let uri = target_uri(&server, "/health").unwrap();
        assert_eq!(uri.to_string(), "http://10.0.0.1:8080/health");
    }

    #[test]
    fn test_target_uri_keeps_base_path() {
        let server = Server::new("http://10.0.0.1:8080/v1");
        let uri = target_uri(&server, "/orders").unwrap();
        assert_eq!(uri.path(), "/v1/orders");
    }

    #[test]
    fn test_target_uri_without_scheme() {
        let server = Server::new("backend.local:9000");
        let uri = target_uri(&server, "/").unwrap();
        assert_eq!(uri.scheme_str(), Some("http"));
        assert_eq!(uri.port_u16(), Some(9000));
    }

    #[test]
    fn test_target_uri_rejects_https() {
        let server = Server::new("https://10.0.0.1");
        let result = target_uri(&server, "/");
        assert!(matches!(result, Err(ForwardError::UnsupportedScheme { .. })));
    }

    #[test]
    fn test_target_uri_rejects_blank() {
        let result = target_uri(&Server::new("  "), "/");
        assert!(matches!(result, Err(ForwardError::InvalidEndpoint(_))));
    }

    #[tokio::test]
    async fn test_forward_connect_refused() {
        // Bind then drop to get a port with nothing listening.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let forwarder = HttpForwarder::new(Duration::from_secs(1));
        let req = Request::builder()
            .uri("/")
            .body(
                http_body_util::Empty::<Bytes>::new()
                    .map_err(|never| match never {})
                    .boxed(),
            )
            .unwrap();

        let result = forwarder
            .forward(req, &Server::new(format!("http://{}", addr)))
            .await;
        assert!(matches!(result, Err(ForwardError::Connect(_))));
    }
}
