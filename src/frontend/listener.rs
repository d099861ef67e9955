//! Frontend listener implementation.
//!
//! Accepts client connections and serves each request through the dispatcher.

use crate::proxy::{Dispatcher, Forwarder};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};

/// Frontend listener that accepts and handles connections.
pub struct FrontendListener<F> {
    listener: TcpListener,
    dispatcher: Arc<Dispatcher<F>>,
}

impl<F: Forwarder> FrontendListener<F> {
    /// Bind the listener.
    pub async fn bind(addr: SocketAddr, dispatcher: Arc<Dispatcher<F>>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;

        info!(listen = %listener.local_addr()?, "frontend listener bound");

        Ok(Self {
            listener,
            dispatcher,
        })
    }

    /// The bound address.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run the listener, accepting connections until shutdown.
    #[instrument(skip_all)]
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!("frontend listener starting");

        loop {
            tokio::select! {
                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((stream, addr)) => {
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!(error = %e, "failed to accept connection");
                        }
                    }
                }

                _ = shutdown.recv() => {
                    info!("frontend listener shutting down");
                    break;
                }
            }
        }
    }

    fn handle_connection(&self, stream: TcpStream, client_addr: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            warn!(error = %e, "failed to set TCP_NODELAY on client connection");
        }

        let dispatcher = Arc::clone(&self.dispatcher);

        tokio::spawn(async move {
            let start_time = Instant::now();
            let io = TokioIo::new(stream);

            let service = service_fn(move |req| {
                let dispatcher = Arc::clone(&dispatcher);
                async move { Ok::<_, Infallible>(dispatcher.dispatch(req, client_addr).await) }
            });

            // HTTP/1.1 with keep-alive; each request is dispatched independently.
            let result = http1::Builder::new()
                .keep_alive(true)
                .serve_connection(io, service)
                .await;

            let duration = start_time.elapsed();
            match result {
                Ok(()) => debug!(
                    client = %client_addr,
                    duration_ms = duration.as_millis(),
                    "connection completed"
                ),
                Err(e) => warn!(
                    client = %client_addr,
                    duration_ms = duration.as_millis(),
                    error = %e,
                    "connection handling failed"
                ),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, LoadBalancingConfig};
    use crate::metrics::MetricsCollector;
    use crate::proxy::HttpForwarder;
    use crate::state::AppState;

    #[tokio::test]
    async fn test_frontend_listener_bind() {
        let config = Config {
            load_balancing: LoadBalancingConfig::new("RoundRobin", ["http://127.0.0.1:9000"]),
            ..Config::default()
        };
        let dispatcher = Arc::new(Dispatcher::new(
            AppState::new(config),
            HttpForwarder::default(),
            MetricsCollector::new(),
        ));

        let listener = FrontendListener::bind("127.0.0.1:0".parse().unwrap(), dispatcher)
            .await
            .unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }
}
