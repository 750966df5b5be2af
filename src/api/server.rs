//! Long-lived request server.
//!
//! Wraps the router in CORS and trace middleware and runs it with graceful
//! shutdown. One server process runs one façade state machine per inbound
//! request; per-tab serialization happens inside the shared [`Bridge`].
//!
//! [`Bridge`]: crate::bridge::Bridge

use std::net::SocketAddr;
use std::time::Duration;

use axum::http::{header, Method};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::api::routes::{create_router, AppState};

/// HTTP API server for the bridge.
pub struct ApiServer {
    /// Port to listen on.
    port: u16,
    /// Whether the server is running.
    running: bool,
    /// Shared application state.
    state: AppState,
    /// Shutdown signal sender.
    shutdown_tx: Option<watch::Sender<bool>>,
    /// Server task handle.
    server_handle: Option<tokio::task::JoinHandle<()>>,
    /// Actual bound address, available after `start`.
    local_addr: Option<SocketAddr>,
}

impl ApiServer {
    /// Creates a server for the given port and state.
    pub fn new(port: u16, state: AppState) -> Self {
        Self {
            port,
            running: false,
            state,
            shutdown_tx: None,
            server_handle: None,
            local_addr: None,
        }
    }

    /// The configured port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The bound address once the server is running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Permissive CORS so local tooling and extensions can call in.
    fn configure_cors() -> CorsLayer {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
            .max_age(Duration::from_secs(3600))
    }

    /// Builds the router with all middleware.
    fn build_router(&self) -> Router {
        create_router(self.state.clone())
            .layer(Self::configure_cors())
            .layer(TraceLayer::new_for_http())
    }

    /// Starts the server on 127.0.0.1.
    pub async fn start(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if self.running {
            warn!("request server is already running");
            return Ok(());
        }

        let addr = SocketAddr::from(([127, 0, 0, 1], self.port));
        let router = self.build_router();

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        self.shutdown_tx = Some(shutdown_tx);

        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        self.local_addr = Some(local_addr);
        info!("request server listening on http://{}", local_addr);

        self.running = true;

        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    while !*shutdown_rx.borrow() {
                        if shutdown_rx.changed().await.is_err() {
                            break;
                        }
                    }
                    info!("request server shutting down gracefully");
                })
                .await
                .unwrap_or_else(|e| {
                    error!("request server error: {}", e);
                });
        });

        self.server_handle = Some(handle);

        Ok(())
    }

    /// Stops the server gracefully.
    pub async fn stop(&mut self) {
        if !self.running {
            warn!("request server is not running");
            return;
        }

        info!("stopping request server...");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }

        if let Some(handle) = self.server_handle.take() {
            tokio::select! {
                _ = handle => {
                    info!("request server stopped");
                }
                _ = tokio::time::sleep(Duration::from_secs(5)) => {
                    warn!("request server shutdown timed out");
                }
            }
        }

        self.running = false;
        self.local_addr = None;
    }
}

impl Drop for ApiServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::Bridge;
    use crate::config::BridgeSettings;
    use std::sync::Arc;

    fn test_state() -> AppState {
        AppState::new(Arc::new(Bridge::new(BridgeSettings::default())))
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        // Port 0 binds an ephemeral port so tests never collide.
        let mut server = ApiServer::new(0, test_state());
        server.start().await.unwrap();
        let addr = server.local_addr().expect("bound address");
        assert_ne!(addr.port(), 0);

        // A second start is a no-op.
        server.start().await.unwrap();

        server.stop().await;
        assert!(server.local_addr().is_none());
    }
}
