//! Reverse endpoint server
//!
//! One axum server shared by every reverse connection; each contributes its
//! own route.

use axum::{
    body::Body,
    http::{header::HeaderName, Request},
    routing::get,
    Router,
};
use bridge_common::{AppConfig, BridgeError, BridgeResult};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::registry::ConnectionRegistry;

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

/// Header name for request ID
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Wrap connection routes with the health route, request ids and tracing
pub fn create_app(routes: Router) -> Router {
    routes.route("/health", get(health_check)).layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::new(
                HeaderName::from_static(REQUEST_ID_HEADER),
                MakeRequestUuid,
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                REQUEST_ID_HEADER,
            )))
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(|request: &Request<Body>| {
                        let request_id = request
                            .headers()
                            .get(REQUEST_ID_HEADER)
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or("unknown");

                        tracing::debug_span!(
                            "reverse_request",
                            method = %request.method(),
                            uri = %request.uri(),
                            request_id = %request_id,
                        )
                    })
                    .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
            ),
    )
}

/// A running server with a graceful shutdown trigger
#[derive(Debug)]
pub struct ReverseServer {
    local_addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl ReverseServer {
    /// Bind `addr` and start serving in the background
    pub async fn bind(addr: &str, routes: Router) -> BridgeResult<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| BridgeError::transport(format!("failed to bind {addr}: {e}")))?;
        let local_addr = listener.local_addr().map_err(BridgeError::transport)?;

        let (shutdown, signal) = oneshot::channel::<()>();
        let app = create_app(routes);
        let task = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = signal.await;
                })
                .await;
            if let Err(e) = served {
                tracing::error!(error = %e, "Reverse endpoint server failed");
            }
        });

        tracing::info!(address = %local_addr, "Reverse endpoint server listening");
        Ok(Self {
            local_addr,
            shutdown,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections; the handle completes once in-flight
    /// requests have drained
    pub fn shutdown(self) -> JoinHandle<()> {
        let _ = self.shutdown.send(());
        tracing::info!(address = %self.local_addr, "Reverse endpoint server shutting down");
        self.task
    }
}

/// Run the bridge for every configured account until Ctrl-C
pub async fn run(config: AppConfig) -> BridgeResult<()> {
    let registry = ConnectionRegistry::from_config(&config)?;
    registry.launch_all().await?;
    tracing::info!(accounts = registry.accounts().len(), "Bridge running");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }

    tracing::info!("Shutdown signal received");
    registry.stop_all().await;
    Ok(())
}
