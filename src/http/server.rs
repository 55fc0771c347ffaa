//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the catch-all forwarding handler
//! - Wire up middleware (tracing with request ID, timeout, body limit)
//! - Build the upstream client and the hedging orchestrator
//! - Serve until a shutdown signal or trigger arrives

use std::io;
use std::time::{Duration, Instant};

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{header::InvalidHeaderName, HeaderMap, Method},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::ProxyConfig;
use crate::hedging::{InboundRequest, Orchestrator, ProxyError};
use crate::http::request::make_request_span;
use crate::lifecycle::shutdown::ShutdownListener;
use crate::lifecycle::signals::shutdown_signal;
use crate::observability::metrics;
use crate::upstream::HttpUpstream;

/// Errors building the server from configuration.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid header name in configuration: {0}")]
    Header(#[from] InvalidHeaderName),

    #[error("failed to build upstream client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator<HttpUpstream>,
}

/// HTTP server for the hedging proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ProxyConfig) -> Result<Self, ServerError> {
        let client = HttpUpstream::new(&config.upstream, &config.limits)?;
        let orchestrator = Orchestrator::from_config(client, &config.hedging)?;

        let router = Self::build_router(&config, AppState { orchestrator });
        Ok(Self { router, config })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        Router::new()
            .route("/", any(proxy_handler))
            .route("/{*path}", any(proxy_handler))
            .with_state(state)
            .layer(DefaultBodyLimit::max(config.limits.max_body_bytes))
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http().make_span_with(make_request_span))
                    .layer(TimeoutLayer::new(Duration::from_secs(
                        config.timeouts.request_secs,
                    ))),
            )
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: ShutdownListener,
    ) -> Result<(), io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            target_header = %self.config.hedging.target_header,
            max_body_bytes = self.config.limits.max_body_bytes,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                tokio::select! {
                    _ = shutdown_signal() => {}
                    _ = shutdown.recv() => {
                        tracing::info!("Shutdown triggered");
                    }
                }
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Catch-all forwarding handler: any method, any path.
async fn proxy_handler(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let start_time = Instant::now();
    let request = InboundRequest {
        method: method.clone(),
        headers,
        body,
    };

    let response = match state.orchestrator.proxy(request).await {
        Ok(upstream) => upstream.into_response(),
        Err(e) => {
            match &e {
                ProxyError::MissingTargetUrl(_) | ProxyError::InvalidTargetUrl(_) => {
                    tracing::debug!(error = %e, "Rejected request");
                }
                ProxyError::Hedge(_) => {
                    tracing::warn!(error = %e, "Proxying failed");
                }
            }
            e.into_response()
        }
    };

    metrics::record_request(method.as_str(), response.status().as_u16(), start_time);
    response
}
