//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, request ID, timeout, CORS)
//! - Bind server to listener
//! - Start the recovery prober alongside the server
//! - Expose the breaker snapshot read-only

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tokio::net::TcpListener;
use tower_http::{
    cors::CorsLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::DispatcherConfig;
use crate::dispatch::Dispatcher;
use crate::health::RecoveryProber;
use crate::http::request::{request_id, UuidRequestId};
use crate::http::response::{dispatch_error_response, dispatched_response};
use crate::lifecycle::{build_components, Components, Shutdown, StartupError};
use crate::resilience::circuit_breaker::BreakerSnapshot;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
}

/// HTTP front end for the dispatcher.
pub struct HttpServer {
    router: Router,
    config: DispatcherConfig,
    prober: Option<RecoveryProber>,
}

impl HttpServer {
    /// Create a new HTTP server, building upstreams from the configuration.
    pub fn new(config: DispatcherConfig) -> Result<Self, StartupError> {
        let components = build_components(&config)?;
        Ok(Self::from_components(config, components))
    }

    /// Create a server around already-wired components.
    pub fn from_components(config: DispatcherConfig, components: Components) -> Self {
        let state = AppState {
            dispatcher: components.dispatcher,
        };
        let router = Self::build_router(&config, state);
        Self {
            router,
            config,
            prober: components.prober,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &DispatcherConfig, state: AppState) -> Router {
        Router::new()
            .route("/consulta", get(dispatch_handler))
            .route("/dispatch", get(dispatch_handler))
            .route("/breaker", get(breaker_handler))
            .route("/health", get(health_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.listener.request_timeout_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    path = %request.uri().path(),
                    request_id = %request_id(request),
                )
            }))
            .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
            .layer(CorsLayer::permissive())
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            primary = %self.config.primary.url,
            secondary = %self.config.secondary.url,
            "HTTP server starting"
        );

        if let Some(prober) = self.prober {
            tokio::spawn(prober.run(shutdown.subscribe()));
        } else {
            tracing::info!("Recovery prober disabled");
        }

        let mut stop = shutdown.subscribe();
        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = stop.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Serve one inbound call through the dispatcher.
async fn dispatch_handler(State(state): State<AppState>) -> Response {
    let result = state.dispatcher.dispatch().await;
    let snapshot = state.dispatcher.snapshot();
    match result {
        Ok(served) => {
            tracing::debug!(source = %served.source, upstream = %served.upstream, "Request served");
            dispatched_response(served, snapshot)
        }
        Err(e) => dispatch_error_response(&e, snapshot),
    }
}

async fn breaker_handler(State(state): State<AppState>) -> Json<BreakerSnapshot> {
    Json(state.dispatcher.snapshot())
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}
