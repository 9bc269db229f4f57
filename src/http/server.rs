//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the sample routes and `/metrics`
//! - Wire up middleware (request ID, telemetry, timeout, panic catcher)
//! - Bind server to listener
//! - Stop accepting on shutdown and let in-flight requests finish

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{middleware, routing::get, Router};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    catch_panic::CatchPanicLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::{AppBehaviorConfig, AppConfig};
use crate::http::error::panic_response;
use crate::http::handlers;
use crate::http::middleware::track_request;
use crate::http::request::MakeRequestUuid;
use crate::telemetry::Telemetry;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub telemetry: Telemetry,
    pub behavior: Arc<AppBehaviorConfig>,
}

impl AppState {
    pub fn new(telemetry: Telemetry, behavior: AppBehaviorConfig) -> Self {
        Self {
            telemetry,
            behavior: Arc::new(behavior),
        }
    }

    /// Roll the configured failure probability.
    pub fn should_fail(&self) -> bool {
        let rate = self.behavior.failure_rate;
        rate > 0.0 && fastrand::f64() < rate
    }
}

/// Wrap `routes` in the per-request stack.
///
/// Outermost first: telemetry, timeout, panic catcher. Panics and timeouts
/// therefore still produce a response the telemetry layer records.
#[allow(deprecated)]
pub fn instrument(routes: Router<AppState>, state: &AppState, timeout: Duration) -> Router<AppState> {
    routes
        .route_layer(CatchPanicLayer::custom(panic_response))
        .route_layer(TimeoutLayer::new(timeout))
        .route_layer(middleware::from_fn_with_state(state.clone(), track_request))
}

/// HTTP server for the sample application.
pub struct HttpServer {
    router: Router,
    config: AppConfig,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: AppConfig, telemetry: Telemetry) -> Self {
        let state = AppState::new(telemetry, config.app.clone());
        let router = Self::build_router(&config, state);
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// Telemetry wraps only matched application routes. `/metrics` and
    /// unmatched paths are served without it.
    fn build_router(config: &AppConfig, state: AppState) -> Router {
        let timeout = Duration::from_secs(config.listener.request_timeout_secs);

        let routes = Router::new()
            .route("/", get(handlers::index))
            .route("/hello/{name}", get(handlers::hello))
            .route("/healthz", get(handlers::healthz))
            .route("/fail", get(handlers::fail));

        Router::new()
            .merge(instrument(routes, &state, timeout))
            .route("/metrics", get(handlers::metrics))
            .with_state(state)
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Router with all layers applied, for driving the app without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server, accepting connections on the given listener until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            service = %self.config.tracing.service_name,
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}
