//! Application startup and lifecycle management.
//!
//! The database is connected first and the listener bound second. If the
//! connect step fails no listener is ever created, so nothing can reach the
//! database-dependent probes while the connection is not ready.

use crate::config::ContentConfig;
use crate::handlers;
use crate::middleware::{cors_layer, origin_gate};
use crate::routes;
use crate::services::{DatabaseProbe, MongoDb, OriginAllowlist, RuntimeSampler};
use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::get,
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    metrics::metrics_middleware, security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ContentConfig,
    pub db: Arc<dyn DatabaseProbe>,
    pub origins: Arc<OriginAllowlist>,
    pub runtime: RuntimeSampler,
}

impl AppState {
    pub fn new(
        config: ContentConfig,
        db: Arc<dyn DatabaseProbe>,
        origins: Arc<OriginAllowlist>,
    ) -> Self {
        Self {
            config,
            db,
            origins,
            runtime: RuntimeSampler::new(),
        }
    }
}

/// Probe routes, the `/api` mount table and the middleware stack.
///
/// The origin gate is the outermost layer: a blocked request never reaches
/// CORS header handling, tracing, or any handler.
pub fn build_router(state: AppState, domain: Router<AppState>) -> Router {
    let origins = state.origins.clone();

    let probes = Router::new()
        .route("/api/health", get(handlers::liveness))
        .route("/api/health/cors", get(handlers::cors_echo))
        .route("/api/health/db", get(handlers::database_stats))
        .route("/api/health/runtime", get(handlers::runtime_stats))
        .route("/api/test", get(handlers::legacy_liveness))
        .route("/metrics", get(handlers::metrics));

    routes::mount(probes, domain)
        .fallback(handlers::not_found)
        .layer(CompressionLayer::new())
        .layer(from_fn(security_headers_middleware))
        .layer(from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .layer(cors_layer(&origins))
        .layer(from_fn_with_state(origins, origin_gate))
        .with_state(state)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapPhase {
    Initializing,
    ConnectingDb,
    Listening,
    Failed,
}

/// Outcome of the startup sequence.
pub enum Bootstrap {
    Listening(Application),
    /// The error has already been logged.
    Failed(AppError),
}

impl Bootstrap {
    /// Connect to MongoDB, then bind the listener.
    pub async fn start(config: ContentConfig) -> Self {
        Self::from_result(Application::build(config).await)
    }

    pub async fn start_with<F>(config: ContentConfig, domain: Router<AppState>, connect: F) -> Self
    where
        F: Future<Output = Result<Arc<dyn DatabaseProbe>, AppError>>,
    {
        Self::from_result(Application::build_with(config, domain, connect).await)
    }

    fn from_result(result: Result<Application, AppError>) -> Self {
        match result {
            Ok(app) => Bootstrap::Listening(app),
            Err(e) => Bootstrap::Failed(e),
        }
    }

    pub fn phase(&self) -> BootstrapPhase {
        match self {
            Bootstrap::Listening(_) => BootstrapPhase::Listening,
            Bootstrap::Failed(_) => BootstrapPhase::Failed,
        }
    }
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
    state: AppState,
}

impl Application {
    /// Build the application against MongoDB with the default route table.
    pub async fn build(config: ContentConfig) -> Result<Self, AppError> {
        let mongo = config.mongodb.clone();
        Self::build_with(config, routes::api(), async move {
            let db = MongoDb::connect(&mongo).await?;
            Ok::<_, AppError>(Arc::new(db) as Arc<dyn DatabaseProbe>)
        })
        .await
    }

    /// Run the startup sequence with a caller-supplied connect step.
    ///
    /// Any failure is logged here, once, and returned; the listener is only
    /// bound after `connect` has succeeded.
    pub async fn build_with<F>(
        config: ContentConfig,
        domain: Router<AppState>,
        connect: F,
    ) -> Result<Self, AppError>
    where
        F: Future<Output = Result<Arc<dyn DatabaseProbe>, AppError>>,
    {
        tracing::info!(phase = ?BootstrapPhase::Initializing, service = %config.service_name, "Starting up");

        match Self::assemble(config, domain, connect).await {
            Ok(app) => Ok(app),
            Err(e) => {
                tracing::error!(phase = ?BootstrapPhase::Failed, error = %e, "Failed to start server");
                Err(e)
            }
        }
    }

    async fn assemble<F>(
        config: ContentConfig,
        domain: Router<AppState>,
        connect: F,
    ) -> Result<Self, AppError>
    where
        F: Future<Output = Result<Arc<dyn DatabaseProbe>, AppError>>,
    {
        let origins = Arc::new(OriginAllowlist::resolve(config.cors.client_origin.as_deref()));
        tracing::info!(allowed_origins = %origins, "CORS allowed origins");

        tracing::info!(phase = ?BootstrapPhase::ConnectingDb, "Connecting to database");
        let db = connect.await?;
        tracing::info!("Database connected successfully");

        let state = AppState::new(config.clone(), db, origins);
        let router = build_router(state.clone(), domain);

        // Port 0 binds a random port, which the tests rely on.
        let addr = SocketAddr::from(([0, 0, 0, 0], config.port()));
        tracing::info!(port = config.port(), "Binding to port");
        let listener = TcpListener::bind(addr).await?;
        let port = listener.local_addr()?.port();

        tracing::info!(phase = ?BootstrapPhase::Listening, port, "Content API running on port {}", port);

        Ok(Self {
            port,
            listener,
            router,
            state,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Serve until SIGINT or SIGTERM.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Service shutdown complete");
        Ok(())
    }
}

/// Resolves on SIGINT or SIGTERM. A handler that cannot be installed is
/// logged and treated as never firing.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
