//! Inocua API Gateway
//!
//! HTTP surface for the chat arbitration engine.
//! Handles:
//! - Request parsing and validation
//! - Request routing
//! - Observability (logging, metrics, tracing)

mod handlers;

use axum::{
    error_handling::HandleErrorLayer,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use inocua_common::{
    answer,
    config::{AppConfig, ObservabilityConfig},
    errors::AppError,
    metrics::{self, EXTERNAL_CALL_BUCKETS},
    ChatResponse, ResponseArbitrator,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::{signal, sync::oneshot};
use tower::{
    timeout::{error::Elapsed, TimeoutLayer},
    BoxError, ServiceBuilder,
};
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub arbitrator: Arc<ResponseArbitrator>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Arc::new(AppConfig::load()?);

    init_tracing(&config.observability);
    info!("Starting Inocua API Gateway v{}", inocua_common::VERSION);

    // Initialize metrics
    if config.observability.metrics_port != 0 {
        install_metrics_exporter(config.observability.metrics_port)?;
    }
    metrics::register_metrics();

    let arbitrator = Arc::new(ResponseArbitrator::from_config(&config).map_err(|e| {
        tracing::error!(error = %e, "Failed to build the arbitrator");
        e
    })?);

    if config.corpus.eager_load {
        let corpus = arbitrator.corpus().get().await;
        info!(
            chunks = corpus.store.len(),
            documents = corpus.catalog.len(),
            "Corpus loaded at startup"
        );
    }

    let state = AppState {
        config: config.clone(),
        arbitrator,
    };

    // Build the router
    let app = create_router(state);

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Fires once a shutdown signal arrives; starts the drain deadline
    let (draining_tx, draining_rx) = oneshot::channel();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = draining_tx.send(());
        })
        .into_future();

    tokio::select! {
        result = server => result?,
        _ = drain_deadline(draining_rx, config.shutdown_timeout()) => {
            warn!(
                timeout_secs = config.server.shutdown_timeout_secs,
                "In-flight requests did not finish in time, forcing shutdown"
            );
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let registry = tracing_subscriber::registry().with(filter);
    if config.json_logging {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}

fn install_metrics_exporter(port: u16) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from(([0, 0, 0, 0], port)))
        .set_buckets_for_metric(Matcher::Suffix("duration_seconds".to_string()), EXTERNAL_CALL_BUCKETS)?
        .install()?;
    info!(port = port, "Prometheus exporter listening");
    Ok(())
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // Upper bound for a whole request, including model calls and retries
    let timeout = ServiceBuilder::new()
        .layer(HandleErrorLayer::new(handle_timeout))
        .layer(TimeoutLayer::new(state.config.request_timeout()));

    let api_routes = Router::new().route("/chat", post(handlers::chat::chat));

    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .nest("/v1", api_routes)
        .layer(timeout)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

/// A request that ran out of time reports the engine as unavailable.
async fn handle_timeout(err: BoxError) -> Response {
    if err.is::<Elapsed>() {
        warn!("Request exceeded the configured timeout");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ChatResponse::Unavailable {
                text: answer::UNAVAILABLE_TEXT.to_string(),
            }),
        )
            .into_response()
    } else {
        AppError::Internal {
            message: err.to_string(),
        }
        .into_response()
    }
}

/// Resolves `limit` after shutdown starts; never resolves before.
async fn drain_deadline(draining: oneshot::Receiver<()>, limit: Duration) {
    if draining.await.is_err() {
        std::future::pending::<()>().await;
    }
    tokio::time::sleep(limit).await;
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
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
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
