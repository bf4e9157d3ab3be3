//! Server initialization and routing
//!
//! This module handles the Axum server setup including:
//! - Router configuration with all API endpoints
//! - Middleware stack (request ids, logging, compression, CORS)
//! - The background health refresh
//! - Graceful shutdown handling

use crate::config::ServerConfig;
use crate::metrics::{install_prometheus, PrometheusSearchMetrics};
use crate::middleware::{log_requests, request_id};
use crate::routes::{admin, health, search, suggestions};
use crate::routes::{api_info, not_found};
use crate::state::ServerState;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::middleware::from_fn;
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Build the Axum router with all routes and middleware
///
/// Middleware stack (outermost first):
/// 1. Tracing spans
/// 2. Request ID tracking
/// 3. Request logging
/// 4. CORS
/// 5. Compression
/// 6. Timeout handling
pub fn build_router(state: Arc<ServerState>) -> Router {
    // CORS layer
    let cors = if state.config.enable_cors {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::new()
    };

    let public_routes = Router::new()
        .route("/", get(api_info))
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics));

    let search_routes = Router::new()
        .route("/search", get(search::keyword_search))
        .route("/search/vector", post(search::vector_search))
        .route("/search/vector/enhanced", post(search::enhanced_search))
        .route("/search/vector/paginated", post(search::paginated_search))
        .route("/search/vector/status", get(search::vector_status))
        .route("/search/ai-database", post(search::ai_database_search))
        .route("/search/suggestions", get(suggestions::suggestions))
        .route("/search/popular", get(suggestions::popular))
        .route("/categories", get(suggestions::categories))
        .layer(DefaultBodyLimit::max(state.config.max_body_size()));

    let mut router = Router::new().merge(public_routes).merge(search_routes);
    if state.config.admin_enabled {
        router = router.route("/admin/index/reload", post(admin::reload_index));
    }

    router
        .fallback(not_found)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            state.config.timeout(),
        ))
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(from_fn(log_requests))
        .layer(from_fn(request_id))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Re-check the vector path every `interval` so cached status never goes
/// stale while the server is idle.
pub fn spawn_health_refresh(state: Arc<ServerState>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let available = state.coordinator().health().refresh().await;
            tracing::debug!(available, "periodic health refresh");
        }
    })
}

/// Start the PoseLens HTTP server
///
/// Blocks until the server is shut down via SIGTERM or Ctrl+C.
///
/// # Example
///
/// ```rust,no_run
/// use server::ServerConfig;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = ServerConfig::load()?;
///     server::start_server(config).await?;
///     Ok(())
/// }
/// ```
///
/// # Initialization
///
/// 1. Sets up structured JSON logging with the configured log level
/// 2. Installs the Prometheus recorder and search metrics observer
/// 3. Builds the engine (index, catalog, embedder, coordinator)
/// 4. Starts the periodic health refresh
/// 5. Binds to the configured TCP address and serves until shutdown
///
/// A missing index does not stop startup: searches degrade to keyword
/// matching and `/ready` answers `503` until an index is loaded.
pub async fn start_server(config: ServerConfig) -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(&config.log_level)
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .json()
        .init();

    let mut state = ServerState::new(config.clone())?;
    if config.metrics_enabled {
        state = state.with_prometheus(install_prometheus()?);
        retrieval::set_search_metrics(Some(Arc::new(PrometheusSearchMetrics)));
    }
    let state = Arc::new(state);

    let refresh_every = state.engine.config().health.ttl().max(Duration::from_secs(1));
    let refresher = spawn_health_refresh(Arc::clone(&state), refresh_every);

    let app = build_router(Arc::clone(&state));
    let addr: SocketAddr = config.socket_addr()?;

    tracing::info!(
        %addr,
        index_loaded = state.engine.is_ready(),
        admin = config.admin_enabled,
        "Starting PoseLens server"
    );
    tracing::info!(
        "Timeout: {}s, Max body: {}MB",
        config.timeout_secs,
        config.max_body_size_mb
    );
    tracing::info!(
        "CORS: {}, Metrics: {}",
        config.enable_cors,
        config.metrics_enabled
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    refresher.abort();
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Shutdown signal handler
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
