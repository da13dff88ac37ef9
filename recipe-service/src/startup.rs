//! Application startup and lifecycle management.

use crate::config::RecipeConfig;
use crate::handlers::{self, ai, index, recipes};
use crate::services::providers::gemini::GeminiClient;
use crate::services::providers::GenerativeModel;
use crate::services::{GenerationService, RecipeDb};
use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use recipe_core::error::AppError;
use recipe_core::middleware::{
    create_ip_rate_limiter, ip_rate_limit_middleware, metrics_middleware, request_id_middleware,
    security_headers_middleware, REQUEST_ID_HEADER,
};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

const RATE_LIMIT_WINDOW_SECS: u64 = 60;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: RecipeConfig,
    pub db: RecipeDb,
    pub generation: GenerationService,
}

/// Build the full HTTP router for `state`.
pub fn build_router(state: AppState) -> Router {
    let limiter = create_ip_rate_limiter(
        state.config.rate_limit.ai_requests_per_minute,
        RATE_LIMIT_WINDOW_SECS,
    );

    let ai_routes = Router::new()
        .route("/generate", post(ai::generate))
        .route("/generate-stream", post(ai::generate_stream))
        .layer(from_fn_with_state(limiter, ip_rate_limit_middleware));

    let recipe_routes = Router::new()
        .route("/", get(index::recipes_root))
        .route("/all", get(recipes::list_all))
        .route("/paginate", get(recipes::paginate))
        .route("/random", get(recipes::random))
        .route("/ids", get(recipes::by_ids))
        .route("/addNew", post(recipes::add_new));

    Router::new()
        .route("/", get(index::root))
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        .nest("/api/ai", ai_routes)
        .nest("/recipes", recipe_routes)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(from_fn(security_headers_middleware))
        .layer(from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
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
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: RecipeConfig) -> Result<Self, AppError> {
        let db = RecipeDb::connect(&config.mongodb.uri, &config.mongodb.database)
            .await
            .map_err(|e| {
                tracing::error!("Failed to connect to MongoDB: {}", e);
                e
            })?;

        db.initialize_indexes().await.map_err(|e| {
            tracing::error!("Failed to initialize database indexes: {}", e);
            e
        })?;

        let model: Arc<dyn GenerativeModel> =
            Arc::new(GeminiClient::new(&config.gemini).map_err(|e| {
                tracing::error!("Failed to initialize Gemini client: {}", e);
                AppError::ConfigError(anyhow::anyhow!(e.to_string()))
            })?);

        tracing::info!(model = %config.gemini.model, "Initialized Gemini client");

        let state = AppState {
            config: config.clone(),
            db,
            generation: GenerationService::new(model),
        };

        // Port 0 picks a random port for testing
        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(
            environment = %config.environment,
            "Recipe service listening on port {}",
            port
        );

        Ok(Self { listener, state })
    }

    /// Serve until SIGINT or SIGTERM. Peer addresses are recorded so the
    /// rate limiter can key on them.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let app = build_router(self.state);

        axum::serve(
            self.listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .into_future()
        .await
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
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
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
