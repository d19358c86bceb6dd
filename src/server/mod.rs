//! HTTP API
//!
//! ```text
//! POST /api/predict          multipart image (+ use_tta, model) -> prediction
//! POST /api/predict/batch    multipart images (+ model) -> per-file results
//! GET  /api/health           service status
//! GET  /api/models           catalog with load / availability state
//! GET  /api/info             service description
//! GET  /api/metrics          prediction metrics snapshot
//! GET  /uploads/{filename}   stored uploads
//! ```

pub mod error;
pub mod routes;
pub mod upload;

use crate::config::AppConfig;
use crate::metrics::PredictionMetrics;
use crate::models::{ModelRegistry, TtaAggregator};
use crate::policy::DecisionPolicy;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    services::ServeDir,
    trace::TraceLayer,
};

pub use error::{ApiError, ApiResult};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub registry: Arc<ModelRegistry>,
    pub metrics: Arc<PredictionMetrics>,
    pub policy: DecisionPolicy,
    pub aggregator: TtaAggregator,
}

impl AppState {
    pub fn new(config: AppConfig, registry: ModelRegistry) -> Self {
        Self::with_metrics(config, registry, Arc::new(PredictionMetrics::new()))
    }

    pub fn with_metrics(
        config: AppConfig,
        registry: ModelRegistry,
        metrics: Arc<PredictionMetrics>,
    ) -> Self {
        let policy = DecisionPolicy::new(config.prediction.threshold);
        Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
            metrics,
            policy,
            aggregator: TtaAggregator::default(),
        }
    }
}

/// Create the router with all routes
pub fn router(state: AppState) -> Router {
    let uploads = ServeDir::new(&state.config.upload.dir);
    let max_bytes = state.config.upload.max_bytes;

    let api = Router::new()
        .route("/api/predict", post(routes::predict))
        .route("/api/predict/batch", post(routes::predict_batch))
        .route("/api/health", get(routes::health))
        .route("/api/models", get(routes::models))
        .route("/api/info", get(routes::info))
        .route("/api/metrics", get(routes::metrics))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_bytes));

    Router::new()
        .merge(api)
        .nest_service("/uploads", uploads)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
