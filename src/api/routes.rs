use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::auth::ApiSecretGuard;
use crate::config::VisitConfig;
use crate::pixel::create_pixel_router;
use crate::storage::Storage;

use super::handlers::{
    banner, delete_tracker, global_stats, health_check, metrics, new_tracker, tracker_stats,
    AppState,
};

pub fn create_api_router(storage: Arc<dyn Storage>, guard: ApiSecretGuard) -> Router {
    let state = Arc::new(AppState { storage, guard });

    Router::new()
        .route("/", get(banner))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/stats", get(global_stats))
        .route("/stats/{tracker_id}", get(tracker_stats))
        .route("/new-tracker", post(new_tracker))
        .route("/delete-tracker", post(delete_tracker))
        .with_state(state)
}

/// Full service: pixel capture plus the API, with per-request tracing
pub fn create_router(
    storage: Arc<dyn Storage>,
    guard: ApiSecretGuard,
    visit_config: VisitConfig,
) -> Router {
    Router::new()
        .merge(create_pixel_router(Arc::clone(&storage), visit_config))
        .merge(create_api_router(storage, guard))
        .layer(TraceLayer::new_for_http())
}
