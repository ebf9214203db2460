use axum::{routing::get, Router};
use std::sync::Arc;

use crate::config::VisitConfig;
use crate::storage::Storage;

use super::handlers::{serve_pixel, PixelState};

pub fn create_pixel_router(storage: Arc<dyn Storage>, visit_config: VisitConfig) -> Router {
    let state = Arc::new(PixelState {
        storage,
        visit_config,
    });

    Router::new()
        .route("/pixel/{id}", get(serve_pixel))
        .with_state(state)
}
