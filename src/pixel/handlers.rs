use axum::{
    extract::{ConnectInfo, Path, Request, State},
    http::header,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use crate::api::ApiError;
use crate::config::VisitConfig;
use crate::storage::Storage;
use crate::visits::capture_visit;

/// 1x1 transparent PNG
pub const PIXEL_PNG: &[u8] = include_bytes!("../../assets/1x1.png");

pub struct PixelState {
    pub storage: Arc<dyn Storage>,
    pub visit_config: VisitConfig,
}

/// Record a visit for `id`, then serve the pixel.
///
/// The image is only sent once the visit is committed; a failed insert
/// answers 500 without image bytes.
pub async fn serve_pixel(
    State(state): State<Arc<PixelState>>,
    Path(id): Path<String>,
    request: Request,
) -> Result<Response, ApiError> {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    let visit = capture_visit(&id, request.headers(), peer, &state.visit_config);
    state.storage.record_visit(&visit).await?;

    info!(tracker_id = %id, "Pixel served");
    Ok(pixel_response())
}

fn pixel_response() -> Response {
    (
        [
            (header::CONTENT_TYPE, "image/png"),
            (header::CACHE_CONTROL, "no-store, no-cache, must-revalidate"),
        ],
        PIXEL_PNG,
    )
        .into_response()
}
