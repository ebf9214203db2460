use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, Method, StatusCode, Uri},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use super::error::ApiError;
use crate::auth::ApiSecretGuard;
use crate::ids::new_tracker_id;
use crate::metrics::render_metrics;
use crate::models::{DeleteTrackerRequest, SecretBody, VisitRow};
use crate::storage::Storage;

pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub guard: ApiSecretGuard,
}

#[derive(Debug, Default, Deserialize)]
pub struct SecretQuery {
    #[serde(rename = "api-secret")]
    pub api_secret: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GlobalStatsResponse {
    pub count: usize,
    pub results: Vec<VisitRow>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TrackerStatsResponse {
    #[serde(rename = "trackerId")]
    pub tracker_id: String,
    pub count: usize,
    pub result: Vec<VisitRow>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NewTrackerResponse {
    pub id: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

// A malformed query string or body counts as a missing secret, not a 400
fn secret_query(query: Result<Query<SecretQuery>, QueryRejection>) -> SecretQuery {
    query.map(|Query(q)| q).unwrap_or_default()
}

fn json_body<T: Default>(payload: Result<Json<T>, JsonRejection>) -> T {
    payload.map(|Json(body)| body).unwrap_or_default()
}

fn not_found(tracker_id: &str) -> ApiError {
    ApiError::NotFound(format!("Tracker with ID: {tracker_id} not found."))
}

/// Service banner
pub async fn banner() -> String {
    format!("Pixel Tracker App (Version {})", env!("CARGO_PKG_VERSION"))
}

/// Health check endpoint, fails when the store is unreachable
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.storage.ping().await {
        Ok(()) => (StatusCode::OK, Json(HealthResponse { status: "OK" })),
        Err(e) => {
            tracing::warn!("Health check failed: {:#}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "UNAVAILABLE",
                }),
            )
        }
    }
}

/// List every recorded visit
pub async fn global_stats(
    State(state): State<Arc<AppState>>,
    method: Method,
    query: Result<Query<SecretQuery>, QueryRejection>,
) -> Result<Json<GlobalStatsResponse>, ApiError> {
    let query = secret_query(query);
    state
        .guard
        .authorize(&method, query.api_secret.as_deref(), None)?;

    let results = state.storage.list_visits(None).await?;
    Ok(Json(GlobalStatsResponse {
        count: results.len(),
        results,
    }))
}

/// List the recorded visits of one tracker, 404 when it has none
pub async fn tracker_stats(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    path: Result<Path<String>, PathRejection>,
    query: Result<Query<SecretQuery>, QueryRejection>,
) -> Result<Json<TrackerStatsResponse>, ApiError> {
    let query = secret_query(query);
    state
        .guard
        .authorize(&method, query.api_secret.as_deref(), None)?;

    // An id that does not decode to UTF-8 cannot name a stored tracker
    let tracker_id = match path {
        Ok(Path(tracker_id)) => tracker_id,
        Err(_) => {
            let raw = uri.path().rsplit('/').next().unwrap_or_default();
            return Err(not_found(raw));
        }
    };

    let result = state.storage.list_visits(Some(&tracker_id)).await?;
    if result.is_empty() {
        return Err(not_found(&tracker_id));
    }

    Ok(Json(TrackerStatsResponse {
        tracker_id,
        count: result.len(),
        result,
    }))
}

/// Visit counts per (tracker, referer) in exposition format
pub async fn metrics(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let counts = state.storage.referer_counts().await?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        render_metrics(&counts),
    ))
}

/// Create a tracker with a freshly generated id
pub async fn new_tracker(
    State(state): State<Arc<AppState>>,
    method: Method,
    payload: Result<Json<SecretBody>, JsonRejection>,
) -> Result<Json<NewTrackerResponse>, ApiError> {
    let body = json_body(payload);
    state
        .guard
        .authorize(&method, None, body.api_secret.as_deref())?;

    let tracker = state.storage.create_tracker(&new_tracker_id()).await?;
    info!(tracker_id = %tracker.id, "Tracker created");

    Ok(Json(NewTrackerResponse { id: tracker.id }))
}

/// Delete the tracker named by the body's `id` field
pub async fn delete_tracker(
    State(state): State<Arc<AppState>>,
    method: Method,
    payload: Result<Json<DeleteTrackerRequest>, JsonRejection>,
) -> Result<String, ApiError> {
    let body = json_body(payload);
    state
        .guard
        .authorize(&method, None, body.secret.api_secret.as_deref())?;

    let id = body.id.unwrap_or_default();
    if id.is_empty() {
        return Err(not_found(&id));
    }

    if state.storage.delete_tracker(&id).await? {
        info!(tracker_id = %id, "Tracker deleted");
        Ok(format!("Tracker with ID: {id} deleted."))
    } else {
        Err(not_found(&id))
    }
}
