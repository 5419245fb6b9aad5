//! Run lifecycle handlers: start, status, live event stream.

use axum::{
    body::Body,
    extract::{Query, State},
    http::header,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::path::PathBuf;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{RunParameters, StatusSnapshot};
use crate::services::bucket::BucketGranularity;
use crate::AppState;

/// POST /api/scan request
#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    /// Absolute path to the photo directory.
    pub folder: String,
    #[serde(default = "default_bucket")]
    pub bucket: BucketGranularity,
    #[serde(default = "default_max_edge")]
    pub max_edge: u32,
    #[serde(default = "default_min_face_px")]
    pub min_face_px: u32,
    #[serde(default = "default_thumb_edge")]
    pub thumb_edge: u32,
    #[serde(default = "default_true")]
    pub downscale_detector: bool,
}

fn default_bucket() -> BucketGranularity {
    BucketGranularity::Month
}

fn default_max_edge() -> u32 {
    1600
}

fn default_min_face_px() -> u32 {
    48
}

fn default_thumb_edge() -> u32 {
    256
}

fn default_true() -> bool {
    true
}

impl ScanRequest {
    pub fn into_parameters(self) -> RunParameters {
        RunParameters {
            folder: PathBuf::from(self.folder),
            bucket: self.bucket,
            max_edge: self.max_edge,
            min_face_px: self.min_face_px,
            thumb_edge: self.thumb_edge,
            downscale_detector: self.downscale_detector,
        }
    }
}

/// POST /api/scan response
#[derive(Debug, Serialize)]
pub struct ScanResponse {
    pub run_id: Uuid,
    pub status: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct RunIdQuery {
    pub run_id: Uuid,
}

/// POST /api/scan — start a processing run in a background worker.
pub async fn start_scan(
    State(state): State<AppState>,
    Json(request): Json<ScanRequest>,
) -> ApiResult<Json<ScanResponse>> {
    let folder = std::path::Path::new(&request.folder);
    if !folder.exists() {
        return Err(ApiError::BadRequest(format!(
            "Folder does not exist: {}",
            request.folder
        )));
    }
    if !folder.is_dir() {
        return Err(ApiError::BadRequest(format!(
            "Not a directory: {}",
            request.folder
        )));
    }

    let run_id = std::sync::Arc::clone(&state.orchestrator)
        .start_run(&state.registry, request.into_parameters())
        .await?;

    tracing::info!(run_id = %run_id, "Run started");
    Ok(Json(ScanResponse {
        run_id,
        status: "started",
    }))
}

/// GET /api/status?run_id — current status snapshot for a run.
pub async fn get_status(
    State(state): State<AppState>,
    Query(query): Query<RunIdQuery>,
) -> ApiResult<Json<StatusSnapshot>> {
    let run = state.registry.get(query.run_id).await?;
    let status = run.read().await.as_status();
    Ok(Json(status))
}

/// GET /api/stream?run_id — the run's live SSE stream.
///
/// The stream ends after the terminal `done`/`error` event per the event
/// channel contract; no keep-alive is layered on top.
pub async fn stream_events(
    State(state): State<AppState>,
    Query(query): Query<RunIdQuery>,
) -> ApiResult<Response> {
    let channel = state.registry.channel(query.run_id).await?;
    tracing::info!(run_id = %query.run_id, "SSE client connected");

    let body = Body::from_stream(channel.stream().map(Ok::<_, Infallible>));
    Response::builder()
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(body)
        .map_err(|e| ApiError::Internal(e.to_string()))
}

pub fn scan_routes() -> Router<AppState> {
    Router::new()
        .route("/api/scan", post(start_scan))
        .route("/api/status", get(get_status))
        .route("/api/stream", get(stream_events))
}
