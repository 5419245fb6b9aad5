//! Collage rendering handler.

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::services::collage::{self, CollageError, CollageOptions, PaperFormat};
use crate::services::selection::{self, SelectionPolicy, SortMode};
use crate::AppState;

/// POST /api/collage request
#[derive(Debug, Deserialize)]
pub struct CollageRequest {
    pub run_id: Uuid,
    pub bucket: String,
    #[serde(default = "default_tile_size")]
    pub tile_size: u32,
    #[serde(default = "default_columns")]
    pub columns: u32,
    #[serde(default = "default_padding")]
    pub padding_x: u32,
    #[serde(default = "default_padding")]
    pub padding_y: u32,
    #[serde(default = "default_margin")]
    pub margin: u32,
    #[serde(default = "default_background")]
    pub background: String,
    #[serde(default = "default_sort")]
    pub sort: SortMode,
    #[serde(default = "default_max_faces")]
    pub max_faces: usize,
    #[serde(default = "default_selection")]
    pub face_selection: SelectionPolicy,
    /// Explicit face allow-list; overrides `face_selection` when non-empty.
    #[serde(default)]
    pub face_ids: Vec<Uuid>,
    #[serde(default = "default_format")]
    pub output_format: PaperFormat,
    #[serde(default)]
    pub preview: bool,
}

fn default_tile_size() -> u32 {
    160
}

fn default_columns() -> u32 {
    12
}

fn default_padding() -> u32 {
    4
}

fn default_margin() -> u32 {
    32
}

fn default_background() -> String {
    "white".to_string()
}

fn default_sort() -> SortMode {
    SortMode::ByTime
}

fn default_max_faces() -> usize {
    300
}

fn default_selection() -> SelectionPolicy {
    SelectionPolicy::AcceptedOnly
}

fn default_format() -> PaperFormat {
    PaperFormat::A4
}

/// POST /api/collage response
#[derive(Debug, Serialize)]
pub struct CollageResponse {
    pub output_path: String,
    pub width: u32,
    pub height: u32,
    pub static_url: String,
}

/// POST /api/collage — render the reviewed faces of a bucket to disk.
pub async fn create_collage(
    State(state): State<AppState>,
    Json(request): Json<CollageRequest>,
) -> ApiResult<Json<CollageResponse>> {
    let run = state.registry.get(request.run_id).await?;
    let ctx = run.read().await;

    let selected = selection::select_faces(
        &ctx,
        &request.bucket,
        request.face_selection,
        &request.face_ids,
    );
    let ordered = selection::order_faces(&ctx, selected, request.sort, &request.bucket);

    let options = CollageOptions {
        tile_size: request.tile_size,
        columns: request.columns,
        padding_x: request.padding_x,
        padding_y: request.padding_y,
        margin: request.margin,
        background: request.background.clone(),
        sort: request.sort,
        max_faces: request.max_faces,
        output_format: request.output_format,
        preview: request.preview,
    };

    let output = collage::render_collage(&ctx, &request.bucket, &ordered, &options, &state.settings)
        .map_err(|e| match e {
            CollageError::NoFaces => ApiError::BadRequest(e.to_string()),
            other => ApiError::Internal(other.to_string()),
        })?;

    let static_name = output
        .static_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    tracing::info!(
        run_id = %request.run_id,
        bucket = %request.bucket,
        path = %output.output_path.display(),
        "Collage rendered"
    );
    Ok(Json(CollageResponse {
        output_path: output.output_path.display().to_string(),
        width: output.width,
        height: output.height,
        static_url: format!("/api/static/collages/{static_name}"),
    }))
}

pub fn collage_routes() -> Router<AppState> {
    Router::new().route("/api/collage", post(create_collage))
}
