//! Bucket, cluster, face listing, and review handlers.

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiResult;
use crate::models::{
    BucketSummary, ClusterId, ClusterSummary, FaceRecord, PhotoRecord, RunContext, SkippedPhoto,
};
use crate::services::review;
use crate::AppState;

/// Wire representation of one face, joined with its owning photo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceItem {
    pub face_id: Uuid,
    pub photo_id: Uuid,
    pub bucket: String,
    pub bbox: (i32, i32, i32, i32),
    pub score: f32,
    pub size_px: u32,
    pub embedding_id: Uuid,
    pub cluster_id: ClusterId,
    pub accepted: Option<bool>,
    pub thumb_url: String,
    pub photo_path: String,
    pub photo_timestamp: String,
}

impl FaceItem {
    pub fn from_records(face: &FaceRecord, photo: &PhotoRecord) -> Self {
        let thumb_name = face
            .thumb_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            face_id: face.face_id,
            photo_id: face.photo_id,
            bucket: face.bucket_key.clone(),
            bbox: face.bbox,
            score: face.score,
            size_px: face.size_px,
            embedding_id: face.embedding_id,
            cluster_id: face.cluster_id.clone(),
            accepted: face.accepted,
            thumb_url: format!("/api/static/faces/{thumb_name}"),
            photo_path: photo.path.display().to_string(),
            photo_timestamp: photo.timestamp.format("%Y-%m-%dT%H:%M:%S").to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FacesResponse {
    pub faces: Vec<FaceItem>,
    pub skipped_photos: Vec<SkippedPhoto>,
}

#[derive(Debug, Deserialize)]
pub struct RunIdQuery {
    pub run_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct BucketFacesQuery {
    pub run_id: Uuid,
    pub bucket: String,
}

#[derive(Debug, Deserialize)]
pub struct ClusterFacesQuery {
    pub run_id: Uuid,
    pub cluster_id: String,
}

/// One merge instruction: first id is the target.
#[derive(Debug, Deserialize)]
pub struct MergeClustersRequest {
    pub clusters: Vec<String>,
}

/// One split instruction: extract the named faces out of a cluster.
#[derive(Debug, Deserialize)]
pub struct SplitClusterRequest {
    pub cluster_id: String,
    #[serde(default)]
    pub face_ids: Vec<Uuid>,
}

/// POST /api/review request: a batch of review mutations.
#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub run_id: Uuid,
    #[serde(default)]
    pub accept: Vec<Uuid>,
    #[serde(default)]
    pub reject: Vec<Uuid>,
    #[serde(default)]
    pub accept_clusters: Vec<String>,
    #[serde(default)]
    pub reject_clusters: Vec<String>,
    #[serde(default)]
    pub merge_clusters: Vec<MergeClustersRequest>,
    #[serde(default)]
    pub split_clusters: Vec<SplitClusterRequest>,
}

#[derive(Debug, Serialize)]
pub struct ReviewResponse {
    pub run_id: Uuid,
    pub updated_faces: Vec<FaceItem>,
}

fn face_items<'a>(
    ctx: &RunContext,
    faces: impl IntoIterator<Item = &'a FaceRecord>,
) -> Vec<FaceItem> {
    faces
        .into_iter()
        .filter_map(|face| {
            ctx.photos
                .get(&face.photo_id)
                .map(|photo| FaceItem::from_records(face, photo))
        })
        .collect()
}

/// GET /api/buckets — bucket summaries in chronological order.
pub async fn list_buckets(
    State(state): State<AppState>,
    Query(query): Query<RunIdQuery>,
) -> ApiResult<Json<Vec<BucketSummary>>> {
    let run = state.registry.get(query.run_id).await?;
    let summaries = run.read().await.bucket_summaries();
    Ok(Json(summaries))
}

/// GET /api/clusters — detected person clusters, noise last.
pub async fn list_clusters(
    State(state): State<AppState>,
    Query(query): Query<RunIdQuery>,
) -> ApiResult<Json<Vec<ClusterSummary>>> {
    let run = state.registry.get(query.run_id).await?;
    let summaries = run.read().await.cluster_summaries();
    Ok(Json(summaries))
}

/// GET /api/faces — faces for one bucket (`all` = whole run).
pub async fn get_faces(
    State(state): State<AppState>,
    Query(query): Query<BucketFacesQuery>,
) -> ApiResult<Json<FacesResponse>> {
    let run = state.registry.get(query.run_id).await?;
    let ctx = run.read().await;
    Ok(Json(FacesResponse {
        faces: face_items(&ctx, ctx.faces_in_bucket(&query.bucket)),
        skipped_photos: ctx.skipped.clone(),
    }))
}

/// GET /api/cluster-faces — all faces in one cluster.
pub async fn get_cluster_faces(
    State(state): State<AppState>,
    Query(query): Query<ClusterFacesQuery>,
) -> ApiResult<Json<FacesResponse>> {
    let run = state.registry.get(query.run_id).await?;
    let ctx = run.read().await;
    let cluster_id = ClusterId::from(query.cluster_id);
    Ok(Json(FacesResponse {
        faces: face_items(&ctx, ctx.faces_in_cluster(&cluster_id)),
        skipped_photos: ctx.skipped.clone(),
    }))
}

/// GET /api/all-faces — every face in the run, highest score first.
pub async fn get_all_faces(
    State(state): State<AppState>,
    Query(query): Query<RunIdQuery>,
) -> ApiResult<Json<FacesResponse>> {
    let run = state.registry.get(query.run_id).await?;
    let ctx = run.read().await;
    let mut faces: Vec<&FaceRecord> = ctx.faces_in_order().collect();
    faces.sort_by(|a, b| b.score.total_cmp(&a.score));
    Ok(Json(FacesResponse {
        faces: face_items(&ctx, faces),
        skipped_photos: ctx.skipped.clone(),
    }))
}

/// POST /api/review — apply a batch of review mutations.
///
/// Mutations are applied under the run's write lock, one batch at a time;
/// unknown face or cluster ids are no-ops by design.
pub async fn apply_review(
    State(state): State<AppState>,
    Json(request): Json<ReviewRequest>,
) -> ApiResult<Json<ReviewResponse>> {
    let run = state.registry.get(request.run_id).await?;
    let mut ctx = run.write().await;

    review::accept_faces(&mut ctx, &request.accept);
    review::reject_faces(&mut ctx, &request.reject);

    let to_ids = |ids: &[String]| -> Vec<ClusterId> {
        ids.iter().map(|s| ClusterId::from(s.as_str())).collect()
    };
    review::accept_clusters(&mut ctx, &to_ids(&request.accept_clusters));
    review::reject_clusters(&mut ctx, &to_ids(&request.reject_clusters));

    for merge in &request.merge_clusters {
        review::merge_clusters(&mut ctx, &to_ids(&merge.clusters));
    }
    for split in &request.split_clusters {
        review::split_cluster(
            &mut ctx,
            &ClusterId::from(split.cluster_id.as_str()),
            &split.face_ids,
        );
    }

    let updated = review::face_collection(&ctx);
    let response = ReviewResponse {
        run_id: request.run_id,
        updated_faces: face_items(&ctx, updated.iter()),
    };
    tracing::info!(
        run_id = %request.run_id,
        faces = response.updated_faces.len(),
        "Review mutations applied"
    );
    Ok(Json(response))
}

pub fn face_routes() -> Router<AppState> {
    Router::new()
        .route("/api/buckets", get(list_buckets))
        .route("/api/clusters", get(list_clusters))
        .route("/api/faces", get(get_faces))
        .route("/api/cluster-faces", get(get_cluster_faces))
        .route("/api/all-faces", get(get_all_faces))
        .route("/api/review", post(apply_review))
}
