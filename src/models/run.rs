//! Runtime state for one processing run.
//!
//! A `RunContext` owns every photo, face, and index produced by its
//! pipeline. It enforces no internal locking: during the automatic phases
//! only the run's worker task writes it, and review mutations are applied
//! afterwards under the registry's per-run lock.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use uuid::Uuid;

use crate::models::ClusterId;
use crate::services::bucket::BucketGranularity;

/// Pipeline phase state machine.
///
/// Transitions are one-directional: `Idle → Scanning → Detecting →
/// Embedding → Clustering → Done`, with `Error` reachable from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Scanning,
    Detecting,
    Embedding,
    Clustering,
    Done,
    Error,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Done | Phase::Error)
    }
}

/// Immutable parameters a run was started with.
#[derive(Debug, Clone)]
pub struct RunParameters {
    pub folder: PathBuf,
    pub bucket: BucketGranularity,
    /// Longest edge the detector input is downscaled to.
    pub max_edge: u32,
    /// Minimum bounding-box dimension for a detection to become a face.
    pub min_face_px: u32,
    /// Edge size of saved photo/face thumbnails.
    pub thumb_edge: u32,
    pub downscale_detector: bool,
}

/// Progress counters for the current phase.
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    pub processed: usize,
    pub total: usize,
    pub message: Option<String>,
}

/// One accepted source photograph. Immutable after scanning.
#[derive(Debug, Clone)]
pub struct PhotoRecord {
    pub photo_id: Uuid,
    pub path: PathBuf,
    pub timestamp: NaiveDateTime,
    pub bucket_key: String,
    pub bucket_label: String,
    pub thumb_path: PathBuf,
    pub width: u32,
    pub height: u32,
}

/// One detected face. The embedding, cluster id, and acceptance flag are
/// mutated by the clustering engine and the review engine; everything else
/// is fixed at detection time.
#[derive(Debug, Clone)]
pub struct FaceRecord {
    pub face_id: Uuid,
    pub photo_id: Uuid,
    pub bucket_key: String,
    /// Bounding box in detection-space pixels (x, y, w, h).
    pub bbox: (i32, i32, i32, i32),
    pub score: f32,
    pub size_px: u32,
    pub embedding_id: Uuid,
    pub embedding: Vec<f32>,
    pub cluster_id: ClusterId,
    /// Tri-state reviewer judgment: unset / accepted / rejected.
    pub accepted: Option<bool>,
    pub thumb_path: PathBuf,
}

/// A file that never became a photo, with the reason it was skipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedPhoto {
    pub path: String,
    pub reason: String,
}

/// Status snapshot published on every phase/progress event and served by
/// the status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub run_id: Uuid,
    pub phase: Phase,
    pub processed: usize,
    pub total: usize,
    pub message: Option<String>,
}

/// Per-bucket roll-up for the review UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketSummary {
    pub key: String,
    pub label: String,
    pub photo_count: usize,
    pub face_count: usize,
}

/// Per-cluster roll-up for the review UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub cluster_id: ClusterId,
    pub face_count: usize,
    pub label: String,
}

/// Aggregate root for one processing run.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: Uuid,
    pub parameters: RunParameters,
    pub phase: Phase,
    pub stats: RunStats,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub photos: HashMap<Uuid, PhotoRecord>,
    /// Photo ids in insertion order; detection iterates this.
    pub photo_order: Vec<Uuid>,
    pub photos_by_bucket: HashMap<String, Vec<Uuid>>,
    pub faces: HashMap<Uuid, FaceRecord>,
    /// Face ids in insertion order; clustering consumes embeddings in this
    /// order, which makes the label numbering deterministic.
    pub face_order: Vec<Uuid>,
    pub faces_by_bucket: HashMap<String, Vec<Uuid>>,
    pub bucket_labels: HashMap<String, String>,
    pub clusters: HashMap<ClusterId, Vec<Uuid>>,
    pub skipped: Vec<SkippedPhoto>,
    pub errors: Vec<String>,
}

impl RunContext {
    pub fn new(run_id: Uuid, parameters: RunParameters) -> Self {
        Self {
            run_id,
            parameters,
            phase: Phase::Idle,
            stats: RunStats::default(),
            started_at: Utc::now(),
            completed_at: None,
            photos: HashMap::new(),
            photo_order: Vec::new(),
            photos_by_bucket: HashMap::new(),
            faces: HashMap::new(),
            face_order: Vec::new(),
            faces_by_bucket: HashMap::new(),
            bucket_labels: HashMap::new(),
            clusters: HashMap::new(),
            skipped: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn update_phase(&mut self, phase: Phase, message: Option<String>) {
        self.phase = phase;
        self.stats.message = message;
        if phase.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
    }

    pub fn as_status(&self) -> StatusSnapshot {
        StatusSnapshot {
            run_id: self.run_id,
            phase: self.phase,
            processed: self.stats.processed,
            total: self.stats.total,
            message: self.stats.message.clone(),
        }
    }

    /// Index a freshly scanned photo into the flat map and bucket lists.
    pub fn insert_photo(&mut self, photo: PhotoRecord) {
        self.bucket_labels
            .entry(photo.bucket_key.clone())
            .or_insert_with(|| photo.bucket_label.clone());
        self.photos_by_bucket
            .entry(photo.bucket_key.clone())
            .or_default()
            .push(photo.photo_id);
        self.photo_order.push(photo.photo_id);
        self.photos.insert(photo.photo_id, photo);
    }

    /// Index a freshly detected face into the flat map and bucket lists.
    pub fn insert_face(&mut self, face: FaceRecord) {
        self.faces_by_bucket
            .entry(face.bucket_key.clone())
            .or_default()
            .push(face.face_id);
        self.face_order.push(face.face_id);
        self.faces.insert(face.face_id, face);
    }

    /// Faces in insertion order.
    pub fn faces_in_order(&self) -> impl Iterator<Item = &FaceRecord> {
        self.face_order.iter().filter_map(|id| self.faces.get(id))
    }

    /// Faces for one bucket key, or every face when `bucket` is `"all"`.
    pub fn faces_in_bucket(&self, bucket: &str) -> Vec<&FaceRecord> {
        if bucket == "all" {
            return self.faces_in_order().collect();
        }
        self.faces_by_bucket
            .get(bucket)
            .map(|ids| ids.iter().filter_map(|id| self.faces.get(id)).collect())
            .unwrap_or_default()
    }

    /// Faces currently assigned to one cluster, in membership order.
    pub fn faces_in_cluster(&self, cluster_id: &ClusterId) -> Vec<&FaceRecord> {
        self.clusters
            .get(cluster_id)
            .map(|ids| ids.iter().filter_map(|id| self.faces.get(id)).collect())
            .unwrap_or_default()
    }

    /// Bucket summaries sorted chronologically by sort key.
    pub fn bucket_summaries(&self) -> Vec<BucketSummary> {
        let mut summaries: Vec<BucketSummary> = self
            .bucket_labels
            .iter()
            .map(|(key, label)| BucketSummary {
                key: key.clone(),
                label: label.clone(),
                photo_count: self
                    .photos_by_bucket
                    .get(key)
                    .map(Vec::len)
                    .unwrap_or_default(),
                face_count: self
                    .faces_by_bucket
                    .get(key)
                    .map(Vec::len)
                    .unwrap_or_default(),
            })
            .collect();
        summaries.sort_by_key(|s| crate::services::bucket::bucket_sort_key(&s.key));
        summaries
    }

    /// Cluster summaries with noise sorted last, otherwise lexicographic.
    pub fn cluster_summaries(&self) -> Vec<ClusterSummary> {
        let mut summaries: Vec<ClusterSummary> = self
            .clusters
            .iter()
            .map(|(cluster_id, face_ids)| ClusterSummary {
                label: if cluster_id.is_noise() {
                    "Noise".to_string()
                } else {
                    format!("Person {cluster_id}")
                },
                cluster_id: cluster_id.clone(),
                face_count: face_ids.len(),
            })
            .collect();
        summaries.sort_by_key(|s| (s.cluster_id.is_noise(), s.cluster_id.as_str().to_string()));
        summaries
    }
}
