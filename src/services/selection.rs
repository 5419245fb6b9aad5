//! Deterministic face selection and ordering for collage rendering.

use chrono::NaiveDateTime;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

use crate::models::{FaceRecord, RunContext};

/// Which acceptance flags survive selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Only faces whose flag is exactly accepted.
    AcceptedOnly,
    /// Every face whose flag is not exactly rejected (accepted or unset).
    AcceptedAndUnreviewed,
}

/// Ordering applied before rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    /// Chronological by owning photo timestamp.
    ByTime,
    /// By cluster id, chronological within each cluster.
    ByCluster,
    /// Seeded pseudo-random shuffle, reproducible for the same inputs.
    Random,
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SortMode::ByTime => "by_time",
            SortMode::ByCluster => "by_cluster",
            SortMode::Random => "random",
        };
        f.write_str(name)
    }
}

/// Select the faces of one bucket (`"all"` = whole run) under a policy.
///
/// An explicit non-empty allow-list overrides the policy entirely.
pub fn select_faces<'a>(
    ctx: &'a RunContext,
    bucket: &str,
    policy: SelectionPolicy,
    allow_list: &[Uuid],
) -> Vec<&'a FaceRecord> {
    let candidates = ctx.faces_in_bucket(bucket);
    if !allow_list.is_empty() {
        return candidates
            .into_iter()
            .filter(|face| allow_list.contains(&face.face_id))
            .collect();
    }
    candidates
        .into_iter()
        .filter(|face| match policy {
            SelectionPolicy::AcceptedOnly => face.accepted == Some(true),
            SelectionPolicy::AcceptedAndUnreviewed => face.accepted != Some(false),
        })
        .collect()
}

/// Order faces for rendering. The random mode derives its seed from the run
/// id, bucket, and mode, so the same request always shuffles the same way.
pub fn order_faces<'a>(
    ctx: &RunContext,
    mut faces: Vec<&'a FaceRecord>,
    mode: SortMode,
    bucket: &str,
) -> Vec<&'a FaceRecord> {
    let timestamp = |face: &FaceRecord| -> NaiveDateTime {
        ctx.photos
            .get(&face.photo_id)
            .map(|photo| photo.timestamp)
            .unwrap_or(NaiveDateTime::MIN)
    };

    match mode {
        SortMode::ByTime => faces.sort_by_key(|face| timestamp(face)),
        SortMode::ByCluster => {
            faces.sort_by_key(|face| (face.cluster_id.as_str().to_string(), timestamp(face)));
        }
        SortMode::Random => {
            let mut rng = rand::rngs::StdRng::from_seed(shuffle_seed(ctx.run_id, bucket, mode));
            faces.shuffle(&mut rng);
        }
    }
    faces
}

fn shuffle_seed(run_id: Uuid, bucket: &str, mode: SortMode) -> [u8; 32] {
    let digest = Sha256::digest(format!("{run_id}:{bucket}:{mode}").as_bytes());
    digest.into()
}
