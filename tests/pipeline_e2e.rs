//! End-to-end pipeline tests over a temp photo folder.
//!
//! The detection and embedding collaborators are replaced with
//! deterministic implementations keyed off image color, so clustering
//! outcomes are fully predictable.

mod support;

use chrono::{NaiveDate, NaiveDateTime};
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;

use faceloom::models::{ClusterId, Phase, RunParameters};
use faceloom::services::bucket::BucketGranularity;
use faceloom::services::PipelineOrchestrator;
use faceloom::services::RunRegistry;

use support::{build_orchestrator, write_photo, TestEnv};

fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(10, 0, 0)
        .unwrap()
}

/// Five candidate files, two without capture metadata: the run finishes
/// with three photos, a skip list of two, and phase done.
#[tokio::test]
async fn scan_skips_files_without_capture_date() {
    let env = TestEnv::new();
    write_photo(&env.photos, "red1.jpg", [200, 30, 30]);
    write_photo(&env.photos, "red2.jpg", [200, 30, 30]);
    write_photo(&env.photos, "blue.jpg", [30, 30, 200]);
    write_photo(&env.photos, "noexif1.jpg", [200, 30, 30]);
    write_photo(&env.photos, "noexif2.jpg", [30, 30, 200]);

    let times = vec![
        ("red1.jpg", at(2024, 3, 1)),
        ("red2.jpg", at(2024, 3, 2)),
        ("blue.jpg", at(2024, 4, 5)),
    ];
    let orchestrator = build_orchestrator(&env, times);

    let context = orchestrator.run_once(env.parameters()).await.unwrap();

    assert_eq!(context.phase, Phase::Done);
    assert_eq!(context.photos.len(), 3);
    assert_eq!(context.stats.total, 3);
    assert_eq!(context.skipped.len(), 2);
    assert!(context
        .skipped
        .iter()
        .all(|s| s.reason == "missing_exif"));
    assert!(context.errors.is_empty());
    assert!(context.completed_at.is_some());
}

/// Two identical embeddings plus one orthogonal produce exactly two
/// distinct non-noise labels, with the identical pair sharing one.
#[tokio::test]
async fn identical_faces_cluster_together() {
    let env = TestEnv::new();
    write_photo(&env.photos, "red1.jpg", [200, 30, 30]);
    write_photo(&env.photos, "red2.jpg", [200, 30, 30]);
    write_photo(&env.photos, "blue.jpg", [30, 30, 200]);

    let times = vec![
        ("red1.jpg", at(2024, 3, 1)),
        ("red2.jpg", at(2024, 3, 2)),
        ("blue.jpg", at(2024, 4, 5)),
    ];
    let orchestrator = build_orchestrator(&env, times);
    let context = orchestrator.run_once(env.parameters()).await.unwrap();

    assert_eq!(context.faces.len(), 3);
    let labels: Vec<&ClusterId> = context
        .faces_in_order()
        .map(|face| &face.cluster_id)
        .collect();
    assert!(labels.iter().all(|l| !l.is_noise()));

    let by_photo = |name: &str| -> ClusterId {
        context
            .faces_in_order()
            .find(|face| {
                context.photos[&face.photo_id]
                    .path
                    .file_name()
                    .map(|n| n == name)
                    .unwrap_or(false)
            })
            .map(|face| face.cluster_id.clone())
            .unwrap()
    };
    assert_eq!(by_photo("red1.jpg"), by_photo("red2.jpg"));
    assert_ne!(by_photo("red1.jpg"), by_photo("blue.jpg"));

    let non_noise: std::collections::HashSet<&ClusterId> = context
        .clusters
        .keys()
        .filter(|id| !id.is_noise())
        .collect();
    assert_eq!(non_noise.len(), 2);
}

/// Bucket indexes reflect the month granularity, and summaries come back
/// in chronological order.
#[tokio::test]
async fn buckets_are_indexed_and_sorted() {
    let env = TestEnv::new();
    write_photo(&env.photos, "a.jpg", [200, 30, 30]);
    write_photo(&env.photos, "b.jpg", [200, 30, 30]);
    write_photo(&env.photos, "c.jpg", [30, 30, 200]);

    let times = vec![
        ("a.jpg", at(2024, 4, 1)),
        ("b.jpg", at(2024, 3, 2)),
        ("c.jpg", at(2023, 12, 5)),
    ];
    let orchestrator = build_orchestrator(&env, times);
    let context = orchestrator.run_once(env.parameters()).await.unwrap();

    let summaries = context.bucket_summaries();
    let keys: Vec<&str> = summaries.iter().map(|s| s.key.as_str()).collect();
    assert_eq!(keys, vec!["2023-12", "2024-03", "2024-04"]);
    assert!(summaries.iter().all(|s| s.photo_count == 1));
    assert!(summaries.iter().all(|s| s.face_count == 1));
    assert_eq!(context.bucket_labels["2024-03"], "March 2024");
}

/// An empty folder completes with zero photos and an empty cluster index.
#[tokio::test]
async fn empty_folder_completes_cleanly() {
    let env = TestEnv::new();
    let orchestrator = build_orchestrator(&env, Vec::new());
    let context = orchestrator.run_once(env.parameters()).await.unwrap();

    assert_eq!(context.phase, Phase::Done);
    assert_eq!(context.stats.total, 0);
    assert!(context.faces.is_empty());
    assert!(context.clusters.is_empty());
}

/// A nonexistent folder fails the pipeline: error phase, recorded error,
/// no crash.
#[tokio::test]
async fn missing_folder_transitions_to_error() {
    let env = TestEnv::new();
    let orchestrator = build_orchestrator(&env, Vec::new());
    let parameters = RunParameters {
        folder: PathBuf::from("/nonexistent/faceloom/folder"),
        bucket: BucketGranularity::Month,
        max_edge: 1600,
        min_face_px: 48,
        thumb_edge: 64,
        downscale_detector: true,
    };
    let context = orchestrator.run_once(parameters).await.unwrap();

    assert_eq!(context.phase, Phase::Error);
    assert_eq!(context.errors.len(), 1);
}

/// Streaming mode: phase events arrive in pipeline order and the stream
/// terminates on the `done` event.
#[tokio::test]
async fn live_stream_delivers_phases_then_done() {
    let env = TestEnv::new();
    write_photo(&env.photos, "red1.jpg", [200, 30, 30]);
    let times = vec![("red1.jpg", at(2024, 3, 1))];
    let orchestrator: Arc<PipelineOrchestrator> = Arc::new(build_orchestrator(&env, times));

    let registry = Arc::new(RunRegistry::new());
    let run_id = Arc::clone(&orchestrator)
        .start_run(&registry, env.parameters())
        .await
        .unwrap();

    let channel = registry.channel(run_id).await.unwrap();
    let frames: Vec<String> = channel.stream().collect().await;

    assert!(frames.len() >= 2);
    let phase_frames: Vec<&String> = frames
        .iter()
        .filter(|f| f.starts_with("event: phase\n"))
        .collect();
    let phases_seen: Vec<bool> = ["scanning", "detecting", "embedding", "clustering", "done"]
        .iter()
        .map(|phase| {
            phase_frames
                .iter()
                .any(|f| f.contains(&format!("\"phase\":\"{phase}\"")))
        })
        .collect();
    assert!(
        phases_seen.iter().all(|seen| *seen),
        "missing phase events: {phase_frames:?}"
    );

    let last = frames.last().unwrap();
    assert!(last.starts_with("event: done\n"));
    assert!(last.contains(&run_id.to_string()));

    // The registry still serves the terminal snapshot afterwards.
    let run = registry.get(run_id).await.unwrap();
    assert_eq!(run.read().await.phase, Phase::Done);
}
