//! Run orchestration: scan → detect → cluster with live progress events.
//!
//! One worker task per run drives the phases to completion and publishes
//! phase/progress snapshots to the run's event channel. Any failure is
//! caught once at the top of the worker, recorded on the run, and turned
//! into a terminal `error` phase plus an `error` event; the worker task
//! itself never crashes.

use anyhow::{Context, Result};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::Settings;
use crate::events::{EventChannel, EVENT_DONE, EVENT_ERROR, EVENT_PHASE, EVENT_PROGRESS};
use crate::models::{ClusterId, FaceRecord, Phase, PhotoRecord, RunContext, RunParameters};
use crate::services::bucket::derive_bucket;
use crate::services::cluster::cluster_embeddings;
use crate::services::exif_reader::CaptureTimeReader;
use crate::services::face_backend::{FaceDetector, FaceEmbedder};
use crate::services::imaging;
use crate::services::photo_scanner::PhotoScanner;
use crate::services::registry::RunRegistry;

type SharedRun = Arc<RwLock<RunContext>>;

/// Drives runs through the scan → detect → cluster phases.
pub struct PipelineOrchestrator {
    settings: Arc<Settings>,
    metadata: Arc<dyn CaptureTimeReader>,
    detector: Arc<dyn FaceDetector>,
    embedder: Arc<dyn FaceEmbedder>,
    scanner: PhotoScanner,
}

impl PipelineOrchestrator {
    pub fn new(
        settings: Arc<Settings>,
        metadata: Arc<dyn CaptureTimeReader>,
        detector: Arc<dyn FaceDetector>,
        embedder: Arc<dyn FaceEmbedder>,
    ) -> Self {
        Self {
            settings,
            metadata,
            detector,
            embedder,
            scanner: PhotoScanner::new(),
        }
    }

    /// Register a run and hand it to a background worker task.
    ///
    /// Backend availability is verified here so a missing detection or
    /// embedding backend fails the request before any phase begins.
    pub async fn start_run(
        self: Arc<Self>,
        registry: &RunRegistry,
        parameters: RunParameters,
    ) -> Result<Uuid, crate::services::face_backend::BackendError> {
        self.detector.ensure_available()?;
        self.embedder.ensure_available()?;

        let run_id = Uuid::new_v4();
        let context = RunContext::new(run_id, parameters);
        let (run, channel) = registry.insert(context, EventChannel::new()).await;

        tokio::spawn(async move {
            tracing::info!(run_id = %run_id, "Pipeline worker started");
            self.execute(run, Some(channel)).await;
        });

        Ok(run_id)
    }

    /// Execute all phases, converting any failure into the terminal error
    /// state and event.
    pub async fn execute(&self, run: SharedRun, channel: Option<Arc<EventChannel>>) {
        let run_id = run.read().await.run_id;
        match self.run_pipeline(&run, channel.as_deref()).await {
            Ok(()) => {
                tracing::info!(run_id = %run_id, "Pipeline completed");
                if let Some(channel) = &channel {
                    channel.publish(EVENT_DONE, json!({ "run_id": run_id }));
                }
            }
            Err(e) => {
                let message = format!("{e:#}");
                tracing::error!(run_id = %run_id, error = %message, "Pipeline failed");
                {
                    let mut ctx = run.write().await;
                    ctx.errors.push(message.clone());
                    ctx.update_phase(Phase::Error, Some(message.clone()));
                }
                if let Some(channel) = &channel {
                    channel.publish(EVENT_ERROR, json!({ "run_id": run_id, "error": message }));
                }
            }
        }
    }

    /// Synchronous batch mode: run the same phases back to back without a
    /// registry or event stream, returning the final context.
    ///
    /// Like `start_run`, a missing backend fails here, before any phase.
    pub async fn run_once(
        &self,
        parameters: RunParameters,
    ) -> Result<RunContext, crate::services::face_backend::BackendError> {
        self.detector.ensure_available()?;
        self.embedder.ensure_available()?;

        let run = Arc::new(RwLock::new(RunContext::new(Uuid::new_v4(), parameters)));
        self.execute(Arc::clone(&run), None).await;
        let ctx = run.read().await;
        Ok(ctx.clone())
    }

    async fn run_pipeline(&self, run: &SharedRun, channel: Option<&EventChannel>) -> Result<()> {
        self.phase_scan(run, channel).await?;
        self.phase_detect(run, channel).await?;
        self.phase_cluster(run, channel).await?;
        self.publish_phase(run, channel, Phase::Done, "Processing complete")
            .await;
        Ok(())
    }

    /// Phase 1: enumerate candidate files, read capture timestamps, create
    /// photo records and thumbnails.
    async fn phase_scan(&self, run: &SharedRun, channel: Option<&EventChannel>) -> Result<()> {
        self.publish_phase(run, channel, Phase::Scanning, "Scanning photos")
            .await;

        let (run_id, parameters) = {
            let ctx = run.read().await;
            (ctx.run_id, ctx.parameters.clone())
        };
        let candidates = self
            .scanner
            .scan(&parameters.folder)
            .with_context(|| format!("scanning {}", parameters.folder.display()))?;

        tracing::info!(
            run_id = %run_id,
            candidates = candidates.len(),
            "Scan discovered candidate files"
        );

        // Candidate count first so consumers can render a determinate
        // progress bar before the first file is touched.
        {
            let mut ctx = run.write().await;
            ctx.stats.total = candidates.len();
            ctx.stats.processed = 0;
        }
        self.publish_progress(run, channel).await;

        for (index, path) in candidates.iter().enumerate() {
            run.write().await.stats.processed = index + 1;

            let timestamp = match self.metadata.read_capture_time(path) {
                Ok(timestamp) => timestamp,
                Err(reason) => {
                    let mut ctx = run.write().await;
                    ctx.skipped.push(crate::models::SkippedPhoto {
                        path: path.display().to_string(),
                        reason: reason.to_string(),
                    });
                    drop(ctx);
                    self.publish_progress(run, channel).await;
                    continue;
                }
            };

            let bucket = derive_bucket(timestamp, parameters.bucket);
            let img = imaging::load_oriented(path)
                .with_context(|| format!("loading {}", path.display()))?;
            let photo_id = Uuid::new_v4();
            let thumb_path = imaging::save_photo_thumbnail(
                &self.settings.static_dir,
                photo_id,
                &img,
                parameters.thumb_edge,
                self.settings.thumb_quality,
            )?;

            let record = PhotoRecord {
                photo_id,
                path: path.clone(),
                timestamp,
                bucket_key: bucket.key,
                bucket_label: bucket.label,
                thumb_path,
                width: img.width(),
                height: img.height(),
            };
            run.write().await.insert_photo(record);
            self.publish_progress(run, channel).await;
        }

        // Detection progress is measured per photo, not per candidate file.
        {
            let mut ctx = run.write().await;
            ctx.stats.total = ctx.photos.len();
        }
        self.publish_progress(run, channel).await;
        Ok(())
    }

    /// Phase 2: detect faces per photo, crop, embed, and index them.
    async fn phase_detect(&self, run: &SharedRun, channel: Option<&EventChannel>) -> Result<()> {
        self.publish_phase(run, channel, Phase::Detecting, "Running face detection")
            .await;

        let parameters = run.read().await.parameters.clone();
        let photo_ids = run.read().await.photo_order.clone();

        for (index, photo_id) in photo_ids.iter().enumerate() {
            let (path, bucket_key) = {
                let ctx = run.read().await;
                let photo = ctx
                    .photos
                    .get(photo_id)
                    .context("photo index out of sync")?;
                (photo.path.clone(), photo.bucket_key.clone())
            };

            let img = imaging::load_oriented(&path)
                .with_context(|| format!("loading {}", path.display()))?;
            let detect_img = if parameters.downscale_detector {
                imaging::ensure_max_edge(img, parameters.max_edge)
            } else {
                img
            };

            let detections = self
                .detector
                .detect(&detect_img)
                .with_context(|| format!("detecting faces in {}", path.display()))?;
            let kept = detections
                .into_iter()
                .filter(|d| d.bbox.2.min(d.bbox.3) >= parameters.min_face_px as i32);

            for detection in kept {
                let crop = imaging::crop_face(&detect_img, detection.bbox, 0.25);
                let face_id = Uuid::new_v4();
                let thumb_path = imaging::save_face_thumbnail(
                    &self.settings.static_dir,
                    face_id,
                    &crop,
                    parameters.thumb_edge,
                    self.settings.thumb_quality,
                )?;
                let embedding = self
                    .embedder
                    .embed(&crop)
                    .with_context(|| format!("embedding face in {}", path.display()))?;

                let face = FaceRecord {
                    face_id,
                    photo_id: *photo_id,
                    bucket_key: bucket_key.clone(),
                    bbox: detection.bbox,
                    score: detection.score,
                    size_px: detection.bbox.2.max(detection.bbox.3).max(0) as u32,
                    embedding_id: Uuid::new_v4(),
                    embedding,
                    cluster_id: ClusterId::Unassigned,
                    accepted: None,
                    thumb_path,
                };
                run.write().await.insert_face(face);
            }

            run.write().await.stats.processed = index + 1;
            self.publish_progress(run, channel).await;
        }

        Ok(())
    }

    /// Phase 3: cluster every face in the run globally and rebuild the
    /// cluster index from scratch.
    async fn phase_cluster(&self, run: &SharedRun, channel: Option<&EventChannel>) -> Result<()> {
        self.publish_phase(run, channel, Phase::Embedding, "Preparing embeddings")
            .await;
        // Embeddings were computed during detection; this transition only
        // marks the boundary for stream consumers.
        self.publish_phase(run, channel, Phase::Clustering, "Clustering faces")
            .await;

        let (face_ids, embeddings): (Vec<Uuid>, Vec<Vec<f32>>) = {
            let ctx = run.read().await;
            ctx.faces_in_order()
                .map(|face| (face.face_id, face.embedding.clone()))
                .unzip()
        };

        let mut ctx = run.write().await;
        ctx.clusters.clear();
        if face_ids.is_empty() {
            return Ok(());
        }

        let outcome = cluster_embeddings(&embeddings, 1);
        tracing::info!(
            run_id = %ctx.run_id,
            faces = face_ids.len(),
            eps = outcome.eps_used,
            "Clustering complete"
        );

        for (face_id, label) in face_ids.iter().zip(outcome.labels) {
            if let Some(face) = ctx.faces.get_mut(face_id) {
                face.cluster_id = label.clone();
            }
            ctx.clusters.entry(label).or_default().push(*face_id);
        }
        Ok(())
    }

    async fn publish_phase(
        &self,
        run: &SharedRun,
        channel: Option<&EventChannel>,
        phase: Phase,
        message: &str,
    ) {
        let status = {
            let mut ctx = run.write().await;
            ctx.update_phase(phase, Some(message.to_string()));
            ctx.as_status()
        };
        if let Some(channel) = channel {
            if let Ok(data) = serde_json::to_value(&status) {
                channel.publish(EVENT_PHASE, data);
            }
        }
    }

    async fn publish_progress(&self, run: &SharedRun, channel: Option<&EventChannel>) {
        if let Some(channel) = channel {
            let status = run.read().await.as_status();
            if let Ok(data) = serde_json::to_value(&status) {
                channel.publish(EVENT_PROGRESS, data);
            }
        }
    }
}
