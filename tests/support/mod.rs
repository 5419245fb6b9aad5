//! Shared fixtures: temp directories, generated photos, and deterministic
//! detection/embedding collaborators.

use chrono::NaiveDateTime;
use image::{Rgb, RgbImage};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

use faceloom::config::Settings;
use faceloom::models::RunParameters;
use faceloom::services::bucket::BucketGranularity;
use faceloom::services::exif_reader::{CaptureTimeReader, SkipReason};
use faceloom::services::face_backend::{BackendError, FaceDetection, FaceDetector, FaceEmbedder};
use faceloom::services::PipelineOrchestrator;

/// Temp workspace: a photo source folder plus output/static dirs.
pub struct TestEnv {
    /// Held for its lifetime; dropping it deletes the tree.
    _root: TempDir,
    pub photos: PathBuf,
    pub settings: Arc<Settings>,
}

impl TestEnv {
    pub fn new() -> Self {
        let root = TempDir::new().expect("temp dir");
        let photos = root.path().join("photos");
        std::fs::create_dir_all(&photos).expect("photo dir");
        let settings = Settings::with_output_root(root.path());
        settings.ensure_directories().expect("output dirs");
        Self {
            _root: root,
            photos,
            settings: Arc::new(settings),
        }
    }

    pub fn parameters(&self) -> RunParameters {
        RunParameters {
            folder: self.photos.clone(),
            bucket: BucketGranularity::Month,
            max_edge: 1600,
            min_face_px: 48,
            thumb_edge: 64,
            downscale_detector: true,
        }
    }
}

/// Write a solid-color 96x96 JPEG into the photo folder.
pub fn write_photo(dir: &Path, name: &str, rgb: [u8; 3]) -> PathBuf {
    let path = dir.join(name);
    let img = RgbImage::from_pixel(96, 96, Rgb(rgb));
    img.save(&path).expect("write photo");
    path
}

/// Capture-time reader backed by a file-name map; anything absent reads as
/// missing metadata.
pub struct MapCaptureTimeReader {
    times: HashMap<String, NaiveDateTime>,
}

impl MapCaptureTimeReader {
    pub fn new(times: Vec<(&str, NaiveDateTime)>) -> Self {
        Self {
            times: times
                .into_iter()
                .map(|(name, ts)| (name.to_string(), ts))
                .collect(),
        }
    }
}

impl CaptureTimeReader for MapCaptureTimeReader {
    fn read_capture_time(&self, path: &Path) -> Result<NaiveDateTime, SkipReason> {
        path.file_name()
            .and_then(|n| n.to_str())
            .and_then(|name| self.times.get(name))
            .copied()
            .ok_or(SkipReason::MissingExif)
    }
}

/// One fixed 48x48 detection per image.
pub struct OneFaceDetector;

impl FaceDetector for OneFaceDetector {
    fn detect(&self, _image: &RgbImage) -> Result<Vec<FaceDetection>, BackendError> {
        Ok(vec![FaceDetection {
            bbox: (10, 10, 48, 48),
            score: 0.9,
            landmarks: [(0.0, 0.0); 5],
        }])
    }
}

/// Embeds by dominant color: reddish crops map to one axis, everything
/// else to an orthogonal one, so identical photos embed identically.
pub struct ColorEmbedder;

impl FaceEmbedder for ColorEmbedder {
    fn embed(&self, face: &RgbImage) -> Result<Vec<f32>, BackendError> {
        let Rgb([r, _, b]) = *face.get_pixel(face.width() / 2, face.height() / 2);
        if r > b {
            Ok(vec![1.0, 0.0, 0.0])
        } else {
            Ok(vec![0.0, 1.0, 0.0])
        }
    }
}

/// Orchestrator wired with the deterministic collaborators above.
pub fn build_orchestrator(
    env: &TestEnv,
    times: Vec<(&str, NaiveDateTime)>,
) -> PipelineOrchestrator {
    PipelineOrchestrator::new(
        Arc::clone(&env.settings),
        Arc::new(MapCaptureTimeReader::new(times)),
        Arc::new(OneFaceDetector),
        Arc::new(ColorEmbedder),
    )
}
