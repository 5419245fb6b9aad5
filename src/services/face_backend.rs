//! Face detection and embedding collaborators.
//!
//! The neural backends run out of process: the configured `faceproc` helper
//! takes an image path and prints JSON, the same way the ingest side of this
//! stack wraps its external feature extractors. The core only depends on the
//! two traits, so tests substitute deterministic implementations.

use image::RgbImage;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Command;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    /// Helper binary not found; fatal at run start, before any phase.
    #[error("Face backend `{0}` not found in PATH")]
    BinaryNotFound(String),

    #[error("Face backend execution failed: {0}")]
    Execution(String),

    #[error("Face backend reported failure: {0}")]
    Failed(String),

    #[error("Failed to parse face backend output: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One raw detection in detector input space.
#[derive(Debug, Clone)]
pub struct FaceDetection {
    /// Bounding box (x, y, w, h) in pixels of the detector input image.
    pub bbox: (i32, i32, i32, i32),
    pub score: f32,
    /// Right eye, left eye, nose tip, right mouth corner, left mouth corner.
    pub landmarks: [(f32, f32); 5],
}

/// Face detection collaborator.
///
/// Detections come back sorted by descending confidence.
pub trait FaceDetector: Send + Sync {
    fn detect(&self, image: &RgbImage) -> Result<Vec<FaceDetection>, BackendError>;

    /// Verify the backend can actually serve requests. Called once at run
    /// start so a missing backend fails before any phase begins.
    fn ensure_available(&self) -> Result<(), BackendError> {
        Ok(())
    }
}

/// Face embedding collaborator. Returned vectors are unit-norm per the
/// backend's contract; the core consumes them as-is.
pub trait FaceEmbedder: Send + Sync {
    fn embed(&self, face: &RgbImage) -> Result<Vec<f32>, BackendError>;

    fn ensure_available(&self) -> Result<(), BackendError> {
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct DetectOutput {
    detections: Vec<DetectionRow>,
}

#[derive(Debug, Deserialize)]
struct DetectionRow {
    bbox: (i32, i32, i32, i32),
    score: f32,
    landmarks: [(f32, f32); 5],
}

#[derive(Debug, Deserialize)]
struct EmbedOutput {
    embedding: Vec<f32>,
}

/// External helper process implementing both collaborators.
///
/// Contract: `<binary> detect <image>` prints `{"detections": [{"bbox":
/// [x,y,w,h], "score": s, "landmarks": [[x,y] x5]}]}`; `<binary> embed
/// <image>` prints `{"embedding": [f32...]}` with a unit-norm vector.
#[derive(Debug, Clone)]
pub struct FaceTool {
    binary: String,
}

impl FaceTool {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn probe(&self) -> Result<(), BackendError> {
        match Command::new(&self.binary).arg("--version").output() {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BackendError::BinaryNotFound(self.binary.clone()))
            }
            Err(e) => Err(BackendError::Execution(e.to_string())),
        }
    }

    fn run(&self, mode: &str, image: &RgbImage) -> Result<String, BackendError> {
        let input = self.write_temp_image(image)?;
        let output = Command::new(&self.binary)
            .arg(mode)
            .arg(&input)
            .output()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    BackendError::BinaryNotFound(self.binary.clone())
                } else {
                    BackendError::Execution(e.to_string())
                }
            });
        let _ = std::fs::remove_file(&input);
        let output = output?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BackendError::Failed(format!(
                "exit code {:?}: {stderr}",
                output.status.code()
            )));
        }
        String::from_utf8(output.stdout).map_err(|e| BackendError::Parse(e.to_string()))
    }

    fn write_temp_image(&self, image: &RgbImage) -> Result<PathBuf, BackendError> {
        let path = std::env::temp_dir().join(format!("faceloom_{}.png", uuid::Uuid::new_v4()));
        image
            .save(&path)
            .map_err(|e| BackendError::Execution(e.to_string()))?;
        Ok(path)
    }
}

impl FaceDetector for FaceTool {
    fn detect(&self, image: &RgbImage) -> Result<Vec<FaceDetection>, BackendError> {
        let stdout = self.run("detect", image)?;
        let parsed: DetectOutput =
            serde_json::from_str(&stdout).map_err(|e| BackendError::Parse(e.to_string()))?;
        let mut detections: Vec<FaceDetection> = parsed
            .detections
            .into_iter()
            .map(|row| FaceDetection {
                bbox: row.bbox,
                score: row.score,
                landmarks: row.landmarks,
            })
            .collect();
        detections.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(detections)
    }

    fn ensure_available(&self) -> Result<(), BackendError> {
        self.probe()
    }
}

impl FaceEmbedder for FaceTool {
    fn embed(&self, face: &RgbImage) -> Result<Vec<f32>, BackendError> {
        let stdout = self.run("embed", face)?;
        let parsed: EmbedOutput =
            serde_json::from_str(&stdout).map_err(|e| BackendError::Parse(e.to_string()))?;
        Ok(parsed.embedding)
    }

    fn ensure_available(&self) -> Result<(), BackendError> {
        self.probe()
    }
}

/// Check whether a helper binary looks runnable, without building a tool.
pub fn backend_available(binary: &str) -> bool {
    Command::new(binary).arg("--version").output().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_binary_is_binary_not_found() {
        let tool = FaceTool::new("faceloom-test-no-such-binary");
        match FaceDetector::ensure_available(&tool) {
            Err(BackendError::BinaryNotFound(name)) => {
                assert_eq!(name, "faceloom-test-no-such-binary");
            }
            other => panic!("expected BinaryNotFound, got {other:?}"),
        }
    }

    #[test]
    fn detect_output_parses() {
        let json = r#"{
            "detections": [
                {"bbox": [10, 12, 40, 44], "score": 0.93,
                 "landmarks": [[1,2],[3,4],[5,6],[7,8],[9,10]]}
            ]
        }"#;
        let parsed: DetectOutput = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.detections.len(), 1);
        assert_eq!(parsed.detections[0].bbox, (10, 12, 40, 44));
        assert!((parsed.detections[0].score - 0.93).abs() < 1e-6);
    }

    #[test]
    fn embed_output_parses() {
        let parsed: EmbedOutput =
            serde_json::from_str(r#"{"embedding": [1.0, 0.0, 0.0]}"#).unwrap();
        assert_eq!(parsed.embedding.len(), 3);
    }
}
