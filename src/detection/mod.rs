pub mod annotate;
pub mod postprocess;
pub mod preprocessing;
pub mod yolo;

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::models::Detection;

pub use yolo::YoloDetector;

#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("Failed to load detection model {path:?}: {reason}")]
    ModelLoad { path: PathBuf, reason: String },

    #[error("Confidence threshold must be in (0, 1], got {0}")]
    InvalidThreshold(f32),

    #[error("Failed to read image {path:?}: {reason}")]
    ImageRead { path: PathBuf, reason: String },

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Failed to write annotated image {path:?}: {reason}")]
    Annotate { path: PathBuf, reason: String },
}

/// What one `detect` call hands back.
#[derive(Debug, Clone)]
pub struct DetectionOutput {
    /// Model output order, already filtered by the threshold.
    pub detections: Vec<Detection>,
    /// Copy of the input with every detection drawn on it, same dimensions as the source.
    pub annotated_image: PathBuf,
}

/// Object detector seam used by the inspection pipeline.
///
/// Implementations are shared across concurrent runs behind an `Arc`, so
/// `detect` must be reentrant. An implementation whose inference call is not
/// reentrant has to serialize `detect` itself with a `Mutex` around the model.
pub trait Detector: Send + Sync {
    /// Run the model on `image_path`, keeping detections with
    /// `confidence >= confidence_threshold`, and write the annotated copy into
    /// `annotated_dir` under the source file name.
    fn detect(
        &self,
        image_path: &Path,
        confidence_threshold: f32,
        annotated_dir: &Path,
    ) -> Result<DetectionOutput, DetectionError>;

    /// Human-readable name (used in logs)
    fn name(&self) -> &str;
}

/// Reject thresholds outside `(0, 1]`. NaN is rejected too.
pub fn validate_threshold(confidence_threshold: f32) -> Result<f32, DetectionError> {
    if confidence_threshold > 0.0 && confidence_threshold <= 1.0 {
        Ok(confidence_threshold)
    } else {
        Err(DetectionError::InvalidThreshold(confidence_threshold))
    }
}

/// Where the annotated copy of `image_path` goes inside `annotated_dir`.
/// The encoder is picked from the extension, so a bare name gets `.png`.
pub fn annotated_path_for(image_path: &Path, annotated_dir: &Path) -> PathBuf {
    let file_name = image_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "annotated.png".into());
    let mut path = annotated_dir.join(file_name);
    if path.extension().is_none() {
        path.set_extension("png");
    }
    path
}
