//! Face detection seam.
//!
//! The pipeline only consumes the [`FaceDetector`] contract; the concrete
//! detector is an opaque capability provider loaded from an external,
//! pre-trained model file.

use crate::types::FaceBox;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use thiserror::Error;

// Fixed detection policy, shared by the training and inference paths.
// Tuning these per call would make stored embeddings incomparable with
// embeddings computed at inference time.
const DETECT_SCALE_FACTOR: f32 = 1.3;
const DETECT_MIN_NEIGHBORS: u32 = 5;
const MIN_FACE_SIZE: u32 = 20;
const SLIDE_WINDOW_STEP: u32 = 4;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("detector model file not found: {0}")]
    ModelNotFound(String),
    #[error("detector model unreadable: {0}")]
    ModelInvalid(String),
}

/// Pluggable face detection backend.
///
/// Returns zero or more bounding boxes in the detector's own scan order;
/// callers that need a single face take the first box, unranked.
pub trait FaceDetector: Send + Sync {
    /// Detect faces in a row-major grayscale buffer of `width` × `height` bytes.
    fn detect(&self, gray: &[u8], width: u32, height: u32) -> Vec<FaceBox>;
}

/// SeetaFace cascade detector via the `rustface` crate.
///
/// The model file is loaded once at construction; detection state is
/// rebuilt from it per call so `detect` stays `&self`.
pub struct CascadeDetector {
    model: rustface::Model,
}

impl CascadeDetector {
    /// Load the cascade model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(
                model_path.display().to_string(),
            ));
        }

        let file = File::open(model_path)
            .map_err(|e| DetectorError::ModelInvalid(format!("{}: {e}", model_path.display())))?;
        let model = rustface::read_model(BufReader::new(file))
            .map_err(|e| DetectorError::ModelInvalid(format!("{}: {e}", model_path.display())))?;

        tracing::info!(path = %model_path.display(), "loaded cascade detector model");

        Ok(Self { model })
    }
}

impl FaceDetector for CascadeDetector {
    fn detect(&self, gray: &[u8], width: u32, height: u32) -> Vec<FaceBox> {
        let mut detector = rustface::create_detector_with_model(self.model.clone());
        detector.set_min_face_size(MIN_FACE_SIZE);
        // The classic cascade policy: a 1.3 pyramid scale step, and the
        // acceptance score standing in for the minimum-neighbor count.
        detector.set_pyramid_scale_factor(1.0 / DETECT_SCALE_FACTOR);
        detector.set_score_thresh(f64::from(DETECT_MIN_NEIGHBORS));
        detector.set_slide_window_step(SLIDE_WINDOW_STEP, SLIDE_WINDOW_STEP);

        let faces = detector.detect(&rustface::ImageData::new(gray, width, height));

        faces
            .iter()
            .map(|face| {
                let bbox = face.bbox();
                FaceBox {
                    x: bbox.x() as f32,
                    y: bbox.y() as f32,
                    width: bbox.width() as f32,
                    height: bbox.height() as f32,
                    confidence: face.score() as f32,
                }
            })
            .collect()
    }
}
