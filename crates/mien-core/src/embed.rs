//! FaceNet-style embedding generation via ONNX Runtime.
//!
//! Maps normalized 160×160 RGB face crops to 512-dimensional identity
//! embeddings. The model session is loaded once at startup and reused for
//! every call; the same session serves training and inference so the two
//! paths stay comparable.

use crate::types::{Embedding, FaceCrop, CROP_SIZE};
use ndarray::{Array2, Array4};
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

/// Dimensionality of one face embedding.
pub const EMBEDDING_DIM: usize = 512;

const FACENET_INPUT_SIZE: usize = CROP_SIZE as usize;
const FACENET_MEAN: f32 = 127.5;
const FACENET_STD: f32 = 128.0;

/// Crops per inference batch when embedding a whole training set.
const TRAINING_BATCH: usize = 32;

#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("embedding model file not found: {0}")]
    ModelNotFound(String),
    #[error("embedding batch is empty")]
    EmptyBatch,
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Opaque embedding capability: one fixed-length vector per crop, in input order.
pub trait FaceEmbedder {
    fn embed(&mut self, crops: &[FaceCrop]) -> Result<Vec<Embedding>, EmbedderError>;
}

/// FaceNet embedder backed by an ONNX model.
pub struct FaceNetEmbedder {
    session: Session,
}

impl FaceNetEmbedder {
    /// Load the FaceNet ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, EmbedderError> {
        if !model_path.exists() {
            return Err(EmbedderError::ModelNotFound(
                model_path.display().to_string(),
            ));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded FaceNet model"
        );

        Ok(Self { session })
    }

    /// Preprocess a batch of crops into an NHWC float tensor with fixed
    /// standardization.
    fn preprocess(crops: &[FaceCrop]) -> Array4<f32> {
        let size = FACENET_INPUT_SIZE;
        let mut tensor = Array4::<f32>::zeros((crops.len(), size, size, 3));

        for (n, crop) in crops.iter().enumerate() {
            for y in 0..size {
                for x in 0..size {
                    let channels = crop
                        .image
                        .get_pixel_checked(x as u32, y as u32)
                        .map(|p| p.0)
                        .unwrap_or([0, 0, 0]);
                    for c in 0..3 {
                        tensor[[n, y, x, c]] = (channels[c] as f32 - FACENET_MEAN) / FACENET_STD;
                    }
                }
            }
        }

        tensor
    }
}

impl FaceEmbedder for FaceNetEmbedder {
    fn embed(&mut self, crops: &[FaceCrop]) -> Result<Vec<Embedding>, EmbedderError> {
        if crops.is_empty() {
            return Err(EmbedderError::EmptyBatch);
        }

        let input = Self::preprocess(crops);
        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbedderError::InferenceFailed(format!("embedding batch: {e}")))?;

        let expected = crops.len() * EMBEDDING_DIM;
        if raw.len() != expected {
            return Err(EmbedderError::InferenceFailed(format!(
                "expected {expected} output values ({} × {EMBEDDING_DIM}), got {}",
                crops.len(),
                raw.len()
            )));
        }

        let embeddings = raw
            .chunks_exact(EMBEDDING_DIM)
            .map(|chunk| {
                // L2-normalize so distances are scale-free.
                let norm: f32 = chunk.iter().map(|v| v * v).sum::<f32>().sqrt();
                let values = if norm > 0.0 {
                    chunk.iter().map(|v| v / norm).collect()
                } else {
                    chunk.to_vec()
                };
                Embedding { values }
            })
            .collect();

        Ok(embeddings)
    }
}

/// Embed an aligned (faces, labels) training set in batches.
///
/// A failed batch is skipped with a warning and its labels are dropped so the
/// returned matrix and label list stay aligned. Errors only when no batch at
/// all produced embeddings.
pub fn embed_training_set(
    embedder: &mut dyn FaceEmbedder,
    faces: &[FaceCrop],
    labels: &[String],
) -> Result<(Array2<f32>, Vec<String>), EmbedderError> {
    debug_assert_eq!(faces.len(), labels.len());

    let mut rows: Vec<f32> = Vec::new();
    let mut kept_labels: Vec<String> = Vec::new();
    let mut dim = 0usize;
    let mut last_error = None;

    for (batch, batch_labels) in faces.chunks(TRAINING_BATCH).zip(labels.chunks(TRAINING_BATCH)) {
        match embedder.embed(batch) {
            Ok(embeddings) => {
                for (embedding, label) in embeddings.iter().zip(batch_labels) {
                    if dim == 0 {
                        dim = embedding.dim();
                    }
                    rows.extend_from_slice(&embedding.values);
                    kept_labels.push(label.clone());
                }
                tracing::debug!(embedded = kept_labels.len(), total = faces.len(), "embedding progress");
            }
            Err(e) => {
                tracing::warn!(batch = batch.len(), error = %e, "skipping failed embedding batch");
                last_error = Some(e);
            }
        }
    }

    if kept_labels.is_empty() {
        return Err(last_error.unwrap_or(EmbedderError::EmptyBatch));
    }

    let matrix = Array2::from_shape_vec((kept_labels.len(), dim), rows)
        .map_err(|e| EmbedderError::InferenceFailed(format!("embedding matrix shape: {e}")))?;

    Ok((matrix, kept_labels))
}
