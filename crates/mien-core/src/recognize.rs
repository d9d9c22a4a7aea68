//! Live recognition loop.
//!
//! Per frame: detect faces, then for each box run the identical
//! crop→embed→predict→decode chain the training path used. The loop
//! alternates between waiting on the source and processing one frame;
//! cancellation is honored between frames, never mid-frame, so a frame's
//! detections are always processed (or individually skipped) as a unit.

use crate::classify::{LabelEncoder, LinearClassifier};
use crate::embed::FaceEmbedder;
use crate::extract::FaceExtractor;
use crate::types::Recognition;
use image::RgbImage;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("video source: {0}")]
    Capture(String),
}

/// External frame producer. `Ok(None)` signals end of stream.
pub trait VideoSource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>, SourceError>;
}

/// Counters for one recognition run.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoopStats {
    pub frames: u64,
    pub recognized_faces: u64,
    pub skipped_faces: u64,
}

/// Run recognition until the source ends or `cancel` is set.
///
/// Every processed frame invokes `on_frame` with its annotations — an empty
/// slice for frames without detections. A face whose embedding or decode
/// fails is skipped with a warning; the rest of the frame still goes through.
pub fn run_recognition(
    source: &mut dyn VideoSource,
    extractor: &FaceExtractor,
    embedder: &mut dyn FaceEmbedder,
    classifier: &LinearClassifier,
    encoder: &LabelEncoder,
    cancel: &AtomicBool,
    mut on_frame: impl FnMut(&RgbImage, &[Recognition]),
) -> Result<LoopStats, SourceError> {
    let mut stats = LoopStats::default();

    while !cancel.load(Ordering::Relaxed) {
        let Some(frame) = source.next_frame()? else {
            tracing::info!("video source exhausted");
            break;
        };
        stats.frames += 1;

        let faces = extractor.detect(&frame);
        let mut recognitions = Vec::with_capacity(faces.len());

        for face in &faces {
            let crop = extractor.crop_face(&frame, face);

            let embedding = match embedder.embed(std::slice::from_ref(&crop)) {
                Ok(batch) => match batch.into_iter().next() {
                    Some(embedding) => embedding,
                    None => {
                        tracing::warn!("embedder returned empty batch, face skipped");
                        stats.skipped_faces += 1;
                        continue;
                    }
                },
                Err(e) => {
                    tracing::warn!(error = %e, "embedding failed, face skipped");
                    stats.skipped_faces += 1;
                    continue;
                }
            };

            let probs = classifier.predict_proba(&embedding.values);
            let class = classifier.predict(&embedding.values);
            let Some(identity) = encoder.decode(class) else {
                tracing::warn!(class, "predicted class outside vocabulary, face skipped");
                stats.skipped_faces += 1;
                continue;
            };

            recognitions.push(Recognition {
                face: face.clone(),
                identity: identity.to_string(),
                probability: probs.get(class).copied().unwrap_or(0.0),
            });
            stats.recognized_faces += 1;
        }

        if !recognitions.is_empty() {
            tracing::debug!(frame = stats.frames, faces = recognitions.len(), "frame annotated");
        }
        on_frame(&frame, &recognitions);
    }

    if cancel.load(Ordering::Relaxed) {
        tracing::info!("recognition cancelled");
    }

    Ok(stats)
}
