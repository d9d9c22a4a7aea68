//! Persisted model artifacts.
//!
//! A training run produces two co-located files that only make sense as a
//! pair: the gzip-compressed archive of raw embeddings plus their parallel
//! label array, and the serialized fitted classifier. The decode vocabulary
//! is never stored as its own artifact — it is re-derived on load by
//! refitting the label encoder from the stored raw labels, which is only
//! correct because the encoder's sorted-distinct assignment is deterministic.

use crate::classify::{LabelEncoder, LinearClassifier};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::PathBuf;
use thiserror::Error;

/// Well-known artifact file names, relative to the store directory.
pub const EMBEDDINGS_FILE: &str = "face-embeddings.bin.gz";
pub const CLASSIFIER_FILE: &str = "face-classifier.bin";

const STORE_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("model artifact missing: {0}")]
    ArtifactMissing(PathBuf),
    #[error("model artifact corrupt: {0}")]
    ArtifactCorrupt(String),
    #[error("embeddings/labels length mismatch: {embeddings} rows, {labels} labels")]
    LengthMismatch { embeddings: usize, labels: usize },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Raw training data: `labels.len()` × `dim` embedding values, row-major,
/// aligned with `labels`.
#[derive(Serialize, Deserialize)]
struct EmbeddingArchive {
    version: u32,
    dim: usize,
    values: Vec<f32>,
    labels: Vec<String>,
}

#[derive(Serialize, Deserialize)]
struct ClassifierArtifact {
    version: u32,
    trained_at: String,
    classifier: LinearClassifier,
}

/// Reads and writes the artifact pair under one directory.
pub struct ModelStore {
    dir: PathBuf,
}

impl ModelStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn embeddings_path(&self) -> PathBuf {
        self.dir.join(EMBEDDINGS_FILE)
    }

    pub fn classifier_path(&self) -> PathBuf {
        self.dir.join(CLASSIFIER_FILE)
    }

    /// Persist the artifact pair.
    ///
    /// Both files are fully written to temp files before either replaces an
    /// existing artifact, so a failed run never leaves a working pair half
    /// overwritten.
    pub fn save(
        &self,
        embeddings: &Array2<f32>,
        labels: &[String],
        classifier: &LinearClassifier,
    ) -> Result<(), StoreError> {
        if embeddings.nrows() != labels.len() {
            return Err(StoreError::LengthMismatch {
                embeddings: embeddings.nrows(),
                labels: labels.len(),
            });
        }

        std::fs::create_dir_all(&self.dir)?;

        let archive = EmbeddingArchive {
            version: STORE_VERSION,
            dim: embeddings.ncols(),
            values: embeddings.iter().copied().collect(),
            labels: labels.to_vec(),
        };
        let archive_bytes = bincode::serialize(&archive)
            .map_err(|e| StoreError::ArtifactCorrupt(format!("encode archive: {e}")))?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&archive_bytes)?;
        let archive_gz = encoder.finish()?;

        let artifact = ClassifierArtifact {
            version: STORE_VERSION,
            trained_at: chrono::Utc::now().to_rfc3339(),
            classifier: classifier.clone(),
        };
        let classifier_bytes = bincode::serialize(&artifact)
            .map_err(|e| StoreError::ArtifactCorrupt(format!("encode classifier: {e}")))?;

        let archive_tmp = self.write_temp(&archive_gz)?;
        let classifier_tmp = self.write_temp(&classifier_bytes)?;

        archive_tmp
            .persist(self.embeddings_path())
            .map_err(|e| StoreError::Io(e.error))?;
        classifier_tmp
            .persist(self.classifier_path())
            .map_err(|e| StoreError::Io(e.error))?;

        tracing::info!(
            embeddings = labels.len(),
            archive = %self.embeddings_path().display(),
            classifier = %self.classifier_path().display(),
            "model artifacts saved"
        );

        Ok(())
    }

    /// Load the artifact pair, re-deriving the decode vocabulary from the
    /// stored raw label array.
    pub fn load(&self) -> Result<(LinearClassifier, LabelEncoder), StoreError> {
        let archive = self.read_archive()?;
        let encoder = LabelEncoder::fit(&archive.labels);

        let classifier_path = self.classifier_path();
        let bytes = std::fs::read(&classifier_path)?;
        let artifact: ClassifierArtifact = bincode::deserialize(&bytes)
            .map_err(|e| StoreError::ArtifactCorrupt(format!("{}: {e}", classifier_path.display())))?;
        if artifact.version != STORE_VERSION {
            return Err(StoreError::ArtifactCorrupt(format!(
                "{}: unsupported version {}",
                classifier_path.display(),
                artifact.version
            )));
        }

        let classifier = artifact.classifier;
        if classifier.n_classes() != encoder.len() {
            return Err(StoreError::ArtifactCorrupt(format!(
                "classifier has {} classes but stored labels encode {}",
                classifier.n_classes(),
                encoder.len()
            )));
        }
        if classifier.dim() != archive.dim {
            return Err(StoreError::ArtifactCorrupt(format!(
                "classifier expects {}-dim embeddings but archive holds {}-dim",
                classifier.dim(),
                archive.dim
            )));
        }

        tracing::info!(
            classes = encoder.len(),
            trained_at = %artifact.trained_at,
            "model artifacts loaded"
        );

        Ok((classifier, encoder))
    }

    /// The stored raw training set, for debugging and reproduction.
    pub fn load_training_set(&self) -> Result<(Array2<f32>, Vec<String>), StoreError> {
        let archive = self.read_archive()?;
        let matrix = Array2::from_shape_vec((archive.labels.len(), archive.dim), archive.values)
            .map_err(|e| StoreError::ArtifactCorrupt(format!("archive shape: {e}")))?;
        Ok((matrix, archive.labels))
    }

    fn read_archive(&self) -> Result<EmbeddingArchive, StoreError> {
        let embeddings_path = self.embeddings_path();
        let classifier_path = self.classifier_path();

        // The pair is a logical unit: fail fast if either half is absent.
        for path in [&embeddings_path, &classifier_path] {
            if !path.exists() {
                return Err(StoreError::ArtifactMissing(path.clone()));
            }
        }

        let compressed = std::fs::read(&embeddings_path)?;
        let mut bytes = Vec::new();
        GzDecoder::new(compressed.as_slice())
            .read_to_end(&mut bytes)
            .map_err(|e| {
                StoreError::ArtifactCorrupt(format!("{}: {e}", embeddings_path.display()))
            })?;

        let archive: EmbeddingArchive = bincode::deserialize(&bytes)
            .map_err(|e| StoreError::ArtifactCorrupt(format!("{}: {e}", embeddings_path.display())))?;

        if archive.version != STORE_VERSION {
            return Err(StoreError::ArtifactCorrupt(format!(
                "{}: unsupported version {}",
                embeddings_path.display(),
                archive.version
            )));
        }
        if archive.dim == 0 || archive.values.len() != archive.labels.len() * archive.dim {
            return Err(StoreError::ArtifactCorrupt(format!(
                "{}: {} values for {} labels × {} dims",
                embeddings_path.display(),
                archive.values.len(),
                archive.labels.len(),
                archive.dim
            )));
        }

        Ok(archive)
    }

    fn write_temp(&self, bytes: &[u8]) -> Result<tempfile::NamedTempFile, StoreError> {
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(bytes)?;
        Ok(tmp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::train_classifier;
    use ndarray::array;

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn training_data() -> (Array2<f32>, Vec<String>) {
        let x = array![
            [1.0, 0.0, 0.0],
            [0.9, 0.1, 0.0],
            [0.0, 0.0, 1.0],
            [0.1, 0.0, 0.9],
        ];
        (x, labels(&["Bob", "Bob", "Alice", "Alice"]))
    }

    #[test]
    fn save_load_round_trip_reproduces_predictions() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ModelStore::new(tmp.path());
        let (x, y) = training_data();
        let model = train_classifier(&x, &y).unwrap();

        store.save(&x, &y, &model.classifier).unwrap();
        let (loaded, encoder) = store.load().unwrap();

        for (row, label) in x.outer_iter().zip(&y) {
            let values = row.as_slice().unwrap();
            assert_eq!(loaded.predict(values), model.classifier.predict(values));
            assert_eq!(
                encoder.decode(loaded.predict(values)),
                Some(label.as_str())
            );
        }
    }

    #[test]
    fn vocabulary_rederivation_is_stable_across_loads() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ModelStore::new(tmp.path());
        let (x, y) = training_data();
        let model = train_classifier(&x, &y).unwrap();
        store.save(&x, &y, &model.classifier).unwrap();

        let (_, first) = store.load().unwrap();
        let (_, second) = store.load().unwrap();
        assert_eq!(first.classes(), &["Alice", "Bob"]);
        assert_eq!(first, second);
    }

    #[test]
    fn load_without_artifacts_is_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ModelStore::new(tmp.path());
        assert!(matches!(store.load(), Err(StoreError::ArtifactMissing(_))));
    }

    #[test]
    fn load_with_only_one_artifact_is_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ModelStore::new(tmp.path());
        let (x, y) = training_data();
        let model = train_classifier(&x, &y).unwrap();
        store.save(&x, &y, &model.classifier).unwrap();

        std::fs::remove_file(store.classifier_path()).unwrap();
        assert!(matches!(store.load(), Err(StoreError::ArtifactMissing(_))));
    }

    #[test]
    fn corrupt_archive_is_detected() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ModelStore::new(tmp.path());
        let (x, y) = training_data();
        let model = train_classifier(&x, &y).unwrap();
        store.save(&x, &y, &model.classifier).unwrap();

        std::fs::write(store.embeddings_path(), b"definitely not gzip").unwrap();
        assert!(matches!(store.load(), Err(StoreError::ArtifactCorrupt(_))));
    }

    #[test]
    fn truncated_archive_is_detected() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ModelStore::new(tmp.path());
        let (x, y) = training_data();
        let model = train_classifier(&x, &y).unwrap();
        store.save(&x, &y, &model.classifier).unwrap();

        let bytes = std::fs::read(store.embeddings_path()).unwrap();
        std::fs::write(store.embeddings_path(), &bytes[..bytes.len() / 2]).unwrap();
        assert!(matches!(store.load(), Err(StoreError::ArtifactCorrupt(_))));
    }

    #[test]
    fn save_rejects_misaligned_inputs() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ModelStore::new(tmp.path());
        let (x, y) = training_data();
        let model = train_classifier(&x, &y).unwrap();

        let result = store.save(&x, &y[..3].to_vec(), &model.classifier);
        assert!(matches!(result, Err(StoreError::LengthMismatch { .. })));
    }

    #[test]
    fn stored_training_set_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ModelStore::new(tmp.path());
        let (x, y) = training_data();
        let model = train_classifier(&x, &y).unwrap();
        store.save(&x, &y, &model.classifier).unwrap();

        let (stored_x, stored_y) = store.load_training_set().unwrap();
        assert_eq!(stored_x, x);
        assert_eq!(stored_y, y);
    }
}
