//! Label encoding and linear classifier training.
//!
//! The encoder maps identity strings to dense class indices in sorted
//! distinct-label order. That ordering is a hard compatibility contract:
//! the inference path re-derives the vocabulary by refitting the encoder
//! from the stored raw label array, so any other assignment order would
//! silently decode predictions to the wrong identity.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const EPOCHS: usize = 300;
const LEARNING_RATE: f32 = 0.5;

#[derive(Error, Debug)]
pub enum TrainError {
    #[error("training set has {classes} distinct label(s); at least 2 are required")]
    TrainingSetTooSmall { classes: usize },
    #[error("embeddings/labels length mismatch: {embeddings} embeddings, {labels} labels")]
    LengthMismatch { embeddings: usize, labels: usize },
    #[error("label not in vocabulary: {0}")]
    UnknownLabel(String),
}

/// Deterministic mapping between identity strings and class indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    /// Fit the vocabulary: sorted distinct labels, index = sort position.
    ///
    /// Independent of input order, so retraining over an unchanged dataset
    /// reproduces the same assignment.
    pub fn fit(labels: &[String]) -> Self {
        let mut classes: Vec<String> = labels.to_vec();
        classes.sort();
        classes.dedup();
        Self { classes }
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Class index for a label, if it is in the vocabulary.
    pub fn encode(&self, label: &str) -> Option<usize> {
        self.classes.binary_search_by(|c| c.as_str().cmp(label)).ok()
    }

    /// Identity string for a class index, if in range.
    pub fn decode(&self, index: usize) -> Option<&str> {
        self.classes.get(index).map(String::as_str)
    }

    /// Encode a label sequence, erroring on any label outside the vocabulary.
    pub fn transform(&self, labels: &[String]) -> Result<Vec<usize>, TrainError> {
        labels
            .iter()
            .map(|label| {
                self.encode(label)
                    .ok_or_else(|| TrainError::UnknownLabel(label.clone()))
            })
            .collect()
    }
}

/// Linear multi-class classifier with softmax-calibrated probabilities.
///
/// Trained by deterministic full-batch gradient descent from zero-initialized
/// weights: no RNG, so refitting identical data yields identical weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearClassifier {
    weights: Array2<f32>,
    bias: Array1<f32>,
}

impl LinearClassifier {
    /// Fit over row-major embeddings and encoded targets.
    fn fit(x: ArrayView2<'_, f32>, targets: &[usize], n_classes: usize) -> Self {
        let n = x.nrows();
        let d = x.ncols();

        let mut weights = Array2::<f32>::zeros((n_classes, d));
        let mut bias = Array1::<f32>::zeros(n_classes);

        let mut onehot = Array2::<f32>::zeros((n, n_classes));
        for (i, &t) in targets.iter().enumerate() {
            onehot[[i, t]] = 1.0;
        }

        for _ in 0..EPOCHS {
            let mut probs = x.dot(&weights.t()) + &bias;
            for mut row in probs.rows_mut() {
                softmax_inplace(&mut row);
            }

            let diff = probs - &onehot;
            let grad_w = diff.t().dot(&x) / n as f32;
            let grad_b = diff.sum_axis(Axis(0)) / n as f32;

            weights = weights - grad_w * LEARNING_RATE;
            bias = bias - grad_b * LEARNING_RATE;
        }

        Self { weights, bias }
    }

    pub fn n_classes(&self) -> usize {
        self.weights.nrows()
    }

    pub fn dim(&self) -> usize {
        self.weights.ncols()
    }

    /// Predicted class index for one embedding.
    pub fn predict(&self, values: &[f32]) -> usize {
        let scores = self.scores(values);
        argmax(scores.as_slice().unwrap_or(&[]))
    }

    /// Calibrated class probabilities for one embedding.
    pub fn predict_proba(&self, values: &[f32]) -> Vec<f32> {
        let mut scores = self.scores(values);
        softmax_inplace(&mut scores.view_mut());
        scores.to_vec()
    }

    fn scores(&self, values: &[f32]) -> Array1<f32> {
        self.weights.dot(&ArrayView1::from(values)) + &self.bias
    }

    /// Fraction of rows whose predicted class matches the target.
    fn accuracy(&self, x: ArrayView2<'_, f32>, targets: &[usize]) -> f32 {
        if targets.is_empty() {
            return 0.0;
        }
        let correct = x
            .outer_iter()
            .zip(targets.iter())
            .filter(|(row, t)| self.predict(row.as_slice().unwrap_or(&[])) == **t)
            .count();
        correct as f32 / targets.len() as f32
    }
}

fn softmax_inplace(row: &mut ndarray::ArrayViewMut1<'_, f32>) {
    let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
    row.mapv_inplace(|v| (v - max).exp());
    let sum = row.sum();
    if sum > 0.0 {
        row.mapv_inplace(|v| v / sum);
    }
}

fn argmax(values: &[f32]) -> usize {
    values
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// A fitted classifier, its vocabulary, and the training-set accuracy.
pub struct TrainedModel {
    pub classifier: LinearClassifier,
    pub encoder: LabelEncoder,
    /// Accuracy over the full training set, in [0, 1]. No held-out split.
    pub accuracy: f32,
}

/// Fit the label encoder and classifier over an aligned training set.
pub fn train_classifier(
    embeddings: &Array2<f32>,
    labels: &[String],
) -> Result<TrainedModel, TrainError> {
    if embeddings.nrows() != labels.len() {
        return Err(TrainError::LengthMismatch {
            embeddings: embeddings.nrows(),
            labels: labels.len(),
        });
    }

    let encoder = LabelEncoder::fit(labels);
    if encoder.len() < 2 {
        return Err(TrainError::TrainingSetTooSmall {
            classes: encoder.len(),
        });
    }

    let targets = encoder.transform(labels)?;
    let classifier = LinearClassifier::fit(embeddings.view(), &targets, encoder.len());
    let accuracy = classifier.accuracy(embeddings.view(), &targets);

    tracing::info!(
        samples = labels.len(),
        classes = encoder.len(),
        accuracy,
        "classifier trained"
    );

    Ok(TrainedModel {
        classifier,
        encoder,
        accuracy,
    })
}
