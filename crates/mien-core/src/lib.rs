//! mien-core — face embedding and classification pipeline.
//!
//! Training path: dataset loading → face extraction → FaceNet embeddings →
//! linear classifier → persisted artifact pair. Inference path: the same
//! extractor and embedder, driving the trained classifier over live frames.
//! Both paths share one detect/crop/resize chain; that is the load-bearing
//! consistency requirement of the whole crate.

pub mod classify;
pub mod dataset;
pub mod detect;
pub mod embed;
pub mod extract;
pub mod recognize;
pub mod store;
pub mod types;

pub use classify::{train_classifier, LabelEncoder, LinearClassifier, TrainedModel};
pub use dataset::{load_dataset, TrainingSet};
pub use detect::{CascadeDetector, FaceDetector};
pub use embed::{embed_training_set, FaceEmbedder, FaceNetEmbedder, EMBEDDING_DIM};
pub use extract::FaceExtractor;
pub use recognize::{run_recognition, LoopStats, VideoSource};
pub use store::ModelStore;
pub use types::{Embedding, FaceBox, FaceCrop, Recognition, CROP_SIZE};
