use std::path::PathBuf;

/// CLI configuration, loaded from environment variables.
#[derive(Clone)]
pub struct Config {
    /// Path to the cascade detector model file.
    pub detector_model: PathBuf,
    /// Path to the FaceNet ONNX model file.
    pub embedder_model: PathBuf,
    /// Dataset root: one subdirectory per identity.
    pub dataset_dir: PathBuf,
    /// Directory holding the model artifact pair.
    pub store_dir: PathBuf,
    /// V4L2 device path.
    pub camera_device: String,
}

impl Config {
    /// Load configuration from `MIEN_*` environment variables with defaults
    /// relative to the working directory.
    pub fn from_env() -> Self {
        Self {
            detector_model: env_path(
                "MIEN_DETECTOR_MODEL",
                "models/seeta_fd_frontal_v1.0.bin",
            ),
            embedder_model: env_path("MIEN_EMBEDDER_MODEL", "models/facenet512.onnx"),
            dataset_dir: env_path("MIEN_DATASET_DIR", "dataset"),
            store_dir: env_path("MIEN_STORE_DIR", "."),
            camera_device: std::env::var("MIEN_CAMERA_DEVICE")
                .unwrap_or_else(|_| "/dev/video0".to_string()),
        }
    }
}

fn env_path(key: &str, default: &str) -> PathBuf {
    std::env::var(key)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(default))
}
