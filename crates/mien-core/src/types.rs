use image::RgbImage;
use serde::{Deserialize, Serialize};

/// Side length of a normalized face crop in pixels.
pub const CROP_SIZE: u32 = 160;

/// Bounding box for a detected face, in source-image pixel coordinates.
///
/// Detectors may return slightly negative offsets for faces touching the
/// image edge; [`FaceBox::clamped`] resolves them before cropping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

impl FaceBox {
    /// Integer crop rectangle: negative origin clamped to zero, extent
    /// clipped to the image bounds, never degenerate.
    pub fn clamped(&self, image_width: u32, image_height: u32) -> (u32, u32, u32, u32) {
        let x = (self.x.max(0.0) as u32).min(image_width.saturating_sub(1));
        let y = (self.y.max(0.0) as u32).min(image_height.saturating_sub(1));
        let w = (self.width.max(1.0) as u32).min(image_width - x);
        let h = (self.height.max(1.0) as u32).min(image_height - y);
        (x, y, w.max(1), h.max(1))
    }
}

/// A normalized face crop: [`CROP_SIZE`]×[`CROP_SIZE`], RGB channel order.
///
/// Produced by the extractor and consumed by the embedder within one
/// training pass or one inference frame; never persisted on its own.
#[derive(Debug, Clone)]
pub struct FaceCrop {
    pub image: RgbImage,
}

impl FaceCrop {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Face embedding vector (512-dimensional for FaceNet-style models).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn dim(&self) -> usize {
        self.values.len()
    }
}

/// One labeled face in a processed frame: where it is and who it is.
#[derive(Debug, Clone)]
pub struct Recognition {
    pub face: FaceBox,
    pub identity: String,
    /// Calibrated probability of the predicted class, in [0, 1].
    pub probability: f32,
}
