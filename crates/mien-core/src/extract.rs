//! Face extraction — detection plus crop normalization.
//!
//! One `FaceExtractor` serves both the training and inference paths. The
//! whole pipeline depends on both paths producing byte-identical crops for
//! the same input, so the detect/clamp/crop/resize chain lives here and
//! nowhere else.

use crate::detect::FaceDetector;
use crate::types::{FaceBox, FaceCrop, CROP_SIZE};
use image::imageops::{self, FilterType};
use image::RgbImage;

/// Detects faces and produces normalized [`FaceCrop`]s.
pub struct FaceExtractor {
    detector: Box<dyn FaceDetector>,
}

impl FaceExtractor {
    pub fn new(detector: Box<dyn FaceDetector>) -> Self {
        Self { detector }
    }

    /// Detect all faces in a color image.
    ///
    /// Detection runs on a grayscale view; the color pixels are untouched
    /// and remain the crop source.
    pub fn detect(&self, image: &RgbImage) -> Vec<FaceBox> {
        let gray = imageops::grayscale(image);
        self.detector.detect(gray.as_raw(), gray.width(), gray.height())
    }

    /// Extract the primary face from an image, or `None` if no face is found.
    ///
    /// With multiple detections the first detector-returned box wins; there
    /// is no size or confidence ranking.
    pub fn extract(&self, image: &RgbImage) -> Option<FaceCrop> {
        let faces = self.detect(image);
        faces.first().map(|face| self.crop_face(image, face))
    }

    /// Crop one detected face from the color image and normalize it to
    /// [`CROP_SIZE`]×[`CROP_SIZE`] RGB.
    pub fn crop_face(&self, image: &RgbImage, face: &FaceBox) -> FaceCrop {
        let (x, y, w, h) = face.clamped(image.width(), image.height());
        let region = imageops::crop_imm(image, x, y, w, h).to_image();
        let resized = imageops::resize(&region, CROP_SIZE, CROP_SIZE, FilterType::Triangle);
        FaceCrop { image: resized }
    }
}
