//! Dataset loading — one directory per identity, images inside.
//!
//! Layout on disk: `dataset/<identity>/<any-name>.{jpg,jpeg,png}`. Images
//! that fail to decode or contain no detectable face are skipped and
//! counted; an identity with zero usable faces is excluded without aborting
//! the rest of the load.

use crate::extract::FaceExtractor;
use crate::types::FaceCrop;
use std::path::{Path, PathBuf};
use thiserror::Error;

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("dataset directory not found: {0}")]
    DatasetMissing(PathBuf),
    #[error("dataset directory has no identity subdirectories: {0}")]
    EmptyDataset(PathBuf),
    #[error("no identity in {0} yielded a single valid face")]
    NoValidFaces(PathBuf),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-identity load diagnostics.
#[derive(Debug, Clone)]
pub struct IdentityCount {
    pub identity: String,
    pub valid_faces: usize,
    pub skipped_images: usize,
}

/// Aligned faces and labels loaded from a dataset directory.
///
/// Invariant: `faces.len() == labels.len()`, and each identity with at least
/// one valid face appears in `labels` once per valid face.
pub struct TrainingSet {
    pub faces: Vec<FaceCrop>,
    pub labels: Vec<String>,
    pub per_identity: Vec<IdentityCount>,
}

/// Walk `root` and extract one normalized face crop per usable image.
///
/// Identity directories are visited in sorted order so repeated loads of an
/// unchanged dataset produce the same sample order.
pub fn load_dataset(root: &Path, extractor: &FaceExtractor) -> Result<TrainingSet, DatasetError> {
    if !root.exists() {
        return Err(DatasetError::DatasetMissing(root.to_path_buf()));
    }

    let mut identity_dirs: Vec<PathBuf> = std::fs::read_dir(root)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    identity_dirs.sort();

    if identity_dirs.is_empty() {
        return Err(DatasetError::EmptyDataset(root.to_path_buf()));
    }

    let mut faces = Vec::new();
    let mut labels = Vec::new();
    let mut per_identity = Vec::new();

    for dir in identity_dirs {
        let Some(identity) = dir.file_name().and_then(|n| n.to_str()).map(str::to_owned) else {
            continue;
        };

        let (identity_faces, skipped) = load_identity(&dir, extractor)?;
        let valid = identity_faces.len();

        if valid == 0 {
            tracing::warn!(identity = %identity, skipped, "no valid faces, identity excluded");
        } else {
            tracing::info!(identity = %identity, faces = valid, skipped, "identity loaded");
            labels.extend(std::iter::repeat(identity.clone()).take(valid));
            faces.extend(identity_faces);
        }

        per_identity.push(IdentityCount {
            identity,
            valid_faces: valid,
            skipped_images: skipped,
        });
    }

    if faces.is_empty() {
        return Err(DatasetError::NoValidFaces(root.to_path_buf()));
    }

    tracing::info!(
        faces = faces.len(),
        identities = per_identity.iter().filter(|c| c.valid_faces > 0).count(),
        "dataset loaded"
    );

    Ok(TrainingSet {
        faces,
        labels,
        per_identity,
    })
}

/// Load all usable face crops from one identity directory.
fn load_identity(
    dir: &Path,
    extractor: &FaceExtractor,
) -> Result<(Vec<FaceCrop>, usize), DatasetError> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| has_image_extension(path))
        .collect();
    files.sort();

    let mut faces = Vec::new();
    let mut skipped = 0usize;

    for path in files {
        let image = match image::open(&path) {
            Ok(img) => img.to_rgb8(),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "unreadable image skipped");
                skipped += 1;
                continue;
            }
        };

        match extractor.extract(&image) {
            Some(crop) => faces.push(crop),
            None => {
                tracing::debug!(path = %path.display(), "no face detected, image skipped");
                skipped += 1;
            }
        }
    }

    Ok((faces, skipped))
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.iter().any(|known| *known == ext)
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::FaceDetector;
    use crate::types::FaceBox;
    use image::RgbImage;

    /// Detector stub: "sees" a face only in bright images.
    struct BrightnessDetector;

    impl FaceDetector for BrightnessDetector {
        fn detect(&self, gray: &[u8], width: u32, height: u32) -> Vec<FaceBox> {
            let mean = gray.iter().map(|&p| p as u32).sum::<u32>() / gray.len().max(1) as u32;
            if mean > 100 {
                vec![FaceBox {
                    x: 0.0,
                    y: 0.0,
                    width: width as f32,
                    height: height as f32,
                    confidence: 1.0,
                }]
            } else {
                Vec::new()
            }
        }
    }

    fn extractor() -> FaceExtractor {
        FaceExtractor::new(Box::new(BrightnessDetector))
    }

    fn write_image(dir: &Path, name: &str, level: u8) {
        let img = RgbImage::from_pixel(32, 32, image::Rgb([level, level, level]));
        img.save(dir.join(name)).unwrap();
    }

    #[test]
    fn missing_root_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("nope");
        let result = load_dataset(&missing, &extractor());
        assert!(matches!(result, Err(DatasetError::DatasetMissing(_))));
    }

    #[test]
    fn empty_root_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let result = load_dataset(tmp.path(), &extractor());
        assert!(matches!(result, Err(DatasetError::EmptyDataset(_))));
    }

    #[test]
    fn faces_and_labels_stay_aligned() {
        let tmp = tempfile::tempdir().unwrap();
        let alice = tmp.path().join("alice");
        let bob = tmp.path().join("bob");
        std::fs::create_dir(&alice).unwrap();
        std::fs::create_dir(&bob).unwrap();
        write_image(&alice, "a1.png", 200);
        write_image(&alice, "a2.png", 210);
        write_image(&bob, "b1.png", 180);

        let set = load_dataset(tmp.path(), &extractor()).unwrap();
        assert_eq!(set.faces.len(), set.labels.len());
        assert_eq!(set.labels, vec!["alice", "alice", "bob"]);
    }

    #[test]
    fn faceless_identity_is_excluded_not_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let alice = tmp.path().join("alice");
        let ghost = tmp.path().join("ghost");
        std::fs::create_dir(&alice).unwrap();
        std::fs::create_dir(&ghost).unwrap();
        write_image(&alice, "a1.png", 200);
        write_image(&ghost, "g1.png", 10); // too dark, no "face"

        let set = load_dataset(tmp.path(), &extractor()).unwrap();
        assert_eq!(set.labels, vec!["alice"]);
        let ghost_count = set
            .per_identity
            .iter()
            .find(|c| c.identity == "ghost")
            .unwrap();
        assert_eq!(ghost_count.valid_faces, 0);
        assert_eq!(ghost_count.skipped_images, 1);
    }

    #[test]
    fn all_faceless_fails_with_no_valid_faces() {
        let tmp = tempfile::tempdir().unwrap();
        let ghost = tmp.path().join("ghost");
        std::fs::create_dir(&ghost).unwrap();
        write_image(&ghost, "g1.png", 10);

        let result = load_dataset(tmp.path(), &extractor());
        assert!(matches!(result, Err(DatasetError::NoValidFaces(_))));
    }

    #[test]
    fn non_image_files_are_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        let alice = tmp.path().join("alice");
        std::fs::create_dir(&alice).unwrap();
        write_image(&alice, "a1.png", 200);
        write_image(&alice, "A2.PNG", 200); // case-insensitive extension
        std::fs::write(alice.join("notes.txt"), b"not an image").unwrap();

        let set = load_dataset(tmp.path(), &extractor()).unwrap();
        assert_eq!(set.labels.len(), 2);
        let count = &set.per_identity[0];
        assert_eq!(count.skipped_images, 0);
    }

    #[test]
    fn undecodable_image_is_counted_as_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let alice = tmp.path().join("alice");
        std::fs::create_dir(&alice).unwrap();
        write_image(&alice, "a1.png", 200);
        std::fs::write(alice.join("corrupt.jpg"), b"not really a jpeg").unwrap();

        let set = load_dataset(tmp.path(), &extractor()).unwrap();
        assert_eq!(set.labels.len(), 1);
        assert_eq!(set.per_identity[0].skipped_images, 1);
    }
}
