use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use image::RgbImage;
use mien_core::{
    embed_training_set, load_dataset, run_recognition, train_classifier, CascadeDetector,
    FaceExtractor, FaceNetEmbedder, ModelStore, VideoSource,
};
use mien_core::recognize::SourceError;
use mien_hw::{Camera, CameraStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;

use config::Config;

/// Frames between automatic captures, roughly one second at 30 fps.
const CAPTURE_FRAME_INTERVAL: u32 = 30;

#[derive(Parser)]
#[command(name = "mien", about = "Face recognition pipeline: capture, train, recognize")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture training photos from the camera into the dataset layout
    Capture {
        /// Identity name; photos land in dataset/<name>/
        #[arg(short, long)]
        name: String,
        /// Number of photos to capture
        #[arg(short, long, default_value_t = 30)]
        photos: u32,
    },
    /// Train the classifier from the dataset and persist the model artifacts
    Train {
        /// Dataset root (overrides MIEN_DATASET_DIR)
        #[arg(short, long)]
        dataset: Option<PathBuf>,
    },
    /// Label faces in the live camera stream until Ctrl-C
    Recognize {
        /// V4L2 device path (overrides MIEN_CAMERA_DEVICE)
        #[arg(short, long)]
        device: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env();

    match cli.command {
        Commands::Capture { name, photos } => {
            let cancel = spawn_cancel_on_ctrl_c();
            tokio::task::spawn_blocking(move || run_capture(&config, &name, photos, &cancel))
                .await??;
        }
        Commands::Train { dataset } => {
            if let Some(dataset) = dataset {
                config.dataset_dir = dataset;
            }
            tokio::task::spawn_blocking(move || run_train(&config)).await??;
        }
        Commands::Recognize { device } => {
            if let Some(device) = device {
                config.camera_device = device;
            }
            let cancel = spawn_cancel_on_ctrl_c();
            tokio::task::spawn_blocking(move || run_recognize(&config, &cancel)).await??;
        }
    }

    Ok(())
}

/// Flip a shared flag on Ctrl-C; the blocking loops poll it between frames.
fn spawn_cancel_on_ctrl_c() -> Arc<AtomicBool> {
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("ctrl-c received, stopping after current frame");
            flag.store(true, Ordering::Relaxed);
        }
    });
    cancel
}

fn build_extractor(config: &Config) -> Result<FaceExtractor> {
    let detector = CascadeDetector::load(&config.detector_model)
        .context("loading cascade detector model")?;
    Ok(FaceExtractor::new(Box::new(detector)))
}

/// Headless capture: save every ~30th frame that contains a detected face
/// until the requested photo count is reached.
fn run_capture(config: &Config, name: &str, photos: u32, cancel: &AtomicBool) -> Result<()> {
    let extractor = build_extractor(config)?;

    let person_dir = config.dataset_dir.join(name);
    std::fs::create_dir_all(&person_dir)
        .with_context(|| format!("creating {}", person_dir.display()))?;

    let camera = Camera::open(&config.camera_device).context("opening camera")?;
    let mut stream = camera.stream().context("starting capture stream")?;

    tracing::info!(identity = name, photos, dir = %person_dir.display(), "capture started");

    let mut saved = 0u32;
    let mut frames_since_save = 0u32;

    while saved < photos && !cancel.load(Ordering::Relaxed) {
        let frame = stream.next_frame().context("capturing frame")?;
        let Some(image) = frame.to_image() else {
            tracing::warn!(sequence = frame.sequence, "frame buffer mismatch, skipped");
            continue;
        };

        frames_since_save += 1;
        if frames_since_save < CAPTURE_FRAME_INTERVAL {
            continue;
        }
        if extractor.detect(&image).is_empty() {
            continue;
        }

        let path = person_dir.join(format!("{name}_{}.jpg", saved + 1));
        image
            .save(&path)
            .with_context(|| format!("saving {}", path.display()))?;
        saved += 1;
        frames_since_save = 0;
        tracing::info!(photo = saved, total = photos, path = %path.display(), "photo saved");
    }

    tracing::info!(identity = name, saved, "capture finished");
    Ok(())
}

/// One-shot training run: load dataset → embed → fit → persist artifacts.
fn run_train(config: &Config) -> Result<()> {
    let extractor = build_extractor(config)?;
    let mut embedder =
        FaceNetEmbedder::load(&config.embedder_model).context("loading FaceNet model")?;

    let set = load_dataset(&config.dataset_dir, &extractor).context("loading dataset")?;
    for count in &set.per_identity {
        tracing::info!(
            identity = %count.identity,
            faces = count.valid_faces,
            skipped = count.skipped_images,
            "dataset identity"
        );
    }

    let (matrix, labels) =
        embed_training_set(&mut embedder, &set.faces, &set.labels).context("embedding dataset")?;
    let model = train_classifier(&matrix, &labels).context("training classifier")?;

    tracing::info!(
        accuracy = model.accuracy,
        identities = ?model.encoder.classes(),
        "training complete"
    );

    let store = ModelStore::new(&config.store_dir);
    store
        .save(&matrix, &labels, &model.classifier)
        .context("saving model artifacts")?;

    Ok(())
}

/// Live recognition until Ctrl-C or camera failure.
fn run_recognize(config: &Config, cancel: &AtomicBool) -> Result<()> {
    let store = ModelStore::new(&config.store_dir);
    let (classifier, encoder) = store.load().context("loading model artifacts")?;

    let extractor = build_extractor(config)?;
    let mut embedder =
        FaceNetEmbedder::load(&config.embedder_model).context("loading FaceNet model")?;

    let camera = Camera::open(&config.camera_device).context("opening camera")?;
    let stream = camera.stream().context("starting capture stream")?;
    let mut source = CameraSource(stream);

    let stats = run_recognition(
        &mut source,
        &extractor,
        &mut embedder,
        &classifier,
        &encoder,
        cancel,
        |_, recognitions| {
            for r in recognitions {
                tracing::info!(
                    identity = %r.identity,
                    probability = r.probability,
                    x = r.face.x,
                    y = r.face.y,
                    w = r.face.width,
                    h = r.face.height,
                    "face recognized"
                );
            }
        },
    )
    .context("recognition loop")?;

    tracing::info!(
        frames = stats.frames,
        recognized = stats.recognized_faces,
        skipped = stats.skipped_faces,
        "recognition finished"
    );

    Ok(())
}

/// Bridges the camera stream into the core [`VideoSource`] contract.
struct CameraSource<'a>(CameraStream<'a>);

impl VideoSource for CameraSource<'_> {
    fn next_frame(&mut self) -> Result<Option<RgbImage>, SourceError> {
        let frame = self
            .0
            .next_frame()
            .map_err(|e| SourceError::Capture(e.to_string()))?;
        let image = frame
            .to_image()
            .ok_or_else(|| SourceError::Capture("frame buffer size mismatch".into()))?;
        Ok(Some(image))
    }
}
