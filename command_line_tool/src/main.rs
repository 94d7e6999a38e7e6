use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use image::{open, DynamicImage, GenericImageView};
use pointstab::{
    CircularFeatureTracker, FrameOutcome, Photo, PixelFormat, RansacAffineMatcher, RansacConfig,
    StabilizationController, StabilizerConfig, TrackerConfig,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Command line arguments structure.
#[derive(Parser, Debug)]
#[command(author, version, about = "Stabilizes an image sequence with point features and an affine motion model.")]
struct Args {
    /// Input frames, in order. A directory stands for all images in it, sorted by name.
    #[arg(required = true)]
    frames: Vec<PathBuf>,

    /// Directory that receives the stabilized frames as `<name>.png`
    #[arg(long)]
    output_dir: PathBuf,

    /// JSON file with `stabilizer`, `tracker` and `ransac` sections. Flags override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Inlier count below which the keyframe is advanced
    #[arg(long)]
    change_threshold: Option<usize>,

    /// Active track count below which the reference frame is reset
    #[arg(long)]
    reset_threshold: Option<usize>,

    /// Drift (pixels) beyond which the reference frame is reset
    #[arg(long)]
    distance_threshold: Option<f64>,

    /// Seed for the motion estimator, for reproducible output
    #[arg(long)]
    seed: Option<u64>,

    /// Reprojection error (pixels) accepted for an inlier
    #[arg(long)]
    inlier_threshold: Option<f64>,
}

/// Everything configurable, as read from `--config`.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct PipelineConfig {
    stabilizer: StabilizerConfig,
    tracker: TrackerConfig,
    ransac: RansacConfig,
}

impl PipelineConfig {
    fn load(args: &Args) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("Could not read config file {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("Could not parse config file {}", path.display()))?
            }
            None => PipelineConfig::default(),
        };

        if let Some(v) = args.change_threshold {
            config.stabilizer.change_threshold = v;
        }
        if let Some(v) = args.reset_threshold {
            config.stabilizer.reset_threshold = v;
        }
        if let Some(v) = args.distance_threshold {
            config.stabilizer.distance_threshold = v;
        }
        if let Some(v) = args.inlier_threshold {
            config.ransac.inlier_threshold = v;
        }
        if args.seed.is_some() {
            config.ransac.seed = args.seed;
        }
        Ok(config)
    }
}

/// Frame counts reported at the end of a run.
#[derive(Debug, Default)]
struct Summary {
    frames: usize,
    stabilized: usize,
    keyframe_changes: usize,
    resets: usize,
}

impl Summary {
    fn record(&mut self, outcome: &FrameOutcome) {
        self.frames += 1;
        match outcome {
            FrameOutcome::Stabilized => self.stabilized += 1,
            FrameOutcome::KeyframeChanged => self.keyframe_changes += 1,
            FrameOutcome::Reset(_) => self.resets += 1,
        }
    }
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    let config = PipelineConfig::load(&args)?;
    debug!(?config, "configuration");

    let frames = collect_frames(&args.frames)?;
    if frames.is_empty() {
        bail!("No input frames found");
    }
    fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("Could not create output directory {}", args.output_dir.display()))?;

    let tracker = CircularFeatureTracker::new(config.tracker)?;
    let matcher = RansacAffineMatcher::new(config.ransac)?;
    let mut stabilizer = StabilizationController::new(tracker, matcher, config.stabilizer)?;

    let mut summary = Summary::default();
    for path in &frames {
        let photo = read_photo(path)?;
        let outcome = stabilizer.process(&photo);
        summary.record(&outcome);
        debug!(frame = %path.display(), ?outcome, inliers = stabilizer.inlier_features().len());

        let stem = path
            .file_stem()
            .with_context(|| format!("Input {} has no file name", path.display()))?;
        let mut file_name = stem.to_os_string();
        file_name.push(".png");
        let output_path = args.output_dir.join(file_name);
        if let Some(output) = stabilizer.stabilized_image() {
            save_photo(output, &output_path)?;
        }
    }

    info!(
        frames = summary.frames,
        stabilized = summary.stabilized,
        keyframe_changes = summary.keyframe_changes,
        resets = summary.resets,
        "Done."
    );
    Ok(())
}

/// Expands directories into their files, sorted by name. Files are kept in the given order.
fn collect_frames(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut frames = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut entries = Vec::new();
            for entry in fs::read_dir(input)
                .with_context(|| format!("Could not read directory {}", input.display()))?
            {
                let path = entry?.path();
                if path.is_file() {
                    entries.push(path);
                }
            }
            entries.sort();
            frames.extend(entries);
        } else {
            frames.push(input.clone());
        }
    }
    Ok(frames)
}

pub fn read_photo(path: &Path) -> Result<Photo> {
    debug!("Reading image file: {}", path.display());
    let img = open(path).with_context(|| format!("Could not load image {}", path.display()))?;
    let (width, height) = img.dimensions();
    let (format, pixel_data) = match img {
        DynamicImage::ImageLuma8(gray) => (PixelFormat::Gray8, gray.into_raw()),
        DynamicImage::ImageRgb8(rgb) => (PixelFormat::Rgb8, rgb.into_raw()),
        other => (PixelFormat::Rgba8, other.to_rgba8().into_raw()),
    };
    Ok(Photo::from_raw(width as usize, height as usize, format, pixel_data)?)
}

pub fn save_photo(photo: &Photo, path: &Path) -> Result<()> {
    debug!("Writing image {}", path.display());
    let (width, height) = (photo.width as u32, photo.height as u32);
    let data = photo.img_data.clone();
    let img = match photo.format {
        PixelFormat::Gray8 => image::GrayImage::from_raw(width, height, data).map(DynamicImage::ImageLuma8),
        PixelFormat::Rgb8 => image::RgbImage::from_raw(width, height, data).map(DynamicImage::ImageRgb8),
        PixelFormat::Rgba8 => image::RgbaImage::from_raw(width, height, data).map(DynamicImage::ImageRgba8),
    }
    .with_context(|| format!("Image buffer does not match {width}x{height}"))?;
    img.save(path)
        .with_context(|| format!("Could not write image {}", path.display()))?;
    Ok(())
}
