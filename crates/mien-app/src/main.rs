use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod driver;
mod fps;
mod pipeline;
mod view;

use config::AppConfig;
use mien_core::{Gallery, OnnxFaceAnalyzer};
use mien_hw::{Camera, CameraOptions};
use pipeline::FrameProcessor;
use view::FrameRenderer;

#[derive(Parser)]
#[command(name = "mien", about = "Webcam face recognition with live preview")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the live recognition session
    Run(RunArgs),
    /// Load the reference gallery and report what it contains
    Gallery(GalleryArgs),
    /// List V4L2 capture devices
    Devices,
}

#[derive(Args)]
struct RunArgs {
    /// V4L2 device path
    #[arg(long, env = "MIEN_DEVICE", default_value = config::DEFAULT_DEVICE)]
    device: String,
    /// Requested capture width in pixels
    #[arg(long, env = "MIEN_WIDTH", default_value_t = config::DEFAULT_WIDTH)]
    width: u32,
    /// Requested capture height in pixels
    #[arg(long, env = "MIEN_HEIGHT", default_value_t = config::DEFAULT_HEIGHT)]
    height: u32,
    /// Requested capture frame rate
    #[arg(long, env = "MIEN_FPS", default_value_t = config::DEFAULT_FPS)]
    fps: u32,
    /// Preview window title
    #[arg(long, env = "MIEN_WINDOW_TITLE", default_value = config::DEFAULT_WINDOW_TITLE)]
    window_title: String,
    /// Directory with one subdirectory of reference images per person
    #[arg(long, env = "MIEN_GALLERY_DIR", default_value = config::DEFAULT_GALLERY_DIR)]
    gallery_dir: PathBuf,
    /// Directory containing det_10g.onnx and w600k_r50.onnx
    #[arg(long, env = "MIEN_MODEL_DIR", default_value = config::DEFAULT_MODEL_DIR)]
    model_dir: PathBuf,
    /// Maximum L2 embedding distance still accepted as a match
    #[arg(long, env = "MIEN_TOLERANCE", default_value_t = config::DEFAULT_TOLERANCE)]
    tolerance: f32,
    /// Square SCRFD input edge, a multiple of 32
    #[arg(long, env = "MIEN_DETECTOR_INPUT_SIZE", default_value_t = config::DEFAULT_DETECTOR_INPUT_SIZE)]
    detector_input_size: usize,
    /// Run without a preview window
    #[arg(long)]
    headless: bool,
}

#[derive(Args)]
struct GalleryArgs {
    /// Directory with one subdirectory of reference images per person
    #[arg(long, env = "MIEN_GALLERY_DIR", default_value = config::DEFAULT_GALLERY_DIR)]
    gallery_dir: PathBuf,
    /// Directory containing det_10g.onnx and w600k_r50.onnx
    #[arg(long, env = "MIEN_MODEL_DIR", default_value = config::DEFAULT_MODEL_DIR)]
    model_dir: PathBuf,
    /// Square SCRFD input edge, a multiple of 32
    #[arg(long, env = "MIEN_DETECTOR_INPUT_SIZE", default_value_t = config::DEFAULT_DETECTOR_INPUT_SIZE)]
    detector_input_size: usize,
    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
}

#[derive(serde::Serialize)]
struct GallerySummary {
    entries: usize,
    people: Vec<PersonSummary>,
}

#[derive(serde::Serialize)]
struct PersonSummary {
    label: String,
    images: usize,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run_session(args),
        Commands::Gallery(args) => inspect_gallery(args),
        Commands::Devices => {
            list_devices();
            Ok(())
        }
    }
}

fn run_session(args: RunArgs) -> Result<()> {
    let config = AppConfig {
        device: args.device,
        width: args.width,
        height: args.height,
        fps: args.fps,
        window_title: args.window_title,
        gallery_dir: args.gallery_dir,
        model_dir: args.model_dir,
        tolerance: args.tolerance,
        detector_input_size: args.detector_input_size,
        headless: args.headless,
    };
    config.validate()?;

    let mut analyzer = OnnxFaceAnalyzer::load(&config.model_dir, config.detector_input_size)
        .with_context(|| format!("failed to load face models from {}", config.model_dir.display()))?;

    let gallery = Gallery::load(&config.gallery_dir, &mut analyzer);
    if gallery.is_empty() {
        tracing::warn!(
            dir = %config.gallery_dir.display(),
            "gallery is empty, every face will be labeled Unknown"
        );
    }

    let mut processor = FrameProcessor::new(Box::new(analyzer), gallery, config.tolerance);

    let options = CameraOptions {
        width: config.width,
        height: config.height,
        fps: config.fps,
    };
    let mut camera = Camera::open(&config.device, &options)
        .with_context(|| format!("failed to open camera {}", config.device))?;

    let stop = Arc::new(AtomicBool::new(false));
    let handler_stop = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        handler_stop.store(true, Ordering::SeqCst);
    })
    .context("failed to install Ctrl-C handler")?;

    let mut renderer = build_renderer(&config);

    tracing::info!(device = %config.device, "session starting");
    driver::run(&mut camera, &mut processor, renderer.as_mut(), &stop)?;
    Ok(())
}

#[cfg(feature = "window")]
fn build_renderer(config: &AppConfig) -> Box<dyn FrameRenderer> {
    if config.headless {
        return Box::new(view::HeadlessView);
    }
    match view::PreviewWindow::open(&config.window_title) {
        Ok(window) => Box::new(window),
        Err(err) => {
            tracing::warn!(error = %err, "failed to open preview window, running headless");
            Box::new(view::HeadlessView)
        }
    }
}

#[cfg(not(feature = "window"))]
fn build_renderer(config: &AppConfig) -> Box<dyn FrameRenderer> {
    if !config.headless {
        tracing::warn!("built without the window feature, running headless");
    }
    Box::new(view::HeadlessView)
}

fn inspect_gallery(args: GalleryArgs) -> Result<()> {
    let mut analyzer = OnnxFaceAnalyzer::load(&args.model_dir, args.detector_input_size)
        .with_context(|| format!("failed to load face models from {}", args.model_dir.display()))?;
    let gallery = Gallery::load(&args.gallery_dir, &mut analyzer);

    let summary = summarize(&gallery);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{} entries from {} people", summary.entries, summary.people.len());
        for person in &summary.people {
            println!("  {}: {} image(s)", person.label, person.images);
        }
    }
    Ok(())
}

fn summarize(gallery: &Gallery) -> GallerySummary {
    let people = gallery
        .labels()
        .into_iter()
        .map(|label| PersonSummary {
            label: label.to_string(),
            images: gallery
                .entries()
                .iter()
                .filter(|entry| entry.label == label)
                .count(),
        })
        .collect();
    GallerySummary {
        entries: gallery.len(),
        people,
    }
}

fn list_devices() {
    let devices = Camera::list_devices();
    if devices.is_empty() {
        println!("no V4L2 capture devices found");
        return;
    }
    for dev in devices {
        println!("{}  {} ({}, {})", dev.path, dev.name, dev.driver, dev.bus);
    }
}
