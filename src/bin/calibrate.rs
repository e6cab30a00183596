//! calibrate - derive the camera → top-view homography and scale factor
//!
//! Reads the first frame of a video, camera or still image, collects the
//! reference points (from a saved session with `--points`, otherwise typed
//! at the terminal), and writes the calibration file.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use social_distancing::calibrate::{self, top_view_extent, warp_to_top_view, PromptCollector};
use social_distancing::{
    first_frame, run_calibration, CalibrationRequest, Config, FilePointCollector, Frame,
    PointCollector,
};

#[path = "../ui.rs"]
mod ui;

/// Largest side of the top-view preview image.
const TOP_VIEW_MAX_SIDE: u32 = 4096;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Video file, still image, `csi://`, `gst://<pipeline>` or `stub://<name>`.
    #[arg(short = 'v', long = "video_path")]
    video_path: String,
    /// Number of calibration point pairs.
    #[arg(short = 'n', long = "num_points", default_value_t = 4)]
    num_points: usize,
    /// Number of scale-factor sampling rounds.
    #[arg(long = "num_iterations", visible_alias = "iter", default_value_t = 4)]
    num_iterations: usize,
    /// Saved marking session (JSON). Without it points are read from stdin.
    #[arg(long)]
    points: Option<PathBuf>,
    /// Configuration file (TOML).
    #[arg(long, env = "SOCIAL_DISTANCING_CONFIG")]
    config: Option<PathBuf>,
    /// Write the calibration here instead of `calibration.pkl_file_path`.
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,
    /// Also write the frame warped into the top view (PNG/JPEG by extension).
    #[arg(long)]
    top_view_out: Option<PathBuf>,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let cfg = Config::load(args.config.as_deref()).context("load configuration")?;
    let request = CalibrationRequest {
        num_points: args.num_points,
        iterations: args.num_iterations,
        reference_length: cfg.calibration.reference_length,
    };

    let frame = {
        let _stage = ui.stage("Read first frame");
        first_frame(&args.video_path)
            .with_context(|| format!("error reading the video source '{}'", args.video_path))?
    };
    log::info!("calibrating on a {}x{} frame", frame.width, frame.height);

    let artifact = match &args.points {
        Some(path) => {
            let mut collector = FilePointCollector::open(path)?;
            let _stage = ui.stage("Estimate homography and scale factor");
            calibrate_with(&frame, &mut collector, &request)?
        }
        None => {
            let stdin = std::io::stdin();
            let mut collector = PromptCollector::new(stdin.lock(), std::io::stderr());
            calibrate_with(&frame, &mut collector, &request)?
        }
    };

    let artifact_path = args
        .output
        .clone()
        .unwrap_or_else(|| cfg.calibration.artifact_path.clone());
    {
        let _stage = ui.stage("Write calibration file");
        calibrate::save(&artifact, &artifact_path)?;
    }

    if let Some(path) = &args.top_view_out {
        let _stage = ui.stage("Render top view");
        write_top_view(&frame, artifact.homography(), path)?;
    }

    println!(
        "Calibration completed and written to '{}' (scale factor {:.6}, sha256 {}).",
        artifact_path.display(),
        artifact.scale_factor(),
        artifact.fingerprint()
    );
    Ok(())
}

fn calibrate_with(
    frame: &Frame,
    collector: &mut dyn PointCollector,
    request: &CalibrationRequest,
) -> Result<social_distancing::CalibrationArtifact> {
    Ok(run_calibration(frame, collector, request)?)
}

fn write_top_view(
    frame: &Frame,
    homography: &social_distancing::HomographyMatrix,
    path: &Path,
) -> Result<()> {
    let (width, height) =
        top_view_extent(frame.width, frame.height, homography, TOP_VIEW_MAX_SIDE);
    let warped = warp_to_top_view(frame, homography, width, height)?;
    save_image(&warped, path)
}

#[cfg(feature = "image")]
fn save_image(frame: &Frame, path: &Path) -> Result<()> {
    let img = image::RgbImage::from_raw(frame.width, frame.height, frame.to_rgb())
        .ok_or_else(|| anyhow!("top view buffer does not match its dimensions"))?;
    img.save(path)
        .with_context(|| format!("write top view to {}", path.display()))?;
    log::info!("top view written to {}", path.display());
    Ok(())
}

#[cfg(not(feature = "image"))]
fn save_image(_frame: &Frame, path: &Path) -> Result<()> {
    Err(anyhow!(
        "writing {} requires the ingest-image feature",
        path.display()
    ))
}
