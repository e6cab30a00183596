//! violation_detector - flag people closer than the distancing threshold
//!
//! Loads the calibration, runs the detector over the video for at most the
//! configured duration, writes `<video>_output.avi` with boxes and violation
//! lines, and writes the per-frame timing log.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

use social_distancing::calibrate;
use social_distancing::detect::build_detector;
use social_distancing::{
    open_sink, open_source, output_path_for, write_timing_log, Config, EndReason, RunOptions,
    ViolationDetector,
};

#[path = "../ui.rs"]
mod ui;
#[path = "../progress.rs"]
mod progress;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Video file, `csi://`, `gst://<pipeline>` or `stub://<name>`.
    #[arg(short = 'v', long = "video_path")]
    video_path: String,
    /// Calibration file; overrides `calibration.pkl_file_path`.
    #[arg(short = 'c', long = "calibration_file_path")]
    calibration_file_path: Option<PathBuf>,
    /// Configuration file (TOML).
    #[arg(long, env = "SOCIAL_DISTANCING_CONFIG")]
    config: Option<PathBuf>,
    /// Annotated video path (default: `<video stem>_output.avi`).
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,
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
    let artifact_path = args
        .calibration_file_path
        .clone()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| cfg.calibration.artifact_path.clone());

    let artifact = {
        let _stage = ui.stage("Load calibration");
        calibrate::load(&artifact_path)?
    };
    log::info!(
        "calibration {}: scale factor {:.6}, sha256 {}",
        artifact_path.display(),
        artifact.scale_factor(),
        artifact.fingerprint()
    );

    let mut detector = {
        let _stage = ui.stage("Load detector");
        build_detector(&cfg.detector)?
    };
    let mut source = {
        let _stage = ui.stage("Open video");
        open_source(&args.video_path)
            .with_context(|| format!("invalid video path '{}'", args.video_path))?
    };
    let output_path = args
        .output
        .clone()
        .unwrap_or_else(|| output_path_for(&args.video_path));
    let mut sink = open_sink(&output_path, source.fps())
        .with_context(|| format!("open output video '{}'", output_path.display()))?;

    let options = RunOptions::from_config(&cfg);
    let mut runner = ViolationDetector::new(artifact, options);
    let mut progress = ui.run_progress(options.max_duration);
    let report = runner
        .run_with_observer(&mut source, &mut detector, &mut sink, |frame| {
            progress.frame(frame.detections, frame.violations.len(), frame.elapsed)
        })
        .with_context(|| format!("processing '{}'", args.video_path))?;
    progress.finish(&format!(
        "{} frames, {} violations ({:?})",
        report.frames_processed, report.total_violations, report.end_reason
    ));

    write_timing_log(&cfg.runtime.timing_log_path, &report.timings)?;
    if sink.frames_written() > 0 && output_path.is_file() {
        println!("Annotated video written to '{}'.", output_path.display());
    }

    match report.end_reason {
        EndReason::StreamLost(reason) if report.frames_processed == 0 => {
            Err(anyhow!("error reading the video '{}': {}", args.video_path, reason))
        }
        EndReason::StreamLost(reason) => {
            log::warn!(
                "stream lost after {} frames: {}",
                report.frames_processed,
                reason
            );
            Ok(())
        }
        EndReason::StreamExhausted | EndReason::TimeLimit => Ok(()),
    }
}
