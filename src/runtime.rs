//! Violation detector runtime.
//!
//! A [`ViolationDetector`] moves Idle → Running → Finished exactly once.
//! While running it reads one frame at a time, asks the detector for
//! people, measures every pair, annotates, and writes the frame. The loop
//! ends at the first of: wall-clock cap, stream exhaustion, stream loss.
//! The source is closed and the sink finished on every exit path.

use std::path::Path;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::calibrate::CalibrationArtifact;
use crate::config::Config;
use crate::detect::PersonDetector;
use crate::error::{Error, Result};
use crate::ingest::FrameSource;
use crate::output::FrameSink;
use crate::render::annotate;
use crate::violation::{compute_violations, DistanceMode, ViolationPair};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectorState {
    Idle,
    Running,
    Finished,
}

/// Why the frame loop stopped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EndReason {
    /// The source reported no more frames.
    StreamExhausted,
    /// The wall-clock cap elapsed.
    TimeLimit,
    /// The source or detector reported the stream unusable.
    StreamLost(String),
}

/// Wall-clock timestamps for one processed frame, seconds since the Unix epoch.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameTiming {
    pub stream_open: f64,
    pub post_open: f64,
    pub pre_read: f64,
    pub post_read: f64,
    pub pre_inference: f64,
    pub post_inference: f64,
}

impl FrameTiming {
    pub fn as_row(&self) -> [f64; 6] {
        [
            self.stream_open,
            self.post_open,
            self.pre_read,
            self.post_read,
            self.pre_inference,
            self.post_inference,
        ]
    }
}

/// Per-frame outcome, handed to the observer.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameReport {
    /// 0-based index of the frame within the run.
    pub index: u64,
    pub detections: usize,
    pub violations: Vec<ViolationPair>,
    /// The detector failed on this frame; it was written unannotated.
    pub skipped: bool,
    pub inference: Duration,
    pub elapsed: Duration,
}

/// Summary of a completed run.
#[derive(Clone, Debug, PartialEq)]
pub struct RunReport {
    pub frames_processed: u64,
    pub frames_skipped: u64,
    pub total_violations: u64,
    pub timings: Vec<FrameTiming>,
    pub end_reason: EndReason,
    pub elapsed: Duration,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RunOptions {
    pub max_duration: Duration,
    pub confidence_threshold: f32,
    pub overlap_threshold: f32,
    /// Pairs strictly closer than this many real-world units violate.
    pub distance_threshold: f64,
    /// Measure in the top view instead of raw camera pixels.
    pub measure_in_top_view: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl RunOptions {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            max_duration: cfg.runtime.max_duration,
            confidence_threshold: cfg.runtime.confidence_threshold,
            overlap_threshold: cfg.runtime.overlap_threshold,
            distance_threshold: cfg.social_distancing.distance_threshold,
            measure_in_top_view: cfg.social_distancing.measure_in_top_view,
        }
    }
}

pub struct ViolationDetector {
    artifact: CalibrationArtifact,
    options: RunOptions,
    mode: DistanceMode,
    state: DetectorState,
}

impl ViolationDetector {
    pub fn new(artifact: CalibrationArtifact, options: RunOptions) -> Self {
        let mode = if options.measure_in_top_view {
            DistanceMode::TopView(*artifact.homography())
        } else {
            DistanceMode::CameraPixels
        };
        Self {
            artifact,
            options,
            mode,
            state: DetectorState::Idle,
        }
    }

    pub fn state(&self) -> DetectorState {
        self.state
    }

    pub fn artifact(&self) -> &CalibrationArtifact {
        &self.artifact
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    pub fn run<S, D, K>(
        &mut self,
        source: &mut S,
        detector: &mut D,
        sink: &mut K,
    ) -> Result<RunReport>
    where
        S: FrameSource + ?Sized,
        D: PersonDetector + ?Sized,
        K: FrameSink + ?Sized,
    {
        self.run_with_observer(source, detector, sink, |_| {})
    }

    /// Run the frame loop, calling `observer` after each frame is written.
    ///
    /// Errors opening the source or warming up the detector, and sink write
    /// failures, are returned after the source is closed and the sink finished.
    pub fn run_with_observer<S, D, K, F>(
        &mut self,
        source: &mut S,
        detector: &mut D,
        sink: &mut K,
        mut observer: F,
    ) -> Result<RunReport>
    where
        S: FrameSource + ?Sized,
        D: PersonDetector + ?Sized,
        K: FrameSink + ?Sized,
        F: FnMut(&FrameReport),
    {
        if self.state != DetectorState::Idle {
            return Err(Error::State(format!(
                "violation detector cannot run from {:?}",
                self.state
            )));
        }
        self.state = DetectorState::Running;

        let started = Instant::now();
        let stream_open = epoch_secs();
        let setup = source.open().and_then(|()| detector.warm_up());
        let post_open = epoch_secs();
        if let Err(err) = setup {
            self.shutdown(source, sink);
            return Err(err);
        }
        log::info!(
            "violation detector running: detector={} threshold={} scale={:.6} mode={} cap={:?}",
            detector.name(),
            self.options.distance_threshold,
            self.artifact.scale_factor(),
            match self.mode {
                DistanceMode::CameraPixels => "camera-pixels",
                DistanceMode::TopView(_) => "top-view",
            },
            self.options.max_duration
        );

        let mut timings = Vec::new();
        let mut frames_skipped = 0u64;
        let mut total_violations = 0u64;
        let mut sink_error = None;

        let end_reason = loop {
            if started.elapsed() >= self.options.max_duration {
                break EndReason::TimeLimit;
            }

            let pre_read = epoch_secs();
            let mut frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break EndReason::StreamExhausted,
                Err(err) => break EndReason::StreamLost(err.to_string()),
            };
            let post_read = epoch_secs();

            let pre_inference = epoch_secs();
            let inference_started = Instant::now();
            let detected = detector.detect(
                &frame,
                self.options.confidence_threshold,
                self.options.overlap_threshold,
            );
            let inference = inference_started.elapsed();
            let post_inference = epoch_secs();

            let index = timings.len() as u64;
            let (detections, skipped) = match detected {
                Ok(detections) => (detections, false),
                Err(Error::Detector(msg)) => {
                    log::warn!("frame {}: detector failed, skipping: {}", index, msg);
                    (Vec::new(), true)
                }
                Err(err) => break EndReason::StreamLost(err.to_string()),
            };

            let analysis = compute_violations(
                &detections,
                self.artifact.scale_factor(),
                self.options.distance_threshold,
                &self.mode,
            );
            if !skipped {
                annotate(&mut frame, &detections, &analysis);
            }
            if let Err(err) = sink.write_frame(&frame) {
                log::error!("frame {}: output write failed: {}", index, err);
                sink_error = Some(err);
                break EndReason::StreamLost("output writer failed".to_string());
            }

            timings.push(FrameTiming {
                stream_open,
                post_open,
                pre_read,
                post_read,
                pre_inference,
                post_inference,
            });
            if skipped {
                frames_skipped += 1;
            }
            total_violations += analysis.violations.len() as u64;
            log::debug!(
                "frame {}: {} detections, {} violations, inference {:.1}ms",
                index,
                detections.len(),
                analysis.violations.len(),
                inference.as_secs_f64() * 1000.0
            );

            observer(&FrameReport {
                index,
                detections: detections.len(),
                violations: analysis.violations,
                skipped,
                inference,
                elapsed: started.elapsed(),
            });
        };

        let finish = self.shutdown(source, sink);
        if let Some(err) = sink_error {
            return Err(err);
        }
        finish?;

        let report = RunReport {
            frames_processed: timings.len() as u64,
            frames_skipped,
            total_violations,
            timings,
            end_reason,
            elapsed: started.elapsed(),
        };
        match &report.end_reason {
            EndReason::StreamLost(reason) => log::error!("stream lost: {}", reason),
            reason => log::info!("run ended: {:?}", reason),
        }
        log::info!(
            "processed {} frames ({} skipped), {} violations in {:.1}s",
            report.frames_processed,
            report.frames_skipped,
            report.total_violations,
            report.elapsed.as_secs_f64()
        );
        Ok(report)
    }

    fn shutdown<S, K>(&mut self, source: &mut S, sink: &mut K) -> Result<()>
    where
        S: FrameSource + ?Sized,
        K: FrameSink + ?Sized,
    {
        source.close();
        let finished = sink.finish();
        self.state = DetectorState::Finished;
        finished
    }
}

/// Write one comma-separated row per frame, no header. Replaces `path`.
pub fn write_timing_log(path: &Path, rows: &[FrameTiming]) -> Result<()> {
    let mut out = String::new();
    for row in rows {
        let cells: Vec<String> = row.as_row().iter().map(|v| v.to_string()).collect();
        out.push_str(&cells.join(","));
        out.push('\n');
    }
    std::fs::write(path, out)?;
    log::info!("timing log: {} rows written to {}", rows.len(), path.display());
    Ok(())
}

fn epoch_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
