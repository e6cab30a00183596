//! Social distancing monitor
//!
//! Estimates physical proximity violations between people seen by a fixed
//! camera.
//!
//! # Phases
//!
//! 1. **Calibration** (`calibrate`): from a handful of user-marked reference
//!    points, derive a camera-view → top-view homography and a
//!    pixel → real-world scale factor. The pair is persisted as a
//!    [`CalibrationArtifact`].
//! 2. **Runtime detection** (`runtime`): for each frame, reduce person
//!    detections to ground-contact points, build the pairwise distance
//!    matrix, flag pairs closer than the configured threshold, annotate the
//!    frame and write it out. The loop is bounded by a wall-clock cap.
//!
//! # Module Structure
//!
//! - `calibrate`: homography, scale factor, artifact I/O, point collection
//! - `violation`: pure per-frame geometry (ground points, distance matrix)
//! - `runtime`: the bounded frame loop and its timing log
//! - `ingest` / `output`: frame sources and sinks
//! - `detect`: person detector contract and backends

use serde::{Deserialize, Serialize};

pub mod calibrate;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod output;
pub mod render;
pub mod runtime;
pub mod violation;

pub use calibrate::{
    estimate_homography, run_calibration, CalibrationArtifact, CalibrationPoints,
    CalibrationRequest, CalibrationView, FilePointCollector, HomographyMatrix, PointCollector,
    ScaleFactorEstimator, ScriptedCollector, ViewKind,
};
pub use config::Config;
pub use detect::{Detection, PersonDetector, ScriptedDetector, StubDetector};
pub use error::{Error, Result};
pub use frame::Frame;
pub use ingest::{first_frame, open_source, FrameSource, SourceOptions, SyntheticSource};
pub use output::{open_sink, output_path_for, FrameSink, NullSink};
pub use runtime::{
    write_timing_log, DetectorState, EndReason, FrameReport, FrameTiming, RunOptions, RunReport,
    ViolationDetector,
};
pub use violation::{
    compute_violations, ground_point, DistanceMatrix, DistanceMode, FrameAnalysis, GroundPoint,
    ViolationPair,
};

/// Integer pixel coordinate in one specific image.
///
/// Points from different images are not interchangeable without an explicit
/// transform (see [`HomographyMatrix::project`]).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelPoint {
    pub x: i32,
    pub y: i32,
}

impl PixelPoint {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance in pixels.
    pub fn distance_to(&self, other: &PixelPoint) -> f64 {
        let dx = self.x as f64 - other.x as f64;
        let dy = self.y as f64 - other.y as f64;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn as_f64(&self) -> [f64; 2] {
        [self.x as f64, self.y as f64]
    }
}

impl From<[i32; 2]> for PixelPoint {
    fn from(p: [i32; 2]) -> Self {
        Self::new(p[0], p[1])
    }
}

impl From<PixelPoint> for [i32; 2] {
    fn from(p: PixelPoint) -> Self {
        [p.x, p.y]
    }
}

/// A camera-view point paired with the top-view point it should map to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Correspondence {
    pub camera: PixelPoint,
    pub top_view: PixelPoint,
}

impl Correspondence {
    pub const fn new(camera: PixelPoint, top_view: PixelPoint) -> Self {
        Self { camera, top_view }
    }
}
