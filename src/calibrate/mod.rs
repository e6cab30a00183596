//! Calibration phase.
//!
//! Collect camera/top-view correspondences, estimate the homography, then
//! collect two-point scale samples and average them into a scale factor.
//! The result is a [`CalibrationArtifact`] that the runtime phase loads.

pub mod artifact;
mod collect;
mod homography;
mod scale;
mod topview;

pub use artifact::{load, save, CalibrationArtifact, ARTIFACT_LEN};
pub use collect::{
    CalibrationPoints, CalibrationView, FilePointCollector, PointCollector, PromptCollector,
    ScaleSegment, ScriptedCollector, ViewKind,
};
pub use homography::{estimate_homography, HomographyMatrix, MIN_CORRESPONDENCES};
pub use scale::{ScaleFactorEstimator, ScaleSample};
pub use topview::{top_view_extent, warp_to_top_view};

use crate::error::{Error, Result};
use crate::{Correspondence, Frame};

/// Points marked per scale round.
pub const SCALE_POINTS_PER_ROUND: usize = 2;

/// Parameters of one calibration run.
#[derive(Clone, Copy, Debug)]
pub struct CalibrationRequest {
    /// Correspondences to mark (≥ 4).
    pub num_points: usize,
    /// Scale-factor sampling rounds (≥ 1).
    pub iterations: usize,
    /// Real-world length of each scale segment unless the collector says otherwise.
    pub reference_length: f64,
}

impl Default for CalibrationRequest {
    fn default() -> Self {
        Self {
            num_points: 4,
            iterations: 4,
            reference_length: 1.0,
        }
    }
}

/// Run the full calibration against `view` using `collector` for all marking.
///
/// The top-view canvas handed to the collector is a black frame of the same
/// size as the camera frame.
pub fn run_calibration<C: PointCollector + ?Sized>(
    view: &Frame,
    collector: &mut C,
    request: &CalibrationRequest,
) -> Result<CalibrationArtifact> {
    if request.iterations == 0 {
        return Err(Error::calibration("scale estimation needs at least one round"));
    }

    let camera_points = collector.collect_points(
        &CalibrationView {
            kind: ViewKind::Camera,
            frame: view,
            round: 0,
        },
        request.num_points,
    )?;
    let canvas = Frame::black(view.width, view.height);
    let top_points = collector.collect_points(
        &CalibrationView {
            kind: ViewKind::TopView,
            frame: &canvas,
            round: 0,
        },
        request.num_points,
    )?;

    let correspondences: Vec<Correspondence> = camera_points
        .into_iter()
        .zip(top_points)
        .map(|(camera, top_view)| Correspondence::new(camera, top_view))
        .collect();
    let homography = estimate_homography(&correspondences)?;
    log::info!(
        "homography from {} correspondences, reprojection rms {:.3}px",
        correspondences.len(),
        homography.reprojection_rms(&correspondences)
    );

    let mut estimator = ScaleFactorEstimator::new(homography, request.reference_length)?;
    for round in 1..=request.iterations {
        let points = collector.collect_points(
            &CalibrationView {
                kind: ViewKind::Scale,
                frame: view,
                round,
            },
            SCALE_POINTS_PER_ROUND,
        )?;
        let length = collector
            .sample_length(round)
            .unwrap_or(request.reference_length);
        estimator.add_sample_with_length(points[0], points[1], length)?;
    }
    let scale_factor = estimator.estimate()?;
    log::info!(
        "scale factor {:.6} units/px from {} rounds",
        scale_factor,
        estimator.samples().len()
    );

    CalibrationArtifact::new(homography, scale_factor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PixelPoint;
    use approx::assert_relative_eq;

    fn p(x: i32, y: i32) -> PixelPoint {
        PixelPoint::new(x, y)
    }

    #[test]
    fn calibration_combines_homography_and_scale() -> Result<()> {
        let frame = Frame::black(640, 480);
        let mut collector = ScriptedCollector::new()
            .with_points(ViewKind::Camera, vec![p(250, 120), p(390, 120), p(600, 470), p(40, 470)])
            .with_points(ViewKind::TopView, vec![p(200, 0), p(400, 0), p(400, 600), p(200, 600)])
            .with_points(ViewKind::Scale, vec![p(0, 0), p(0, 10)])
            .with_points(ViewKind::Scale, vec![p(0, 0), p(0, 20)]);
        let request = CalibrationRequest {
            num_points: 4,
            iterations: 2,
            reference_length: 10.0,
        };
        let artifact = run_calibration(&frame, &mut collector, &request)?;
        assert_relative_eq!(artifact.scale_factor(), (1.0 + 0.5) / 2.0);
        let mapped = artifact
            .homography()
            .project_point(p(600, 470))
            .expect("finite");
        assert_relative_eq!(mapped[0], 400.0, epsilon = 1e-6);
        assert_relative_eq!(mapped[1], 600.0, epsilon = 1e-6);
        Ok(())
    }

    #[test]
    fn zero_iterations_is_refused() {
        let frame = Frame::black(4, 4);
        let request = CalibrationRequest {
            iterations: 0,
            ..CalibrationRequest::default()
        };
        let err = run_calibration(&frame, &mut ScriptedCollector::new(), &request).unwrap_err();
        assert!(matches!(err, Error::Calibration(_)));
    }
}
