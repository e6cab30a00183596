//! Pixel → real-world scale factor estimation.
//!
//! Each round the operator marks the two ends of a segment whose real length
//! is known (by default one distance unit). The factor is the arithmetic mean
//! of `reference_length / pixel_distance` over all rounds.

use crate::calibrate::homography::HomographyMatrix;
use crate::error::{Error, Result};
use crate::PixelPoint;

/// One marked segment.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScaleSample {
    pub a: PixelPoint,
    pub b: PixelPoint,
    /// Real-world length of the segment, in distance units.
    pub reference_length: f64,
}

impl ScaleSample {
    pub fn pixel_distance(&self) -> f64 {
        self.a.distance_to(&self.b)
    }

    /// Distance units per pixel for this sample.
    pub fn ratio(&self) -> Result<f64> {
        let pixels = self.pixel_distance();
        if pixels == 0.0 {
            return Err(Error::calibration(format!(
                "scale sample points coincide at ({}, {})",
                self.a.x, self.a.y
            )));
        }
        Ok(self.reference_length / pixels)
    }
}

/// Accumulates scale samples and summarises them into one factor.
///
/// The homography is carried to define which view the samples were marked
/// on; samples are measured as raw pixel distances in that view and are not
/// projected.
#[derive(Clone, Debug)]
pub struct ScaleFactorEstimator {
    view_transform: HomographyMatrix,
    reference_length: f64,
    samples: Vec<ScaleSample>,
}

impl ScaleFactorEstimator {
    pub fn new(view_transform: HomographyMatrix, reference_length: f64) -> Result<Self> {
        if !reference_length.is_finite() || reference_length <= 0.0 {
            return Err(Error::calibration(format!(
                "reference length must be positive, got {}",
                reference_length
            )));
        }
        Ok(Self {
            view_transform,
            reference_length,
            samples: Vec::new(),
        })
    }

    pub fn view_transform(&self) -> &HomographyMatrix {
        &self.view_transform
    }

    /// Record a round whose segment has the default reference length.
    pub fn add_sample(&mut self, a: PixelPoint, b: PixelPoint) -> Result<f64> {
        self.add_sample_with_length(a, b, self.reference_length)
    }

    /// Record a round with an explicit real-world length. Returns the round's ratio.
    pub fn add_sample_with_length(
        &mut self,
        a: PixelPoint,
        b: PixelPoint,
        reference_length: f64,
    ) -> Result<f64> {
        if !reference_length.is_finite() || reference_length <= 0.0 {
            return Err(Error::calibration(format!(
                "sample length must be positive, got {}",
                reference_length
            )));
        }
        let sample = ScaleSample {
            a,
            b,
            reference_length,
        };
        let ratio = sample.ratio()?;
        log::debug!(
            "scale sample #{}: {:.2}px for {} units -> {:.6} units/px",
            self.samples.len() + 1,
            sample.pixel_distance(),
            reference_length,
            ratio
        );
        self.samples.push(sample);
        Ok(ratio)
    }

    pub fn samples(&self) -> &[ScaleSample] {
        &self.samples
    }

    /// Mean of the per-round ratios.
    pub fn estimate(&self) -> Result<f64> {
        if self.samples.is_empty() {
            return Err(Error::calibration("no scale samples were collected"));
        }
        let mut sum = 0.0;
        for sample in &self.samples {
            sum += sample.ratio()?;
        }
        Ok(sum / self.samples.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn estimator() -> ScaleFactorEstimator {
        ScaleFactorEstimator::new(HomographyMatrix::identity(), 1.0).expect("valid length")
    }

    #[test]
    fn factor_is_mean_of_ratios() -> Result<()> {
        let mut est = estimator();
        let origin = PixelPoint::new(0, 0);
        let ten_right = PixelPoint::new(10, 0);
        assert_relative_eq!(est.add_sample_with_length(origin, ten_right, 10.0)?, 1.0);
        assert_relative_eq!(est.add_sample_with_length(origin, ten_right, 20.0)?, 2.0);
        assert_relative_eq!(est.add_sample_with_length(origin, ten_right, 30.0)?, 3.0);
        assert_relative_eq!(est.estimate()?, 2.0);
        Ok(())
    }

    #[test]
    fn default_length_applies_to_plain_samples() -> Result<()> {
        let mut est = ScaleFactorEstimator::new(HomographyMatrix::identity(), 6.0)?;
        est.add_sample(PixelPoint::new(0, 0), PixelPoint::new(30, 40))?;
        assert_relative_eq!(est.estimate()?, 6.0 / 50.0);
        Ok(())
    }

    #[test]
    fn coincident_points_fail() {
        let mut est = estimator();
        let p = PixelPoint::new(5, 5);
        assert!(matches!(est.add_sample(p, p), Err(Error::Calibration(_))));
        assert!(est.samples().is_empty());
    }

    #[test]
    fn no_samples_fail() {
        assert!(matches!(estimator().estimate(), Err(Error::Calibration(_))));
    }

    #[test]
    fn non_positive_reference_length_is_rejected() {
        assert!(ScaleFactorEstimator::new(HomographyMatrix::identity(), 0.0).is_err());
        assert!(ScaleFactorEstimator::new(HomographyMatrix::identity(), f64::NAN).is_err());
    }

    #[test]
    fn extreme_coordinates_are_measured_without_overflow() -> Result<()> {
        let mut est = estimator();
        let ratio = est.add_sample(PixelPoint::new(i32::MIN, 0), PixelPoint::new(i32::MAX, 0))?;
        assert_relative_eq!(ratio, 1.0 / u32::MAX as f64);
        assert_relative_eq!(
            PixelPoint::new(i32::MAX, i32::MAX).distance_to(&PixelPoint::new(i32::MIN, i32::MIN)),
            u32::MAX as f64 * std::f64::consts::SQRT_2
        );
        Ok(())
    }
}
