//! Camera-view → top-view homography estimation.
//!
//! Direct Linear Transform over N ≥ 4 correspondences with Hartley
//! normalisation on both point sets. With exactly four points in general
//! position the solution interpolates them exactly; with more points it is
//! the algebraic least-squares fit.

use nalgebra::{DMatrix, Matrix3, SymmetricEigen, Vector3};

use crate::error::{Error, Result};
use crate::{Correspondence, PixelPoint};

/// Minimum correspondences for a well-posed homography.
pub const MIN_CORRESPONDENCES: usize = 4;

const EPS: f64 = 1e-12;

/// A 3×3 projective transform from camera-view pixels to top-view pixels.
///
/// Values are immutable once estimated; recalibrating produces a new matrix.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HomographyMatrix {
    m: Matrix3<f64>,
}

impl HomographyMatrix {
    pub fn identity() -> Self {
        Self {
            m: Matrix3::identity(),
        }
    }

    /// Build from row-major values. Fails when the matrix is singular or not finite.
    pub fn from_rows(rows: [[f64; 3]; 3]) -> Result<Self> {
        let m = Matrix3::new(
            rows[0][0], rows[0][1], rows[0][2],
            rows[1][0], rows[1][1], rows[1][2],
            rows[2][0], rows[2][1], rows[2][2],
        );
        Self::checked(m)
    }

    pub fn rows(&self) -> [[f64; 3]; 3] {
        let m = &self.m;
        [
            [m[(0, 0)], m[(0, 1)], m[(0, 2)]],
            [m[(1, 0)], m[(1, 1)], m[(1, 2)]],
            [m[(2, 0)], m[(2, 1)], m[(2, 2)]],
        ]
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.m
    }

    /// Map a point through the transform. `None` when it lands at infinity.
    pub fn project(&self, p: [f64; 2]) -> Option<[f64; 2]> {
        let v = self.m * Vector3::new(p[0], p[1], 1.0);
        let w = v[2];
        if !w.is_finite() || w.abs() <= EPS {
            return None;
        }
        let out = [v[0] / w, v[1] / w];
        if out[0].is_finite() && out[1].is_finite() {
            Some(out)
        } else {
            None
        }
    }

    pub fn project_point(&self, p: PixelPoint) -> Option<[f64; 2]> {
        self.project(p.as_f64())
    }

    /// Top-view → camera-view transform.
    pub fn inverse(&self) -> Option<Self> {
        self.m.try_inverse().map(|m| Self { m })
    }

    /// Root-mean-square reprojection error over the correspondences, in top-view pixels.
    pub fn reprojection_rms(&self, correspondences: &[Correspondence]) -> f64 {
        if correspondences.is_empty() {
            return 0.0;
        }
        let mut sum = 0.0;
        for c in correspondences {
            let target = c.top_view.as_f64();
            match self.project_point(c.camera) {
                Some(p) => {
                    let dx = p[0] - target[0];
                    let dy = p[1] - target[1];
                    sum += dx * dx + dy * dy;
                }
                None => return f64::INFINITY,
            }
        }
        (sum / correspondences.len() as f64).sqrt()
    }

    fn checked(m: Matrix3<f64>) -> Result<Self> {
        if m.iter().any(|v| !v.is_finite()) {
            return Err(Error::calibration("homography has non-finite entries"));
        }
        let det = m.determinant();
        if !det.is_finite() || det.abs() <= EPS * m.norm().powi(3).max(1.0) {
            return Err(Error::calibration("homography is singular"));
        }
        Ok(Self { m })
    }
}

/// Estimate the homography that maps each camera point onto its top-view point.
///
/// Fails with [`Error::Calibration`] when fewer than four correspondences are
/// given, when any three camera (or top-view) points are collinear, or when
/// the solve produces a singular matrix.
pub fn estimate_homography(correspondences: &[Correspondence]) -> Result<HomographyMatrix> {
    let n = correspondences.len();
    if n < MIN_CORRESPONDENCES {
        return Err(Error::calibration(format!(
            "need at least {} point correspondences, got {}",
            MIN_CORRESPONDENCES, n
        )));
    }

    let src: Vec<PixelPoint> = correspondences.iter().map(|c| c.camera).collect();
    let dst: Vec<PixelPoint> = correspondences.iter().map(|c| c.top_view).collect();
    if let Some((i, j, k)) = find_collinear_triple(&src) {
        return Err(Error::calibration(format!(
            "camera points {}, {} and {} are collinear",
            i, j, k
        )));
    }
    if let Some((i, j, k)) = find_collinear_triple(&dst) {
        return Err(Error::calibration(format!(
            "top-view points {}, {} and {} are collinear",
            i, j, k
        )));
    }

    let (t_src, src_n) = normalize_points(&src);
    let (t_dst, dst_n) = normalize_points(&dst);

    let mut a = DMatrix::<f64>::zeros(2 * n, 9);
    for i in 0..n {
        let (sx, sy) = (src_n[i][0], src_n[i][1]);
        let (dx, dy) = (dst_n[i][0], dst_n[i][1]);

        a[(2 * i, 3)] = -sx;
        a[(2 * i, 4)] = -sy;
        a[(2 * i, 5)] = -1.0;
        a[(2 * i, 6)] = dy * sx;
        a[(2 * i, 7)] = dy * sy;
        a[(2 * i, 8)] = dy;

        a[(2 * i + 1, 0)] = sx;
        a[(2 * i + 1, 1)] = sy;
        a[(2 * i + 1, 2)] = 1.0;
        a[(2 * i + 1, 6)] = -dx * sx;
        a[(2 * i + 1, 7)] = -dx * sy;
        a[(2 * i + 1, 8)] = -dx;
    }

    // Null vector of A = eigenvector of AᵀA with the smallest eigenvalue.
    let ata = a.transpose() * &a;
    let eig = SymmetricEigen::new(ata);
    let mut min_idx = 0;
    for i in 1..9 {
        if eig.eigenvalues[i].abs() < eig.eigenvalues[min_idx].abs() {
            min_idx = i;
        }
    }
    let h = eig.eigenvectors.column(min_idx);
    let h_norm = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]);

    let t_dst_inv = t_dst
        .try_inverse()
        .ok_or_else(|| Error::calibration("top-view normalisation is not invertible"))?;
    let mut m = t_dst_inv * h_norm * t_src;
    let scale = m[(2, 2)];
    if scale.abs() > EPS {
        m /= scale;
    }

    let homography = HomographyMatrix::checked(m)?;
    log::debug!(
        "homography estimated from {} points, reprojection rms {:.4}px",
        n,
        homography.reprojection_rms(correspondences)
    );
    Ok(homography)
}

/// First triple of exactly collinear points (integer cross product is exact).
fn find_collinear_triple(points: &[PixelPoint]) -> Option<(usize, usize, usize)> {
    let n = points.len();
    for i in 0..n {
        for j in (i + 1)..n {
            for k in (j + 1)..n {
                let (a, b, c) = (points[i], points[j], points[k]);
                let abx = b.x as i128 - a.x as i128;
                let aby = b.y as i128 - a.y as i128;
                let acx = c.x as i128 - a.x as i128;
                let acy = c.y as i128 - a.y as i128;
                if abx * acy - aby * acx == 0 {
                    return Some((i, j, k));
                }
            }
        }
    }
    None
}

/// Translate the centroid to the origin and scale to mean distance √2.
fn normalize_points(points: &[PixelPoint]) -> (Matrix3<f64>, Vec<[f64; 2]>) {
    let n = points.len() as f64;
    let cx = points.iter().map(|p| p.x as f64).sum::<f64>() / n;
    let cy = points.iter().map(|p| p.y as f64).sum::<f64>() / n;
    let mean_dist = points
        .iter()
        .map(|p| ((p.x as f64 - cx).powi(2) + (p.y as f64 - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    let s = if mean_dist > EPS {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };
    let t = Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);
    let normalized = points
        .iter()
        .map(|p| [s * (p.x as f64 - cx), s * (p.y as f64 - cy)])
        .collect();
    (t, normalized)
}
