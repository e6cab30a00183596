//! Per-frame proximity geometry.
//!
//! Pure functions only: detections in, ground points + distance matrix +
//! violation set out. Rendering and I/O live in `runtime`/`render`.

use crate::calibrate::HomographyMatrix;
use crate::detect::Detection;
use crate::PixelPoint;

/// Ground-contact point of one detection, keyed by its index in the frame.
///
/// Indices are only meaningful within the frame they came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GroundPoint {
    pub index: usize,
    pub point: PixelPoint,
}

/// Bottom-centre of the bounding box, truncated to whole pixels.
pub fn ground_point(index: usize, detection: &Detection) -> GroundPoint {
    let x = detection.x + detection.w / 2.0;
    let y = detection.y + detection.h;
    GroundPoint {
        index,
        point: PixelPoint::new(x as i32, y as i32),
    }
}

/// How pixel distances between ground points are measured.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DistanceMode {
    /// Euclidean distance between raw camera pixels.
    CameraPixels,
    /// Project both points into the top view first.
    TopView(HomographyMatrix),
}

/// Square matrix of real-world distances between ground points.
#[derive(Clone, Debug, PartialEq)]
pub struct DistanceMatrix {
    n: usize,
    values: Vec<f64>,
}

impl DistanceMatrix {
    /// Build from ground points. The diagonal is exactly zero and
    /// `get(i, j) == get(j, i)` bit for bit.
    pub fn build(points: &[GroundPoint], scale_factor: f64, mode: &DistanceMode) -> Self {
        let n = points.len();
        let projected: Vec<Option<[f64; 2]>> = points
            .iter()
            .map(|g| match mode {
                DistanceMode::CameraPixels => Some(g.point.as_f64()),
                DistanceMode::TopView(h) => h.project_point(g.point),
            })
            .collect();

        let mut values = vec![0.0; n * n];
        for i in 0..n {
            for j in (i + 1)..n {
                let d = match (projected[i], projected[j]) {
                    (Some(a), Some(b)) => {
                        let dx = a[0] - b[0];
                        let dy = a[1] - b[1];
                        (dx * dx + dy * dy).sqrt() * scale_factor
                    }
                    // A point projected to infinity is never close to anything.
                    _ => f64::INFINITY,
                };
                values[i * n + j] = d;
                values[j * n + i] = d;
            }
        }
        Self { n, values }
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Distance between detections `i` and `j`. Panics when out of range.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        assert!(i < self.n && j < self.n, "index out of range");
        self.values[i * self.n + j]
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.values[i * self.n..(i + 1) * self.n]
    }
}

/// Unordered pair of detection indices closer than the threshold; `a < b`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViolationPair {
    pub a: usize,
    pub b: usize,
}

impl ViolationPair {
    pub fn new(i: usize, j: usize) -> Self {
        if i <= j {
            Self { a: i, b: j }
        } else {
            Self { a: j, b: i }
        }
    }
}

/// Everything computed for one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameAnalysis {
    pub ground_points: Vec<GroundPoint>,
    pub distances: DistanceMatrix,
    pub violations: Vec<ViolationPair>,
}

impl FrameAnalysis {
    /// Number of entries an ordered (i, j)/(j, i) listing would have.
    pub fn ordered_pair_count(&self) -> usize {
        self.violations.len() * 2
    }

    pub fn is_violating(&self, index: usize) -> bool {
        self.violations
            .iter()
            .any(|pair| pair.a == index || pair.b == index)
    }
}

/// Reduce detections to ground points, measure every pair, and flag pairs
/// strictly closer than `threshold` real-world units.
pub fn compute_violations(
    detections: &[Detection],
    scale_factor: f64,
    threshold: f64,
    mode: &DistanceMode,
) -> FrameAnalysis {
    let ground_points: Vec<GroundPoint> = detections
        .iter()
        .enumerate()
        .map(|(i, det)| ground_point(i, det))
        .collect();
    let distances = DistanceMatrix::build(&ground_points, scale_factor, mode);

    let mut violations = Vec::new();
    for i in 0..distances.len() {
        for j in (i + 1)..distances.len() {
            if distances.get(i, j) < threshold {
                violations.push(ViolationPair::new(i, j));
            }
        }
    }

    FrameAnalysis {
        ground_points,
        distances,
        violations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn det(x: f32, y: f32, w: f32, h: f32) -> Detection {
        Detection::new(x, y, w, h, 0.9)
    }

    #[test]
    fn ground_point_is_bottom_centre() {
        let g = ground_point(3, &det(10.0, 20.0, 31.0, 50.0));
        assert_eq!(g.index, 3);
        assert_eq!(g.point, PixelPoint::new(25, 70));
    }

    #[test]
    fn thirty_pixels_at_point_one_is_three_units() {
        // Ground points (50, 100) and (80, 100).
        let dets = [det(40.0, 50.0, 20.0, 50.0), det(70.0, 50.0, 20.0, 50.0)];
        let close = compute_violations(&dets, 0.1, 6.0, &DistanceMode::CameraPixels);
        assert_relative_eq!(close.distances.get(0, 1), 3.0, epsilon = 1e-9);
        assert_eq!(close.violations, vec![ViolationPair::new(0, 1)]);
        assert_eq!(close.ordered_pair_count(), 2);

        let far = compute_violations(&dets, 0.1, 2.0, &DistanceMode::CameraPixels);
        assert!(far.violations.is_empty());
    }

    #[test]
    fn threshold_is_strict() {
        let dets = [det(0.0, 0.0, 0.0, 0.0), det(10.0, 0.0, 0.0, 0.0)];
        let at = compute_violations(&dets, 1.0, 10.0, &DistanceMode::CameraPixels);
        assert!(at.violations.is_empty());
    }

    #[test]
    fn empty_frame_has_empty_matrix() {
        let analysis = compute_violations(&[], 0.1, 6.0, &DistanceMode::CameraPixels);
        assert!(analysis.distances.is_empty());
        assert_eq!(analysis.distances.len(), 0);
        assert!(analysis.violations.is_empty());
        assert!(analysis.ground_points.is_empty());
    }

    #[test]
    fn single_detection_has_zero_diagonal() {
        let analysis =
            compute_violations(&[det(1.0, 1.0, 4.0, 4.0)], 0.5, 6.0, &DistanceMode::CameraPixels);
        assert_eq!(analysis.distances.len(), 1);
        assert_eq!(analysis.distances.get(0, 0), 0.0);
        assert!(analysis.violations.is_empty());
    }

    #[test]
    fn top_view_mode_measures_projected_points() -> crate::Result<()> {
        let stretch =
            HomographyMatrix::from_rows([[2.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]])?;
        let dets = [det(0.0, 0.0, 0.0, 0.0), det(10.0, 0.0, 0.0, 0.0)];
        let raw = compute_violations(&dets, 1.0, 100.0, &DistanceMode::CameraPixels);
        let projected = compute_violations(&dets, 1.0, 100.0, &DistanceMode::TopView(stretch));
        assert_relative_eq!(raw.distances.get(0, 1), 10.0);
        assert_relative_eq!(projected.distances.get(0, 1), 20.0);
        Ok(())
    }

    #[test]
    fn violating_membership() {
        let dets = [
            det(0.0, 0.0, 0.0, 0.0),
            det(1.0, 0.0, 0.0, 0.0),
            det(500.0, 0.0, 0.0, 0.0),
        ];
        let analysis = compute_violations(&dets, 1.0, 5.0, &DistanceMode::CameraPixels);
        assert!(analysis.is_violating(0));
        assert!(analysis.is_violating(1));
        assert!(!analysis.is_violating(2));
    }
}
