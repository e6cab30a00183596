//! Point-collection capability.
//!
//! Marking points is an input-device concern (mouse clicks on a preview
//! window, a touch screen, a saved session). The estimators only ever see the
//! resulting points, so collection sits behind [`PointCollector`].

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::io::{BufRead, Write};
use std::path::Path;

use crate::error::{Error, Result};
use crate::PixelPoint;

/// Which image the operator is being asked to mark.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewKind {
    /// The raw camera frame.
    Camera,
    /// The synthetic bird's-eye canvas.
    TopView,
    /// The view used for two-point scale samples.
    Scale,
}

/// The image presented for marking.
#[derive(Clone, Copy, Debug)]
pub struct CalibrationView<'a> {
    pub kind: ViewKind,
    pub frame: &'a crate::Frame,
    /// 1-based round number for scale samples, 0 otherwise.
    pub round: usize,
}

/// Supplies marked points for a view.
pub trait PointCollector {
    /// Return exactly `n` points marked on `view`.
    fn collect_points(&mut self, view: &CalibrationView<'_>, n: usize) -> Result<Vec<PixelPoint>>;

    /// Real-world length of the segment marked in scale round `round`, when
    /// the collector knows it. `None` means "use the configured default".
    fn sample_length(&mut self, _round: usize) -> Option<f64> {
        None
    }
}

/// Replays pre-recorded point lists per view kind, in order.
#[derive(Clone, Debug, Default)]
pub struct ScriptedCollector {
    camera: VecDeque<Vec<PixelPoint>>,
    top_view: VecDeque<Vec<PixelPoint>>,
    scale: VecDeque<Vec<PixelPoint>>,
}

impl ScriptedCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_points(mut self, kind: ViewKind, points: Vec<PixelPoint>) -> Self {
        self.queue_mut(kind).push_back(points);
        self
    }

    fn queue_mut(&mut self, kind: ViewKind) -> &mut VecDeque<Vec<PixelPoint>> {
        match kind {
            ViewKind::Camera => &mut self.camera,
            ViewKind::TopView => &mut self.top_view,
            ViewKind::Scale => &mut self.scale,
        }
    }
}

impl PointCollector for ScriptedCollector {
    fn collect_points(&mut self, view: &CalibrationView<'_>, n: usize) -> Result<Vec<PixelPoint>> {
        let points = self.queue_mut(view.kind).pop_front().ok_or_else(|| {
            Error::calibration(format!("no scripted points left for {:?} view", view.kind))
        })?;
        take_exact(points, n, view.kind)
    }
}

/// One recorded scale round.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScaleSegment {
    pub a: PixelPoint,
    pub b: PixelPoint,
    /// Real-world length; falls back to the configured reference length.
    #[serde(default)]
    pub length: Option<f64>,
}

/// A saved marking session.
///
/// ```json
/// {
///   "camera": [{"x": 250, "y": 120}, ...],
///   "top_view": [{"x": 200, "y": 0}, ...],
///   "scale_samples": [{"a": {"x": 10, "y": 400}, "b": {"x": 70, "y": 400}, "length": 6.0}]
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPoints {
    pub camera: Vec<PixelPoint>,
    pub top_view: Vec<PixelPoint>,
    #[serde(default)]
    pub scale_samples: Vec<ScaleSegment>,
}

impl CalibrationPoints {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read points file {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            Error::Config(format!("invalid points file {}: {}", path.display(), e))
        })
    }

    pub fn to_json_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("failed to encode points: {}", e)))?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Collector backed by a [`CalibrationPoints`] session.
#[derive(Clone, Debug)]
pub struct FilePointCollector {
    points: CalibrationPoints,
    camera_used: bool,
    top_view_used: bool,
}

impl FilePointCollector {
    pub fn new(points: CalibrationPoints) -> Self {
        Self {
            points,
            camera_used: false,
            top_view_used: false,
        }
    }

    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(CalibrationPoints::from_json_file(path)?))
    }

    fn segment(&self, round: usize) -> Result<&ScaleSegment> {
        round
            .checked_sub(1)
            .and_then(|idx| self.points.scale_samples.get(idx))
            .ok_or_else(|| {
                Error::calibration(format!(
                    "points file has {} scale samples, round {} requested",
                    self.points.scale_samples.len(),
                    round
                ))
            })
    }
}

impl PointCollector for FilePointCollector {
    fn collect_points(&mut self, view: &CalibrationView<'_>, n: usize) -> Result<Vec<PixelPoint>> {
        match view.kind {
            ViewKind::Camera => {
                if std::mem::replace(&mut self.camera_used, true) {
                    return Err(Error::calibration("camera points already consumed"));
                }
                take_exact(self.points.camera.clone(), n, view.kind)
            }
            ViewKind::TopView => {
                if std::mem::replace(&mut self.top_view_used, true) {
                    return Err(Error::calibration("top-view points already consumed"));
                }
                take_exact(self.points.top_view.clone(), n, view.kind)
            }
            ViewKind::Scale => {
                let segment = self.segment(view.round)?;
                take_exact(vec![segment.a, segment.b], n, view.kind)
            }
        }
    }

    fn sample_length(&mut self, round: usize) -> Option<f64> {
        self.segment(round).ok().and_then(|s| s.length)
    }
}

/// Reads points typed at a terminal, one `x,y` (or `x y`) per line.
///
/// Prompts go to `prompt`. Blank lines are ignored; malformed lines are
/// reported and re-asked. End of input is a calibration error.
pub struct PromptCollector<R, W> {
    input: R,
    prompt: W,
}

impl<R: BufRead, W: Write> PromptCollector<R, W> {
    pub fn new(input: R, prompt: W) -> Self {
        Self { input, prompt }
    }

    fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(Error::calibration("input ended before all points were marked"));
        }
        Ok(line.trim().to_string())
    }
}

impl<R: BufRead, W: Write> PointCollector for PromptCollector<R, W> {
    fn collect_points(&mut self, view: &CalibrationView<'_>, n: usize) -> Result<Vec<PixelPoint>> {
        let what = match view.kind {
            ViewKind::Camera => "camera view".to_string(),
            ViewKind::TopView => "top view".to_string(),
            ViewKind::Scale => format!("scale segment, round {}", view.round),
        };
        writeln!(
            self.prompt,
            "Mark {} points on the {} ({}x{}), one 'x,y' per line:",
            n, what, view.frame.width, view.frame.height
        )?;
        let mut points = Vec::with_capacity(n);
        while points.len() < n {
            write!(self.prompt, "  point {}/{}> ", points.len() + 1, n)?;
            self.prompt.flush()?;
            let line = self.read_line()?;
            if line.is_empty() {
                continue;
            }
            match parse_point(&line) {
                Some(point) => points.push(point),
                None => writeln!(self.prompt, "  expected 'x,y', got '{}'", line)?,
            }
        }
        Ok(points)
    }

    fn sample_length(&mut self, round: usize) -> Option<f64> {
        loop {
            write!(self.prompt, "  length of segment {} (blank for default)> ", round).ok()?;
            self.prompt.flush().ok()?;
            let line = self.read_line().ok()?;
            if line.is_empty() {
                return None;
            }
            match line.parse::<f64>() {
                Ok(length) if length.is_finite() && length > 0.0 => return Some(length),
                _ => writeln!(self.prompt, "  expected a positive number").ok()?,
            }
        }
    }
}

fn parse_point(line: &str) -> Option<PixelPoint> {
    let mut parts = line
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty());
    let x = parts.next()?.parse().ok()?;
    let y = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(PixelPoint::new(x, y))
}

fn take_exact(points: Vec<PixelPoint>, n: usize, kind: ViewKind) -> Result<Vec<PixelPoint>> {
    if points.len() < n {
        return Err(Error::calibration(format!(
            "{:?} view needs {} points, {} were marked",
            kind,
            n,
            points.len()
        )));
    }
    Ok(points.into_iter().take(n).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Frame;

    fn view(kind: ViewKind, frame: &Frame, round: usize) -> CalibrationView<'_> {
        CalibrationView { kind, frame, round }
    }

    #[test]
    fn scripted_collector_replays_in_order() -> Result<()> {
        let frame = Frame::black(8, 8);
        let mut collector = ScriptedCollector::new()
            .with_points(ViewKind::Scale, vec![PixelPoint::new(0, 0), PixelPoint::new(1, 0)])
            .with_points(ViewKind::Scale, vec![PixelPoint::new(2, 0), PixelPoint::new(4, 0)]);
        let first = collector.collect_points(&view(ViewKind::Scale, &frame, 1), 2)?;
        let second = collector.collect_points(&view(ViewKind::Scale, &frame, 2), 2)?;
        assert_eq!(first[1], PixelPoint::new(1, 0));
        assert_eq!(second[1], PixelPoint::new(4, 0));
        assert!(collector
            .collect_points(&view(ViewKind::Scale, &frame, 3), 2)
            .is_err());
        Ok(())
    }

    #[test]
    fn short_point_list_is_a_calibration_error() {
        let frame = Frame::black(8, 8);
        let mut collector =
            ScriptedCollector::new().with_points(ViewKind::Camera, vec![PixelPoint::new(1, 1)]);
        let err = collector
            .collect_points(&view(ViewKind::Camera, &frame, 0), 4)
            .unwrap_err();
        assert!(matches!(err, Error::Calibration(_)));
    }

    #[test]
    fn points_file_round_trips_through_json() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("points.json");
        let session = CalibrationPoints {
            camera: vec![PixelPoint::new(1, 2), PixelPoint::new(3, 4)],
            top_view: vec![PixelPoint::new(5, 6), PixelPoint::new(7, 8)],
            scale_samples: vec![ScaleSegment {
                a: PixelPoint::new(0, 0),
                b: PixelPoint::new(0, 60),
                length: Some(6.0),
            }],
        };
        session.to_json_file(&path)?;

        let frame = Frame::black(8, 8);
        let mut collector = FilePointCollector::open(&path)?;
        let top = collector.collect_points(&view(ViewKind::TopView, &frame, 0), 2)?;
        assert_eq!(top, session.top_view);
        let seg = collector.collect_points(&view(ViewKind::Scale, &frame, 1), 2)?;
        assert_eq!(seg, vec![PixelPoint::new(0, 0), PixelPoint::new(0, 60)]);
        assert_eq!(collector.sample_length(1), Some(6.0));
        assert_eq!(collector.sample_length(2), None);
        Ok(())
    }

    #[test]
    fn prompt_collector_skips_bad_lines() -> Result<()> {
        let frame = Frame::black(8, 8);
        let input = "10,20\n\nnot a point\n30 40\n5\n";
        let mut prompt = Vec::new();
        let mut collector = PromptCollector::new(input.as_bytes(), &mut prompt);
        let points = collector.collect_points(&view(ViewKind::Camera, &frame, 0), 2)?;
        assert_eq!(points, vec![PixelPoint::new(10, 20), PixelPoint::new(30, 40)]);
        assert_eq!(collector.sample_length(1), Some(5.0));
        assert_eq!(collector.sample_length(2), None);
        let prompt = String::from_utf8_lossy(&prompt);
        assert!(prompt.contains("expected 'x,y', got 'not a point'"));
        Ok(())
    }

    #[test]
    fn prompt_collector_fails_at_end_of_input() {
        let frame = Frame::black(8, 8);
        let mut collector = PromptCollector::new("1,1\n".as_bytes(), std::io::sink());
        let err = collector
            .collect_points(&view(ViewKind::TopView, &frame, 0), 4)
            .unwrap_err();
        assert!(matches!(err, Error::Calibration(_)));
    }
}
