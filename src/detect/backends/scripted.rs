use std::collections::VecDeque;

use crate::detect::backend::PersonDetector;
use crate::detect::nms::non_max_suppression;
use crate::detect::result::Detection;
use crate::error::{Error, Result};
use crate::frame::Frame;

/// What a [`ScriptedDetector`] does on one frame.
#[derive(Clone, Debug, PartialEq)]
pub enum ScriptStep {
    Detections(Vec<Detection>),
    /// A per-frame detector failure.
    Fail(String),
    /// The stream underneath the detector is gone.
    StreamLost(String),
}

/// Replays a fixed per-frame script of detections and failures.
///
/// Scripted boxes still go through the confidence filter and NMS, so the
/// thresholds passed by the caller matter exactly as they would for a model.
/// Once the script runs out, the last step repeats (or nothing is detected if
/// the script was empty).
#[derive(Clone, Debug, Default)]
pub struct ScriptedDetector {
    steps: VecDeque<ScriptStep>,
    last: Option<ScriptStep>,
    calls: u64,
}

impl ScriptedDetector {
    pub fn new(steps: impl IntoIterator<Item = ScriptStep>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
            last: None,
            calls: 0,
        }
    }

    /// Same detections on every frame.
    pub fn constant(detections: Vec<Detection>) -> Self {
        Self::new([ScriptStep::Detections(detections)])
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl PersonDetector for ScriptedDetector {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(
        &mut self,
        _frame: &Frame,
        confidence_threshold: f32,
        overlap_threshold: f32,
    ) -> Result<Vec<Detection>> {
        self.calls += 1;
        let step = match self.steps.pop_front() {
            Some(step) => {
                self.last = Some(step.clone());
                step
            }
            None => match &self.last {
                Some(step) => step.clone(),
                None => return Ok(Vec::new()),
            },
        };
        match step {
            ScriptStep::Detections(boxes) => Ok(non_max_suppression(
                boxes,
                confidence_threshold,
                overlap_threshold,
            )),
            ScriptStep::Fail(msg) => Err(Error::Detector(msg)),
            ScriptStep::StreamLost(msg) => Err(Error::StreamOpen(msg)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_replays_then_repeats_last_step() -> Result<()> {
        let frame = Frame::black(2, 2);
        let person = Detection::new(0.0, 0.0, 5.0, 10.0, 0.8);
        let mut detector = ScriptedDetector::new([
            ScriptStep::Fail("busy".into()),
            ScriptStep::Detections(vec![person]),
        ]);
        assert!(matches!(
            detector.detect(&frame, 0.5, 0.45),
            Err(Error::Detector(_))
        ));
        assert_eq!(detector.detect(&frame, 0.5, 0.45)?, vec![person]);
        assert_eq!(detector.detect(&frame, 0.5, 0.45)?, vec![person]);
        assert_eq!(detector.calls(), 3);
        Ok(())
    }

    #[test]
    fn thresholds_apply_to_scripted_boxes() -> Result<()> {
        let frame = Frame::black(2, 2);
        let mut detector = ScriptedDetector::constant(vec![
            Detection::new(0.0, 0.0, 5.0, 10.0, 0.4),
            Detection::new(50.0, 0.0, 5.0, 10.0, 0.9),
        ]);
        assert_eq!(detector.detect(&frame, 0.5, 0.45)?.len(), 1);
        assert_eq!(detector.detect(&frame, 0.3, 0.45)?.len(), 2);
        Ok(())
    }

    #[test]
    fn empty_script_detects_nothing() -> Result<()> {
        let mut detector = ScriptedDetector::default();
        assert!(detector.detect(&Frame::black(2, 2), 0.5, 0.45)?.is_empty());
        Ok(())
    }
}
