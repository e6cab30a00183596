use crate::detect::backend::PersonDetector;
use crate::detect::result::Detection;
use crate::error::Result;
use crate::frame::Frame;

/// Backend that never sees anyone. Useful for dry runs of the frame loop.
#[derive(Debug, Default)]
pub struct StubDetector {
    frames_seen: u64,
}

impl StubDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }
}

impl PersonDetector for StubDetector {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(
        &mut self,
        _frame: &Frame,
        _confidence_threshold: f32,
        _overlap_threshold: f32,
    ) -> Result<Vec<Detection>> {
        self.frames_seen += 1;
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_detector_counts_frames_and_finds_nobody() -> Result<()> {
        let mut detector = StubDetector::new();
        let frame = Frame::black(4, 4);
        assert!(detector.detect(&frame, 0.5, 0.45)?.is_empty());
        assert!(detector.detect(&frame, 0.5, 0.45)?.is_empty());
        assert_eq!(detector.frames_seen(), 2);
        Ok(())
    }
}
