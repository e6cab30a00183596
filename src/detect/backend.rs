use crate::detect::result::Detection;
use crate::error::Result;
use crate::frame::Frame;

/// Person detector contract.
///
/// Implementations receive the frame read-only and return boxes in that
/// frame's pixel coordinates, already filtered by `confidence_threshold` and
/// de-duplicated with `overlap_threshold` (IoU for non-maximum suppression).
///
/// Return [`crate::Error::Detector`] for a failure confined to this frame.
/// Any other error tells the runtime loop that the stream itself is unusable.
pub trait PersonDetector {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    fn detect(
        &mut self,
        frame: &Frame,
        confidence_threshold: f32,
        overlap_threshold: f32,
    ) -> Result<Vec<Detection>>;

    /// Optional warm-up hook, run once before the first frame.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<D: PersonDetector + ?Sized> PersonDetector for Box<D> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn detect(
        &mut self,
        frame: &Frame,
        confidence_threshold: f32,
        overlap_threshold: f32,
    ) -> Result<Vec<Detection>> {
        (**self).detect(frame, confidence_threshold, overlap_threshold)
    }

    fn warm_up(&mut self) -> Result<()> {
        (**self).warm_up()
    }
}
