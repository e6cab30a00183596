//! Frame sources.
//!
//! - `stub://` synthetic frames (tests, dry runs)
//! - local video files (feature: ingest-file-ffmpeg)
//! - still images, for calibrating from a snapshot (feature: ingest-image)
//! - GStreamer pipelines such as a CSI camera (feature: ingest-gstreamer)
//!
//! Every source yields BGR [`Frame`]s of a fixed size for the whole run and
//! reports exhaustion as `Ok(None)`. An `Err` from `next_frame` means the
//! stream itself is unusable.

pub mod camera;
pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;
#[cfg(feature = "ingest-image")]
pub(crate) mod still;
pub mod synthetic;

#[cfg(feature = "ingest-gstreamer")]
pub use camera::CameraSource;
pub use camera::{csi_camera_pipeline, CsiCameraConfig};
pub use file::FileSource;
pub use synthetic::{SourceOptions, SyntheticSource};

use crate::error::{Error, Result};
use crate::frame::Frame;

/// Counters exposed by every source.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_read: u64,
    pub location: String,
}

/// A stream of frames owned by one consumer.
pub trait FrameSource {
    /// Open the underlying stream. Fails with [`Error::StreamOpen`].
    fn open(&mut self) -> Result<()>;

    /// Next frame, or `None` once the stream is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Nominal frame rate.
    fn fps(&self) -> u32;

    /// Frame size, once known.
    fn dimensions(&self) -> Option<(u32, u32)>;

    fn stats(&self) -> SourceStats;

    /// Release the stream. Further reads return `None`.
    fn close(&mut self) {}
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn open(&mut self) -> Result<()> {
        (**self).open()
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        (**self).next_frame()
    }

    fn fps(&self) -> u32 {
        (**self).fps()
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        (**self).dimensions()
    }

    fn stats(&self) -> SourceStats {
        (**self).stats()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Pick a source for `location`.
///
/// `stub://…` is synthetic, `gst://<pipeline>` and `csi://` are GStreamer,
/// anything else is treated as a local file path.
pub fn open_source(location: &str) -> Result<Box<dyn FrameSource>> {
    if location.trim().is_empty() {
        return Err(Error::StreamOpen("empty video source path".to_string()));
    }
    if location.starts_with("gst://") || location.starts_with("csi://") {
        #[cfg(feature = "ingest-gstreamer")]
        {
            return Ok(Box::new(CameraSource::from_uri(location)?));
        }
        #[cfg(not(feature = "ingest-gstreamer"))]
        {
            return Err(Error::StreamOpen(format!(
                "{} requires the ingest-gstreamer feature",
                location
            )));
        }
    }
    Ok(Box::new(FileSource::new(location)?))
}

/// Open `location` and return its first frame, for calibration.
pub fn first_frame(location: &str) -> Result<Frame> {
    let mut source = open_source(location)?;
    source.open()?;
    let frame = source.next_frame();
    source.close();
    frame?.ok_or_else(|| Error::StreamOpen(format!("'{}' produced no frames", location)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_scheme_opens_synthetic_source() -> Result<()> {
        let mut source = open_source("stub://lobby?frames=2")?;
        source.open()?;
        assert!(source.next_frame()?.is_some());
        assert!(source.next_frame()?.is_some());
        assert!(source.next_frame()?.is_none());
        Ok(())
    }

    #[test]
    fn unknown_scheme_is_refused() {
        assert!(matches!(
            open_source("rtsp://camera/stream"),
            Err(Error::StreamOpen(_))
        ));
        assert!(matches!(open_source("  "), Err(Error::StreamOpen(_))));
    }

    #[test]
    fn first_frame_of_stub_has_requested_size() -> Result<()> {
        let frame = first_frame("stub://cal?width=32&height=16")?;
        assert_eq!((frame.width, frame.height), (32, 16));
        Ok(())
    }
}
