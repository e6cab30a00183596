//! Frame sinks.
//!
//! The runtime loop writes every processed frame to exactly one sink and
//! calls [`FrameSink::finish`] once, however the run ended.

#[cfg(feature = "output-mjpeg")]
mod mjpeg;

#[cfg(feature = "output-mjpeg")]
pub use mjpeg::MjpegAviWriter;

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::frame::Frame;

/// Destination for annotated frames.
pub trait FrameSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;

    /// Flush and close. Called exactly once.
    fn finish(&mut self) -> Result<()>;

    fn frames_written(&self) -> u64;
}

impl<S: FrameSink + ?Sized> FrameSink for Box<S> {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        (**self).write_frame(frame)
    }

    fn finish(&mut self) -> Result<()> {
        (**self).finish()
    }

    fn frames_written(&self) -> u64 {
        (**self).frames_written()
    }
}

/// Counts frames and discards them.
#[derive(Debug, Default)]
pub struct NullSink {
    frames: u64,
    finished: bool,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl FrameSink for NullSink {
    fn write_frame(&mut self, _frame: &Frame) -> Result<()> {
        self.frames += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frames
    }
}

/// `<stem>_output.avi` next to a local input; scheme sources such as
/// `stub://lobby` or `csi://` are written to the working directory.
pub fn output_path_for(location: &str) -> PathBuf {
    if let Some((scheme, rest)) = location.split_once("://") {
        let name = rest
            .split(['?', '/', ' '])
            .find(|s| !s.is_empty())
            .unwrap_or(scheme);
        return PathBuf::from(format!("{}_output.avi", name));
    }
    let path = Path::new(location);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video".to_string());
    path.with_file_name(format!("{}_output.avi", stem))
}

type OpenFn = Box<dyn FnOnce(u32, u32) -> Result<Box<dyn FrameSink>>>;

/// Opens the real sink on the first frame, once the frame size is known.
pub struct DeferredSink {
    open: Option<OpenFn>,
    inner: Option<Box<dyn FrameSink>>,
}

impl DeferredSink {
    pub fn new(open: impl FnOnce(u32, u32) -> Result<Box<dyn FrameSink>> + 'static) -> Self {
        Self {
            open: Some(Box::new(open)),
            inner: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.inner.is_some()
    }
}

impl FrameSink for DeferredSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if self.inner.is_none() {
            if let Some(open) = self.open.take() {
                self.inner = Some(open(frame.width, frame.height)?);
            }
        }
        match self.inner.as_mut() {
            Some(inner) => inner.write_frame(frame),
            None => Err(Error::State(
                "output sink failed to open".to_string(),
            )),
        }
    }

    fn finish(&mut self) -> Result<()> {
        self.open = None;
        match self.inner.as_mut() {
            Some(inner) => inner.finish(),
            None => Ok(()),
        }
    }

    fn frames_written(&self) -> u64 {
        self.inner.as_ref().map_or(0, |inner| inner.frames_written())
    }
}

/// Sink for a run's annotated frames, opened at the first frame's size.
///
/// Fails with [`Error::Config`] when the crate was built without a video
/// writer (`output-mjpeg`).
pub fn open_sink(path: &Path, fps: u32) -> Result<Box<dyn FrameSink>> {
    #[cfg(feature = "output-mjpeg")]
    {
        let path = path.to_path_buf();
        Ok(Box::new(DeferredSink::new(move |width, height| {
            let writer = MjpegAviWriter::create(&path, width, height, fps)?;
            Ok(Box::new(writer) as Box<dyn FrameSink>)
        })))
    }
    #[cfg(not(feature = "output-mjpeg"))]
    {
        Err(Error::Config(format!(
            "writing {} ({} fps) requires the output-mjpeg feature",
            path.display(),
            fps
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_path_replaces_extension() {
        assert_eq!(
            output_path_for("videos/street.mp4"),
            PathBuf::from("videos/street_output.avi")
        );
        assert_eq!(output_path_for("clip"), PathBuf::from("clip_output.avi"));
    }

    #[test]
    fn output_path_for_scheme_sources() {
        assert_eq!(
            output_path_for("stub://lobby?frames=3"),
            PathBuf::from("lobby_output.avi")
        );
        assert_eq!(output_path_for("csi://"), PathBuf::from("csi_output.avi"));
    }

    #[test]
    fn null_sink_counts_frames() -> Result<()> {
        let mut sink = NullSink::new();
        sink.write_frame(&Frame::black(2, 2))?;
        sink.write_frame(&Frame::black(2, 2))?;
        sink.finish()?;
        assert_eq!(sink.frames_written(), 2);
        assert!(sink.is_finished());
        Ok(())
    }

    #[test]
    fn deferred_sink_opens_at_first_frame_size() -> Result<()> {
        let seen = std::rc::Rc::new(std::cell::Cell::new((0, 0)));
        let record = seen.clone();
        let mut sink = DeferredSink::new(move |w, h| {
            record.set((w, h));
            Ok(Box::new(NullSink::new()) as Box<dyn FrameSink>)
        });
        assert!(!sink.is_open());
        sink.write_frame(&Frame::black(6, 4))?;
        sink.write_frame(&Frame::black(6, 4))?;
        sink.finish()?;
        assert_eq!(seen.get(), (6, 4));
        assert_eq!(sink.frames_written(), 2);
        Ok(())
    }

    #[test]
    fn deferred_sink_without_frames_finishes_cleanly() -> Result<()> {
        let mut sink = DeferredSink::new(|_, _| {
            Err(Error::State("should not open".to_string()))
        });
        sink.finish()?;
        assert_eq!(sink.frames_written(), 0);
        Ok(())
    }

    #[cfg(not(feature = "output-mjpeg"))]
    #[test]
    fn missing_video_writer_is_a_config_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("clip_output.avi");
        let err = open_sink(&path, 10).err().expect("writer unavailable");
        assert!(matches!(err, Error::Config(ref msg) if msg.contains("output-mjpeg")));
        assert!(!path.exists());
    }

    #[cfg(feature = "output-mjpeg")]
    #[test]
    fn opened_sink_writes_the_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("clip_output.avi");
        let mut sink = open_sink(&path, 10)?;
        for _ in 0..3 {
            sink.write_frame(&Frame::black(16, 16))?;
        }
        sink.finish()?;
        assert_eq!(sink.frames_written(), 3);
        assert!(path.exists());
        Ok(())
    }
}
