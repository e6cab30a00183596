//! Single still image as a one-frame stream.

use super::{FrameSource, SourceStats};
use crate::error::{Error, Result};
use crate::frame::{frame_from_rgb, Frame};

pub(crate) struct StillImageSource {
    path: String,
    frame: Option<Frame>,
    dimensions: Option<(u32, u32)>,
    frames_read: u64,
}

impl StillImageSource {
    pub(crate) fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            frame: None,
            dimensions: None,
            frames_read: 0,
        }
    }
}

impl FrameSource for StillImageSource {
    fn open(&mut self) -> Result<()> {
        let img = image::open(&self.path)
            .map_err(|e| Error::StreamOpen(format!("failed to decode '{}': {}", self.path, e)))?
            .to_rgb8();
        let (width, height) = img.dimensions();
        self.frame = Some(frame_from_rgb(img.as_raw(), width, height)?);
        self.dimensions = Some((width, height));
        log::info!("FileSource: opened still image {} ({}x{})", self.path, width, height);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let frame = self.frame.take();
        if frame.is_some() {
            self.frames_read += 1;
        }
        Ok(frame)
    }

    fn fps(&self) -> u32 {
        1
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        self.dimensions
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_read: self.frames_read,
            location: self.path.clone(),
        }
    }

    fn close(&mut self) {
        self.frame = None;
    }
}
