//! Synthetic frame source for tests and dry runs.
//!
//! `stub://<name>?frames=N&width=W&height=H&fps=F`. Without `frames` the
//! stream never ends, which is how the wall-clock cap is exercised.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{FrameSource, SourceStats};
use crate::error::{Error, Result};
use crate::frame::Frame;

/// Shape of a synthetic stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceOptions {
    /// Frames before exhaustion; `None` is endless.
    pub frames: Option<u64>,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Seed for the background noise.
    pub seed: u64,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            frames: None,
            width: 640,
            height: 480,
            fps: 10,
            seed: 0,
        }
    }
}

pub struct SyntheticSource {
    name: String,
    options: SourceOptions,
    rng: StdRng,
    frame_count: u64,
    opened: bool,
    closed: bool,
}

impl SyntheticSource {
    pub fn new(name: impl Into<String>, options: SourceOptions) -> Self {
        let rng = StdRng::seed_from_u64(options.seed);
        Self {
            name: name.into(),
            options,
            rng,
            frame_count: 0,
            opened: false,
            closed: false,
        }
    }

    pub fn from_uri(uri: &str) -> Result<Self> {
        let rest = uri
            .strip_prefix("stub://")
            .ok_or_else(|| Error::StreamOpen(format!("not a stub:// uri: {}", uri)))?;
        let (name, query) = rest.split_once('?').unwrap_or((rest, ""));
        let mut options = SourceOptions::default();
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| Error::StreamOpen(format!("malformed stub option '{}'", pair)))?;
            let bad = || Error::StreamOpen(format!("invalid value for stub option '{}'", key));
            match key {
                "frames" => options.frames = Some(value.parse().map_err(|_| bad())?),
                "width" => options.width = value.parse().map_err(|_| bad())?,
                "height" => options.height = value.parse().map_err(|_| bad())?,
                "fps" => options.fps = value.parse().map_err(|_| bad())?,
                "seed" => options.seed = value.parse().map_err(|_| bad())?,
                _ => return Err(Error::StreamOpen(format!("unknown stub option '{}'", key))),
            }
        }
        if options.width == 0 || options.height == 0 {
            return Err(Error::StreamOpen("stub frame size must be non-zero".into()));
        }
        Ok(Self::new(name, options))
    }

    fn generate(&mut self) -> Frame {
        let (w, h) = (self.options.width, self.options.height);
        let shift = (self.frame_count % 256) as u8;
        let mut frame = Frame::black(w, h);
        for y in 0..h {
            for x in 0..w {
                let noise: u8 = self.rng.gen_range(0..8);
                let v = ((x + y) as u8).wrapping_add(shift).wrapping_add(noise);
                frame.put_pixel(x as i64, y as i64, [v, v / 2, 255 - v]);
            }
        }
        frame
    }
}

impl FrameSource for SyntheticSource {
    fn open(&mut self) -> Result<()> {
        self.opened = true;
        log::info!("SyntheticSource: opened stub://{}", self.name);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if !self.opened {
            return Err(Error::StreamOpen("source read before open".to_string()));
        }
        if self.closed {
            return Ok(None);
        }
        if let Some(limit) = self.options.frames {
            if self.frame_count >= limit {
                return Ok(None);
            }
        }
        let frame = self.generate();
        self.frame_count += 1;
        Ok(Some(frame))
    }

    fn fps(&self) -> u32 {
        self.options.fps
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        Some((self.options.width, self.options.height))
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_read: self.frame_count,
            location: format!("stub://{}", self.name),
        }
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
