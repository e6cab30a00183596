//! Live camera capture through GStreamer.
//!
//! `csi://` opens the default CSI camera with [`csi_camera_pipeline`];
//! `gst://<launch line>` runs an arbitrary pipeline, which must end in an
//! element named `appsink` (one is appended when missing).

#[cfg(feature = "ingest-gstreamer")]
use std::time::{Duration, Instant};

#[cfg(feature = "ingest-gstreamer")]
use super::{FrameSource, SourceStats};
#[cfg(feature = "ingest-gstreamer")]
use crate::error::{Error, Result};
#[cfg(feature = "ingest-gstreamer")]
use crate::frame::Frame;

/// CSI camera capture settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CsiCameraConfig {
    pub capture_width: u32,
    pub capture_height: u32,
    pub display_width: u32,
    pub display_height: u32,
    pub framerate: u32,
    pub flip_method: u32,
}

impl Default for CsiCameraConfig {
    fn default() -> Self {
        Self {
            capture_width: 3280,
            capture_height: 2464,
            display_width: 820,
            display_height: 616,
            framerate: 21,
            flip_method: 0,
        }
    }
}

/// Launch line for an nvargus CSI camera scaled to the display size, BGR out.
pub fn csi_camera_pipeline(cfg: &CsiCameraConfig) -> String {
    format!(
        "nvarguscamerasrc ! \
         video/x-raw(memory:NVMM), width=(int){}, height=(int){}, \
         format=(string)NV12, framerate=(fraction){}/1 ! \
         nvvidconv flip-method={} ! \
         video/x-raw, width=(int){}, height=(int){}, format=(string)BGRx ! \
         videoconvert ! \
         video/x-raw, format=(string)BGR ! appsink",
        cfg.capture_width,
        cfg.capture_height,
        cfg.framerate,
        cfg.flip_method,
        cfg.display_width,
        cfg.display_height
    )
}

#[cfg(feature = "ingest-gstreamer")]
pub struct CameraSource {
    description: String,
    fps: u32,
    pipeline: gstreamer::Pipeline,
    appsink: gstreamer_app::AppSink,
    dimensions: Option<(u32, u32)>,
    frame_count: u64,
    opened_at: Option<Instant>,
    ended: bool,
}

#[cfg(feature = "ingest-gstreamer")]
fn gst_err(context: &str, err: impl std::fmt::Display) -> Error {
    Error::StreamOpen(format!("{}: {}", context, err))
}

#[cfg(feature = "ingest-gstreamer")]
impl CameraSource {
    pub fn from_uri(uri: &str) -> Result<Self> {
        if uri.starts_with("csi://") {
            let cfg = CsiCameraConfig::default();
            return Self::new(&csi_camera_pipeline(&cfg), cfg.framerate);
        }
        let launch = uri
            .strip_prefix("gst://")
            .ok_or_else(|| Error::StreamOpen(format!("not a camera uri: {}", uri)))?;
        Self::new(launch, super::SourceOptions::default().fps)
    }

    pub fn new(launch: &str, fps: u32) -> Result<Self> {
        gstreamer::init().map_err(|e| gst_err("initialize gstreamer", e))?;

        let mut description = launch.trim().to_string();
        if description.ends_with("appsink") {
            description.push_str(" name=appsink");
        } else if !description.contains("name=appsink") {
            description.push_str(" ! videoconvert ! video/x-raw,format=BGR ! appsink name=appsink");
        }
        description.push_str(" sync=false max-buffers=1 drop=true");

        use gstreamer::prelude::*;
        let pipeline = gstreamer::parse::launch(&description)
            .map_err(|e| gst_err("build camera pipeline", e))?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| Error::StreamOpen("camera pipeline is not a Pipeline".to_string()))?;
        let appsink = pipeline
            .by_name("appsink")
            .ok_or_else(|| Error::StreamOpen("appsink element missing from pipeline".to_string()))?
            .downcast::<gstreamer_app::AppSink>()
            .map_err(|_| Error::StreamOpen("appsink element has unexpected type".to_string()))?;

        let caps = gstreamer::Caps::builder("video/x-raw")
            .field("format", "BGR")
            .build();
        appsink.set_caps(Some(&caps));

        Ok(Self {
            description,
            fps: fps.max(1),
            pipeline,
            appsink,
            dimensions: None,
            frame_count: 0,
            opened_at: None,
            ended: false,
        })
    }

    fn frame_timeout(&self) -> Duration {
        let base_ms = (1000 / self.fps).saturating_mul(4);
        Duration::from_millis(base_ms.max(500) as u64)
    }

    /// Drain the bus. `Err` on a pipeline error, `true` on end of stream.
    fn poll_bus(&mut self) -> Result<bool> {
        use gstreamer::prelude::*;
        let Some(bus) = self.pipeline.bus() else {
            return Ok(false);
        };
        while let Some(message) = bus.timed_pop(gstreamer::ClockTime::ZERO) {
            use gstreamer::MessageView;
            match message.view() {
                MessageView::Error(err) => {
                    return Err(Error::StreamOpen(format!(
                        "gstreamer error from {:?}: {}",
                        err.src().map(|s| s.path_string()),
                        err.error()
                    )));
                }
                MessageView::Eos(..) => return Ok(true),
                _ => {}
            }
        }
        Ok(false)
    }
}

#[cfg(feature = "ingest-gstreamer")]
impl FrameSource for CameraSource {
    fn open(&mut self) -> Result<()> {
        use gstreamer::prelude::*;
        self.pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| gst_err("start camera pipeline", e))?;
        self.opened_at = Some(Instant::now());
        log::info!("CameraSource: playing {}", self.description);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.opened_at.is_none() {
            return Err(Error::StreamOpen("source read before open".to_string()));
        }
        if self.ended || self.poll_bus()? {
            self.ended = true;
            return Ok(None);
        }
        let timeout = gstreamer::ClockTime::from_mseconds(self.frame_timeout().as_millis() as u64);
        let Some(sample) = self.appsink.try_pull_sample(timeout) else {
            if self.appsink.is_eos() {
                self.ended = true;
                return Ok(None);
            }
            return Err(Error::StreamOpen("camera stream stalled".to_string()));
        };
        let frame = sample_to_frame(&sample)?;
        self.dimensions = Some((frame.width, frame.height));
        self.frame_count += 1;
        Ok(Some(frame))
    }

    fn fps(&self) -> u32 {
        self.fps
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        self.dimensions
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_read: self.frame_count,
            location: self.description.clone(),
        }
    }

    fn close(&mut self) {
        use gstreamer::prelude::*;
        if let Err(err) = self.pipeline.set_state(gstreamer::State::Null) {
            log::warn!("CameraSource: failed to stop pipeline: {}", err);
        }
        self.ended = true;
    }
}

#[cfg(feature = "ingest-gstreamer")]
fn sample_to_frame(sample: &gstreamer::Sample) -> Result<Frame> {
    let buffer = sample
        .buffer()
        .ok_or_else(|| Error::StreamOpen("camera sample missing buffer".to_string()))?;
    let caps = sample
        .caps()
        .ok_or_else(|| Error::StreamOpen("camera sample missing caps".to_string()))?;
    let info = gstreamer_video::VideoInfo::from_caps(caps)
        .map_err(|e| gst_err("parse camera caps", e))?;

    let width = info.width();
    let height = info.height();
    let row_bytes = (width as usize) * 3;
    let stride = info.stride()[0] as usize;

    let map = buffer
        .map_readable()
        .map_err(|e| gst_err("map camera buffer", e))?;
    let data = map.as_slice();

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        pixels.extend_from_slice(data.get(start..start + row_bytes).ok_or_else(|| {
            Error::StreamOpen("camera buffer row is out of bounds".to_string())
        })?);
    }
    Frame::from_bgr(pixels, width, height)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csi_pipeline_uses_capture_and_display_sizes() {
        let line = csi_camera_pipeline(&CsiCameraConfig::default());
        assert!(line.starts_with("nvarguscamerasrc ! "));
        assert!(line.contains("width=(int)3280, height=(int)2464"));
        assert!(line.contains("framerate=(fraction)21/1"));
        assert!(line.contains("nvvidconv flip-method=0"));
        assert!(line.contains("width=(int)820, height=(int)616, format=(string)BGRx"));
        assert!(line.ends_with("format=(string)BGR ! appsink"));
    }
}
