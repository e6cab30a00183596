//! MJPEG-in-AVI file writer on FFmpeg.
//!
//! Frames are converted BGR24 → YUVJ420P, encoded with the MJPEG encoder
//! and muxed by the container FFmpeg picks from the file extension.

use std::path::{Path, PathBuf};

use ffmpeg_next as ffmpeg;

use super::FrameSink;
use crate::error::{Error, Result};
use crate::frame::Frame;

fn output_err(context: &str, err: ffmpeg::Error) -> Error {
    Error::Io(std::io::Error::other(format!("{}: {}", context, err)))
}

pub struct MjpegAviWriter {
    path: PathBuf,
    output: ffmpeg::format::context::Output,
    encoder: ffmpeg::encoder::video::Encoder,
    scaler: ffmpeg::software::scaling::Context,
    stream_index: usize,
    encoder_time_base: ffmpeg::Rational,
    stream_time_base: ffmpeg::Rational,
    width: u32,
    height: u32,
    frames: u64,
    finished: bool,
}

impl MjpegAviWriter {
    /// Create (or truncate) `path` for `width` × `height` frames at `fps`.
    pub fn create(path: &Path, width: u32, height: u32, fps: u32) -> Result<Self> {
        ffmpeg::init().map_err(|e| output_err("initialize ffmpeg", e))?;
        let mut output = ffmpeg::format::output(&path)
            .map_err(|e| output_err(&format!("create '{}'", path.display()), e))?;
        let global_header = output
            .format()
            .flags()
            .contains(ffmpeg::format::Flags::GLOBAL_HEADER);

        let codec = ffmpeg::encoder::find(ffmpeg::codec::Id::MJPEG).ok_or_else(|| {
            Error::Io(std::io::Error::other("ffmpeg has no MJPEG encoder"))
        })?;
        let mut stream = output
            .add_stream(codec)
            .map_err(|e| output_err("add video stream", e))?;
        let stream_index = stream.index();

        let mut encoder = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
            .map_err(|e| output_err("load encoder parameters", e))?
            .encoder()
            .video()
            .map_err(|e| output_err("create video encoder", e))?;
        let fps = fps.max(1) as i32;
        let encoder_time_base = ffmpeg::Rational::new(1, fps);
        encoder.set_width(width);
        encoder.set_height(height);
        encoder.set_format(ffmpeg::format::Pixel::YUVJ420P);
        encoder.set_time_base(encoder_time_base);
        encoder.set_frame_rate(Some(ffmpeg::Rational::new(fps, 1)));
        if global_header {
            encoder.set_flags(ffmpeg::codec::Flags::GLOBAL_HEADER);
        }
        let encoder = encoder
            .open_as(codec)
            .map_err(|e| output_err("open MJPEG encoder", e))?;
        stream.set_parameters(&encoder);
        stream.set_time_base(encoder_time_base);

        output
            .write_header()
            .map_err(|e| output_err("write container header", e))?;
        let stream_time_base = output
            .stream(stream_index)
            .map(|s| s.time_base())
            .unwrap_or(encoder_time_base);

        let scaler = ffmpeg::software::scaling::Context::get(
            ffmpeg::format::Pixel::BGR24,
            width,
            height,
            ffmpeg::format::Pixel::YUVJ420P,
            width,
            height,
            ffmpeg::software::scaling::Flags::BILINEAR,
        )
        .map_err(|e| output_err("create scaler", e))?;

        log::info!(
            "MjpegAviWriter: writing {} ({}x{} @ {} fps)",
            path.display(),
            width,
            height,
            fps
        );
        Ok(Self {
            path: path.to_path_buf(),
            output,
            encoder,
            scaler,
            stream_index,
            encoder_time_base,
            stream_time_base,
            width,
            height,
            frames: 0,
            finished: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn drain_packets(&mut self) -> Result<()> {
        let mut packet = ffmpeg::Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(self.stream_index);
            packet.rescale_ts(self.encoder_time_base, self.stream_time_base);
            packet
                .write_interleaved(&mut self.output)
                .map_err(|e| output_err("write packet", e))?;
        }
        Ok(())
    }
}

impl FrameSink for MjpegAviWriter {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if (frame.width, frame.height) != (self.width, self.height) {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!(
                    "frame is {}x{}, writer expects {}x{}",
                    frame.width, frame.height, self.width, self.height
                ),
            )));
        }
        let mut bgr =
            ffmpeg::frame::Video::new(ffmpeg::format::Pixel::BGR24, self.width, self.height);
        let row_bytes = self.width as usize * 3;
        let stride = bgr.stride(0);
        let plane = bgr.data_mut(0);
        for (row, pixels) in frame.as_bgr().chunks_exact(row_bytes).enumerate() {
            plane[row * stride..row * stride + row_bytes].copy_from_slice(pixels);
        }

        let mut yuv = ffmpeg::frame::Video::empty();
        self.scaler
            .run(&bgr, &mut yuv)
            .map_err(|e| output_err("convert frame to YUV", e))?;
        yuv.set_pts(Some(self.frames as i64));
        self.encoder
            .send_frame(&yuv)
            .map_err(|e| output_err("encode frame", e))?;
        self.drain_packets()?;
        self.frames += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.encoder
            .send_eof()
            .map_err(|e| output_err("flush encoder", e))?;
        self.drain_packets()?;
        self.output
            .write_trailer()
            .map_err(|e| output_err("write container trailer", e))?;
        log::info!(
            "MjpegAviWriter: closed {} after {} frames",
            self.path.display(),
            self.frames
        );
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frames
    }
}
