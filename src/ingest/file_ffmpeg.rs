//! Local video file decoding with FFmpeg.
//!
//! Frames are converted to BGR24 in memory. End of file is reported as
//! `Ok(None)` after the decoder has been drained.

use ffmpeg_next as ffmpeg;

use super::{FrameSource, SourceStats};
use crate::error::{Error, Result};
use crate::frame::Frame;

const FALLBACK_FPS: u32 = 25;

pub(crate) struct FfmpegFileSource {
    path: String,
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    fps: u32,
    frame_count: u64,
    opened: bool,
    eof_sent: bool,
    finished: bool,
}

fn stream_err(context: &str, err: ffmpeg::Error) -> Error {
    Error::StreamOpen(format!("{}: {}", context, err))
}

/// The decoder wants another packet, or has been fully drained.
fn needs_more_input(err: &ffmpeg::Error) -> bool {
    match err {
        ffmpeg::Error::Eof => true,
        ffmpeg::Error::Other { errno } => *errno == ffmpeg::error::EAGAIN,
        _ => false,
    }
}

impl FfmpegFileSource {
    pub(crate) fn new(path: &str) -> Result<Self> {
        ffmpeg::init().map_err(|e| stream_err("initialize ffmpeg", e))?;
        let input = ffmpeg::format::input(&path)
            .map_err(|e| stream_err(&format!("open '{}'", path), e))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| Error::StreamOpen(format!("'{}' has no video track", path)))?;
        let stream_index = input_stream.index();
        let rate = input_stream.avg_frame_rate();
        let fps = if rate.denominator() > 0 && rate.numerator() > 0 {
            (rate.numerator() as f64 / rate.denominator() as f64).round() as u32
        } else {
            FALLBACK_FPS
        };
        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .map_err(|e| stream_err("load video decoder parameters", e))?;
        let decoder = context
            .decoder()
            .video()
            .map_err(|e| stream_err("open video decoder", e))?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::BGR24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .map_err(|e| stream_err("create scaler", e))?;

        Ok(Self {
            path: path.to_string(),
            input,
            stream_index,
            decoder,
            scaler,
            fps: fps.max(1),
            frame_count: 0,
            opened: false,
            eof_sent: false,
            finished: false,
        })
    }

    fn receive(&mut self) -> Result<Option<Frame>> {
        let mut decoded = ffmpeg::frame::Video::empty();
        match self.decoder.receive_frame(&mut decoded) {
            Ok(()) => {}
            Err(err) if needs_more_input(&err) => return Ok(None),
            Err(err) => return Err(stream_err("decode frame", err)),
        }
        let mut bgr = ffmpeg::frame::Video::empty();
        self.scaler
            .run(&decoded, &mut bgr)
            .map_err(|e| stream_err("convert frame to BGR", e))?;
        let frame = video_to_frame(&bgr)?;
        self.frame_count += 1;
        Ok(Some(frame))
    }
}

impl FrameSource for FfmpegFileSource {
    fn open(&mut self) -> Result<()> {
        self.opened = true;
        log::info!(
            "FileSource: opened {} ({}x{} @ {} fps, ffmpeg)",
            self.path,
            self.decoder.width(),
            self.decoder.height(),
            self.fps
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if !self.opened {
            return Err(Error::StreamOpen("source read before open".to_string()));
        }
        if self.finished {
            return Ok(None);
        }
        if let Some(frame) = self.receive()? {
            return Ok(Some(frame));
        }

        while !self.eof_sent {
            let next = self
                .input
                .packets()
                .next()
                .map(|(stream, packet)| (stream.index(), packet));
            let Some((index, packet)) = next else {
                self.decoder
                    .send_eof()
                    .map_err(|e| stream_err("flush decoder", e))?;
                self.eof_sent = true;
                break;
            };
            if index != self.stream_index {
                continue;
            }
            self.decoder
                .send_packet(&packet)
                .map_err(|e| stream_err("decode packet", e))?;
            if let Some(frame) = self.receive()? {
                return Ok(Some(frame));
            }
        }

        match self.receive()? {
            Some(frame) => Ok(Some(frame)),
            None => {
                self.finished = true;
                log::info!(
                    "FileSource: {} exhausted after {} frames",
                    self.path,
                    self.frame_count
                );
                Ok(None)
            }
        }
    }

    fn fps(&self) -> u32 {
        self.fps
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        Some((self.decoder.width(), self.decoder.height()))
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_read: self.frame_count,
            location: self.path.clone(),
        }
    }

    fn close(&mut self) {
        self.finished = true;
    }
}

fn video_to_frame(frame: &ffmpeg::frame::Video) -> Result<Frame> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        let len = row_bytes * height as usize;
        let pixels = data
            .get(..len)
            .ok_or_else(|| Error::StreamOpen("decoded frame is truncated".to_string()))?;
        return Frame::from_bgr(pixels.to_vec(), width, height);
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        pixels.extend_from_slice(data.get(start..start + row_bytes).ok_or_else(|| {
            Error::StreamOpen("decoded frame row is out of bounds".to_string())
        })?);
    }
    Frame::from_bgr(pixels, width, height)
}
