//! Owned video frames.
//!
//! Frames are interleaved 8-bit BGR, row-major, no padding between rows.
//! Every source in `ingest` normalises to this layout before handing a frame
//! to the runtime loop, and every sink in `output` expects it.

use crate::error::{Error, Result};

/// Bytes per pixel for BGR24.
pub const BGR_CHANNELS: usize = 3;

/// A single decoded frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    /// Wrap BGR pixels. Fails when the buffer length does not match the dimensions.
    pub fn from_bgr(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = expected_len(width, height)?;
        if data.len() != expected {
            return Err(Error::StreamOpen(format!(
                "BGR frame length mismatch: expected {}, got {}",
                expected,
                data.len()
            )));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// A frame filled with one colour.
    pub fn filled(width: u32, height: u32, bgr: [u8; 3]) -> Self {
        let pixels = width as usize * height as usize;
        let mut data = Vec::with_capacity(pixels * BGR_CHANNELS);
        for _ in 0..pixels {
            data.extend_from_slice(&bgr);
        }
        Self {
            data,
            width,
            height,
        }
    }

    pub fn black(width: u32, height: u32) -> Self {
        Self::filled(width, height, [0, 0, 0])
    }

    pub fn as_bgr(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bgr(self) -> Vec<u8> {
        self.data
    }

    /// Pixel at (x, y), or `None` outside the frame.
    pub fn pixel(&self, x: i64, y: i64) -> Option<[u8; 3]> {
        let offset = self.offset(x, y)?;
        Some([
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
        ])
    }

    /// Write a pixel; coordinates outside the frame are ignored.
    pub fn put_pixel(&mut self, x: i64, y: i64, bgr: [u8; 3]) {
        if let Some(offset) = self.offset(x, y) {
            self.data[offset..offset + BGR_CHANNELS].copy_from_slice(&bgr);
        }
    }

    /// RGB copy of the pixels, for encoders and models that expect RGB order.
    pub fn to_rgb(&self) -> Vec<u8> {
        let mut rgb = Vec::with_capacity(self.data.len());
        for px in self.data.chunks_exact(BGR_CHANNELS) {
            rgb.extend_from_slice(&[px[2], px[1], px[0]]);
        }
        rgb
    }

    fn offset(&self, x: i64, y: i64) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return None;
        }
        Some((y as usize * self.width as usize + x as usize) * BGR_CHANNELS)
    }
}

/// Convert a tightly packed RGB24 buffer to a BGR frame.
pub fn frame_from_rgb(rgb: &[u8], width: u32, height: u32) -> Result<Frame> {
    let expected = expected_len(width, height)?;
    if rgb.len() != expected {
        return Err(Error::StreamOpen(format!(
            "RGB frame length mismatch: expected {}, got {}",
            expected,
            rgb.len()
        )));
    }
    let mut bgr = Vec::with_capacity(expected);
    for px in rgb.chunks_exact(BGR_CHANNELS) {
        bgr.extend_from_slice(&[px[2], px[1], px[0]]);
    }
    Frame::from_bgr(bgr, width, height)
}

fn expected_len(width: u32, height: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(BGR_CHANNELS))
        .ok_or_else(|| Error::StreamOpen("frame dimensions overflow".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_bgr_validates_length() {
        assert!(Frame::from_bgr(vec![0u8; 12], 2, 2).is_ok());
        assert!(Frame::from_bgr(vec![0u8; 11], 2, 2).is_err());
    }

    #[test]
    fn put_pixel_ignores_out_of_bounds() {
        let mut frame = Frame::black(4, 3);
        frame.put_pixel(-1, 0, [1, 2, 3]);
        frame.put_pixel(4, 0, [1, 2, 3]);
        frame.put_pixel(3, 2, [9, 8, 7]);
        assert_eq!(frame.pixel(3, 2), Some([9, 8, 7]));
        assert_eq!(frame.pixel(4, 2), None);
        assert_eq!(frame.as_bgr().iter().filter(|&&b| b != 0).count(), 3);
    }

    #[test]
    fn rgb_round_trip_swaps_channels() -> Result<()> {
        let frame = frame_from_rgb(&[10, 20, 30], 1, 1)?;
        assert_eq!(frame.pixel(0, 0), Some([30, 20, 10]));
        assert_eq!(frame.to_rgb(), vec![10, 20, 30]);
        Ok(())
    }
}
