//! Bird's-eye rendering of a camera frame.
//!
//! Each output pixel is mapped back through the inverse homography and
//! sampled nearest-neighbour from the camera frame. Pixels that fall outside
//! the camera frame stay black.

use crate::calibrate::homography::HomographyMatrix;
use crate::error::{Error, Result};
use crate::Frame;

/// Warp `frame` into a `width` × `height` top-view image.
pub fn warp_to_top_view(
    frame: &Frame,
    homography: &HomographyMatrix,
    width: u32,
    height: u32,
) -> Result<Frame> {
    let inverse = homography
        .inverse()
        .ok_or_else(|| Error::calibration("homography is not invertible"))?;

    let mut out = Frame::black(width, height);
    for y in 0..height {
        for x in 0..width {
            let Some(src) = inverse.project([x as f64, y as f64]) else {
                continue;
            };
            let sx = src[0].round() as i64;
            let sy = src[1].round() as i64;
            if let Some(px) = frame.pixel(sx, sy) {
                out.put_pixel(x as i64, y as i64, px);
            }
        }
    }
    Ok(out)
}

/// Output canvas size that contains the projected camera frame corners,
/// clamped to `max_side` on each axis.
pub fn top_view_extent(
    frame_width: u32,
    frame_height: u32,
    homography: &HomographyMatrix,
    max_side: u32,
) -> (u32, u32) {
    let corners = [
        [0.0, 0.0],
        [frame_width as f64, 0.0],
        [frame_width as f64, frame_height as f64],
        [0.0, frame_height as f64],
    ];
    let mut max_x: f64 = 1.0;
    let mut max_y: f64 = 1.0;
    for c in corners {
        if let Some(p) = homography.project(c) {
            max_x = max_x.max(p[0]);
            max_y = max_y.max(p[1]);
        }
    }
    let clamp = |v: f64| (v.ceil() as u32).clamp(1, max_side.max(1));
    (clamp(max_x), clamp(max_y))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_warp_copies_the_frame() -> Result<()> {
        let mut frame = Frame::black(6, 4);
        frame.put_pixel(2, 1, [10, 20, 30]);
        let warped = warp_to_top_view(&frame, &HomographyMatrix::identity(), 6, 4)?;
        assert_eq!(warped, frame);
        Ok(())
    }

    #[test]
    fn translation_shifts_pixels() -> Result<()> {
        let mut frame = Frame::black(6, 4);
        frame.put_pixel(1, 1, [255, 255, 255]);
        let shift = HomographyMatrix::from_rows([[1.0, 0.0, 2.0], [0.0, 1.0, 1.0], [0.0, 0.0, 1.0]])?;
        let warped = warp_to_top_view(&frame, &shift, 6, 4)?;
        assert_eq!(warped.pixel(3, 2), Some([255, 255, 255]));
        assert_eq!(warped.pixel(1, 1), Some([0, 0, 0]));
        Ok(())
    }

    #[test]
    fn extent_covers_scaled_frame() -> Result<()> {
        let scale = HomographyMatrix::from_rows([[2.0, 0.0, 0.0], [0.0, 3.0, 0.0], [0.0, 0.0, 1.0]])?;
        assert_eq!(top_view_extent(10, 10, &scale, 1000), (20, 30));
        assert_eq!(top_view_extent(10, 10, &scale, 25), (20, 25));
        Ok(())
    }
}
