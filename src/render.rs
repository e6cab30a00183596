//! Frame annotation: detection boxes and violation lines.

use crate::detect::Detection;
use crate::frame::Frame;
use crate::violation::FrameAnalysis;
use crate::PixelPoint;

/// Box outline colour (BGR blue).
pub const DETECTION_COLOR: [u8; 3] = [255, 0, 0];
pub const DETECTION_THICKNESS: u32 = 1;
/// Violation line colour (BGR red).
pub const VIOLATION_COLOR: [u8; 3] = [0, 0, 255];
pub const VIOLATION_THICKNESS: u32 = 2;

/// Outline the rectangle spanning `top_left` to `bottom_right` inclusive.
pub fn draw_rect(
    frame: &mut Frame,
    top_left: PixelPoint,
    bottom_right: PixelPoint,
    color: [u8; 3],
    thickness: u32,
) {
    let (x0, y0) = (top_left.x, top_left.y);
    let (x1, y1) = (bottom_right.x, bottom_right.y);
    draw_line(frame, PixelPoint::new(x0, y0), PixelPoint::new(x1, y0), color, thickness);
    draw_line(frame, PixelPoint::new(x1, y0), PixelPoint::new(x1, y1), color, thickness);
    draw_line(frame, PixelPoint::new(x1, y1), PixelPoint::new(x0, y1), color, thickness);
    draw_line(frame, PixelPoint::new(x0, y1), PixelPoint::new(x0, y0), color, thickness);
}

/// Bresenham line; each step stamps a `thickness` × `thickness` square.
/// The segment is clipped to the frame first, so work is bounded by the
/// frame size however far the endpoints lie outside it.
pub fn draw_line(
    frame: &mut Frame,
    from: PixelPoint,
    to: PixelPoint,
    color: [u8; 3],
    thickness: u32,
) {
    let t = thickness.max(1) as i64;
    let lo = -(t / 2);
    let hi = (t - 1) / 2;

    let Some(((mut x, mut y), (x1, y1))) = clip_segment(frame, from, to, t) else {
        return;
    };
    let dx = (x1 - x).abs();
    let dy = -(y1 - y).abs();
    let sx = if x < x1 { 1 } else { -1 };
    let sy = if y < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        for oy in lo..=hi {
            for ox in lo..=hi {
                frame.put_pixel(x + ox, y + oy, color);
            }
        }
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

type Endpoints = ((i64, i64), (i64, i64));

/// Liang–Barsky clip of `from`–`to` against the frame grown by `margin`.
/// Segments already inside are returned unchanged.
fn clip_segment(
    frame: &Frame,
    from: PixelPoint,
    to: PixelPoint,
    margin: i64,
) -> Option<Endpoints> {
    let (x0, y0) = (from.x as i64, from.y as i64);
    let (x1, y1) = (to.x as i64, to.y as i64);
    let (min_x, min_y) = (-margin, -margin);
    let max_x = frame.width as i64 - 1 + margin;
    let max_y = frame.height as i64 - 1 + margin;
    let inside = |x: i64, y: i64| (min_x..=max_x).contains(&x) && (min_y..=max_y).contains(&y);
    if inside(x0, y0) && inside(x1, y1) {
        return Some(((x0, y0), (x1, y1)));
    }

    let dx = (x1 - x0) as f64;
    let dy = (y1 - y0) as f64;
    let (mut t0, mut t1) = (0.0f64, 1.0f64);
    for (p, q) in [
        (-dx, (x0 - min_x) as f64),
        (dx, (max_x - x0) as f64),
        (-dy, (y0 - min_y) as f64),
        (dy, (max_y - y0) as f64),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            t0 = t0.max(r);
        } else {
            t1 = t1.min(r);
        }
        if t0 > t1 {
            return None;
        }
    }
    let at = |t: f64| {
        (
            (x0 as f64 + t * dx).round().clamp(min_x as f64, max_x as f64) as i64,
            (y0 as f64 + t * dy).round().clamp(min_y as f64, max_y as f64) as i64,
        )
    };
    Some((at(t0), at(t1)))
}

fn saturate_i32(v: i64) -> i32 {
    v.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

/// Draw every detection box, then a line between the ground points of every
/// violating pair.
pub fn annotate(frame: &mut Frame, detections: &[Detection], analysis: &FrameAnalysis) {
    for det in detections {
        let (x, y, w, h) = det.pixel_rect();
        let top_left = PixelPoint::new(saturate_i32(x), saturate_i32(y));
        let bottom_right = PixelPoint::new(
            saturate_i32(x.saturating_add(w)),
            saturate_i32(y.saturating_add(h)),
        );
        draw_rect(frame, top_left, bottom_right, DETECTION_COLOR, DETECTION_THICKNESS);
    }
    for pair in &analysis.violations {
        let (Some(a), Some(b)) = (
            analysis.ground_points.get(pair.a),
            analysis.ground_points.get(pair.b),
        ) else {
            continue;
        };
        draw_line(frame, a.point, b.point, VIOLATION_COLOR, VIOLATION_THICKNESS);
    }
}
