#![cfg(feature = "backend-tract")]

use std::path::Path;

use tract_onnx::prelude::*;

use crate::detect::backend::PersonDetector;
use crate::detect::nms::non_max_suppression;
use crate::detect::result::Detection;
use crate::error::{Error, Result};
use crate::frame::Frame;

/// YOLO-style person detector running an ONNX model through tract.
///
/// Expects one input of shape `[1, 3, H, W]` (RGB, 0..1) and one output of
/// shape `[1, N, 5 + classes]` with rows `cx, cy, w, h, objectness, scores…`
/// in input-pixel units.
pub struct TractDetector {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    input_width: u32,
    input_height: u32,
    person_class: usize,
}

impl TractDetector {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        input_width: u32,
        input_height: u32,
        person_class: usize,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .and_then(|model| {
                model.with_input_fact(
                    0,
                    InferenceFact::dt_shape(
                        f32::datum_type(),
                        tvec!(1, 3, input_height as usize, input_width as usize),
                    ),
                )
            })
            .and_then(|model| model.into_optimized())
            .and_then(|model| model.into_runnable())
            .map_err(|e| {
                Error::Config(format!(
                    "failed to load ONNX model from {}: {}",
                    model_path.display(),
                    e
                ))
            })?;

        Ok(Self {
            model,
            input_width,
            input_height,
            person_class,
        })
    }

    /// Nearest-neighbour resize into a normalised NCHW RGB tensor.
    fn build_input(&self, frame: &Frame) -> Tensor {
        let in_w = self.input_width as usize;
        let in_h = self.input_height as usize;
        let sx = frame.width as f32 / in_w as f32;
        let sy = frame.height as f32 / in_h as f32;
        let bgr = frame.as_bgr();
        let stride = frame.width as usize * 3;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, in_h, in_w), |(_, c, y, x)| {
            let src_x = ((x as f32 * sx) as usize).min(frame.width as usize - 1);
            let src_y = ((y as f32 * sy) as usize).min(frame.height as usize - 1);
            // BGR in memory, RGB for the model.
            let idx = src_y * stride + src_x * 3 + (2 - c);
            bgr[idx] as f32 / 255.0
        });
        input.into_tensor()
    }

    fn decode(
        &self,
        outputs: TVec<TValue>,
        frame: &Frame,
        confidence_threshold: f32,
    ) -> Result<Vec<Detection>> {
        let output = outputs
            .first()
            .ok_or_else(|| Error::Detector("model produced no outputs".into()))?;
        let view = output
            .to_array_view::<f32>()
            .map_err(|e| Error::Detector(format!("model output tensor was not f32: {}", e)))?;
        let shape = view.shape().to_vec();
        if shape.len() != 3 || shape[2] < 5 + self.person_class + 1 {
            return Err(Error::Detector(format!(
                "unexpected model output shape {:?}",
                shape
            )));
        }

        let sx = frame.width as f32 / self.input_width as f32;
        let sy = frame.height as f32 / self.input_height as f32;
        let mut candidates = Vec::new();
        for row in 0..shape[1] {
            let objectness = view[[0, row, 4]];
            let class_score = view[[0, row, 5 + self.person_class]];
            let confidence = objectness * class_score;
            if confidence < confidence_threshold {
                continue;
            }
            let cx = view[[0, row, 0]] * sx;
            let cy = view[[0, row, 1]] * sy;
            let w = view[[0, row, 2]] * sx;
            let h = view[[0, row, 3]] * sy;
            if let Some(det) = clamp_to_frame(cx, cy, w, h, confidence, frame) {
                candidates.push(det);
            }
        }
        Ok(candidates)
    }
}

/// Box from a centre/size row, clipped to the frame. Degenerate or
/// non-finite rows give `None`.
fn clamp_to_frame(
    cx: f32,
    cy: f32,
    w: f32,
    h: f32,
    confidence: f32,
    frame: &Frame,
) -> Option<Detection> {
    if ![cx, cy, w, h].iter().all(|v| v.is_finite()) {
        return None;
    }
    let (fw, fh) = (frame.width as f32, frame.height as f32);
    let x0 = (cx - w / 2.0).clamp(0.0, fw);
    let y0 = (cy - h / 2.0).clamp(0.0, fh);
    let x1 = (cx + w / 2.0).clamp(0.0, fw);
    let y1 = (cy + h / 2.0).clamp(0.0, fh);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some(Detection::new(x0, y0, x1 - x0, y1 - y0, confidence))
}

impl PersonDetector for TractDetector {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(
        &mut self,
        frame: &Frame,
        confidence_threshold: f32,
        overlap_threshold: f32,
    ) -> Result<Vec<Detection>> {
        if frame.width == 0 || frame.height == 0 {
            return Err(Error::Detector("empty frame".into()));
        }
        let input = self.build_input(frame);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .map_err(|e| Error::Detector(format!("ONNX inference failed: {}", e)))?;
        let candidates = self.decode(outputs, frame, confidence_threshold)?;
        Ok(non_max_suppression(
            candidates,
            confidence_threshold,
            overlap_threshold,
        ))
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = Frame::black(self.input_width, self.input_height);
        self.detect(&blank, 1.0, 1.0).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boxes_are_clipped_to_the_frame() {
        let frame = Frame::black(64, 48);
        let det = clamp_to_frame(32.0, 24.0, 2e9, 2e9, 0.9, &frame).expect("overlaps frame");
        assert_eq!((det.x, det.y, det.w, det.h), (0.0, 0.0, 64.0, 48.0));
        assert!(clamp_to_frame(500.0, 24.0, 10.0, 10.0, 0.9, &frame).is_none());
        assert!(clamp_to_frame(f32::NAN, 24.0, 10.0, 10.0, 0.9, &frame).is_none());
    }
}
