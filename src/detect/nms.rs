use crate::detect::result::Detection;

/// Drop boxes below `confidence_threshold`, then greedily keep the most
/// confident box and suppress any remaining box whose IoU with a kept box
/// exceeds `overlap_threshold`.
///
/// Output is ordered by descending confidence.
pub fn non_max_suppression(
    mut candidates: Vec<Detection>,
    confidence_threshold: f32,
    overlap_threshold: f32,
) -> Vec<Detection> {
    candidates.retain(|d| d.confidence >= confidence_threshold);
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<Detection> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if kept
            .iter()
            .all(|k| k.iou(&candidate) <= overlap_threshold)
        {
            kept.push(candidate);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlapping_boxes_keep_the_most_confident() {
        let boxes = vec![
            Detection::new(0.0, 0.0, 10.0, 20.0, 0.6),
            Detection::new(1.0, 0.0, 10.0, 20.0, 0.9),
            Detection::new(100.0, 0.0, 10.0, 20.0, 0.7),
        ];
        let kept = non_max_suppression(boxes, 0.5, 0.45);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].x, 100.0);
    }

    #[test]
    fn low_confidence_boxes_are_dropped() {
        let boxes = vec![
            Detection::new(0.0, 0.0, 10.0, 20.0, 0.3),
            Detection::new(50.0, 0.0, 10.0, 20.0, 0.5),
        ];
        let kept = non_max_suppression(boxes, 0.5, 0.45);
        assert_eq!(kept, vec![Detection::new(50.0, 0.0, 10.0, 20.0, 0.5)]);
    }

    #[test]
    fn iou_of_disjoint_and_identical_boxes() {
        let a = Detection::new(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = Detection::new(20.0, 20.0, 10.0, 10.0, 1.0);
        assert_eq!(a.iou(&b), 0.0);
        assert_eq!(a.iou(&a), 1.0);
    }
}
