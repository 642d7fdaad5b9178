//! Postprocessing Utilities
//!
//! Bounding box type, IoU and greedy non-maximum suppression for detection
//! results, plus drawing boxes onto an image for inspection.

use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use log::debug;

/// Detected bounding box in original-image coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetBox {
    /// Left edge
    pub x1: f32,
    /// Top edge
    pub y1: f32,
    /// Right edge
    pub x2: f32,
    /// Bottom edge
    pub y2: f32,
    /// Confidence score (0.0 - 1.0)
    pub score: f32,
}

impl DetBox {
    /// Create new bounding box
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, score: f32) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            score,
        }
    }

    /// Box width, zero for degenerate boxes
    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    /// Box height, zero for degenerate boxes
    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    /// Calculate area
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Clamp corners to `[0, width] x [0, height]`
    pub fn clamp(self, width: f32, height: f32) -> Self {
        Self {
            x1: self.x1.clamp(0.0, width),
            y1: self.y1.clamp(0.0, height),
            x2: self.x2.clamp(0.0, width),
            y2: self.y2.clamp(0.0, height),
            score: self.score,
        }
    }

    /// Integer pixel rectangle covering the box, `None` when it has no extent
    pub fn to_rect(&self) -> Option<Rect> {
        let left = self.x1.floor() as i32;
        let top = self.y1.floor() as i32;
        let right = self.x2.ceil() as i32;
        let bottom = self.y2.ceil() as i32;
        if right <= left || bottom <= top {
            return None;
        }
        Some(Rect::at(left, top).of_size((right - left) as u32, (bottom - top) as u32))
    }
}

/// Intersection over union of two boxes
///
/// Returns 0 when the union has no area.
pub fn compute_iou(a: &DetBox, b: &DetBox) -> f32 {
    let x1 = a.x1.max(b.x1);
    let y1 = a.y1.max(b.y1);
    let x2 = a.x2.min(b.x2);
    let y2 = a.y2.min(b.y2);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = a.area() + b.area() - intersection;

    if union <= 0.0 {
        0.0
    } else {
        intersection / union
    }
}

/// Non-maximum suppression
///
/// Boxes are ranked by score descending; equal scores prefer the larger box,
/// then the earlier one. Each kept box removes every remaining box whose IoU
/// with it is at least `iou_threshold`. The result is sorted by rank.
/// Boxes with a NaN score are discarded.
pub fn nms(boxes: &[DetBox], iou_threshold: f32) -> Vec<DetBox> {
    let mut indices: Vec<usize> = (0..boxes.len())
        .filter(|&i| !boxes[i].score.is_nan())
        .collect();
    if indices.len() < boxes.len() {
        debug!("Discarding {} boxes with NaN scores", boxes.len() - indices.len());
    }
    if indices.is_empty() {
        return Vec::new();
    }

    indices.sort_by(|&a, &b| {
        boxes[b]
            .score
            .total_cmp(&boxes[a].score)
            .then_with(|| boxes[b].area().total_cmp(&boxes[a].area()))
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; boxes.len()];

    for (pos, &i) in indices.iter().enumerate() {
        if suppressed[i] {
            continue;
        }

        keep.push(boxes[i]);

        for &j in indices.iter().skip(pos + 1) {
            if !suppressed[j] && compute_iou(&boxes[i], &boxes[j]) >= iou_threshold {
                suppressed[j] = true;
            }
        }
    }

    keep
}

/// Draw box outlines onto a copy of the image
///
/// # Parameters
/// - `image`: Source image
/// - `boxes`: Boxes in image coordinates
/// - `thickness`: Outline width in pixels, drawn inward from the box edge
/// - `color`: Outline color
pub fn draw_boxes(image: &DynamicImage, boxes: &[DetBox], thickness: u32, color: Rgb<u8>) -> RgbImage {
    let mut canvas = image.to_rgb8();

    for det_box in boxes {
        let Some(rect) = det_box.to_rect() else {
            continue;
        };
        for inset in 0..thickness {
            let w = rect.width().saturating_sub(inset * 2);
            let h = rect.height().saturating_sub(inset * 2);
            if w == 0 || h == 0 {
                break;
            }
            let inner = Rect::at(rect.left() + inset as i32, rect.top() + inset as i32).of_size(w, h);
            draw_hollow_rect_mut(&mut canvas, inner, color);
        }
    }

    canvas
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_detbox_area() {
        let b = DetBox::new(0.0, 0.0, 100.0, 50.0, 0.9);
        assert_eq!(b.area(), 5000.0);

        // 退化框面积为 0
        let degenerate = DetBox::new(10.0, 10.0, 5.0, 20.0, 0.9);
        assert_eq!(degenerate.area(), 0.0);
    }

    #[test]
    fn test_detbox_clamp() {
        let b = DetBox::new(-5.0, -1.0, 120.0, 40.0, 0.5).clamp(100.0, 30.0);
        assert_eq!(b, DetBox::new(0.0, 0.0, 100.0, 30.0, 0.5));
    }

    #[test]
    fn test_detbox_to_rect() {
        let rect = DetBox::new(1.5, 2.2, 10.1, 8.0, 0.9).to_rect().unwrap();
        assert_eq!(rect.left(), 1);
        assert_eq!(rect.top(), 2);
        assert_eq!(rect.width(), 10);
        assert_eq!(rect.height(), 6);

        assert!(DetBox::new(5.0, 5.0, 5.0, 9.0, 0.9).to_rect().is_none());
    }

    #[test]
    fn test_compute_iou() {
        let a = DetBox::new(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = DetBox::new(5.0, 5.0, 15.0, 15.0, 1.0);

        let iou = compute_iou(&a, &b);
        assert!(iou > 0.0 && iou < 1.0);

        // 不相交
        let c = DetBox::new(100.0, 100.0, 110.0, 110.0, 1.0);
        assert_eq!(compute_iou(&a, &c), 0.0);

        // 完全重叠
        assert_eq!(compute_iou(&a, &a), 1.0);
    }

    #[test]
    fn test_compute_iou_partial_overlap() {
        let a = DetBox::new(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = DetBox::new(5.0, 0.0, 15.0, 10.0, 1.0);

        // 交集 50，并集 150
        let iou = compute_iou(&a, &b);
        assert!((iou - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_compute_iou_zero_union() {
        let a = DetBox::new(3.0, 3.0, 3.0, 3.0, 1.0);
        assert_eq!(compute_iou(&a, &a), 0.0);
    }

    #[test]
    fn test_nms_suppresses_overlap() {
        let boxes = vec![
            DetBox::new(0.0, 0.0, 10.0, 10.0, 0.8),
            DetBox::new(1.0, 1.0, 11.0, 11.0, 0.9),
        ];
        let result = nms(&boxes, 0.45);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].score, 0.9);
    }

    #[test]
    fn test_nms_keeps_low_overlap() {
        let boxes = vec![
            DetBox::new(0.0, 0.0, 10.0, 10.0, 0.9),
            DetBox::new(5.0, 0.0, 15.0, 10.0, 0.8),
        ];
        // IoU ≈ 0.333 < 0.45
        let result = nms(&boxes, 0.45);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].score, 0.9);
        assert_eq!(result[1].score, 0.8);
    }

    #[test]
    fn test_nms_threshold_is_inclusive() {
        let a = DetBox::new(0.0, 0.0, 10.0, 10.0, 0.9);
        let b = DetBox::new(5.0, 0.0, 15.0, 10.0, 0.8);
        let iou = compute_iou(&a, &b);

        assert_eq!(nms(&[a, b], iou).len(), 1);
    }

    #[test]
    fn test_nms_tie_prefers_larger_then_earlier() {
        let small = DetBox::new(0.0, 0.0, 10.0, 10.0, 0.5);
        let large = DetBox::new(0.0, 0.0, 11.0, 11.0, 0.5);
        let result = nms(&[small, large], 0.45);
        assert_eq!(result, vec![large]);

        let first = DetBox::new(0.0, 0.0, 10.0, 10.0, 0.5);
        let second = DetBox::new(1.0, 0.0, 11.0, 10.0, 0.5);
        let result = nms(&[first, second], 0.45);
        assert_eq!(result, vec![first]);
    }

    #[test]
    fn test_nms_discards_nan_scores() {
        let boxes: Vec<DetBox> = (0..200)
            .map(|i| {
                let offset = (i % 20) as f32 * 30.0;
                let score = if i % 7 == 0 {
                    f32::NAN
                } else {
                    ((i * 37) % 100) as f32 / 100.0
                };
                DetBox::new(offset, 0.0, offset + 20.0, 20.0, score)
            })
            .collect();

        let kept = nms(&boxes, 0.45);
        assert!(!kept.is_empty());
        assert!(kept.iter().all(|b| !b.score.is_nan()));
        for pair in kept.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }

        let only_nan = vec![DetBox::new(0.0, 0.0, 10.0, 10.0, f32::NAN)];
        assert!(nms(&only_nan, 0.45).is_empty());
    }

    #[test]
    fn test_nms_empty() {
        let boxes: Vec<DetBox> = vec![];
        assert!(nms(&boxes, 0.45).is_empty());
    }

    #[test]
    fn test_draw_boxes() {
        let img = DynamicImage::new_rgb8(50, 50);
        let boxes = vec![DetBox::new(10.0, 10.0, 30.0, 30.0, 0.9)];
        let red = Rgb([255, 0, 0]);

        let canvas = draw_boxes(&img, &boxes, 2, red);
        assert_eq!(canvas.dimensions(), (50, 50));
        assert_eq!(*canvas.get_pixel(10, 10), red);
        assert_eq!(*canvas.get_pixel(11, 20), red);
        // 边框只有 2 像素宽，内部不着色
        assert_eq!(*canvas.get_pixel(20, 20), Rgb([0, 0, 0]));
    }

    fn det_box_strategy() -> impl Strategy<Value = DetBox> {
        (0.0f32..200.0, 0.0f32..200.0, 1.0f32..80.0, 1.0f32..80.0, 0.0f32..1.0)
            .prop_map(|(x, y, w, h, s)| DetBox::new(x, y, x + w, y + h, s))
    }

    proptest! {
        #[test]
        fn prop_nms_sorted_and_separated(
            boxes in prop::collection::vec(det_box_strategy(), 0..40),
            threshold in 0.1f32..0.9,
        ) {
            let kept = nms(&boxes, threshold);

            prop_assert!(kept.len() <= boxes.len());
            for pair in kept.windows(2) {
                prop_assert!(pair[0].score >= pair[1].score);
            }
            for (i, a) in kept.iter().enumerate() {
                for b in kept.iter().skip(i + 1) {
                    prop_assert!(compute_iou(a, b) < threshold);
                }
            }
        }

        #[test]
        fn prop_iou_bounded_and_symmetric(a in det_box_strategy(), b in det_box_strategy()) {
            let ab = compute_iou(&a, &b);
            prop_assert!((0.0..=1.0 + 1e-6).contains(&ab));
            prop_assert!((ab - compute_iou(&b, &a)).abs() < 1e-6);
        }

        #[test]
        fn prop_clamp_stays_in_bounds(
            b in det_box_strategy(),
            w in 1.0f32..150.0,
            h in 1.0f32..150.0,
        ) {
            let c = DetBox::new(b.x1 - 100.0, b.y1 - 100.0, b.x2, b.y2, b.score).clamp(w, h);
            prop_assert!(c.x1 >= 0.0 && c.x2 <= w);
            prop_assert!(c.y1 >= 0.0 && c.y2 <= h);
        }
    }
}
