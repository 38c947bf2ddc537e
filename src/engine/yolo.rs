// YOLOv8 detection backend.
// Runs the exported ONNX graph and decodes its `[1, 4 + classes, anchors]`
// output into confidence-filtered, NMS-deduplicated boxes in original image
// coordinates.

use crate::engine::tensor::{Letterbox, OnnxPlan, letterbox, load_onnx_plan, to_unit_tensor};
use crate::engine::{DetectedBox, Device, EngineError, ModelName, Prediction, VisionModel};
use image::RgbImage;
use std::path::Path;
use tract_onnx::prelude::*;
use tract_onnx::prelude::tract_ndarray::{ArrayView3, Ix3};

const CONF_THRESHOLD: f32 = 0.25;
const IOU_THRESHOLD: f32 = 0.45;
const MAX_DETECTIONS: usize = 100;
// YOLO letterbox convention pads with mid-gray.
const PAD_COLOR: [u8; 3] = [114, 114, 114];

pub const COCO_CLASSES: [&str; 80] = [
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
    "fire hydrant",
    "stop sign",
    "parking meter",
    "bench",
    "bird",
    "cat",
    "dog",
    "horse",
    "sheep",
    "cow",
    "elephant",
    "bear",
    "zebra",
    "giraffe",
    "backpack",
    "umbrella",
    "handbag",
    "tie",
    "suitcase",
    "frisbee",
    "skis",
    "snowboard",
    "sports ball",
    "kite",
    "baseball bat",
    "baseball glove",
    "skateboard",
    "surfboard",
    "tennis racket",
    "bottle",
    "wine glass",
    "cup",
    "fork",
    "knife",
    "spoon",
    "bowl",
    "banana",
    "apple",
    "sandwich",
    "orange",
    "broccoli",
    "carrot",
    "hot dog",
    "pizza",
    "donut",
    "cake",
    "chair",
    "couch",
    "potted plant",
    "bed",
    "dining table",
    "toilet",
    "tv",
    "laptop",
    "mouse",
    "remote",
    "keyboard",
    "cell phone",
    "microwave",
    "oven",
    "toaster",
    "sink",
    "refrigerator",
    "book",
    "clock",
    "vase",
    "scissors",
    "teddy bear",
    "hair drier",
    "toothbrush",
];

pub struct YoloDetector {
    model: ModelName,
    plan: OnnxPlan,
    input_size: u32,
}

impl YoloDetector {
    pub fn load(model: ModelName, weights: &Path, _device: Device) -> Result<Self, EngineError> {
        let input_size = model.spec().input_size;
        let plan = load_onnx_plan(weights, input_size).map_err(|e| EngineError::ModelLoad {
            model,
            details: e.to_string(),
        })?;
        Ok(YoloDetector {
            model,
            plan,
            input_size,
        })
    }
}

impl VisionModel for YoloDetector {
    fn predict(&self, image: &RgbImage) -> Result<Vec<Prediction>, EngineError> {
        let (canvas, lb) = letterbox(image, self.input_size, PAD_COLOR);
        let input = to_unit_tensor(&canvas);

        let outputs = self
            .plan
            .run(tvec!(input.into()))
            .map_err(|e| EngineError::Inference {
                model: self.model,
                details: e.to_string(),
            })?;

        let view = outputs[0]
            .to_array_view::<f32>()
            .and_then(|v| Ok(v.into_dimensionality::<Ix3>()?))
            .map_err(|e| EngineError::UnexpectedOutput {
                model: self.model,
                details: format!("expected [1, channels, anchors] f32 output: {}", e),
            })?;

        if view.dim().1 < 5 {
            return Err(EngineError::UnexpectedOutput {
                model: self.model,
                details: format!("output has {} channels, need at least 5", view.dim().1),
            });
        }

        let boxes = decode_detections(view, &lb, CONF_THRESHOLD, IOU_THRESHOLD, MAX_DETECTIONS);
        for b in &boxes {
            tracing::debug!(model = %self.model, label = b.label(), score = b.score, "detection");
        }
        Ok(boxes.into_iter().map(Prediction::Box).collect())
    }
}

/// Decodes raw head output `[1, 4 + classes, anchors]` (cx, cy, w, h followed
/// by per-class scores) into final boxes in original image coordinates.
pub(crate) fn decode_detections(
    view: ArrayView3<'_, f32>,
    lb: &Letterbox,
    conf_threshold: f32,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<DetectedBox> {
    let channels = view.dim().1;
    let anchors = view.dim().2;
    let classes = channels - 4;

    let mut candidates = Vec::new();
    for i in 0..anchors {
        let mut best_class = 0;
        let mut best_score = 0.0f32;
        for c in 0..classes {
            let score = view[[0, 4 + c, i]];
            if score > best_score {
                best_score = score;
                best_class = c;
            }
        }
        if best_score < conf_threshold {
            continue;
        }

        let cx = view[[0, 0, i]];
        let cy = view[[0, 1, i]];
        let w = view[[0, 2, i]];
        let h = view[[0, 3, i]];

        let (x1, y1) = lb.to_original(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = lb.to_original(cx + w / 2.0, cy + h / 2.0);
        if x2 <= x1 || y2 <= y1 {
            continue;
        }

        candidates.push(DetectedBox {
            x1,
            y1,
            x2,
            y2,
            score: best_score,
            class: best_class,
        });
    }

    let mut kept = non_max_suppression(candidates, iou_threshold);
    kept.truncate(max_detections);
    kept
}

/// Greedy per-class NMS. Input order does not matter; output is sorted by
/// descending score.
pub(crate) fn non_max_suppression(mut boxes: Vec<DetectedBox>, iou_threshold: f32) -> Vec<DetectedBox> {
    boxes.sort_by(|a, b| b.score.total_cmp(&a.score));
    let mut kept: Vec<DetectedBox> = Vec::new();
    for candidate in boxes {
        let suppressed = kept
            .iter()
            .any(|k| k.class == candidate.class && iou(k, &candidate) > iou_threshold);
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

pub(crate) fn iou(a: &DetectedBox, b: &DetectedBox) -> f32 {
    let ix1 = a.x1.max(b.x1);
    let iy1 = a.y1.max(b.y1);
    let ix2 = a.x2.min(b.x2);
    let iy2 = a.y2.min(b.y2);

    let iw = (ix2 - ix1).max(0.0);
    let ih = (iy2 - iy1).max(0.0);
    let intersection = iw * ih;

    let area_a = (a.x2 - a.x1) * (a.y2 - a.y1);
    let area_b = (b.x2 - b.x1) * (b.y2 - b.y1);
    let union = area_a + area_b - intersection;
    if union <= 0.0 { 0.0 } else { intersection / union }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tensor::letterbox;
    use image::RgbImage;
    use tract_onnx::prelude::tract_ndarray::Array3;

    fn boxed(x1: f32, y1: f32, x2: f32, y2: f32, score: f32, class: usize) -> DetectedBox {
        DetectedBox {
            x1,
            y1,
            x2,
            y2,
            score,
            class,
        }
    }

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let a = boxed(0.0, 0.0, 10.0, 10.0, 1.0, 0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = boxed(0.0, 0.0, 10.0, 10.0, 1.0, 0);
        let b = boxed(20.0, 20.0, 30.0, 30.0, 1.0, 0);
        assert_eq!(iou(&a, &b), 0.0);
    }

    #[test]
    fn nms_keeps_highest_scoring_overlap() {
        let strong = boxed(0.0, 0.0, 10.0, 10.0, 0.9, 3);
        let weak_overlap = boxed(1.0, 1.0, 11.0, 11.0, 0.5, 3);
        let other_class = boxed(1.0, 1.0, 11.0, 11.0, 0.5, 4);
        let kept = non_max_suppression(vec![weak_overlap, strong.clone(), other_class.clone()], 0.45);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0], strong);
        assert_eq!(kept[1], other_class);
    }

    #[test]
    fn nms_keeps_distant_boxes_of_same_class() {
        let a = boxed(0.0, 0.0, 10.0, 10.0, 0.9, 0);
        let b = boxed(50.0, 50.0, 60.0, 60.0, 0.8, 0);
        let kept = non_max_suppression(vec![a, b], 0.45);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn decode_filters_by_confidence_and_maps_to_original_coords() {
        // 2 classes, 2 anchors over a 64px input for a 128x128 source image
        // (letterbox scale 0.5).
        let source = RgbImage::new(128, 128);
        let (_, lb) = letterbox(&source, 64, [114, 114, 114]);

        let mut raw = Array3::<f32>::zeros((1, 6, 2));
        // Anchor 0: confident class-1 box centered at (32, 32), 16x16 in
        // input space.
        raw[[0, 0, 0]] = 32.0;
        raw[[0, 1, 0]] = 32.0;
        raw[[0, 2, 0]] = 16.0;
        raw[[0, 3, 0]] = 16.0;
        raw[[0, 5, 0]] = 0.8;
        // Anchor 1: below the confidence threshold.
        raw[[0, 0, 1]] = 10.0;
        raw[[0, 1, 1]] = 10.0;
        raw[[0, 2, 1]] = 4.0;
        raw[[0, 3, 1]] = 4.0;
        raw[[0, 4, 1]] = 0.1;

        let boxes = decode_detections(raw.view(), &lb, 0.25, 0.45, 100);
        assert_eq!(boxes.len(), 1);
        let b = &boxes[0];
        assert_eq!(b.class, 1);
        assert!((b.x1 - 48.0).abs() < 1.0);
        assert!((b.y1 - 48.0).abs() < 1.0);
        assert!((b.x2 - 80.0).abs() < 1.0);
        assert!((b.y2 - 80.0).abs() < 1.0);
    }

    #[test]
    fn decode_respects_max_detections() {
        let source = RgbImage::new(64, 64);
        let (_, lb) = letterbox(&source, 64, [114, 114, 114]);

        let mut raw = Array3::<f32>::zeros((1, 6, 5));
        for i in 0..5 {
            raw[[0, 0, i]] = 8.0 + 12.0 * i as f32;
            raw[[0, 1, i]] = 8.0;
            raw[[0, 2, i]] = 6.0;
            raw[[0, 3, i]] = 6.0;
            raw[[0, 4, i]] = 0.9;
        }
        let boxes = decode_detections(raw.view(), &lb, 0.25, 0.45, 2);
        assert_eq!(boxes.len(), 2);
    }
}
