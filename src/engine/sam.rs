// SAM-family segmentation backend.
// Both catalog variants (`sam`, `sam_hf`) run the same way: ImageNet-normalized
// letterboxed input, mask logits out, thresholded and resampled back to the
// original image resolution.

use crate::engine::tensor::{Letterbox, OnnxPlan, letterbox, load_onnx_plan, to_normalized_tensor};
use crate::engine::{Device, EngineError, ModelName, Prediction, SegmentationMask, VisionModel};
use image::RgbImage;
use std::path::Path;
use tract_onnx::prelude::*;
use tract_onnx::prelude::tract_ndarray::{ArrayView2, Ix4};

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];
// Logit threshold; 0.0 corresponds to a 0.5 probability after sigmoid.
const MASK_THRESHOLD: f32 = 0.0;

pub struct SamSegmenter {
    model: ModelName,
    plan: OnnxPlan,
    input_size: u32,
}

impl SamSegmenter {
    pub fn load(model: ModelName, weights: &Path, _device: Device) -> Result<Self, EngineError> {
        let input_size = model.spec().input_size;
        let plan = load_onnx_plan(weights, input_size).map_err(|e| EngineError::ModelLoad {
            model,
            details: e.to_string(),
        })?;
        Ok(SamSegmenter {
            model,
            plan,
            input_size,
        })
    }
}

impl VisionModel for SamSegmenter {
    fn predict(&self, image: &RgbImage) -> Result<Vec<Prediction>, EngineError> {
        let (canvas, lb) = letterbox(image, self.input_size, [0, 0, 0]);
        let input = to_normalized_tensor(&canvas, IMAGENET_MEAN, IMAGENET_STD);

        let outputs = self
            .plan
            .run(tvec!(input.into()))
            .map_err(|e| EngineError::Inference {
                model: self.model,
                details: e.to_string(),
            })?;

        // Mask logits come out as [1, masks, h, w], usually at a reduced
        // resolution relative to the network input.
        let view = outputs[0]
            .to_array_view::<f32>()
            .and_then(|v| Ok(v.into_dimensionality::<Ix4>()?))
            .map_err(|e| EngineError::UnexpectedOutput {
                model: self.model,
                details: format!("expected [1, masks, h, w] f32 output: {}", e),
            })?;

        let mask_count = view.dim().1;
        let mut predictions = Vec::new();
        for n in 0..mask_count {
            let plane = view.index_axis(tract_ndarray::Axis(0), 0);
            let plane = plane.index_axis(tract_ndarray::Axis(0), n);
            let mask = mask_from_logits(plane, &lb, MASK_THRESHOLD);
            // A mask that covers nothing after thresholding carries no
            // information worth rendering.
            if mask.coverage() > 0 {
                predictions.push(Prediction::Mask(mask));
            }
        }

        tracing::debug!(
            model = %self.model,
            raw_masks = mask_count,
            rendered_masks = predictions.len(),
            "decoded segmentation masks"
        );
        Ok(predictions)
    }
}

/// Thresholds one logit plane and resamples it (nearest neighbor) from the
/// letterboxed mask grid back to original image resolution.
pub(crate) fn mask_from_logits(
    logits: ArrayView2<'_, f32>,
    lb: &Letterbox,
    threshold: f32,
) -> SegmentationMask {
    let (mask_h, mask_w) = logits.dim();
    let mut data = vec![0u8; lb.orig_w as usize * lb.orig_h as usize];

    for y in 0..lb.orig_h {
        for x in 0..lb.orig_w {
            let (ix, iy) = lb.to_input(x as f32 + 0.5, y as f32 + 0.5);
            let mx = ((ix * mask_w as f32 / lb.size as f32) as usize).min(mask_w - 1);
            let my = ((iy * mask_h as f32 / lb.size as f32) as usize).min(mask_h - 1);
            if logits[[my, mx]] > threshold {
                data[y as usize * lb.orig_w as usize + x as usize] = 255;
            }
        }
    }

    SegmentationMask {
        width: lb.orig_w,
        height: lb.orig_h,
        data,
    }
}
