// Image-to-tensor plumbing shared by the model backends: letterbox resizing
// into the square network input and CHW float tensor conversion.

use image::{Rgb, RgbImage, imageops::FilterType};
use std::path::Path;
use tract_onnx::prelude::*;
use tract_onnx::prelude::tract_ndarray::Array4;

/// An optimized, runnable ONNX graph pinned to a fixed NCHW input shape.
pub type OnnxPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Loads an ONNX graph from the zoo and binds it to a `[1, 3, size, size]`
/// f32 input, optimized for the host.
pub fn load_onnx_plan(path: &Path, input_size: u32) -> TractResult<OnnxPlan> {
    let size = input_size as usize;
    tract_onnx::onnx()
        .model_for_path(path)?
        .with_input_fact(0, f32::fact([1, 3, size, size]).into())?
        .into_optimized()?
        .into_runnable()
}

/// Geometry of a letterbox transform. The source image is scaled so its long
/// side equals `size`, anchored at the top-left of the padded square canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub scaled_w: u32,
    pub scaled_h: u32,
    pub size: u32,
    pub orig_w: u32,
    pub orig_h: u32,
}

impl Letterbox {
    /// Maps a point in network input coordinates back to original image
    /// coordinates, clamped to the image bounds.
    pub fn to_original(&self, x: f32, y: f32) -> (f32, f32) {
        let ox = (x / self.scale).clamp(0.0, (self.orig_w.saturating_sub(1)) as f32);
        let oy = (y / self.scale).clamp(0.0, (self.orig_h.saturating_sub(1)) as f32);
        (ox, oy)
    }

    /// Maps a point in original image coordinates into network input
    /// coordinates.
    pub fn to_input(&self, x: f32, y: f32) -> (f32, f32) {
        (x * self.scale, y * self.scale)
    }
}

/// Scales `image` into a `size`x`size` canvas filled with `pad`, preserving
/// aspect ratio, and returns the canvas together with the transform geometry.
pub fn letterbox(image: &RgbImage, size: u32, pad: [u8; 3]) -> (RgbImage, Letterbox) {
    let (orig_w, orig_h) = image.dimensions();
    let scale = size as f32 / orig_w.max(orig_h) as f32;
    let scaled_w = ((orig_w as f32 * scale).round() as u32).clamp(1, size);
    let scaled_h = ((orig_h as f32 * scale).round() as u32).clamp(1, size);

    let resized = image::imageops::resize(image, scaled_w, scaled_h, FilterType::Triangle);
    let mut canvas = RgbImage::from_pixel(size, size, Rgb(pad));
    image::imageops::replace(&mut canvas, &resized, 0, 0);

    (
        canvas,
        Letterbox {
            scale,
            scaled_w,
            scaled_h,
            size,
            orig_w,
            orig_h,
        },
    )
}

/// NCHW tensor with channels scaled to 0..1.
pub fn to_unit_tensor(image: &RgbImage) -> Tensor {
    let (w, h) = image.dimensions();
    Array4::from_shape_fn((1, 3, h as usize, w as usize), |(_, c, y, x)| {
        image.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
    })
    .into()
}

/// NCHW tensor normalized per channel with `(v / 255 - mean) / std`.
pub fn to_normalized_tensor(image: &RgbImage, mean: [f32; 3], std: [f32; 3]) -> Tensor {
    let (w, h) = image.dimensions();
    Array4::from_shape_fn((1, 3, h as usize, w as usize), |(_, c, y, x)| {
        let v = image.get_pixel(x as u32, y as u32)[c] as f32 / 255.0;
        (v - mean[c]) / std[c]
    })
    .into()
}
