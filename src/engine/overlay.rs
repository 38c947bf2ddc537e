// Renders predictions back onto the input image: colored box outlines for
// detections, alpha-blended regions for masks. All coordinates are clamped;
// a malformed prediction degrades the drawing, never the process.

use crate::engine::{DetectedBox, Prediction, SegmentationMask};
use image::{Rgb, RgbImage};

const PALETTE: [[u8; 3]; 12] = [
    [230, 57, 70],
    [29, 53, 87],
    [42, 157, 143],
    [233, 196, 106],
    [244, 162, 97],
    [38, 70, 83],
    [144, 190, 109],
    [249, 132, 74],
    [87, 117, 144],
    [188, 71, 73],
    [106, 76, 147],
    [25, 130, 196],
];

const MASK_ALPHA: f32 = 0.45;
const OUTLINE_WIDTH: u32 = 2;

fn palette_color(index: usize) -> Rgb<u8> {
    Rgb(PALETTE[index % PALETTE.len()])
}

/// Composites every prediction onto a copy of `image`. Masks are blended
/// first so box outlines stay visible on top. With no predictions the copy
/// is returned untouched.
pub fn render_predictions(image: &RgbImage, predictions: &[Prediction]) -> RgbImage {
    let mut out = image.clone();

    let mut mask_index = 0usize;
    for prediction in predictions {
        if let Prediction::Mask(mask) = prediction {
            blend_mask(&mut out, mask, palette_color(mask_index));
            mask_index += 1;
        }
    }
    for prediction in predictions {
        if let Prediction::Box(detection) = prediction {
            draw_box_outline(&mut out, detection, palette_color(detection.class));
        }
    }

    out
}

fn blend_mask(image: &mut RgbImage, mask: &SegmentationMask, color: Rgb<u8>) {
    let (w, h) = image.dimensions();
    for y in 0..h.min(mask.height) {
        for x in 0..w.min(mask.width) {
            if mask.contains(x, y) {
                let px = image.get_pixel_mut(x, y);
                for c in 0..3 {
                    px[c] = ((1.0 - MASK_ALPHA) * px[c] as f32 + MASK_ALPHA * color[c] as f32)
                        .round() as u8;
                }
            }
        }
    }
}

fn draw_box_outline(image: &mut RgbImage, detection: &DetectedBox, color: Rgb<u8>) {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return;
    }
    let x1 = (detection.x1.max(0.0) as u32).min(w - 1);
    let y1 = (detection.y1.max(0.0) as u32).min(h - 1);
    let x2 = (detection.x2.max(0.0) as u32).min(w - 1);
    let y2 = (detection.y2.max(0.0) as u32).min(h - 1);
    if x2 <= x1 || y2 <= y1 {
        return;
    }

    for t in 0..OUTLINE_WIDTH {
        let top = (y1 + t).min(y2);
        let bottom = y2.saturating_sub(t).max(y1);
        for x in x1..=x2 {
            image.put_pixel(x, top, color);
            image.put_pixel(x, bottom, color);
        }

        let left = (x1 + t).min(x2);
        let right = x2.saturating_sub(t).max(x1);
        for y in y1..=y2 {
            image.put_pixel(left, y, color);
            image.put_pixel(right, y, color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank(w: u32, h: u32) -> RgbImage {
        RgbImage::from_pixel(w, h, Rgb([10, 10, 10]))
    }

    #[test]
    fn no_predictions_leaves_pixels_untouched() {
        let base = blank(16, 16);
        let rendered = render_predictions(&base, &[]);
        assert_eq!(base, rendered);
    }

    #[test]
    fn box_outline_colors_border_not_interior() {
        let base = blank(32, 32);
        let detection = Prediction::Box(DetectedBox {
            x1: 4.0,
            y1: 4.0,
            x2: 20.0,
            y2: 20.0,
            score: 0.9,
            class: 0,
        });
        let rendered = render_predictions(&base, &[detection]);
        let border = palette_color(0);
        assert_eq!(*rendered.get_pixel(4, 4), border);
        assert_eq!(*rendered.get_pixel(20, 12), border);
        assert_eq!(*rendered.get_pixel(12, 5), border); // second outline row
        assert_eq!(*rendered.get_pixel(12, 12), Rgb([10, 10, 10]));
    }

    #[test]
    fn out_of_bounds_box_is_clamped_not_panicking() {
        let base = blank(8, 8);
        let detection = Prediction::Box(DetectedBox {
            x1: -10.0,
            y1: -10.0,
            x2: 100.0,
            y2: 100.0,
            score: 0.9,
            class: 2,
        });
        let rendered = render_predictions(&base, &[detection]);
        assert_eq!(*rendered.get_pixel(0, 0), palette_color(2));
        assert_eq!(*rendered.get_pixel(7, 7), palette_color(2));
    }

    #[test]
    fn degenerate_box_is_skipped() {
        let base = blank(8, 8);
        let detection = Prediction::Box(DetectedBox {
            x1: 5.0,
            y1: 5.0,
            x2: 5.0,
            y2: 9.0,
            score: 0.9,
            class: 0,
        });
        let rendered = render_predictions(&base, &[detection]);
        assert_eq!(base, rendered);
    }

    #[test]
    fn mask_blends_only_covered_pixels() {
        let base = blank(4, 4);
        let mut data = vec![0u8; 16];
        data[0] = 255; // pixel (0, 0)
        let mask = Prediction::Mask(SegmentationMask {
            width: 4,
            height: 4,
            data,
        });
        let rendered = render_predictions(&base, &[mask]);
        assert_ne!(*rendered.get_pixel(0, 0), Rgb([10, 10, 10]));
        assert_eq!(*rendered.get_pixel(1, 0), Rgb([10, 10, 10]));
        assert_eq!(*rendered.get_pixel(3, 3), Rgb([10, 10, 10]));
    }

    #[test]
    fn mask_larger_than_image_is_clamped() {
        let base = blank(2, 2);
        let mask = Prediction::Mask(SegmentationMask {
            width: 8,
            height: 8,
            data: vec![255u8; 64],
        });
        // Must not panic; every pixel inside the image gets blended.
        let rendered = render_predictions(&base, &[mask]);
        assert_ne!(*rendered.get_pixel(1, 1), Rgb([10, 10, 10]));
    }
}
