//! Raw RGB24 buffer operations shared by the locator and embedder.
//!
//! Bilinear resampling keeps sub-pixel accuracy when shrinking camera
//! frames to model input sizes.

use crate::types::BoundingBox;

/// Resize an RGB24 buffer with bilinear interpolation.
///
/// Panics are avoided by clamping sample coordinates to the source extent;
/// callers guarantee `src.len() >= src_w * src_h * 3`.
pub fn resize_rgb_bilinear(
    src: &[u8],
    src_w: usize,
    src_h: usize,
    dst_w: usize,
    dst_h: usize,
) -> Vec<u8> {
    if src_w == 0 || src_h == 0 || dst_w == 0 || dst_h == 0 {
        return Vec::new();
    }

    let scale_x = src_w as f32 / dst_w as f32;
    let scale_y = src_h as f32 / dst_h as f32;

    let mut dst = vec![0u8; dst_w * dst_h * 3];

    for y in 0..dst_h {
        let src_y = (y as f32 + 0.5) * scale_y - 0.5;
        let y0 = (src_y.floor() as i32).clamp(0, src_h as i32 - 1) as usize;
        let y1 = (y0 + 1).min(src_h - 1);
        let fy = (src_y - src_y.floor()).clamp(0.0, 1.0);

        for x in 0..dst_w {
            let src_x = (x as f32 + 0.5) * scale_x - 0.5;
            let x0 = (src_x.floor() as i32).clamp(0, src_w as i32 - 1) as usize;
            let x1 = (x0 + 1).min(src_w - 1);
            let fx = (src_x - src_x.floor()).clamp(0.0, 1.0);

            for c in 0..3 {
                let tl = src[(y0 * src_w + x0) * 3 + c] as f32;
                let tr = src[(y0 * src_w + x1) * 3 + c] as f32;
                let bl = src[(y1 * src_w + x0) * 3 + c] as f32;
                let br = src[(y1 * src_w + x1) * 3 + c] as f32;

                let val = tl * (1.0 - fx) * (1.0 - fy)
                    + tr * fx * (1.0 - fy)
                    + bl * (1.0 - fx) * fy
                    + br * fx * fy;

                dst[(y * dst_w + x) * 3 + c] = val.round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    dst
}

/// Crop a bounding box region from an RGB24 buffer.
///
/// The box is clamped to the frame before cropping. Returns the cropped
/// pixels and their dimensions, or `None` when the clamped region is empty.
pub fn crop_rgb(
    src: &[u8],
    src_w: usize,
    src_h: usize,
    bbox: &BoundingBox,
) -> Option<(Vec<u8>, usize, usize)> {
    let x0 = (bbox.x.floor().max(0.0) as usize).min(src_w);
    let y0 = (bbox.y.floor().max(0.0) as usize).min(src_h);
    let x1 = ((bbox.x + bbox.width).ceil().max(0.0) as usize).min(src_w);
    let y1 = ((bbox.y + bbox.height).ceil().max(0.0) as usize).min(src_h);

    if x1 <= x0 || y1 <= y0 {
        return None;
    }

    let crop_w = x1 - x0;
    let crop_h = y1 - y0;
    let mut out = Vec::with_capacity(crop_w * crop_h * 3);

    for y in y0..y1 {
        let row_start = (y * src_w + x0) * 3;
        out.extend_from_slice(&src[row_start..row_start + crop_w * 3]);
    }

    Some((out, crop_w, crop_h))
}
