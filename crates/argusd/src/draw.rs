//! Frame annotation: boxes and labels over recognized faces, and JPEG
//! encoding for the output stream.

use crate::engine::FaceHit;
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use std::io::Cursor;

const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
const RED: Rgb<u8> = Rgb([255, 0, 0]);

const GLYPH_WIDTH: usize = 5;
const GLYPH_HEIGHT: u32 = 7;
const GLYPH_SCALE: u32 = 2;

/// Draw a box and label for each face hit. Known faces are green, unknown
/// red, matching the usual overlay convention.
pub fn annotate(image: &mut RgbImage, hits: &[FaceHit]) {
    for hit in hits {
        let color = if hit.result.is_match() { GREEN } else { RED };

        let x = hit.bbox.x.max(0.0) as i32;
        let y = hit.bbox.y.max(0.0) as i32;
        let w = hit.bbox.width.max(1.0) as u32;
        let h = hit.bbox.height.max(1.0) as u32;

        // Two nested rects give a 2px border.
        draw_hollow_rect_mut(image, Rect::at(x, y).of_size(w, h), color);
        if w > 2 && h > 2 {
            draw_hollow_rect_mut(image, Rect::at(x + 1, y + 1).of_size(w - 2, h - 2), color);
        }

        let label = hit.result.label_or_unknown();
        let label_y = (y - (GLYPH_HEIGHT * GLYPH_SCALE) as i32 - 4).max(0);
        draw_label(image, label, x, label_y, color);
    }
}

/// Encode an RGB image as JPEG at the given quality.
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    let mut out = Cursor::new(Vec::new());
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, quality);
    image.write_with_encoder(encoder)?;
    Ok(out.into_inner())
}

/// Render `text` with the built-in 5x7 font at 2x scale.
///
/// Lowercase is folded to uppercase; anything outside the glyph set draws
/// as '?'. Good enough for labels, no font file needed.
fn draw_label(image: &mut RgbImage, text: &str, x: i32, y: i32, color: Rgb<u8>) {
    let mut pen_x = x;
    for ch in text.chars() {
        let glyph = glyph_for(ch.to_ascii_uppercase());
        for (col, bits) in glyph.iter().enumerate() {
            for row in 0..GLYPH_HEIGHT {
                if bits & (1 << row) == 0 {
                    continue;
                }
                for dx in 0..GLYPH_SCALE {
                    for dy in 0..GLYPH_SCALE {
                        let px = pen_x + (col as u32 * GLYPH_SCALE + dx) as i32;
                        let py = y + (row * GLYPH_SCALE + dy) as i32;
                        if px >= 0
                            && py >= 0
                            && (px as u32) < image.width()
                            && (py as u32) < image.height()
                        {
                            image.put_pixel(px as u32, py as u32, color);
                        }
                    }
                }
            }
        }
        pen_x += ((GLYPH_WIDTH as u32 + 1) * GLYPH_SCALE) as i32;
    }
}

/// 5x7 column-major bitmap for a character, LSB = top row.
fn glyph_for(ch: char) -> [u8; GLYPH_WIDTH] {
    match ch {
        'A' => [0x7E, 0x11, 0x11, 0x11, 0x7E],
        'B' => [0x7F, 0x49, 0x49, 0x49, 0x36],
        'C' => [0x3E, 0x41, 0x41, 0x41, 0x22],
        'D' => [0x7F, 0x41, 0x41, 0x22, 0x1C],
        'E' => [0x7F, 0x49, 0x49, 0x49, 0x41],
        'F' => [0x7F, 0x09, 0x09, 0x09, 0x01],
        'G' => [0x3E, 0x41, 0x49, 0x49, 0x7A],
        'H' => [0x7F, 0x08, 0x08, 0x08, 0x7F],
        'I' => [0x00, 0x41, 0x7F, 0x41, 0x00],
        'J' => [0x20, 0x40, 0x41, 0x3F, 0x01],
        'K' => [0x7F, 0x08, 0x14, 0x22, 0x41],
        'L' => [0x7F, 0x40, 0x40, 0x40, 0x40],
        'M' => [0x7F, 0x02, 0x0C, 0x02, 0x7F],
        'N' => [0x7F, 0x04, 0x08, 0x10, 0x7F],
        'O' => [0x3E, 0x41, 0x41, 0x41, 0x3E],
        'P' => [0x7F, 0x09, 0x09, 0x09, 0x06],
        'Q' => [0x3E, 0x41, 0x51, 0x21, 0x5E],
        'R' => [0x7F, 0x09, 0x19, 0x29, 0x46],
        'S' => [0x46, 0x49, 0x49, 0x49, 0x31],
        'T' => [0x01, 0x01, 0x7F, 0x01, 0x01],
        'U' => [0x3F, 0x40, 0x40, 0x40, 0x3F],
        'V' => [0x1F, 0x20, 0x40, 0x20, 0x1F],
        'W' => [0x3F, 0x40, 0x38, 0x40, 0x3F],
        'X' => [0x63, 0x14, 0x08, 0x14, 0x63],
        'Y' => [0x07, 0x08, 0x70, 0x08, 0x07],
        'Z' => [0x61, 0x51, 0x49, 0x45, 0x43],
        '0' => [0x3E, 0x51, 0x49, 0x45, 0x3E],
        '1' => [0x00, 0x42, 0x7F, 0x40, 0x00],
        '2' => [0x42, 0x61, 0x51, 0x49, 0x46],
        '3' => [0x21, 0x41, 0x45, 0x4B, 0x31],
        '4' => [0x18, 0x14, 0x12, 0x7F, 0x10],
        '5' => [0x27, 0x45, 0x45, 0x45, 0x39],
        '6' => [0x3C, 0x4A, 0x49, 0x49, 0x30],
        '7' => [0x01, 0x71, 0x09, 0x05, 0x03],
        '8' => [0x36, 0x49, 0x49, 0x49, 0x36],
        '9' => [0x06, 0x49, 0x49, 0x29, 0x1E],
        ' ' => [0x00, 0x00, 0x00, 0x00, 0x00],
        '-' => [0x08, 0x08, 0x08, 0x08, 0x08],
        '_' => [0x40, 0x40, 0x40, 0x40, 0x40],
        _ => [0x02, 0x01, 0x51, 0x09, 0x06],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argus_core::{BoundingBox, MatchResult};

    fn hit(label: Option<&str>) -> FaceHit {
        FaceHit {
            bbox: BoundingBox {
                x: 40.0,
                y: 40.0,
                width: 50.0,
                height: 50.0,
                confidence: 0.9,
            },
            result: match label {
                Some(l) => MatchResult {
                    label: Some(l.to_string()),
                    distance: 0.3,
                },
                None => MatchResult::unknown(),
            },
        }
    }

    #[test]
    fn test_annotate_draws_green_border_for_match() {
        let mut img = RgbImage::new(160, 160);
        annotate(&mut img, &[hit(Some("alice"))]);
        assert_eq!(*img.get_pixel(40, 40), GREEN);
        assert_eq!(*img.get_pixel(89, 89), GREEN);
        // Interior stays black.
        assert_eq!(*img.get_pixel(65, 65), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_annotate_draws_red_for_unknown() {
        let mut img = RgbImage::new(160, 160);
        annotate(&mut img, &[hit(None)]);
        assert_eq!(*img.get_pixel(40, 40), RED);
    }

    #[test]
    fn test_label_sets_pixels_above_box() {
        let mut img = RgbImage::new(160, 160);
        annotate(&mut img, &[hit(Some("alice"))]);
        let above: u32 = (0..40)
            .flat_map(|y| (0..160).map(move |x| (x, y)))
            .filter(|&(x, y)| *img.get_pixel(x, y) == GREEN)
            .count() as u32;
        assert!(above > 0, "label should render above the box");
    }

    #[test]
    fn test_encode_jpeg_produces_jpeg_magic() {
        let img = RgbImage::new(32, 32);
        let jpeg = encode_jpeg(&img, 80).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        assert_eq!(&jpeg[jpeg.len() - 2..], &[0xFF, 0xD9]);
    }

    #[test]
    fn test_label_near_top_edge_is_clamped() {
        let mut img = RgbImage::new(160, 160);
        let mut h = hit(Some("bob"));
        h.bbox.y = 2.0;
        annotate(&mut img, &[h]);
        // Must not panic; just verify the box is present.
        assert_eq!(*img.get_pixel(40, 2), GREEN);
    }
}
