//! Annotated attendance images: boxes and labels drawn over the photo.

use crate::types::{DetectedFace, MatchResult};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

const RECOGNIZED_COLOUR: Rgb<u8> = Rgb([0, 200, 0]);
const UNKNOWN_COLOUR: Rgb<u8> = Rgb([220, 0, 0]);
const LABEL_TEXT_COLOUR: Rgb<u8> = Rgb([255, 255, 255]);

const GLYPH_WIDTH: u32 = 5;
const GLYPH_HEIGHT: u32 = 7;
const GLYPH_SPACING: u32 = 1;
const LABEL_PADDING: u32 = 2;

/// Draw every detection's box and label on a copy of `image`.
///
/// `faces` and `matches` are paired by index; extra entries on either side
/// are ignored.
pub fn render(image: &RgbImage, faces: &[DetectedFace], matches: &[MatchResult]) -> RgbImage {
    let mut canvas = image.clone();
    let scale = text_scale(image.width());
    let thickness = scale.max(2);

    for (face, result) in faces.iter().zip(matches) {
        let colour = if result.is_known() {
            RECOGNIZED_COLOUR
        } else {
            UNKNOWN_COLOUR
        };
        let Some(rect) = clip_rect(
            &canvas,
            face.region.x,
            face.region.y,
            face.region.width,
            face.region.height,
        ) else {
            tracing::debug!(region = ?face.region, "face box lies outside the photo; not drawn");
            continue;
        };

        for inset in 0..thickness as i32 {
            let w = rect.width() as i32 - 2 * inset;
            let h = rect.height() as i32 - 2 * inset;
            if w <= 0 || h <= 0 {
                break;
            }
            let inner =
                Rect::at(rect.left() + inset, rect.top() + inset).of_size(w as u32, h as u32);
            draw_hollow_rect_mut(&mut canvas, inner, colour);
        }

        draw_label(&mut canvas, &rect, result.label(), colour, scale);
    }

    canvas
}

/// Glyph scale so labels stay legible on large classroom photos.
fn text_scale(image_width: u32) -> u32 {
    (image_width / 320).clamp(1, 6)
}

/// Intersect a float box with the image bounds. `None` if nothing is visible.
fn clip_rect(image: &RgbImage, x: f32, y: f32, width: f32, height: f32) -> Option<Rect> {
    if !(x.is_finite() && y.is_finite() && width.is_finite() && height.is_finite()) {
        return None;
    }
    let x0 = x.floor().max(0.0) as i64;
    let y0 = y.floor().max(0.0) as i64;
    let x1 = ((x + width).ceil() as i64).min(image.width() as i64);
    let y1 = ((y + height).ceil() as i64).min(image.height() as i64);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some(Rect::at(x0 as i32, y0 as i32).of_size((x1 - x0) as u32, (y1 - y0) as u32))
}

/// Filled strip with the label text, above the box when it fits, else inside
/// its top edge.
fn draw_label(canvas: &mut RgbImage, face: &Rect, text: &str, background: Rgb<u8>, scale: u32) {
    let text = text.to_ascii_uppercase();
    let chars = text.chars().count() as u32;
    if chars == 0 {
        return;
    }
    let text_w = chars * (GLYPH_WIDTH + GLYPH_SPACING) * scale - GLYPH_SPACING * scale;
    let strip_w = (text_w + 2 * LABEL_PADDING * scale).min(canvas.width());
    let strip_h = (GLYPH_HEIGHT + 2 * LABEL_PADDING) * scale;
    if strip_h > canvas.height() {
        return;
    }

    let left = face.left().clamp(0, (canvas.width() - strip_w) as i32);
    let top = if face.top() >= strip_h as i32 {
        face.top() - strip_h as i32
    } else {
        face.top().min((canvas.height() - strip_h) as i32)
    };

    draw_filled_rect_mut(canvas, Rect::at(left, top).of_size(strip_w, strip_h), background);

    let mut pen_x = left + (LABEL_PADDING * scale) as i32;
    let pen_y = top + (LABEL_PADDING * scale) as i32;
    for c in text.chars() {
        draw_glyph(canvas, glyph(c), pen_x, pen_y, scale);
        pen_x += ((GLYPH_WIDTH + GLYPH_SPACING) * scale) as i32;
    }
}

fn draw_glyph(canvas: &mut RgbImage, rows: [u8; 7], x: i32, y: i32, scale: u32) {
    for (row, bits) in rows.iter().enumerate() {
        for col in 0..GLYPH_WIDTH {
            if bits & (1 << (GLYPH_WIDTH - 1 - col)) == 0 {
                continue;
            }
            for dy in 0..scale {
                for dx in 0..scale {
                    let px = x + (col * scale + dx) as i32;
                    let py = y + (row as u32 * scale + dy) as i32;
                    let inside = px >= 0
                        && py >= 0
                        && (px as u32) < canvas.width()
                        && (py as u32) < canvas.height();
                    if inside {
                        canvas.put_pixel(px as u32, py as u32, LABEL_TEXT_COLOUR);
                    }
                }
            }
        }
    }
}

/// 5×7 bitmap glyphs, one byte per row, most significant of the low five
/// bits is the leftmost column.
fn glyph(c: char) -> [u8; 7] {
    match c {
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1E],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A],
        'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x11, 0x0A, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        '_' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x1F],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        ' ' => [0x00; 7],
        _ => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x00, 0x04], // '?'
    }
}
