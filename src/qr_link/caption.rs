//! Bitmap caption drawn under the QR code

use image::{Rgba, RgbaImage};

const GLYPH_W: u32 = 5;
const GLYPH_H: u32 = 7;

/// 5x7 rows, MSB = leftmost column
fn glyph(c: char) -> [u8; 7] {
    match c {
        'S' => [0b01110, 0b10001, 0b10000, 0b01110, 0b00001, 0b10001, 0b01110],
        'a' => [0, 0, 0b01110, 0b00001, 0b01111, 0b10001, 0b01111],
        'c' => [0, 0, 0b01110, 0b10000, 0b10000, 0b10001, 0b01110],
        'e' => [0, 0, 0b01110, 0b10001, 0b11111, 0b10000, 0b01110],
        'm' => [0, 0, 0b11010, 0b10101, 0b10101, 0b10101, 0b10101],
        'n' => [0, 0, 0b10110, 0b11001, 0b10001, 0b10001, 0b10001],
        _ => [0; 7],
    }
}

/// Width in pixels of `text` at `scale`
pub(crate) fn text_width(text: &str, scale: u32) -> u32 {
    let n = text.chars().count() as u32;
    if n == 0 {
        return 0;
    }
    n * (GLYPH_W + 1) * scale - scale
}

/// Draw bold text centred on `center_x` with its baseline at `baseline_y`.
/// Pixels outside the canvas are clipped.
pub(crate) fn draw_text(
    canvas: &mut RgbaImage,
    text: &str,
    center_x: u32,
    baseline_y: u32,
    scale: u32,
    color: Rgba<u8>,
) {
    let width = text_width(text, scale) as i64;
    let mut x0 = center_x as i64 - width / 2;
    let top = baseline_y as i64 - (GLYPH_H * scale) as i64;

    for c in text.chars() {
        let rows = glyph(c);
        for (row, bits) in rows.iter().enumerate() {
            for col in 0..GLYPH_W {
                if bits & (1 << (GLYPH_W - 1 - col)) == 0 {
                    continue;
                }
                let px = x0 + (col * scale) as i64;
                let py = top + (row as u32 * scale) as i64;
                // +1 column for a bold stroke
                fill(canvas, px, py, scale + 1, scale, color);
            }
        }
        x0 += ((GLYPH_W + 1) * scale) as i64;
    }
}

fn fill(canvas: &mut RgbaImage, x: i64, y: i64, w: u32, h: u32, color: Rgba<u8>) {
    let (cw, ch) = canvas.dimensions();
    for dy in 0..h as i64 {
        for dx in 0..w as i64 {
            let (px, py) = (x + dx, y + dy);
            if px >= 0 && py >= 0 && (px as u32) < cw && (py as u32) < ch {
                canvas.put_pixel(px as u32, py as u32, color);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_width() {
        assert_eq!(text_width("", 3), 0);
        assert_eq!(text_width("S", 3), 15);
        assert_eq!(text_width("Scan me", 3), 7 * 18 - 3);
    }

    #[test]
    fn test_draw_text_clips_and_paints() {
        let white = Rgba([255, 255, 255, 255]);
        let black = Rgba([0, 0, 0, 255]);
        let mut canvas = RgbaImage::from_pixel(40, 30, white);
        draw_text(&mut canvas, "Scan me", 20, 25, 3, black);
        assert!(canvas.pixels().any(|p| *p == black));
    }
}
