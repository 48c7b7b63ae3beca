//! Timestamp Overlay
//!
//! Draws the capture time into the lower-right corner of an RGB frame
//! using a built-in 5x7 block glyph set. Scale and margin follow the
//! frame height so the stamp stays readable at any resolution. The
//! overlay is applied after the similarity decision, so stamp pixels
//! never influence future comparisons.

use chrono::{DateTime, Local};

use super::frame::{Frame, PixelLayout};

/// Glyph cell geometry in base (unscaled) pixels.
const GLYPH_WIDTH: u32 = 5;
const GLYPH_HEIGHT: u32 = 7;
const GLYPH_SPACING: u32 = 1;

/// Overlay `now` formatted with `format` onto the frame. Frames that are
/// not three-channel RGB are left untouched; the caller persists the
/// un-stamped raster in that case.
pub fn add_timestamp(frame: &mut Frame, now: &DateTime<Local>, format: &str) {
    if frame.layout != PixelLayout::Rgb || frame.is_empty() {
        return;
    }
    let text = now.format(format).to_string();

    let scale = block_scale(frame.height);
    let margin = (frame.height as f32 * 0.05).max(10.0) as u32;

    let text_width = text.chars().count() as u32 * (GLYPH_WIDTH + GLYPH_SPACING) * scale;
    let text_height = GLYPH_HEIGHT * scale;

    let org_x = frame.width.saturating_sub(text_width + margin);
    let org_y = frame.height.saturating_sub(text_height + margin);

    let mut cursor_x = org_x;
    for ch in text.chars() {
        draw_glyph(frame, ch, cursor_x, org_y, scale);
        cursor_x += (GLYPH_WIDTH + GLYPH_SPACING) * scale;
    }
}

/// Block scale proportional to frame height, minimum one pixel per cell.
fn block_scale(height: u32) -> u32 {
    let font_scale = (height as f32 / 1080.0).max(0.5);
    (font_scale * 3.0).round().max(1.0) as u32
}

/// Blit one glyph at the given origin. Out-of-bounds cells are skipped.
fn draw_glyph(frame: &mut Frame, ch: char, origin_x: u32, origin_y: u32, scale: u32) {
    let rows = match glyph_rows(ch) {
        Some(rows) => rows,
        None => return, // unsupported character, leave a blank cell
    };
    for (row, bits) in rows.iter().enumerate() {
        for col in 0..GLYPH_WIDTH {
            if bits & (1 << (GLYPH_WIDTH - 1 - col)) == 0 {
                continue;
            }
            for sy in 0..scale {
                for sx in 0..scale {
                    let x = origin_x + col * scale + sx;
                    let y = origin_y + row as u32 * scale + sy;
                    put_white(frame, x, y);
                }
            }
        }
    }
}

fn put_white(frame: &mut Frame, x: u32, y: u32) {
    if x >= frame.width || y >= frame.height {
        return;
    }
    let idx = ((y * frame.width + x) * 3) as usize;
    if idx + 2 < frame.data.len() {
        frame.data[idx] = 255;
        frame.data[idx + 1] = 255;
        frame.data[idx + 2] = 255;
    }
}

/// 5x7 bitmap rows for the characters a timestamp can contain.
fn glyph_rows(ch: char) -> Option<[u8; 7]> {
    let rows = match ch {
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11111, 0b00010, 0b00100, 0b00010, 0b00001, 0b10001, 0b01110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        ':' => [0b00000, 0b00100, 0b00100, 0b00000, 0b00100, 0b00100, 0b00000],
        '/' => [0b00001, 0b00010, 0b00010, 0b00100, 0b01000, 0b01000, 0b10000],
        '-' => [0b00000, 0b00000, 0b00000, 0b11111, 0b00000, 0b00000, 0b00000],
        '.' => [0b00000, 0b00000, 0b00000, 0b00000, 0b00000, 0b00100, 0b00100],
        ' ' => [0b00000; 7],
        _ => return None,
    };
    Some(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn black_rgb(width: u32, height: u32) -> Frame {
        Frame::new(
            width,
            height,
            PixelLayout::Rgb,
            vec![0; (width * height * 3) as usize],
        )
    }

    #[test]
    fn test_stamp_writes_into_lower_right() {
        let mut frame = black_rgb(320, 240);
        let now = Local.with_ymd_and_hms(2024, 3, 7, 12, 34, 56).unwrap();

        add_timestamp(&mut frame, &now, "%H:%M:%S");

        // Something lit up, and only in the lower half.
        let lit: Vec<usize> = frame
            .data
            .iter()
            .enumerate()
            .filter(|(_, &v)| v != 0)
            .map(|(i, _)| i)
            .collect();
        assert!(!lit.is_empty());
        let first_row = lit[0] / 3 / 320;
        assert!(first_row > 120);
    }

    #[test]
    fn test_stamp_skips_non_rgb_frames() {
        let mut frame = Frame::new(64, 64, PixelLayout::Gray, vec![0; 64 * 64]);
        let now = Local.with_ymd_and_hms(2024, 3, 7, 12, 34, 56).unwrap();

        add_timestamp(&mut frame, &now, "%H:%M:%S");

        assert!(frame.data.iter().all(|&v| v == 0));
    }

    #[test]
    fn test_stamp_survives_tiny_frames() {
        // Text wider than the frame must not panic or write out of bounds.
        let mut frame = black_rgb(8, 8);
        let now = Local.with_ymd_and_hms(2024, 3, 7, 12, 34, 56).unwrap();
        add_timestamp(&mut frame, &now, "%Y/%m/%d %H:%M:%S");
        assert_eq!(frame.data.len(), 8 * 8 * 3);
    }

    #[test]
    fn test_scale_grows_with_height() {
        assert_eq!(block_scale(240), 2);
        assert_eq!(block_scale(1080), 3);
        assert!(block_scale(2160) > block_scale(1080));
    }
}
