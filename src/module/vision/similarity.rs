//! Frame Similarity Decision
//!
//! Decides whether a freshly captured frame changed enough from the last
//! retained one to be worth persisting. The pipeline is: optional
//! downsample, grayscale, absolute difference, binarize, dilate, extract
//! connected regions, and compare the significant changed area against
//! the configured threshold. Every degenerate input resolves to "not
//! similar" so that a broken comparison never drops data.

use image::imageops::{self, FilterType};
use image::GrayImage;

use super::frame::Frame;
use crate::module::define::similarity::{
    DILATE_ITERATIONS, DILATE_KERNEL_SIZE, MAX_COMPARE_WIDTH, MIN_REGION_AREA,
    PIXEL_DIFF_THRESHOLD,
};

/// Whether `curr` is similar enough to `prev` to skip persisting it.
///
/// # Arguments
///
/// * `prev` - The last significant frame, if any. `None` means the very
///   first frame, which is never similar.
/// * `curr` - The frame under consideration.
/// * `threshold_int` - Diff-rate threshold in 1/100 percent units
///   (e.g. 100 means a change of up to 1.0% of the area is "similar").
///
pub fn similar(prev: Option<&Frame>, curr: &Frame, threshold_int: u32) -> bool {
    let prev = match prev {
        Some(f) => f,
        None => return false,
    };
    if prev.is_empty() || curr.is_empty() {
        return false;
    }
    match diff_rate_percent(prev, curr) {
        Some(rate) => {
            let limit = threshold_int as f64 / 100.0;
            log::debug!(
                "similarity: diff rate {:.4}% vs limit {:.4}%",
                rate,
                limit
            );
            rate <= limit
        }
        // Comparison impossible; err toward persisting.
        None => false,
    }
}

/// Changed-area percentage between two frames, or `None` when the frames
/// cannot be compared (unknown layout, degenerate shape).
pub fn diff_rate_percent(a: &Frame, b: &Frame) -> Option<f64> {
    let mut gray_a = a.to_luma()?;
    let mut gray_b = b.to_luma()?;

    // Downsample proportionally to bound CPU cost; persistence is
    // unaffected because only the decision leaves this function.
    if gray_a.width() > MAX_COMPARE_WIDTH {
        gray_a = shrink_to_width(&gray_a, MAX_COMPARE_WIDTH)?;
    }
    if gray_b.width() > MAX_COMPARE_WIDTH {
        gray_b = shrink_to_width(&gray_b, MAX_COMPARE_WIDTH)?;
    }

    // Align the second frame to the first.
    if gray_a.dimensions() != gray_b.dimensions() {
        gray_b = imageops::resize(
            &gray_b,
            gray_a.width(),
            gray_a.height(),
            FilterType::Triangle,
        );
    }

    let (width, height) = gray_a.dimensions();
    let total_pixels = (width as usize) * (height as usize);
    if total_pixels == 0 {
        return None;
    }

    // Per-pixel absolute difference, binarized.
    let mut mask: Vec<u8> = gray_a
        .as_raw()
        .iter()
        .zip(gray_b.as_raw().iter())
        .map(|(&pa, &pb)| {
            if pa.abs_diff(pb) > PIXEL_DIFF_THRESHOLD {
                1
            } else {
                0
            }
        })
        .collect();

    // Merge nearby changed pixels into coherent regions.
    for _ in 0..DILATE_ITERATIONS {
        mask = dilate(&mask, width as usize, height as usize, DILATE_KERNEL_SIZE);
    }

    let significant_area: f64 = region_areas(&mask, width as usize, height as usize)
        .into_iter()
        .filter(|&area| area > MIN_REGION_AREA)
        .sum();

    Some(significant_area / total_pixels as f64 * 100.0)
}

/// Proportional quality-preserving downsample to the given width.
fn shrink_to_width(img: &GrayImage, max_width: u32) -> Option<GrayImage> {
    let scale = max_width as f64 / img.width() as f64;
    let new_w = (img.width() as f64 * scale) as u32;
    let new_h = (img.height() as f64 * scale) as u32;
    if new_w == 0 || new_h == 0 {
        return None;
    }
    Some(imageops::resize(img, new_w, new_h, FilterType::Triangle))
}

/// Binary dilation with a square kernel of the given side.
fn dilate(mask: &[u8], width: usize, height: usize, kernel_size: u32) -> Vec<u8> {
    let radius = (kernel_size / 2) as isize;
    let mut out = vec![0u8; mask.len()];
    for y in 0..height as isize {
        for x in 0..width as isize {
            'probe: for dy in -radius..=radius {
                for dx in -radius..=radius {
                    let (ny, nx) = (y + dy, x + dx);
                    if ny < 0 || nx < 0 || ny >= height as isize || nx >= width as isize {
                        continue;
                    }
                    if mask[ny as usize * width + nx as usize] != 0 {
                        out[y as usize * width + x as usize] = 1;
                        break 'probe;
                    }
                }
            }
        }
    }
    out
}

/// Areas of the 8-connected regions of the binary mask, in pixels.
fn region_areas(mask: &[u8], width: usize, height: usize) -> Vec<f64> {
    let mut visited = vec![false; mask.len()];
    let mut areas = Vec::new();
    let mut stack: Vec<(usize, usize)> = Vec::new();

    for start_y in 0..height {
        for start_x in 0..width {
            let idx = start_y * width + start_x;
            if mask[idx] == 0 || visited[idx] {
                continue;
            }
            let mut area = 0f64;
            visited[idx] = true;
            stack.push((start_x, start_y));
            while let Some((x, y)) = stack.pop() {
                area += 1.0;
                for dy in -1isize..=1 {
                    for dx in -1isize..=1 {
                        if dx == 0 && dy == 0 {
                            continue;
                        }
                        let (nx, ny) = (x as isize + dx, y as isize + dy);
                        if nx < 0 || ny < 0 || nx >= width as isize || ny >= height as isize {
                            continue;
                        }
                        let nidx = ny as usize * width + nx as usize;
                        if mask[nidx] != 0 && !visited[nidx] {
                            visited[nidx] = true;
                            stack.push((nx as usize, ny as usize));
                        }
                    }
                }
            }
            areas.push(area);
        }
    }
    areas
}
