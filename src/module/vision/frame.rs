//! In-Memory Frame Raster
//!
//! A frame lives for exactly one capture cycle, except the copy retained
//! as the last significant frame for similarity comparison. The channel
//! layout is derived from the FOURCC the device actually negotiated.

use image::{GrayImage, ImageBuffer, Luma};

/// Channel layout of a raw frame buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PixelLayout {
    /// Packed luma-chroma, two bytes per pixel (YUYV/YUY2).
    Yuyv,
    /// Single channel intensity.
    Gray,
    /// Three channel RGB.
    Rgb,
    /// Anything the pipeline does not recognize; carried through as-is.
    Unknown(String),
}

/// A raster with no persistent identity.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub layout: PixelLayout,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, layout: PixelLayout, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            layout,
            data,
        }
    }

    /// Interpret a raw device buffer according to the negotiated FOURCC.
    /// MJPG buffers are decoded to RGB here; raw formats are tagged and
    /// converted later only when needed.
    pub fn from_raw(fourcc: &str, width: u32, height: u32, data: Vec<u8>) -> Result<Self, String> {
        match fourcc.to_uppercase().as_str() {
            "MJPG" | "JPEG" => {
                let decoded = image::load_from_memory(&data)
                    .map_err(|e| format!("MJPG decode failed: {}", e))?
                    .to_rgb8();
                Ok(Self::new(
                    decoded.width(),
                    decoded.height(),
                    PixelLayout::Rgb,
                    decoded.into_raw(),
                ))
            }
            "YUYV" | "YUY2" => Ok(Self::new(width, height, PixelLayout::Yuyv, data)),
            "GREY" | "GRAY" | "Y800" => Ok(Self::new(width, height, PixelLayout::Gray, data)),
            "RGB3" => Ok(Self::new(width, height, PixelLayout::Rgb, data)),
            other => Ok(Self::new(
                width,
                height,
                PixelLayout::Unknown(other.to_string()),
                data,
            )),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.data.is_empty()
    }

    /// Normalize to three-channel RGB. Returns `None` for unrecognized
    /// layouts or buffers whose size does not match their claimed shape.
    pub fn to_rgb(&self) -> Option<Frame> {
        let pixels = (self.width as usize) * (self.height as usize);
        match &self.layout {
            PixelLayout::Rgb => {
                if self.data.len() == pixels * 3 {
                    Some(self.clone())
                } else {
                    None
                }
            }
            PixelLayout::Gray => {
                if self.data.len() != pixels {
                    return None;
                }
                let mut rgb = Vec::with_capacity(pixels * 3);
                for &y in &self.data {
                    rgb.extend_from_slice(&[y, y, y]);
                }
                Some(Frame::new(self.width, self.height, PixelLayout::Rgb, rgb))
            }
            PixelLayout::Yuyv => {
                if self.data.len() != pixels * 2 {
                    return None;
                }
                Some(Frame::new(
                    self.width,
                    self.height,
                    PixelLayout::Rgb,
                    yuyv_to_rgb(&self.data),
                ))
            }
            PixelLayout::Unknown(_) => None,
        }
    }

    /// Extract a single-channel intensity image for comparison. For YUYV
    /// the luma bytes are taken directly without a full RGB round trip.
    pub fn to_luma(&self) -> Option<GrayImage> {
        let pixels = (self.width as usize) * (self.height as usize);
        let buf: Vec<u8> = match &self.layout {
            PixelLayout::Gray => {
                if self.data.len() != pixels {
                    return None;
                }
                self.data.clone()
            }
            PixelLayout::Yuyv => {
                if self.data.len() != pixels * 2 {
                    return None;
                }
                self.data.iter().step_by(2).copied().collect()
            }
            PixelLayout::Rgb => {
                if self.data.len() != pixels * 3 {
                    return None;
                }
                self.data
                    .chunks_exact(3)
                    .map(|px| {
                        // BT.601 integer luma.
                        ((299 * px[0] as u32 + 587 * px[1] as u32 + 114 * px[2] as u32) / 1000)
                            as u8
                    })
                    .collect()
            }
            PixelLayout::Unknown(_) => return None,
        };
        ImageBuffer::<Luma<u8>, Vec<u8>>::from_raw(self.width, self.height, buf)
    }
}

/// Convert packed YUYV (two pixels per four bytes) to RGB using BT.601.
fn yuyv_to_rgb(data: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(data.len() / 2 * 3);
    for chunk in data.chunks_exact(4) {
        // chunk layout is Y0 U Y1 V
        let u = chunk[1] as f32 - 128.0;
        let v = chunk[3] as f32 - 128.0;
        for y in [chunk[0] as f32, chunk[2] as f32] {
            let r = y + 1.402 * v;
            let g = y - 0.344 * u - 0.714 * v;
            let b = y + 1.772 * u;
            rgb.push(clamp_u8(r));
            rgb.push(clamp_u8(g));
            rgb.push(clamp_u8(b));
        }
    }
    rgb
}

fn clamp_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gray_expands_to_rgb() {
        let f = Frame::new(2, 1, PixelLayout::Gray, vec![10, 200]);
        let rgb = f.to_rgb().unwrap();
        assert_eq!(rgb.layout, PixelLayout::Rgb);
        assert_eq!(rgb.data, vec![10, 10, 10, 200, 200, 200]);
    }

    #[test]
    fn test_yuyv_neutral_chroma_is_grayscale() {
        // U = V = 128 means no chroma contribution.
        let f = Frame::new(2, 1, PixelLayout::Yuyv, vec![50, 128, 180, 128]);
        let rgb = f.to_rgb().unwrap();
        assert_eq!(rgb.data, vec![50, 50, 50, 180, 180, 180]);
    }

    #[test]
    fn test_luma_from_rgb() {
        let f = Frame::new(1, 1, PixelLayout::Rgb, vec![255, 255, 255]);
        let luma = f.to_luma().unwrap();
        assert_eq!(luma.get_pixel(0, 0).0[0], 255);
    }

    #[test]
    fn test_luma_from_yuyv_takes_even_bytes() {
        let f = Frame::new(2, 1, PixelLayout::Yuyv, vec![11, 99, 22, 99]);
        let luma = f.to_luma().unwrap();
        assert_eq!(luma.get_pixel(0, 0).0[0], 11);
        assert_eq!(luma.get_pixel(1, 0).0[0], 22);
    }

    #[test]
    fn test_unknown_layout_refuses_conversion() {
        let f = Frame::new(2, 2, PixelLayout::Unknown("NV12".to_string()), vec![0; 6]);
        assert!(f.to_rgb().is_none());
        assert!(f.to_luma().is_none());
    }

    #[test]
    fn test_size_mismatch_refuses_conversion() {
        let f = Frame::new(4, 4, PixelLayout::Rgb, vec![0; 5]);
        assert!(f.to_rgb().is_none());
    }
}
