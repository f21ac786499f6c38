//! Frame type and pixel conversion: YUYV/GREY/Y16 to RGB, mirroring.

use image::RgbImage;

/// A captured RGB camera frame.
#[derive(Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub timestamp: std::time::Instant,
    pub sequence: u32,
}

impl Frame {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Flip horizontally so the preview behaves like a mirror.
    pub fn mirrored(mut self) -> Self {
        image::imageops::flip_horizontal_in_place(&mut self.image);
        self
    }
}

/// Convert packed YUYV (4:2:2) to RGB using BT.601 limited-range coefficients.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V], sharing U and V.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
    let pixels = (width * height) as usize;
    let expected = pixels * 2;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut rgb = Vec::with_capacity(pixels * 3);
    for chunk in yuyv[..expected].chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        rgb.extend(yuv_to_rgb(y0, u, v));
        rgb.extend(yuv_to_rgb(y1, u, v));
    }

    RgbImage::from_raw(width, height, rgb).ok_or(FrameError::InvalidLength {
        expected,
        actual: yuyv.len(),
    })
}

/// Expand 8-bit grayscale to RGB by replicating the channel.
pub fn grey_to_rgb(grey: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
    let pixels = (width * height) as usize;
    if grey.len() < pixels {
        return Err(FrameError::InvalidLength {
            expected: pixels,
            actual: grey.len(),
        });
    }

    let rgb: Vec<u8> = grey[..pixels].iter().flat_map(|&g| [g, g, g]).collect();
    RgbImage::from_raw(width, height, rgb).ok_or(FrameError::InvalidLength {
        expected: pixels,
        actual: grey.len(),
    })
}

/// Downscale 16-bit little-endian grayscale to 8 bits.
pub fn y16_to_grey(y16: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let pixels = (width * height) as usize;
    let expected = pixels * 2;
    if y16.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: y16.len(),
        });
    }
    // High byte of each little-endian sample.
    Ok(y16[..expected].chunks_exact(2).map(|px| px[1]).collect())
}

fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = i32::from(y) - 16;
    let d = i32::from(u) - 128;
    let e = i32::from(v) - 128;

    let r = (298 * c + 409 * e + 128) >> 8;
    let g = (298 * c - 100 * d - 208 * e + 128) >> 8;
    let b = (298 * c + 516 * d + 128) >> 8;

    [clamp_u8(r), clamp_u8(g), clamp_u8(b)]
}

fn clamp_u8(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_yuyv_white_and_black() {
        // 2x1 image: Y0 = white, Y1 = black, neutral chroma
        let yuyv = vec![235, 128, 16, 128];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        assert_eq!(rgb.get_pixel(0, 0), &Rgb([255, 255, 255]));
        assert_eq!(rgb.get_pixel(1, 0), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_yuyv_red_chroma() {
        // Strong V pushes red up and green down.
        let yuyv = vec![81, 90, 81, 240];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        let Rgb([r, g, b]) = *rgb.get_pixel(0, 0);
        assert!(r > 200, "r = {r}");
        assert!(g < 40, "g = {g}");
        assert!(b < 40, "b = {b}");
    }

    #[test]
    fn test_yuyv_dimensions() {
        let yuyv = vec![128u8; 4 * 2 * 2];
        let rgb = yuyv_to_rgb(&yuyv, 4, 2).unwrap();
        assert_eq!(rgb.dimensions(), (4, 2));
    }

    #[test]
    fn test_yuyv_invalid_length() {
        let yuyv = vec![100, 128]; // too short for 2x1
        assert!(yuyv_to_rgb(&yuyv, 2, 1).is_err());
    }

    #[test]
    fn test_grey_to_rgb_replicates() {
        let rgb = grey_to_rgb(&[10, 200], 2, 1).unwrap();
        assert_eq!(rgb.get_pixel(0, 0), &Rgb([10, 10, 10]));
        assert_eq!(rgb.get_pixel(1, 0), &Rgb([200, 200, 200]));
        assert!(grey_to_rgb(&[1], 2, 1).is_err());
    }

    #[test]
    fn test_y16_takes_high_byte() {
        let grey = y16_to_grey(&[0xff, 0x12, 0x00, 0xab], 2, 1).unwrap();
        assert_eq!(grey, vec![0x12, 0xab]);
        assert!(y16_to_grey(&[0, 0], 2, 1).is_err());
    }

    #[test]
    fn test_mirrored_flips_horizontally() {
        let mut image = RgbImage::new(3, 1);
        image.put_pixel(0, 0, Rgb([1, 2, 3]));
        let frame = Frame {
            image,
            timestamp: std::time::Instant::now(),
            sequence: 0,
        }
        .mirrored();
        assert_eq!(frame.image.get_pixel(2, 0), &Rgb([1, 2, 3]));
        assert_eq!(frame.image.get_pixel(0, 0), &Rgb([0, 0, 0]));
    }
}
