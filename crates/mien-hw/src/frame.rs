//! Frame type and YUYV → RGB conversion.

use image::RgbImage;

/// A captured color camera frame, RGB24.
#[derive(Clone)]
pub struct Frame {
    /// Packed RGB pixel data (width * height * 3 bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub sequence: u32,
}

impl Frame {
    /// View the frame as an [`RgbImage`]. `None` if the buffer length does
    /// not match the dimensions.
    pub fn to_image(&self) -> Option<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.data.clone())
    }
}

/// Convert packed YUYV (4:2:2) to RGB24 using BT.601 coefficients.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; the chroma pair is
/// shared by both pixels.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for quad in yuyv[..expected].chunks_exact(4) {
        let (y0, u, y1, v) = (quad[0], quad[1], quad[2], quad[3]);
        push_pixel(&mut rgb, y0, u, v);
        push_pixel(&mut rgb, y1, u, v);
    }
    Ok(rgb)
}

fn push_pixel(rgb: &mut Vec<u8>, y: u8, u: u8, v: u8) {
    let c = i32::from(y) - 16;
    let d = i32::from(u) - 128;
    let e = i32::from(v) - 128;

    let r = (298 * c + 409 * e + 128) >> 8;
    let g = (298 * c - 100 * d - 208 * e + 128) >> 8;
    let b = (298 * c + 516 * d + 128) >> 8;

    rgb.push(r.clamp(0, 255) as u8);
    rgb.push(g.clamp(0, 255) as u8);
    rgb.push(b.clamp(0, 255) as u8);
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid YUYV length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yuyv_to_rgb_neutral_chroma_is_grayscale() {
        // Y=128, U=V=128 → neutral chroma, R=G=B
        let yuyv = vec![128, 128, 128, 128];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        assert_eq!(rgb.len(), 6);
        assert_eq!(rgb[0], rgb[1]);
        assert_eq!(rgb[1], rgb[2]);
        assert_eq!(rgb[..3], rgb[3..6]);
    }

    #[test]
    fn yuyv_to_rgb_full_red_chroma() {
        // Max V pushes red up and green down.
        let yuyv = vec![128, 128, 128, 255];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        assert!(rgb[0] > 200, "red should dominate, got {}", rgb[0]);
        assert!(rgb[1] < 100, "green should be suppressed, got {}", rgb[1]);
    }

    #[test]
    fn yuyv_to_rgb_black_and_white_extremes() {
        let yuyv = vec![16, 128, 235, 128];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        assert_eq!(&rgb[..3], &[0, 0, 0]);
        assert_eq!(&rgb[3..], &[255, 255, 255]);
    }

    #[test]
    fn yuyv_to_rgb_rejects_short_buffer() {
        let yuyv = vec![128, 128];
        assert!(yuyv_to_rgb(&yuyv, 2, 1).is_err());
    }

    #[test]
    fn frame_to_image_round_trips_dimensions() {
        let frame = Frame {
            data: vec![0u8; 4 * 2 * 3],
            width: 4,
            height: 2,
            sequence: 0,
        };
        let img = frame.to_image().unwrap();
        assert_eq!((img.width(), img.height()), (4, 2));
    }

    #[test]
    fn frame_to_image_rejects_bad_length() {
        let frame = Frame {
            data: vec![0u8; 5],
            width: 4,
            height: 2,
            sequence: 0,
        };
        assert!(frame.to_image().is_none());
    }
}
