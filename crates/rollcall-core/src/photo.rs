//! Photo decoding shared by the gallery loader and request handling.

use image::{ImageFormat, RgbImage};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PhotoError {
    #[error("photo payload is empty")]
    Empty,
    #[error("payload is not a recognized image format")]
    NotAnImage,
    #[error("{format:?} image could not be decoded: {reason}")]
    Undecodable { format: ImageFormat, reason: String },
}

/// Decode raw bytes into an 8-bit RGB image.
///
/// Grayscale and RGBA inputs are converted; the alpha channel is dropped.
pub fn decode_photo(bytes: &[u8]) -> Result<RgbImage, PhotoError> {
    if bytes.is_empty() {
        return Err(PhotoError::Empty);
    }
    let format = image::guess_format(bytes).map_err(|_| PhotoError::NotAnImage)?;
    let decoded = image::load_from_memory_with_format(bytes, format).map_err(|e| {
        PhotoError::Undecodable {
            format,
            reason: e.to_string(),
        }
    })?;
    Ok(decoded.to_rgb8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use std::io::Cursor;

    fn png_bytes(img: &image::DynamicImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_decode_rgba_drops_alpha() {
        let rgba = RgbaImage::from_pixel(4, 3, Rgba([10, 20, 30, 0]));
        let bytes = png_bytes(&image::DynamicImage::ImageRgba8(rgba));
        let rgb = decode_photo(&bytes).unwrap();
        assert_eq!(rgb.dimensions(), (4, 3));
        assert_eq!(rgb.get_pixel(2, 1).0, [10, 20, 30]);
    }

    #[test]
    fn test_decode_empty() {
        assert!(matches!(decode_photo(&[]), Err(PhotoError::Empty)));
    }

    #[test]
    fn test_decode_not_an_image() {
        let result = decode_photo(b"%PDF-1.4 definitely not a photo");
        assert!(matches!(result, Err(PhotoError::NotAnImage)));
    }

    #[test]
    fn test_decode_truncated_png() {
        let rgb = image::DynamicImage::ImageRgb8(RgbImage::new(16, 16));
        let bytes = png_bytes(&rgb);
        let result = decode_photo(&bytes[..bytes.len() / 2]);
        assert!(matches!(result, Err(PhotoError::Undecodable { .. })));
    }
}
