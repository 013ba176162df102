//! Image file decode/encode adapter.
//!
//! The engines only ever see [`PixelBuffer`]s. This module is the boundary
//! to the `image` crate: decode a path into RGB8 or gray samples, and encode
//! a buffer back to disk with the format taken from the file extension.

use crate::core::error::{PixbenchError, PixbenchResult};
use crate::core::types::{Channels, PixelBuffer};
use image::{DynamicImage, GrayImage, RgbImage};
use std::path::Path;

/// Extensions the decoder is configured for.
pub const SUPPORTED_EXTENSIONS: [&str; 8] = ["png", "jpg", "jpeg", "gif", "bmp", "tiff", "tif", "webp"];

/// Decode an image file into a buffer with the requested layout.
pub fn load_image(path: impl AsRef<Path>, channels: Channels) -> PixbenchResult<PixelBuffer> {
    let path = path.as_ref();
    let img = image::open(path)?;
    let buffer = from_dynamic(img, channels)?;
    log::debug!(
        "Loaded {} ({}x{} {})",
        path.display(),
        buffer.width(),
        buffer.height(),
        buffer.channels()
    );
    Ok(buffer)
}

/// Encode a buffer to `path`. The format is inferred from the extension.
pub fn save_image(buffer: &PixelBuffer, path: impl AsRef<Path>) -> PixbenchResult<()> {
    let path = path.as_ref();
    to_dynamic(buffer)?.save(path)?;
    log::debug!("Saved {}", path.display());
    Ok(())
}

/// Convert a decoded image into a buffer, dropping alpha.
pub fn from_dynamic(img: DynamicImage, channels: Channels) -> PixbenchResult<PixelBuffer> {
    let buffer = match channels {
        Channels::Rgb => {
            let rgb = img.into_rgb8();
            let (width, height) = rgb.dimensions();
            PixelBuffer::from_samples(width, height, Channels::Rgb, rgb.into_raw())?
        }
        Channels::Gray => {
            let gray = img.into_luma8();
            let (width, height) = gray.dimensions();
            PixelBuffer::from_samples(width, height, Channels::Gray, gray.into_raw())?
        }
    };
    Ok(buffer)
}

/// Wrap a buffer's samples as an encodable image.
pub fn to_dynamic(buffer: &PixelBuffer) -> PixbenchResult<DynamicImage> {
    let (width, height) = (buffer.width(), buffer.height());
    let samples = buffer.as_slice().to_vec();
    let img = match buffer.channels() {
        Channels::Rgb => RgbImage::from_raw(width, height, samples).map(DynamicImage::ImageRgb8),
        Channels::Gray => GrayImage::from_raw(width, height, samples).map(DynamicImage::ImageLuma8),
    };
    img.ok_or_else(|| PixbenchError::Other(format!("sample count does not match {}x{}", width, height)))
}

/// Whether a path has an extension the decoder understands.
pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_png_roundtrip_rgb() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gradient.png");
        let buffer = PixelBuffer::from_fn(5, 4, Channels::Rgb, |x, y, c| (x * 40 + y * 10) as u8 + c as u8).unwrap();

        save_image(&buffer, &path).unwrap();
        let loaded = load_image(&path, Channels::Rgb).unwrap();
        assert_eq!(loaded, buffer);
    }

    #[test]
    fn test_gray_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mask.png");
        let buffer = PixelBuffer::from_fn(3, 3, Channels::Gray, |x, _, _| if x == 1 { 255 } else { 0 }).unwrap();

        save_image(&buffer, &path).unwrap();
        let loaded = load_image(&path, Channels::Gray).unwrap();
        assert_eq!(loaded.channels(), Channels::Gray);
        assert_eq!(loaded.as_slice(), buffer.as_slice());
    }

    #[test]
    fn test_missing_file() {
        assert!(load_image("does/not/exist.png", Channels::Rgb).is_err());
    }

    #[test]
    fn test_supported_extensions() {
        assert!(is_supported(Path::new("a/b/photo.JPG")));
        assert!(!is_supported(Path::new("notes.txt")));
        assert!(!is_supported(Path::new("no_extension")));
    }
}
