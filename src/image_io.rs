use crate::error::{RecoveryError, Result};
use crate::types::{Dimensions, PixelBuffer};
use image::{ImageFormat, RgbImage};
use std::path::Path;

/// A decoded image with its dimensions
#[derive(Debug, Clone)]
pub struct LoadedImage {
    pub dimensions: Dimensions,
    pub buffer: PixelBuffer,
    path: String,
}

impl LoadedImage {
    /// Get the path the image was loaded from
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn into_buffer(self) -> PixelBuffer {
        self.buffer
    }
}

/// Decode an image file into a tightly packed RGB buffer
pub fn load_pixel_buffer<P: AsRef<Path>>(path: P) -> Result<LoadedImage> {
    let path_ref = path.as_ref();
    let path_str = path_ref.display().to_string();

    if !path_ref.exists() {
        return Err(RecoveryError::FileNotFound(path_str));
    }

    let decoded = image::open(path_ref)
        .map_err(|e| RecoveryError::Decode(format!("{}: {}", path_str, e)))?
        .to_rgb8();

    let dimensions = Dimensions::new(decoded.width(), decoded.height());
    let buffer = PixelBuffer::for_dimensions(dimensions, decoded.into_raw())?;

    Ok(LoadedImage {
        dimensions,
        buffer,
        path: path_str,
    })
}

/// Encode `buffer` to `path`; the format follows the extension, BMP when
/// there is none
pub fn save_pixel_buffer<P: AsRef<Path>>(
    buffer: &PixelBuffer,
    dimensions: Dimensions,
    path: P,
) -> Result<()> {
    let path_ref = path.as_ref();
    RecoveryError::check_lengths(buffer.len(), dimensions.byte_len())?;

    let image = RgbImage::from_raw(dimensions.width, dimensions.height, buffer.as_bytes().to_vec())
        .ok_or_else(|| {
            RecoveryError::Encode(format!("buffer does not fit {} image", dimensions))
        })?;

    let format = ImageFormat::from_path(path_ref).unwrap_or(ImageFormat::Bmp);
    if let Some(parent) = path_ref.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    image
        .save_with_format(path_ref, format)
        .map_err(|e| RecoveryError::Encode(format!("{}: {}", path_ref.display(), e)))
}
