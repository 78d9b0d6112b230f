//! Image decoding and PNG encoding.

use std::path::Path;

use image::ImageEncoder;
use imagerocket_pipeline::{PixelBuffer, SurfaceBuffer};

use crate::IoError;

/// Decode raw image bytes (PNG, JPEG, BMP, WebP) into a surface buffer.
///
/// The format is sniffed from the data. Every input is converted to RGBA.
///
/// # Errors
///
/// Returns [`IoError::EmptyInput`] if `bytes` is empty, or
/// [`IoError::Image`] if the data cannot be decoded.
pub fn decode(bytes: &[u8]) -> Result<PixelBuffer, IoError> {
    if bytes.is_empty() {
        return Err(IoError::EmptyInput);
    }
    let image = image::load_from_memory(bytes)?.to_rgba8();
    tracing::debug!(
        width = image.width(),
        height = image.height(),
        "decoded image"
    );
    Ok(SurfaceBuffer::new(image).into())
}

/// Read and decode an image file.
///
/// # Errors
///
/// Returns [`IoError::Read`] if the file cannot be read, otherwise see
/// [`decode`].
pub fn load_image(path: &Path) -> Result<PixelBuffer, IoError> {
    let bytes = std::fs::read(path).map_err(|source| IoError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    decode(&bytes)
}

/// Encode a buffer as PNG.
///
/// Crop parameters are not stored; only pixels are written.
///
/// # Errors
///
/// Returns [`IoError::EmptyImage`] for a buffer with no pixels, or
/// [`IoError::Image`] if encoding fails.
pub fn encode_png(buffer: &PixelBuffer) -> Result<Vec<u8>, IoError> {
    let (width, height) = (buffer.width(), buffer.height());
    if width == 0 || height == 0 {
        return Err(IoError::EmptyImage { width, height });
    }

    let converted;
    let image = match buffer {
        PixelBuffer::Surface(surface) => surface.image(),
        PixelBuffer::Bytes(bytes) => {
            converted = bytes.to_surface_buffer();
            converted.image()
        }
    };

    let mut png = Vec::new();
    let encoder = image::codecs::png::PngEncoder::new(&mut png);
    encoder.write_image(
        image.as_raw(),
        width,
        height,
        image::ExtendedColorType::Rgba8,
    )?;
    Ok(png)
}

/// Encode a buffer as PNG and write it to `path`.
///
/// # Errors
///
/// See [`encode_png`]; additionally [`IoError::Write`] if the file cannot
/// be written.
pub fn save_png(buffer: &PixelBuffer, path: &Path) -> Result<(), IoError> {
    let png = encode_png(buffer)?;
    std::fs::write(path, png).map_err(|source| IoError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!(path = %path.display(), "wrote png");
    Ok(())
}
