//! Image decoding for texture descriptors.

use std::path::Path;

use crate::error::{Error, Result};

use super::descriptor::PixelFormat;

/// Decoded pixels ready for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Tightly packed RGBA8 rows, top row first.
    pub pixels: Vec<u8>,
}

/// Decodes an encoded image (PNG, JPEG, BMP, GIF) into sRGB RGBA8 pixels.
pub fn decode(bytes: &[u8]) -> Result<DecodedImage> {
    let image = image::load_from_memory(bytes).map_err(|e| Error::Image(e.to_string()))?;
    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();

    Ok(DecodedImage {
        width,
        height,
        format: PixelFormat::Rgba8UnormSrgb,
        pixels: rgba.into_raw(),
    })
}

/// Reads and decodes an image file.
pub fn decode_file(path: impl AsRef<Path>) -> Result<DecodedImage> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)
        .map_err(|e| Error::Image(format!("failed to read {}: {e}", path.display())))?;
    decode(&bytes)
}

impl DecodedImage {
    /// Two-color checkerboard of `size`x`size` pixels with `tile`-pixel squares.
    pub fn checkerboard(size: u32, tile: u32, a: [u8; 4], b: [u8; 4]) -> Self {
        let tile = tile.max(1);
        let mut pixels = Vec::with_capacity((size * size * 4) as usize);
        for y in 0..size {
            for x in 0..size {
                let color = if (x / tile) % 2 == (y / tile) % 2 { a } else { b };
                pixels.extend_from_slice(&color);
            }
        }

        Self {
            width: size,
            height: size,
            format: PixelFormat::Rgba8UnormSrgb,
            pixels,
        }
    }
}
