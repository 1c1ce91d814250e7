//! Pixel encoder for rendered regions.
//!
//! The decoder hands over packed 32-bit BGRA pixels with straight alpha. This
//! module turns them into one of four outputs:
//!
//! - **PNG / BMP**: lossless, alpha preserved
//! - **JPEG**: alpha dropped, configurable quality
//! - **RAW**: headerless premultiplied RGBA, `width * 4` bytes per row
//!
//! RAW is produced by packing the pixels into an intermediate 32-bit BMP,
//! decoding that bitmap again and premultiplying the result. Tiles already
//! sitting in caches were produced by this route, so it is kept as is rather
//! than copying the decoder buffer directly.

use std::io::Cursor;

use image::codecs::bmp::BmpEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, ImageFormat, ImageReader};
use thiserror::Error;

use crate::slide::swap_red_blue;

/// Default JPEG quality (1-100).
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// Encoder variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Png,
    Jpeg,
    Bmp,
    Raw,
}

/// Errors produced while encoding a region
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("Pixel buffer holds {actual} bytes, expected {expected} for {width}x{height}")]
    BufferSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("{encoding:?} encoding failed: {source}")]
    Image {
        encoding: Encoding,
        #[source]
        source: image::ImageError,
    },
}

/// Region encoder.
///
/// Stateless apart from the JPEG quality, so one instance is shared by all
/// workers.
#[derive(Debug, Clone)]
pub struct FormatEncoder {
    jpeg_quality: u8,
}

impl Default for FormatEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl FormatEncoder {
    /// Create an encoder; quality is clamped to 1-100.
    pub fn new(jpeg_quality: u8) -> Self {
        Self {
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    pub fn jpeg_quality(&self) -> u8 {
        self.jpeg_quality
    }

    /// Encode a packed BGRA buffer of `width * height` pixels.
    ///
    /// The buffer is consumed and reordered to RGBA in place.
    pub fn encode(
        &self,
        encoding: Encoding,
        mut pixels: Vec<u8>,
        width: u32,
        height: u32,
    ) -> Result<Vec<u8>, EncodeError> {
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(EncodeError::BufferSize {
                width,
                height,
                expected,
                actual: pixels.len(),
            });
        }

        swap_red_blue(&mut pixels);

        match encoding {
            Encoding::Png => encode_png(&pixels, width, height),
            Encoding::Jpeg => self.encode_jpeg(&pixels, width, height),
            Encoding::Bmp => encode_bmp(&pixels, width, height),
            Encoding::Raw => encode_raw(&pixels, width, height),
        }
    }

    fn encode_jpeg(&self, rgba: &[u8], width: u32, height: u32) -> Result<Vec<u8>, EncodeError> {
        // JPEG has no alpha channel
        let rgb: Vec<u8> = rgba
            .chunks_exact(4)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect();

        let mut buffer = Vec::new();
        JpegEncoder::new_with_quality(&mut buffer, self.jpeg_quality)
            .write_image(&rgb, width, height, ExtendedColorType::Rgb8)
            .map_err(|source| EncodeError::Image {
                encoding: Encoding::Jpeg,
                source,
            })?;
        Ok(buffer)
    }
}

fn encode_png(rgba: &[u8], width: u32, height: u32) -> Result<Vec<u8>, EncodeError> {
    let mut buffer = Vec::new();
    PngEncoder::new(&mut buffer)
        .write_image(rgba, width, height, ExtendedColorType::Rgba8)
        .map_err(|source| EncodeError::Image {
            encoding: Encoding::Png,
            source,
        })?;
    Ok(buffer)
}

fn encode_bmp(rgba: &[u8], width: u32, height: u32) -> Result<Vec<u8>, EncodeError> {
    let mut buffer = Vec::new();
    BmpEncoder::new(&mut buffer)
        .write_image(rgba, width, height, ExtendedColorType::Rgba8)
        .map_err(|source| EncodeError::Image {
            encoding: Encoding::Bmp,
            source,
        })?;
    Ok(buffer)
}

fn encode_raw(rgba: &[u8], width: u32, height: u32) -> Result<Vec<u8>, EncodeError> {
    if width == 0 || height == 0 {
        return Ok(Vec::new());
    }

    let raw_error = |source| EncodeError::Image {
        encoding: Encoding::Raw,
        source,
    };

    let bitmap = encode_bmp(rgba, width, height)?;
    let decoded = ImageReader::with_format(Cursor::new(bitmap), ImageFormat::Bmp)
        .decode()
        .map_err(raw_error)?;

    let mut pixels = decoded.into_rgba8().into_raw();
    premultiply_alpha(&mut pixels);
    Ok(pixels)
}

/// Scale the colour channels of RGBA pixels by their alpha, rounding to nearest
pub fn premultiply_alpha(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let alpha = px[3] as u16;
        if alpha == 255 {
            continue;
        }
        for channel in &mut px[..3] {
            *channel = ((*channel as u16 * alpha + 127) / 255) as u8;
        }
    }
}
