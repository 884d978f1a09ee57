//! Image codec adapter
//!
//! Decoding guesses the format from content and converts to the requested
//! colour mode; encoding always writes deterministic, best-compression PNG.
//! Decoder errors never leave this module: every failure is `InvalidImage`.

use crate::error::{ClearCutError, Result};
use image::{
    codecs::png::{CompressionType, FilterType, PngEncoder},
    DynamicImage, GrayImage, ImageReader, Limits, RgbImage, RgbaImage,
};
use std::io::Cursor;

/// Largest pixel count accepted for decoding
pub const MAX_DECODE_PIXELS: u64 = 40_000_000;

/// Pixel layout requested from the decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
    Rgb,
    Rgba,
    Luma,
}

/// Service for decoding uploads and encoding PNG responses
pub struct ImageCodec;

impl ImageCodec {
    /// Decode bytes and convert them to `mode`
    ///
    /// # Errors
    /// - `InvalidImage` for unknown formats, truncated or corrupt data
    /// - `InvalidImage` when the image exceeds [`MAX_DECODE_PIXELS`]
    pub fn decode(bytes: &[u8], mode: ColorMode) -> Result<DynamicImage> {
        Self::decode_bounded(bytes, mode, MAX_DECODE_PIXELS)
    }

    fn reader(bytes: &[u8]) -> Result<ImageReader<Cursor<&[u8]>>> {
        ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| ClearCutError::invalid_image(e.to_string()))
    }

    fn decode_bounded(bytes: &[u8], mode: ColorMode, max_pixels: u64) -> Result<DynamicImage> {
        // reads the header only
        let (width, height) = Self::reader(bytes)?
            .into_dimensions()
            .map_err(|e| ClearCutError::invalid_image(e.to_string()))?;
        if u64::from(width) * u64::from(height) > max_pixels {
            return Err(ClearCutError::invalid_image(format!(
                "{width}x{height} exceeds {max_pixels} pixels"
            )));
        }

        let mut limits = Limits::default();
        limits.max_image_width = Some(width);
        limits.max_image_height = Some(height);
        let mut reader = Self::reader(bytes)?;
        reader.limits(limits);
        let image = reader
            .decode()
            .map_err(|e| ClearCutError::invalid_image(e.to_string()))?;

        Ok(match mode {
            ColorMode::Rgb => DynamicImage::ImageRgb8(image.into_rgb8()),
            ColorMode::Rgba => DynamicImage::ImageRgba8(image.into_rgba8()),
            ColorMode::Luma => DynamicImage::ImageLuma8(image.into_luma8()),
        })
    }

    /// Decode bytes into an RGBA buffer
    ///
    /// # Errors
    /// - `InvalidImage` for undecodable data
    pub fn decode_rgba(bytes: &[u8]) -> Result<RgbaImage> {
        Ok(Self::decode(bytes, ColorMode::Rgba)?.into_rgba8())
    }

    /// Decode bytes into an RGB buffer
    ///
    /// # Errors
    /// - `InvalidImage` for undecodable data
    pub fn decode_rgb(bytes: &[u8]) -> Result<RgbImage> {
        Ok(Self::decode(bytes, ColorMode::Rgb)?.into_rgb8())
    }

    /// Encode an image as PNG with best compression and adaptive filtering
    ///
    /// # Errors
    /// - PNG encoder failures
    pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        let encoder = PngEncoder::new_with_quality(
            Cursor::new(&mut bytes),
            CompressionType::Best,
            FilterType::Adaptive,
        );
        image
            .write_with_encoder(encoder)
            .map_err(|e| ClearCutError::processing(format!("PNG encoding failed: {e}")))?;
        Ok(bytes)
    }

    /// Encode an RGBA buffer as PNG
    ///
    /// # Errors
    /// - PNG encoder failures
    pub fn encode_rgba_png(image: RgbaImage) -> Result<Vec<u8>> {
        Self::encode_png(&DynamicImage::ImageRgba8(image))
    }

    /// Encode a grayscale mask as PNG
    ///
    /// # Errors
    /// - PNG encoder failures
    pub fn encode_mask_png(mask: GrayImage) -> Result<Vec<u8>> {
        Self::encode_png(&DynamicImage::ImageLuma8(mask))
    }
}
