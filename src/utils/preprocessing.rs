//! Shared image preprocessing utilities
//!
//! Tensor preparation for the two model pipelines and the inverse mapping of
//! model outputs back onto the source image.

use crate::{
    error::{ClearCutError, Result},
    models::PreprocessingConfig,
};
use image::{imageops::FilterType, GrayImage, ImageBuffer, Luma, RgbImage};
use ndarray::{Array2, Array4, ArrayView2};

/// Longest-side resize used by the SAM image encoder
///
/// Maps both images and prompt coordinates from the source frame into the
/// resized frame the encoder sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeLongestSide {
    pub target_length: u32,
}

impl ResizeLongestSide {
    #[must_use]
    pub fn new(target_length: u32) -> Self {
        Self { target_length }
    }

    /// Output `(width, height)` for a source of the given size
    #[must_use]
    pub fn preprocess_shape(&self, width: u32, height: u32) -> (u32, u32) {
        let longest = width.max(height).max(1) as f32;
        let scale = self.target_length as f32 / longest;
        let new_w = (width as f32 * scale + 0.5).floor() as u32;
        let new_h = (height as f32 * scale + 0.5).floor() as u32;
        (new_w.max(1), new_h.max(1))
    }

    /// Map `[x, y]` coordinates from a `width × height` source into the resized frame
    #[must_use]
    pub fn apply_coords(&self, coords: &[[f32; 2]], width: u32, height: u32) -> Vec<[f32; 2]> {
        let (new_w, new_h) = self.preprocess_shape(width, height);
        let sx = new_w as f32 / width.max(1) as f32;
        let sy = new_h as f32 / height.max(1) as f32;
        coords.iter().map(|[x, y]| [x * sx, y * sy]).collect()
    }
}

/// Shared image preprocessing utilities
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Build the NCHW input tensor of a U²-Net family model
    ///
    /// The image is resized to the square input (Lanczos), scaled by its own
    /// maximum value and normalized per channel.
    ///
    /// # Errors
    /// - Empty image
    pub fn u2net_tensor(image: &RgbImage, config: &PreprocessingConfig) -> Result<Array4<f32>> {
        if image.width() == 0 || image.height() == 0 {
            return Err(ClearCutError::processing("Cannot preprocess an empty image"));
        }
        let side = config.target_size;
        let resized = image::imageops::resize(image, side, side, FilterType::Lanczos3);
        let max = resized
            .as_raw()
            .iter()
            .copied()
            .max()
            .map_or(1.0, |m| f32::from(m).max(1e-6));

        let side = side as usize;
        let mut tensor = Array4::<f32>::zeros((1, 3, side, side));
        #[allow(clippy::indexing_slicing)]
        // Safe: tensor dimensions match the resized canvas
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, c, y as usize, x as usize]] = (f32::from(pixel[c]) / max
                    - config.normalization_mean[c])
                    / config.normalization_std[c];
            }
        }
        Ok(tensor)
    }

    /// Build the padded NCHW input tensor of the SAM image encoder
    ///
    /// Returns the tensor and the `(width, height)` of the resized content
    /// inside the zero-padded square.
    ///
    /// # Errors
    /// - Empty image
    pub fn sam_tensor(
        image: &RgbImage,
        config: &PreprocessingConfig,
    ) -> Result<(Array4<f32>, (u32, u32))> {
        if image.width() == 0 || image.height() == 0 {
            return Err(ClearCutError::processing("Cannot preprocess an empty image"));
        }
        let transform = ResizeLongestSide::new(config.target_size);
        let (new_w, new_h) = transform.preprocess_shape(image.width(), image.height());
        let resized = image::imageops::resize(image, new_w, new_h, FilterType::Triangle);

        let side = config.target_size as usize;
        // zero padding after normalization, bottom and right
        let mut tensor = Array4::<f32>::zeros((1, 3, side, side));
        #[allow(clippy::indexing_slicing)]
        // Safe: resized content never exceeds the target side
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                tensor[[0, c, y as usize, x as usize]] = (f32::from(pixel[c])
                    - config.normalization_mean[c])
                    / config.normalization_std[c];
            }
        }
        Ok((tensor, (new_w, new_h)))
    }

    /// Turn a raw saliency map into an 8-bit mask at the requested size
    ///
    /// Values are min-max normalized, quantized and resized with Lanczos.
    ///
    /// # Errors
    /// - Empty prediction or empty target size
    pub fn saliency_to_mask(prediction: ArrayView2<f32>, width: u32, height: u32) -> Result<GrayImage> {
        let (rows, cols) = prediction.dim();
        if rows == 0 || cols == 0 || width == 0 || height == 0 {
            return Err(ClearCutError::processing("Empty saliency map"));
        }

        let (min, max) = prediction
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        let range = if (max - min).abs() > f32::EPSILON { max - min } else { 1.0 };

        let small: GrayImage = ImageBuffer::from_fn(cols as u32, rows as u32, |x, y| {
            let v = prediction
                .get((y as usize, x as usize))
                .map_or(0.0, |v| (v - min) / range);
            Luma([(v * 255.0).clamp(0.0, 255.0) as u8])
        });

        if small.dimensions() == (width, height) {
            return Ok(small);
        }
        Ok(image::imageops::resize(&small, width, height, FilterType::Lanczos3))
    }

    /// Threshold mask logits into a 0/255 grayscale image
    #[must_use]
    pub fn logits_to_mask(logits: ArrayView2<f32>) -> GrayImage {
        let (rows, cols) = logits.dim();
        ImageBuffer::from_fn(cols as u32, rows as u32, |x, y| {
            let on = logits
                .get((y as usize, x as usize))
                .is_some_and(|&v| v > 0.0);
            Luma([if on { 255 } else { 0 }])
        })
    }

    /// Luminance of an RGB pixel buffer scaled to `[0, 1]`
    #[must_use]
    pub fn luminance(image: &image::RgbaImage) -> Array2<f32> {
        let (w, h) = image.dimensions();
        Array2::from_shape_fn((h as usize, w as usize), |(y, x)| {
            let p = image.get_pixel(x as u32, y as u32);
            (0.299 * f32::from(p[0]) + 0.587 * f32::from(p[1]) + 0.114 * f32::from(p[2])) / 255.0
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use ndarray::array;

    #[test]
    fn test_resize_longest_side_shape() {
        let t = ResizeLongestSide::new(1024);
        assert_eq!(t.preprocess_shape(2048, 1024), (1024, 512));
        assert_eq!(t.preprocess_shape(100, 300), (341, 1024));
        assert_eq!(t.preprocess_shape(1024, 1024), (1024, 1024));
    }

    #[test]
    fn test_apply_coords_scales_into_resized_frame() {
        let t = ResizeLongestSide::new(1024);
        let mapped = t.apply_coords(&[[50.0, 25.0]], 100, 50);
        assert!((mapped[0][0] - 512.0).abs() < 1e-3);
        assert!((mapped[0][1] - 256.0).abs() < 1e-3);
    }

    #[test]
    fn test_u2net_tensor_shape_and_normalization() {
        let image = RgbImage::from_pixel(40, 30, Rgb([255, 255, 255]));
        let tensor =
            ImagePreprocessor::u2net_tensor(&image, &PreprocessingConfig::U2NET).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, 320, 320]);
        let expected_r = (1.0 - 0.485) / 0.229;
        assert!((tensor[[0, 0, 10, 10]] - expected_r).abs() < 1e-3);
    }

    #[test]
    fn test_sam_tensor_pads_with_zeros() {
        let image = RgbImage::from_pixel(200, 100, Rgb([123, 116, 103]));
        let (tensor, (w, h)) =
            ImagePreprocessor::sam_tensor(&image, &PreprocessingConfig::SAM).unwrap();
        assert_eq!((w, h), (1024, 512));
        assert_eq!(tensor.shape(), &[1, 3, 1024, 1024]);
        assert_eq!(tensor[[0, 0, 1000, 10]], 0.0);
        assert!(tensor[[0, 0, 10, 10]].abs() < 0.05);
    }

    #[test]
    fn test_empty_image_rejected() {
        let image = RgbImage::new(0, 0);
        assert!(ImagePreprocessor::u2net_tensor(&image, &PreprocessingConfig::U2NET).is_err());
        assert!(ImagePreprocessor::sam_tensor(&image, &PreprocessingConfig::SAM).is_err());
    }

    #[test]
    fn test_saliency_to_mask_normalizes() {
        let pred = array![[0.2_f32, 0.4], [0.6, 0.8]];
        let mask = ImagePreprocessor::saliency_to_mask(pred.view(), 2, 2).unwrap();
        assert_eq!(mask.get_pixel(0, 0)[0], 0);
        assert_eq!(mask.get_pixel(1, 1)[0], 255);

        let resized = ImagePreprocessor::saliency_to_mask(pred.view(), 8, 6).unwrap();
        assert_eq!(resized.dimensions(), (8, 6));
    }

    #[test]
    fn test_logits_to_mask_thresholds_at_zero() {
        let logits = array![[-1.0_f32, 0.0, 0.5]];
        let mask = ImagePreprocessor::logits_to_mask(logits.view());
        assert_eq!(mask.dimensions(), (3, 1));
        assert_eq!(mask.as_raw(), &vec![0, 0, 255]);
    }
}
