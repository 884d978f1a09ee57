//! Model pipeline abstractions
//!
//! The services only talk to the models through these traits, so the ONNX
//! backends and the test doubles in [`crate::backends::mock`] are
//! interchangeable.

use crate::{
    config::{MattingConfig, ServiceConfig},
    error::{ClearCutError, Result},
    types::SegmentationRequest,
};
use image::{DynamicImage, RgbImage, RgbaImage};
use ndarray::Array3;

/// Output of a background removal pipeline
///
/// A pipeline may hand back pixels or an already encoded image; callers
/// normalise it with [`PipelineOutput::into_rgba`] straight away.
#[derive(Debug, Clone)]
pub enum PipelineOutput {
    Image(DynamicImage),
    Encoded(Vec<u8>),
}

impl PipelineOutput {
    /// Normalise to an RGBA buffer
    ///
    /// # Errors
    /// - Encoded bytes that cannot be decoded
    pub fn into_rgba(self) -> Result<RgbaImage> {
        match self {
            Self::Image(image) => Ok(image.into_rgba8()),
            Self::Encoded(bytes) => Ok(image::load_from_memory(&bytes)?.into_rgba8()),
        }
    }
}

/// Background removal pipeline: salient-object model followed by alpha matting
pub trait RemovalPipeline: Send + Sync {
    /// Remove the background of an RGBA image
    ///
    /// # Errors
    /// - Model inference failures
    /// - Tensor shape or matting errors
    fn remove(&self, image: &RgbaImage, matting: &MattingConfig) -> Result<PipelineOutput>;
}

/// Constructs removal pipelines on first use
pub trait RemovalPipelineFactory: Send + Sync {
    /// # Errors
    /// - Model loading failures
    fn create_pipeline(&self, config: &ServiceConfig) -> Result<Box<dyn RemovalPipeline>>;
}

/// Raw predictor output
#[derive(Debug, Clone)]
pub struct Predictions {
    /// Mask logits, `(num_masks, height, width)` at the source image size
    pub masks: Array3<f32>,
    /// Predicted quality per mask
    pub iou_predictions: Vec<f32>,
}

/// Stateful promptable segmentation model
///
/// `set_image` computes and stores the image embedding; `predict` decodes
/// prompts against the stored embedding. Callers must hold exclusive access
/// across both calls.
pub trait PromptableSegmenter: Send {
    /// # Errors
    /// - Image encoder failures
    fn set_image(&mut self, image: &RgbImage) -> Result<()>;

    /// # Errors
    /// - No image set
    /// - Prompt decoder failures
    fn predict(&mut self, prompts: &SegmentationRequest, multimask_output: bool)
        -> Result<Predictions>;
}

/// A loaded segmenter with the device it runs on
pub struct LoadedSegmenter {
    pub segmenter: Box<dyn PromptableSegmenter>,
    pub device: String,
}

impl std::fmt::Debug for LoadedSegmenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedSegmenter")
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

/// Constructs the segmentation predictor on first use
pub trait SegmenterFactory: Send + Sync {
    /// # Errors
    /// - Model loading failures
    fn create_segmenter(&self, config: &ServiceConfig) -> Result<LoadedSegmenter>;
}

impl Predictions {
    /// First mask of the batch
    ///
    /// # Errors
    /// - The predictor returned no masks
    pub fn first_mask(&self) -> Result<ndarray::ArrayView2<'_, f32>> {
        if self.masks.shape().first().copied().unwrap_or(0) == 0 {
            return Err(ClearCutError::processing("Predictor returned no masks"));
        }
        Ok(self.masks.index_axis(ndarray::Axis(0), 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba};
    use std::io::Cursor;

    #[test]
    fn test_pipeline_output_image_normalises() {
        let rgb = DynamicImage::ImageRgb8(RgbImage::from_pixel(3, 2, image::Rgb([9, 8, 7])));
        let rgba = PipelineOutput::Image(rgb).into_rgba().unwrap();
        assert_eq!(rgba.dimensions(), (3, 2));
        assert_eq!(rgba.get_pixel(0, 0), &Rgba([9, 8, 7, 255]));
    }

    #[test]
    fn test_pipeline_output_encoded_normalises() {
        let source = RgbaImage::from_pixel(4, 4, Rgba([1, 2, 3, 100]));
        let mut bytes = Vec::new();
        source
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        let rgba = PipelineOutput::Encoded(bytes).into_rgba().unwrap();
        assert_eq!(rgba, source);
    }

    #[test]
    fn test_pipeline_output_garbage_fails() {
        assert!(PipelineOutput::Encoded(vec![0, 1, 2]).into_rgba().is_err());
    }

    #[test]
    fn test_first_mask_requires_masks() {
        let empty = Predictions {
            masks: Array3::zeros((0, 2, 2)),
            iou_predictions: Vec::new(),
        };
        assert!(empty.first_mask().is_err());

        let one = Predictions {
            masks: Array3::from_elem((1, 2, 3), 1.0),
            iou_predictions: vec![0.9],
        };
        assert_eq!(one.first_mask().unwrap().dim(), (2, 3));
    }
}
