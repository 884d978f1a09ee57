//! Salient-object background removal on a U²-Net family ONNX model

use crate::backends::onnx::{build_session, extract_output, Device};
use crate::config::{MattingConfig, ServiceConfig};
use crate::error::{ClearCutError, Result};
use crate::inference::{PipelineOutput, RemovalPipeline};
use crate::matting::AlphaMatting;
use crate::models::PreprocessingConfig;
use crate::utils::ImagePreprocessor;
use image::{DynamicImage, GrayImage, RgbaImage};
use ndarray::{Axis, Ix2};
use ort::session::Session;
use ort::value::Value;
use std::sync::Mutex;
use std::time::Instant;

/// U²-Net saliency model followed by native alpha matting
///
/// The session needs exclusive access to run; the lock is released before
/// matting so concurrent requests only serialize on inference.
pub struct OnnxRemovalPipeline {
    session: Mutex<Session>,
    device: Device,
}

impl std::fmt::Debug for OnnxRemovalPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxRemovalPipeline")
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

impl OnnxRemovalPipeline {
    /// Load the removal model configured in `config`
    ///
    /// # Errors
    /// - Missing or invalid model file
    pub fn load(config: &ServiceConfig) -> Result<Self> {
        let start = Instant::now();
        let (session, device) = build_session(&config.removal.model_path, &config.runtime)?;
        log::info!(
            "Loaded removal model {} on {device} in {:.0}ms",
            config.removal.model_path.display(),
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(Self {
            session: Mutex::new(session),
            device,
        })
    }

    #[must_use]
    pub fn device(&self) -> Device {
        self.device
    }

    /// Run the saliency model and return a mask at the source size
    fn predict_mask(&self, image: &RgbaImage) -> Result<GrayImage> {
        let rgb = DynamicImage::ImageRgba8(image.clone()).into_rgb8();
        let tensor = ImagePreprocessor::u2net_tensor(&rgb, &PreprocessingConfig::U2NET)?;
        let input = Value::from_array(tensor)
            .map_err(|e| ClearCutError::processing(format!("Failed to convert input tensor: {e}")))?;

        let inference_start = Instant::now();
        let output = {
            let mut session = self
                .session
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let outputs = session.run(ort::inputs![input]).map_err(|e| {
                ClearCutError::inference_error_with_provider(
                    &self.device.to_string(),
                    "Saliency inference",
                    &e.to_string(),
                )
            })?;
            extract_output(&outputs, None)?
        };
        log::debug!(
            "Saliency inference: {:.2}ms",
            inference_start.elapsed().as_secs_f64() * 1000.0
        );

        // (1, 1, H, W) -> (H, W)
        if output.ndim() != 4 || output.shape().iter().take(2).any(|&d| d == 0) {
            return Err(ClearCutError::processing(format!(
                "Expected (1, 1, H, W) saliency output, got {:?}",
                output.shape()
            )));
        }
        let prediction = output
            .index_axis(Axis(0), 0)
            .index_axis_move(Axis(0), 0)
            .into_dimensionality::<Ix2>()
            .map_err(|e| ClearCutError::processing(format!("Unexpected saliency shape: {e}")))?;
        ImagePreprocessor::saliency_to_mask(prediction, image.width(), image.height())
    }
}

impl RemovalPipeline for OnnxRemovalPipeline {
    fn remove(&self, image: &RgbaImage, matting: &MattingConfig) -> Result<PipelineOutput> {
        let mask = self.predict_mask(image)?;
        let cutout = AlphaMatting::new(*matting).apply(image, &mask)?;
        Ok(PipelineOutput::Image(DynamicImage::ImageRgba8(cutout)))
    }
}
