//! Segment Anything predictor on exported encoder/decoder ONNX graphs

use crate::backends::onnx::{build_session, extract_output, Device};
use crate::config::ServiceConfig;
use crate::error::{ClearCutError, Result};
use crate::inference::{Predictions, PromptableSegmenter};
use crate::models::{PreprocessingConfig, SAM_MASK_INPUT_SIZE};
use crate::types::SegmentationRequest;
use crate::utils::{ImagePreprocessor, ResizeLongestSide};
use image::RgbImage;
use ndarray::{s, Array1, Array2, Array3, Array4, ArrayD, Axis, Ix3};
use ort::session::Session;
use ort::value::Value;
use std::time::Instant;

/// Label of the top-left box corner
const BOX_TOP_LEFT_LABEL: f32 = 2.0;
/// Label of the bottom-right box corner
const BOX_BOTTOM_RIGHT_LABEL: f32 = 3.0;
/// Label of the padding point appended when no box is given
const PADDING_LABEL: f32 = -1.0;

struct ImageEmbedding {
    features: ArrayD<f32>,
    width: u32,
    height: u32,
}

/// Stateful SAM predictor: one encoder pass per image, one decoder pass per prompt set
pub struct OnnxSamPredictor {
    encoder: Session,
    decoder: Session,
    transform: ResizeLongestSide,
    embedding: Option<ImageEmbedding>,
    device: Device,
}

impl std::fmt::Debug for OnnxSamPredictor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxSamPredictor")
            .field("device", &self.device)
            .field("has_image", &self.embedding.is_some())
            .finish_non_exhaustive()
    }
}

impl OnnxSamPredictor {
    /// Load encoder and decoder checkpoints named by `config`
    ///
    /// # Errors
    /// - `ModelNotFound` for a missing encoder or decoder file
    /// - `Model` when ONNX Runtime rejects a graph
    pub fn load(config: &ServiceConfig) -> Result<Self> {
        let segmentation = &config.segmentation;
        let (encoder, device) = build_session(&segmentation.checkpoint, &config.runtime)?;
        let (decoder, _) = build_session(&segmentation.decoder_path(), &config.runtime)?;
        Ok(Self {
            encoder,
            decoder,
            transform: ResizeLongestSide::new(PreprocessingConfig::SAM.target_size),
            embedding: None,
            device,
        })
    }

    #[must_use]
    pub fn device(&self) -> Device {
        self.device
    }
}

/// Build decoder point inputs in the resized frame
///
/// A box adds its two corners (labels 2 and 3); otherwise a padding point at
/// the origin with label -1 is appended.
fn prompt_tensors(
    transform: &ResizeLongestSide,
    prompts: &SegmentationRequest,
    width: u32,
    height: u32,
) -> (Array3<f32>, Array2<f32>) {
    let mut coords = prompts.points.clone();
    let mut labels: Vec<f32> = prompts.labels.iter().map(|&l| l as f32).collect();

    match prompts.bbox {
        Some([x1, y1, x2, y2]) => {
            coords.push([x1, y1]);
            coords.push([x2, y2]);
            labels.push(BOX_TOP_LEFT_LABEL);
            labels.push(BOX_BOTTOM_RIGHT_LABEL);
        },
        None => {
            coords.push([0.0, 0.0]);
            labels.push(PADDING_LABEL);
        },
    }

    let mapped = transform.apply_coords(&coords, width, height);

    let n = mapped.len();
    let point_coords =
        Array3::from_shape_fn((1, n, 2), |(_, i, j)| mapped.get(i).map_or(0.0, |p| p[j]));
    let point_labels =
        Array2::from_shape_fn((1, n), |(_, i)| labels.get(i).copied().unwrap_or(0.0));
    (point_coords, point_labels)
}

fn to_value<D: ndarray::Dimension + 'static>(
    array: ndarray::Array<f32, D>,
    name: &str,
) -> Result<Value> {
    Value::from_array(array)
        .map(|tensor| tensor.into_dyn())
        .map_err(|e| ClearCutError::processing(format!("Failed to convert {name} tensor: {e}")))
}

impl PromptableSegmenter for OnnxSamPredictor {
    fn set_image(&mut self, image: &RgbImage) -> Result<()> {
        let start = Instant::now();
        let (tensor, _) = ImagePreprocessor::sam_tensor(image, &PreprocessingConfig::SAM)?;
        let input = to_value(tensor, "image")?;

        let outputs = self.encoder.run(ort::inputs![input]).map_err(|e| {
            ClearCutError::inference_error_with_provider(
                &self.device.to_string(),
                "Image encoding",
                &e.to_string(),
            )
        })?;
        let features = extract_output(&outputs, None)?;
        drop(outputs);

        self.embedding = Some(ImageEmbedding {
            features,
            width: image.width(),
            height: image.height(),
        });
        log::debug!(
            "Image embedding computed in {:.2}ms",
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(())
    }

    fn predict(
        &mut self,
        prompts: &SegmentationRequest,
        multimask_output: bool,
    ) -> Result<Predictions> {
        let embedding = self
            .embedding
            .as_ref()
            .ok_or_else(|| ClearCutError::processing("An image must be set before predicting"))?;
        let (width, height) = (embedding.width, embedding.height);
        let (point_coords, point_labels) = prompt_tensors(&self.transform, prompts, width, height);

        let inputs = ort::inputs![
            "image_embeddings" => to_value(embedding.features.clone(), "image_embeddings")?,
            "point_coords" => to_value(point_coords, "point_coords")?,
            "point_labels" => to_value(point_labels, "point_labels")?,
            "mask_input" => to_value(
                Array4::<f32>::zeros((1, 1, SAM_MASK_INPUT_SIZE, SAM_MASK_INPUT_SIZE)),
                "mask_input",
            )?,
            "has_mask_input" => to_value(Array1::<f32>::zeros(1), "has_mask_input")?,
            "orig_im_size" => to_value(
                Array1::from_vec(vec![height as f32, width as f32]),
                "orig_im_size",
            )?,
        ];

        let start = Instant::now();
        let outputs = self.decoder.run(inputs).map_err(|e| {
            ClearCutError::inference_error_with_provider(
                &self.device.to_string(),
                "Prompt decoding",
                &e.to_string(),
            )
        })?;
        let masks = extract_output(&outputs, Some("masks"))?;
        let scores = extract_output(&outputs, Some("iou_predictions"))?;
        drop(outputs);
        log::debug!(
            "Prompt decoding: {:.2}ms",
            start.elapsed().as_secs_f64() * 1000.0
        );

        // (1, N, H, W) -> (N, H, W)
        if masks.ndim() != 4 || masks.shape().first().copied().unwrap_or(0) == 0 {
            return Err(ClearCutError::processing(format!(
                "Expected (1, N, H, W) masks, got {:?}",
                masks.shape()
            )));
        }
        let mut masks = masks
            .index_axis_move(Axis(0), 0)
            .into_dimensionality::<Ix3>()
            .map_err(|e| ClearCutError::processing(format!("Unexpected mask shape: {e}")))?;
        let mut iou_predictions: Vec<f32> = scores.iter().copied().collect();

        if !multimask_output && masks.len_of(Axis(0)) > 1 {
            masks = masks.slice(s![0..1, .., ..]).to_owned();
            iou_predictions.truncate(1);
        }

        Ok(Predictions {
            masks,
            iou_predictions,
        })
    }
}
