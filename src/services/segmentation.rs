//! Prompted segmentation service
//!
//! Owns the process-wide predictor. The predictor is built on first use,
//! never reloaded, and only reachable through [`PredictorHandle::segment`],
//! which holds the lock across the image/prompt pair.

use crate::{
    config::ServiceConfig,
    error::{ClearCutError, Result},
    inference::{PromptableSegmenter, SegmenterFactory},
    models::{display_path, ensure_model_file, SamModelType},
    types::SegmentationRequest,
    utils::ImagePreprocessor,
};
use image::{GrayImage, RgbImage};
use once_cell::sync::OnceCell;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// Loaded predictor and the device it runs on
pub struct PredictorHandle {
    segmenter: Mutex<Box<dyn PromptableSegmenter>>,
    device: String,
    model_type: SamModelType,
}

impl std::fmt::Debug for PredictorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredictorHandle")
            .field("device", &self.device)
            .field("model_type", &self.model_type)
            .finish_non_exhaustive()
    }
}

impl PredictorHandle {
    #[must_use]
    pub fn device(&self) -> &str {
        &self.device
    }

    #[must_use]
    pub fn model_type(&self) -> SamModelType {
        self.model_type
    }

    /// Segment `image` with `prompts` into a 0/255 mask of the same size
    ///
    /// # Errors
    /// - `SegmentationFailed` carrying only the category of the underlying failure
    #[instrument(skip(self, image, prompts), fields(width = image.width(), height = image.height(), points = prompts.points.len()))]
    pub fn segment(&self, image: &RgbImage, prompts: &SegmentationRequest) -> Result<GrayImage> {
        let start = Instant::now();
        // every call sets the image again, so a poisoned predictor is still usable
        let mut segmenter = self.segmenter.lock().unwrap_or_else(PoisonError::into_inner);

        let result = segmenter
            .set_image(image)
            .and_then(|()| segmenter.predict(prompts, false))
            .and_then(|predictions| {
                let mask = ImagePreprocessor::logits_to_mask(predictions.first_mask()?);
                if mask.dimensions() != image.dimensions() {
                    return Err(ClearCutError::processing(format!(
                        "Mask is {}x{}, image is {}x{}",
                        mask.width(),
                        mask.height(),
                        image.width(),
                        image.height()
                    )));
                }
                Ok(mask)
            });
        drop(segmenter);

        match result {
            Ok(mask) => {
                debug!(
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Mask predicted"
                );
                Ok(mask)
            },
            Err(e) => {
                error!(category = e.category(), error = %e, "Segmentation failed");
                Err(ClearCutError::SegmentationFailed(e.category().to_string()))
            },
        }
    }
}

/// Lazily loads the predictor and runs prompted segmentation
pub struct SegmentationService {
    config: Arc<ServiceConfig>,
    factory: Arc<dyn SegmenterFactory>,
    // `Err` memoises a missing checkpoint
    predictor: OnceCell<std::result::Result<Arc<PredictorHandle>, PathBuf>>,
}

impl std::fmt::Debug for SegmentationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentationService")
            .field("checkpoint", &self.config.segmentation.checkpoint)
            .field("loaded", &self.is_loaded())
            .finish_non_exhaustive()
    }
}

impl SegmentationService {
    pub fn new(config: Arc<ServiceConfig>, factory: Arc<dyn SegmenterFactory>) -> Self {
        Self {
            config,
            factory,
            predictor: OnceCell::new(),
        }
    }

    /// Whether a predictor has been loaded successfully
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        matches!(self.predictor.get(), Some(Ok(_)))
    }

    /// The shared predictor, loading it on first call
    ///
    /// Concurrent first calls load once and observe the same handle. A missing
    /// checkpoint is remembered; other load failures are retried on the next call.
    ///
    /// # Errors
    /// - `ModelNotFound` when the encoder or decoder checkpoint is absent
    /// - Model loading failures
    pub fn predictor(&self) -> Result<Arc<PredictorHandle>> {
        let outcome = self.predictor.get_or_try_init(|| self.load())?;
        match outcome {
            Ok(handle) => Ok(Arc::clone(handle)),
            Err(path) => Err(ClearCutError::ModelNotFound(path.clone())),
        }
    }

    /// Load the predictor now instead of on first request
    ///
    /// # Errors
    /// - Same as [`Self::predictor`]
    pub fn preload(&self) -> Result<()> {
        self.predictor().map(|_| ())
    }

    fn load(&self) -> Result<std::result::Result<Arc<PredictorHandle>, PathBuf>> {
        let segmentation = &self.config.segmentation;
        let checkpoint = &segmentation.checkpoint;

        if let Err(e) = ensure_model_file(checkpoint) {
            error!(
                checkpoint = %display_path(checkpoint).display(),
                "SAM checkpoint not found; segmentation is unavailable until restart"
            );
            return match e {
                ClearCutError::ModelNotFound(path) => Ok(Err(path)),
                other => Err(other),
            };
        }

        let start = Instant::now();
        let loaded = match self.factory.create_segmenter(&self.config) {
            Ok(loaded) => loaded,
            Err(ClearCutError::ModelNotFound(path)) => {
                error!(path = %display_path(&path).display(), "SAM model file not found");
                return Ok(Err(path));
            },
            Err(e) => {
                warn!(error = %e, "SAM predictor failed to load");
                return Err(e);
            },
        };

        info!(
            model_type = %segmentation.model_type,
            device = %loaded.device,
            checkpoint = %display_path(checkpoint).display(),
            load_ms = start.elapsed().as_millis() as u64,
            "SAM predictor loaded"
        );

        Ok(Ok(Arc::new(PredictorHandle {
            segmenter: Mutex::new(loaded.segmenter),
            device: loaded.device,
            model_type: segmentation.model_type,
        })))
    }

    /// Segment `image` with validated `prompts`
    ///
    /// # Errors
    /// - `ModelNotFound` when no checkpoint is available
    /// - `SegmentationFailed` for load or predictor failures
    pub fn segment(&self, image: &RgbImage, prompts: &SegmentationRequest) -> Result<GrayImage> {
        let handle = self.predictor().map_err(|e| match e {
            ClearCutError::ModelNotFound(_) => e,
            other => ClearCutError::SegmentationFailed(other.category().to_string()),
        })?;
        handle.segment(image, prompts)
    }
}
