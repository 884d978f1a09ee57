//! Background removal service
//!
//! Wraps the removal pipeline with fixed alpha matting parameters. The
//! pipeline is constructed on first use and shared for the process lifetime.

use crate::{
    config::ServiceConfig,
    error::{ClearCutError, Result},
    inference::{RemovalPipeline, RemovalPipelineFactory},
};
use image::RgbaImage;
use once_cell::sync::OnceCell;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument};

/// Removes backgrounds from RGBA images
pub struct BackgroundRemovalService {
    config: Arc<ServiceConfig>,
    factory: Arc<dyn RemovalPipelineFactory>,
    pipeline: OnceCell<Box<dyn RemovalPipeline>>,
}

impl std::fmt::Debug for BackgroundRemovalService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundRemovalService")
            .field("model", &self.config.removal.model_path)
            .field("loaded", &self.is_loaded())
            .finish_non_exhaustive()
    }
}

impl BackgroundRemovalService {
    /// Create a service that builds its pipeline lazily through `factory`
    pub fn new(config: Arc<ServiceConfig>, factory: Arc<dyn RemovalPipelineFactory>) -> Self {
        Self {
            config,
            factory,
            pipeline: OnceCell::new(),
        }
    }

    /// Whether the pipeline has been constructed
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.pipeline.get().is_some()
    }

    /// Construct the pipeline now instead of on first request
    ///
    /// # Errors
    /// - Pipeline construction failures, unmapped
    pub fn preload(&self) -> Result<()> {
        self.pipeline().map(|_| ())
    }

    fn pipeline(&self) -> Result<&dyn RemovalPipeline> {
        self.pipeline
            .get_or_try_init(|| {
                let start = Instant::now();
                let pipeline = self.factory.create_pipeline(&self.config)?;
                info!(
                    model = %self.config.removal.model_path.display(),
                    load_ms = start.elapsed().as_millis() as u64,
                    "Background removal pipeline ready"
                );
                Ok(pipeline)
            })
            .map(AsRef::as_ref)
    }

    /// Remove the background of `image`
    ///
    /// # Errors
    /// - `RemovalFailed` carrying only the category of the underlying failure
    #[instrument(skip(self, image), fields(width = image.width(), height = image.height()))]
    pub fn remove_background(&self, image: &RgbaImage) -> Result<RgbaImage> {
        let start = Instant::now();
        let result = self
            .pipeline()
            .and_then(|pipeline| pipeline.remove(image, &self.config.removal.matting))
            .and_then(crate::inference::PipelineOutput::into_rgba);

        match result {
            Ok(output) => {
                debug!(
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Background removed"
                );
                Ok(output)
            },
            Err(e) => {
                error!(category = e.category(), error = %e, "Background removal failed");
                Err(ClearCutError::RemovalFailed(e.category().to_string()))
            },
        }
    }
}
