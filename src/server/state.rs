//! Shared application state handed to every route

use crate::{
    config::ServiceConfig,
    inference::{RemovalPipelineFactory, SegmenterFactory},
    services::{BackgroundRemovalService, SegmentationService, UploadGuard},
};
use std::sync::Arc;

/// Immutable configuration plus the long-lived services
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub removal: Arc<BackgroundRemovalService>,
    pub segmentation: Arc<SegmentationService>,
    pub upload: UploadGuard,
}

impl AppState {
    /// Wire the services around `config` with explicit model factories
    pub fn new(
        config: ServiceConfig,
        removal_factory: Arc<dyn RemovalPipelineFactory>,
        segmenter_factory: Arc<dyn SegmenterFactory>,
    ) -> Self {
        let config = Arc::new(config);
        Self {
            removal: Arc::new(BackgroundRemovalService::new(
                Arc::clone(&config),
                removal_factory,
            )),
            segmentation: Arc::new(SegmentationService::new(
                Arc::clone(&config),
                segmenter_factory,
            )),
            upload: UploadGuard::new(config.max_upload_bytes),
            config,
        }
    }

    /// State backed by the ONNX Runtime pipelines
    #[cfg(feature = "onnx")]
    pub fn with_onnx(config: ServiceConfig) -> Self {
        let factory = Arc::new(crate::backends::OnnxBackendFactory::new());
        Self::new(config, factory.clone(), factory)
    }
}
