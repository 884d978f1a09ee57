//! Backend factory that injects the ONNX Runtime pipelines into the services

use crate::backends::{OnnxRemovalPipeline, OnnxSamPredictor};
use crate::{
    config::ServiceConfig,
    error::Result,
    inference::{
        LoadedSegmenter, RemovalPipeline, RemovalPipelineFactory, SegmenterFactory,
    },
};

/// Factory producing the ONNX Runtime removal pipeline and SAM predictor
#[derive(Debug, Default, Clone, Copy)]
pub struct OnnxBackendFactory;

impl OnnxBackendFactory {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl RemovalPipelineFactory for OnnxBackendFactory {
    fn create_pipeline(&self, config: &ServiceConfig) -> Result<Box<dyn RemovalPipeline>> {
        Ok(Box::new(OnnxRemovalPipeline::load(config)?))
    }
}

impl SegmenterFactory for OnnxBackendFactory {
    fn create_segmenter(&self, config: &ServiceConfig) -> Result<LoadedSegmenter> {
        let predictor = OnnxSamPredictor::load(config)?;
        let device = predictor.device().to_string();
        Ok(LoadedSegmenter {
            segmenter: Box::new(predictor),
            device,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClearCutError;

    #[test]
    fn test_missing_removal_model_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServiceConfig::builder()
            .removal_model(dir.path().join("u2net.onnx"))
            .build()
            .unwrap();
        let err = OnnxBackendFactory::new()
            .create_pipeline(&config)
            .err()
            .unwrap();
        assert!(matches!(err, ClearCutError::ModelNotFound(_)));
    }

    #[test]
    fn test_missing_decoder_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = dir.path().join("sam_vit_b_encoder.onnx");
        std::fs::write(&encoder, b"placeholder").unwrap();
        let config = ServiceConfig::builder()
            .sam_checkpoint(&encoder)
            .build()
            .unwrap();
        // the placeholder encoder is rejected or the decoder is missing; either way no predictor
        assert!(OnnxBackendFactory::new().create_segmenter(&config).is_err());
    }
}
