//! Backend implementations of the model pipelines
//!
//! - ONNX Runtime backends (U²-Net removal, SAM encoder/decoder), feature `onnx`
//! - Mock backends for tests and local development without model files

#[cfg(feature = "onnx")]
pub mod onnx;

#[cfg(feature = "onnx")]
pub mod sam;

#[cfg(feature = "onnx")]
pub mod u2net;

#[cfg(feature = "onnx")]
pub mod factory;

pub mod mock;

#[cfg(feature = "onnx")]
pub use self::{
    factory::OnnxBackendFactory, onnx::Device, sam::OnnxSamPredictor, u2net::OnnxRemovalPipeline,
};

pub use self::mock::{
    MockRemovalMode, MockRemovalPipeline, MockRemovalPipelineFactory, MockSegmenter,
    MockSegmenterFactory,
};
