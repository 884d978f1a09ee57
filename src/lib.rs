#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # ClearCut
//!
//! HTTP service for automatic background removal and point/box-prompted
//! segmentation, running its models on ONNX Runtime.
//!
//! ## Endpoints
//!
//! - `GET /health` returns `{"ok": true}`
//! - `POST /remove_png` takes a multipart `file` and returns an RGBA PNG with
//!   the background matted out
//! - `POST /sam_mask` takes a multipart `file` plus a JSON `req` field with
//!   `points`, `labels` and an optional `box`, and returns a grayscale PNG mask
//!
//! Errors are JSON bodies of the form `{"detail": "..."}`.
//!
//! ## Embedding the router
//!
//! ```rust,no_run
//! use clearcut::{server::{build_router, AppState}, ServiceConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ServiceConfig::from_env()?;
//! let app = build_router(AppState::with_onnx(config));
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8000").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `onnx` (default): ONNX Runtime backends with CUDA and `CoreML` providers
//! - `cli` (default): the `clearcut-api` server binary
//! - `webp-support` (default): WebP uploads
//! - `tracing-json`: JSON log output
//!
//! Without `onnx` the crate still builds the HTTP layer; pipelines are then
//! supplied through [`inference::RemovalPipelineFactory`] and
//! [`inference::SegmenterFactory`], for instance the mocks in
//! [`backends::mock`].

pub mod backends;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod inference;
pub mod matting;
pub mod models;
pub mod server;
pub mod services;
pub mod tracing_config;
pub mod types;
pub mod utils;

// Public API exports
pub use backends::*;
pub use config::{
    ExecutionProvider, MattingConfig, RemovalConfig, RuntimeConfig, SegmentationConfig,
    ServiceConfig, ServiceConfigBuilder,
};
pub use error::{ClearCutError, Result};
pub use inference::{
    LoadedSegmenter, PipelineOutput, Predictions, PromptableSegmenter, RemovalPipeline,
    RemovalPipelineFactory, SegmenterFactory,
};
pub use matting::{AlphaMatting, Trimap};
pub use models::{PreprocessingConfig, SamModelType};
pub use server::{build_router, AppState};
pub use services::{
    BackgroundRemovalService, ColorMode, ImageCodec, PredictorHandle, SegmentationService,
    UploadGuard,
};
pub use tracing_config::{TracingConfig, TracingFormat};
pub use types::SegmentationRequest;
pub use utils::{ExecutionProviderManager, ImagePreprocessor, ProviderInfo, ResizeLongestSide};
