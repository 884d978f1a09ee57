//! Shared utilities for tensor preparation and execution providers

pub mod preprocessing;
pub mod providers;

pub use preprocessing::{ImagePreprocessor, ResizeLongestSide};
pub use providers::{ExecutionProviderManager, ProviderInfo};
