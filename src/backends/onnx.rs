//! ONNX Runtime session construction shared by both model pipelines
//!
//! Sessions are built with full graph optimization and the execution provider
//! selected in [`RuntimeConfig`]. Unavailable accelerators fall back to CPU
//! with a warning; the device actually chosen is returned to the caller.

use crate::config::{ExecutionProvider, RuntimeConfig};
use crate::error::{ClearCutError, Result};
use crate::models::ensure_model_file;
use ndarray::ArrayD;
use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
};
use ort::session::{builder::GraphOptimizationLevel, Session, SessionOutputs};
use std::path::Path;

/// Compute device a session was configured for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cuda,
    CoreMl,
    Cpu,
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
            Self::Cpu => write!(f, "cpu"),
        }
    }
}

fn cuda_available() -> bool {
    OrtExecutionProvider::is_available(&CUDAExecutionProvider::default()).unwrap_or(false)
}

fn coreml_available() -> bool {
    OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default()).unwrap_or(false)
}

/// List all ONNX Runtime execution providers with availability status and descriptions
///
/// Returns `(name, available, description)` tuples.
///
/// # Examples
/// ```rust,no_run
/// use clearcut::backends::onnx::list_providers;
///
/// for (name, available, description) in list_providers() {
///     println!("{}: {} - {}", name, if available { "yes" } else { "no" }, description);
/// }
/// ```
#[must_use]
pub fn list_providers() -> Vec<(String, bool, String)> {
    log::debug!(
        "Platform: {os}/{arch}, {cores} CPU cores",
        os = std::env::consts::OS,
        arch = std::env::consts::ARCH,
        cores = std::thread::available_parallelism()
            .map(std::num::NonZero::get)
            .unwrap_or(1)
    );

    let cuda = cuda_available();
    let coreml = coreml_available();
    log::debug!("CUDA available: {cuda}, CoreML available: {coreml}");

    vec![
        (
            "CPU".to_string(),
            true,
            "Always available, uses CPU for inference".to_string(),
        ),
        (
            "CUDA".to_string(),
            cuda,
            "NVIDIA GPU acceleration (requires CUDA toolkit and compatible GPU)".to_string(),
        ),
        (
            "CoreML".to_string(),
            coreml,
            "Apple Silicon GPU acceleration (macOS only)".to_string(),
        ),
    ]
}

/// Resolve the device a requested provider will actually run on
#[must_use]
pub fn resolve_device(requested: ExecutionProvider) -> Device {
    match requested {
        ExecutionProvider::Auto if cuda_available() => Device::Cuda,
        ExecutionProvider::Auto if coreml_available() => Device::CoreMl,
        ExecutionProvider::Auto | ExecutionProvider::Cpu => Device::Cpu,
        ExecutionProvider::Cuda => {
            if cuda_available() {
                Device::Cuda
            } else {
                log::warn!("CUDA execution provider requested but not available, falling back to CPU");
                Device::Cpu
            }
        },
        ExecutionProvider::CoreMl => {
            if coreml_available() {
                Device::CoreMl
            } else {
                log::warn!(
                    "CoreML execution provider requested but not available, falling back to CPU"
                );
                Device::Cpu
            }
        },
    }
}

/// Build an ONNX Runtime session for the model at `path`
///
/// # Errors
/// - `ModelNotFound` when the file does not exist
/// - `Model` when ONNX Runtime rejects the configuration or the graph
pub fn build_session(path: &Path, runtime: &RuntimeConfig) -> Result<(Session, Device)> {
    ensure_model_file(path)?;
    let load_error = |operation: &str, e: ort::Error| {
        ClearCutError::model_error_with_context(
            operation,
            path,
            &e.to_string(),
            &["check that the file is a valid ONNX graph", "try EXECUTION_PROVIDER=cpu"],
        )
    };

    let device = resolve_device(runtime.execution_provider);
    let mut builder = Session::builder()
        .map_err(|e| load_error("create session for", e))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| load_error("optimize", e))?;

    builder = match device {
        Device::Cuda => builder
            .with_execution_providers([CUDAExecutionProvider::default().build()])
            .map_err(|e| load_error("configure CUDA for", e))?,
        Device::CoreMl => builder
            .with_execution_providers([CoreMLExecutionProvider::default()
                .with_subgraphs(true)
                .build()])
            .map_err(|e| load_error("configure CoreML for", e))?,
        Device::Cpu => builder,
    };

    if runtime.intra_threads > 0 {
        builder = builder
            .with_intra_threads(runtime.intra_threads)
            .map_err(|e| load_error("set intra threads for", e))?;
    }
    if runtime.inter_threads > 0 {
        builder = builder
            .with_inter_threads(runtime.inter_threads)
            .map_err(|e| load_error("set inter threads for", e))?;
    }

    let session = builder
        .commit_from_file(path)
        .map_err(|e| load_error("load", e))?;
    log::debug!(
        "ONNX session ready: {} on {device} ({} intra, {} inter threads; 0 = runtime default)",
        path.display(),
        runtime.intra_threads,
        runtime.inter_threads
    );
    Ok((session, device))
}

/// Copy a named output, or the first output when `name` is `None`, into an owned array
///
/// # Errors
/// - Missing output or non-f32 tensor
pub fn extract_output(outputs: &SessionOutputs<'_>, name: Option<&str>) -> Result<ArrayD<f32>> {
    let value = match name {
        Some(name) => outputs
            .get(name)
            .ok_or_else(|| ClearCutError::processing(format!("Output tensor '{name}' not found")))?,
        None => {
            let first_key = outputs
                .keys()
                .next()
                .ok_or_else(|| ClearCutError::processing("No output tensors found"))?;
            outputs
                .get(first_key)
                .ok_or_else(|| ClearCutError::processing("First output tensor not found"))?
        },
    };

    let view = value
        .try_extract_array::<f32>()
        .map_err(|e| ClearCutError::processing(format!("Failed to extract output tensor: {e}")))?;
    Ok(view.to_owned())
}
