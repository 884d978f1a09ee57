//! Error types for background removal and segmentation operations

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for service operations
pub type Result<T> = std::result::Result<T, ClearCutError>;

/// Error kinds surfaced by the upload, codec, model and service layers
#[derive(Error, Debug)]
pub enum ClearCutError {
    /// Upload declared a content type outside the allow-list
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// Upload exceeded the configured byte ceiling
    #[error("Payload too large: more than {limit} bytes")]
    PayloadTooLarge { limit: usize },

    /// Bytes could not be decoded as an image
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// Malformed form data or segmentation prompt payload
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Background removal pipeline failed; carries the failure category only
    #[error("Removal failed: {0}")]
    RemovalFailed(String),

    /// Segmentation predictor failed; carries the failure category only
    #[error("SAM failed: {0}")]
    SegmentationFailed(String),

    /// Segmentation checkpoint missing at load time
    #[error("Model checkpoint not found: {}", .0.display())]
    ModelNotFound(PathBuf),

    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image format or processing errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Backend inference errors
    #[error("Inference error: {0}")]
    Inference(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Model loading or initialization errors
    #[error("Model error: {0}")]
    Model(String),

    /// Tensor shape or post-processing errors
    #[error("Processing error: {0}")]
    Processing(String),
}

impl ClearCutError {
    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new invalid request error
    pub fn invalid_request<S: Into<String>>(msg: S) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Create a new invalid image error
    pub fn invalid_image<S: Into<String>>(msg: S) -> Self {
        Self::InvalidImage(msg.into())
    }

    /// Create a new model error
    pub fn model<S: Into<String>>(msg: S) -> Self {
        Self::Model(msg.into())
    }

    /// Create a new processing error
    pub fn processing<S: Into<String>>(msg: S) -> Self {
        Self::Processing(msg.into())
    }

    /// Create a new inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    /// Create model error with troubleshooting context
    pub fn model_error_with_context<P: AsRef<std::path::Path>>(
        operation: &str,
        model_path: P,
        error: &str,
        suggestions: &[&str],
    ) -> Self {
        let path_display = model_path.as_ref().display();
        let suggestion_text = if suggestions.is_empty() {
            String::new()
        } else {
            format!(" Suggestions: {}", suggestions.join(", "))
        };

        Self::Model(format!(
            "Failed to {} model '{}': {}.{}",
            operation, path_display, error, suggestion_text
        ))
    }

    /// Create inference error with provider context
    pub fn inference_error_with_provider(provider: &str, operation: &str, error: &str) -> Self {
        Self::Inference(format!(
            "{} failed using '{}' provider: {}",
            operation, provider, error
        ))
    }

    /// Name of the failure category, safe to report at the HTTP boundary
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::UnsupportedMediaType(_) => "UnsupportedMediaType",
            Self::PayloadTooLarge { .. } => "PayloadTooLarge",
            Self::InvalidImage(_) => "InvalidImage",
            Self::InvalidRequest(_) => "InvalidRequest",
            Self::RemovalFailed(_) => "RemovalFailed",
            Self::SegmentationFailed(_) => "SegmentationFailed",
            Self::ModelNotFound(_) => "ModelNotFound",
            Self::Io(_) => "IoError",
            Self::Image(_) => "ImageError",
            Self::Inference(_) => "InferenceError",
            Self::InvalidConfig(_) => "ConfigError",
            Self::Model(_) => "ModelError",
            Self::Processing(_) => "ProcessingError",
        }
    }

    /// Whether the error was caused by the client's input
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedMediaType(_)
                | Self::PayloadTooLarge { .. }
                | Self::InvalidImage(_)
                | Self::InvalidRequest(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_error_creation() {
        let err = ClearCutError::invalid_config("test config error");
        assert!(matches!(err, ClearCutError::InvalidConfig(_)));

        let err = ClearCutError::invalid_request("points/labels required.");
        assert!(matches!(err, ClearCutError::InvalidRequest(_)));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_error_display() {
        let err = ClearCutError::invalid_config("Invalid model path");
        assert_eq!(err.to_string(), "Invalid configuration: Invalid model path");

        let err = ClearCutError::ModelNotFound(Path::new("/models/sam.onnx").to_path_buf());
        assert_eq!(
            err.to_string(),
            "Model checkpoint not found: /models/sam.onnx"
        );
    }

    #[test]
    fn test_category_names_hide_details() {
        let err = ClearCutError::inference("CUDA out of memory at 0xdeadbeef");
        assert_eq!(err.category(), "InferenceError");
        assert!(!err.category().contains("0xdeadbeef"));

        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        assert_eq!(ClearCutError::from(io).category(), "IoError");
        assert!(!ClearCutError::RemovalFailed("ModelError".into()).is_client_error());
    }

    #[test]
    fn test_enhanced_error_context() {
        let err = ClearCutError::model_error_with_context(
            "initialize",
            Path::new("/models/invalid.onnx"),
            "file not found",
            &["check file path", "verify permissions"],
        );
        let error_string = err.to_string();
        assert!(error_string.contains("initialize"));
        assert!(error_string.contains("/models/invalid.onnx"));
        assert!(error_string.contains("Suggestions"));

        let err = ClearCutError::inference_error_with_provider(
            "cuda",
            "Model inference",
            "out of memory",
        );
        let error_string = err.to_string();
        assert!(error_string.contains("cuda"));
        assert!(error_string.contains("Model inference"));
    }
}
