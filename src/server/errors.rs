//! HTTP mapping of service errors

use crate::error::ClearCutError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{debug, error};

/// Error returned by the route handlers
///
/// Only fixed messages and failure categories reach the client; internal
/// error text stays in the logs.
#[derive(Debug)]
pub struct ApiError(pub ClearCutError);

impl From<ClearCutError> for ApiError {
    fn from(err: ClearCutError) -> Self {
        Self(err)
    }
}

impl ApiError {
    /// Status code and client-facing detail message
    #[must_use]
    pub fn status_and_detail(&self) -> (StatusCode, String) {
        match &self.0 {
            ClearCutError::UnsupportedMediaType(_) => {
                (StatusCode::BAD_REQUEST, "Unsupported file type.".to_string())
            },
            ClearCutError::InvalidImage(_) => {
                (StatusCode::BAD_REQUEST, "Could not read image.".to_string())
            },
            ClearCutError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ClearCutError::PayloadTooLarge { .. } => {
                (StatusCode::PAYLOAD_TOO_LARGE, "File too large.".to_string())
            },
            ClearCutError::RemovalFailed(category) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Removal failed: {category}"),
            ),
            ClearCutError::SegmentationFailed(category) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("SAM failed: {category}"),
            ),
            ClearCutError::ModelNotFound(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Segmentation model unavailable.".to_string(),
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error.".to_string(),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = self.status_and_detail();
        if self.0.is_client_error() {
            debug!(status = status.as_u16(), error = %self.0, "request rejected");
        } else {
            error!(status = status.as_u16(), error = %self.0, "request failed");
        }
        (status, Json(serde_json::json!({ "detail": detail }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn mapped(err: ClearCutError) -> (u16, String) {
        let (status, detail) = ApiError(err).status_and_detail();
        (status.as_u16(), detail)
    }

    #[test]
    fn test_client_errors() {
        assert_eq!(
            mapped(ClearCutError::UnsupportedMediaType("text/plain".into())),
            (400, "Unsupported file type.".into())
        );
        assert_eq!(
            mapped(ClearCutError::invalid_image("bad magic")),
            (400, "Could not read image.".into())
        );
        assert_eq!(
            mapped(ClearCutError::invalid_request("box must be [x1,y1,x2,y2].")),
            (400, "box must be [x1,y1,x2,y2].".into())
        );
        assert_eq!(
            mapped(ClearCutError::PayloadTooLarge { limit: 10 }),
            (413, "File too large.".into())
        );
    }

    #[test]
    fn test_server_errors_hide_internals() {
        assert_eq!(
            mapped(ClearCutError::RemovalFailed("InferenceError".into())),
            (500, "Removal failed: InferenceError".into())
        );
        assert_eq!(
            mapped(ClearCutError::SegmentationFailed("Panic".into())),
            (500, "SAM failed: Panic".into())
        );
        assert_eq!(
            mapped(ClearCutError::ModelNotFound(PathBuf::from("/secret/sam.onnx"))),
            (503, "Segmentation model unavailable.".into())
        );
        assert_eq!(
            mapped(ClearCutError::processing("stack details")),
            (500, "Internal server error.".into())
        );
    }

    #[test]
    fn test_error_log_level_matches_status_class() {
        let errors = [
            ClearCutError::UnsupportedMediaType("text/plain".into()),
            ClearCutError::invalid_image("bad magic"),
            ClearCutError::invalid_request("req is required."),
            ClearCutError::PayloadTooLarge { limit: 10 },
            ClearCutError::RemovalFailed("Panic".into()),
            ClearCutError::ModelNotFound(PathBuf::from("/models/sam.onnx")),
            ClearCutError::model("bad graph"),
        ];
        for err in errors {
            let client = err.is_client_error();
            let (status, _) = ApiError(err).status_and_detail();
            assert_eq!(client, status.is_client_error(), "status {status}");
            assert_eq!(!client, status.is_server_error(), "status {status}");
        }
    }
}
