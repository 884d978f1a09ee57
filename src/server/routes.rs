//! Route handlers and router assembly

use crate::{
    error::{ClearCutError, Result},
    server::{errors::ApiError, state::AppState},
    services::{ImageCodec, UploadGuard},
    types::{SegmentationRequest, MSG_BAD_JSON},
};
use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::TryStreamExt;
use std::sync::Arc;
use tokio_util::io::StreamReader;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{error, warn, Level};

const FILE_FIELD: &str = "file";
const REQ_FIELD: &str = "req";
/// Ceiling for the JSON prompt field
const MAX_REQ_BYTES: usize = 64 * 1024;

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

/// Fields read from a multipart upload
///
/// The file read outcome is kept as-is so that prompt validation can be
/// reported before an oversize upload.
struct UploadForm {
    file: Option<Result<Vec<u8>>>,
    req: Option<String>,
}

fn form_error(err: impl std::fmt::Display) -> ClearCutError {
    warn!(error = %err, "malformed multipart body");
    ClearCutError::invalid_request("Invalid multipart form.")
}

async fn read_form(guard: &UploadGuard, multipart: &mut Multipart) -> Result<UploadForm> {
    let mut form = UploadForm {
        file: None,
        req: None,
    };

    while let Some(field) = multipart.next_field().await.map_err(form_error)? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some(FILE_FIELD) if form.file.is_none() => {
                let content_type = field.content_type().map(str::to_owned);
                UploadGuard::check_content_type(content_type.as_deref())?;
                let reader = StreamReader::new(field.map_err(std::io::Error::other));
                tokio::pin!(reader);
                form.file = Some(guard.read_limited(reader).await);
            },
            Some(REQ_FIELD) if form.req.is_none() => {
                let reader = StreamReader::new(field.map_err(std::io::Error::other));
                tokio::pin!(reader);
                let raw = UploadGuard::new(MAX_REQ_BYTES)
                    .read_limited(reader)
                    .await
                    .map_err(|_| ClearCutError::invalid_request(MSG_BAD_JSON))?;
                let text = String::from_utf8(raw)
                    .map_err(|_| ClearCutError::invalid_request(MSG_BAD_JSON))?;
                form.req = Some(text);
            },
            _ => {},
        }
    }
    Ok(form)
}

/// Run CPU-bound work on the blocking pool, turning a panic into `on_panic`
async fn run_blocking<T, F>(task: F, on_panic: fn() -> ClearCutError) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task).await.map_err(|e| {
        error!(error = %e, "blocking task did not complete");
        on_panic()
    })?
}

fn png_response(bytes: Vec<u8>) -> Response {
    (
        [(header::CONTENT_TYPE, HeaderValue::from_static("image/png"))],
        bytes,
    )
        .into_response()
}

pub async fn remove_png(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> std::result::Result<Response, ApiError> {
    let mut multipart = multipart.map_err(form_error)?;
    let form = read_form(&state.upload, &mut multipart).await?;
    let bytes = form
        .file
        .ok_or_else(|| ClearCutError::invalid_request("file is required."))??;

    let removal = Arc::clone(&state.removal);
    let png = run_blocking(
        move || {
            let image = ImageCodec::decode_rgba(&bytes)?;
            let output = removal.remove_background(&image)?;
            ImageCodec::encode_rgba_png(output)
        },
        || ClearCutError::RemovalFailed("Panic".to_string()),
    )
    .await?;
    Ok(png_response(png))
}

pub async fn sam_mask(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> std::result::Result<Response, ApiError> {
    let mut multipart = multipart.map_err(form_error)?;
    let form = read_form(&state.upload, &mut multipart).await?;
    let file = form
        .file
        .ok_or_else(|| ClearCutError::invalid_request("file is required."))?;
    let raw = form
        .req
        .ok_or_else(|| ClearCutError::invalid_request("req is required."))?;
    let prompts = SegmentationRequest::parse(&raw)?;
    let bytes = file?;

    let segmentation = Arc::clone(&state.segmentation);
    let png = run_blocking(
        move || {
            let image = ImageCodec::decode_rgb(&bytes)?;
            let mask = segmentation.segment(&image, &prompts)?;
            ImageCodec::encode_mask_png(mask)
        },
        || ClearCutError::SegmentationFailed("Panic".to_string()),
    )
    .await?;
    Ok(png_response(png))
}

/// CORS policy: configured origins with credentials, methods and headers mirrored
///
/// An origin of `*` mirrors the request origin.
#[must_use]
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::mirror_request()
    } else {
        let origins: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin = %origin, "ignoring invalid CORS origin");
                    None
                },
            })
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
}

/// Build the application router
///
/// The framework body limit is disabled; uploads are bounded by the
/// [`UploadGuard`] instead.
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_origins);

    Router::new()
        .route("/health", get(health))
        .route("/remove_png", post(remove_png))
        .route("/sam_mask", post(sam_mask))
        .with_state(state)
        .layer(DefaultBodyLimit::disable())
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO))
                .on_failure(DefaultOnFailure::new().level(Level::ERROR)),
        )
}
