//! Shared helpers for the HTTP integration tests

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::Router;
use clearcut::backends::mock::{MockRemovalMode, MockRemovalPipelineFactory, MockSegmenterFactory};
use clearcut::{build_router, AppState, ServiceConfig};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

pub const BOUNDARY: &str = "clearcut-test-boundary";

/// One part of a multipart/form-data body
pub struct Part {
    pub name: &'static str,
    pub filename: Option<&'static str>,
    pub content_type: Option<&'static str>,
    pub data: Vec<u8>,
}

impl Part {
    pub fn file(content_type: &'static str, data: Vec<u8>) -> Self {
        Self {
            name: "file",
            filename: Some("upload.bin"),
            content_type: Some(content_type),
            data,
        }
    }

    pub fn text(name: &'static str, value: &str) -> Self {
        Self {
            name,
            filename: None,
            content_type: None,
            data: value.as_bytes().to_vec(),
        }
    }
}

pub fn multipart_body(parts: &[Part]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        let mut disposition = format!("Content-Disposition: form-data; name=\"{}\"", part.name);
        if let Some(filename) = part.filename {
            disposition.push_str(&format!("; filename=\"{filename}\""));
        }
        body.extend_from_slice(disposition.as_bytes());
        body.extend_from_slice(b"\r\n");
        if let Some(content_type) = part.content_type {
            body.extend_from_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
        }
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(&part.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn multipart_request(uri: &str, parts: &[Part]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    pub fn detail(&self) -> String {
        self.json()["detail"].as_str().unwrap().to_string()
    }
}

pub async fn send(app: Router, request: Request<Body>) -> TestResponse {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec();
    TestResponse {
        status,
        headers,
        body,
    }
}

/// Configuration with a placeholder SAM checkpoint inside `dir`
pub fn config_with_checkpoint(dir: &TempDir) -> ServiceConfig {
    let checkpoint = dir.path().join("sam_vit_b_encoder.onnx");
    std::fs::write(&checkpoint, b"weights").unwrap();
    ServiceConfig::builder()
        .sam_checkpoint(checkpoint)
        .build()
        .unwrap()
}

pub fn config_without_checkpoint(dir: &Path) -> ServiceConfig {
    ServiceConfig::builder()
        .sam_checkpoint(dir.join("missing_encoder.onnx"))
        .build()
        .unwrap()
}

pub struct MockApp {
    pub state: AppState,
    pub removal: MockRemovalPipelineFactory,
    pub segmenter: MockSegmenterFactory,
}

impl MockApp {
    pub fn new(config: ServiceConfig) -> Self {
        Self::with_factories(
            config,
            MockRemovalPipelineFactory::new(MockRemovalMode::Image),
            MockSegmenterFactory::new(),
        )
    }

    pub fn with_factories(
        config: ServiceConfig,
        removal: MockRemovalPipelineFactory,
        segmenter: MockSegmenterFactory,
    ) -> Self {
        let state = AppState::new(
            config,
            Arc::new(removal.clone()),
            Arc::new(segmenter.clone()),
        );
        Self {
            state,
            removal,
            segmenter,
        }
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }
}

/// 100x100 image with a 20x20 block at (40,40)-(60,60)
pub fn block_image(block: Rgb<u8>, background: Rgb<u8>) -> RgbImage {
    RgbImage::from_fn(100, 100, |x, y| {
        if (40..60).contains(&x) && (40..60).contains(&y) {
            block
        } else {
            background
        }
    })
}

/// 64x64 dark image with a bright centred subject
pub fn subject_image() -> RgbaImage {
    RgbaImage::from_fn(64, 64, |x, y| {
        if (16..48).contains(&x) && (16..48).contains(&y) {
            Rgba([240, 200, 40, 255])
        } else {
            Rgba([10, 10, 10, 255])
        }
    })
}

pub fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), format).unwrap();
    bytes
}

pub fn png(image: RgbImage) -> Vec<u8> {
    encode(&DynamicImage::ImageRgb8(image), ImageFormat::Png)
}
