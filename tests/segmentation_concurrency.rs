//! Concurrent use of the shared segmentation predictor

mod common;

use axum::http::StatusCode;
use clearcut::backends::mock::{MockRemovalMode, MockRemovalPipelineFactory, MockSegmenterFactory};
use clearcut::services::SegmentationService;
use clearcut::SegmentationRequest;
use common::{config_with_checkpoint, multipart_request, png, send, MockApp, Part};
use image::{GrayImage, Rgb, RgbImage};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

const FOREGROUND: Rgb<u8> = Rgb([230, 230, 40]);
const BACKGROUND: Rgb<u8> = Rgb([20, 90, 20]);

/// 100x100 image with a 20x20 block whose top-left corner is `origin`
fn image_with_block(origin: u32) -> RgbImage {
    RgbImage::from_fn(100, 100, |x, y| {
        let inside = |v: u32| (origin..origin + 20).contains(&v);
        if inside(x) && inside(y) {
            FOREGROUND
        } else {
            BACKGROUND
        }
    })
}

fn block_coverage(mask: &GrayImage, origin: u32) -> usize {
    (origin..origin + 20)
        .flat_map(|y| (origin..origin + 20).map(move |x| (x, y)))
        .filter(|&(x, y)| mask.get_pixel(x, y)[0] == 255)
        .count()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_receive_their_own_masks() {
    let dir = tempfile::tempdir().unwrap();
    let segmenter = MockSegmenterFactory::new()
        .with_load_delay(Duration::from_millis(150))
        .with_predict_delay(Duration::from_millis(20));
    let app = MockApp::with_factories(
        config_with_checkpoint(&dir),
        MockRemovalPipelineFactory::new(MockRemovalMode::Image),
        segmenter,
    );

    let origins = [10_u32, 70, 10, 70, 10, 70, 10, 70];
    let mut tasks = Vec::new();
    for origin in origins {
        let router = app.router();
        let body = png(image_with_block(origin));
        let center = origin + 10;
        let req = format!(r#"{{"points": [[{center}, {center}]], "labels": [1]}}"#);
        tasks.push(tokio::spawn(async move {
            let response = send(
                router,
                multipart_request(
                    "/sam_mask",
                    &[Part::file("image/png", body), Part::text("req", &req)],
                ),
            )
            .await;
            (origin, response)
        }));
    }

    for task in tasks {
        let (origin, response) = task.await.unwrap();
        assert_eq!(response.status, StatusCode::OK);
        let mask = image::load_from_memory(&response.body).unwrap().into_luma8();
        let other = if origin == 10 { 70 } else { 10 };

        assert_eq!(block_coverage(&mask, origin), 20 * 20, "origin {origin}");
        assert_eq!(block_coverage(&mask, other), 0, "origin {origin}");
    }

    let stats = app.segmenter.stats();
    assert_eq!(app.segmenter.creations(), 1);
    assert_eq!(stats.set_image_calls.load(Ordering::SeqCst), origins.len());
    assert_eq!(stats.predict_calls.load(Ordering::SeqCst), origins.len());
}

#[test]
fn test_concurrent_first_use_loads_once() {
    let dir = tempfile::tempdir().unwrap();
    let factory = MockSegmenterFactory::new().with_load_delay(Duration::from_millis(100));
    let service = Arc::new(SegmentationService::new(
        Arc::new(config_with_checkpoint(&dir)),
        Arc::new(factory.clone()),
    ));

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let service = Arc::clone(&service);
            std::thread::spawn(move || service.predictor().unwrap())
        })
        .collect();
    let predictors: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(factory.creations(), 1);
    assert!(predictors
        .windows(2)
        .all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
}

#[test]
fn test_sequential_requests_do_not_share_images() {
    let dir = tempfile::tempdir().unwrap();
    let service = SegmentationService::new(
        Arc::new(config_with_checkpoint(&dir)),
        Arc::new(MockSegmenterFactory::new()),
    );
    let near = SegmentationRequest::new(vec![[20.0, 20.0]], vec![1], None).unwrap();
    let far = SegmentationRequest::new(vec![[80.0, 80.0]], vec![1], None).unwrap();

    let first = service.segment(&image_with_block(10), &near).unwrap();
    let second = service.segment(&image_with_block(70), &far).unwrap();
    assert_eq!(block_coverage(&first, 10), 400);
    assert_eq!(block_coverage(&second, 70), 400);
    assert_eq!(block_coverage(&second, 10), 0);
}
