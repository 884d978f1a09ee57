//! Mock backends for testing without model files
//!
//! The removal mock derives a saliency mask from colour distance to the
//! top-left pixel and runs the real alpha matting on it. The segmentation
//! mock grows a colour-similar region from each prompt point, so masks are
//! deterministic and depend on the image that was actually set.

use crate::{
    config::{MattingConfig, ServiceConfig},
    error::{ClearCutError, Result},
    inference::{
        LoadedSegmenter, PipelineOutput, Predictions, PromptableSegmenter, RemovalPipeline,
        RemovalPipelineFactory, SegmenterFactory,
    },
    matting::AlphaMatting,
    types::SegmentationRequest,
};
use image::{DynamicImage, GrayImage, ImageFormat, Luma, RgbImage, RgbaImage};
use ndarray::Array3;
use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Summed absolute RGB difference still considered the same colour
const COLOR_TOLERANCE: u32 = 48;

/// What the mock removal pipeline returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockRemovalMode {
    /// Decoded RGBA image
    Image,
    /// PNG-encoded bytes
    Encoded,
    /// An inference error
    Fail,
    /// A panic inside the pipeline
    Panic,
}

/// Mock background removal pipeline
#[derive(Debug, Clone)]
pub struct MockRemovalPipeline {
    mode: MockRemovalMode,
    calls: Arc<AtomicUsize>,
}

impl MockRemovalPipeline {
    #[must_use]
    pub fn new(mode: MockRemovalMode) -> Self {
        Self {
            mode,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of `remove` calls so far
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Foreground is everything not matching the top-left pixel's colour
    #[must_use]
    pub fn saliency_mask(image: &RgbaImage) -> GrayImage {
        let Some(corner) = image.get_pixel_checked(0, 0).copied() else {
            return GrayImage::new(image.width(), image.height());
        };
        GrayImage::from_fn(image.width(), image.height(), |x, y| {
            let p = image.get_pixel(x, y);
            let distance: u32 = (0..3).map(|c| u32::from(p[c].abs_diff(corner[c]))).sum();
            Luma([if distance > COLOR_TOLERANCE { 255 } else { 0 }])
        })
    }
}

impl Default for MockRemovalPipeline {
    fn default() -> Self {
        Self::new(MockRemovalMode::Image)
    }
}

impl RemovalPipeline for MockRemovalPipeline {
    fn remove(&self, image: &RgbaImage, matting: &MattingConfig) -> Result<PipelineOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            MockRemovalMode::Fail => Err(ClearCutError::inference("mock inference failure")),
            MockRemovalMode::Panic => panic!("mock pipeline panic"),
            MockRemovalMode::Image | MockRemovalMode::Encoded => {
                let mask = Self::saliency_mask(image);
                let cutout = AlphaMatting::new(*matting).apply(image, &mask)?;
                if self.mode == MockRemovalMode::Image {
                    return Ok(PipelineOutput::Image(DynamicImage::ImageRgba8(cutout)));
                }
                let mut bytes = Vec::new();
                cutout.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
                Ok(PipelineOutput::Encoded(bytes))
            },
        }
    }
}

/// Factory handing out [`MockRemovalPipeline`]s and counting how often it was asked
#[derive(Debug, Clone)]
pub struct MockRemovalPipelineFactory {
    mode: MockRemovalMode,
    fail_load: bool,
    creations: Arc<AtomicUsize>,
}

impl MockRemovalPipelineFactory {
    #[must_use]
    pub fn new(mode: MockRemovalMode) -> Self {
        Self {
            mode,
            fail_load: false,
            creations: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Factory whose pipeline construction always fails with a model error
    #[must_use]
    pub fn failing_load() -> Self {
        Self {
            fail_load: true,
            ..Self::new(MockRemovalMode::Image)
        }
    }

    #[must_use]
    pub fn creations(&self) -> usize {
        self.creations.load(Ordering::SeqCst)
    }
}

impl RemovalPipelineFactory for MockRemovalPipelineFactory {
    fn create_pipeline(&self, _config: &ServiceConfig) -> Result<Box<dyn RemovalPipeline>> {
        self.creations.fetch_add(1, Ordering::SeqCst);
        if self.fail_load {
            return Err(ClearCutError::model("mock model failed to load"));
        }
        Ok(Box::new(MockRemovalPipeline::new(self.mode)))
    }
}

/// Shared call counters of a mock segmenter
#[derive(Debug, Default)]
pub struct MockSegmenterStats {
    pub set_image_calls: AtomicUsize,
    pub predict_calls: AtomicUsize,
}

/// Colour-similarity promptable segmenter
#[derive(Debug)]
pub struct MockSegmenter {
    image: Option<RgbImage>,
    predict_delay: Duration,
    fail_predict: bool,
    stats: Arc<MockSegmenterStats>,
}

impl MockSegmenter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            image: None,
            predict_delay: Duration::ZERO,
            fail_predict: false,
            stats: Arc::new(MockSegmenterStats::default()),
        }
    }

    /// Sleep between receiving the image and decoding prompts
    #[must_use]
    pub fn with_predict_delay(mut self, delay: Duration) -> Self {
        self.predict_delay = delay;
        self
    }

    /// Make every `predict` fail with an inference error
    #[must_use]
    pub fn failing(mut self) -> Self {
        self.fail_predict = true;
        self
    }

    #[must_use]
    pub fn stats(&self) -> Arc<MockSegmenterStats> {
        Arc::clone(&self.stats)
    }

    /// Region of pixels 4-connected to `seed` with a colour close to the seed's
    fn grow(image: &RgbImage, seed: [f32; 2]) -> Vec<bool> {
        let (w, h) = image.dimensions();
        let mut region = vec![false; (w * h) as usize];
        if w == 0 || h == 0 {
            return region;
        }
        let sx = (seed[0].max(0.0) as u32).min(w - 1);
        let sy = (seed[1].max(0.0) as u32).min(h - 1);
        let target = *image.get_pixel(sx, sy);
        let similar = |x: u32, y: u32| {
            let p = image.get_pixel(x, y);
            let d: u32 = (0..3).map(|c| u32::from(p[c].abs_diff(target[c]))).sum();
            d <= COLOR_TOLERANCE
        };

        let mut queue = VecDeque::from([(sx, sy)]);
        if let Some(cell) = region.get_mut((sy * w + sx) as usize) {
            *cell = true;
        }
        while let Some((x, y)) = queue.pop_front() {
            let neighbours = [
                (x.wrapping_sub(1), y),
                (x + 1, y),
                (x, y.wrapping_sub(1)),
                (x, y + 1),
            ];
            for (nx, ny) in neighbours {
                if nx >= w || ny >= h {
                    continue;
                }
                let Some(cell) = region.get_mut((ny * w + nx) as usize) else {
                    continue;
                };
                if !*cell && similar(nx, ny) {
                    *cell = true;
                    queue.push_back((nx, ny));
                }
            }
        }
        region
    }
}

impl Default for MockSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptableSegmenter for MockSegmenter {
    fn set_image(&mut self, image: &RgbImage) -> Result<()> {
        self.stats.set_image_calls.fetch_add(1, Ordering::SeqCst);
        self.image = Some(image.clone());
        Ok(())
    }

    fn predict(
        &mut self,
        prompts: &SegmentationRequest,
        multimask_output: bool,
    ) -> Result<Predictions> {
        self.stats.predict_calls.fetch_add(1, Ordering::SeqCst);
        if !self.predict_delay.is_zero() {
            std::thread::sleep(self.predict_delay);
        }
        if self.fail_predict {
            return Err(ClearCutError::inference("mock decoder failure"));
        }
        let image = self
            .image
            .as_ref()
            .ok_or_else(|| ClearCutError::processing("An image must be set before predicting"))?;
        let (w, h) = image.dimensions();

        let mut keep = vec![false; (w * h) as usize];
        for (point, &label) in prompts.points.iter().zip(&prompts.labels) {
            let region = Self::grow(image, *point);
            for (k, r) in keep.iter_mut().zip(region) {
                if r {
                    *k = label == 1;
                }
            }
        }
        if let Some([x1, y1, x2, y2]) = prompts.bbox {
            for (i, k) in keep.iter_mut().enumerate() {
                let x = (i as u32 % w.max(1)) as f32;
                let y = (i as u32 / w.max(1)) as f32;
                if x < x1.min(x2) || x > x1.max(x2) || y < y1.min(y2) || y > y1.max(y2) {
                    *k = false;
                }
            }
        }

        let count = if multimask_output { 3 } else { 1 };
        let masks = Array3::from_shape_fn((count, h as usize, w as usize), |(_, y, x)| {
            if keep.get(y * w as usize + x).copied().unwrap_or(false) {
                1.0
            } else {
                -1.0
            }
        });
        Ok(Predictions {
            masks,
            iou_predictions: vec![0.9; count],
        })
    }
}

/// Factory building [`MockSegmenter`]s, counting loads
#[derive(Debug, Clone, Default)]
pub struct MockSegmenterFactory {
    load_delay: Duration,
    predict_delay: Duration,
    fail_predict: bool,
    fail_load: bool,
    creations: Arc<AtomicUsize>,
    stats: Arc<MockSegmenterStats>,
}

impl MockSegmenterFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep inside `create_segmenter` to widen the first-use race window
    #[must_use]
    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    /// Sleep inside every `predict`
    #[must_use]
    pub fn with_predict_delay(mut self, delay: Duration) -> Self {
        self.predict_delay = delay;
        self
    }

    /// Segmenters whose `predict` always fails
    #[must_use]
    pub fn failing_predict(mut self) -> Self {
        self.fail_predict = true;
        self
    }

    /// Loading always fails with a model error
    #[must_use]
    pub fn failing_load(mut self) -> Self {
        self.fail_load = true;
        self
    }

    /// Number of segmenters constructed
    #[must_use]
    pub fn creations(&self) -> usize {
        self.creations.load(Ordering::SeqCst)
    }

    /// Call counters shared by every segmenter this factory builds
    #[must_use]
    pub fn stats(&self) -> Arc<MockSegmenterStats> {
        Arc::clone(&self.stats)
    }
}

impl SegmenterFactory for MockSegmenterFactory {
    fn create_segmenter(&self, _config: &ServiceConfig) -> Result<LoadedSegmenter> {
        if !self.load_delay.is_zero() {
            std::thread::sleep(self.load_delay);
        }
        self.creations.fetch_add(1, Ordering::SeqCst);
        if self.fail_load {
            return Err(ClearCutError::model("mock segmenter failed to load"));
        }
        let mut segmenter = MockSegmenter::new().with_predict_delay(self.predict_delay);
        segmenter.stats = Arc::clone(&self.stats);
        if self.fail_predict {
            segmenter = segmenter.failing();
        }
        Ok(LoadedSegmenter {
            segmenter: Box::new(segmenter),
            device: "cpu".to_string(),
        })
    }
}
