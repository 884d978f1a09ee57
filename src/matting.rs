//! Alpha matting refinement of a coarse saliency mask
//!
//! The mask is split into a trimap, the unknown band between definite
//! foreground and definite background is resolved with a guided filter on
//! image luminance, and foreground colours are re-estimated with two-pass
//! blur fusion so that background colour does not bleed into soft edges.

use crate::{
    config::MattingConfig,
    error::{ClearCutError, Result},
    utils::ImagePreprocessor,
};
use image::{GrayImage, Rgba, RgbaImage};
use ndarray::{Array2, Zip};

/// Trimap value of definite foreground
pub const TRIMAP_FOREGROUND: u8 = 255;
/// Trimap value of definite background
pub const TRIMAP_BACKGROUND: u8 = 0;
/// Trimap value of the unknown band
pub const TRIMAP_UNKNOWN: u8 = 128;

/// Blur fusion kernel of the first and second pass
const FUSION_RADII: [usize; 2] = [90, 6];
const FUSION_EPSILON: f32 = 1e-5;
const GUIDED_EPSILON: f32 = 1e-3;
const MIN_GUIDED_KERNEL: usize = 5;

/// Definite-foreground / definite-background / unknown classification of a mask
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trimap {
    values: Array2<u8>,
}

impl Trimap {
    /// Trimap values, `(height, width)`
    #[must_use]
    pub fn values(&self) -> &Array2<u8> {
        &self.values
    }

    #[must_use]
    pub fn foreground_count(&self) -> usize {
        self.count(TRIMAP_FOREGROUND)
    }

    #[must_use]
    pub fn background_count(&self) -> usize {
        self.count(TRIMAP_BACKGROUND)
    }

    #[must_use]
    pub fn unknown_count(&self) -> usize {
        self.count(TRIMAP_UNKNOWN)
    }

    fn count(&self, value: u8) -> usize {
        self.values.iter().filter(|&&v| v == value).count()
    }
}

/// Alpha matting with fixed thresholds and erosion size
#[derive(Debug, Clone, Copy)]
pub struct AlphaMatting {
    config: MattingConfig,
}

impl AlphaMatting {
    #[must_use]
    pub fn new(config: MattingConfig) -> Self {
        Self { config }
    }

    /// Build the trimap of a saliency mask
    ///
    /// Both definite regions are eroded by a square structuring element;
    /// pixels outside the image count as background for the foreground
    /// erosion and as background-true for the background erosion.
    #[must_use]
    pub fn trimap(&self, mask: &GrayImage) -> Trimap {
        let (w, h) = mask.dimensions();
        let shape = (h as usize, w as usize);
        let sample = |(y, x): (usize, usize)| mask.get_pixel(x as u32, y as u32)[0];

        let foreground = Array2::from_shape_fn(shape, |p| sample(p) > self.config.foreground_threshold);
        let background = Array2::from_shape_fn(shape, |p| sample(p) < self.config.background_threshold);
        let size = self.config.erode_size as usize;
        let foreground = erode(&foreground, size, false);
        let background = erode(&background, size, true);

        let values = Zip::from(&foreground)
            .and(&background)
            .map_collect(|&fg, &bg| {
                if bg {
                    TRIMAP_BACKGROUND
                } else if fg {
                    TRIMAP_FOREGROUND
                } else {
                    TRIMAP_UNKNOWN
                }
            });
        Trimap { values }
    }

    /// Cut out the foreground of `image` using a coarse `mask` of the same size
    ///
    /// Falls back to [`naive_cutout`] when the trimap has no definite
    /// foreground or no definite background.
    ///
    /// # Errors
    /// - Mask and image dimensions differ
    pub fn apply(&self, image: &RgbaImage, mask: &GrayImage) -> Result<RgbaImage> {
        if image.dimensions() != mask.dimensions() {
            return Err(ClearCutError::processing(format!(
                "Mask size {:?} does not match image size {:?}",
                mask.dimensions(),
                image.dimensions()
            )));
        }

        let trimap = self.trimap(mask);
        if trimap.foreground_count() == 0 || trimap.background_count() == 0 {
            log::debug!(
                "Trimap has {} foreground and {} background pixels, using naive cutout",
                trimap.foreground_count(),
                trimap.background_count()
            );
            return Ok(naive_cutout(image, mask));
        }

        let alpha = self.estimate_alpha(image, mask, &trimap);
        let channels = rgb_channels(image);
        let foreground = refine_foreground(&channels, &alpha);

        let mut out = RgbaImage::new(image.width(), image.height());
        #[allow(clippy::indexing_slicing)]
        // Safe: all planes share the image shape
        for (x, y, pixel) in out.enumerate_pixels_mut() {
            let idx = (y as usize, x as usize);
            *pixel = Rgba([
                to_u8(foreground[0][idx]),
                to_u8(foreground[1][idx]),
                to_u8(foreground[2][idx]),
                to_u8(alpha[idx]),
            ]);
        }
        Ok(out)
    }

    fn estimate_alpha(&self, image: &RgbaImage, mask: &GrayImage, trimap: &Trimap) -> Array2<f32> {
        let guide = ImagePreprocessor::luminance(image);
        let coarse = Array2::from_shape_fn(guide.dim(), |(y, x)| {
            f32::from(mask.get_pixel(x as u32, y as u32)[0]) / 255.0
        });
        let kernel = (2 * self.config.erode_size as usize + 1).max(MIN_GUIDED_KERNEL);
        let refined = guided_filter(&guide, &coarse, kernel, GUIDED_EPSILON);

        Zip::from(&trimap.values)
            .and(&refined)
            .map_collect(|&t, &q| match t {
                TRIMAP_FOREGROUND => 1.0,
                TRIMAP_BACKGROUND => 0.0,
                _ => q.clamp(0.0, 1.0),
            })
    }
}

/// Use the mask directly as opacity
///
/// Colour and alpha are scaled by the mask value, fully masked pixels become
/// transparent black.
#[must_use]
pub fn naive_cutout(image: &RgbaImage, mask: &GrayImage) -> RgbaImage {
    let mut out = RgbaImage::new(image.width(), image.height());
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        let src = image.get_pixel(x, y);
        let m = mask.get_pixel_checked(x, y).map_or(0, |p| p[0]);
        let scale = |v: u8| ((u16::from(v) * u16::from(m) + 127) / 255) as u8;
        *pixel = Rgba([scale(src[0]), scale(src[1]), scale(src[2]), scale(src[3])]);
    }
    out
}

/// Estimate clean foreground colours from an image and its alpha
///
/// `channels` are RGB planes in `[0, 1]`. Two blur fusion passes are run,
/// the second seeded with the first pass estimates.
#[must_use]
pub fn refine_foreground(channels: &[Array2<f32>; 3], alpha: &Array2<f32>) -> [Array2<f32>; 3] {
    let [first, second] = FUSION_RADII;
    let (fg, bg) = blur_fusion(channels, channels, channels, alpha, first);
    let (fg, _) = blur_fusion(channels, &fg, &bg, alpha, second);
    fg
}

fn blur_fusion(
    image: &[Array2<f32>; 3],
    fg: &[Array2<f32>; 3],
    bg: &[Array2<f32>; 3],
    alpha: &Array2<f32>,
    kernel: usize,
) -> ([Array2<f32>; 3], [Array2<f32>; 3]) {
    let blurred_alpha = box_mean(alpha, kernel);
    let estimate = |c: usize| {
        let fga = Zip::from(&fg[c]).and(alpha).map_collect(|&f, &a| f * a);
        let blurred_fg = Zip::from(&box_mean(&fga, kernel))
            .and(&blurred_alpha)
            .map_collect(|&s, &a| s / (a + FUSION_EPSILON));

        let bg1a = Zip::from(&bg[c]).and(alpha).map_collect(|&b, &a| b * (1.0 - a));
        let blurred_bg = Zip::from(&box_mean(&bg1a, kernel))
            .and(&blurred_alpha)
            .map_collect(|&s, &a| s / (1.0 - a + FUSION_EPSILON));

        let refined = Zip::from(&blurred_fg)
            .and(&blurred_bg)
            .and(&image[c])
            .and(alpha)
            .map_collect(|&f, &b, &i, &a| (f + a * (i - a * f - (1.0 - a) * b)).clamp(0.0, 1.0));
        (refined, blurred_bg)
    };

    let (r, br) = estimate(0);
    let (g, bgg) = estimate(1);
    let (b, bb) = estimate(2);
    ([r, g, b], [br, bgg, bb])
}

/// Edge-preserving smoothing of `src` steered by `guide`
#[must_use]
pub fn guided_filter(guide: &Array2<f32>, src: &Array2<f32>, kernel: usize, eps: f32) -> Array2<f32> {
    let mean_i = box_mean(guide, kernel);
    let mean_p = box_mean(src, kernel);
    let corr_ip = box_mean(&(guide * src), kernel);
    let corr_ii = box_mean(&(guide * guide), kernel);

    let a = Zip::from(&corr_ip)
        .and(&corr_ii)
        .and(&mean_i)
        .and(&mean_p)
        .map_collect(|&ip, &ii, &mi, &mp| (ip - mi * mp) / (ii - mi * mi + eps));
    let b = Zip::from(&mean_p)
        .and(&a)
        .and(&mean_i)
        .map_collect(|&mp, &a, &mi| mp - a * mi);

    let mean_a = box_mean(&a, kernel);
    let mean_b = box_mean(&b, kernel);
    Zip::from(&mean_a)
        .and(&mean_b)
        .and(guide)
        .map_collect(|&ma, &mb, &i| ma * i + mb)
}

/// Mean over a `kernel × kernel` window with replicated borders
///
/// Even kernels put the extra row and column after the centre pixel.
#[must_use]
pub fn box_mean(src: &Array2<f32>, kernel: usize) -> Array2<f32> {
    let kernel = kernel.max(1);
    let (h, w) = src.dim();
    if h == 0 || w == 0 {
        return src.clone();
    }
    let pad_before = (kernel - 1) / 2;
    let sums = window_sums(h, w, kernel, pad_before, |y, x| {
        let y = y.clamp(0, h as isize - 1) as usize;
        let x = x.clamp(0, w as isize - 1) as usize;
        src.get((y, x)).copied().map_or(0.0, f64::from)
    });
    let area = (kernel * kernel) as f64;
    sums.mapv(|s| (s / area) as f32)
}

/// Binary erosion by a square structuring element
///
/// A size of zero uses the 3×3 cross. Pixels outside the image take
/// `border_value`.
#[must_use]
pub fn erode(mask: &Array2<bool>, size: usize, border_value: bool) -> Array2<bool> {
    let (h, w) = mask.dim();
    let at = |y: isize, x: isize| -> bool {
        if y < 0 || x < 0 || y >= h as isize || x >= w as isize {
            border_value
        } else {
            mask.get((y as usize, x as usize)).copied().unwrap_or(border_value)
        }
    };

    if size == 0 {
        return Array2::from_shape_fn((h, w), |(y, x)| {
            let (y, x) = (y as isize, x as isize);
            at(y, x) && at(y - 1, x) && at(y + 1, x) && at(y, x - 1) && at(y, x + 1)
        });
    }

    let sums = window_sums(h, w, size, size / 2, |y, x| if at(y, x) { 1.0 } else { 0.0 });
    let full = (size * size) as f64 - 0.5;
    sums.mapv(|s| s > full)
}

/// Sum of every `kernel × kernel` window via a summed-area table
///
/// `sample` is queried with image coordinates that may lie outside the
/// image; `pad_before` rows and columns precede each output pixel.
#[allow(clippy::indexing_slicing)]
// Safe: the table is sized to cover every window
fn window_sums<F>(h: usize, w: usize, kernel: usize, pad_before: usize, sample: F) -> Array2<f64>
where
    F: Fn(isize, isize) -> f64,
{
    let ph = h + kernel - 1;
    let pw = w + kernel - 1;
    let offset = pad_before as isize;
    let mut table = Array2::<f64>::zeros((ph + 1, pw + 1));
    for py in 0..ph {
        let mut row = 0.0;
        for px in 0..pw {
            row += sample(py as isize - offset, px as isize - offset);
            table[[py + 1, px + 1]] = table[[py, px + 1]] + row;
        }
    }
    Array2::from_shape_fn((h, w), |(y, x)| {
        table[[y + kernel, x + kernel]] - table[[y, x + kernel]] - table[[y + kernel, x]]
            + table[[y, x]]
    })
}

fn rgb_channels(image: &RgbaImage) -> [Array2<f32>; 3] {
    let (w, h) = image.dimensions();
    let plane = |c: usize| {
        Array2::from_shape_fn((h as usize, w as usize), |(y, x)| {
            f32::from(image.get_pixel(x as u32, y as u32)[c]) / 255.0
        })
    };
    [plane(0), plane(1), plane(2)]
}

fn to_u8(v: f32) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}
