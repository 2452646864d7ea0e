//! Joint image/mask transform.
//!
//! One fixed, randomized composition is applied to an RGB image and its
//! label mask together:
//!
//! 1. Affine (rotation, translation, scale, shear), always
//! 2. Defocus blur
//! 3. Local contrast normalization
//! 4. Brightness/contrast jitter
//! 5. Multiplicative per-channel noise
//! 6. Additive Gaussian noise
//! 7. Elastic deformation, always
//!
//! Geometric steps (1 and 7) move image and mask through the same
//! mapping. The mask is always resampled with nearest-neighbor lookup so
//! label ids never blend. Photometric steps (2 to 6) touch the image
//! only; they live in [`crate::photometric`].

use image::{Luma, Rgb};
use imageproc::geometric_transformations::{Interpolation, Projection, warp};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::photometric;
use crate::types::{LabelMask, RgbImage};

/// Parameters of the transform composition.
///
/// Ranges are inclusive `(low, high)` pairs sampled uniformly per replica.
/// The defaults are the production composition; [`TransformConfig::identity`]
/// disables every step for tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    /// Rotation about the image center, in degrees.
    pub rotation_degrees: (f64, f64),
    /// Translation as a fraction of the image extent, sampled per axis.
    pub translate_fraction: (f64, f64),
    /// Isotropic scale factor about the image center.
    pub scale: (f64, f64),
    /// Shear angle in degrees, sampled per axis.
    pub shear_degrees: (f64, f64),

    /// Defocus kernel radius in pixels.
    pub defocus_radius: (f64, f64),
    /// Extra Gaussian softening applied after the defocus disk.
    pub defocus_alias_blur: (f64, f64),
    /// Probability of applying defocus.
    pub defocus_probability: f64,

    /// Histogram clip limit for local contrast normalization.
    pub contrast_clip_limit: f64,
    /// Number of tiles per axis for local contrast normalization.
    pub contrast_tile_grid: u32,
    /// Probability of applying local contrast normalization.
    pub local_contrast_probability: f64,

    /// Maximum brightness shift as a fraction of full scale.
    pub brightness_limit: f64,
    /// Maximum relative contrast change.
    pub contrast_limit: f64,
    /// Probability of applying brightness/contrast jitter.
    pub brightness_contrast_probability: f64,

    /// Per-channel multiplier range.
    pub multiplicative_noise: (f64, f64),
    /// Probability of applying multiplicative noise.
    pub multiplicative_noise_probability: f64,

    /// Mean of the additive Gaussian noise.
    pub gaussian_noise_mean: f64,
    /// Variance range of the additive Gaussian noise.
    pub gaussian_noise_variance: (f64, f64),
    /// Probability of applying additive Gaussian noise.
    pub gaussian_noise_probability: f64,

    /// Elastic displacement magnitude in pixels. Zero disables the step.
    pub elastic_alpha: f64,
    /// Smoothing sigma of the elastic displacement field.
    pub elastic_sigma: f64,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            rotation_degrees: (-1.5, 1.5),
            translate_fraction: (-0.015, 0.015),
            scale: (1.0, 1.2),
            shear_degrees: (-2.0, 2.0),
            defocus_radius: (3.0, 8.0),
            defocus_alias_blur: (0.1, 0.4),
            defocus_probability: 0.7,
            contrast_clip_limit: 2.0,
            contrast_tile_grid: 8,
            local_contrast_probability: 0.9,
            brightness_limit: 0.2,
            contrast_limit: 0.2,
            brightness_contrast_probability: 0.5,
            multiplicative_noise: (0.8, 1.2),
            multiplicative_noise_probability: 0.2,
            gaussian_noise_mean: 50.0,
            gaussian_noise_variance: (20.0, 80.0),
            gaussian_noise_probability: 0.8,
            elastic_alpha: 1.0,
            elastic_sigma: 25.0,
        }
    }
}

impl TransformConfig {
    /// A composition that leaves image and mask untouched.
    #[must_use]
    pub fn identity() -> Self {
        Self {
            rotation_degrees: (0.0, 0.0),
            translate_fraction: (0.0, 0.0),
            scale: (1.0, 1.0),
            shear_degrees: (0.0, 0.0),
            defocus_probability: 0.0,
            local_contrast_probability: 0.0,
            brightness_contrast_probability: 0.0,
            multiplicative_noise_probability: 0.0,
            gaussian_noise_probability: 0.0,
            elastic_alpha: 0.0,
            ..Self::default()
        }
    }
}

/// Draw uniformly from an inclusive range; degenerate ranges yield `low`.
pub(crate) fn sample<R: Rng + ?Sized>(rng: &mut R, (low, high): (f64, f64)) -> f64 {
    if high > low {
        rng.random_range(low..=high)
    } else {
        low
    }
}

/// Bernoulli trial that tolerates probabilities outside `[0, 1]`.
pub(crate) fn fires<R: Rng + ?Sized>(rng: &mut R, probability: f64) -> bool {
    if probability >= 1.0 {
        true
    } else if probability > 0.0 {
        rng.random::<f64>() < probability
    } else {
        false
    }
}

/// Sampled affine parameters for one replica.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineParams {
    /// Rotation in degrees.
    pub rotation: f64,
    /// Horizontal translation in pixels.
    pub translate_x: f64,
    /// Vertical translation in pixels.
    pub translate_y: f64,
    /// Isotropic scale.
    pub scale: f64,
    /// Horizontal shear in degrees.
    pub shear_x: f64,
    /// Vertical shear in degrees.
    pub shear_y: f64,
}

impl AffineParams {
    /// Sample parameters for an image of `width` x `height` pixels.
    pub fn sample<R: Rng + ?Sized>(
        config: &TransformConfig,
        width: u32,
        height: u32,
        rng: &mut R,
    ) -> Self {
        Self {
            rotation: sample(rng, config.rotation_degrees),
            translate_x: sample(rng, config.translate_fraction) * f64::from(width),
            translate_y: sample(rng, config.translate_fraction) * f64::from(height),
            scale: sample(rng, config.scale),
            shear_x: sample(rng, config.shear_degrees),
            shear_y: sample(rng, config.shear_degrees),
        }
    }

    /// Row-major 3x3 forward matrix mapping source pixels to output
    /// pixels: shear and scale about the image center, then rotate, then
    /// translate.
    #[must_use]
    pub fn matrix(&self, width: u32, height: u32) -> [f64; 9] {
        let cx = f64::from(width) / 2.0;
        let cy = f64::from(height) / 2.0;
        let (sin, cos) = self.rotation.to_radians().sin_cos();
        let shx = self.shear_x.to_radians().tan();
        let shy = self.shear_y.to_radians().tan();

        let to_origin = [1.0, 0.0, -cx, 0.0, 1.0, -cy, 0.0, 0.0, 1.0];
        let scale = [self.scale, 0.0, 0.0, 0.0, self.scale, 0.0, 0.0, 0.0, 1.0];
        let shear = [1.0, shx, 0.0, shy, 1.0, 0.0, 0.0, 0.0, 1.0];
        let rotate = [cos, -sin, 0.0, sin, cos, 0.0, 0.0, 0.0, 1.0];
        let back = [
            1.0,
            0.0,
            cx + self.translate_x,
            0.0,
            1.0,
            cy + self.translate_y,
            0.0,
            0.0,
            1.0,
        ];

        [scale, shear, rotate, back]
            .iter()
            .fold(to_origin, |acc, m| mat_mul(m, &acc))
    }

    /// Whether these parameters map every pixel onto itself.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn is_identity(&self) -> bool {
        self.rotation == 0.0
            && self.translate_x == 0.0
            && self.translate_y == 0.0
            && self.scale == 1.0
            && self.shear_x == 0.0
            && self.shear_y == 0.0
    }
}

/// Row-major 3x3 matrix product `a * b`.
fn mat_mul(a: &[f64; 9], b: &[f64; 9]) -> [f64; 9] {
    std::array::from_fn(|idx| {
        let (row, col) = (idx / 3, idx % 3);
        (0..3).map(|k| a[row * 3 + k] * b[k * 3 + col]).sum()
    })
}

/// Applies the transform composition to image/mask pairs.
#[derive(Debug, Clone, Default)]
pub struct TransformEngine {
    config: TransformConfig,
}

impl TransformEngine {
    /// Create an engine for the given composition.
    #[must_use]
    pub const fn new(config: TransformConfig) -> Self {
        Self { config }
    }

    /// The composition this engine applies.
    #[must_use]
    pub const fn config(&self) -> &TransformConfig {
        &self.config
    }

    /// Transform `image` and `mask` jointly, returning the new pair.
    ///
    /// Both inputs must share dimensions; outputs keep those dimensions.
    #[must_use = "returns the transformed image and mask"]
    pub fn apply<R: Rng + ?Sized>(
        &self,
        image: &RgbImage,
        mask: &LabelMask,
        rng: &mut R,
    ) -> (RgbImage, LabelMask) {
        let config = &self.config;
        let (width, height) = image.dimensions();

        // 1. Affine, applied jointly.
        let affine = AffineParams::sample(config, width, height, rng);
        let (mut image, mut mask) = apply_affine(image, mask, &affine);

        // 2-6. Photometric, image only.
        if fires(rng, config.defocus_probability) {
            let radius = sample(rng, config.defocus_radius);
            let alias = sample(rng, config.defocus_alias_blur);
            image = photometric::defocus(&image, radius, alias);
        }
        if fires(rng, config.local_contrast_probability) {
            image = photometric::local_contrast(
                &image,
                config.contrast_clip_limit,
                config.contrast_tile_grid,
            );
        }
        if fires(rng, config.brightness_contrast_probability) {
            let alpha = 1.0 + sample(rng, (-config.contrast_limit, config.contrast_limit));
            let beta = sample(rng, (-config.brightness_limit, config.brightness_limit));
            photometric::brightness_contrast(&mut image, alpha, beta);
        }
        if fires(rng, config.multiplicative_noise_probability) {
            let multipliers: [f64; 3] =
                std::array::from_fn(|_| sample(rng, config.multiplicative_noise));
            photometric::multiply_channels(&mut image, multipliers);
        }
        if fires(rng, config.gaussian_noise_probability) {
            let variance = sample(rng, config.gaussian_noise_variance);
            photometric::gaussian_noise(
                &mut image,
                config.gaussian_noise_mean,
                variance.sqrt(),
                rng.random(),
            );
        }

        // 7. Elastic, applied jointly.
        if config.elastic_alpha > 0.0 && width > 0 && height > 0 {
            let field = DisplacementField::random(
                width,
                height,
                config.elastic_alpha,
                config.elastic_sigma,
                rng,
            );
            image = field.remap_image(&image);
            mask = field.remap_mask(&mask);
        }

        (image, mask)
    }
}

/// Warp image (bilinear) and mask (nearest) through the same affine map.
///
/// Pixels whose pre-image falls outside the source become black in the
/// image and background in the mask.
#[allow(clippy::cast_possible_truncation)]
fn apply_affine(
    image: &RgbImage,
    mask: &LabelMask,
    params: &AffineParams,
) -> (RgbImage, LabelMask) {
    if params.is_identity() {
        return (image.clone(), mask.clone());
    }
    let (width, height) = image.dimensions();
    let m = params.matrix(width, height);
    let Some(projection) = Projection::from_matrix(m.map(|v| v as f32)) else {
        return (image.clone(), mask.clone());
    };
    (
        warp(image, &projection, Interpolation::Bilinear, Rgb([0, 0, 0])),
        warp(mask, &projection, Interpolation::Nearest, Luma([0])),
    )
}

/// Smooth random per-pixel displacement used for elastic deformation.
///
/// Output pixel `(x, y)` samples the source at `(x + dx, y + dy)`.
/// Samples are clamped to the image edge.
struct DisplacementField {
    width: u32,
    height: u32,
    dx: Vec<f32>,
    dy: Vec<f32>,
}

impl DisplacementField {
    #[allow(clippy::cast_possible_truncation)]
    fn random<R: Rng + ?Sized>(
        width: u32,
        height: u32,
        alpha: f64,
        sigma: f64,
        rng: &mut R,
    ) -> Self {
        let len = width as usize * height as usize;
        let raw_dx: Vec<f32> = (0..len).map(|_| rng.random_range(-1.0_f32..1.0)).collect();
        let raw_dy: Vec<f32> = (0..len).map(|_| rng.random_range(-1.0_f32..1.0)).collect();
        let smooth = |field: Vec<f32>| -> Vec<f32> {
            photometric::gaussian_smooth_field(field, width, height, sigma as f32)
                .into_iter()
                .map(|v| v * alpha as f32)
                .collect()
        };
        Self {
            width,
            height,
            dx: smooth(raw_dx),
            dy: smooth(raw_dy),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn source(&self, x: u32, y: u32) -> (f32, f32) {
        let i = y as usize * self.width as usize + x as usize;
        let max_x = self.width.saturating_sub(1) as f32;
        let max_y = self.height.saturating_sub(1) as f32;
        (
            (x as f32 + self.dx[i]).clamp(0.0, max_x),
            (y as f32 + self.dy[i]).clamp(0.0, max_y),
        )
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn remap_image(&self, image: &RgbImage) -> RgbImage {
        RgbImage::from_fn(self.width, self.height, |x, y| {
            let (sx, sy) = self.source(x, y);
            let (x0, y0) = (sx.floor() as u32, sy.floor() as u32);
            let (x1, y1) = ((x0 + 1).min(self.width - 1), (y0 + 1).min(self.height - 1));
            let (fx, fy) = (sx - sx.floor(), sy - sy.floor());
            let p00 = image.get_pixel(x0, y0).0;
            let p10 = image.get_pixel(x1, y0).0;
            let p01 = image.get_pixel(x0, y1).0;
            let p11 = image.get_pixel(x1, y1).0;
            Rgb(std::array::from_fn(|c| {
                let top = f32::from(p00[c]).mul_add(1.0 - fx, f32::from(p10[c]) * fx);
                let bottom = f32::from(p01[c]).mul_add(1.0 - fx, f32::from(p11[c]) * fx);
                top.mul_add(1.0 - fy, bottom * fy).round().clamp(0.0, 255.0) as u8
            }))
        })
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn remap_mask(&self, mask: &LabelMask) -> LabelMask {
        LabelMask::from_fn(self.width, self.height, |x, y| {
            let (sx, sy) = self.source(x, y);
            *mask.get_pixel(sx.round() as u32, sy.round() as u32)
        })
    }
}
