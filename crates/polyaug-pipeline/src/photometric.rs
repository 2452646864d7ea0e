//! Photometric steps of the transform composition.
//!
//! Everything here changes pixel intensities only, never geometry, so
//! none of it is applied to the label mask.
//!
//! `imageproc`'s Gaussian filter takes single-channel images, so color
//! operations split the RGB image into three `GrayImage`s, process each,
//! and reassemble.

use image::{GrayImage, Luma, Rgb};

use crate::types::RgbImage;

/// Split an RGB image into its three channels.
fn split_channels(image: &RgbImage) -> [GrayImage; 3] {
    let (w, h) = image.dimensions();
    std::array::from_fn(|c| GrayImage::from_fn(w, h, |x, y| Luma([image.get_pixel(x, y).0[c]])))
}

/// Reassemble three channels into an RGB image.
fn merge_channels(channels: &[GrayImage; 3]) -> RgbImage {
    let (w, h) = channels[0].dimensions();
    RgbImage::from_fn(w, h, |x, y| {
        Rgb([
            channels[0].get_pixel(x, y).0[0],
            channels[1].get_pixel(x, y).0[0],
            channels[2].get_pixel(x, y).0[0],
        ])
    })
}

/// Simulate an out-of-focus lens.
///
/// The defocus disk of `radius` pixels is approximated by a Gaussian with
/// sigma `radius / 2`, combined with the `alias_blur` sigma. Non-positive
/// combined sigma returns the image unchanged, since `imageproc` panics
/// on `sigma <= 0.0`.
#[must_use = "returns the blurred image"]
#[allow(clippy::cast_possible_truncation)]
pub fn defocus(image: &RgbImage, radius: f64, alias_blur: f64) -> RgbImage {
    let sigma = (radius / 2.0).hypot(alias_blur) as f32;
    if sigma <= 0.0 || image.width() == 0 || image.height() == 0 {
        return image.clone();
    }
    let channels = split_channels(image);
    let blurred: [GrayImage; 3] =
        std::array::from_fn(|c| imageproc::filter::gaussian_blur_f32(&channels[c], sigma));
    merge_channels(&blurred)
}

/// Contrast-limited adaptive histogram equalization, per channel.
///
/// The image is divided into a `grid` x `grid` tile layout. Each tile gets
/// its own equalization table built from a histogram clipped at
/// `clip_limit` times the mean bin height; the clipped excess is spread
/// evenly over all bins. Pixels blend the tables of the four nearest tile
/// centers bilinearly so tile seams do not show.
#[must_use = "returns the equalized image"]
pub fn local_contrast(image: &RgbImage, clip_limit: f64, grid: u32) -> RgbImage {
    if image.width() == 0 || image.height() == 0 || grid == 0 {
        return image.clone();
    }
    let channels = split_channels(image);
    let equalized: [GrayImage; 3] =
        std::array::from_fn(|c| equalize_tiles(&channels[c], clip_limit, grid));
    merge_channels(&equalized)
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn equalize_tiles(gray: &GrayImage, clip_limit: f64, grid: u32) -> GrayImage {
    let (w, h) = gray.dimensions();
    let tiles_x = grid.min(w);
    let tiles_y = grid.min(h);

    let mut tables = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for ty in 0..tiles_y {
        let (y0, y1) = (ty * h / tiles_y, (ty + 1) * h / tiles_y);
        for tx in 0..tiles_x {
            let (x0, x1) = (tx * w / tiles_x, (tx + 1) * w / tiles_x);
            let mut histogram = [0_u32; 256];
            for y in y0..y1 {
                for x in x0..x1 {
                    histogram[usize::from(gray.get_pixel(x, y).0[0])] += 1;
                }
            }
            tables.push(clipped_equalization(
                &histogram,
                (x1 - x0) * (y1 - y0),
                clip_limit,
            ));
        }
    }

    let tile_w = f64::from(w) / f64::from(tiles_x);
    let tile_h = f64::from(h) / f64::from(tiles_y);
    let neighbors = |pos: f64, tile: f64, count: u32| -> (u32, u32, f64) {
        let g = (pos + 0.5) / tile - 0.5;
        let lo = g.floor().clamp(0.0, f64::from(count - 1));
        let hi = (lo + 1.0).min(f64::from(count - 1));
        (lo as u32, hi as u32, (g - lo).clamp(0.0, 1.0))
    };

    GrayImage::from_fn(w, h, |x, y| {
        let v = usize::from(gray.get_pixel(x, y).0[0]);
        let (tx0, tx1, fx) = neighbors(f64::from(x), tile_w, tiles_x);
        let (ty0, ty1, fy) = neighbors(f64::from(y), tile_h, tiles_y);
        let at = |tx: u32, ty: u32| f64::from(tables[(ty * tiles_x + tx) as usize][v]);
        let top = at(tx0, ty0).mul_add(1.0 - fx, at(tx1, ty0) * fx);
        let bottom = at(tx0, ty1).mul_add(1.0 - fx, at(tx1, ty1) * fx);
        Luma([top.mul_add(1.0 - fy, bottom * fy).round().clamp(0.0, 255.0) as u8])
    })
}

/// Build an equalization table from a histogram clipped at
/// `clip_limit` times the mean bin height.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn clipped_equalization(histogram: &[u32; 256], total: u32, clip_limit: f64) -> [u8; 256] {
    if total == 0 {
        return std::array::from_fn(|v| v as u8);
    }
    let clip = ((clip_limit * f64::from(total) / 256.0) as u32).max(1);

    let mut clipped = *histogram;
    let mut excess = 0_u32;
    for bin in &mut clipped {
        if *bin > clip {
            excess += *bin - clip;
            *bin = clip;
        }
    }
    let share = excess / 256;
    let remainder = (excess % 256) as usize;
    for (i, bin) in clipped.iter_mut().enumerate() {
        *bin += share + u32::from(i < remainder);
    }

    let scale = 255.0 / f64::from(total);
    let mut cumulative = 0_u32;
    std::array::from_fn(|v| {
        cumulative += clipped[v];
        (f64::from(cumulative) * scale).round().min(255.0) as u8
    })
}

/// Scale and shift intensities: `v * alpha + beta * 255`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn brightness_contrast(image: &mut RgbImage, alpha: f64, beta: f64) {
    let shift = beta * 255.0;
    for pixel in image.pixels_mut() {
        for v in &mut pixel.0 {
            *v = f64::from(*v).mul_add(alpha, shift).round().clamp(0.0, 255.0) as u8;
        }
    }
}

/// Multiply each channel by its own factor.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn multiply_channels(image: &mut RgbImage, multipliers: [f64; 3]) {
    for pixel in image.pixels_mut() {
        for (v, m) in pixel.0.iter_mut().zip(multipliers) {
            *v = (f64::from(*v) * m).round().clamp(0.0, 255.0) as u8;
        }
    }
}

/// Add independent normal noise to every sample.
pub fn gaussian_noise(image: &mut RgbImage, mean: f64, stddev: f64, seed: u64) {
    if stddev <= 0.0 && mean == 0.0 {
        return;
    }
    imageproc::noise::gaussian_noise_mut(image, mean, stddev.max(0.0), seed);
}

/// Separable Gaussian smoothing of a row-major `f32` field with
/// clamp-to-edge borders. Non-positive sigma returns the field unchanged.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap
)]
pub fn gaussian_smooth_field(field: Vec<f32>, width: u32, height: u32, sigma: f32) -> Vec<f32> {
    if sigma <= 0.0 || width == 0 || height == 0 {
        return field;
    }
    let (w, h) = (width as usize, height as usize);
    let radius = (sigma * 3.0).ceil() as i64;
    let weights: Vec<f32> = (-radius..=radius)
        .map(|i| {
            let d = i as f32;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let norm: f32 = weights.iter().sum();

    let convolve = |src: &[f32], stride: usize, len: usize, lines: usize, step: usize| {
        let mut out = vec![0.0_f32; src.len()];
        for line in 0..lines {
            let base = line * step;
            for i in 0..len {
                let mut acc = 0.0;
                for (k, weight) in weights.iter().enumerate() {
                    let j = (i as i64 + k as i64 - radius).clamp(0, len as i64 - 1) as usize;
                    acc += weight * src[base + j * stride];
                }
                out[base + i * stride] = acc / norm;
            }
        }
        out
    };

    // Rows (contiguous), then columns.
    let horizontal = convolve(&field, 1, w, h, w);
    convolve(&horizontal, w, h, w, 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sharp_edge_image() -> RgbImage {
        RgbImage::from_fn(16, 16, |x, _y| {
            if x < 8 {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        })
    }

    #[test]
    fn defocus_smooths_edge() {
        let img = sharp_edge_image();
        let blurred = defocus(&img, 4.0, 0.2);
        assert!(blurred.get_pixel(7, 8).0[0] > 0);
        assert!(blurred.get_pixel(8, 8).0[0] < 255);
        assert_eq!(blurred.dimensions(), img.dimensions());
    }

    #[test]
    fn defocus_zero_radius_is_identity() {
        let img = sharp_edge_image();
        assert_eq!(defocus(&img, 0.0, 0.0), img);
    }

    #[test]
    fn local_contrast_stretches_low_contrast_image() {
        let img = RgbImage::from_fn(32, 32, |x, _| {
            let v = 120 + u8::try_from(x % 8).unwrap_or(0);
            Rgb([v, v, v])
        });
        let out = local_contrast(&img, 2.0, 4);
        let spread = |im: &RgbImage| {
            let values: Vec<u8> = im.pixels().map(|p| p.0[0]).collect();
            let max = values.iter().copied().max().unwrap_or(0);
            let min = values.iter().copied().min().unwrap_or(0);
            max - min
        };
        assert!(spread(&out) > spread(&img));
    }

    #[test]
    fn local_contrast_keeps_dimensions_for_small_images() {
        let img = RgbImage::from_fn(3, 5, |_, _| Rgb([10, 20, 30]));
        assert_eq!(local_contrast(&img, 2.0, 8).dimensions(), (3, 5));
    }

    #[test]
    fn equalization_table_is_monotonic() {
        let mut histogram = [0_u32; 256];
        histogram[10] = 500;
        histogram[200] = 12;
        let table = clipped_equalization(&histogram, 512, 2.0);
        for pair in table.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
        assert_eq!(table[255], 255);
    }

    #[test]
    fn brightness_contrast_clamps() {
        let mut img = RgbImage::from_fn(2, 2, |_, _| Rgb([250, 100, 0]));
        brightness_contrast(&mut img, 1.2, 0.1);
        let p = img.get_pixel(0, 0).0;
        assert_eq!(p[0], 255);
        assert_eq!(p[1], 146);
        assert_eq!(p[2], 26);
    }

    #[test]
    fn multiply_channels_is_per_channel() {
        let mut img = RgbImage::from_fn(1, 1, |_, _| Rgb([100, 100, 100]));
        multiply_channels(&mut img, [0.8, 1.0, 1.2]);
        assert_eq!(img.get_pixel(0, 0).0, [80, 100, 120]);
    }

    #[test]
    fn gaussian_noise_with_mean_brightens() {
        let mut img = RgbImage::from_fn(16, 16, |_, _| Rgb([100, 100, 100]));
        gaussian_noise(&mut img, 50.0, 5.0, 42);
        let mean: f64 = img.pixels().map(|p| f64::from(p.0[0])).sum::<f64>() / 256.0;
        assert!(mean > 130.0, "mean {mean} should move towards 150");
    }

    #[test]
    fn smoothing_constant_field_is_identity() {
        let field = vec![0.5_f32; 20 * 10];
        let smoothed = gaussian_smooth_field(field, 20, 10, 3.0);
        for v in smoothed {
            assert!((v - 0.5).abs() < 1e-5);
        }
    }

    #[test]
    fn smoothing_spreads_impulse() {
        let mut field = vec![0.0_f32; 11 * 11];
        field[5 * 11 + 5] = 1.0;
        let smoothed = gaussian_smooth_field(field, 11, 11, 1.0);
        assert!(smoothed[5 * 11 + 5] < 1.0);
        assert!(smoothed[5 * 11 + 6] > 0.0);
        assert!(smoothed[6 * 11 + 5] > 0.0);
        let total: f32 = smoothed.iter().sum();
        assert!((total - 1.0).abs() < 1e-3);
    }
}
