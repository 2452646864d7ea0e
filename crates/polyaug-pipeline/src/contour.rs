//! Contour extraction: recover one polygon per label from a label mask.
//!
//! For a given label the mask is reduced to a binary image, its outermost
//! borders are traced with `imageproc::contours::find_contours`
//! (Suzuki-Abe border following) and holes are ignored. When the transform
//! fragmented an object, only the piece with the largest enclosed area
//! survives. That contour is simplified with a tolerance proportional to
//! its perimeter and normalized to the unit square.

use image::{GrayImage, Luma};
use imageproc::contours::{BorderType, Contour};

use crate::geometry::normalize_polygon;
use crate::simplify::simplify_closed;
use crate::types::{Dimensions, LabelMask, Point, Polyline, RecoveryConfig, Rejection};

/// Pixel bounds of `label` in `mask`, as inclusive `(x0, y0, x1, y1)`.
fn label_bounds(mask: &LabelMask, label: u16) -> Option<(u32, u32, u32, u32)> {
    mask.enumerate_pixels()
        .filter(|(_, _, p)| p.0[0] == label)
        .fold(None, |acc, (x, y, _)| match acc {
            None => Some((x, y, x, y)),
            Some((x0, y0, x1, y1)) => Some((x0.min(x), y0.min(y), x1.max(x), y1.max(y))),
        })
}

/// Trace the external contours of `label`, in mask pixel coordinates.
///
/// Only the region's bounding box (plus a one pixel margin) is traced, so
/// small objects on large images stay cheap.
#[must_use]
pub fn external_contours(mask: &LabelMask, label: u16) -> Vec<Polyline> {
    let Some((x0, y0, x1, y1)) = label_bounds(mask, label) else {
        return Vec::new();
    };

    // Shift the crop so the region never touches the binary image border.
    let (ox, oy) = (i64::from(x0) - 1, i64::from(y0) - 1);
    let binary = GrayImage::from_fn(x1 - x0 + 3, y1 - y0 + 3, |x, y| {
        let (mx, my) = (i64::from(x) + ox, i64::from(y) + oy);
        let inside = u32::try_from(mx).ok().zip(u32::try_from(my).ok()).is_some_and(
            |(mx, my)| {
                mx < mask.width() && my < mask.height() && mask.get_pixel(mx, my).0[0] == label
            },
        );
        Luma([if inside { 255 } else { 0 }])
    });

    let contours: Vec<Contour<i32>> = imageproc::contours::find_contours(&binary);
    contours
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .map(|c| {
            #[allow(clippy::cast_precision_loss)]
            let points = c
                .points
                .into_iter()
                .map(|p| Point::new((i64::from(p.x) + ox) as f64, (i64::from(p.y) + oy) as f64))
                .collect();
            Polyline::new(points)
        })
        .collect()
}

/// The external contour of `label` with the largest enclosed area.
///
/// # Errors
///
/// Returns [`Rejection::NoContourFound`] if the label has no contour
/// enclosing a positive area (absent, or only one pixel thick).
pub fn largest_contour(mask: &LabelMask, label: u16) -> Result<Polyline, Rejection> {
    external_contours(mask, label)
        .into_iter()
        .map(|c| (c.area(), c))
        .filter(|(area, _)| *area > 0.0)
        .max_by(|(a, _), (b, _)| a.total_cmp(b))
        .map(|(_, c)| c)
        .ok_or(Rejection::NoContourFound { label })
}

/// Recover the normalized polygon for `label`.
///
/// The largest external contour is simplified with a tolerance of
/// `config.simplify_fraction` times its perimeter. If that leaves fewer
/// than three vertices the raw contour is used instead.
///
/// # Errors
///
/// Returns [`Rejection::NoContourFound`] if the label has no usable
/// contour.
pub fn recover_polygon(
    mask: &LabelMask,
    label: u16,
    dimensions: Dimensions,
    config: &RecoveryConfig,
) -> Result<Vec<f64>, Rejection> {
    let contour = largest_contour(mask, label)?;
    let tolerance = config.simplify_fraction * contour.perimeter();
    let simplified = simplify_closed(&contour, tolerance);
    let ring = if simplified.len() < 3 {
        contour
    } else {
        simplified
    };
    Ok(normalize_polygon(ring.points(), dimensions, config.precision))
}
