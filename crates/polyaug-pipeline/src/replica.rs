//! Single-replica driver: rasterize, transform, recover, validate.
//!
//! Runs entirely in memory. Reading the source image and writing the
//! augmented one are the caller's business.

use rand::Rng;

use crate::geometry::denormalize_polygon;
use crate::mask::rasterize;
use crate::transform::TransformEngine;
use crate::types::{Dimensions, PipelineConfig, Rejection, RgbImage};
use crate::validate::get_new_polygons;

/// An accepted replica: the transformed image and one recovered polygon
/// per input segment, normalized to the unit square.
#[derive(Debug, Clone, PartialEq)]
pub struct Replica {
    /// The transformed image, same dimensions as the source.
    pub image: RgbImage,
    /// Recovered flat polygons, in input order.
    pub segments: Vec<Vec<f64>>,
}

/// Produce one augmented replica of `image`.
///
/// `segments` are normalized flat polygons. They are scaled to pixels
/// (truncating), burned into a label mask, transformed together with the
/// image and recovered from the transformed mask. The replica is
/// accepted only if every object survives with enough overlap.
///
/// # Errors
///
/// Returns [`Rejection::NoSegments`] if `segments` is empty, otherwise
/// the [`Rejection`] that disqualified the replica.
pub fn augment_replica<R: Rng + ?Sized>(
    image: &RgbImage,
    segments: &[Vec<f64>],
    config: &PipelineConfig,
    rng: &mut R,
) -> Result<Replica, Rejection> {
    if segments.is_empty() {
        return Err(Rejection::NoSegments);
    }

    let dimensions = Dimensions {
        width: image.width(),
        height: image.height(),
    };
    let polygons: Vec<_> = segments
        .iter()
        .map(|s| denormalize_polygon(s, dimensions))
        .collect();

    let mask = rasterize(dimensions, &polygons)?;
    let (image, mask) = TransformEngine::new(config.transform.clone()).apply(image, &mask, rng);
    let segments = get_new_polygons(&mask, &polygons, dimensions, &config.recovery)?;

    Ok(Replica { image, segments })
}
