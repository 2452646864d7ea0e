//! Label mask rasterization: burn polygons into a single-channel id map.
//!
//! Every polygon is filled with its 1-based position in the input list;
//! background stays 0. Polygons are drawn in order, so where two overlap
//! the later one owns the shared pixels.
//!
//! This is the first step of a replica, before the joint transform.

use image::Luma;
use imageproc::drawing::draw_polygon_mut;

use crate::types::{Dimensions, LabelMask, Point, Rejection};

/// Rasterize pixel-space polygons into a label mask of the given size.
///
/// Polygons with fewer than three distinct vertices cover no area and
/// are skipped; their id is simply absent from the mask. Vertices outside
/// the image are clipped by the fill.
///
/// # Errors
///
/// Returns [`Rejection::TooManyObjects`] if there are more polygons than
/// distinct non-zero `u16` ids.
pub fn rasterize(dimensions: Dimensions, polygons: &[Vec<Point>]) -> Result<LabelMask, Rejection> {
    if polygons.len() > usize::from(u16::MAX) {
        return Err(Rejection::TooManyObjects(polygons.len()));
    }

    let mut mask = LabelMask::new(dimensions.width, dimensions.height);
    if dimensions.width == 0 || dimensions.height == 0 {
        return Ok(mask);
    }

    for (index, polygon) in polygons.iter().enumerate() {
        let label =
            u16::try_from(index + 1).map_err(|_| Rejection::TooManyObjects(polygons.len()))?;
        let vertices = pixel_vertices(polygon);
        if vertices.len() < 3 {
            continue;
        }
        draw_polygon_mut(&mut mask, &vertices, Luma([label]));
    }

    Ok(mask)
}

/// Distinct positive labels present in `mask`, ascending.
#[must_use]
pub fn labels_present(mask: &LabelMask) -> Vec<u16> {
    let mut seen = vec![false; usize::from(u16::MAX) + 1];
    for pixel in mask.pixels() {
        seen[usize::from(pixel.0[0])] = true;
    }
    seen.iter()
        .enumerate()
        .skip(1)
        .filter(|&(_, &present)| present)
        .filter_map(|(label, _)| u16::try_from(label).ok())
        .collect()
}

/// Convert a polygon to integer vertices accepted by the polygon fill.
///
/// Consecutive duplicates and a repeated closing vertex are removed,
/// since the fill rejects rings whose first and last points coincide.
#[allow(clippy::cast_possible_truncation)]
fn pixel_vertices(polygon: &[Point]) -> Vec<imageproc::point::Point<i32>> {
    let mut vertices: Vec<imageproc::point::Point<i32>> = Vec::with_capacity(polygon.len());
    for p in polygon {
        let v = imageproc::point::Point::new(p.x.round() as i32, p.y.round() as i32);
        if vertices.last() != Some(&v) {
            vertices.push(v);
        }
    }
    while vertices.len() > 1 && vertices.first() == vertices.last() {
        vertices.pop();
    }
    vertices
}
