//! Pure polygon and bounding-box helpers.
//!
//! Polygons travel through the system as flat alternating `x, y`
//! sequences (the dataset layout). The closing edge is implicit: the
//! first point is never repeated at the end.
//!
//! These functions are a stable surface for dataset loading and
//! splitting code as well as for the augmentation pipeline itself.

use geo::{Area, BooleanOps, ConvexHull, Coord, LineString, MultiPolygon};
use serde::{Deserialize, Serialize};

use crate::model::Annotation;
use crate::types::{BBox, Dimensions, GeometryError, Point};

/// Decimal places kept by the center helpers.
pub const CENTER_PRECISION: u32 = 6;

/// What [`merge_polygons`] does when the union of its inputs is not a
/// single connected region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisjointMergePolicy {
    /// Collapse all pieces into their common convex hull. Lossy: the gaps
    /// between pieces become part of the merged region.
    #[default]
    ConvexHull,
    /// Keep only the piece with the largest area.
    KeepLargest,
    /// Refuse with [`GeometryError::DisjointRegions`].
    Error,
}

/// Round `value` to `places` decimal places.
#[must_use]
pub fn round_to(value: f64, places: u32) -> f64 {
    let factor = 10_f64.powi(i32::try_from(places).unwrap_or(i32::MAX));
    (value * factor).round() / factor
}

/// Split a flat `x, y, x, y, ...` sequence into points. A trailing
/// unpaired value is ignored.
#[must_use]
pub fn points_from_flat(flat: &[f64]) -> Vec<Point> {
    flat.chunks_exact(2)
        .map(|xy| Point::new(xy[0], xy[1]))
        .collect()
}

/// Flatten points into an alternating `x, y` sequence.
#[must_use]
pub fn flatten(points: &[Point]) -> Vec<f64> {
    points.iter().flat_map(|p| [p.x, p.y]).collect()
}

/// Scale a normalized flat polygon to whole-pixel coordinates.
///
/// Coordinates are truncated towards zero, matching how label polygons
/// are burned into masks and compared during validation.
#[must_use]
pub fn denormalize_polygon(flat: &[f64], dimensions: Dimensions) -> Vec<Point> {
    let (w, h) = (f64::from(dimensions.width), f64::from(dimensions.height));
    points_from_flat(flat)
        .into_iter()
        .map(|p| Point::new((p.x * w).trunc(), (p.y * h).trunc()))
        .collect()
}

/// Scale pixel coordinates into the unit square, rounding each value to
/// `precision` decimal places.
#[must_use]
pub fn normalize_polygon(points: &[Point], dimensions: Dimensions, precision: u32) -> Vec<f64> {
    let (w, h) = (f64::from(dimensions.width), f64::from(dimensions.height));
    points
        .iter()
        .flat_map(|p| [round_to(p.x / w, precision), round_to(p.y / h, precision)])
        .collect()
}

/// Tight bounding box of a flat polygon.
///
/// # Errors
///
/// Returns [`GeometryError::EmptyInput`] if the polygon has no points.
pub fn bbox_from_polygon(polygon: &[f64]) -> Result<BBox, GeometryError> {
    let points = points_from_flat(polygon);
    let first = points.first().ok_or(GeometryError::EmptyInput)?;
    let init = BBox::new(first.x, first.y, first.x, first.y);
    Ok(points.iter().fold(init, |b, p| {
        BBox::new(b.x1.min(p.x), b.y1.min(p.y), b.x2.max(p.x), b.y2.max(p.y))
    }))
}

/// The four corners of `bbox`, clockwise from the top-left (in image
/// coordinates, where y grows downwards).
#[must_use]
pub fn polygon_from_bbox(bbox: BBox) -> Vec<f64> {
    vec![
        bbox.x1, bbox.y1, bbox.x2, bbox.y1, bbox.x2, bbox.y2, bbox.x1, bbox.y2,
    ]
}

/// Center of a bounding box, rounded to [`CENTER_PRECISION`] places.
#[must_use]
pub fn calculate_center_from_bbox(bbox: BBox) -> Point {
    Point::new(
        round_to(f64::midpoint(bbox.x1, bbox.x2), CENTER_PRECISION),
        round_to(f64::midpoint(bbox.y1, bbox.y2), CENTER_PRECISION),
    )
}

/// Vertex centroid (arithmetic mean of the points) of a flat polygon,
/// rounded to [`CENTER_PRECISION`] places.
///
/// # Errors
///
/// Returns [`GeometryError::EmptyInput`] if the polygon has no points.
#[allow(clippy::cast_precision_loss)]
pub fn calculate_center_from_polygon(polygon: &[f64]) -> Result<Point, GeometryError> {
    let points = points_from_flat(polygon);
    if points.is_empty() {
        return Err(GeometryError::EmptyInput);
    }
    let n = points.len() as f64;
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    Ok(Point::new(
        round_to(sx / n, CENTER_PRECISION),
        round_to(sy / n, CENTER_PRECISION),
    ))
}

/// Union of two bounding boxes.
#[must_use]
pub fn get_biggest_bbox(a: BBox, b: BBox) -> BBox {
    BBox::new(a.x1.min(b.x1), a.y1.min(b.y1), a.x2.max(b.x2), a.y2.max(b.y2))
}

/// Union of the bounding boxes of every annotation that has one.
///
/// Returns `None` when no annotation carries a bounding box.
#[must_use]
pub fn get_min_max_bbox(annotations: &[Annotation]) -> Option<BBox> {
    annotations
        .iter()
        .filter_map(|a| a.bbox)
        .reduce(get_biggest_bbox)
}

/// Build a `geo` polygon from a ring of points.
pub(crate) fn to_geo_polygon(points: &[Point]) -> geo::Polygon<f64> {
    let coords: Vec<Coord<f64>> = points.iter().map(|p| Coord { x: p.x, y: p.y }).collect();
    geo::Polygon::new(LineString::new(coords), vec![])
}

/// Exterior ring of a `geo` polygon as points, without the repeated
/// closing coordinate.
fn exterior_points(polygon: &geo::Polygon<f64>) -> Vec<Point> {
    let mut points: Vec<Point> = polygon
        .exterior()
        .coords()
        .map(|c| Point::new(c.x, c.y))
        .collect();
    if points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    points
}

/// Merge several flat polygons into one by geometric union.
///
/// The polygons are folded with sequential set-union. When the result
/// is a single region its exterior ring is returned (holes are dropped).
/// When the union falls apart into several disjoint pieces, `policy`
/// decides the outcome; the default [`DisjointMergePolicy::ConvexHull`]
/// collapses them into their convex hull.
///
/// # Errors
///
/// Returns [`GeometryError::EmptyInput`] if `polygons` is empty or the
/// union has no area, and [`GeometryError::DisjointRegions`] under
/// [`DisjointMergePolicy::Error`] when the union is disconnected.
pub fn merge_polygons(
    polygons: &[Vec<f64>],
    policy: DisjointMergePolicy,
) -> Result<Vec<f64>, GeometryError> {
    let mut regions = polygons
        .iter()
        .map(|flat| to_geo_polygon(&points_from_flat(flat)));
    let first = regions.next().ok_or(GeometryError::EmptyInput)?;

    let merged = regions.fold(MultiPolygon::new(vec![first]), |acc, next| {
        acc.union(&MultiPolygon::new(vec![next]))
    });

    let region = match merged.0.len() {
        0 => return Err(GeometryError::EmptyInput),
        1 => merged.0[0].clone(),
        n => match policy {
            DisjointMergePolicy::ConvexHull => merged.convex_hull(),
            DisjointMergePolicy::KeepLargest => merged
                .0
                .iter()
                .max_by(|a, b| a.unsigned_area().total_cmp(&b.unsigned_area()))
                .cloned()
                .ok_or(GeometryError::EmptyInput)?,
            DisjointMergePolicy::Error => return Err(GeometryError::DisjointRegions(n)),
        },
    };

    let points = exterior_points(&region);
    if points.is_empty() {
        return Err(GeometryError::EmptyInput);
    }
    Ok(flatten(&points))
}
