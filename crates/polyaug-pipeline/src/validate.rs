//! Consistency validation of recovered polygons.
//!
//! Every recovered polygon is scaled back to pixels and compared with the
//! source polygon of the same label by intersection-over-union. One bad
//! object, or one missing object, rejects the whole replica: a sample with
//! partial annotations is worse than no sample.

use geo::{Area, BooleanOps};

use crate::contour::recover_polygon;
use crate::geometry::{denormalize_polygon, to_geo_polygon};
use crate::mask::labels_present;
use crate::types::{Dimensions, LabelMask, Point, RecoveryConfig, Rejection};

/// Intersection-over-union of two polygon regions.
///
/// Returns `0.0` when both regions are empty. Identical rings score
/// exactly `1.0`.
#[must_use]
pub fn iou(a: &[Point], b: &[Point]) -> f64 {
    let (pa, pb) = (to_geo_polygon(a), to_geo_polygon(b));
    let (area_a, area_b) = (pa.unsigned_area(), pb.unsigned_area());
    if a == b && area_a > 0.0 {
        return 1.0;
    }
    let intersection = pa.intersection(&pb).unsigned_area();
    let union = area_a + area_b - intersection;
    if union <= 0.0 {
        return 0.0;
    }
    (intersection / union).clamp(0.0, 1.0)
}

/// Recover and validate one polygon per label in a transformed mask.
///
/// `originals` are the source polygons in pixel coordinates, indexed by
/// `label - 1`. Returns the recovered polygons normalized to the unit
/// square, in ascending label order.
///
/// # Errors
///
/// - [`Rejection::NoContourFound`] if a present label yields no contour.
/// - [`Rejection::IouTooLow`] if a recovered polygon scores below
///   `config.min_iou` against its source.
/// - [`Rejection::PolygonCountMismatch`] if the number of recovered
///   polygons differs from the number of sources.
pub fn get_new_polygons(
    mask: &LabelMask,
    originals: &[Vec<Point>],
    dimensions: Dimensions,
    config: &RecoveryConfig,
) -> Result<Vec<Vec<f64>>, Rejection> {
    let labels = labels_present(mask);
    let mismatch = || Rejection::PolygonCountMismatch {
        expected: originals.len(),
        found: labels.len(),
    };

    let mut recovered = Vec::with_capacity(labels.len());
    for &label in &labels {
        let source = originals
            .get(usize::from(label) - 1)
            .ok_or_else(mismatch)?;
        let polygon = recover_polygon(mask, label, dimensions, config)?;
        let score = iou(&denormalize_polygon(&polygon, dimensions), source);
        if score < config.min_iou {
            return Err(Rejection::IouTooLow { label, iou: score });
        }
        recovered.push(polygon);
    }

    if recovered.len() != originals.len() {
        return Err(mismatch());
    }
    Ok(recovered)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::mask::rasterize;

    const DIMS: Dimensions = Dimensions {
        width: 100,
        height: 100,
    };

    fn square(x1: f64, y1: f64, x2: f64, y2: f64) -> Vec<Point> {
        vec![
            Point::new(x1, y1),
            Point::new(x2, y1),
            Point::new(x2, y2),
            Point::new(x1, y2),
        ]
    }

    #[test]
    fn iou_of_polygon_with_itself_is_one() {
        let a = square(10.0, 10.0, 90.0, 90.0);
        assert!((iou(&a, &a) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn iou_of_disjoint_polygons_is_zero() {
        let a = square(0.0, 0.0, 10.0, 10.0);
        let b = square(20.0, 20.0, 30.0, 30.0);
        assert!(iou(&a, &b).abs() < 1e-12);
    }

    #[test]
    fn iou_of_half_overlap() {
        let a = square(0.0, 0.0, 10.0, 10.0);
        let b = square(5.0, 0.0, 15.0, 10.0);
        // 50 / (100 + 100 - 50)
        assert!((iou(&a, &b) - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn iou_of_empty_regions_is_zero() {
        assert!(iou(&[], &[]).abs() < f64::EPSILON);
    }

    #[test]
    fn untouched_mask_validates() {
        let originals = vec![square(10.0, 10.0, 40.0, 40.0), square(60.0, 60.0, 90.0, 90.0)];
        let mask = rasterize(DIMS, &originals).unwrap();
        let polygons = get_new_polygons(&mask, &originals, DIMS, &RecoveryConfig::default())
            .unwrap();
        assert_eq!(polygons.len(), 2);
        for (polygon, original) in polygons.iter().zip(&originals) {
            let score = iou(&denormalize_polygon(polygon, DIMS), original);
            assert!(score > 0.9, "iou {score}");
        }
    }

    #[test]
    fn disjoint_region_is_rejected() {
        let originals = vec![square(10.0, 10.0, 30.0, 30.0)];
        // Label 1 painted far away from its source polygon.
        let mask = rasterize(DIMS, &[square(60.0, 60.0, 90.0, 90.0)]).unwrap();
        let result = get_new_polygons(&mask, &originals, DIMS, &RecoveryConfig::default());
        assert!(matches!(result, Err(Rejection::IouTooLow { label: 1, .. })));
    }

    #[test]
    fn vanished_object_is_a_count_mismatch() {
        let originals = vec![square(10.0, 10.0, 30.0, 30.0), square(60.0, 60.0, 90.0, 90.0)];
        let mask = rasterize(DIMS, &originals[..1]).unwrap();
        let result = get_new_polygons(&mask, &originals, DIMS, &RecoveryConfig::default());
        assert!(matches!(
            result,
            Err(Rejection::PolygonCountMismatch {
                expected: 2,
                found: 1
            })
        ));
    }

    #[test]
    fn threshold_is_configurable() {
        let originals = vec![square(10.0, 10.0, 50.0, 50.0)];
        let mask = rasterize(DIMS, &[square(30.0, 10.0, 70.0, 50.0)]).unwrap();
        let strict = RecoveryConfig::default();
        assert!(get_new_polygons(&mask, &originals, DIMS, &strict).is_ok());
        let stricter = RecoveryConfig {
            min_iou: 0.9,
            ..RecoveryConfig::default()
        };
        assert!(matches!(
            get_new_polygons(&mask, &originals, DIMS, &stricter),
            Err(Rejection::IouTooLow { .. })
        ));
    }
}
