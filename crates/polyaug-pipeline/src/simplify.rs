//! Closed-ring simplification using the Ramer-Douglas-Peucker algorithm.
//!
//! Contours traced from a label mask contain one point per boundary
//! pixel. Most of those lie on straight runs and carry no shape
//! information, so recovered polygons are thinned before normalization.
//!
//! A closed ring has no natural endpoints. The ring is split at its first
//! point and the point farthest from it; each half is then simplified as
//! an open chain, with both split points always kept.

use crate::types::{Point, Polyline};

/// Simplify a closed ring.
///
/// Points within `tolerance` pixels of the chord between their kept
/// neighbors are removed. A tolerance of 0.0 preserves every point that
/// is not exactly collinear with its neighbors.
///
/// Rings with fewer than 3 points are returned unchanged.
#[must_use = "returns the simplified ring"]
pub fn simplify_closed(ring: &Polyline, tolerance: f64) -> Polyline {
    let points = ring.points();
    let n = points.len();
    if n < 3 {
        return ring.clone();
    }

    let start = points[0];
    let split = points
        .iter()
        .enumerate()
        .skip(1)
        .max_by(|(_, a), (_, b)| a.distance_squared(start).total_cmp(&b.distance_squared(start)))
        .map_or(n / 2, |(i, _)| i);

    // Close the ring explicitly so the second half ends back at the start.
    let mut closed = Vec::with_capacity(n + 1);
    closed.extend_from_slice(points);
    closed.push(start);

    let mut kept = vec![false; n + 1];
    kept[0] = true;
    kept[split] = true;
    rdp_recurse(&closed, 0, split, tolerance, &mut kept);
    rdp_recurse(&closed, split, n, tolerance, &mut kept);

    let simplified: Vec<Point> = points
        .iter()
        .zip(&kept)
        .filter(|&(_, k)| *k)
        .map(|(&p, _)| p)
        .collect();

    Polyline::new(simplified)
}

/// Recursive step of the Ramer-Douglas-Peucker algorithm.
///
/// Finds the point between `start` and `end` that is farthest from the
/// line segment between them. If that distance exceeds `tolerance`, the
/// point is kept and both sub-segments are processed recursively.
fn rdp_recurse(points: &[Point], start: usize, end: usize, tolerance: f64, kept: &mut [bool]) {
    if end <= start + 1 {
        return;
    }

    let mut max_dist = 0.0;
    let mut max_idx = start;

    for i in (start + 1)..end {
        let d = perpendicular_distance(points[i], points[start], points[end]);
        if d > max_dist {
            max_dist = d;
            max_idx = i;
        }
    }

    if max_dist > tolerance {
        kept[max_idx] = true;
        rdp_recurse(points, start, max_idx, tolerance, kept);
        rdp_recurse(points, max_idx, end, tolerance, kept);
    }
}

/// Perpendicular distance from point `p` to the line defined by `a` and `b`.
///
/// Uses the formula: |cross(b-a, p-a)| / |b-a|.
/// When `a` and `b` coincide, returns the distance from `p` to `a`.
fn perpendicular_distance(p: Point, a: Point, b: Point) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let length_sq = dx.mul_add(dx, dy * dy);

    if length_sq == 0.0 {
        return p.distance(a);
    }

    let cross = dx.mul_add(a.y - p.y, -(dy * (a.x - p.x)));
    cross.abs() / length_sq.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Every boundary pixel of an axis-aligned square, clockwise.
    fn pixel_square(size: u32) -> Polyline {
        let s = f64::from(size);
        let mut points = Vec::new();
        for i in 0..size {
            points.push(Point::new(f64::from(i), 0.0));
        }
        for i in 0..size {
            points.push(Point::new(s, f64::from(i)));
        }
        for i in 0..size {
            points.push(Point::new(s - f64::from(i), s));
        }
        for i in 0..size {
            points.push(Point::new(0.0, s - f64::from(i)));
        }
        Polyline::new(points)
    }

    #[test]
    fn short_rings_unchanged() {
        assert!(simplify_closed(&Polyline::new(vec![]), 1.0).is_empty());
        let two = Polyline::new(vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0)]);
        assert_eq!(simplify_closed(&two, 1.0).len(), 2);
    }

    #[test]
    fn square_collapses_to_corners() {
        let ring = pixel_square(20);
        assert_eq!(ring.len(), 80);
        let result = simplify_closed(&ring, 0.5);
        assert_eq!(result.len(), 4);
        for corner in [
            Point::new(0.0, 0.0),
            Point::new(20.0, 0.0),
            Point::new(20.0, 20.0),
            Point::new(0.0, 20.0),
        ] {
            assert!(result.points().contains(&corner), "missing {corner:?}");
        }
    }

    #[test]
    fn simplification_preserves_area_of_square() {
        let ring = pixel_square(30);
        let result = simplify_closed(&ring, 0.003 * ring.perimeter());
        assert!((result.area() - ring.area()).abs() < 1e-9);
    }

    #[test]
    fn zero_tolerance_keeps_bumps() {
        let ring = Polyline::new(vec![
            Point::new(0.0, 0.0),
            Point::new(5.0, 0.1),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
        ]);
        assert_eq!(simplify_closed(&ring, 0.0).len(), 5);
    }

    #[test]
    fn large_tolerance_keeps_split_points() {
        let ring = pixel_square(10);
        let result = simplify_closed(&ring, 1000.0);
        assert_eq!(result.len(), 2);
        assert_eq!(result.points()[0], Point::new(0.0, 0.0));
        assert_eq!(result.points()[1], Point::new(10.0, 10.0));
    }

    #[test]
    fn perpendicular_distance_on_axis() {
        let d = perpendicular_distance(
            Point::new(1.0, 3.0),
            Point::new(0.0, 0.0),
            Point::new(2.0, 0.0),
        );
        assert!((d - 3.0).abs() < 1e-10);
    }

    #[test]
    fn perpendicular_distance_diagonal_segment() {
        // |4*(-1) - 2*(-2)| / sqrt(20) = 8 / sqrt(20)
        let d = perpendicular_distance(
            Point::new(2.0, -1.0),
            Point::new(0.0, 0.0),
            Point::new(4.0, 2.0),
        );
        let expected = 8.0 / 20.0_f64.sqrt();
        assert!((d - expected).abs() < 1e-10, "got {d}, expected {expected}",);
    }

    #[test]
    fn perpendicular_distance_coincident_endpoints() {
        let d = perpendicular_distance(
            Point::new(3.0, 4.0),
            Point::new(0.0, 0.0),
            Point::new(0.0, 0.0),
        );
        assert!((d - 5.0).abs() < 1e-10);
    }
}
