//! Shared types for the polyaug augmentation pipeline.

use image::{ImageBuffer, Luma};
use serde::{Deserialize, Serialize};

use crate::transform::TransformConfig;

/// Re-export `RgbImage` so downstream crates can hand decoded images to
/// the pipeline without depending on `image` directly.
pub use image::RgbImage;

/// Single-channel label raster. Each pixel holds the 1-based id of the
/// polygon that covers it, or 0 for background.
pub type LabelMask = ImageBuffer<Luma<u16>, Vec<u16>>;

/// A 2D point, in pixels or in normalized unit-square coordinates
/// depending on context.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position.
    pub x: f64,
    /// Vertical position.
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to another point.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.mul_add(dx, dy * dy)
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }
}

/// A closed ring of points. The closing edge from the last point back
/// to the first is implicit; the first point is not repeated.
#[derive(Debug, Clone, PartialEq)]
pub struct Polyline(Vec<Point>);

impl Polyline {
    /// Create a new ring from a vector of points.
    #[must_use]
    pub const fn new(points: Vec<Point>) -> Self {
        Self(points)
    }

    /// Returns `true` if the ring has no points.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of points in the ring.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns a slice of all points.
    #[must_use]
    pub fn points(&self) -> &[Point] {
        &self.0
    }

    /// Consumes the ring and returns the underlying vector of points.
    #[must_use]
    pub fn into_points(self) -> Vec<Point> {
        self.0
    }

    /// Length of the closed boundary, including the closing edge.
    #[must_use]
    pub fn perimeter(&self) -> f64 {
        let n = self.0.len();
        if n < 2 {
            return 0.0;
        }
        (0..n)
            .map(|i| self.0[i].distance(self.0[(i + 1) % n]))
            .sum()
    }

    /// Absolute enclosed area by the shoelace formula.
    #[must_use]
    pub fn area(&self) -> f64 {
        let n = self.0.len();
        if n < 3 {
            return 0.0;
        }
        let twice: f64 = (0..n)
            .map(|i| {
                let a = self.0[i];
                let b = self.0[(i + 1) % n];
                a.x.mul_add(b.y, -(b.x * a.y))
            })
            .sum();
        twice.abs() / 2.0
    }
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// Axis-aligned bounding box `(x1, y1, x2, y2)`.
///
/// Serialized as a four-element array to match the flat layout used
/// throughout dataset files.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BBox {
    /// Left edge.
    pub x1: f64,
    /// Top edge.
    pub y1: f64,
    /// Right edge.
    pub x2: f64,
    /// Bottom edge.
    pub y2: f64,
}

impl BBox {
    /// Create a new bounding box.
    #[must_use]
    pub const fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }
}

impl From<[f64; 4]> for BBox {
    fn from([x1, y1, x2, y2]: [f64; 4]) -> Self {
        Self { x1, y1, x2, y2 }
    }
}

impl From<BBox> for [f64; 4] {
    fn from(b: BBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

/// Parameters of the geometry recovery and validation stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Simplification tolerance as a fraction of each contour's perimeter.
    pub simplify_fraction: f64,

    /// Minimum intersection-over-union between a recovered polygon and
    /// its source polygon for the replica to be accepted.
    pub min_iou: f64,

    /// Decimal places kept on normalized output coordinates.
    pub precision: u32,
}

impl RecoveryConfig {
    /// Default simplification tolerance fraction (0.3% of perimeter).
    pub const DEFAULT_SIMPLIFY_FRACTION: f64 = 0.003;
    /// Default acceptance threshold.
    pub const DEFAULT_MIN_IOU: f64 = 0.3;
    /// Default normalized-coordinate precision.
    pub const DEFAULT_PRECISION: u32 = 5;
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            simplify_fraction: Self::DEFAULT_SIMPLIFY_FRACTION,
            min_iou: Self::DEFAULT_MIN_IOU,
            precision: Self::DEFAULT_PRECISION,
        }
    }
}

/// Configuration for one replica run: the transform composition and the
/// recovery thresholds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Joint image/mask transform parameters.
    pub transform: TransformConfig,
    /// Contour recovery and validation parameters.
    pub recovery: RecoveryConfig,
}

/// Errors from the pure geometry helpers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GeometryError {
    /// The input had no points or no polygons.
    #[error("geometry input is empty")]
    EmptyInput,

    /// A merge produced several disjoint regions and the merge policy
    /// does not allow collapsing them.
    #[error("merged polygons form {0} disjoint regions")]
    DisjointRegions(usize),
}

/// Why a replica was rejected by the recovery stages.
///
/// Rejections are values, not faults: a rejected replica is simply
/// dropped by the caller.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Rejection {
    /// The image has no polygons to carry through the transform.
    #[error("image has no segments")]
    NoSegments,

    /// A label id present in the transformed mask yielded no contour
    /// with positive area.
    #[error("no contour found for label {label}")]
    NoContourFound {
        /// 1-based label id.
        label: u16,
    },

    /// A recovered polygon overlaps its source polygon too little.
    #[error("IoU {iou:.3} for label {label} is below the acceptance threshold")]
    IouTooLow {
        /// 1-based label id.
        label: u16,
        /// Computed intersection-over-union.
        iou: f64,
    },

    /// Some objects vanished (or appeared) under the transform.
    #[error("recovered {found} polygons, expected {expected}")]
    PolygonCountMismatch {
        /// Number of input polygons.
        expected: usize,
        /// Number of recovered polygons.
        found: usize,
    },

    /// More polygons than the label mask can hold distinct ids for.
    #[error("{0} polygons exceed the label mask id range")]
    TooManyObjects(usize),
}

impl Rejection {
    /// Short stable name of the rejection reason, used as a report key.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NoSegments => "no_segments",
            Self::NoContourFound { .. } => "no_contour_found",
            Self::IouTooLow { .. } => "iou_too_low",
            Self::PolygonCountMismatch { .. } => "polygon_count_mismatch",
            Self::TooManyObjects(_) => "too_many_objects",
        }
    }
}
