//! polyaug-pipeline: Polygon-preserving image augmentation (sans-IO).
//!
//! Synthesizes augmented variants of a labeled image while carrying its
//! per-object polygon annotations through the transform:
//! rasterize polygons to a label mask -> joint image/mask transform ->
//! per-label contour recovery -> IoU validation against the sources.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! images and returns structured data. Reading and writing image files,
//! scheduling replicas across workers and assembling dataset records
//! live in `polyaug-io`.

pub mod contour;
pub mod geometry;
pub mod mask;
pub mod model;
pub mod photometric;
pub mod replica;
pub mod simplify;
pub mod transform;
pub mod types;
pub mod validate;

pub use geometry::{
    DisjointMergePolicy, bbox_from_polygon, calculate_center_from_bbox,
    calculate_center_from_polygon, get_biggest_bbox, get_min_max_bbox, merge_polygons,
    polygon_from_bbox,
};
pub use model::{AUGMENTED_TAG, Annotation, Category, Dataset, DatasetSummary, Image};
pub use replica::{Replica, augment_replica};
pub use transform::{TransformConfig, TransformEngine};
pub use types::{
    BBox, Dimensions, GeometryError, LabelMask, PipelineConfig, Point, Polyline, RecoveryConfig,
    Rejection, RgbImage,
};
pub use validate::{get_new_polygons, iou};
