//! Dataset data model: categories, annotations, images and datasets.
//!
//! Augmented records are built once by the orchestrator and never
//! mutated afterwards. Lineage is carried in
//! [`Image::intermediate_ids`], oldest ancestor first.

use serde::{Deserialize, Serialize};

use crate::types::{BBox, Point};

/// Tag appended to every annotation produced by augmentation.
pub const AUGMENTED_TAG: &str = "augmented";

/// A label category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// Category id referenced by [`Annotation::category_id`].
    pub id: i64,
    /// Human-readable name.
    pub name: String,
}

const fn default_conf() -> f64 {
    -1.0
}

/// One labeled object on an image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    /// Annotation id, unique within its image.
    pub id: String,
    /// Referenced [`Category::id`].
    pub category_id: i64,
    /// Center point in normalized coordinates.
    #[serde(default)]
    pub center: Option<Point>,
    /// Bounding box in normalized coordinates.
    #[serde(default)]
    pub bbox: Option<BBox>,
    /// Flat alternating `x, y` polygon in normalized coordinates.
    #[serde(default)]
    pub segmentation: Option<Vec<f64>>,
    /// Name of the task that produced the annotation.
    #[serde(default)]
    pub task: String,
    /// Model confidence; `-1` marks a human (non-predicted) label.
    #[serde(default = "default_conf")]
    pub conf: f64,
    /// Denormalized category name.
    #[serde(default)]
    pub category_name: String,
    /// Free-form ordered tags.
    #[serde(default)]
    pub tags: Vec<String>,
}

/// An image together with its annotations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    /// Image id.
    pub id: String,
    /// Path of the image file.
    pub path: String,
    /// Ids of the images this one was derived from, oldest first.
    #[serde(default)]
    pub intermediate_ids: Vec<String>,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// File size in kilobytes.
    #[serde(default)]
    pub size_kb: u64,
    /// Split group (`train`, `val` or `test`).
    #[serde(default)]
    pub group: String,
    /// Annotations on this image.
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

impl Image {
    /// Polygons of every annotation that carries a segmentation, in
    /// annotation order.
    #[must_use]
    pub fn segments(&self) -> Vec<Vec<f64>> {
        self.annotations
            .iter()
            .filter_map(|a| a.segmentation.clone())
            .collect()
    }
}

/// A whole dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    /// All images.
    #[serde(default)]
    pub images: Vec<Image>,
    /// Category reference data.
    #[serde(default)]
    pub categories: Vec<Category>,
    /// Split groups present in the dataset.
    #[serde(default)]
    pub groups: Vec<String>,
}

/// Counts describing a dataset at a glance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetSummary {
    /// Number of images.
    pub image_count: usize,
    /// Number of images whose lineage is non-empty.
    pub derived_image_count: usize,
    /// Total annotations across all images.
    pub annotation_count: usize,
    /// Number of categories.
    pub category_count: usize,
    /// Category names in declaration order.
    pub category_names: Vec<String>,
}

impl Dataset {
    /// Summarize image, annotation and category counts.
    #[must_use]
    pub fn summary(&self) -> DatasetSummary {
        DatasetSummary {
            image_count: self.images.len(),
            derived_image_count: self
                .images
                .iter()
                .filter(|i| !i.intermediate_ids.is_empty())
                .count(),
            annotation_count: self.images.iter().map(|i| i.annotations.len()).sum(),
            category_count: self.categories.len(),
            category_names: self.categories.iter().map(|c| c.name.clone()).collect(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn annotation(id: &str, segmentation: Option<Vec<f64>>) -> Annotation {
        Annotation {
            id: id.to_owned(),
            category_id: 1,
            center: None,
            bbox: None,
            segmentation,
            task: "manual".to_owned(),
            conf: -1.0,
            category_name: "cell".to_owned(),
            tags: vec![],
        }
    }

    #[test]
    fn annotation_defaults_from_minimal_json() {
        let a: Annotation = serde_json::from_str(r#"{"id":"a","category_id":3}"#).unwrap();
        assert!((a.conf + 1.0).abs() < f64::EPSILON);
        assert!(a.segmentation.is_none());
        assert!(a.tags.is_empty());
    }

    #[test]
    fn segments_skip_annotations_without_polygons() {
        let image = Image {
            id: "img".to_owned(),
            path: "img.jpg".to_owned(),
            intermediate_ids: vec![],
            width: 10,
            height: 10,
            size_kb: 1,
            group: "train".to_owned(),
            annotations: vec![
                annotation("a", Some(vec![0.1, 0.1, 0.5, 0.1, 0.5, 0.5])),
                annotation("b", None),
                annotation("c", Some(vec![0.6, 0.6, 0.9, 0.6, 0.9, 0.9])),
            ],
        };
        let segments = image.segments();
        assert_eq!(segments.len(), 2);
        assert!((segments[1][0] - 0.6).abs() < f64::EPSILON);
    }

    #[test]
    fn summary_counts() {
        let dataset = Dataset {
            images: vec![
                Image {
                    id: "a".to_owned(),
                    path: "a.jpg".to_owned(),
                    intermediate_ids: vec![],
                    width: 1,
                    height: 1,
                    size_kb: 0,
                    group: "train".to_owned(),
                    annotations: vec![annotation("x", None)],
                },
                Image {
                    id: "a_aug_0".to_owned(),
                    path: "a_aug_0.jpg".to_owned(),
                    intermediate_ids: vec!["a".to_owned()],
                    width: 1,
                    height: 1,
                    size_kb: 0,
                    group: "train".to_owned(),
                    annotations: vec![annotation("x_0", None), annotation("y_0", None)],
                },
            ],
            categories: vec![Category {
                id: 1,
                name: "cell".to_owned(),
            }],
            groups: vec!["train".to_owned()],
        };
        let summary = dataset.summary();
        assert_eq!(summary.image_count, 2);
        assert_eq!(summary.derived_image_count, 1);
        assert_eq!(summary.annotation_count, 3);
        assert_eq!(summary.category_names, vec!["cell".to_owned()]);
    }
}
