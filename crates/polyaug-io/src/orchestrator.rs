//! Augmentation orchestrator: fan out (image, replica) jobs and collect
//! accepted replicas as new dataset records.
//!
//! Every job reads its own source file, runs the in-memory pipeline and
//! writes its own JPEG into a run directory created once per batch, so
//! jobs share nothing mutable. A job either yields an
//! [`AugmentedRecord`] or a [`JobRejection`]; rejections (including
//! panics) are absorbed at the job boundary and only counted. Only
//! failing to set up the batch itself is an error.
//!
//! Accepted records are turned into [`Image`]s carrying lineage: the new
//! image's `intermediate_ids` extend its parent's with the parent id, and
//! every annotation id gets the replica index as a suffix.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};

use polyaug_pipeline::{
    AUGMENTED_TAG, Annotation, Dataset, Image, PipelineConfig, augment_replica,
    bbox_from_polygon, calculate_center_from_polygon,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::AugmentConfig;
use crate::error::{IoError, JobRejection};
use crate::image_file::{read_rgb, write_jpeg};

/// Output of one accepted job.
#[derive(Debug, Clone, PartialEq)]
pub struct AugmentedRecord {
    /// Path of the written JPEG.
    pub path: PathBuf,
    /// Recovered normalized polygons, one per input segment, in order.
    pub segments: Vec<Vec<f64>>,
    /// Id of the augmented image, `{original_id}_aug_{image_index}`.
    pub id: String,
    /// Id of the source image.
    pub original_id: String,
    /// Replica index within the source image.
    pub image_index: usize,
}

/// Result of one (image, replica) job.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplicaOutcome {
    /// The replica passed validation and its image was written.
    Accepted(AugmentedRecord),
    /// The replica was discarded.
    Rejected(JobRejection),
}

/// Aggregate counts for a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AugmentationReport {
    /// Jobs scheduled.
    pub attempted: usize,
    /// Jobs that produced an augmented image.
    pub accepted: usize,
    /// Rejected jobs keyed by [`JobRejection::kind`].
    pub rejected: BTreeMap<String, usize>,
    /// Images skipped because they carry no segmented annotation.
    pub skipped_images: usize,
}

impl AugmentationReport {
    fn record(&mut self, outcome: &ReplicaOutcome) {
        self.attempted += 1;
        match outcome {
            ReplicaOutcome::Accepted(_) => self.accepted += 1,
            ReplicaOutcome::Rejected(reason) => {
                *self.rejected.entry(reason.kind().to_owned()).or_default() += 1;
            }
        }
    }

    /// Total number of rejected jobs.
    #[must_use]
    pub fn rejected_total(&self) -> usize {
        self.rejected.values().sum()
    }
}

/// Id of replica `replica_index` of image `image_id`.
#[must_use]
pub fn augmented_id(image_id: &str, replica_index: usize) -> String {
    format!("{image_id}_aug_{replica_index}")
}

/// Run one replica of one image end to end.
///
/// Reads `image_path`, augments it with `segments` (normalized flat
/// polygons) and, if the replica is accepted, writes
/// `{output_dir}/{image_id}_aug_{replica_index}.jpg`. Nothing is written
/// for a rejected replica; an empty `segments` list is always rejected.
pub fn generate_augmented_image<R: Rng + ?Sized>(
    image_id: &str,
    image_path: &Path,
    segments: &[Vec<f64>],
    output_dir: &Path,
    replica_index: usize,
    config: &PipelineConfig,
    rng: &mut R,
) -> ReplicaOutcome {
    let id = augmented_id(image_id, replica_index);
    let target = output_dir.join(format!("{id}.jpg"));

    let result = read_rgb(image_path)
        .and_then(|image| augment_replica(&image, segments, config, rng).map_err(Into::into))
        .and_then(|replica| write_jpeg(&target, &replica.image).map(|()| replica.segments));

    match result {
        Ok(segments) => ReplicaOutcome::Accepted(AugmentedRecord {
            path: target,
            segments,
            id,
            original_id: image_id.to_owned(),
            image_index: replica_index,
        }),
        Err(reason) => ReplicaOutcome::Rejected(reason),
    }
}

/// One scheduled (image, replica) pair.
struct Job {
    image_index: usize,
    replica_index: usize,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_owned())
}

/// Generate `replica_count` augmented variants of every image and report
/// how the jobs fared.
///
/// Images without any segmented annotation are skipped. The returned
/// images are in no guaranteed order; each is attributable to its source
/// through its lineage. A batch in which every job is rejected returns an
/// empty list.
///
/// # Errors
///
/// Returns [`IoError::OutputDirectory`] if the run directory cannot be
/// created and [`IoError::WorkerPool`] if the worker pool cannot start.
pub fn generate_augmentations_with_report(
    images: &[Image],
    replica_count: usize,
    config: &AugmentConfig,
) -> Result<(Vec<Image>, AugmentationReport), IoError> {
    let run_dir = config.output_root.join(uuid::Uuid::new_v4().to_string());
    std::fs::create_dir_all(&run_dir).map_err(|source| IoError::OutputDirectory {
        path: run_dir.clone(),
        source,
    })?;
    info!(dir = %run_dir.display(), "created augmentation output directory");

    let mut report = AugmentationReport::default();
    let segments: Vec<Vec<Vec<f64>>> = images.iter().map(Image::segments).collect();
    let mut jobs = Vec::with_capacity(images.len() * replica_count);
    for (image_index, image) in images.iter().enumerate() {
        if segments[image_index].is_empty() {
            debug!(image_id = %image.id, "no segmented annotations, skipping image");
            report.skipped_images += 1;
            continue;
        }
        jobs.extend((0..replica_count).map(|replica_index| Job {
            image_index,
            replica_index,
        }));
    }

    let pipeline = config.pipeline();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.worker_count())
        .build()?;

    let outcomes: Vec<(usize, ReplicaOutcome)> = pool.install(|| {
        jobs.par_iter()
            .map(|job| {
                let image = &images[job.image_index];
                let mut rng = config
                    .job_seed(job.image_index, job.replica_index)
                    .map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);
                let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
                    generate_augmented_image(
                        &image.id,
                        Path::new(&image.path),
                        &segments[job.image_index],
                        &run_dir,
                        job.replica_index,
                        &pipeline,
                        &mut rng,
                    )
                }))
                .unwrap_or_else(|payload| {
                    ReplicaOutcome::Rejected(JobRejection::JobPanicked(panic_message(&*payload)))
                });
                (job.image_index, outcome)
            })
            .collect()
    });

    let mut augmented = Vec::new();
    for (image_index, outcome) in outcomes {
        report.record(&outcome);
        let original = &images[image_index];
        match outcome {
            ReplicaOutcome::Accepted(record) => {
                debug!(image_id = %record.id, "augmented image");
                augmented.push(assemble_image(original, &record));
            }
            ReplicaOutcome::Rejected(reason @ JobRejection::Pipeline(_)) => {
                debug!(image_id = %original.id, kind = reason.kind(), %reason, "replica rejected");
            }
            ReplicaOutcome::Rejected(reason) => {
                warn!(image_id = %original.id, kind = reason.kind(), %reason, "replica failed");
            }
        }
    }

    info!(
        attempted = report.attempted,
        accepted = report.accepted,
        rejected = ?report.rejected,
        skipped_images = report.skipped_images,
        "augmentation batch finished: {} of {} replicas accepted",
        report.accepted,
        report.attempted,
    );
    Ok((augmented, report))
}

/// Generate `replica_count` augmented variants of every image.
///
/// # Errors
///
/// See [`generate_augmentations_with_report`].
pub fn generate_augmentations(
    images: &[Image],
    replica_count: usize,
    config: &AugmentConfig,
) -> Result<Vec<Image>, IoError> {
    generate_augmentations_with_report(images, replica_count, config).map(|(images, _)| images)
}

/// Augment a whole dataset and report how the jobs fared.
///
/// The augmented images are appended after the original ones;
/// categories and groups are carried over unchanged.
///
/// # Errors
///
/// See [`generate_augmentations_with_report`].
pub fn generic_with_report(
    dataset: &Dataset,
    replica_count: usize,
    config: &AugmentConfig,
) -> Result<(Dataset, AugmentationReport), IoError> {
    let (augmented, report) =
        generate_augmentations_with_report(&dataset.images, replica_count, config)?;
    let mut images = dataset.images.clone();
    images.extend(augmented);
    Ok((
        Dataset {
            images,
            categories: dataset.categories.clone(),
            groups: dataset.groups.clone(),
        },
        report,
    ))
}

/// Augment a whole dataset.
///
/// # Errors
///
/// See [`generate_augmentations_with_report`].
pub fn generic(
    dataset: &Dataset,
    replica_count: usize,
    config: &AugmentConfig,
) -> Result<Dataset, IoError> {
    generic_with_report(dataset, replica_count, config).map(|(dataset, _)| dataset)
}

/// Build the dataset record for an accepted replica of `original`.
///
/// Segmented annotations of `original` are paired with the recovered
/// polygons in order; bounding box and center are re-derived from each
/// recovered polygon.
#[must_use]
pub fn assemble_image(original: &Image, record: &AugmentedRecord) -> Image {
    let mut intermediate_ids = original.intermediate_ids.clone();
    intermediate_ids.push(original.id.clone());

    let annotations = original
        .annotations
        .iter()
        .filter(|a| a.segmentation.is_some())
        .zip(&record.segments)
        .map(|(parent, segmentation)| {
            augmented_annotation(parent, segmentation, record.image_index)
        })
        .collect();

    Image {
        id: record.id.clone(),
        path: record.path.to_string_lossy().into_owned(),
        intermediate_ids,
        width: original.width,
        height: original.height,
        size_kb: original.size_kb,
        group: original.group.clone(),
        annotations,
    }
}

fn augmented_annotation(
    parent: &Annotation,
    segmentation: &[f64],
    replica_index: usize,
) -> Annotation {
    let mut tags = parent.tags.clone();
    tags.push(AUGMENTED_TAG.to_owned());
    Annotation {
        id: format!("{}_{replica_index}", parent.id),
        category_id: parent.category_id,
        center: calculate_center_from_polygon(segmentation).ok(),
        bbox: bbox_from_polygon(segmentation).ok(),
        segmentation: Some(segmentation.to_vec()),
        task: parent.task.clone(),
        conf: parent.conf,
        category_name: parent.category_name.clone(),
        tags,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use polyaug_pipeline::{BBox, Rejection, TransformConfig};

    use super::*;

    fn annotation(id: &str, segmentation: Option<Vec<f64>>) -> Annotation {
        Annotation {
            id: id.to_owned(),
            category_id: 4,
            center: None,
            bbox: None,
            segmentation,
            task: "manual".to_owned(),
            conf: -1.0,
            category_name: "spot".to_owned(),
            tags: vec!["reviewed".to_owned()],
        }
    }

    fn parent() -> Image {
        Image {
            id: "leaf-7".to_owned(),
            path: "/data/leaf-7.png".to_owned(),
            intermediate_ids: vec!["root".to_owned()],
            width: 200,
            height: 100,
            size_kb: 31,
            group: "val".to_owned(),
            annotations: vec![
                annotation("a", Some(vec![0.1, 0.1, 0.2, 0.1, 0.2, 0.2])),
                annotation("b", None),
                annotation("c", Some(vec![0.5, 0.5, 0.7, 0.5, 0.7, 0.8])),
            ],
        }
    }

    fn record() -> AugmentedRecord {
        AugmentedRecord {
            path: PathBuf::from("/tmp/run/leaf-7_aug_2.jpg"),
            segments: vec![
                vec![0.11, 0.1, 0.21, 0.1, 0.21, 0.2, 0.11, 0.2],
                vec![0.5, 0.5, 0.7, 0.5, 0.6, 0.9],
            ],
            id: augmented_id("leaf-7", 2),
            original_id: "leaf-7".to_owned(),
            image_index: 2,
        }
    }

    #[test]
    fn augmented_id_format() {
        assert_eq!(augmented_id("img", 0), "img_aug_0");
    }

    #[test]
    fn lineage_extends_parent_chain() {
        let image = assemble_image(&parent(), &record());
        assert_eq!(image.id, "leaf-7_aug_2");
        assert_eq!(image.intermediate_ids, vec!["root", "leaf-7"]);
        assert_eq!(image.path, "/tmp/run/leaf-7_aug_2.jpg");
        assert_eq!((image.width, image.height, image.size_kb), (200, 100, 31));
        assert_eq!(image.group, "val");
    }

    #[test]
    fn annotations_pair_with_segmented_parents_in_order() {
        let image = assemble_image(&parent(), &record());
        let ids: Vec<&str> = image.annotations.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a_2", "c_2"]);
        for a in &image.annotations {
            assert_eq!(a.tags, vec!["reviewed", AUGMENTED_TAG]);
            assert_eq!(a.category_id, 4);
        }
    }

    #[test]
    fn bbox_and_center_are_rederived() {
        let image = assemble_image(&parent(), &record());
        let second = &image.annotations[1];
        assert_eq!(second.bbox, Some(BBox::new(0.5, 0.5, 0.7, 0.9)));
        let center = second.center.unwrap();
        assert!((center.x - 0.6).abs() < 1e-9);
        assert!((center.y - 0.633_333).abs() < 1e-9);
    }

    #[test]
    fn report_counts_by_kind() {
        let mut report = AugmentationReport::default();
        report.record(&ReplicaOutcome::Accepted(record()));
        report.record(&ReplicaOutcome::Rejected(JobRejection::Pipeline(
            Rejection::NoContourFound { label: 1 },
        )));
        report.record(&ReplicaOutcome::Rejected(JobRejection::Pipeline(
            Rejection::NoContourFound { label: 2 },
        )));
        report.record(&ReplicaOutcome::Rejected(JobRejection::JobPanicked(
            "boom".to_owned(),
        )));
        assert_eq!(report.attempted, 4);
        assert_eq!(report.accepted, 1);
        assert_eq!(report.rejected_total(), 3);
        assert_eq!(report.rejected.get("no_contour_found"), Some(&2));
        assert_eq!(report.rejected.get("job_panicked"), Some(&1));
    }

    #[test]
    fn replica_without_segments_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("blank.png");
        image::RgbImage::from_pixel(50, 50, image::Rgb([90, 120, 30]))
            .save(&source)
            .unwrap();
        let config = PipelineConfig {
            transform: TransformConfig::identity(),
            ..PipelineConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(11);

        let outcome =
            generate_augmented_image("blank", &source, &[], dir.path(), 0, &config, &mut rng);

        assert!(matches!(
            outcome,
            ReplicaOutcome::Rejected(JobRejection::Pipeline(Rejection::NoSegments))
        ));
        assert!(!dir.path().join("blank_aug_0.jpg").exists());
    }

    #[test]
    fn panic_payloads_become_messages() {
        let payload = std::panic::catch_unwind(|| {
            std::panic::panic_any("static message");
        })
        .unwrap_err();
        assert_eq!(panic_message(&*payload), "static message");
        let payload = std::panic::catch_unwind(|| {
            std::panic::panic_any(String::from("owned message"));
        })
        .unwrap_err();
        assert_eq!(panic_message(&*payload), "owned message");
        let payload = std::panic::catch_unwind(|| {
            std::panic::panic_any(7_u32);
        })
        .unwrap_err();
        assert_eq!(panic_message(&*payload), "non-string panic payload");
    }
}
