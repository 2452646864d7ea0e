//! polyaug-io: File I/O and parallel orchestration for polyaug.
//!
//! Reads source images, runs the in-memory `polyaug-pipeline` replica
//! driver across a bounded worker pool, writes accepted replicas as
//! JPEGs into a run-unique directory and assembles them into dataset
//! records with lineage. Also loads and saves dataset JSON for the CLI.

pub mod config;
pub mod dataset_io;
pub mod error;
pub mod image_file;
pub mod orchestrator;

pub use config::{AugmentConfig, DEFAULT_REPLICAS};
pub use dataset_io::{load_dataset, save_dataset};
pub use error::{IoError, JobRejection};
pub use orchestrator::{
    AugmentationReport, AugmentedRecord, ReplicaOutcome, assemble_image, generate_augmentations,
    generate_augmentations_with_report, generate_augmented_image, generic, generic_with_report,
};
