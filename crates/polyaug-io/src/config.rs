//! Orchestrator configuration.

use std::path::PathBuf;

use polyaug_pipeline::{PipelineConfig, RecoveryConfig, TransformConfig};
use serde::{Deserialize, Serialize};

/// Number of replicas generated per image when the caller does not say.
pub const DEFAULT_REPLICAS: usize = 3;

/// Name of the directory under the system temp dir that holds run
/// directories.
pub const OUTPUT_DIR_NAME: &str = "tmp_images_augmented";

/// Everything a batch of augmentations needs, passed explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentConfig {
    /// Transform composition.
    pub transform: TransformConfig,
    /// Contour recovery and validation parameters.
    pub recovery: RecoveryConfig,
    /// Parent of the run directories. Each batch writes into a fresh
    /// `<output_root>/<uuid>` directory.
    pub output_root: PathBuf,
    /// Worker pool size. `None` uses the machine's available parallelism.
    pub workers: Option<usize>,
    /// Base seed. `None` seeds every job from OS entropy.
    pub seed: Option<u64>,
}

impl Default for AugmentConfig {
    fn default() -> Self {
        Self {
            transform: TransformConfig::default(),
            recovery: RecoveryConfig::default(),
            output_root: std::env::temp_dir().join(OUTPUT_DIR_NAME),
            workers: None,
            seed: None,
        }
    }
}

impl AugmentConfig {
    /// The in-memory pipeline part of the configuration.
    #[must_use]
    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            transform: self.transform.clone(),
            recovery: self.recovery.clone(),
        }
    }

    /// Effective worker count: the configured value, else available
    /// parallelism, never less than one.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers
            .unwrap_or_else(|| std::thread::available_parallelism().map_or(1, usize::from))
            .max(1)
    }

    /// Seed for job `(image_index, replica_index)`, derived from the base
    /// seed so that every job draws an independent, reproducible stream.
    #[must_use]
    pub fn job_seed(&self, image_index: usize, replica_index: usize) -> Option<u64> {
        self.seed.map(|seed| {
            let mut z = seed
                ^ (image_index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
                ^ (replica_index as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F);
            // splitmix64 finalizer
            z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
            z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
            z ^ (z >> 31)
        })
    }
}
