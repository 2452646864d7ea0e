//! Error types of the I/O layer.

use std::path::PathBuf;

use polyaug_pipeline::Rejection;

/// Why a single (image, replica) job produced no record.
///
/// Every variant is absorbed at the job boundary and only counted; none
/// of them aborts the batch.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum JobRejection {
    /// The recovery stages rejected the replica.
    #[error(transparent)]
    Pipeline(#[from] Rejection),

    /// The source image is missing or could not be decoded.
    #[error("failed to read image {path:?}: {message}")]
    ImageReadFailure {
        /// Source image path.
        path: PathBuf,
        /// Underlying error message.
        message: String,
    },

    /// The augmented image could not be encoded or written.
    #[error("failed to write image {path:?}: {message}")]
    ImageWriteFailure {
        /// Target image path.
        path: PathBuf,
        /// Underlying error message.
        message: String,
    },

    /// The job panicked; the payload message is kept when it is a string.
    #[error("augmentation job panicked: {0}")]
    JobPanicked(String),
}

impl JobRejection {
    /// Short stable name of the rejection reason, used as a report key.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Pipeline(rejection) => rejection.kind(),
            Self::ImageReadFailure { .. } => "image_read_failure",
            Self::ImageWriteFailure { .. } => "image_write_failure",
            Self::JobPanicked(_) => "job_panicked",
        }
    }
}

/// Batch-level faults. These are the only errors that reach the caller.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// The run output directory could not be created.
    #[error("failed to create output directory {path:?}: {source}")]
    OutputDirectory {
        /// Directory that was being created.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The worker pool could not be started.
    #[error("failed to build worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    /// A dataset file could not be read or written.
    #[error("dataset file {path:?}: {source}")]
    DatasetFile {
        /// Dataset file path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A dataset file is not valid dataset JSON.
    #[error("dataset JSON {path:?}: {source}")]
    DatasetJson {
        /// Dataset file path.
        path: PathBuf,
        /// Underlying serde error.
        source: serde_json::Error,
    },
}
