use tryon_core::error::{MediaError, ValidationError};
use tryon_core::job::{FailureKind, JobFailure};

use crate::api::TryOnApiError;

/// Every way a try-on run can end without a result.
#[derive(Debug, thiserror::Error)]
pub enum TryOnError {
    /// Bad input image or missing slot. Raised before any network call.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The selected file could not be read or decoded.
    #[error(transparent)]
    Media(MediaError),

    /// The service rejected or failed the create-task call.
    #[error("Failed to submit try-on task: {cause}")]
    Submission {
        #[source]
        cause: TryOnApiError,
    },

    /// A status query failed.
    #[error("Failed to fetch try-on task status: {message}")]
    Poll { message: String },

    /// The service finished the task without a usable result.
    #[error("Try-on task failed: {message}")]
    Remote { message: String },

    /// The session was cancelled before it finished.
    #[error("Try-on session cancelled")]
    Cancelled,
}

impl From<MediaError> for TryOnError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::Validation(v) => Self::Validation(v),
            other => Self::Media(other),
        }
    }
}

impl From<JobFailure> for TryOnError {
    fn from(failure: JobFailure) -> Self {
        match failure.kind {
            FailureKind::Poll => Self::Poll {
                message: failure.message,
            },
            FailureKind::Remote | FailureKind::MissingResult => Self::Remote {
                message: failure.message,
            },
        }
    }
}
