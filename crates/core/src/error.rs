use crate::job::JobStatus;
use crate::types::MediaRole;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid job transition: {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },
}

/// Rejections raised before anything is sent to the remote service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Unsupported format '{mime_type}': only image/jpeg and image/png are accepted")]
    UnsupportedFormat { mime_type: String },

    #[error("File too large: {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: u64, limit: u64 },

    #[error("Invalid resolution {width}x{height}: both sides must be within {min}..={max}px")]
    InvalidResolution {
        width: u32,
        height: u32,
        min: u32,
        max: u32,
    },

    #[error("Could not read image header: {0}")]
    UnreadableImage(String),

    #[error("Missing {0} image")]
    MissingPayload(MediaRole),

    #[error("Payload encoded for the {actual} slot was supplied as the {expected} image")]
    RoleMismatch {
        expected: MediaRole,
        actual: MediaRole,
    },
}

/// Errors from loading and encoding a media file.
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Image decode task failed: {0}")]
    Decode(String),
}
