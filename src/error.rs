// Error types. `UploadError` is what the storage layer returns; the
// wrapper turns it into a printed message plus a bool/None sentinel.
// `AppError` covers the orchestrator failures that end the process.

use std::fmt;
use std::io;

use thiserror::Error;

/// Everything that can go wrong while talking to the bucket.
#[derive(Debug, Error)]
pub enum UploadError {
    /// Bad local input, detected before any request is made.
    #[error("{0}")]
    Validation(String),

    #[error("AWS credentials not found: {0}")]
    Credentials(String),

    #[error("Bucket '{0}' does not exist")]
    BucketNotFound(String),

    #[error("Access denied to bucket '{0}'")]
    AccessDenied(String),

    #[error("{code}: {message}")]
    Service { code: String, message: String },

    /// The user interrupted a transfer.
    #[error("Upload cancelled")]
    Cancelled,

    #[error("Unexpected error: {0}")]
    Unknown(String),
}

/// Coarse grouping used when reporting errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Credentials,
    Service,
    Unknown,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Validation => "invalid input",
            ErrorKind::Credentials => "credentials",
            ErrorKind::Service => "service error",
            ErrorKind::Unknown => "unexpected error",
        };
        f.write_str(s)
    }
}

impl UploadError {
    pub fn validation(msg: impl Into<String>) -> Self {
        UploadError::Validation(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            UploadError::Validation(_) => ErrorKind::Validation,
            UploadError::Credentials(_) => ErrorKind::Credentials,
            UploadError::BucketNotFound(_)
            | UploadError::AccessDenied(_)
            | UploadError::Service { .. } => ErrorKind::Service,
            UploadError::Cancelled | UploadError::Unknown(_) => ErrorKind::Unknown,
        }
    }

    /// A remediation line to print under the error, if there is one.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            UploadError::Credentials(_) => Some("Please configure your AWS credentials."),
            UploadError::AccessDenied(_) => {
                Some("Check that your IAM policy allows access to this bucket.")
            }
            _ => None,
        }
    }
}

/// Failures that stop the interactive session.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Bucket name is required")]
    MissingBucket,

    #[error("Cannot access S3 bucket '{0}'")]
    Connection(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Prompts read keys in raw mode and report Ctrl-C as an `Interrupted`
/// I/O error somewhere in the chain.
pub fn is_interrupt(e: &anyhow::Error) -> bool {
    e.chain().any(|cause| {
        cause
            .downcast_ref::<io::Error>()
            .is_some_and(|io| io.kind() == io::ErrorKind::Interrupted)
    })
}
