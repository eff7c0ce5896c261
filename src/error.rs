//! Error types for manifest generation and archive sealing.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Hashing and sealing errors with specific exit codes.
///
/// Every variant is fatal to the current run. Nothing is retried.
#[derive(Error, Debug)]
pub enum HashError {
    #[error("I/O failure on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Traversal failed at {}: {source}", path.display())]
    Traversal {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Archive trust seal is malformed: {reason}")]
    SealMalformed { reason: String },

    #[error("Archive has been modified since it was sealed")]
    SealMismatch,

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HashError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        HashError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn traversal(path: impl Into<PathBuf>, source: io::Error) -> Self {
        HashError::Traversal {
            path: path.into(),
            source,
        }
    }

    /// Returns the exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            HashError::Config(_) => 2,
            HashError::Io { .. } => 10,
            HashError::Traversal { .. } => 11,
            HashError::SealMalformed { .. } => 12,
            HashError::SealMismatch => 13,
            HashError::Archive(_) => 14,
            HashError::Json(_) => 15,
        }
    }
}

pub type Result<T> = std::result::Result<T, HashError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_names_path() {
        let err = HashError::io("out/hash_sum.txt", io::Error::from(io::ErrorKind::PermissionDenied));
        let message = err.to_string();
        assert!(message.contains("out/hash_sum.txt"));
        assert_eq!(err.exit_code(), 10);
    }

    #[test]
    fn test_exit_codes_are_distinct() {
        let codes = [
            HashError::Config(String::new()).exit_code(),
            HashError::io("a", io::Error::from(io::ErrorKind::Other)).exit_code(),
            HashError::traversal("a", io::Error::from(io::ErrorKind::Other)).exit_code(),
            HashError::SealMalformed { reason: String::new() }.exit_code(),
            HashError::SealMismatch.exit_code(),
        ];
        let mut sorted = codes.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), codes.len());
    }
}
