//! Object store trait definition.
//!
//! Artifacts live in a single bucket; keys are the derived storage paths
//! (`{modelset}/{property}/{descriptor}/{method}/{stem}-{suffix}{ext}`).

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Storage error types
#[derive(Debug, Error)]
pub enum StorageError {
    /// Object not found
    #[error("Object not found: {0}")]
    NotFound(String),
    /// IO error while reading the upload body
    #[error("IO error: {0}")]
    Io(#[source] std::io::Error),
    /// Some keys of a bulk removal could not be deleted
    #[error("Failed to remove {} object(s): {}", failed.len(), failed.join(", "))]
    Partial { failed: Vec<String> },
    /// Other error (SDK, network, signing)
    #[error("{0}")]
    Other(String),
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            StorageError::NotFound(e.to_string())
        } else {
            StorageError::Io(e)
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Upload body handed to [`ObjectStore::put`].
///
/// Multipart uploads arrive spooled to a temporary file; the file variant is
/// streamed to the backend rather than read into memory.
pub enum ArtifactBody {
    Bytes(Bytes),
    File(tokio::fs::File),
}

impl From<Bytes> for ArtifactBody {
    fn from(data: Bytes) -> Self {
        ArtifactBody::Bytes(data)
    }
}

impl From<Vec<u8>> for ArtifactBody {
    fn from(data: Vec<u8>) -> Self {
        ArtifactBody::Bytes(Bytes::from(data))
    }
}

impl From<std::fs::File> for ArtifactBody {
    fn from(file: std::fs::File) -> Self {
        ArtifactBody::File(tokio::fs::File::from_std(file))
    }
}

impl fmt::Debug for ArtifactBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactBody::Bytes(b) => write!(f, "ArtifactBody::Bytes({} bytes)", b.len()),
            ArtifactBody::File(_) => write!(f, "ArtifactBody::File"),
        }
    }
}

/// Blob storage used for model artifacts.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Bucket this store writes to
    fn bucket(&self) -> &str;

    /// Write an object, returning its content etag
    async fn put(&self, key: &str, body: ArtifactBody) -> StorageResult<String>;

    /// Remove a single object. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> StorageResult<()>;

    /// Remove many objects; reports the keys that could not be removed
    async fn remove_many(&self, keys: &[String]) -> StorageResult<()>;

    /// Time-limited signed retrieval URL
    async fn presigned_get(&self, key: &str, expires_in: Duration) -> StorageResult<String>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;
    use std::io;

    #[test]
    fn test_io_not_found_becomes_not_found() {
        let err: StorageError = io::Error::new(io::ErrorKind::NotFound, "model.pkl").into();
        assert!(matches!(err, StorageError::NotFound(_)));
        assert_eq!(err.to_string(), "Object not found: model.pkl");

        let err: StorageError = io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed").into();
        assert!(matches!(err, StorageError::Io(_)));
        assert_eq!(err.to_string(), "IO error: pipe closed");
        assert!(err.source().is_some());
    }

    #[test]
    fn test_partial_removal_lists_keys() {
        let err = StorageError::Partial {
            failed: vec!["a/b.pkl".to_string(), "c/d.pkl".to_string()],
        };
        assert_eq!(err.to_string(), "Failed to remove 2 object(s): a/b.pkl, c/d.pkl");
    }
}
