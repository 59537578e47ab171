//! Object storage abstraction.
//!
//! Provides a pluggable artifact store backed by:
//! - S3-compatible object storage (AWS S3, MinIO)
//! - Memory (tests and local development)

mod backend;
mod memory;
mod s3;

pub use backend::{ArtifactBody, ObjectStore, StorageError, StorageResult};
pub use memory::MemoryStore;
pub use s3::S3Store;

use std::sync::Arc;

use crate::config::{StorageBackendKind, StorageConfig};

/// Build the configured object store
pub async fn build(config: &StorageConfig) -> Arc<dyn ObjectStore> {
    match config.backend {
        StorageBackendKind::S3 => Arc::new(S3Store::new(config).await),
        StorageBackendKind::Memory => {
            tracing::warn!("Using in-memory object store; artifacts are lost on restart");
            match &config.endpoint {
                Some(endpoint) => Arc::new(MemoryStore::with_endpoint(&config.bucket, endpoint)),
                None => Arc::new(MemoryStore::new(&config.bucket)),
            }
        }
    }
}
