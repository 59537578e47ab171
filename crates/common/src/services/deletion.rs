//! Bulk model deletion
//!
//! Blobs are removed first; whatever happens there, the matched rows are
//! deleted afterwards. A failed blob removal is logged and reported, never
//! raised.

use serde::Serialize;
use tracing::{error, info};

use super::ModelService;
use crate::auth::{signed_self, Identity};
use crate::db::query::ModelFilter;
use crate::errors::Result;
use crate::metrics;
use crate::storage::StorageError;

/// Outcome of a bulk delete
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeletionReport {
    /// Model rows deleted
    pub count: u64,
    /// Keys whose blobs may still exist
    pub orphaned_keys: Vec<String>,
}

impl ModelService {
    /// Delete every model matching `filter`, owners only (admins may
    /// delete anything)
    pub async fn delete_models(
        &self,
        identity: &Identity,
        filter: &ModelFilter,
    ) -> Result<DeletionReport> {
        let rows = self.repo.find_models_with_artifacts(filter).await?;

        let owners: Vec<i32> = rows.iter().map(|(model, _)| model.owner_id).collect();
        let ctx = signed_self(identity, &owners, true)?;

        if rows.is_empty() {
            return Ok(DeletionReport::default());
        }

        let ids: Vec<i32> = rows.iter().map(|(model, _)| model.id).collect();
        let keys: Vec<String> = rows
            .into_iter()
            .filter_map(|(_, artifact)| artifact)
            .filter(|artifact| artifact.is_complete())
            .map(|artifact| artifact.path)
            .collect();

        let orphaned_keys = self.remove_blobs(&keys).await;

        let count = self.repo.delete_models(&ids).await?;
        metrics::record_deletion(count, orphaned_keys.len());
        info!(
            user_id = ctx.user_id,
            count,
            blobs = keys.len(),
            orphaned = orphaned_keys.len(),
            "Models deleted"
        );

        Ok(DeletionReport {
            count,
            orphaned_keys,
        })
    }

    /// Remove blobs, returning the keys that could not be removed
    async fn remove_blobs(&self, keys: &[String]) -> Vec<String> {
        if keys.is_empty() {
            return Vec::new();
        }

        match self.store.remove_many(keys).await {
            Ok(()) => Vec::new(),
            Err(StorageError::Partial { failed }) => {
                for key in &failed {
                    error!(bucket = %self.store.bucket(), key = %key, "Blob removal failed");
                }
                failed
            }
            Err(e) => {
                error!(
                    bucket = %self.store.bucket(),
                    count = keys.len(),
                    error = %e,
                    "Bulk blob removal failed"
                );
                keys.to_vec()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Role;
    use crate::errors::AppError;
    use crate::naming::NamedInput;
    use crate::services::{testing, UploadRequest};
    use crate::storage::{ArtifactBody, MemoryStore, ObjectStore, StorageResult};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;

    /// Stores objects but refuses to delete them
    struct NoDeleteStore {
        inner: MemoryStore,
    }

    #[async_trait]
    impl ObjectStore for NoDeleteStore {
        fn bucket(&self) -> &str {
            self.inner.bucket()
        }

        async fn put(&self, key: &str, body: ArtifactBody) -> StorageResult<String> {
            self.inner.put(key, body).await
        }

        async fn remove(&self, _key: &str) -> StorageResult<()> {
            Err(StorageError::Other("access denied".to_string()))
        }

        async fn remove_many(&self, _keys: &[String]) -> StorageResult<()> {
            Err(StorageError::Other("access denied".to_string()))
        }

        async fn presigned_get(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
            self.inner.presigned_get(key, expires_in).await
        }
    }

    fn request(keywords: &str) -> UploadRequest {
        let mut request = UploadRequest::new("model.pkl", b"weights".to_vec());
        request.keywords = Some(keywords.to_string());
        request.method = Some(NamedInput::new("krr"));
        request
    }

    #[tokio::test]
    async fn test_delete_removes_rows_and_blobs() {
        let (service, store) = testing::service().await;
        let user = testing::user(&service, "alice", Role::User).await;
        let identity = Identity::user(user.id, Role::User);

        let a = service.upload_model(&identity, request("a")).await.unwrap();
        let b = service.upload_model(&identity, request("b")).await.unwrap();
        assert_eq!(store.len(), 2);

        let report = service
            .delete_models(&identity, &ModelFilter::ids(vec![a.id]))
            .await
            .unwrap();
        assert_eq!(report.count, 1);
        assert!(report.orphaned_keys.is_empty());
        assert_eq!(store.len(), 1);
        assert!(service.repo().find_model(a.id).await.unwrap().is_none());
        assert!(service.repo().find_model(b.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_blob_failure_does_not_block_row_deletion() {
        let store = Arc::new(NoDeleteStore {
            inner: MemoryStore::new("mdl"),
        });
        let service = testing::service_with(store.clone(), &testing::config()).await;
        let user = testing::user(&service, "alice", Role::User).await;
        let identity = Identity::user(user.id, Role::User);

        let model = service.upload_model(&identity, request("a")).await.unwrap();
        let path = service
            .repo()
            .find_artifact(model.id)
            .await
            .unwrap()
            .unwrap()
            .path;

        let report = service
            .delete_models(&identity, &ModelFilter::ids(vec![model.id]))
            .await
            .unwrap();

        assert_eq!(report.count, 1);
        assert_eq!(report.orphaned_keys, vec![path.clone()]);
        assert!(service.repo().find_model(model.id).await.unwrap().is_none());
        assert!(store.inner.contains(&path));
    }

    #[tokio::test]
    async fn test_delete_requires_owner_or_admin() {
        let (service, store) = testing::service().await;
        let alice = testing::user(&service, "alice", Role::User).await;
        let bob = testing::user(&service, "bob", Role::User).await;
        let admin = testing::user(&service, "root", Role::Admin).await;

        let model = service
            .upload_model(&Identity::user(alice.id, Role::User), request("a"))
            .await
            .unwrap();
        let filter = ModelFilter::ids(vec![model.id]);

        let denied = service
            .delete_models(&Identity::user(bob.id, Role::User), &filter)
            .await;
        assert!(matches!(denied, Err(AppError::Forbidden { .. })));
        assert_eq!(store.len(), 1);

        let report = service
            .delete_models(&Identity::user(admin.id, Role::Admin), &filter)
            .await
            .unwrap();
        assert_eq!(report.count, 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_delete_nothing_matched() {
        let (service, _store) = testing::service().await;
        let user = testing::user(&service, "alice", Role::User).await;

        let report = service
            .delete_models(
                &Identity::user(user.id, Role::User),
                &ModelFilter::ids(vec![404]),
            )
            .await
            .unwrap();
        assert_eq!(report, DeletionReport::default());
    }
}
