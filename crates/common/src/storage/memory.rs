//! In-memory object store.
//!
//! Used by tests and by `storage.backend = "memory"` for local development.
//! Signed URLs are not verifiable; they only carry the expiry and a
//! deterministic signature so that URL rewriting can be exercised.

use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::RwLock;
use std::time::Duration;
use tokio::io::AsyncReadExt;

use super::backend::{ArtifactBody, ObjectStore, StorageError, StorageResult};

pub struct MemoryStore {
    bucket: String,
    endpoint: String,
    objects: RwLock<BTreeMap<String, Bytes>>,
}

impl MemoryStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self::with_endpoint(bucket, "http://127.0.0.1:9000")
    }

    pub fn with_endpoint(bucket: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            objects: RwLock::new(BTreeMap::new()),
        }
    }

    /// Stored object, if any
    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.objects
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.objects.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn etag_of(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    hex::encode(&digest[..16])
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put(&self, key: &str, body: ArtifactBody) -> StorageResult<String> {
        let data = match body {
            ArtifactBody::Bytes(data) => data,
            ArtifactBody::File(mut file) => {
                let mut buf = Vec::new();
                file.read_to_end(&mut buf).await?;
                Bytes::from(buf)
            }
        };

        let etag = etag_of(&data);
        self.objects
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), data);

        Ok(etag)
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        self.objects
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
        Ok(())
    }

    async fn remove_many(&self, keys: &[String]) -> StorageResult<()> {
        let mut objects = self.objects.write().unwrap_or_else(|e| e.into_inner());
        for key in keys {
            objects.remove(key);
        }
        Ok(())
    }

    async fn presigned_get(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
        if !self.contains(key) {
            return Err(StorageError::NotFound(key.to_string()));
        }

        let signature = etag_of(format!("{}/{}:{}", self.bucket, key, expires_in.as_secs()).as_bytes());
        let mut url = url::Url::parse(&format!("{}/{}/", self.endpoint, self.bucket))
            .map_err(|e| StorageError::Other(format!("invalid endpoint: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| StorageError::Other("endpoint cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(key.split('/'));
        url.query_pairs_mut()
            .append_pair("X-Amz-Expires", &expires_in.as_secs().to_string())
            .append_pair("X-Amz-Signature", &signature);

        Ok(url.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_and_remove() {
        let store = MemoryStore::new("mdl");
        let etag = store
            .put("a/b/model-1.pkl", Bytes::from_static(b"weights").into())
            .await
            .unwrap();
        assert_eq!(etag.len(), 32);
        assert!(store.contains("a/b/model-1.pkl"));

        store.remove("a/b/model-1.pkl").await.unwrap();
        assert!(store.is_empty());
        // removing again is fine
        store.remove("a/b/model-1.pkl").await.unwrap();
    }

    #[tokio::test]
    async fn test_presigned_url_keeps_key_path() {
        let store = MemoryStore::with_endpoint("mdl", "http://minio:9000/");
        store.put("set/prop/desc/meth/m-1.pkl", b"x".to_vec().into()).await.unwrap();

        let url = store
            .presigned_get("set/prop/desc/meth/m-1.pkl", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(url.starts_with("http://minio:9000/mdl/set/prop/desc/meth/m-1.pkl?"));
        assert!(url.contains("X-Amz-Expires=60"));
    }

    #[tokio::test]
    async fn test_presign_missing_key() {
        let store = MemoryStore::new("mdl");
        let err = store.presigned_get("nope", Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }
}
