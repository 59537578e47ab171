//! S3-compatible object store.
//!
//! Works against AWS S3 and MinIO (path-style addressing, custom endpoint).

use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Builder, Credentials, Region},
    presigning::PresigningConfig,
    primitives::ByteStream,
    types::{Delete, ObjectIdentifier},
    Client,
};
use std::time::Duration;
use tracing::debug;

use super::backend::{ArtifactBody, ObjectStore, StorageError, StorageResult};
use crate::config::StorageConfig;

/// S3 caps DeleteObjects at 1000 keys per request
const DELETE_BATCH: usize = 1000;

pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    /// Build a client from storage configuration.
    ///
    /// Static credentials win over the AWS default provider chain.
    pub async fn new(config: &StorageConfig) -> Self {
        let mut builder = Builder::new()
            .region(Region::new(config.region.clone()))
            .force_path_style(config.force_path_style);

        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        match (&config.access_key, &config.secret_key) {
            (Some(access), Some(secret)) => {
                let creds = Credentials::new(access, secret, None, None, "static");
                builder = builder.credentials_provider(creds);
            }
            _ => {
                let sdk_config = aws_config::load_from_env().await;
                if let Some(creds) = sdk_config.credentials_provider() {
                    builder = builder.credentials_provider(creds);
                }
            }
        }

        Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put(&self, key: &str, body: ArtifactBody) -> StorageResult<String> {
        let stream = match body {
            ArtifactBody::Bytes(data) => ByteStream::from(data),
            ArtifactBody::File(file) => ByteStream::read_from()
                .file(file)
                .build()
                .await
                .map_err(|e| StorageError::Other(e.to_string()))?,
        };

        let output = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(stream)
            .send()
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?;

        let etag = output
            .e_tag()
            .map(|t| t.trim_matches('"').to_string())
            .unwrap_or_default();
        debug!(bucket = %self.bucket, key, etag = %etag, "Object written");

        Ok(etag)
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?;

        Ok(())
    }

    async fn remove_many(&self, keys: &[String]) -> StorageResult<()> {
        let mut failed = Vec::new();

        for batch in keys.chunks(DELETE_BATCH) {
            let objects = batch
                .iter()
                .map(|k| ObjectIdentifier::builder().key(k).build())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| StorageError::Other(e.to_string()))?;

            let delete = Delete::builder()
                .set_objects(Some(objects))
                .quiet(true)
                .build()
                .map_err(|e| StorageError::Other(e.to_string()))?;

            match self
                .client
                .delete_objects()
                .bucket(&self.bucket)
                .delete(delete)
                .send()
                .await
            {
                Ok(output) => {
                    failed.extend(output.errors().iter().filter_map(|e| e.key().map(String::from)));
                }
                Err(e) => {
                    debug!(error = %e, count = batch.len(), "Bulk delete request failed");
                    failed.extend(batch.iter().cloned());
                }
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(StorageError::Partial { failed })
        }
    }

    async fn presigned_get(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
        let presigning = PresigningConfig::expires_in(expires_in)
            .map_err(|e| StorageError::Other(e.to_string()))?;

        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?;

        Ok(request.uri().to_string())
    }
}
