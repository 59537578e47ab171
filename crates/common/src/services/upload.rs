//! Model upload
//!
//! Preconditions are checked before anything is written. The model row,
//! its lookups, metric and an empty artifact row are created in one
//! transaction; the blob is written next and the artifact row finalized.
//! If the blob write or the finalize fails, the model row and the blob are
//! removed again (best effort, bounded retries) and the cause is returned
//! as an upload error.

use std::future::Future;
use std::time::Instant;

use backoff::{future::retry, ExponentialBackoff};
use sea_orm::prelude::Json;
use tracing::{error, info, warn};

use super::ModelService;
use crate::auth::{any_normal_user, Identity};
use crate::db::models::MlModel;
use crate::db::{ClassificationValues, MetricValues, NewModel, RegressionValues};
use crate::errors::{AppError, Result};
use crate::metrics;
use crate::naming::{artifact_key, connect_or_create, unique_suffix, NamedInput, ResolvedNames};
use crate::storage::ArtifactBody;

const MISSING_KEYWORDS_OR_PROPERTY: &str =
    "upload failed. user have to provide at least one of keywords or property";
const EXCLUSIVE_METRICS: &str = "upload failed. regMetric and clsMetric are mutually exclusive";

/// Everything the client sends with an upload
#[derive(Debug)]
pub struct UploadRequest {
    /// Client-side filename of the artifact
    pub filename: String,
    pub body: ArtifactBody,
    pub keywords: Option<String>,
    pub property: Option<NamedInput>,
    pub descriptor: Option<NamedInput>,
    pub method: Option<NamedInput>,
    pub modelset: Option<NamedInput>,
    pub reg_metric: Option<RegressionValues>,
    pub cls_metric: Option<ClassificationValues>,
    pub deprecated: Option<bool>,
    pub succeed: Option<bool>,
    pub training_env: Option<Json>,
    pub training_info: Option<Json>,
}

impl UploadRequest {
    pub fn new(filename: impl Into<String>, body: impl Into<ArtifactBody>) -> Self {
        Self {
            filename: filename.into(),
            body: body.into(),
            keywords: None,
            property: None,
            descriptor: None,
            method: None,
            modelset: None,
            reg_metric: None,
            cls_metric: None,
            deprecated: None,
            succeed: None,
            training_env: None,
            training_info: None,
        }
    }

    fn prepare(self, owner_id: i32) -> Result<PreparedUpload> {
        let keywords = self
            .keywords
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());

        let names = ResolvedNames {
            property: connect_or_create(self.property.as_ref(), owner_id),
            descriptor: connect_or_create(self.descriptor.as_ref(), owner_id),
            method: connect_or_create(self.method.as_ref(), owner_id),
            modelset: connect_or_create(self.modelset.as_ref(), owner_id),
        };

        if keywords.is_none() && names.property.is_none() {
            return Err(AppError::Validation {
                message: MISSING_KEYWORDS_OR_PROPERTY.to_string(),
                field: Some("keywords".to_string()),
            });
        }

        // both payloads present is rejected even when one carries no values
        if self.reg_metric.is_some() && self.cls_metric.is_some() {
            return Err(AppError::Validation {
                message: EXCLUSIVE_METRICS.to_string(),
                field: Some("regMetric".to_string()),
            });
        }

        let metric = match (self.reg_metric, self.cls_metric) {
            (Some(reg), _) if reg.is_set() => Some(MetricValues::Regression(reg)),
            (_, Some(cls)) if cls.is_set() => Some(MetricValues::Classification(cls)),
            _ => None,
        };

        Ok(PreparedUpload {
            model: NewModel {
                owner_id,
                keywords,
                deprecated: self.deprecated.unwrap_or(false),
                succeed: self.succeed.unwrap_or(true),
                training_env: self.training_env,
                training_info: self.training_info,
                metric,
            },
            names,
            filename: self.filename,
            body: self.body,
        })
    }
}

struct PreparedUpload {
    model: NewModel,
    names: ResolvedNames,
    filename: String,
    body: ArtifactBody,
}

impl ModelService {
    /// Upload a model artifact with its metadata
    pub async fn upload_model(&self, identity: &Identity, request: UploadRequest) -> Result<MlModel> {
        let ctx = any_normal_user(identity)?;
        let started = Instant::now();

        let prepared = request.prepare(ctx.user_id)?;
        let model = self.repo.create_model(prepared.model, &prepared.names).await?;

        let key = artifact_key(&prepared.names, &prepared.filename, &unique_suffix());
        info!(
            model_id = model.id,
            owner_id = ctx.user_id,
            bucket = %self.store.bucket(),
            key = %key,
            "Uploading artifact"
        );

        match self
            .store_artifact(model.id, &key, prepared.filename, prepared.body)
            .await
        {
            Ok(()) => {
                metrics::record_upload(started.elapsed().as_secs_f64(), true);
                info!(model_id = model.id, key = %key, "Model uploaded");
                Ok(model)
            }
            Err(cause) => {
                error!(model_id = model.id, key = %key, error = %cause, "Artifact upload failed");
                self.compensate(model.id, &key).await;
                metrics::record_upload(started.elapsed().as_secs_f64(), false);

                Err(AppError::Upload {
                    message: cause.to_string(),
                })
            }
        }
    }

    async fn store_artifact(
        &self,
        model_id: i32,
        key: &str,
        filename: String,
        body: ArtifactBody,
    ) -> Result<()> {
        let etag = self.store.put(key, body).await?;
        self.repo
            .finalize_artifact(model_id, etag, key.to_string(), filename)
            .await?;
        Ok(())
    }

    /// Undo a failed upload: drop the model row, then the blob.
    ///
    /// Each step is retried within the cleanup budget and never fails the
    /// caller; what is left behind is logged for audit.
    async fn compensate(&self, model_id: i32, key: &str) {
        let row = self
            .retry_cleanup(|| async { self.repo.delete_model(model_id).await.map(|_| ()) })
            .await;
        metrics::record_compensation("row", row.is_ok());
        if let Err(e) = &row {
            error!(model_id, error = %e, "Could not delete model row of failed upload");
        }

        let blob = self
            .retry_cleanup(|| async { self.store.remove(key).await.map_err(AppError::from) })
            .await;
        metrics::record_compensation("blob", blob.is_ok());
        if let Err(e) = &blob {
            error!(
                model_id,
                bucket = %self.store.bucket(),
                key = %key,
                error = %e,
                "Could not remove blob of failed upload; object is orphaned"
            );
        }
    }

    async fn retry_cleanup<F, Fut>(&self, mut op: F) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let policy = ExponentialBackoff {
            initial_interval: std::time::Duration::from_millis(50),
            max_elapsed_time: Some(self.cleanup_budget),
            ..Default::default()
        };

        retry(policy, || {
            let attempt = op();
            async move {
                attempt.await.map_err(|e| {
                    warn!(error = %e, "Cleanup attempt failed");
                    backoff::Error::transient(e)
                })
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Role;
    use crate::db::query::{ModelFilter, Page};
    use crate::db::LookupRow;
    use crate::naming::LookupKind;
    use crate::services::testing;
    use crate::storage::{MemoryStore, ObjectStore, StorageError, StorageResult};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;

    /// Writes the object, then reports failure, like a dropped connection
    /// after the server stored the data.
    struct WriteThenFailStore {
        inner: MemoryStore,
    }

    #[async_trait]
    impl ObjectStore for WriteThenFailStore {
        fn bucket(&self) -> &str {
            self.inner.bucket()
        }

        async fn put(&self, key: &str, body: ArtifactBody) -> StorageResult<String> {
            self.inner.put(key, body).await?;
            Err(StorageError::Other("connection reset".to_string()))
        }

        async fn remove(&self, key: &str) -> StorageResult<()> {
            self.inner.remove(key).await
        }

        async fn remove_many(&self, keys: &[String]) -> StorageResult<()> {
            self.inner.remove_many(keys).await
        }

        async fn presigned_get(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
            self.inner.presigned_get(key, expires_in).await
        }
    }

    fn request() -> UploadRequest {
        let mut request = UploadRequest::new("model.pkl", b"weights".to_vec());
        request.property = Some(NamedInput::new("Band Gap"));
        request.method = Some(NamedInput::new("Random Forest"));
        request
    }

    async fn all_models(service: &ModelService) -> Vec<MlModel> {
        service
            .repo()
            .find_models(&ModelFilter::default(), &[], Page::default())
            .await
            .unwrap()
    }

    async fn methods(service: &ModelService) -> Vec<LookupRow> {
        service
            .repo()
            .list_lookups(LookupKind::Method, &Default::default(), &[], Page::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_upload_success() {
        let (service, store) = testing::service().await;
        let user = testing::user(&service, "alice", Role::User).await;
        let identity = Identity::user(user.id, Role::User);

        let model = service.upload_model(&identity, request()).await.unwrap();
        assert_eq!(model.owner_id, user.id);
        assert!(!model.deprecated);
        assert!(model.succeed);

        let artifact = service.repo().find_artifact(model.id).await.unwrap().unwrap();
        assert!(artifact.path.starts_with(
            "unknown.modelset/band gap/unknown.descriptor/random forest/model-"
        ));
        assert!(artifact.path.ends_with(".pkl"));
        assert_eq!(artifact.filename, "model.pkl");
        assert!(!artifact.etag.is_empty());
        assert_eq!(store.get(&artifact.path).unwrap().as_ref(), b"weights");
    }

    #[tokio::test]
    async fn test_upload_requires_sign_in() {
        let (service, store) = testing::service().await;

        let result = service.upload_model(&Identity::anonymous(), request()).await;
        assert!(matches!(result, Err(AppError::Unauthorized { .. })));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_upload_without_keywords_or_property_writes_nothing() {
        let (service, store) = testing::service().await;
        let user = testing::user(&service, "alice", Role::User).await;
        let identity = Identity::user(user.id, Role::User);

        let mut req = UploadRequest::new("model.pkl", b"weights".to_vec());
        req.method = Some(NamedInput::new("svr"));
        req.keywords = Some("   ".to_string());

        match service.upload_model(&identity, req).await {
            Err(AppError::Validation { message, .. }) => {
                assert_eq!(message, MISSING_KEYWORDS_OR_PROPERTY)
            }
            other => panic!("expected validation error, got {:?}", other),
        }
        assert!(all_models(&service).await.is_empty());
        assert!(methods(&service).await.is_empty());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_upload_with_both_metrics_writes_nothing() {
        let (service, store) = testing::service().await;
        let user = testing::user(&service, "alice", Role::User).await;
        let identity = Identity::user(user.id, Role::User);

        let mut req = request();
        req.reg_metric = Some(RegressionValues {
            mae: Some(0.1),
            ..Default::default()
        });
        req.cls_metric = Some(ClassificationValues {
            accuracy: Some(0.9),
            ..Default::default()
        });

        match service.upload_model(&identity, req).await {
            Err(AppError::Validation { message, .. }) => assert_eq!(message, EXCLUSIVE_METRICS),
            other => panic!("expected validation error, got {:?}", other),
        }
        assert!(all_models(&service).await.is_empty());
        assert!(methods(&service).await.is_empty());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_both_metrics_rejected_even_when_one_is_empty() {
        let (service, store) = testing::service().await;
        let user = testing::user(&service, "alice", Role::User).await;
        let identity = Identity::user(user.id, Role::User);

        let mut req = request();
        req.reg_metric = Some(RegressionValues::default());
        req.cls_metric = Some(ClassificationValues {
            f1: Some(0.7),
            ..Default::default()
        });

        match service.upload_model(&identity, req).await {
            Err(AppError::Validation { message, .. }) => assert_eq!(message, EXCLUSIVE_METRICS),
            other => panic!("expected validation error, got {:?}", other),
        }
        assert!(all_models(&service).await.is_empty());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_empty_metric_creates_no_metric_row() {
        let (service, _store) = testing::service().await;
        let user = testing::user(&service, "alice", Role::User).await;
        let identity = Identity::user(user.id, Role::User);

        let mut req = request();
        req.cls_metric = Some(ClassificationValues::default());

        let model = service.upload_model(&identity, req).await.unwrap();
        let metric = service.repo().find_metric(model.id).await.unwrap();
        assert!(metric.is_none());
    }

    #[tokio::test]
    async fn test_upload_for_unknown_owner_is_store_error() {
        let (service, store) = testing::service().await;
        let identity = Identity::user(999, Role::User);

        let mut req = UploadRequest::new("model.pkl", b"weights".to_vec());
        req.keywords = Some("orphan".to_string());

        let err = service.upload_model(&identity, req).await.unwrap_err();
        assert_eq!(err.code(), crate::errors::ErrorCode::DatabaseError);
        assert!(all_models(&service).await.is_empty());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_failed_blob_write_compensates() {
        let store = Arc::new(WriteThenFailStore {
            inner: MemoryStore::new("mdl"),
        });
        let service = testing::service_with(store.clone(), &testing::config()).await;
        let user = testing::user(&service, "alice", Role::User).await;
        let identity = Identity::user(user.id, Role::User);

        match service.upload_model(&identity, request()).await {
            Err(AppError::Upload { message }) => assert!(message.contains("connection reset")),
            other => panic!("expected upload error, got {:?}", other),
        }

        assert!(all_models(&service).await.is_empty());
        assert!(store.inner.is_empty());
    }

    #[tokio::test]
    async fn test_upload_error_message() {
        let err = AppError::Upload {
            message: "connection reset".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Error occurred in artifact uploading: connection reset"
        );
    }

    #[tokio::test]
    async fn test_concurrent_uploads_share_new_method() {
        let (service, store) = testing::service().await;
        let user = testing::user(&service, "alice", Role::User).await;
        let identity = Identity::user(user.id, Role::User);

        let mut a = request();
        a.method = Some(NamedInput::new("Graph Network"));
        let mut b = request();
        b.method = Some(NamedInput::new("graph   network"));

        let (a, b) = tokio::join!(
            service.upload_model(&identity, a),
            service.upload_model(&identity, b)
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        let methods = methods(&service).await;
        assert_eq!(methods.len(), 1);
        assert_eq!(methods[0].name, "graph network");
        assert_eq!(a.method_id, Some(methods[0].id));
        assert_eq!(b.method_id, Some(methods[0].id));

        // same filename, distinct keys
        assert_eq!(store.len(), 2);
    }
}
