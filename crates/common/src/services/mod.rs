//! Model repository services
//!
//! Orchestration across the relational store and the object store:
//! - `upload`: validate, create placeholder rows, stream the artifact,
//!   finalize or compensate
//! - `deletion`: bulk delete where blob cleanup never blocks row deletion
//! - `download`: download counters and signed retrieval links
//! - `catalog`: owner-checked model updates and method mutations

mod catalog;
mod deletion;
mod download;
mod upload;

pub use deletion::DeletionReport;
pub use download::ModelUrl;
pub use upload::UploadRequest;

use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::config::AppConfig;
use crate::db::Repository;
use crate::errors::{AppError, Result};
use crate::storage::ObjectStore;

/// Entry point for everything that touches both stores
#[derive(Clone)]
pub struct ModelService {
    repo: Repository,
    store: Arc<dyn ObjectStore>,
    presign_ttl: Duration,
    cleanup_budget: Duration,
    /// Public origin for signed links; set in production only
    public_base_url: Option<Url>,
}

impl ModelService {
    pub fn new(repo: Repository, store: Arc<dyn ObjectStore>, config: &AppConfig) -> Result<Self> {
        let public_base_url = if config.is_production() {
            let url = Url::parse(&config.storage.public_base_url).map_err(|e| {
                AppError::Configuration {
                    message: format!(
                        "invalid public base url '{}': {}",
                        config.storage.public_base_url, e
                    ),
                }
            })?;
            Some(url)
        } else {
            None
        };

        Ok(Self {
            repo,
            store,
            presign_ttl: config.storage.presign_ttl(),
            cleanup_budget: config.storage.cleanup_budget(),
            public_base_url,
        })
    }

    pub fn repo(&self) -> &Repository {
        &self.repo
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Shared fixtures for service tests

    use super::*;
    use crate::db::models::{Role, User};
    use crate::db::DbPool;
    use crate::storage::MemoryStore;

    pub fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.storage.cleanup_budget_secs = 1;
        config
    }

    pub async fn service_with(store: Arc<dyn ObjectStore>, config: &AppConfig) -> ModelService {
        let repo = Repository::new(DbPool::sqlite_memory().await.unwrap());
        ModelService::new(repo, store, config).unwrap()
    }

    pub async fn service() -> (ModelService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new("mdl"));
        let service = service_with(store.clone(), &config()).await;
        (service, store)
    }

    pub async fn user(service: &ModelService, name: &str, role: Role) -> User {
        service.repo().create_user(name, None, role).await.unwrap()
    }
}
