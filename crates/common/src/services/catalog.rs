//! Owner-checked model updates and method mutations

use tracing::info;

use super::ModelService;
use crate::auth::{any_normal_user, signed_self, Identity};
use crate::db::models::MlModel;
use crate::db::query::ModelFilter;
use crate::db::{LookupRow, MethodKey, MethodPatch, ModelPatch, NewMethod};
use crate::errors::{AppError, Result};

impl ModelService {
    pub async fn update_model(
        &self,
        identity: &Identity,
        id: i32,
        patch: &ModelPatch,
    ) -> Result<MlModel> {
        any_normal_user(identity)?;
        let model = self
            .repo
            .find_model(id)
            .await?
            .ok_or(AppError::ModelNotFound { id })?;
        signed_self(identity, &[model.owner_id], false)?;

        self.repo.update_model(id, patch).await
    }

    /// Update all matching models; every one must belong to the caller
    pub async fn update_models(
        &self,
        identity: &Identity,
        filter: &ModelFilter,
        patch: &ModelPatch,
    ) -> Result<u64> {
        any_normal_user(identity)?;
        let owners = self.repo.model_owners(filter).await?;
        signed_self(identity, &owners, false)?;

        if patch.is_empty() {
            return Ok(0);
        }
        self.repo.update_models(filter, patch).await
    }

    pub async fn create_method(
        &self,
        identity: &Identity,
        name: &str,
        description: Option<String>,
    ) -> Result<LookupRow> {
        let ctx = any_normal_user(identity)?;

        let method = self
            .repo
            .create_method(NewMethod {
                name: name.to_string(),
                description,
                owner_id: ctx.user_id,
            })
            .await?;

        info!(method_id = method.id, owner_id = ctx.user_id, name = %method.name, "Method created");
        Ok(method)
    }

    pub async fn update_method(
        &self,
        identity: &Identity,
        key: &MethodKey,
        patch: MethodPatch,
    ) -> Result<LookupRow> {
        any_normal_user(identity)?;
        let owner = self.repo.method_owner(key).await?;
        signed_self(identity, &[owner], false)?;

        self.repo.update_method(key, patch).await
    }

    pub async fn delete_method(&self, identity: &Identity, key: &MethodKey) -> Result<LookupRow> {
        any_normal_user(identity)?;
        let owner = self.repo.method_owner(key).await?;
        let ctx = signed_self(identity, &[owner], true)?;

        let method = self.repo.delete_method(key).await?;
        info!(method_id = method.id, user_id = ctx.user_id, "Method deleted");
        Ok(method)
    }
}
