//! Mutation root

use async_graphql::{Context, Json, Object, Result, ResultExt, Upload};
use mdl_common::auth::Identity;
use mdl_common::db::query::ModelFilter;
use mdl_common::db::{MethodKey, ModelPatch};
use mdl_common::services::UploadRequest;
use serde_json::Value;

use super::inputs::{
    ClassificationMetricInput, LookupCreateInput, MethodCreateInput, MethodUpdateInput,
    MethodWhereUniqueInput, ModelUpdateInput, ModelWhereInput, ModelWhereUniqueInput,
    RegressionMetricInput,
};
use super::types::{service, BatchPayload, MethodObject, ModelObject};

fn identity<'a>(ctx: &Context<'a>) -> Result<&'a Identity> {
    ctx.data::<Identity>()
}

pub struct MutationRoot;

#[Object]
impl MutationRoot {
    /// Upload a model to the MDL server
    #[allow(clippy::too_many_arguments)]
    async fn upload_model(
        &self,
        ctx: &Context<'_>,
        artifact: Upload,
        keywords: Option<String>,
        property: Option<LookupCreateInput>,
        descriptor: Option<LookupCreateInput>,
        method: Option<LookupCreateInput>,
        modelset: Option<LookupCreateInput>,
        reg_metric: Option<RegressionMetricInput>,
        cls_metric: Option<ClassificationMetricInput>,
        deprecated: Option<bool>,
        succeed: Option<bool>,
        training_env: Option<Json<Value>>,
        training_info: Option<Json<Value>>,
    ) -> Result<ModelObject> {
        let upload = artifact.value(ctx)?;

        let mut request = UploadRequest::new(upload.filename, upload.content);
        request.keywords = keywords;
        request.property = property.map(Into::into);
        request.descriptor = descriptor.map(Into::into);
        request.method = method.map(Into::into);
        request.modelset = modelset.map(Into::into);
        request.reg_metric = reg_metric.map(Into::into);
        request.cls_metric = cls_metric.map(Into::into);
        request.deprecated = deprecated;
        request.succeed = succeed;
        request.training_env = training_env.map(|j| j.0);
        request.training_info = training_info.map(|j| j.0);

        let model = service(ctx)?
            .upload_model(identity(ctx)?, request)
            .await
            .extend()?;
        Ok(ModelObject(model))
    }

    async fn update_one_model(
        &self,
        ctx: &Context<'_>,
        #[graphql(name = "where")] key: ModelWhereUniqueInput,
        data: ModelUpdateInput,
    ) -> Result<ModelObject> {
        let patch: ModelPatch = data.into();
        let model = service(ctx)?
            .update_model(identity(ctx)?, key.id, &patch)
            .await
            .extend()?;
        Ok(ModelObject(model))
    }

    async fn update_many_model(
        &self,
        ctx: &Context<'_>,
        #[graphql(name = "where")] filter: Option<ModelWhereInput>,
        data: ModelUpdateInput,
    ) -> Result<BatchPayload> {
        let filter: ModelFilter = filter.map(Into::into).unwrap_or_default();
        let patch: ModelPatch = data.into();
        let count = service(ctx)?
            .update_models(identity(ctx)?, &filter, &patch)
            .await
            .extend()?;
        Ok(BatchPayload { count })
    }

    /// Delete models and their artifacts
    async fn delete_many_model(
        &self,
        ctx: &Context<'_>,
        #[graphql(name = "where")] filter: Option<ModelWhereInput>,
    ) -> Result<BatchPayload> {
        let filter: ModelFilter = filter.map(Into::into).unwrap_or_default();
        let report = service(ctx)?
            .delete_models(identity(ctx)?, &filter)
            .await
            .extend()?;
        Ok(BatchPayload {
            count: report.count,
        })
    }

    async fn create_one_method(
        &self,
        ctx: &Context<'_>,
        data: MethodCreateInput,
    ) -> Result<MethodObject> {
        let row = service(ctx)?
            .create_method(identity(ctx)?, &data.name, data.description)
            .await
            .extend()?;
        Ok(row.into())
    }

    async fn update_one_method(
        &self,
        ctx: &Context<'_>,
        #[graphql(name = "where")] key: MethodWhereUniqueInput,
        data: MethodUpdateInput,
    ) -> Result<MethodObject> {
        let key: MethodKey = key.into();
        let row = service(ctx)?
            .update_method(identity(ctx)?, &key, data.into())
            .await
            .extend()?;
        Ok(row.into())
    }

    async fn delete_one_method(
        &self,
        ctx: &Context<'_>,
        #[graphql(name = "where")] key: MethodWhereUniqueInput,
    ) -> Result<MethodObject> {
        let key: MethodKey = key.into();
        let row = service(ctx)?
            .delete_method(identity(ctx)?, &key)
            .await
            .extend()?;
        Ok(row.into())
    }
}
