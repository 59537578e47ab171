//! Query root

use async_graphql::{Context, Object, Result, ResultExt};
use mdl_common::auth::Identity;
use mdl_common::db::query::{LookupFilter, ModelFilter, Page};
use mdl_common::db::MethodKey;
use mdl_common::naming::LookupKind;

use super::inputs::{
    into_lookup_orders, into_model_orders, LookupOrderByInput, LookupWhereInput,
    MethodWhereUniqueInput, ModelOrderByInput, ModelWhereInput,
};
use super::types::{
    service, DescriptorObject, MethodObject, ModelObject, ModelUrlObject, ModelsetObject,
    PropertyObject, UserObject,
};

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    async fn model(&self, ctx: &Context<'_>, id: i32) -> Result<Option<ModelObject>> {
        let model = service(ctx)?.repo().find_model(id).await.extend()?;
        Ok(model.map(ModelObject))
    }

    async fn models(
        &self,
        ctx: &Context<'_>,
        #[graphql(name = "where")] filter: Option<ModelWhereInput>,
        order_by: Option<Vec<ModelOrderByInput>>,
        skip: Option<u64>,
        take: Option<u64>,
    ) -> Result<Vec<ModelObject>> {
        let filter: ModelFilter = filter.map(Into::into).unwrap_or_default();
        let orders = into_model_orders(order_by);

        let models = service(ctx)?
            .repo()
            .find_models(&filter, &orders, Page::new(skip, take))
            .await
            .extend()?;
        Ok(models.into_iter().map(ModelObject).collect())
    }

    /// Number of models matching the filter
    async fn models_count(
        &self,
        ctx: &Context<'_>,
        #[graphql(name = "where")] filter: Option<ModelWhereInput>,
    ) -> Result<u64> {
        let filter: ModelFilter = filter.map(Into::into).unwrap_or_default();
        service(ctx)?.repo().count_models(&filter).await.extend()
    }

    async fn method(
        &self,
        ctx: &Context<'_>,
        #[graphql(name = "where")] key: MethodWhereUniqueInput,
    ) -> Result<Option<MethodObject>> {
        let key: MethodKey = key.into();
        let row = service(ctx)?
            .repo()
            .find_lookup(LookupKind::Method, &key)
            .await
            .extend()?;
        Ok(row.map(MethodObject::from))
    }

    async fn methods(
        &self,
        ctx: &Context<'_>,
        #[graphql(name = "where")] filter: Option<LookupWhereInput>,
        order_by: Option<Vec<LookupOrderByInput>>,
        skip: Option<u64>,
        take: Option<u64>,
    ) -> Result<Vec<MethodObject>> {
        let filter: LookupFilter = filter.map(Into::into).unwrap_or_default();
        let rows = service(ctx)?
            .repo()
            .list_lookups(
                LookupKind::Method,
                &filter,
                &into_lookup_orders(order_by),
                Page::new(skip, take),
            )
            .await
            .extend()?;
        Ok(rows.into_iter().map(MethodObject::from).collect())
    }

    async fn properties(
        &self,
        ctx: &Context<'_>,
        skip: Option<u64>,
        take: Option<u64>,
    ) -> Result<Vec<PropertyObject>> {
        let rows = service(ctx)?
            .repo()
            .list_lookups(
                LookupKind::Property,
                &LookupFilter::default(),
                &[],
                Page::new(skip, take),
            )
            .await
            .extend()?;
        Ok(rows.into_iter().map(PropertyObject::from).collect())
    }

    async fn descriptors(
        &self,
        ctx: &Context<'_>,
        skip: Option<u64>,
        take: Option<u64>,
    ) -> Result<Vec<DescriptorObject>> {
        let rows = service(ctx)?
            .repo()
            .list_lookups(
                LookupKind::Descriptor,
                &LookupFilter::default(),
                &[],
                Page::new(skip, take),
            )
            .await
            .extend()?;
        Ok(rows.into_iter().map(DescriptorObject::from).collect())
    }

    async fn modelsets(
        &self,
        ctx: &Context<'_>,
        skip: Option<u64>,
        take: Option<u64>,
    ) -> Result<Vec<ModelsetObject>> {
        let rows = service(ctx)?
            .repo()
            .list_lookups(
                LookupKind::Modelset,
                &LookupFilter::default(),
                &[],
                Page::new(skip, take),
            )
            .await
            .extend()?;
        Ok(rows.into_iter().map(ModelsetObject::from).collect())
    }

    /// Count a download for each model and return signed links
    async fn get_model_urls(
        &self,
        ctx: &Context<'_>,
        ids: Vec<i32>,
        order_by: Option<Vec<ModelOrderByInput>>,
    ) -> Result<Vec<ModelUrlObject>> {
        let orders = into_model_orders(order_by);
        let urls = service(ctx)?
            .get_model_urls(&ids, &orders)
            .await
            .extend()?;
        Ok(urls.into_iter().map(ModelUrlObject::from).collect())
    }

    /// The signed-in user, if any
    async fn me(&self, ctx: &Context<'_>) -> Result<Option<UserObject>> {
        let Some(auth) = ctx.data::<Identity>()?.auth() else {
            return Ok(None);
        };
        let user = service(ctx)?.repo().find_user(auth.user_id).await.extend()?;
        Ok(user.map(UserObject::from))
    }
}
