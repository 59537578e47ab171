//! GraphQL output types

use async_graphql::{ComplexObject, Context, Json, Object, Result, ResultExt, SimpleObject, Union};
use chrono::{DateTime, FixedOffset};
use mdl_common::db::models::{
    Artifact, ClassificationMetric, Metric, MlModel, RegressionMetric, User,
};
use mdl_common::db::query::{ModelFilter, Page};
use mdl_common::db::LookupRow;
use mdl_common::naming::LookupKind;
use mdl_common::services::{ModelService, ModelUrl};
use serde_json::Value;

use super::inputs::{into_model_orders, ModelOrderByInput};

pub(crate) fn service<'a>(ctx: &Context<'a>) -> Result<&'a ModelService> {
    ctx.data::<ModelService>()
}

pub struct ModelObject(pub MlModel);

#[Object(name = "Model")]
impl ModelObject {
    async fn id(&self) -> i32 {
        self.0.id
    }

    async fn created_at(&self) -> DateTime<FixedOffset> {
        self.0.created_at
    }

    async fn updated_at(&self) -> DateTime<FixedOffset> {
        self.0.updated_at
    }

    async fn keywords(&self) -> Option<&str> {
        self.0.keywords.as_deref()
    }

    async fn deprecated(&self) -> bool {
        self.0.deprecated
    }

    async fn succeed(&self) -> bool {
        self.0.succeed
    }

    async fn training_env(&self) -> Option<Json<Value>> {
        self.0.training_env.clone().map(Json)
    }

    async fn training_info(&self) -> Option<Json<Value>> {
        self.0.training_info.clone().map(Json)
    }

    async fn downloads(&self) -> i32 {
        self.0.downloads
    }

    async fn artifact(&self, ctx: &Context<'_>) -> Result<Option<ArtifactObject>> {
        let artifact = service(ctx)?.repo().find_artifact(self.0.id).await.extend()?;
        Ok(artifact.map(ArtifactObject::from))
    }

    async fn owner(&self, ctx: &Context<'_>) -> Result<Option<UserObject>> {
        let user = service(ctx)?.repo().find_user(self.0.owner_id).await.extend()?;
        Ok(user.map(UserObject::from))
    }

    async fn metrics(&self, ctx: &Context<'_>) -> Result<Option<MetricUnion>> {
        let metric = service(ctx)?.repo().find_metric(self.0.id).await.extend()?;
        Ok(metric.map(MetricUnion::from))
    }

    async fn method(&self, ctx: &Context<'_>) -> Result<Option<String>> {
        self.lookup(ctx, LookupKind::Method, self.0.method_id).await
    }

    async fn descriptor(&self, ctx: &Context<'_>) -> Result<Option<String>> {
        self.lookup(ctx, LookupKind::Descriptor, self.0.descriptor_id).await
    }

    async fn property(&self, ctx: &Context<'_>) -> Result<Option<String>> {
        self.lookup(ctx, LookupKind::Property, self.0.property_id).await
    }

    async fn modelset(&self, ctx: &Context<'_>) -> Result<Option<String>> {
        self.lookup(ctx, LookupKind::Modelset, self.0.modelset_id).await
    }
}

impl ModelObject {
    async fn lookup(
        &self,
        ctx: &Context<'_>,
        kind: LookupKind,
        id: Option<i32>,
    ) -> Result<Option<String>> {
        service(ctx)?.repo().lookup_name(kind, id).await.extend()
    }
}

#[derive(SimpleObject)]
#[graphql(name = "Artifact")]
pub struct ArtifactObject {
    pub etag: String,
    pub path: String,
    pub filename: String,
}

impl From<Artifact> for ArtifactObject {
    fn from(a: Artifact) -> Self {
        Self {
            etag: a.etag,
            path: a.path,
            filename: a.filename,
        }
    }
}

#[derive(SimpleObject)]
#[graphql(name = "User")]
pub struct UserObject {
    pub id: i32,
    pub name: String,
}

impl From<User> for UserObject {
    fn from(u: User) -> Self {
        Self { id: u.id, name: u.name }
    }
}

#[derive(SimpleObject)]
#[graphql(name = "RegressionMetric")]
pub struct RegressionMetricObject {
    pub mae: Option<f64>,
    pub mse: Option<f64>,
    pub rmse: Option<f64>,
    pub r2: Option<f64>,
    pub pearsonr: Option<f64>,
    pub spearmanr: Option<f64>,
    pub p_value: Option<f64>,
    pub max_ae: Option<f64>,
}

impl From<RegressionMetric> for RegressionMetricObject {
    fn from(m: RegressionMetric) -> Self {
        Self {
            mae: m.mae,
            mse: m.mse,
            rmse: m.rmse,
            r2: m.r2,
            pearsonr: m.pearsonr,
            spearmanr: m.spearmanr,
            p_value: m.p_value,
            max_ae: m.max_ae,
        }
    }
}

#[derive(SimpleObject)]
#[graphql(name = "ClassificationMetric")]
pub struct ClassificationMetricObject {
    pub accuracy: Option<f64>,
    pub precision: Option<f64>,
    pub recall: Option<f64>,
    pub f1: Option<f64>,
    pub sensitivity: Option<f64>,
    pub specificity: Option<f64>,
}

impl From<ClassificationMetric> for ClassificationMetricObject {
    fn from(m: ClassificationMetric) -> Self {
        Self {
            accuracy: m.accuracy,
            precision: m.precision,
            recall: m.recall,
            f1: m.f1,
            sensitivity: m.sensitivity,
            specificity: m.specificity,
        }
    }
}

#[derive(Union)]
#[graphql(name = "Metric")]
pub enum MetricUnion {
    Classification(ClassificationMetricObject),
    Regression(RegressionMetricObject),
}

impl From<Metric> for MetricUnion {
    fn from(m: Metric) -> Self {
        match m {
            Metric::Classification(c) => MetricUnion::Classification(c.into()),
            Metric::Regression(r) => MetricUnion::Regression(r.into()),
        }
    }
}

#[derive(SimpleObject)]
#[graphql(name = "ModelUrl")]
pub struct ModelUrlObject {
    pub id: i32,
    pub url: String,
}

impl From<ModelUrl> for ModelUrlObject {
    fn from(u: ModelUrl) -> Self {
        Self { id: u.id, url: u.url }
    }
}

#[derive(SimpleObject)]
pub struct BatchPayload {
    pub count: u64,
}

/// Method with its models
#[derive(SimpleObject)]
#[graphql(name = "Method", complex)]
pub struct MethodObject {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    #[graphql(skip)]
    pub owner_id: i32,
}

impl From<LookupRow> for MethodObject {
    fn from(row: LookupRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            owner_id: row.owner_id,
        }
    }
}

#[ComplexObject]
impl MethodObject {
    async fn owner(&self, ctx: &Context<'_>) -> Result<Option<UserObject>> {
        let user = service(ctx)?.repo().find_user(self.owner_id).await.extend()?;
        Ok(user.map(UserObject::from))
    }

    async fn models(
        &self,
        ctx: &Context<'_>,
        skip: Option<u64>,
        take: Option<u64>,
        order_by: Option<Vec<ModelOrderByInput>>,
    ) -> Result<Vec<ModelObject>> {
        let filter = ModelFilter {
            method_id: Some(self.id),
            ..Default::default()
        };
        let orders = into_model_orders(order_by);
        let models = service(ctx)?
            .repo()
            .find_models(&filter, &orders, Page::new(skip, take))
            .await
            .extend()?;
        Ok(models.into_iter().map(ModelObject).collect())
    }

    async fn model_counts(&self, ctx: &Context<'_>) -> Result<u64> {
        service(ctx)?
            .repo()
            .count_models_for(LookupKind::Method, self.id)
            .await
            .extend()
    }
}

macro_rules! lookup_object {
    ($ty:ident, $name:literal, $kind:expr) => {
        #[derive(SimpleObject)]
        #[graphql(name = $name, complex)]
        pub struct $ty {
            pub id: i32,
            pub name: String,
            pub description: Option<String>,
        }

        impl From<LookupRow> for $ty {
            fn from(row: LookupRow) -> Self {
                Self {
                    id: row.id,
                    name: row.name,
                    description: row.description,
                }
            }
        }

        #[ComplexObject]
        impl $ty {
            async fn model_counts(&self, ctx: &Context<'_>) -> Result<u64> {
                service(ctx)?
                    .repo()
                    .count_models_for($kind, self.id)
                    .await
                    .extend()
            }
        }
    };
}

lookup_object!(PropertyObject, "Property", LookupKind::Property);
lookup_object!(DescriptorObject, "Descriptor", LookupKind::Descriptor);
lookup_object!(ModelsetObject, "Modelset", LookupKind::Modelset);
