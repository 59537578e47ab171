//! Repository pattern for database operations
//!
//! Provides a clean interface for all data access operations
//! with proper error handling and transaction support.

use crate::db::models::*;
use crate::db::query::{LookupFilter, LookupOrder, LookupSortField, ModelFilter, ModelOrder, Page};
use crate::db::{query, DbPool};
use crate::errors::{AppError, Result};
use crate::naming::{reformat_name, ConnectOrCreate, LookupKind, ResolvedNames};
use chrono::Utc;
use sea_orm::prelude::{DateTimeWithTimeZone, Json};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::debug;
use validator::Validate;

/// Regression scores as supplied on upload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegressionValues {
    pub mae: Option<f64>,
    pub mse: Option<f64>,
    pub rmse: Option<f64>,
    pub r2: Option<f64>,
    pub pearsonr: Option<f64>,
    pub spearmanr: Option<f64>,
    pub p_value: Option<f64>,
    pub max_ae: Option<f64>,
}

impl RegressionValues {
    /// At least one score given
    pub fn is_set(&self) -> bool {
        [
            self.mae,
            self.mse,
            self.rmse,
            self.r2,
            self.pearsonr,
            self.spearmanr,
            self.p_value,
            self.max_ae,
        ]
        .iter()
        .any(Option::is_some)
    }
}

/// Classification scores as supplied on upload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationValues {
    pub accuracy: Option<f64>,
    pub precision: Option<f64>,
    pub recall: Option<f64>,
    pub f1: Option<f64>,
    pub sensitivity: Option<f64>,
    pub specificity: Option<f64>,
}

impl ClassificationValues {
    pub fn is_set(&self) -> bool {
        [
            self.accuracy,
            self.precision,
            self.recall,
            self.f1,
            self.sensitivity,
            self.specificity,
        ]
        .iter()
        .any(Option::is_some)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetricValues {
    Regression(RegressionValues),
    Classification(ClassificationValues),
}

/// Model row to create together with its placeholder artifact
#[derive(Debug, Clone, Default)]
pub struct NewModel {
    pub owner_id: i32,
    pub keywords: Option<String>,
    pub deprecated: bool,
    pub succeed: bool,
    pub training_env: Option<Json>,
    pub training_info: Option<Json>,
    pub metric: Option<MetricValues>,
}

/// Client-writable model fields; `None` leaves a field untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelPatch {
    pub keywords: Option<Option<String>>,
    pub deprecated: Option<bool>,
    pub succeed: Option<bool>,
    pub training_env: Option<Option<Json>>,
    pub training_info: Option<Option<Json>>,
}

impl ModelPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    fn apply(&self, am: &mut ModelActiveModel) {
        if let Some(v) = &self.keywords {
            am.keywords = Set(v.clone());
        }
        if let Some(v) = self.deprecated {
            am.deprecated = Set(v);
        }
        if let Some(v) = self.succeed {
            am.succeed = Set(v);
        }
        if let Some(v) = &self.training_env {
            am.training_env = Set(v.clone());
        }
        if let Some(v) = &self.training_info {
            am.training_info = Set(v.clone());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Validate)]
pub struct NewMethod {
    #[validate(length(min = 1, max = 128))]
    pub name: String,
    #[validate(length(max = 4096))]
    pub description: Option<String>,
    pub owner_id: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodPatch {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
}

/// Unique key of a lookup row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodKey {
    Id(i32),
    Name(String),
}

impl MethodKey {
    fn describe(&self) -> String {
        match self {
            MethodKey::Id(id) => id.to_string(),
            MethodKey::Name(name) => name.clone(),
        }
    }
}

/// Kind-independent view of a method, property, descriptor or modelset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupRow {
    pub kind: LookupKind,
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub owner_id: i32,
    pub created_at: DateTimeWithTimeZone,
}

macro_rules! lookup_row {
    ($kind:expr, $row:expr) => {{
        let row = $row;
        LookupRow {
            kind: $kind,
            id: row.id,
            name: row.name,
            description: row.description,
            owner_id: row.owner_id,
            created_at: row.created_at,
        }
    }};
}

impl From<Method> for LookupRow {
    fn from(row: Method) -> Self {
        lookup_row!(LookupKind::Method, row)
    }
}

impl From<Property> for LookupRow {
    fn from(row: Property) -> Self {
        lookup_row!(LookupKind::Property, row)
    }
}

impl From<Descriptor> for LookupRow {
    fn from(row: Descriptor) -> Self {
        lookup_row!(LookupKind::Descriptor, row)
    }
}

impl From<Modelset> for LookupRow {
    fn from(row: Modelset) -> Self {
        lookup_row!(LookupKind::Modelset, row)
    }
}

// INSERT .. ON CONFLICT (name) DO NOTHING, then read the row back by name.
// Concurrent creators of the same name all end up with the surviving row.
macro_rules! upsert_by_name {
    ($conn:expr, $entity:ident, $active:ident, $column:ident, $directive:expr, $now:expr) => {{
        let directive: &ConnectOrCreate = $directive;
        $entity::insert($active {
            name: Set(directive.create.name.clone()),
            description: Set(directive.create.description.clone()),
            owner_id: Set(directive.create.owner_id),
            created_at: Set($now),
            ..Default::default()
        })
        .on_conflict(OnConflict::column($column::Name).do_nothing().to_owned())
        .exec_without_returning($conn)
        .await?;

        $entity::find()
            .filter($column::Name.eq(directive.name()))
            .one($conn)
            .await?
            .map(|row| row.id)
    }};
}

async fn resolve_lookup<C: ConnectionTrait>(
    conn: &C,
    kind: LookupKind,
    directive: &ConnectOrCreate,
    now: DateTimeWithTimeZone,
) -> Result<i32> {
    let id = match kind {
        LookupKind::Method => {
            upsert_by_name!(conn, MethodEntity, MethodActiveModel, MethodColumn, directive, now)
        }
        LookupKind::Property => upsert_by_name!(
            conn,
            PropertyEntity,
            PropertyActiveModel,
            PropertyColumn,
            directive,
            now
        ),
        LookupKind::Descriptor => upsert_by_name!(
            conn,
            DescriptorEntity,
            DescriptorActiveModel,
            DescriptorColumn,
            directive,
            now
        ),
        LookupKind::Modelset => upsert_by_name!(
            conn,
            ModelsetEntity,
            ModelsetActiveModel,
            ModelsetColumn,
            directive,
            now
        ),
    };

    id.ok_or_else(|| AppError::Internal {
        message: format!("{} '{}' vanished after upsert", kind, directive.name()),
    })
}

async fn resolve_optional<C: ConnectionTrait>(
    conn: &C,
    names: &ResolvedNames,
    kind: LookupKind,
    now: DateTimeWithTimeZone,
) -> Result<Option<i32>> {
    match names.get(kind) {
        Some(directive) => Ok(Some(resolve_lookup(conn, kind, directive, now).await?)),
        None => Ok(None),
    }
}

macro_rules! list_lookup {
    ($conn:expr, $entity:ident, $column:ident, $filter:expr, $orders:expr, $page:expr) => {{
        let mut select = $entity::find().filter($filter.condition(
            $column::Id,
            $column::Name,
            $column::OwnerId,
        ));
        if $orders.is_empty() {
            select = select.order_by_asc($column::Id);
        }
        for o in $orders {
            let col = match o.field {
                LookupSortField::Id => $column::Id,
                LookupSortField::Name => $column::Name,
            };
            select = select.order_by(col, o.orm_order());
        }
        $page
            .apply(select)
            .all($conn)
            .await?
            .into_iter()
            .map(LookupRow::from)
            .collect::<Vec<_>>()
    }};
}

macro_rules! find_lookup {
    ($conn:expr, $entity:ident, $column:ident, $key:expr) => {{
        let select = match $key {
            MethodKey::Id(id) => $entity::find_by_id(*id),
            MethodKey::Name(name) => {
                $entity::find().filter($column::Name.eq(reformat_name(name).unwrap_or_default()))
            }
        };
        select.one($conn).await?.map(LookupRow::from)
    }};
}

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> &DatabaseConnection {
        self.pool.conn()
    }

    // ========================================================================
    // Health Check
    // ========================================================================

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    // ========================================================================
    // User Operations
    // ========================================================================

    pub async fn find_user(&self, id: i32) -> Result<Option<User>> {
        UserEntity::find_by_id(id)
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    pub async fn create_user(&self, name: &str, email: Option<String>, role: Role) -> Result<User> {
        let user = UserActiveModel {
            name: Set(name.to_string()),
            email: Set(email),
            role: Set(role.into()),
            disabled: Set(false),
            created_at: Set(Utc::now().into()),
            ..Default::default()
        };

        user.insert(self.conn()).await.map_err(Into::into)
    }

    pub async fn set_user_disabled(&self, id: i32, disabled: bool) -> Result<User> {
        let user = self
            .find_user(id)
            .await?
            .ok_or_else(|| AppError::NotFound {
                resource_type: "user".to_string(),
                id: id.to_string(),
            })?;

        let mut am: UserActiveModel = user.into();
        am.disabled = Set(disabled);
        am.update(self.conn()).await.map_err(Into::into)
    }

    // ========================================================================
    // Model Operations
    // ========================================================================

    /// Create a model, its lookups, an empty artifact and its metric in
    /// one transaction.
    pub async fn create_model(&self, new: NewModel, names: &ResolvedNames) -> Result<MlModel> {
        let txn = self.conn().begin().await?;
        let now: DateTimeWithTimeZone = Utc::now().into();

        let property_id = resolve_optional(&txn, names, LookupKind::Property, now).await?;
        let descriptor_id = resolve_optional(&txn, names, LookupKind::Descriptor, now).await?;
        let method_id = resolve_optional(&txn, names, LookupKind::Method, now).await?;
        let modelset_id = resolve_optional(&txn, names, LookupKind::Modelset, now).await?;

        let model = ModelActiveModel {
            created_at: Set(now),
            updated_at: Set(now),
            owner_id: Set(new.owner_id),
            keywords: Set(new.keywords),
            deprecated: Set(new.deprecated),
            succeed: Set(new.succeed),
            training_env: Set(new.training_env),
            training_info: Set(new.training_info),
            downloads: Set(0),
            method_id: Set(method_id),
            descriptor_id: Set(descriptor_id),
            property_id: Set(property_id),
            modelset_id: Set(modelset_id),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        ArtifactActiveModel {
            model_id: Set(model.id),
            owner_id: Set(new.owner_id),
            etag: Set(String::new()),
            path: Set(String::new()),
            filename: Set(String::new()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        match new.metric {
            Some(MetricValues::Regression(v)) => {
                RegressionMetricActiveModel {
                    model_id: Set(model.id),
                    mae: Set(v.mae),
                    mse: Set(v.mse),
                    rmse: Set(v.rmse),
                    r2: Set(v.r2),
                    pearsonr: Set(v.pearsonr),
                    spearmanr: Set(v.spearmanr),
                    p_value: Set(v.p_value),
                    max_ae: Set(v.max_ae),
                    ..Default::default()
                }
                .insert(&txn)
                .await?;
            }
            Some(MetricValues::Classification(v)) => {
                ClassificationMetricActiveModel {
                    model_id: Set(model.id),
                    accuracy: Set(v.accuracy),
                    precision: Set(v.precision),
                    recall: Set(v.recall),
                    f1: Set(v.f1),
                    sensitivity: Set(v.sensitivity),
                    specificity: Set(v.specificity),
                    ..Default::default()
                }
                .insert(&txn)
                .await?;
            }
            None => {}
        }

        txn.commit().await?;
        debug!(model_id = model.id, "Model row created");

        Ok(model)
    }

    /// Record where the artifact blob landed
    pub async fn finalize_artifact(
        &self,
        model_id: i32,
        etag: String,
        path: String,
        filename: String,
    ) -> Result<Artifact> {
        let artifact = self
            .find_artifact(model_id)
            .await?
            .ok_or(AppError::ModelNotFound { id: model_id })?;

        let mut am: ArtifactActiveModel = artifact.into();
        am.etag = Set(etag);
        am.path = Set(path);
        am.filename = Set(filename);
        am.updated_at = Set(Utc::now().into());

        am.update(self.conn()).await.map_err(Into::into)
    }

    pub async fn find_model(&self, id: i32) -> Result<Option<MlModel>> {
        ModelEntity::find_by_id(id)
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    pub async fn find_models(
        &self,
        filter: &ModelFilter,
        orders: &[ModelOrder],
        page: Page,
    ) -> Result<Vec<MlModel>> {
        let select = query::order_models(ModelEntity::find().filter(filter.condition()), orders);

        page.apply(select)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    pub async fn count_models(&self, filter: &ModelFilter) -> Result<u64> {
        ModelEntity::find()
            .filter(filter.condition())
            .count(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Every model matching the filter with its artifact, unpaged
    pub async fn find_models_with_artifacts(
        &self,
        filter: &ModelFilter,
    ) -> Result<Vec<(MlModel, Option<Artifact>)>> {
        ModelEntity::find()
            .filter(filter.condition())
            .order_by_asc(ModelColumn::Id)
            .find_also_related(ArtifactEntity)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Distinct owners of the models matching the filter
    pub async fn model_owners(&self, filter: &ModelFilter) -> Result<Vec<i32>> {
        ModelEntity::find()
            .select_only()
            .column(ModelColumn::OwnerId)
            .distinct()
            .filter(filter.condition())
            .into_tuple::<i32>()
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    pub async fn find_artifact(&self, model_id: i32) -> Result<Option<Artifact>> {
        ArtifactEntity::find()
            .filter(ArtifactColumn::ModelId.eq(model_id))
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    pub async fn find_metric(&self, model_id: i32) -> Result<Option<Metric>> {
        if let Some(m) = RegressionMetricEntity::find()
            .filter(RegressionMetricColumn::ModelId.eq(model_id))
            .one(self.conn())
            .await?
        {
            return Ok(Some(Metric::Regression(m)));
        }

        let cls = ClassificationMetricEntity::find()
            .filter(ClassificationMetricColumn::ModelId.eq(model_id))
            .one(self.conn())
            .await?;

        Ok(cls.map(Metric::Classification))
    }

    pub async fn update_model(&self, id: i32, patch: &ModelPatch) -> Result<MlModel> {
        let model = self
            .find_model(id)
            .await?
            .ok_or(AppError::ModelNotFound { id })?;

        let mut am: ModelActiveModel = model.into();
        patch.apply(&mut am);
        am.updated_at = Set(Utc::now().into());

        am.update(self.conn()).await.map_err(Into::into)
    }

    pub async fn update_models(&self, filter: &ModelFilter, patch: &ModelPatch) -> Result<u64> {
        let mut am = ModelActiveModel {
            updated_at: Set(Utc::now().into()),
            ..Default::default()
        };
        patch.apply(&mut am);

        let result = ModelEntity::update_many()
            .set(am)
            .filter(filter.condition())
            .exec(self.conn())
            .await?;

        Ok(result.rows_affected)
    }

    /// Delete models with their artifact and metric rows
    pub async fn delete_models(&self, ids: &[i32]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let ids = ids.to_vec();
        let txn = self.conn().begin().await?;

        ArtifactEntity::delete_many()
            .filter(ArtifactColumn::ModelId.is_in(ids.clone()))
            .exec(&txn)
            .await?;
        RegressionMetricEntity::delete_many()
            .filter(RegressionMetricColumn::ModelId.is_in(ids.clone()))
            .exec(&txn)
            .await?;
        ClassificationMetricEntity::delete_many()
            .filter(ClassificationMetricColumn::ModelId.is_in(ids.clone()))
            .exec(&txn)
            .await?;
        let result = ModelEntity::delete_many()
            .filter(ModelColumn::Id.is_in(ids))
            .exec(&txn)
            .await?;

        txn.commit().await?;
        Ok(result.rows_affected)
    }

    pub async fn delete_model(&self, id: i32) -> Result<bool> {
        Ok(self.delete_models(&[id]).await? > 0)
    }

    /// Bump the download counter of each listed model by one
    pub async fn increment_downloads(&self, ids: &[i32]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let result = ModelEntity::update_many()
            .col_expr(
                ModelColumn::Downloads,
                Expr::col(ModelColumn::Downloads).add(1),
            )
            .filter(ModelColumn::Id.is_in(ids.to_vec()))
            .exec(self.conn())
            .await?;

        Ok(result.rows_affected)
    }

    // ========================================================================
    // Lookup Operations
    // ========================================================================

    pub async fn find_lookup(&self, kind: LookupKind, key: &MethodKey) -> Result<Option<LookupRow>> {
        let row = match kind {
            LookupKind::Method => find_lookup!(self.conn(), MethodEntity, MethodColumn, key),
            LookupKind::Property => find_lookup!(self.conn(), PropertyEntity, PropertyColumn, key),
            LookupKind::Descriptor => {
                find_lookup!(self.conn(), DescriptorEntity, DescriptorColumn, key)
            }
            LookupKind::Modelset => find_lookup!(self.conn(), ModelsetEntity, ModelsetColumn, key),
        };
        Ok(row)
    }

    pub async fn list_lookups(
        &self,
        kind: LookupKind,
        filter: &LookupFilter,
        orders: &[LookupOrder],
        page: Page,
    ) -> Result<Vec<LookupRow>> {
        let rows = match kind {
            LookupKind::Method => {
                list_lookup!(self.conn(), MethodEntity, MethodColumn, filter, orders, page)
            }
            LookupKind::Property => {
                list_lookup!(self.conn(), PropertyEntity, PropertyColumn, filter, orders, page)
            }
            LookupKind::Descriptor => {
                list_lookup!(self.conn(), DescriptorEntity, DescriptorColumn, filter, orders, page)
            }
            LookupKind::Modelset => {
                list_lookup!(self.conn(), ModelsetEntity, ModelsetColumn, filter, orders, page)
            }
        };
        Ok(rows)
    }

    /// Name of the lookup row a model points at
    pub async fn lookup_name(&self, kind: LookupKind, id: Option<i32>) -> Result<Option<String>> {
        match id {
            Some(id) => Ok(self
                .find_lookup(kind, &MethodKey::Id(id))
                .await?
                .map(|row| row.name)),
            None => Ok(None),
        }
    }

    /// Number of models referencing a lookup row
    pub async fn count_models_for(&self, kind: LookupKind, id: i32) -> Result<u64> {
        let filter = match kind {
            LookupKind::Method => ModelFilter {
                method_id: Some(id),
                ..Default::default()
            },
            LookupKind::Property => ModelFilter {
                property_id: Some(id),
                ..Default::default()
            },
            LookupKind::Descriptor => ModelFilter {
                descriptor_id: Some(id),
                ..Default::default()
            },
            LookupKind::Modelset => ModelFilter {
                modelset_id: Some(id),
                ..Default::default()
            },
        };
        self.count_models(&filter).await
    }

    // ========================================================================
    // Method Operations
    // ========================================================================

    async fn require_method(&self, key: &MethodKey) -> Result<Method> {
        let found = match key {
            MethodKey::Id(id) => MethodEntity::find_by_id(*id).one(self.conn()).await?,
            MethodKey::Name(name) => {
                MethodEntity::find()
                    .filter(MethodColumn::Name.eq(reformat_name(name).unwrap_or_default()))
                    .one(self.conn())
                    .await?
            }
        };

        found.ok_or_else(|| AppError::MethodNotFound { key: key.describe() })
    }

    pub async fn create_method(&self, new: NewMethod) -> Result<LookupRow> {
        new.validate()?;
        let name = reformat_name(&new.name)
            .ok_or_else(|| AppError::validation("method name must not be empty"))?;

        let method = MethodActiveModel {
            name: Set(name),
            description: Set(new.description),
            owner_id: Set(new.owner_id),
            created_at: Set(Utc::now().into()),
            ..Default::default()
        };

        let row = method.insert(self.conn()).await?;
        Ok(row.into())
    }

    pub async fn update_method(&self, key: &MethodKey, patch: MethodPatch) -> Result<LookupRow> {
        let method = self.require_method(key).await?;
        let mut am: MethodActiveModel = method.into();

        if let Some(name) = patch.name {
            let name = reformat_name(&name)
                .ok_or_else(|| AppError::validation("method name must not be empty"))?;
            am.name = Set(name);
        }
        if let Some(description) = patch.description {
            am.description = Set(description);
        }

        let row = am.update(self.conn()).await?;
        Ok(row.into())
    }

    /// Delete a method; models referencing it keep existing without one
    pub async fn delete_method(&self, key: &MethodKey) -> Result<LookupRow> {
        let method = self.require_method(key).await?;
        let txn = self.conn().begin().await?;

        ModelEntity::update_many()
            .col_expr(ModelColumn::MethodId, Expr::value(Option::<i32>::None))
            .filter(ModelColumn::MethodId.eq(method.id))
            .exec(&txn)
            .await?;
        MethodEntity::delete_by_id(method.id).exec(&txn).await?;

        txn.commit().await?;
        Ok(method.into())
    }

    /// Owner of a method, for authorization
    pub async fn method_owner(&self, key: &MethodKey) -> Result<i32> {
        Ok(self.require_method(key).await?.owner_id)
    }
}
