//! Filtering, ordering and pagination for model and lookup listings
//!
//! These are the storage-side forms of the GraphQL `where` / `orderBy` /
//! `skip` / `take` arguments.

use std::cmp::Ordering;

use sea_orm::sea_query::{Query, SelectStatement};
use sea_orm::{ColumnTrait, Condition, EntityTrait, QueryOrder, QuerySelect, Select};
use serde::{Deserialize, Serialize};

use crate::db::models::*;
use crate::naming::reformat_name;

/// Upper bound for `take`
pub const MAX_TAKE: u64 = 500;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntFilter {
    pub equals: Option<i32>,
    pub in_list: Option<Vec<i32>>,
    pub not_in: Option<Vec<i32>>,
    pub lt: Option<i32>,
    pub lte: Option<i32>,
    pub gt: Option<i32>,
    pub gte: Option<i32>,
}

impl IntFilter {
    pub fn equals(value: i32) -> Self {
        Self {
            equals: Some(value),
            ..Default::default()
        }
    }

    pub fn in_list(values: Vec<i32>) -> Self {
        Self {
            in_list: Some(values),
            ..Default::default()
        }
    }

    fn condition<C: ColumnTrait>(&self, col: C) -> Condition {
        let mut cond = Condition::all();
        if let Some(v) = self.equals {
            cond = cond.add(col.eq(v));
        }
        if let Some(values) = &self.in_list {
            cond = cond.add(col.is_in(values.clone()));
        }
        if let Some(values) = &self.not_in {
            cond = cond.add(col.is_not_in(values.clone()));
        }
        if let Some(v) = self.lt {
            cond = cond.add(col.lt(v));
        }
        if let Some(v) = self.lte {
            cond = cond.add(col.lte(v));
        }
        if let Some(v) = self.gt {
            cond = cond.add(col.gt(v));
        }
        if let Some(v) = self.gte {
            cond = cond.add(col.gte(v));
        }
        cond
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringFilter {
    pub equals: Option<String>,
    pub contains: Option<String>,
    pub starts_with: Option<String>,
    pub ends_with: Option<String>,
}

impl StringFilter {
    fn condition<C: ColumnTrait>(&self, col: C) -> Condition {
        let mut cond = Condition::all();
        if let Some(v) = &self.equals {
            cond = cond.add(col.eq(v.clone()));
        }
        if let Some(v) = &self.contains {
            cond = cond.add(col.contains(v));
        }
        if let Some(v) = &self.starts_with {
            cond = cond.add(col.starts_with(v));
        }
        if let Some(v) = &self.ends_with {
            cond = cond.add(col.ends_with(v));
        }
        cond
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Regression,
    Classification,
}

/// Model listing filter; every set field must match
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelFilter {
    pub id: Option<IntFilter>,
    pub keywords: Option<StringFilter>,
    pub deprecated: Option<bool>,
    pub succeed: Option<bool>,
    pub owner_id: Option<i32>,
    pub property_id: Option<i32>,
    pub property: Option<String>,
    pub descriptor_id: Option<i32>,
    pub descriptor: Option<String>,
    pub method_id: Option<i32>,
    pub method: Option<String>,
    pub modelset_id: Option<i32>,
    pub modelset: Option<String>,
    pub metric_kind: Option<MetricKind>,
}

fn ids_named<E, C>(entity: E, id: C, name_col: C, name: &str) -> SelectStatement
where
    E: EntityTrait,
    C: ColumnTrait,
{
    // stored names are normalised; an unusable name matches nothing
    let name = reformat_name(name).unwrap_or_default();
    Query::select()
        .column(id)
        .from(entity)
        .and_where(name_col.eq(name))
        .to_owned()
}

impl ModelFilter {
    pub fn ids(ids: Vec<i32>) -> Self {
        Self {
            id: Some(IntFilter::in_list(ids)),
            ..Default::default()
        }
    }

    pub fn condition(&self) -> Condition {
        let mut cond = Condition::all();

        if let Some(f) = &self.id {
            cond = cond.add(f.condition(ModelColumn::Id));
        }
        if let Some(f) = &self.keywords {
            cond = cond.add(f.condition(ModelColumn::Keywords));
        }
        if let Some(v) = self.deprecated {
            cond = cond.add(ModelColumn::Deprecated.eq(v));
        }
        if let Some(v) = self.succeed {
            cond = cond.add(ModelColumn::Succeed.eq(v));
        }
        if let Some(v) = self.owner_id {
            cond = cond.add(ModelColumn::OwnerId.eq(v));
        }
        if let Some(v) = self.property_id {
            cond = cond.add(ModelColumn::PropertyId.eq(v));
        }
        if let Some(name) = &self.property {
            cond = cond.add(ModelColumn::PropertyId.in_subquery(ids_named(
                PropertyEntity,
                PropertyColumn::Id,
                PropertyColumn::Name,
                name,
            )));
        }
        if let Some(v) = self.descriptor_id {
            cond = cond.add(ModelColumn::DescriptorId.eq(v));
        }
        if let Some(name) = &self.descriptor {
            cond = cond.add(ModelColumn::DescriptorId.in_subquery(ids_named(
                DescriptorEntity,
                DescriptorColumn::Id,
                DescriptorColumn::Name,
                name,
            )));
        }
        if let Some(v) = self.method_id {
            cond = cond.add(ModelColumn::MethodId.eq(v));
        }
        if let Some(name) = &self.method {
            cond = cond.add(ModelColumn::MethodId.in_subquery(ids_named(
                MethodEntity,
                MethodColumn::Id,
                MethodColumn::Name,
                name,
            )));
        }
        if let Some(v) = self.modelset_id {
            cond = cond.add(ModelColumn::ModelsetId.eq(v));
        }
        if let Some(name) = &self.modelset {
            cond = cond.add(ModelColumn::ModelsetId.in_subquery(ids_named(
                ModelsetEntity,
                ModelsetColumn::Id,
                ModelsetColumn::Name,
                name,
            )));
        }
        match self.metric_kind {
            Some(MetricKind::Regression) => {
                cond = cond.add(
                    ModelColumn::Id.in_subquery(
                        Query::select()
                            .column(RegressionMetricColumn::ModelId)
                            .from(RegressionMetricEntity)
                            .to_owned(),
                    ),
                );
            }
            Some(MetricKind::Classification) => {
                cond = cond.add(
                    ModelColumn::Id.in_subquery(
                        Query::select()
                            .column(ClassificationMetricColumn::ModelId)
                            .from(ClassificationMetricEntity)
                            .to_owned(),
                    ),
                );
            }
            None => {}
        }

        cond
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    fn apply(self, ord: Ordering) -> Ordering {
        match self {
            SortOrder::Asc => ord,
            SortOrder::Desc => ord.reverse(),
        }
    }

    fn to_orm(self) -> sea_orm::Order {
        match self {
            SortOrder::Asc => sea_orm::Order::Asc,
            SortOrder::Desc => sea_orm::Order::Desc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelSortField {
    Id,
    CreatedAt,
    UpdatedAt,
    Keywords,
    Downloads,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelOrder {
    pub field: ModelSortField,
    pub order: SortOrder,
}

impl ModelOrder {
    pub fn new(field: ModelSortField, order: SortOrder) -> Self {
        Self { field, order }
    }

    fn column(&self) -> ModelColumn {
        match self.field {
            ModelSortField::Id => ModelColumn::Id,
            ModelSortField::CreatedAt => ModelColumn::CreatedAt,
            ModelSortField::UpdatedAt => ModelColumn::UpdatedAt,
            ModelSortField::Keywords => ModelColumn::Keywords,
            ModelSortField::Downloads => ModelColumn::Downloads,
        }
    }

    fn compare(&self, a: &MlModel, b: &MlModel) -> Ordering {
        let ord = match self.field {
            ModelSortField::Id => a.id.cmp(&b.id),
            ModelSortField::CreatedAt => a.created_at.cmp(&b.created_at),
            ModelSortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            ModelSortField::Keywords => compare_nulls_last(&a.keywords, &b.keywords),
            ModelSortField::Downloads => a.downloads.cmp(&b.downloads),
        };
        self.order.apply(ord)
    }
}

/// NULL sorts above every value, as Postgres orders it
fn compare_nulls_last<T: Ord>(a: &Option<T>, b: &Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Apply orderings to a model query; id ascending when none given
pub fn order_models(mut select: Select<ModelEntity>, orders: &[ModelOrder]) -> Select<ModelEntity> {
    if orders.is_empty() {
        return select.order_by_asc(ModelColumn::Id);
    }
    for o in orders {
        select = select.order_by(o.column(), o.order.to_orm());
    }
    select
}

/// Lexicographic in-memory comparison using the same orderings
pub fn compare_models(a: &MlModel, b: &MlModel, orders: &[ModelOrder]) -> Ordering {
    orders
        .iter()
        .map(|o| o.compare(a, b))
        .find(|ord| *ord != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

/// Filter for method (and other lookup) listings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupFilter {
    pub id: Option<IntFilter>,
    pub name: Option<StringFilter>,
    pub owner_id: Option<i32>,
}

impl LookupFilter {
    pub fn condition<C: ColumnTrait>(&self, id: C, name: C, owner: C) -> Condition {
        let mut cond = Condition::all();
        if let Some(f) = &self.id {
            cond = cond.add(f.condition(id));
        }
        if let Some(f) = &self.name {
            cond = cond.add(f.condition(name));
        }
        if let Some(v) = self.owner_id {
            cond = cond.add(owner.eq(v));
        }
        cond
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupSortField {
    Id,
    Name,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupOrder {
    pub field: LookupSortField,
    pub order: SortOrder,
}

impl LookupOrder {
    pub(crate) fn orm_order(&self) -> sea_orm::Order {
        self.order.to_orm()
    }
}

/// `skip` / `take` window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub skip: Option<u64>,
    pub take: Option<u64>,
}

impl Page {
    pub fn new(skip: Option<u64>, take: Option<u64>) -> Self {
        Self { skip, take }
    }

    pub fn apply<S: QuerySelect>(&self, select: S) -> S {
        let select = match self.skip {
            Some(skip) if skip > 0 => select.offset(skip),
            _ => select,
        };
        select.limit(self.take.unwrap_or(MAX_TAKE).min(MAX_TAKE))
    }
}
