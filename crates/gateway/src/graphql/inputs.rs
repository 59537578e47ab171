//! GraphQL input types and their conversion into repository filters

use async_graphql::{Enum, InputObject, Json, MaybeUndefined, OneofObject};
use mdl_common::db::query::{
    IntFilter, LookupFilter, LookupOrder, LookupSortField, MetricKind, ModelFilter, ModelOrder,
    ModelSortField, SortOrder, StringFilter,
};
use mdl_common::db::{
    ClassificationValues, MethodKey, MethodPatch, ModelPatch, RegressionValues,
};
use mdl_common::naming::NamedInput;
use serde_json::Value;

fn double_option<T>(value: MaybeUndefined<T>) -> Option<Option<T>> {
    match value {
        MaybeUndefined::Undefined => None,
        MaybeUndefined::Null => Some(None),
        MaybeUndefined::Value(v) => Some(Some(v)),
    }
}

#[derive(InputObject, Default)]
#[graphql(name = "IntFilter")]
pub struct IntFilterInput {
    pub equals: Option<i32>,
    #[graphql(name = "in")]
    pub in_list: Option<Vec<i32>>,
    pub not_in: Option<Vec<i32>>,
    pub lt: Option<i32>,
    pub lte: Option<i32>,
    pub gt: Option<i32>,
    pub gte: Option<i32>,
}

impl From<IntFilterInput> for IntFilter {
    fn from(f: IntFilterInput) -> Self {
        IntFilter {
            equals: f.equals,
            in_list: f.in_list,
            not_in: f.not_in,
            lt: f.lt,
            lte: f.lte,
            gt: f.gt,
            gte: f.gte,
        }
    }
}

#[derive(InputObject, Default)]
#[graphql(name = "StringFilter")]
pub struct StringFilterInput {
    pub equals: Option<String>,
    pub contains: Option<String>,
    pub starts_with: Option<String>,
    pub ends_with: Option<String>,
}

impl From<StringFilterInput> for StringFilter {
    fn from(f: StringFilterInput) -> Self {
        StringFilter {
            equals: f.equals,
            contains: f.contains,
            starts_with: f.starts_with,
            ends_with: f.ends_with,
        }
    }
}

#[derive(Enum, Copy, Clone, Eq, PartialEq)]
#[graphql(name = "MetricKind")]
pub enum MetricKindInput {
    Regression,
    Classification,
}

impl From<MetricKindInput> for MetricKind {
    fn from(k: MetricKindInput) -> Self {
        match k {
            MetricKindInput::Regression => MetricKind::Regression,
            MetricKindInput::Classification => MetricKind::Classification,
        }
    }
}

#[derive(InputObject, Default)]
pub struct ModelWhereInput {
    pub id: Option<IntFilterInput>,
    pub keywords: Option<StringFilterInput>,
    pub deprecated: Option<bool>,
    pub succeed: Option<bool>,
    pub owner_id: Option<i32>,
    pub property_id: Option<i32>,
    /// Property name
    pub property: Option<String>,
    pub descriptor_id: Option<i32>,
    pub descriptor: Option<String>,
    pub method_id: Option<i32>,
    pub method: Option<String>,
    pub modelset_id: Option<i32>,
    pub modelset: Option<String>,
    pub metric_kind: Option<MetricKindInput>,
}

impl From<ModelWhereInput> for ModelFilter {
    fn from(w: ModelWhereInput) -> Self {
        ModelFilter {
            id: w.id.map(Into::into),
            keywords: w.keywords.map(Into::into),
            deprecated: w.deprecated,
            succeed: w.succeed,
            owner_id: w.owner_id,
            property_id: w.property_id,
            property: w.property,
            descriptor_id: w.descriptor_id,
            descriptor: w.descriptor,
            method_id: w.method_id,
            method: w.method,
            modelset_id: w.modelset_id,
            modelset: w.modelset,
            metric_kind: w.metric_kind.map(Into::into),
        }
    }
}

#[derive(Enum, Copy, Clone, Eq, PartialEq)]
#[graphql(name = "SortOrder", rename_items = "lowercase")]
pub enum SortOrderInput {
    Asc,
    Desc,
}

impl From<SortOrderInput> for SortOrder {
    fn from(o: SortOrderInput) -> Self {
        match o {
            SortOrderInput::Asc => SortOrder::Asc,
            SortOrderInput::Desc => SortOrder::Desc,
        }
    }
}

/// One entry per ordering key; entries apply in list order
#[derive(InputObject, Default)]
pub struct ModelOrderByInput {
    pub id: Option<SortOrderInput>,
    pub created_at: Option<SortOrderInput>,
    pub updated_at: Option<SortOrderInput>,
    pub keywords: Option<SortOrderInput>,
    pub downloads: Option<SortOrderInput>,
}

impl ModelOrderByInput {
    fn orders(&self) -> impl Iterator<Item = ModelOrder> {
        [
            (ModelSortField::Id, self.id),
            (ModelSortField::CreatedAt, self.created_at),
            (ModelSortField::UpdatedAt, self.updated_at),
            (ModelSortField::Keywords, self.keywords),
            (ModelSortField::Downloads, self.downloads),
        ]
        .into_iter()
        .filter_map(|(field, order)| order.map(|o| ModelOrder::new(field, o.into())))
    }
}

pub fn into_model_orders(order_by: Option<Vec<ModelOrderByInput>>) -> Vec<ModelOrder> {
    order_by
        .unwrap_or_default()
        .iter()
        .flat_map(ModelOrderByInput::orders)
        .collect()
}

#[derive(InputObject)]
pub struct ModelWhereUniqueInput {
    pub id: i32,
}

/// Client-writable model fields
#[derive(InputObject, Default)]
pub struct ModelUpdateInput {
    pub keywords: MaybeUndefined<String>,
    pub deprecated: Option<bool>,
    pub succeed: Option<bool>,
    pub training_env: MaybeUndefined<Json<Value>>,
    pub training_info: MaybeUndefined<Json<Value>>,
}

impl From<ModelUpdateInput> for ModelPatch {
    fn from(d: ModelUpdateInput) -> Self {
        ModelPatch {
            keywords: double_option(d.keywords),
            deprecated: d.deprecated,
            succeed: d.succeed,
            training_env: double_option(d.training_env).map(|v| v.map(|j| j.0)),
            training_info: double_option(d.training_info).map(|v| v.map(|j| j.0)),
        }
    }
}

/// Name of a method, property, descriptor or modelset to connect or create
#[derive(InputObject)]
pub struct LookupCreateInput {
    pub name: String,
    pub description: Option<String>,
}

impl From<LookupCreateInput> for NamedInput {
    fn from(i: LookupCreateInput) -> Self {
        NamedInput {
            name: i.name,
            description: i.description,
        }
    }
}

#[derive(InputObject)]
pub struct RegressionMetricInput {
    pub mae: Option<f64>,
    pub mse: Option<f64>,
    pub rmse: Option<f64>,
    pub r2: Option<f64>,
    pub pearsonr: Option<f64>,
    pub spearmanr: Option<f64>,
    pub p_value: Option<f64>,
    pub max_ae: Option<f64>,
}

impl From<RegressionMetricInput> for RegressionValues {
    fn from(m: RegressionMetricInput) -> Self {
        RegressionValues {
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

#[derive(InputObject)]
pub struct ClassificationMetricInput {
    pub accuracy: Option<f64>,
    pub precision: Option<f64>,
    pub recall: Option<f64>,
    pub f1: Option<f64>,
    pub sensitivity: Option<f64>,
    pub specificity: Option<f64>,
}

impl From<ClassificationMetricInput> for ClassificationValues {
    fn from(m: ClassificationMetricInput) -> Self {
        ClassificationValues {
            accuracy: m.accuracy,
            precision: m.precision,
            recall: m.recall,
            f1: m.f1,
            sensitivity: m.sensitivity,
            specificity: m.specificity,
        }
    }
}

#[derive(OneofObject)]
pub enum MethodWhereUniqueInput {
    Id(i32),
    Name(String),
}

impl From<MethodWhereUniqueInput> for MethodKey {
    fn from(w: MethodWhereUniqueInput) -> Self {
        match w {
            MethodWhereUniqueInput::Id(id) => MethodKey::Id(id),
            MethodWhereUniqueInput::Name(name) => MethodKey::Name(name),
        }
    }
}

#[derive(InputObject, Default)]
pub struct LookupWhereInput {
    pub id: Option<IntFilterInput>,
    pub name: Option<StringFilterInput>,
    pub owner_id: Option<i32>,
}

impl From<LookupWhereInput> for LookupFilter {
    fn from(w: LookupWhereInput) -> Self {
        LookupFilter {
            id: w.id.map(Into::into),
            name: w.name.map(Into::into),
            owner_id: w.owner_id,
        }
    }
}

#[derive(InputObject, Default)]
pub struct LookupOrderByInput {
    pub id: Option<SortOrderInput>,
    pub name: Option<SortOrderInput>,
}

pub fn into_lookup_orders(order_by: Option<Vec<LookupOrderByInput>>) -> Vec<LookupOrder> {
    order_by
        .unwrap_or_default()
        .into_iter()
        .flat_map(|o| {
            [(LookupSortField::Id, o.id), (LookupSortField::Name, o.name)]
                .into_iter()
                .filter_map(|(field, order)| {
                    order.map(|order| LookupOrder {
                        field,
                        order: order.into(),
                    })
                })
        })
        .collect()
}

#[derive(InputObject)]
pub struct MethodCreateInput {
    pub name: String,
    pub description: Option<String>,
}

#[derive(InputObject, Default)]
pub struct MethodUpdateInput {
    pub name: Option<String>,
    pub description: MaybeUndefined<String>,
}

impl From<MethodUpdateInput> for MethodPatch {
    fn from(d: MethodUpdateInput) -> Self {
        MethodPatch {
            name: d.name,
            description: double_option(d.description),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_orders_flatten_in_list_order() {
        let order_by = vec![
            ModelOrderByInput {
                downloads: Some(SortOrderInput::Desc),
                ..Default::default()
            },
            ModelOrderByInput {
                id: Some(SortOrderInput::Asc),
                ..Default::default()
            },
        ];

        let orders = into_model_orders(Some(order_by));
        assert_eq!(
            orders,
            vec![
                ModelOrder::new(ModelSortField::Downloads, SortOrder::Desc),
                ModelOrder::new(ModelSortField::Id, SortOrder::Asc),
            ]
        );
        assert!(into_model_orders(None).is_empty());
    }

    #[test]
    fn test_model_update_distinguishes_null_and_missing() {
        let patch: ModelPatch = ModelUpdateInput {
            keywords: MaybeUndefined::Null,
            deprecated: Some(true),
            ..Default::default()
        }
        .into();

        assert_eq!(patch.keywords, Some(None));
        assert_eq!(patch.deprecated, Some(true));
        assert_eq!(patch.training_env, None);
    }
}
