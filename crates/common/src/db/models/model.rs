//! Model entity: one uploaded machine-learning model and its metadata

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "models")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,

    pub owner_id: i32,

    /// Keywords split by comma or white space
    #[sea_orm(column_type = "Text", nullable)]
    pub keywords: Option<String>,

    pub deprecated: bool,

    pub succeed: bool,

    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub training_env: Option<Json>,

    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub training_info: Option<Json>,

    pub downloads: i32,

    pub method_id: Option<i32>,

    pub descriptor_id: Option<i32>,

    pub property_id: Option<i32>,

    pub modelset_id: Option<i32>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::OwnerId",
        to = "super::user::Column::Id"
    )]
    Owner,

    #[sea_orm(
        belongs_to = "super::method::Entity",
        from = "Column::MethodId",
        to = "super::method::Column::Id",
        on_delete = "SetNull"
    )]
    Method,

    #[sea_orm(
        belongs_to = "super::descriptor::Entity",
        from = "Column::DescriptorId",
        to = "super::descriptor::Column::Id",
        on_delete = "SetNull"
    )]
    Descriptor,

    #[sea_orm(
        belongs_to = "super::property::Entity",
        from = "Column::PropertyId",
        to = "super::property::Column::Id",
        on_delete = "SetNull"
    )]
    Property,

    #[sea_orm(
        belongs_to = "super::modelset::Entity",
        from = "Column::ModelsetId",
        to = "super::modelset::Column::Id",
        on_delete = "SetNull"
    )]
    Modelset,

    #[sea_orm(has_one = "super::artifact::Entity")]
    Artifact,

    #[sea_orm(has_one = "super::regression_metric::Entity")]
    RegressionMetric,

    #[sea_orm(has_one = "super::classification_metric::Entity")]
    ClassificationMetric,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Owner.def()
    }
}

impl Related<super::method::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Method.def()
    }
}

impl Related<super::descriptor::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Descriptor.def()
    }
}

impl Related<super::property::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Property.def()
    }
}

impl Related<super::modelset::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Modelset.def()
    }
}

impl Related<super::regression_metric::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RegressionMetric.def()
    }
}

impl Related<super::classification_metric::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ClassificationMetric.def()
    }
}

impl Related<super::artifact::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Artifact.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
