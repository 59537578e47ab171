//! Artifact entity: storage location of a model's binary file
//!
//! Created empty together with its model and filled in once the object
//! store write succeeds. An empty `path` means the upload is in progress
//! or failed.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "artifacts")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique)]
    pub model_id: i32,

    pub owner_id: i32,

    #[sea_orm(column_type = "Text")]
    pub etag: String,

    #[sea_orm(column_type = "Text")]
    pub path: String,

    #[sea_orm(column_type = "Text")]
    pub filename: String,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    /// Upload finished and the blob is addressable
    pub fn is_complete(&self) -> bool {
        !self.path.is_empty()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::model::Entity",
        from = "Column::ModelId",
        to = "super::model::Column::Id",
        on_delete = "Cascade"
    )]
    Model,
}

impl Related<super::model::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Model.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
