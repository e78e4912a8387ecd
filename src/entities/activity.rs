//! Activity entity - Change log shown to store administrators.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Activity database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "activity")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    /// Sequential id, assigned by the coordinator when the entry is appended
    #[sea_orm(primary_key)]
    #[serde(default)]
    pub id: i32,
    /// Kind of record the entry is about (`"user"`, `"order"`, `"product"`)
    #[sea_orm(indexed)]
    pub entity_type: String,
    pub action: String,
    #[serde(default)]
    pub entity_id: String,
    #[serde(default)]
    pub message: String,
    #[sea_orm(indexed)]
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
