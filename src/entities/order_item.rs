//! Order item entity - One immutable line of a paid order.
//!
//! The id is `"<order id>::<book id>::<position>"`, which keeps two lines for
//! the same book apart. Lines are append-only; nothing updates them after
//! checkout.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Order item database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "order_items")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(indexed)]
    pub order_id: String,
    /// Product id at the time of purchase
    #[sea_orm(indexed)]
    pub book_id: String,
    pub title: String,
    /// Unit price charged
    pub price: f64,
    pub qty: i32,
    pub subtotal: f64,
    pub created_at: DateTimeUtc,
}

/// Builds the composite line id.
#[must_use]
pub fn line_id(order_id: &str, book_id: &str, position: usize) -> String {
    format!("{order_id}::{book_id}::{position}")
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each line belongs to one order
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id"
    )]
    Order,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
