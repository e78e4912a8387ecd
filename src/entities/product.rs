//! Product entity - A book in the storefront catalog.
//!
//! Products are keyed by a stable slug (`"the-great-library"`). Inactive products
//! stay in the collection so historical order lines can still be resolved, but
//! they are hidden from the catalog and from cart resolution.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Visibility of a product in the catalog.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    /// Visible in the catalog and resolvable by the cart
    #[default]
    #[sea_orm(string_value = "active")]
    Active,
    /// Hidden, kept for historical order display
    #[sea_orm(string_value = "inactive")]
    Inactive,
}

/// Product database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    /// Stable slug identifier
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(indexed)]
    pub title: String,
    pub author: String,
    /// Genre key, lower-case (e.g. `"programming"`)
    #[sea_orm(indexed)]
    pub genre: String,
    /// List price in dollars, never negative
    pub price: f64,
    /// Cover image path
    pub cover: String,
    pub format: String,
    pub pages: i32,
    pub isbn: String,
    pub description: String,
    pub status: ProductStatus,
    /// Promotion flag
    pub bf_deal: bool,
    /// Fractional promotional discount in `0..=1`
    pub bf_discount: f64,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl Model {
    /// Unit price after the promotional discount, if one applies.
    #[must_use]
    pub fn effective_price(&self) -> f64 {
        if self.bf_deal && self.bf_discount > 0.0 {
            (self.price * (1.0 - self.bf_discount)).max(0.0)
        } else {
            self.price
        }
    }

    /// Whether the product is visible to the catalog and the cart.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == ProductStatus::Active
    }
}

/// Products are referenced by order lines through `book_id` but own no relations.
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
