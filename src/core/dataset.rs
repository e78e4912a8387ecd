//! The in-memory dataset and the patches that update it.
//!
//! A [`Dataset`] is both the coordinator's snapshot and the JSON blob kept in
//! flat storage under `digital_library_data_v1`. Snapshots are shared as
//! `Arc<Dataset>` and never mutated in place; every change builds a new one.

use crate::core::normalize::{self, ProductDraft, UserDraft};
use crate::entities::{ActivityEntry, OrderItemModel, OrderModel, ProductModel, UserModel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Every collection owned by the persistence coordinator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Dataset {
    pub products: Vec<ProductModel>,
    pub users: Vec<UserModel>,
    pub activity: Vec<ActivityEntry>,
    pub orders: Vec<OrderModel>,
    pub order_items: Vec<OrderItemModel>,
}

/// The flat-storage blob as written by any version of the store: product and
/// user records may be missing fields.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawDataset {
    pub products: Vec<ProductDraft>,
    pub users: Vec<UserDraft>,
    pub activity: Vec<ActivityEntry>,
    pub orders: Vec<OrderModel>,
    pub order_items: Vec<OrderItemModel>,
}

/// A partial update for [`crate::core::PersistenceCoordinator::save`].
///
/// A collection that is present replaces the whole collection; an absent one
/// is left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatasetPatch {
    pub products: Option<Vec<ProductDraft>>,
    pub users: Option<Vec<UserDraft>>,
    pub activity: Option<Vec<ActivityEntry>>,
}

impl DatasetPatch {
    #[must_use]
    pub fn products<I, P>(products: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<ProductDraft>,
    {
        Self {
            products: Some(products.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn users<I, U>(users: I) -> Self
    where
        I: IntoIterator<Item = U>,
        U: Into<UserDraft>,
    {
        Self {
            users: Some(users.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_activity(mut self, activity: Vec<ActivityEntry>) -> Self {
        self.activity = Some(activity);
        self
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.products.is_none() && self.users.is_none() && self.activity.is_none()
    }
}

/// An activity entry before it has been given an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewActivity {
    pub entity_type: &'static str,
    pub action: &'static str,
    pub entity_id: String,
    pub message: String,
}

impl Dataset {
    /// Normalises a raw blob. Missing product or user collections are seeded,
    /// and the admin rule is enforced.
    #[must_use]
    pub fn from_raw(raw: RawDataset, seed: &[ProductDraft], now: DateTime<Utc>) -> Self {
        let products = if raw.products.is_empty() {
            normalize::normalize_products(seed.iter().cloned(), now)
        } else {
            normalize::normalize_products(raw.products, now)
        };

        Self {
            products,
            users: normalize::normalize_users(raw.users, now),
            activity: raw.activity,
            orders: raw.orders,
            order_items: raw.order_items,
        }
    }

    /// Builds the next snapshot from this one and a patch.
    #[must_use]
    pub fn merged(&self, patch: DatasetPatch, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        if let Some(products) = patch.products {
            next.products = normalize::normalize_products(products, now);
        }
        if let Some(users) = patch.users {
            next.users = normalize::normalize_users(users, now);
        }
        if let Some(activity) = patch.activity {
            next.activity = activity;
        }
        next
    }

    /// Products with `status = active`, in catalog order.
    #[must_use]
    pub fn active_products(&self) -> Vec<ProductModel> {
        self.products
            .iter()
            .filter(|p| p.is_active())
            .cloned()
            .collect()
    }

    /// Any product, active or not.
    #[must_use]
    pub fn product(&self, id: &str) -> Option<&ProductModel> {
        self.products.iter().find(|p| p.id == id)
    }

    #[must_use]
    pub fn user_by_id(&self, id: &str) -> Option<&UserModel> {
        self.users.iter().find(|u| u.id == id)
    }

    /// Case-insensitive email lookup.
    #[must_use]
    pub fn user_by_email(&self, email: &str) -> Option<&UserModel> {
        self.users.iter().find(|u| u.has_email(email))
    }

    #[must_use]
    pub fn items_of(&self, order_id: &str) -> Vec<OrderItemModel> {
        self.order_items
            .iter()
            .filter(|item| item.order_id == order_id)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn next_activity_id(&self) -> i32 {
        self.activity.iter().map(|a| a.id).max().unwrap_or(0) + 1
    }

    /// Gives `entry` the next activity id.
    #[must_use]
    pub fn activity_entry(&self, entry: NewActivity, now: DateTime<Utc>) -> ActivityEntry {
        ActivityEntry {
            id: self.next_activity_id(),
            entity_type: entry.entity_type.to_string(),
            action: entry.action.to_string(),
            entity_id: entry.entity_id,
            message: entry.message,
            created_at: now,
        }
    }

    /// The current activity log followed by `entry`.
    #[must_use]
    pub fn activity_with(&self, entry: NewActivity, now: DateTime<Utc>) -> Vec<ActivityEntry> {
        let mut activity = self.activity.clone();
        activity.push(self.activity_entry(entry, now));
        activity
    }
}
