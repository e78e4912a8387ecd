//! Shared test utilities for the storefront.
//!
//! This module provides helpers for opening in-memory stores, booting
//! coordinators ("tabs") against them, and building records with sensible
//! defaults.

use crate::{
    core::{
        coordinator::PersistenceCoordinator,
        payment::{MockPaymentGateway, PaymentGateway},
        sync::SyncChannel,
        validation::CheckoutForm,
    },
    entities::{
        Customer, OrderItemModel, OrderModel, OrderStatus, Payment, ProductModel, ProductStatus,
        Totals, UserModel, UserRole, UserStatus, order_item,
    },
    errors::Result,
    storage::{MemoryStore, StoreSource},
};
use chrono::Utc;
use sea_orm::{ConnectOptions, Database};
use std::{sync::Arc, time::Duration};
use tracing_subscriber::EnvFilter;

pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Opens an empty in-memory `SQLite` store.
///
/// The pool is pinned to one connection: every connection to `sqlite::memory:`
/// is a separate database, and clones of the source must see the same data.
pub async fn memory_source() -> Result<StoreSource> {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);
    let db = Database::connect(options).await?;
    Ok(StoreSource::Connection(db))
}

/// Boots a coordinator on the structured store in `source`.
pub async fn structured_tab(
    source: &StoreSource,
    flat: &MemoryStore,
    channel: &SyncChannel,
) -> Result<Arc<PersistenceCoordinator>> {
    let coordinator = PersistenceCoordinator::new(Arc::new(flat.clone()), source.clone(), channel);
    coordinator.initialize().await?;
    Ok(Arc::new(coordinator))
}

/// Boots a coordinator with no structured store, so it runs on flat storage.
pub async fn flat_tab(
    flat: &MemoryStore,
    channel: &SyncChannel,
) -> Result<Arc<PersistenceCoordinator>> {
    structured_tab(&StoreSource::Unavailable, flat, channel).await
}

/// A gateway that answers immediately and never declines.
pub fn instant_gateway() -> Arc<dyn PaymentGateway> {
    Arc::new(MockPaymentGateway::new(Duration::ZERO, 0.0))
}

/// `clean-code` -> `Clean code`
fn title_of(id: &str) -> String {
    let words = id.replace('-', " ");
    let mut chars = words.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

/// Creates an active product with sensible defaults.
///
/// # Defaults
/// * title: derived from the id
/// * genre: "fiction"
/// * no promotion
pub fn sample_product(id: &str, price: f64) -> ProductModel {
    let now = Utc::now();
    ProductModel {
        id: id.to_string(),
        title: title_of(id),
        author: "Test Author".to_string(),
        genre: "fiction".to_string(),
        price,
        cover: format!("assets/images/{id}.png"),
        format: "Paperback".to_string(),
        pages: 200,
        isbn: String::new(),
        description: String::new(),
        status: ProductStatus::Active,
        bf_deal: false,
        bf_discount: 0.0,
        created_at: now,
        updated_at: now,
    }
}

/// Creates an active `user` account with password "secret".
pub fn sample_user(id: &str, email: &str) -> UserModel {
    let now = Utc::now();
    UserModel {
        id: id.to_string(),
        name: title_of(id),
        email: email.to_string(),
        password: "secret".to_string(),
        role: UserRole::User,
        status: UserStatus::Active,
        created_at: now,
        updated_at: now,
    }
}

/// Creates a paid order and its lines.
///
/// `lines` are `(book id, unit price, qty)`. The customer email is
/// "reader@example.com", shipping and tax are zero.
pub fn sample_order(
    id: &str,
    user_id: Option<&str>,
    lines: &[(&str, f64, i32)],
) -> (OrderModel, Vec<OrderItemModel>) {
    let now = Utc::now();
    let items: Vec<OrderItemModel> = lines
        .iter()
        .enumerate()
        .map(|(position, &(book_id, price, qty))| OrderItemModel {
            id: order_item::line_id(id, book_id, position),
            order_id: id.to_string(),
            book_id: book_id.to_string(),
            title: title_of(book_id),
            price,
            qty,
            subtotal: price * f64::from(qty),
            created_at: now,
        })
        .collect();
    let subtotal: f64 = items.iter().map(|item| item.subtotal).sum();

    let order = OrderModel {
        id: id.to_string(),
        user_id: user_id.map(ToString::to_string),
        status: OrderStatus::Paid,
        created_at: now,
        updated_at: now,
        customer: Customer {
            full_name: "Ana Reader".to_string(),
            email: "reader@example.com".to_string(),
            phone: "+1 555 010 2030".to_string(),
            address: "1 Library Lane".to_string(),
            city: "Springfield".to_string(),
            zip: "12345".to_string(),
        },
        totals: Totals {
            subtotal,
            shipping: 0.0,
            tax: 0.0,
            total: subtotal,
        },
        payment: Payment {
            tx_id: format!("TX-{id}"),
            provider: "PaymentGatewayMock".to_string(),
        },
    };
    (order, items)
}

/// A checkout form that passes validation.
pub fn sample_checkout_form() -> CheckoutForm {
    CheckoutForm {
        full_name: "Ana Reader".to_string(),
        email: "reader@example.com".to_string(),
        phone: "+1 (555) 010-2030".to_string(),
        address: "1 Library Lane".to_string(),
        city: "Springfield".to_string(),
        zip: "12345".to_string(),
        card: "4242 4242 4242 4242".to_string(),
        expiry: "12/29".to_string(),
        cvc: "123".to_string(),
    }
}
