//! Checkout: quote, validate, pay, record.
//!
//! An order is only written after the payment step succeeds. Any failure
//! (validation, invalid amount, decline) leaves the cart and the stored
//! orders exactly as they were.

use crate::config::CheckoutConfig;
use crate::core::cart::Cart;
use crate::core::coordinator::PersistenceCoordinator;
use crate::core::dataset::NewActivity;
use crate::core::payment::PaymentGateway;
use crate::core::validation::CheckoutForm;
use crate::entities::{
    Customer, OrderItemModel, OrderModel, OrderStatus, Payment, Totals, UserModel, order_item,
};
use crate::errors::{Error, FieldErrors, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::{info, instrument, warn};

/// Last millisecond used for an order id, shared by every engine in the
/// process so ids stay unique.
static LAST_ORDER_MILLIS: AtomicI64 = AtomicI64::new(0);

#[must_use]
pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

/// Time-derived order id `DL-<millis in base 36>`, unique within the process.
#[must_use]
pub fn next_order_id(now: DateTime<Utc>) -> String {
    let wanted = now.timestamp_millis();
    let mut last = LAST_ORDER_MILLIS.load(Ordering::Relaxed);
    loop {
        let next = wanted.max(last + 1);
        match LAST_ORDER_MILLIS.compare_exchange_weak(
            last,
            next,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => return format!("DL-{}", to_base36(u64::try_from(next).unwrap_or(0))),
            Err(current) => last = current,
        }
    }
}

/// One priced line of a quote.
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteLine {
    pub id: String,
    pub title: String,
    pub price: f64,
    pub qty: u32,
    pub subtotal: f64,
}

/// Order preview computed from the cart.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub lines: Vec<QuoteLine>,
    pub totals: Totals,
}

/// What the shopper gets back after a successful checkout.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderReceipt {
    pub order: OrderModel,
    pub items: Vec<OrderItemModel>,
}

impl OrderReceipt {
    #[must_use]
    pub fn tx_id(&self) -> &str {
        &self.order.payment.tx_id
    }
}

#[derive(Debug)]
pub struct CheckoutEngine {
    coordinator: Arc<PersistenceCoordinator>,
    gateway: Arc<dyn PaymentGateway>,
    config: CheckoutConfig,
}

impl CheckoutEngine {
    #[must_use]
    pub fn new(
        coordinator: Arc<PersistenceCoordinator>,
        gateway: Arc<dyn PaymentGateway>,
        config: CheckoutConfig,
    ) -> Self {
        Self {
            coordinator,
            gateway,
            config,
        }
    }

    /// Prices the cart: subtotal from the locked line prices, tax rounded to
    /// cents, flat shipping.
    #[must_use]
    pub fn quote(&self, cart: &Cart) -> Quote {
        let lines: Vec<QuoteLine> = cart
            .items()
            .iter()
            .map(|item| QuoteLine {
                id: item.id.clone(),
                title: item.title.clone(),
                price: item.price,
                qty: item.qty,
                subtotal: item.subtotal(),
            })
            .collect();

        let subtotal: f64 = lines.iter().map(|line| line.subtotal).sum();
        let tax = round_cents(subtotal * self.config.tax_rate);
        let shipping = self.config.shipping;
        let total = subtotal + shipping + tax;

        Quote {
            lines,
            totals: Totals {
                subtotal: round_cents(subtotal),
                shipping: round_cents(shipping),
                tax,
                total: round_cents(total),
            },
        }
    }

    /// Validates the form, charges the quoted total, records the order and
    /// empties the cart.
    ///
    /// # Errors
    /// `Error::Validation` (including an empty cart), `Error::InvalidAmount`
    /// or `Error::PaymentDeclined`; the cart is kept in each case.
    #[instrument(skip_all, fields(lines = cart.items().len()))]
    pub async fn submit(
        &self,
        cart: &mut Cart,
        form: &CheckoutForm,
        user: Option<&UserModel>,
    ) -> Result<OrderReceipt> {
        if cart.is_empty() {
            let mut errors = FieldErrors::new();
            errors.add("cart", "Your cart is empty");
            return Err(Error::Validation(errors));
        }
        let form = form.validated()?;
        let quote = self.quote(cart);

        let receipt = self
            .gateway
            .pay(quote.totals.total)
            .await
            .inspect_err(|e| warn!(error = %e, "Checkout payment failed, cart kept"))?;

        let now = Utc::now();
        let order_id = next_order_id(now);
        let items: Vec<OrderItemModel> = quote
            .lines
            .iter()
            .enumerate()
            .map(|(position, line)| OrderItemModel {
                id: order_item::line_id(&order_id, &line.id, position),
                order_id: order_id.clone(),
                book_id: line.id.clone(),
                title: line.title.clone(),
                price: line.price,
                qty: i32::try_from(line.qty).unwrap_or(i32::MAX),
                subtotal: round_cents(line.subtotal),
                created_at: now,
            })
            .collect();

        let order = OrderModel {
            id: order_id.clone(),
            user_id: user.map(|u| u.id.clone()),
            status: OrderStatus::Paid,
            created_at: now,
            updated_at: now,
            customer: Customer {
                full_name: form.full_name,
                email: form.email,
                phone: form.phone,
                address: form.address,
                city: form.city,
                zip: form.zip,
            },
            totals: quote.totals,
            payment: Payment {
                tx_id: receipt.tx_id,
                provider: receipt.provider,
            },
        };

        let activity = NewActivity {
            entity_type: "order",
            action: "create",
            entity_id: order_id.clone(),
            message: format!("Order {order_id} paid: ${:.2}", quote.totals.total),
        };
        self.coordinator
            .record_order(order.clone(), items.clone(), activity)
            .await?;
        cart.clear()?;

        info!(%order_id, total = quote.totals.total, "Order placed");
        Ok(OrderReceipt { order, items })
    }
}
