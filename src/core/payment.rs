//! Payment step of checkout.
//!
//! There is no real payment processing. [`MockPaymentGateway`] waits a fixed
//! delay, rejects non-positive amounts and declines a configurable share of
//! the remaining calls at random.

use crate::config::PaymentConfig;
use crate::errors::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;
use tracing::{debug, warn};

/// Provider name recorded on every order paid through the mock.
pub const MOCK_PROVIDER: &str = "PaymentGatewayMock";

/// Successful payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentReceipt {
    pub tx_id: String,
    pub provider: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync + std::fmt::Debug {
    /// Charges `amount`.
    ///
    /// # Errors
    /// `Error::InvalidAmount` for `amount <= 0`, `Error::PaymentDeclined` when
    /// the charge is refused.
    async fn pay(&self, amount: f64) -> Result<PaymentReceipt>;
}

#[derive(Debug, Clone)]
pub struct MockPaymentGateway {
    delay: Duration,
    decline_rate: f64,
}

impl MockPaymentGateway {
    #[must_use]
    pub fn new(delay: Duration, decline_rate: f64) -> Self {
        Self {
            delay,
            decline_rate: decline_rate.clamp(0.0, 1.0),
        }
    }
}

impl From<&PaymentConfig> for MockPaymentGateway {
    fn from(config: &PaymentConfig) -> Self {
        Self::new(config.delay(), config.decline_rate)
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn pay(&self, amount: f64) -> Result<PaymentReceipt> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if amount.is_nan() || amount <= 0.0 {
            warn!(amount, "Payment rejected: invalid amount");
            return Err(Error::InvalidAmount { amount });
        }
        if rand::random::<f64>() < self.decline_rate {
            warn!(amount, "Payment declined");
            return Err(Error::PaymentDeclined {
                reason: "Payment declined".to_string(),
            });
        }

        let tx_id = format!("TX{}", Utc::now().timestamp_millis());
        debug!(amount, %tx_id, "Payment accepted");
        Ok(PaymentReceipt {
            tx_id,
            provider: MOCK_PROVIDER.to_string(),
        })
    }
}
