//! Local change signals for collaborators inside one session.
//!
//! Each owning component (coordinator, cart, session gate) emits on an
//! [`EventHub`]; listeners hold a `broadcast::Receiver` and get every signal
//! sent after they subscribed. Payloads are shared snapshots, so listeners
//! must re-read instead of keeping them across signals.

use crate::core::cart::CartItem;
use crate::core::dataset::Dataset;
use crate::entities::{OrderModel, ProductModel, UserModel};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;

const DEFAULT_CAPACITY: usize = 64;

/// Why the current user changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthChangeReason {
    Login,
    ManualLogout,
    /// The session pointed at a user that no longer exists.
    UserMissing,
    /// The session's user was deactivated.
    UserInactive,
    ProfileUpdated,
}

#[derive(Debug, Clone)]
pub enum Signal {
    /// Initial load finished. Sent exactly once per coordinator.
    DataReady(Arc<Dataset>),
    /// The active products view changed.
    ProductsUpdated(Arc<Vec<ProductModel>>),
    UsersUpdated(Arc<Vec<UserModel>>),
    OrdersUpdated(Arc<Vec<OrderModel>>),
    CartUpdated(Arc<Vec<CartItem>>),
    AuthChanged {
        user: Option<UserModel>,
        reason: AuthChangeReason,
    },
}

impl Signal {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::DataReady(_) => "data:ready",
            Self::ProductsUpdated(_) => "products:updated",
            Self::UsersUpdated(_) => "users:updated",
            Self::OrdersUpdated(_) => "orders:updated",
            Self::CartUpdated(_) => "cart:updated",
            Self::AuthChanged { .. } => "auth:changed",
        }
    }
}

/// Fan-out of [`Signal`]s to any number of subscribers.
#[derive(Debug, Clone)]
pub struct EventHub {
    sender: broadcast::Sender<Signal>,
}

impl Default for EventHub {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl EventHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Sends `signal` to current subscribers. Having none is not an error.
    pub fn emit(&self, signal: Signal) {
        let name = signal.name();
        match self.sender.send(signal) {
            Ok(receivers) => trace!(signal = name, receivers, "Signal emitted"),
            Err(_) => trace!(signal = name, "Signal emitted with no listeners"),
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Signal> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_signals() {
        let hub = EventHub::new();
        hub.emit(Signal::UsersUpdated(Arc::new(Vec::new())));

        let mut first = hub.subscribe();
        let mut second = hub.subscribe();
        hub.emit(Signal::CartUpdated(Arc::new(Vec::new())));

        assert!(matches!(first.recv().await, Ok(Signal::CartUpdated(_))));
        assert!(matches!(second.recv().await, Ok(Signal::CartUpdated(_))));
        assert!(first.try_recv().is_err());
    }
}
