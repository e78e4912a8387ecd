//! Cross-tab synchronisation.
//!
//! Sessions that share device storage also share one [`SyncChannel`]. A
//! session announces "collection X changed" after a successful structured
//! store write; every other session re-reads X from the structured store and
//! re-emits its local signal. Messages carry no payload, so handling the same
//! message twice is harmless.

use crate::core::coordinator::PersistenceCoordinator;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Which collection changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SyncKind {
    #[serde(rename = "books:updated", alias = "products:updated")]
    Products,
    #[serde(rename = "users:updated")]
    Users,
    #[serde(rename = "orders:updated")]
    Orders,
}

impl SyncKind {
    pub const ALL: [Self; 3] = [Self::Products, Self::Users, Self::Orders];
}

/// One announcement on the channel, `{"type": "books:updated"}` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMessage {
    /// Session that sent the message; receivers skip their own.
    #[serde(default)]
    pub origin: u64,
    #[serde(flatten)]
    pub kind: SyncKind,
}

/// The well-known channel shared by every session of one device.
#[derive(Debug, Clone)]
pub struct SyncChannel {
    sender: broadcast::Sender<SyncMessage>,
    next_origin: Arc<AtomicU64>,
}

impl SyncChannel {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            next_origin: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Joins the channel as a new session.
    #[must_use]
    pub fn connect(&self) -> SyncPort {
        SyncPort {
            sender: self.sender.clone(),
            origin: self.next_origin.fetch_add(1, Ordering::Relaxed),
        }
    }
}

/// A session's end of the [`SyncChannel`].
#[derive(Debug, Clone)]
pub struct SyncPort {
    sender: broadcast::Sender<SyncMessage>,
    origin: u64,
}

impl SyncPort {
    #[must_use]
    pub const fn origin(&self) -> u64 {
        self.origin
    }

    /// Fire-and-forget announcement.
    pub fn post(&self, kind: SyncKind) {
        let message = SyncMessage {
            origin: self.origin,
            kind,
        };
        if self.sender.send(message).is_err() {
            debug!(?kind, "No other session is listening");
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SyncMessage> {
        self.sender.subscribe()
    }
}

/// Applies messages from other sessions to one coordinator.
#[derive(Debug)]
pub struct SyncListener {
    coordinator: Arc<PersistenceCoordinator>,
    receiver: broadcast::Receiver<SyncMessage>,
    origin: u64,
}

impl SyncListener {
    /// Starts listening. Messages sent before this call are not seen.
    #[must_use]
    pub fn new(coordinator: Arc<PersistenceCoordinator>) -> Self {
        let port = coordinator.sync_port();
        Self {
            receiver: port.subscribe(),
            origin: port.origin(),
            coordinator,
        }
    }

    /// Waits for the next foreign message and applies it. Returns `None` once
    /// the channel is closed.
    ///
    /// Refresh failures are logged; the listener keeps going.
    pub async fn next(&mut self) -> Option<SyncKind> {
        loop {
            let message = match self.receiver.recv().await {
                Ok(message) => message,
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Sync listener lagged, refreshing every collection");
                    for kind in SyncKind::ALL {
                        self.refresh(kind).await;
                    }
                    continue;
                }
            };

            if message.origin == self.origin {
                continue;
            }
            self.refresh(message.kind).await;
            return Some(message.kind);
        }
    }

    async fn refresh(&self, kind: SyncKind) {
        if let Err(e) = self.coordinator.apply_remote(kind).await {
            warn!(?kind, error = %e, "Failed to refresh collection from structured store");
        }
    }

    pub async fn run(mut self) {
        while let Some(kind) = self.next().await {
            debug!(?kind, "Applied cross-tab update");
        }
        info!("Sync channel closed, listener stopped");
    }

    #[must_use]
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::dataset::DatasetPatch;
    use crate::entities::ProductStatus;
    use crate::errors::Result;
    use crate::storage::MemoryStore;
    use crate::test_utils::{memory_source, structured_tab};
    use std::time::Duration;

    #[test]
    fn test_message_wire_format() {
        let message = SyncMessage {
            origin: 3,
            kind: SyncKind::Products,
        };
        let json = serde_json::to_value(message).unwrap();
        assert_eq!(json["type"], "books:updated");

        let legacy: SyncMessage = serde_json::from_str(r#"{"type":"products:updated"}"#).unwrap();
        assert_eq!(legacy.kind, SyncKind::Products);
        assert_eq!(legacy.origin, 0);

        let orders: SyncMessage = serde_json::from_str(r#"{"type":"orders:updated"}"#).unwrap();
        assert_eq!(orders.kind, SyncKind::Orders);
    }

    #[tokio::test]
    async fn test_ports_get_distinct_origins() {
        let channel = SyncChannel::new(8);
        let tab_a = channel.connect();
        let tab_b = channel.connect();
        assert_ne!(tab_a.origin(), tab_b.origin());

        let mut inbox = tab_b.subscribe();
        tab_a.post(SyncKind::Users);
        let received = inbox.recv().await.unwrap();
        assert_eq!(received.origin, tab_a.origin());
        assert_eq!(received.kind, SyncKind::Users);
    }

    #[tokio::test]
    async fn test_two_tabs_converge_on_products() -> Result<()> {
        let source = memory_source().await?;
        let flat = MemoryStore::new();
        let channel = SyncChannel::new(8);
        let tab_a = structured_tab(&source, &flat, &channel).await?;
        let tab_b = structured_tab(&source, &flat, &channel).await?;
        let mut listener_a = SyncListener::new(Arc::clone(&tab_a));
        let mut listener_b = SyncListener::new(Arc::clone(&tab_b));

        let mut products = tab_a.snapshot().await.products.clone();
        products[0].status = ProductStatus::Inactive;
        tab_a.save(DatasetPatch::products(products)).await?;

        assert_eq!(listener_b.next().await, Some(SyncKind::Products));
        assert_eq!(tab_b.active_products().await.len(), 5);

        // The sender ignores its own message.
        let own = tokio::time::timeout(Duration::from_millis(50), listener_a.next()).await;
        assert!(own.is_err());
        Ok(())
    }
}
