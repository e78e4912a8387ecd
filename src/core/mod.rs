/// Identity and session gate
pub mod auth;
/// Shopping cart engine
pub mod cart;
/// Catalog browsing: filtering, genres and price ceiling
pub mod catalog;
/// Order placement
pub mod checkout;
/// Persistence coordinator and backend selection
pub mod coordinator;
/// In-memory dataset and partial updates
pub mod dataset;
/// Local change signals
pub mod events;
/// Purchase history queries
pub mod history;
/// Record normalization and the admin rule
pub mod normalize;
/// Payment gateway
pub mod payment;
/// Cross-session change notification
pub mod sync;
/// Form validation
pub mod validation;

pub use auth::SessionGate;
pub use cart::{Cart, CartItem, CartLine};
pub use checkout::{CheckoutEngine, OrderReceipt, Quote};
pub use coordinator::{BackendKind, PersistenceCoordinator, StoreStats};
pub use dataset::{Dataset, DatasetPatch};
pub use events::{AuthChangeReason, EventHub, Signal};
pub use history::{OrderQuery, OrderSort, OrderWithItems};
pub use payment::{MockPaymentGateway, PaymentGateway, PaymentReceipt};
pub use sync::{SyncChannel, SyncKind, SyncListener};
