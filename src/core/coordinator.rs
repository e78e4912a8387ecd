//! Persistence coordinator - the single owner of products, users, activity
//! and orders.
//!
//! The backend is chosen once, by [`PersistenceCoordinator::initialize`]: the
//! structured store if it opens and loads cleanly, flat storage otherwise.
//! Whatever the backend, the full dataset is written to flat storage after
//! every change as a durability backstop. Readers get `Arc` snapshots that are
//! replaced, never mutated, on each change.

use crate::config::{AppConfig, seed};
use crate::core::dataset::{Dataset, DatasetPatch, NewActivity, RawDataset};
use crate::core::events::{EventHub, Signal};
use crate::core::history::OrderWithItems;
use crate::core::normalize::{self, ProductDraft, UserDraft};
use crate::core::sync::{SyncChannel, SyncKind, SyncPort};
use crate::entities::{
    Activity, Order, OrderItem, OrderItemModel, OrderModel, Product, ProductModel, User,
    UserModel, order, order_item,
};
use crate::errors::{Error, Result};
use crate::storage::flat::{self, DATA_KEY, KeyValueStore};
use crate::storage::{StoreSource, StructuredStore};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info, instrument, warn};

/// Backend selected at startup for the rest of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Structured,
    Flat,
}

#[derive(Debug)]
enum Backend {
    Structured(StructuredStore),
    Flat,
}

impl Backend {
    const fn kind(&self) -> BackendKind {
        match self {
            Self::Structured(_) => BackendKind::Structured,
            Self::Flat => BackendKind::Flat,
        }
    }
}

#[derive(Debug, Default)]
struct Snapshot {
    dataset: Arc<Dataset>,
    active_products: Arc<Vec<ProductModel>>,
}

impl Snapshot {
    fn new(dataset: Arc<Dataset>) -> Self {
        let active_products = Arc::new(dataset.active_products());
        Self {
            dataset,
            active_products,
        }
    }
}

/// Record counts shown on the admin dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub books: u64,
    pub users: u64,
    pub orders: u64,
}

#[derive(Debug)]
pub struct PersistenceCoordinator {
    flat: Arc<dyn KeyValueStore>,
    source: StoreSource,
    seed: Vec<ProductDraft>,
    sync: SyncPort,
    events: EventHub,
    backend: OnceCell<Backend>,
    state: RwLock<Snapshot>,
}

impl PersistenceCoordinator {
    /// Creates an uninitialised coordinator seeded with the built-in catalog.
    #[must_use]
    pub fn new(flat: Arc<dyn KeyValueStore>, source: StoreSource, channel: &SyncChannel) -> Self {
        Self {
            flat,
            source,
            seed: seed::default_catalog(),
            sync: channel.connect(),
            events: EventHub::new(),
            backend: OnceCell::new(),
            state: RwLock::new(Snapshot::default()),
        }
    }

    /// Builds a coordinator from settings: structured store URL, seed
    /// catalog file and signal capacity.
    ///
    /// # Errors
    /// Returns `Error::Config` when `catalog_path` is set but unreadable.
    pub fn from_config(
        config: &AppConfig,
        flat: Arc<dyn KeyValueStore>,
        channel: &SyncChannel,
    ) -> Result<Self> {
        let seed = match &config.catalog_path {
            Some(path) => seed::load_catalog(path)?,
            None => seed::default_catalog(),
        };
        let source = StoreSource::from_url(config.storage.database_url.clone());

        Ok(Self::new(flat, source, channel)
            .with_seed(seed)
            .with_events(EventHub::with_capacity(config.sync.channel_capacity)))
    }

    #[must_use]
    pub fn with_seed(mut self, seed: Vec<ProductDraft>) -> Self {
        self.seed = seed;
        self
    }

    #[must_use]
    pub fn with_events(mut self, events: EventHub) -> Self {
        self.events = events;
        self
    }

    #[must_use]
    pub const fn events(&self) -> &EventHub {
        &self.events
    }

    #[must_use]
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Signal> {
        self.events.subscribe()
    }

    #[must_use]
    pub fn sync_port(&self) -> SyncPort {
        self.sync.clone()
    }

    #[must_use]
    pub fn flat_storage(&self) -> Arc<dyn KeyValueStore> {
        Arc::clone(&self.flat)
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.backend.initialized()
    }

    #[must_use]
    pub fn backend(&self) -> Option<BackendKind> {
        self.backend.get().map(Backend::kind)
    }

    fn active_backend(&self) -> Result<&Backend> {
        self.backend.get().ok_or(Error::NotInitialized)
    }

    /// Loads the dataset and selects the backend. Calling it again returns the
    /// current snapshot without reloading; `DataReady` is emitted once.
    ///
    /// # Errors
    /// Only flat-storage I/O failures are returned. Structured store failures
    /// cause the fallback instead.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> Result<Arc<Dataset>> {
        self.backend.get_or_try_init(|| self.boot()).await?;
        Ok(self.snapshot().await)
    }

    async fn boot(&self) -> Result<Backend> {
        let now = Utc::now();
        let (backend, dataset) = match self.load_structured(now).await {
            Ok((store, dataset)) => (Backend::Structured(store), dataset),
            Err(e) => {
                warn!(error = %e, "Structured store unusable, falling back to flat storage");
                (Backend::Flat, self.load_flat(now)?)
            }
        };

        self.write_backstop(&dataset)?;
        let dataset = Arc::new(dataset);
        *self.state.write().await = Snapshot::new(Arc::clone(&dataset));

        info!(
            backend = ?backend.kind(),
            products = dataset.products.len(),
            users = dataset.users.len(),
            orders = dataset.orders.len(),
            "Data layer ready"
        );
        self.events.emit(Signal::DataReady(dataset));
        Ok(backend)
    }

    async fn load_structured(&self, now: DateTime<Utc>) -> Result<(StructuredStore, Dataset)> {
        let store = StructuredStore::open(&self.source).await?;

        let stored = store.get_all(Product).await?;
        let products = if stored.is_empty() {
            let seeded = normalize::normalize_products(self.seed.iter().cloned(), now);
            store.put_many(Product, seeded.clone()).await?;
            info!(count = seeded.len(), "Seeded catalog into structured store");
            seeded
        } else {
            normalize::normalize_products(stored.into_iter().map(ProductDraft::from), now)
        };

        let mut users = store.get_all(User).await?;
        if users.is_empty() {
            users = vec![normalize::normalize_user(seed::default_admin(), now)];
            store.put_many(User, users.clone()).await?;
            info!("Seeded default administrator into structured store");
        } else if normalize::ensure_admin(&mut users, now) {
            store.put_many(User, users.clone()).await?;
        }

        let mut activity = store.get_all(Activity).await?;
        activity.sort_by_key(|entry| entry.id);
        let mut orders = store.get_all(Order).await?;
        orders.sort_by_key(|order| order.created_at);
        let order_items = store.get_all(OrderItem).await?;

        let dataset = Dataset {
            products,
            users,
            activity,
            orders,
            order_items,
        };
        Ok((store, dataset))
    }

    fn load_flat(&self, now: DateTime<Utc>) -> Result<Dataset> {
        let raw: RawDataset =
            flat::load_json_or_reset(self.flat.as_ref(), DATA_KEY)?.unwrap_or_default();
        Ok(Dataset::from_raw(raw, &self.seed, now))
    }

    fn write_backstop(&self, dataset: &Dataset) -> Result<()> {
        flat::save_json(self.flat.as_ref(), DATA_KEY, dataset)
    }

    async fn replace_snapshot<F>(&self, change: F) -> Arc<Dataset>
    where
        F: FnOnce(&mut Dataset),
    {
        let mut state = self.state.write().await;
        let mut next = (*state.dataset).clone();
        change(&mut next);
        let next = Arc::new(next);
        *state = Snapshot::new(Arc::clone(&next));
        next
    }

    /// The full dataset, inactive products included.
    pub async fn snapshot(&self) -> Arc<Dataset> {
        Arc::clone(&self.state.read().await.dataset)
    }

    /// Products with `status = active`.
    pub async fn active_products(&self) -> Arc<Vec<ProductModel>> {
        Arc::clone(&self.state.read().await.active_products)
    }

    /// Any product by id, for historical order display.
    pub async fn product(&self, id: &str) -> Option<ProductModel> {
        self.state.read().await.dataset.product(id).cloned()
    }

    /// A product visible to the catalog and the cart.
    pub async fn active_product(&self, id: &str) -> Option<ProductModel> {
        self.state
            .read()
            .await
            .active_products
            .iter()
            .find(|p| p.id == id)
            .cloned()
    }

    /// Like [`Self::active_product`], for callers that need the product.
    ///
    /// # Errors
    /// `Error::ProductNotFound` when the id is unknown or inactive.
    pub async fn require_active_product(&self, id: &str) -> Result<ProductModel> {
        self.active_product(id)
            .await
            .ok_or_else(|| Error::ProductNotFound { id: id.to_string() })
    }

    pub async fn users(&self) -> Vec<UserModel> {
        self.state.read().await.dataset.users.clone()
    }

    pub async fn user_by_id(&self, id: &str) -> Option<UserModel> {
        self.state.read().await.dataset.user_by_id(id).cloned()
    }

    pub async fn user_by_email(&self, email: &str) -> Option<UserModel> {
        self.state.read().await.dataset.user_by_email(email).cloned()
    }

    pub async fn orders(&self) -> Vec<OrderModel> {
        self.state.read().await.dataset.orders.clone()
    }

    /// The single write entry point for products, users and activity.
    ///
    /// Present collections replace the snapshot's; users are re-normalised
    /// and the admin rule re-applied. Under the structured backend only the
    /// patched collections are rewritten, and failures there are logged, not
    /// returned. The flat backstop write always happens.
    ///
    /// # Errors
    /// Returns `Error::NotInitialized` before [`Self::initialize`], or a flat
    /// storage error.
    #[instrument(skip_all, fields(
        products = patch.products.is_some(),
        users = patch.users.is_some(),
        activity = patch.activity.is_some(),
    ))]
    pub async fn save(&self, patch: DatasetPatch) -> Result<Arc<Dataset>> {
        let backend = self.active_backend()?;
        let has_products = patch.products.is_some();
        let has_users = patch.users.is_some();
        let has_activity = patch.activity.is_some();

        let now = Utc::now();
        let next = {
            let mut state = self.state.write().await;
            let next = Arc::new(state.dataset.merged(patch, now));
            *state = Snapshot::new(Arc::clone(&next));
            next
        };

        if let Backend::Structured(store) = backend {
            if has_products {
                match store.replace_all(Product, next.products.clone()).await {
                    Ok(()) => self.sync.post(SyncKind::Products),
                    Err(e) => warn!(error = %e, "Products not written to structured store"),
                }
            }
            if has_users {
                match store.replace_all(User, next.users.clone()).await {
                    Ok(()) => self.sync.post(SyncKind::Users),
                    Err(e) => warn!(error = %e, "Users not written to structured store"),
                }
            }
            if has_activity {
                if let Err(e) = store.replace_all(Activity, next.activity.clone()).await {
                    warn!(error = %e, "Activity not written to structured store");
                }
            }
        }

        self.write_backstop(&next)?;

        if has_products {
            let active = self.active_products().await;
            self.events.emit(Signal::ProductsUpdated(active));
        }
        if has_users {
            self.events
                .emit(Signal::UsersUpdated(Arc::new(next.users.clone())));
        }
        Ok(next)
    }

    /// Appends a paid order, its lines and an activity entry.
    ///
    /// Orders never go through [`Self::save`]; they are put directly and
    /// announced as `orders:updated`.
    #[instrument(skip_all, fields(order_id = %order.id, items = items.len()))]
    pub async fn record_order(
        &self,
        order: OrderModel,
        items: Vec<OrderItemModel>,
        activity: NewActivity,
    ) -> Result<()> {
        let backend = self.active_backend()?;
        let now = Utc::now();

        let mut entry = None;
        let next = self
            .replace_snapshot(|dataset| {
                let logged = dataset.activity_entry(activity, now);
                dataset.activity.push(logged.clone());
                entry = Some(logged);
                dataset.orders.push(order.clone());
                dataset.order_items.extend(items.iter().cloned());
            })
            .await;

        if let Backend::Structured(store) = backend {
            let written = async {
                store.put_one(Order, order).await?;
                store.put_many(OrderItem, items).await
            }
            .await;
            match written {
                Ok(()) => self.sync.post(SyncKind::Orders),
                Err(e) => warn!(error = %e, "Order not written to structured store"),
            }
            if let Some(entry) = entry {
                if let Err(e) = store.put_one(Activity, entry).await {
                    warn!(error = %e, "Order activity not written to structured store");
                }
            }
        }

        self.write_backstop(&next)?;
        self.events
            .emit(Signal::OrdersUpdated(Arc::new(next.orders.clone())));
        Ok(())
    }

    /// Re-reads one collection from the structured store after another
    /// session announced a change, then emits the matching signal.
    ///
    /// Under the flat backend there is nothing authoritative to re-read and
    /// the call is a no-op.
    #[instrument(skip(self))]
    pub async fn apply_remote(&self, kind: SyncKind) -> Result<()> {
        let Backend::Structured(store) = self.active_backend()? else {
            debug!("Flat backend, ignoring cross-tab update");
            return Ok(());
        };
        let now = Utc::now();

        match kind {
            SyncKind::Products => {
                let stored = store.get_all(Product).await?;
                let products =
                    normalize::normalize_products(stored.into_iter().map(ProductDraft::from), now);
                self.replace_snapshot(|dataset| dataset.products = products)
                    .await;
                let active = self.active_products().await;
                self.events.emit(Signal::ProductsUpdated(active));
            }
            SyncKind::Users => {
                let stored = store.get_all(User).await?;
                let users =
                    normalize::normalize_users(stored.into_iter().map(UserDraft::from), now);
                let next = self
                    .replace_snapshot(|dataset| dataset.users = users)
                    .await;
                self.events
                    .emit(Signal::UsersUpdated(Arc::new(next.users.clone())));
            }
            SyncKind::Orders => {
                let mut orders = store.get_all(Order).await?;
                orders.sort_by_key(|order| order.created_at);
                let order_items = store.get_all(OrderItem).await?;
                let next = self
                    .replace_snapshot(|dataset| {
                        dataset.orders = orders;
                        dataset.order_items = order_items;
                    })
                    .await;
                self.events
                    .emit(Signal::OrdersUpdated(Arc::new(next.orders.clone())));
            }
        }
        Ok(())
    }

    /// Ends the sale: clears `bfDeal` and `bfDiscount` on every product.
    /// Returns how many products were on promotion.
    pub async fn end_promotion(&self) -> Result<usize> {
        let snapshot = self.snapshot().await;
        let promoted = snapshot
            .products
            .iter()
            .filter(|p| p.bf_deal || p.bf_discount > 0.0)
            .count();
        if promoted == 0 {
            return Ok(0);
        }

        let now = Utc::now();
        let products = snapshot.products.iter().cloned().map(|mut product| {
            if product.bf_deal || product.bf_discount > 0.0 {
                product.bf_deal = false;
                product.bf_discount = 0.0;
                product.updated_at = now;
            }
            product
        });
        self.save(DatasetPatch::products(products)).await?;
        info!(promoted, "Promotion ended");
        Ok(promoted)
    }

    /// Orders placed by `user`, newest first, with their lines.
    ///
    /// Looks up the `userId` index first; when that finds nothing, falls back
    /// to every order whose `userId` or customer email matches.
    pub async fn orders_for(&self, user: &UserModel) -> Result<Vec<OrderWithItems>> {
        let snapshot = self.snapshot().await;

        if let Backend::Structured(store) = self.active_backend()? {
            match Self::indexed_orders(store, &user.id).await {
                Ok(found) if !found.is_empty() => return Ok(sorted_newest_first(found)),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Order index lookup failed, using snapshot"),
            }
        }

        let found = snapshot
            .orders
            .iter()
            .filter(|order| {
                order.user_id.as_deref() == Some(user.id.as_str())
                    || user.has_email(&order.customer.email)
            })
            .map(|order| OrderWithItems {
                items: snapshot.items_of(&order.id),
                order: order.clone(),
            })
            .collect();
        Ok(sorted_newest_first(found))
    }

    async fn indexed_orders(store: &StructuredStore, user_id: &str) -> Result<Vec<OrderWithItems>> {
        let orders = store
            .get_all_by_index(order::Column::UserId, user_id.to_string())
            .await?;
        let mut found = Vec::with_capacity(orders.len());
        for order in orders {
            let mut items = store
                .get_all_by_index(order_item::Column::OrderId, order.id.clone())
                .await?;
            items.sort_by(|a, b| a.id.cmp(&b.id));
            found.push(OrderWithItems { order, items });
        }
        Ok(found)
    }

    /// Counts of books, users and orders.
    pub async fn store_stats(&self) -> Result<StoreStats> {
        if let Backend::Structured(store) = self.active_backend()? {
            let counted = async {
                Ok::<_, Error>(StoreStats {
                    books: store.count(Product).await?,
                    users: store.count(User).await?,
                    orders: store.count(Order).await?,
                })
            }
            .await;
            match counted {
                Ok(stats) => return Ok(stats),
                Err(e) => warn!(error = %e, "Counting in structured store failed, using snapshot"),
            }
        }

        let snapshot = self.snapshot().await;
        Ok(StoreStats {
            books: snapshot.products.len() as u64,
            users: snapshot.users.len() as u64,
            orders: snapshot.orders.len() as u64,
        })
    }
}

fn sorted_newest_first(mut orders: Vec<OrderWithItems>) -> Vec<OrderWithItems> {
    orders.sort_by(|a, b| b.order.created_at.cmp(&a.order.created_at));
    orders
}
