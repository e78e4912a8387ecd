//! Shopping cart engine.
//!
//! The cart is keyed by product id and persisted to flat storage under
//! `digital_library_cart_v1` after every mutation, then announced with
//! [`Signal::CartUpdated`]. It works the same for guests and signed-in users.
//!
//! Unit prices are locked when a product is first added: later catalog price
//! or promotion changes do not touch lines already in the cart.

use crate::core::events::{EventHub, Signal};
use crate::entities::ProductModel;
use crate::errors::Result;
use crate::storage::flat::{self, CART_KEY, KeyValueStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// One cart line as stored in flat storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    /// Product id
    pub id: String,
    pub title: String,
    /// Unit price captured when the line was created
    pub price: f64,
    #[serde(default)]
    pub cover: String,
    #[serde(default = "one")]
    pub qty: u32,
}

const fn one() -> u32 {
    1
}

impl CartItem {
    #[must_use]
    pub fn subtotal(&self) -> f64 {
        self.price * f64::from(self.qty)
    }
}

/// A cart line resolved against the live catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct CartLine {
    pub id: String,
    /// Live title when the product still exists, cached title otherwise
    pub title: String,
    pub cover: String,
    pub unit_price: f64,
    pub qty: u32,
    pub subtotal: f64,
    /// False when the product was removed or deactivated since it was added
    pub available: bool,
}

#[derive(Debug)]
pub struct Cart {
    storage: Arc<dyn KeyValueStore>,
    events: EventHub,
    items: Vec<CartItem>,
}

impl Cart {
    /// Loads the cart from flat storage. A corrupted value is discarded.
    pub fn open(storage: Arc<dyn KeyValueStore>, events: EventHub) -> Result<Self> {
        let mut items: Vec<CartItem> =
            flat::load_json_or_reset(storage.as_ref(), CART_KEY)?.unwrap_or_default();
        for item in &mut items {
            item.qty = item.qty.max(1);
        }
        debug!(lines = items.len(), "Cart loaded");

        Ok(Self {
            storage,
            events,
            items,
        })
    }

    #[must_use]
    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&CartItem> {
        self.items.iter().find(|item| item.id == id)
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut CartItem> {
        self.items.iter_mut().find(|item| item.id == id)
    }

    #[must_use]
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Signal> {
        self.events.subscribe()
    }

    fn persist(&self) -> Result<()> {
        flat::save_json(self.storage.as_ref(), CART_KEY, &self.items)?;
        self.notify();
        Ok(())
    }

    fn notify(&self) {
        self.events
            .emit(Signal::CartUpdated(Arc::new(self.items.clone())));
    }

    /// Adds `qty` of `product` (at least one). An existing line is
    /// incremented; a new line locks the current effective price.
    pub fn add(&mut self, product: &ProductModel, qty: u32) -> Result<()> {
        let qty = qty.max(1);
        if let Some(existing) = self.get_mut(&product.id) {
            existing.qty = existing.qty.saturating_add(qty);
        } else {
            self.items.push(CartItem {
                id: product.id.clone(),
                title: product.title.clone(),
                price: product.effective_price(),
                cover: product.cover.clone(),
                qty,
            });
        }
        self.persist()
    }

    /// Sets the quantity of a line, clamped to at least one. Unknown ids are
    /// ignored.
    pub fn set_qty(&mut self, id: &str, qty: u32) -> Result<()> {
        let Some(item) = self.get_mut(id) else {
            return Ok(());
        };
        item.qty = qty.max(1);
        self.persist()
    }

    pub fn inc(&mut self, id: &str) -> Result<()> {
        let Some(item) = self.get_mut(id) else {
            return Ok(());
        };
        item.qty = item.qty.saturating_add(1);
        self.persist()
    }

    /// Decrements a line but never below one; use [`Self::remove`] to drop it.
    pub fn dec(&mut self, id: &str) -> Result<()> {
        let Some(item) = self.get_mut(id) else {
            return Ok(());
        };
        item.qty = item.qty.saturating_sub(1).max(1);
        self.persist()
    }

    pub fn remove(&mut self, id: &str) -> Result<()> {
        self.items.retain(|item| item.id != id);
        self.persist()
    }

    /// Empties the cart and deletes its storage key.
    pub fn clear(&mut self) -> Result<()> {
        self.items.clear();
        self.storage.remove(CART_KEY)?;
        self.notify();
        Ok(())
    }

    #[must_use]
    pub fn total_items(&self) -> u64 {
        self.items.iter().map(|item| u64::from(item.qty)).sum()
    }

    #[must_use]
    pub fn total_amount(&self) -> f64 {
        self.items.iter().map(CartItem::subtotal).sum()
    }

    /// Resolves lines against the active catalog. Missing or inactive products
    /// keep their cached title and price and are flagged unavailable.
    #[must_use]
    pub fn lines(&self, active_products: &[ProductModel]) -> Vec<CartLine> {
        self.items
            .iter()
            .map(|item| {
                let live = active_products.iter().find(|p| p.id == item.id);
                CartLine {
                    id: item.id.clone(),
                    title: live.map_or_else(|| item.title.clone(), |p| p.title.clone()),
                    cover: live.map_or_else(|| item.cover.clone(), |p| p.cover.clone()),
                    unit_price: item.price,
                    qty: item.qty,
                    subtotal: item.subtotal(),
                    available: live.is_some(),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::storage::MemoryStore;
    use crate::test_utils::sample_product;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::{BTreeMap, HashSet};

    fn open_cart(storage: &MemoryStore) -> Cart {
        Cart::open(Arc::new(storage.clone()), EventHub::new()).unwrap()
    }

    #[test]
    fn test_adding_twice_increments_one_row() -> Result<()> {
        let storage = MemoryStore::new();
        let mut cart = open_cart(&storage);
        let book = sample_product("the-great-library", 14.99);

        cart.add(&book, 1)?;
        cart.add(&book, 1)?;

        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.items()[0].qty, 2);
        assert!((cart.total_amount() - 29.98).abs() < 1e-9);
        assert_eq!(cart.total_items(), 2);
        Ok(())
    }

    #[test]
    fn test_add_locks_discounted_price() -> Result<()> {
        let mut cart = open_cart(&MemoryStore::new());
        let mut book = sample_product("clean-code", 20.0);
        book.bf_deal = true;
        book.bf_discount = 0.25;

        cart.add(&book, 0)?;
        book.bf_deal = false;
        cart.add(&book, 2)?;

        assert_eq!(cart.items()[0].price, 15.0);
        assert_eq!(cart.items()[0].qty, 3);
        assert_eq!(cart.total_amount(), 45.0);
        Ok(())
    }

    #[test]
    fn test_quantity_operations() -> Result<()> {
        let mut cart = open_cart(&MemoryStore::new());
        cart.add(&sample_product("a", 2.0), 1)?;
        cart.add(&sample_product("b", 3.0), 1)?;

        cart.dec("a")?;
        cart.dec("a")?;
        assert_eq!(cart.get("a").unwrap().qty, 1);

        cart.inc("b")?;
        cart.set_qty("b", 0)?;
        assert_eq!(cart.get("b").unwrap().qty, 1);
        cart.set_qty("b", 4)?;
        cart.set_qty("missing", 9)?;
        assert!(cart.get("missing").is_none());

        cart.remove("a")?;
        assert!(cart.get("a").is_none());
        assert_eq!(cart.total_items(), 4);
        assert_eq!(cart.total_amount(), 12.0);
        Ok(())
    }

    #[test]
    fn test_cart_persists_and_clears() -> Result<()> {
        let storage = MemoryStore::new();
        let mut cart = open_cart(&storage);
        cart.add(&sample_product("a", 2.5), 2)?;

        let reopened = open_cart(&storage);
        assert_eq!(reopened.items(), cart.items());

        cart.clear()?;
        assert!(cart.is_empty());
        assert_eq!(storage.get(CART_KEY)?, None);
        Ok(())
    }

    #[test]
    fn test_corrupted_cart_starts_empty() -> Result<()> {
        let storage = MemoryStore::new();
        storage.set(CART_KEY, "not json")?;
        assert!(open_cart(&storage).is_empty());

        storage.set(CART_KEY, r#"[{"id":"a","title":"A","price":3,"qty":0}]"#)?;
        assert_eq!(open_cart(&storage).items()[0].qty, 1);
        Ok(())
    }

    #[test]
    fn test_every_mutation_emits() -> Result<()> {
        let events = EventHub::new();
        let mut cart = Cart::open(Arc::new(MemoryStore::new()), events.clone())?;
        let mut signals = events.subscribe();

        cart.add(&sample_product("a", 1.0), 1)?;
        cart.inc("a")?;
        cart.clear()?;

        for _ in 0..3 {
            assert!(matches!(signals.try_recv(), Ok(Signal::CartUpdated(_))));
        }
        Ok(())
    }

    #[test]
    fn test_lines_degrade_for_missing_products() -> Result<()> {
        let mut cart = open_cart(&MemoryStore::new());
        let book = sample_product("gone", 9.5);
        cart.add(&book, 2)?;

        let lines = cart.lines(&[]);
        assert_eq!(lines.len(), 1);
        assert!(!lines[0].available);
        assert_eq!(lines[0].title, book.title);
        assert_eq!(lines[0].subtotal, 19.0);

        let live = cart.lines(&[book]);
        assert!(live[0].available);
        Ok(())
    }

    #[test]
    fn test_seeded_operation_sequences_keep_totals_consistent() -> Result<()> {
        let catalog = [
            sample_product("a", 2.5),
            sample_product("b", 14.99),
            sample_product("c", 0.1),
            sample_product("d", 29.99),
        ];

        for seed in [7_u64, 42, 2024] {
            let storage = MemoryStore::new();
            let mut cart = open_cart(&storage);
            let mut expected: BTreeMap<String, (f64, u32)> = BTreeMap::new();
            let mut rng = StdRng::seed_from_u64(seed);

            for _ in 0..300 {
                let product = &catalog[rng.gen_range(0..catalog.len())];
                let id = product.id.as_str();
                match rng.gen_range(0..5) {
                    0 => {
                        let qty = rng.gen_range(0..4_u32);
                        cart.add(product, qty)?;
                        let line = expected.entry(id.to_string()).or_insert((product.price, 0));
                        line.1 += qty.max(1);
                    }
                    1 => {
                        cart.inc(id)?;
                        if let Some(line) = expected.get_mut(id) {
                            line.1 += 1;
                        }
                    }
                    2 => {
                        cart.dec(id)?;
                        if let Some(line) = expected.get_mut(id) {
                            line.1 = line.1.saturating_sub(1).max(1);
                        }
                    }
                    3 => {
                        cart.remove(id)?;
                        expected.remove(id);
                        assert!(cart.get(id).is_none());
                    }
                    _ => {
                        let qty = rng.gen_range(0..6_u32);
                        cart.set_qty(id, qty)?;
                        if let Some(line) = expected.get_mut(id) {
                            line.1 = qty.max(1);
                        }
                    }
                }

                let ids: HashSet<&str> = cart
                    .items()
                    .iter()
                    .map(|item| item.id.as_str())
                    .collect();
                assert_eq!(ids.len(), cart.items().len());
                assert!(cart.items().iter().all(|item| item.qty >= 1));
                assert_eq!(ids.len(), expected.len());

                let items: u64 = expected
                    .values()
                    .map(|(_, qty)| u64::from(*qty))
                    .sum();
                let amount: f64 = expected
                    .values()
                    .map(|(price, qty)| price * f64::from(*qty))
                    .sum();
                assert_eq!(cart.total_items(), items);
                assert!((cart.total_amount() - amount).abs() < 1e-9);
                for (id, (price, qty)) in &expected {
                    let item = cart.get(id).unwrap();
                    assert_eq!(item.price, *price);
                    assert_eq!(item.qty, *qty);
                }
            }

            assert_eq!(open_cart(&storage).items(), cart.items());
        }
        Ok(())
    }
}
