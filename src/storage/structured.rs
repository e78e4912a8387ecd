//! Structured store adapter over `SeaORM`.
//!
//! Collections are addressed by their entity (`Product`, `User`, ...). Writes
//! are idempotent upserts on the primary key and run inside one database
//! transaction, so a failed batch leaves nothing visible. There is no
//! cross-collection transaction.

use crate::config::database;
use crate::errors::{Error, Result};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, IdenStatic,
    IntoActiveModel, Iterable, PaginatorTrait, PrimaryKeyToColumn, PrimaryKeyTrait,
    QueryFilter, TransactionTrait,
};
use tracing::{debug, instrument};

/// Records per INSERT statement; keeps well under `SQLite`'s bind limit.
const BATCH_SIZE: usize = 100;

/// Where the structured store comes from.
#[derive(Debug, Clone)]
pub enum StoreSource {
    /// Connect to this URL.
    Url(String),
    /// Reuse a connection that is already open (shared by several sessions).
    Connection(DatabaseConnection),
    /// The host has no structured storage.
    Unavailable,
}

impl StoreSource {
    #[must_use]
    pub fn from_url(url: Option<String>) -> Self {
        url.map_or(Self::Unavailable, Self::Url)
    }
}

/// Handle to an opened structured store.
#[derive(Debug, Clone)]
pub struct StructuredStore {
    db: DatabaseConnection,
}

fn unavailable(e: &Error) -> Error {
    Error::StoreUnavailable {
        reason: e.to_string(),
    }
}

fn collection_name<E: EntityTrait>() -> String {
    E::default().table_name().to_string()
}

fn write_failed<E: EntityTrait>(source: DbErr) -> Error {
    Error::WriteFailed {
        collection: collection_name::<E>(),
        source,
    }
}

/// `ON CONFLICT (pk) DO UPDATE SET <every other column>`
fn upsert_on_primary_key<E: EntityTrait>() -> OnConflict {
    let keys: Vec<E::Column> = E::PrimaryKey::iter()
        .map(PrimaryKeyToColumn::into_column)
        .collect();
    let values: Vec<E::Column> = E::Column::iter()
        .filter(|column| keys.iter().all(|key| key.as_str() != column.as_str()))
        .collect();

    let mut on_conflict = OnConflict::columns(keys);
    on_conflict.update_columns(values);
    on_conflict
}

async fn upsert_batches<E, C>(conn: &C, records: Vec<E::Model>) -> std::result::Result<(), DbErr>
where
    E: EntityTrait,
    E::Model: IntoActiveModel<E::ActiveModel>,
    C: ConnectionTrait,
{
    let models: Vec<E::ActiveModel> = records
        .into_iter()
        .map(IntoActiveModel::into_active_model)
        .collect();

    for chunk in models.chunks(BATCH_SIZE) {
        E::insert_many(chunk.to_vec())
            .on_conflict(upsert_on_primary_key::<E>())
            .exec_without_returning(conn)
            .await?;
    }
    Ok(())
}

impl StructuredStore {
    /// Opens the store and makes sure every collection and index exists.
    ///
    /// # Errors
    /// Returns `Error::StoreUnavailable` when the source is `Unavailable`, the
    /// connection cannot be established, or the schema cannot be created.
    #[instrument(skip(source))]
    pub async fn open(source: &StoreSource) -> Result<Self> {
        let db = match source {
            StoreSource::Unavailable => {
                return Err(Error::StoreUnavailable {
                    reason: "host has no structured storage".to_string(),
                });
            }
            StoreSource::Url(url) => database::connect(url).await.map_err(|e| unavailable(&e))?,
            StoreSource::Connection(db) => db.clone(),
        };

        database::create_tables(&db)
            .await
            .map_err(|e| unavailable(&e))?;
        debug!("Structured store opened");
        Ok(Self { db })
    }

    #[must_use]
    pub const fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Full scan of a collection. Order is unspecified.
    pub async fn get_all<E: EntityTrait>(&self, _collection: E) -> Result<Vec<E::Model>> {
        E::find().all(&self.db).await.map_err(Into::into)
    }

    pub async fn count<E: EntityTrait>(&self, _collection: E) -> Result<u64>
    where
        E::Model: Sync,
    {
        E::find().count(&self.db).await.map_err(Into::into)
    }

    /// Equality lookup on a secondary index; no match is an empty result.
    pub async fn get_all_by_index<C, V>(
        &self,
        index: C,
        key: V,
    ) -> Result<Vec<<C::EntityName as EntityTrait>::Model>>
    where
        C: ColumnTrait,
        C::EntityName: EntityTrait,
        V: Into<sea_orm::Value>,
    {
        <C::EntityName as EntityTrait>::find()
            .filter(index.eq(key))
            .all(&self.db)
            .await
            .map_err(Into::into)
    }

    pub async fn put_one<E>(&self, collection: E, record: E::Model) -> Result<()>
    where
        E: EntityTrait,
        E::Model: IntoActiveModel<E::ActiveModel>,
    {
        self.put_many(collection, vec![record]).await
    }

    /// Upserts every record in one transaction.
    ///
    /// # Errors
    /// Returns `Error::WriteFailed`; in that case none of the records were
    /// committed.
    pub async fn put_many<E>(&self, _collection: E, records: Vec<E::Model>) -> Result<()>
    where
        E: EntityTrait,
        E::Model: IntoActiveModel<E::ActiveModel>,
    {
        if records.is_empty() {
            return Ok(());
        }
        let count = records.len();

        let txn = self.db.begin().await.map_err(write_failed::<E>)?;
        upsert_batches::<E, _>(&txn, records)
            .await
            .map_err(write_failed::<E>)?;
        txn.commit().await.map_err(write_failed::<E>)?;

        debug!(collection = %collection_name::<E>(), count, "Records upserted");
        Ok(())
    }

    /// Removes every record of a collection.
    pub async fn clear<E: EntityTrait>(&self, _collection: E) -> Result<()> {
        E::delete_many()
            .exec(&self.db)
            .await
            .map_err(write_failed::<E>)?;
        Ok(())
    }

    /// Replaces the whole collection: clear followed by upsert, committed
    /// together.
    pub async fn replace_all<E>(&self, _collection: E, records: Vec<E::Model>) -> Result<()>
    where
        E: EntityTrait,
        E::Model: IntoActiveModel<E::ActiveModel>,
    {
        let count = records.len();
        let txn = self.db.begin().await.map_err(write_failed::<E>)?;
        E::delete_many()
            .exec(&txn)
            .await
            .map_err(write_failed::<E>)?;
        upsert_batches::<E, _>(&txn, records)
            .await
            .map_err(write_failed::<E>)?;
        txn.commit().await.map_err(write_failed::<E>)?;

        debug!(collection = %collection_name::<E>(), count, "Collection replaced");
        Ok(())
    }

    /// Deletes one record by primary key; absent keys are a no-op.
    pub async fn delete_one<E, K>(&self, _collection: E, key: K) -> Result<()>
    where
        E: EntityTrait,
        K: Into<<E::PrimaryKey as PrimaryKeyTrait>::ValueType>,
    {
        E::delete_by_id(key)
            .exec(&self.db)
            .await
            .map_err(write_failed::<E>)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::entities::{Order, OrderItem, Product, User, order, order_item, product, user};
    use crate::test_utils::{memory_source, sample_order, sample_product, sample_user};

    #[tokio::test]
    async fn test_open_unavailable_fails() {
        let result = StructuredStore::open(&StoreSource::Unavailable).await;
        assert!(matches!(result, Err(Error::StoreUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_put_many_is_idempotent_upsert() -> Result<()> {
        let store = StructuredStore::open(&memory_source().await?).await?;

        let mut book = sample_product("clean-code", 29.99);
        store
            .put_many(Product, vec![book.clone(), sample_product("data-stories", 18.5)])
            .await?;
        book.price = 25.0;
        store.put_many(Product, vec![book.clone()]).await?;
        store.put_many(Product, vec![book.clone()]).await?;

        let all = store.get_all(Product).await?;
        assert_eq!(all.len(), 2);
        let stored = all.iter().find(|p| p.id == "clean-code").unwrap();
        assert_eq!(stored.price, 25.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_get_all_by_index() -> Result<()> {
        let store = StructuredStore::open(&memory_source().await?).await?;
        let mut design = sample_product("minimal-design", 21.0);
        design.genre = "design".to_string();
        store
            .put_many(Product, vec![design, sample_product("clean-code", 29.99)])
            .await?;

        let found = store.get_all_by_index(product::Column::Genre, "design").await?;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "minimal-design");

        let none = store.get_all_by_index(product::Column::Genre, "poetry").await?;
        assert!(none.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_batch_leaves_nothing_behind() -> Result<()> {
        let store = StructuredStore::open(&memory_source().await?).await?;
        store.put_one(User, sample_user("u-1", "a@example.com")).await?;

        // Second record collides with the unique email index of the first.
        let batch = vec![
            sample_user("u-2", "b@example.com"),
            sample_user("u-3", "a@example.com"),
        ];
        let result = store.put_many(User, batch).await;
        assert!(matches!(result, Err(Error::WriteFailed { .. })));

        let users = store.get_all(User).await?;
        assert_eq!(users.len(), 1);
        assert!(store.get_all_by_index(user::Column::Email, "b@example.com").await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_replace_all_and_delete_one() -> Result<()> {
        let store = StructuredStore::open(&memory_source().await?).await?;
        store
            .put_many(Product, vec![sample_product("a", 1.0), sample_product("b", 2.0)])
            .await?;

        store.replace_all(Product, vec![sample_product("c", 3.0)]).await?;
        let ids: Vec<String> = store.get_all(Product).await?.into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["c".to_string()]);

        assert_eq!(store.count(Product).await?, 1);
        store.delete_one(Product, "c").await?;
        store.delete_one(Product, "missing").await?;
        assert!(store.get_all(Product).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_orders_and_items_by_index() -> Result<()> {
        let store = StructuredStore::open(&memory_source().await?).await?;
        let (order, items) = sample_order("DL-1", Some("u-1"), &[("clean-code", 29.99, 2)]);
        store.put_one(Order, order.clone()).await?;
        store.put_many(OrderItem, items).await?;

        let mine = store.get_all_by_index(order::Column::UserId, "u-1").await?;
        assert_eq!(mine, vec![order]);

        let lines = store
            .get_all_by_index(order_item::Column::OrderId, "DL-1")
            .await?;
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].subtotal, 59.98);

        store.clear(OrderItem).await?;
        assert!(store.get_all(OrderItem).await?.is_empty());
        Ok(())
    }
}
