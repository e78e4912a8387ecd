//! Structured store schema for the storefront.
//!
//! This module handles the `SQLite` connection and collection creation using `SeaORM`.
//! Every collection is created from its entity definition with
//! `Schema::create_table_from_entity`, and every column marked `indexed` gets a
//! secondary index from `Schema::create_index_from_entity`. Both statements use
//! `IF NOT EXISTS`, so opening an existing store is a no-op.

use crate::entities::{Activity, Order, OrderItem, Product, User};
use crate::errors::Result;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema};
use tracing::{debug, instrument};

/// Default location of the structured store when nothing else is configured.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/digital_library.sqlite?mode=rwc";

/// Establishes a connection to the structured store at `database_url`.
#[instrument]
pub async fn connect(database_url: &str) -> Result<DatabaseConnection> {
    debug!("Opening structured store");
    Database::connect(database_url).await.map_err(Into::into)
}

/// Creates all five collections and their secondary indexes.
///
/// Products are indexed by genre and title, users by role (email is unique),
/// orders by user, status and creation time, order items by order and book,
/// activity by entity type and creation time.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let schema = Schema::new(db.get_database_backend());

    create_collection(db, &schema, Product).await?;
    create_collection(db, &schema, User).await?;
    create_collection(db, &schema, Order).await?;
    create_collection(db, &schema, OrderItem).await?;
    create_collection(db, &schema, Activity).await?;

    Ok(())
}

async fn create_collection<E: EntityTrait>(
    db: &DatabaseConnection,
    schema: &Schema,
    entity: E,
) -> Result<()> {
    let builder = db.get_database_backend();

    let mut table = schema.create_table_from_entity(entity);
    table.if_not_exists();
    db.execute(builder.build(&table)).await?;

    for mut index in schema.create_index_from_entity(entity) {
        index.if_not_exists();
        db.execute(builder.build(&index)).await?;
    }

    debug!(collection = entity.table_name(), "Collection ensured");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{
        activity::Model as ActivityModel, order::Model as OrderModel,
        order_item::Model as OrderItemModel, product::Model as ProductModel,
        user::Model as UserModel,
    };
    use sea_orm::QuerySelect;

    #[tokio::test]
    async fn test_create_tables() -> Result<()> {
        let db = Database::connect("sqlite::memory:").await?;
        create_tables(&db).await?;

        // Test that tables exist by querying them
        let _: Vec<ProductModel> = Product::find().limit(1).all(&db).await?;
        let _: Vec<UserModel> = User::find().limit(1).all(&db).await?;
        let _: Vec<OrderModel> = Order::find().limit(1).all(&db).await?;
        let _: Vec<OrderItemModel> = OrderItem::find().limit(1).all(&db).await?;
        let _: Vec<ActivityModel> = Activity::find().limit(1).all(&db).await?;

        Ok(())
    }

    #[tokio::test]
    async fn test_create_tables_is_repeatable() -> Result<()> {
        let db = Database::connect("sqlite::memory:").await?;
        create_tables(&db).await?;
        create_tables(&db).await?;
        Ok(())
    }
}
