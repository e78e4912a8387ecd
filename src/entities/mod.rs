//! Entity module - SeaORM entity definitions for the structured store.
//! Each collection of the store is one entity; the models double as the
//! in-memory records held by the persistence coordinator.

pub mod activity;
pub mod order;
pub mod order_item;
pub mod product;
pub mod user;

// Re-export specific types to avoid conflicts
pub use activity::{Entity as Activity, Model as ActivityEntry};
pub use order::{
    Customer, Entity as Order, Model as OrderModel, OrderStatus, Payment, Totals,
};
pub use order_item::{Entity as OrderItem, Model as OrderItemModel};
pub use product::{Entity as Product, Model as ProductModel, ProductStatus};
pub use user::{Entity as User, Model as UserModel, UserRole, UserStatus};
