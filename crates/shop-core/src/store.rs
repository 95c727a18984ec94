//! # Storage Ports
//!
//! Persistence traits consumed by the cart service and the checkout
//! orchestrator. `shop-store` provides in-memory and PostgreSQL backends.

use crate::cart::{Cart, CartItem, CartItemRecord};
use crate::error::ShopResult;
use crate::order::{NewOrder, Order, OrderStatus};
use crate::product::{Product, ProductFilter};
use crate::user::User;
use async_trait::async_trait;
use uuid::Uuid;

/// Local product records
#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn get_product(&self, product_id: &str) -> ShopResult<Option<Product>>;

    /// Insert a product; an existing row with the same id is returned unchanged
    async fn insert_product(&self, product: Product) -> ShopResult<Product>;

    /// Products passing the filter, sorted by name
    async fn list_products(&self, filter: &ProductFilter) -> ShopResult<Vec<Product>>;
}

/// Per-user carts and their items
#[async_trait]
pub trait CartStore: Send + Sync {
    /// The user's cart joined with products, lines sorted by product name
    async fn get_cart(&self, user_id: Uuid) -> ShopResult<Option<Cart>>;

    /// Id of the user's cart, creating it if absent
    async fn get_or_create_cart(&self, user_id: Uuid) -> ShopResult<Uuid>;

    /// Insert a line, or increment the quantity of the existing line for the product
    async fn add_item(&self, cart_id: Uuid, product_id: &str, quantity: i32) -> ShopResult<CartItem>;

    async fn find_item(&self, item_id: Uuid) -> ShopResult<Option<CartItemRecord>>;

    /// Overwrite a positive quantity
    async fn set_quantity(&self, item_id: Uuid, quantity: i32) -> ShopResult<()>;

    async fn delete_item(&self, item_id: Uuid) -> ShopResult<()>;
}

/// Placed orders
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Write the order with its items and empty the cart, all or nothing.
    ///
    /// Fails with `ShopError::Conflict` when the user already has an order for
    /// the same attempt id.
    async fn place_order(&self, cart_id: Uuid, order: NewOrder) -> ShopResult<Order>;

    async fn find_by_attempt(&self, user_id: Uuid, attempt_id: &str) -> ShopResult<Option<Order>>;

    async fn find_by_payment_reference(&self, reference: &str) -> ShopResult<Option<Order>>;

    async fn get_order(&self, order_id: Uuid) -> ShopResult<Option<Order>>;

    /// The user's orders with items, newest first
    async fn list_orders(&self, user_id: Uuid) -> ShopResult<Vec<Order>>;

    /// Compare-and-set the status. Returns false when the order was not in `from`.
    async fn update_status(&self, order_id: Uuid, from: OrderStatus, to: OrderStatus) -> ShopResult<bool>;
}

/// User accounts
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `ShopError::Conflict` on a duplicate email
    async fn create_user(&self, user: User) -> ShopResult<User>;

    async fn get_user(&self, user_id: Uuid) -> ShopResult<Option<User>>;

    async fn find_by_email(&self, email: &str) -> ShopResult<Option<User>>;

    async fn update_profile(&self, user_id: Uuid, name: &str, email: &str) -> ShopResult<User>;

    async fn list_users(&self) -> ShopResult<Vec<User>>;
}
