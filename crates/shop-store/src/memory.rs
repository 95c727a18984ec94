//! # In-Memory Store
//!
//! All four storage ports over one `Arc<RwLock<State>>`. Every operation
//! takes the lock once, so `place_order` is atomic like the database
//! transaction it stands in for.

use async_trait::async_trait;
use shop_core::{
    normalize_price, Cart, CartItem, CartItemRecord, CartLine, CartStore, NewOrder, Order,
    OrderStatus, OrderStore, Product, ProductFilter, ProductStore, ShopError, ShopResult, User,
    UserStore, MAX_ITEM_QUANTITY,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Default)]
struct State {
    users: HashMap<Uuid, User>,
    products: HashMap<String, Product>,
    /// cart id -> owning user id
    carts: HashMap<Uuid, Uuid>,
    items: HashMap<Uuid, CartItem>,
    /// Insertion order doubles as creation order
    orders: Vec<Order>,
}

impl State {
    fn cart_id_for(&self, user_id: Uuid) -> Option<Uuid> {
        self.carts
            .iter()
            .find(|(_, owner)| **owner == user_id)
            .map(|(cart_id, _)| *cart_id)
    }
}

/// A thread-safe in-memory implementation of every store port.
///
/// Used by tests and by local runs without `DATABASE_URL`.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    state: Arc<RwLock<State>>,
}

impl MemoryStore {
    /// Creates a new, empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-seeded with products.
    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let state = State {
            products: products
                .into_iter()
                .map(|mut p| {
                    p.price = normalize_price(p.price);
                    (p.id.clone(), p)
                })
                .collect(),
            ..State::default()
        };
        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }

    /// Overwrite a product's price (admin price change)
    pub async fn set_price(&self, product_id: &str, price: rust_decimal::Decimal) -> ShopResult<()> {
        let mut state = self.state.write().await;
        let product = state
            .products
            .get_mut(product_id)
            .ok_or_else(|| ShopError::ProductNotFound {
                product_id: product_id.to_string(),
            })?;
        product.price = normalize_price(price);
        Ok(())
    }

    /// Number of stored orders across all users
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }
}

fn quantity_too_large() -> ShopError {
    ShopError::Validation(format!("Quantity cannot exceed {}", MAX_ITEM_QUANTITY))
}

#[async_trait]
impl ProductStore for MemoryStore {
    async fn get_product(&self, product_id: &str) -> ShopResult<Option<Product>> {
        Ok(self.state.read().await.products.get(product_id).cloned())
    }

    async fn insert_product(&self, mut product: Product) -> ShopResult<Product> {
        product.price = normalize_price(product.price);
        let mut state = self.state.write().await;
        Ok(state
            .products
            .entry(product.id.clone())
            .or_insert(product)
            .clone())
    }

    async fn list_products(&self, filter: &ProductFilter) -> ShopResult<Vec<Product>> {
        let state = self.state.read().await;
        let mut products: Vec<Product> = state
            .products
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        products.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(products)
    }
}

#[async_trait]
impl CartStore for MemoryStore {
    async fn get_cart(&self, user_id: Uuid) -> ShopResult<Option<Cart>> {
        let state = self.state.read().await;
        let Some(cart_id) = state.cart_id_for(user_id) else {
            return Ok(None);
        };

        let lines = state
            .items
            .values()
            .filter(|item| item.cart_id == cart_id)
            .map(|item| {
                let product = state.products.get(&item.product_id).cloned().ok_or_else(|| {
                    ShopError::Storage(format!("Cart item {} references missing product", item.id))
                })?;
                Ok(CartLine {
                    item_id: item.id,
                    product,
                    quantity: item.quantity,
                })
            })
            .collect::<ShopResult<Vec<_>>>()?;

        let mut cart = Cart {
            id: cart_id,
            user_id,
            lines,
        };
        cart.sort_lines();
        Ok(Some(cart))
    }

    async fn get_or_create_cart(&self, user_id: Uuid) -> ShopResult<Uuid> {
        let mut state = self.state.write().await;
        if let Some(cart_id) = state.cart_id_for(user_id) {
            return Ok(cart_id);
        }
        let cart_id = Uuid::new_v4();
        state.carts.insert(cart_id, user_id);
        Ok(cart_id)
    }

    async fn add_item(&self, cart_id: Uuid, product_id: &str, quantity: i32) -> ShopResult<CartItem> {
        let mut state = self.state.write().await;
        if !state.carts.contains_key(&cart_id) {
            return Err(ShopError::Storage(format!("Cart {} does not exist", cart_id)));
        }
        if !state.products.contains_key(product_id) {
            return Err(ShopError::ProductNotFound {
                product_id: product_id.to_string(),
            });
        }

        if let Some(existing) = state
            .items
            .values_mut()
            .find(|item| item.cart_id == cart_id && item.product_id == product_id)
        {
            existing.quantity = existing
                .quantity
                .checked_add(quantity)
                .filter(|total| *total <= MAX_ITEM_QUANTITY)
                .ok_or_else(quantity_too_large)?;
            return Ok(existing.clone());
        }
        if !(1..=MAX_ITEM_QUANTITY).contains(&quantity) {
            return Err(quantity_too_large());
        }

        let item = CartItem {
            id: Uuid::new_v4(),
            cart_id,
            product_id: product_id.to_string(),
            quantity,
        };
        state.items.insert(item.id, item.clone());
        Ok(item)
    }

    async fn find_item(&self, item_id: Uuid) -> ShopResult<Option<CartItemRecord>> {
        let state = self.state.read().await;
        Ok(state.items.get(&item_id).and_then(|item| {
            state.carts.get(&item.cart_id).map(|owner_id| CartItemRecord {
                item: item.clone(),
                owner_id: *owner_id,
            })
        }))
    }

    async fn set_quantity(&self, item_id: Uuid, quantity: i32) -> ShopResult<()> {
        if quantity < 1 {
            return Err(ShopError::Validation("Quantity must be at least 1".to_string()));
        }
        if quantity > MAX_ITEM_QUANTITY {
            return Err(quantity_too_large());
        }
        let mut state = self.state.write().await;
        let item = state
            .items
            .get_mut(&item_id)
            .ok_or_else(|| ShopError::CartItemNotFound {
                item_id: item_id.to_string(),
            })?;
        item.quantity = quantity;
        Ok(())
    }

    async fn delete_item(&self, item_id: Uuid) -> ShopResult<()> {
        let mut state = self.state.write().await;
        state
            .items
            .remove(&item_id)
            .map(|_| ())
            .ok_or_else(|| ShopError::CartItemNotFound {
                item_id: item_id.to_string(),
            })
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn place_order(&self, cart_id: Uuid, order: NewOrder) -> ShopResult<Order> {
        let mut state = self.state.write().await;

        if let Some(attempt_id) = &order.attempt_id {
            let duplicate = state.orders.iter().any(|o| {
                o.user_id == order.user_id && o.attempt_id.as_deref() == Some(attempt_id.as_str())
            });
            if duplicate {
                return Err(ShopError::Conflict(
                    "Order already exists for this checkout attempt".to_string(),
                ));
            }
        }

        let order = order.into_order();
        state.orders.push(order.clone());
        state.items.retain(|_, item| item.cart_id != cart_id);
        Ok(order)
    }

    async fn find_by_attempt(&self, user_id: Uuid, attempt_id: &str) -> ShopResult<Option<Order>> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .iter()
            .find(|o| o.user_id == user_id && o.attempt_id.as_deref() == Some(attempt_id))
            .cloned())
    }

    async fn find_by_payment_reference(&self, reference: &str) -> ShopResult<Option<Order>> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .iter()
            .find(|o| o.payment_reference.as_deref() == Some(reference))
            .cloned())
    }

    async fn get_order(&self, order_id: Uuid) -> ShopResult<Option<Order>> {
        let state = self.state.read().await;
        Ok(state.orders.iter().find(|o| o.id == order_id).cloned())
    }

    async fn list_orders(&self, user_id: Uuid) -> ShopResult<Vec<Order>> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .iter()
            .rev()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn update_status(&self, order_id: Uuid, from: OrderStatus, to: OrderStatus) -> ShopResult<bool> {
        let mut state = self.state.write().await;
        match state.orders.iter_mut().find(|o| o.id == order_id) {
            Some(order) if order.status == from => {
                order.status = to;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(ShopError::OrderNotFound {
                order_id: order_id.to_string(),
            }),
        }
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, user: User) -> ShopResult<User> {
        let mut state = self.state.write().await;
        if state
            .users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(ShopError::Conflict("Email already registered".to_string()));
        }
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, user_id: Uuid) -> ShopResult<Option<User>> {
        Ok(self.state.read().await.users.get(&user_id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> ShopResult<Option<User>> {
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn update_profile(&self, user_id: Uuid, name: &str, email: &str) -> ShopResult<User> {
        let mut state = self.state.write().await;
        if state
            .users
            .values()
            .any(|u| u.id != user_id && u.email.eq_ignore_ascii_case(email))
        {
            return Err(ShopError::Conflict("Email already registered".to_string()));
        }
        let user = state
            .users
            .get_mut(&user_id)
            .ok_or(ShopError::Unauthenticated)?;
        user.name = name.to_string();
        user.email = email.to_string();
        Ok(user.clone())
    }

    async fn list_users(&self) -> ShopResult<Vec<User>> {
        let state = self.state.read().await;
        let mut users: Vec<User> = state.users.values().cloned().collect();
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(users)
    }
}
