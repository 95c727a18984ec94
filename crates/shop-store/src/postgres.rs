//! # PostgreSQL Store
//!
//! `sqlx` implementation of the storage ports. Queries live in `sql/` and
//! rows are mapped by hand, since the domain types belong to `shop-core`.

use async_trait::async_trait;
use shop_core::{
    Cart, CartItem, CartItemRecord, CartLine, CartStore, Currency, NewOrder, Order, OrderItem,
    OrderStatus, OrderStore, PaymentMethod, Product, ProductFilter, ProductStore, Role,
    ShippingAddress, ShopError, ShopResult, User, UserStore, MAX_ITEM_QUANTITY,
};
use sqlx::error::BoxDynError;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{query, PgPool, Row};
use std::collections::HashMap;
use tracing::{debug, instrument};
use uuid::Uuid;

const GET_PRODUCT_SQL: &str = include_str!("sql/get_product.sql");
const INSERT_PRODUCT_SQL: &str = include_str!("sql/insert_product.sql");
const LIST_PRODUCTS_SQL: &str = include_str!("sql/list_products.sql");

const GET_CART_LINES_SQL: &str = include_str!("sql/get_cart_lines.sql");
const GET_OR_CREATE_CART_SQL: &str = include_str!("sql/get_or_create_cart.sql");
const UPSERT_CART_ITEM_SQL: &str = include_str!("sql/upsert_cart_item.sql");
const FIND_CART_ITEM_SQL: &str = include_str!("sql/find_cart_item.sql");
const SET_CART_ITEM_QUANTITY_SQL: &str = include_str!("sql/set_cart_item_quantity.sql");
const DELETE_CART_ITEM_SQL: &str = include_str!("sql/delete_cart_item.sql");
const CLEAR_CART_SQL: &str = include_str!("sql/clear_cart.sql");

const INSERT_ORDER_SQL: &str = include_str!("sql/insert_order.sql");
const INSERT_ORDER_ITEM_SQL: &str = include_str!("sql/insert_order_item.sql");
const GET_ORDER_SQL: &str = include_str!("sql/get_order.sql");
const FIND_ORDER_BY_ATTEMPT_SQL: &str = include_str!("sql/find_order_by_attempt.sql");
const FIND_ORDER_BY_REFERENCE_SQL: &str = include_str!("sql/find_order_by_reference.sql");
const LIST_ORDERS_SQL: &str = include_str!("sql/list_orders.sql");
const GET_ORDER_ITEMS_SQL: &str = include_str!("sql/get_order_items.sql");
const UPDATE_ORDER_STATUS_SQL: &str = include_str!("sql/update_order_status.sql");

const INSERT_USER_SQL: &str = include_str!("sql/insert_user.sql");
const GET_USER_SQL: &str = include_str!("sql/get_user.sql");
const FIND_USER_BY_EMAIL_SQL: &str = include_str!("sql/find_user_by_email.sql");
const LIST_USERS_SQL: &str = include_str!("sql/list_users.sql");
const UPDATE_PROFILE_SQL: &str = include_str!("sql/update_profile.sql");

/// Store backed by a PostgreSQL pool
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Attach line items to a batch of order headers
    async fn with_items(&self, mut orders: Vec<Order>) -> ShopResult<Vec<Order>> {
        if orders.is_empty() {
            return Ok(orders);
        }

        let ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
        let rows = query(GET_ORDER_ITEMS_SQL)
            .bind(&ids)
            .fetch_all(&self.pool)
            .await
            .map_err(ShopError::storage)?;

        let mut items: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for row in &rows {
            let order_id: Uuid = row.try_get("order_id").map_err(ShopError::storage)?;
            items
                .entry(order_id)
                .or_default()
                .push(order_item_from_row(row).map_err(ShopError::storage)?);
        }

        for order in &mut orders {
            order.items = items.remove(&order.id).unwrap_or_default();
        }
        Ok(orders)
    }

    async fn fetch_order(&self, row: Option<PgRow>) -> ShopResult<Option<Order>> {
        let Some(row) = row else {
            return Ok(None);
        };
        let order = order_from_row(&row).map_err(ShopError::storage)?;
        Ok(self.with_items(vec![order]).await?.pop())
    }
}

fn decode_error(err: impl Into<BoxDynError>) -> sqlx::Error {
    sqlx::Error::Decode(err.into())
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation())
}

/// Integer overflow (22003) or a failed `CHECK` (23514) on a quantity column
fn is_quantity_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.is_check_violation() || db_err.code().as_deref() == Some("22003")
        }
        _ => false,
    }
}

fn product_from_row(row: &PgRow) -> sqlx::Result<Product> {
    Ok(Product {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        price: row.try_get("price")?,
        stock: row.try_get("stock")?,
        category: row.try_get("category")?,
        images: row.try_get("images")?,
        created_at: row.try_get("created_at")?,
    })
}

fn order_from_row(row: &PgRow) -> sqlx::Result<Order> {
    let currency: String = row.try_get("currency")?;
    let status: String = row.try_get("status")?;
    let method: String = row.try_get("payment_method")?;
    let shipping: Option<Json<ShippingAddress>> = row.try_get("shipping")?;

    Ok(Order {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        total: row.try_get("total")?,
        currency: Currency::parse(&currency).map_err(decode_error)?,
        status: status.parse::<OrderStatus>().map_err(decode_error)?,
        payment_method: method.parse::<PaymentMethod>().map_err(decode_error)?,
        payment_reference: row.try_get("payment_reference")?,
        attempt_id: row.try_get("attempt_id")?,
        shipping: shipping.map(|Json(address)| address),
        created_at: row.try_get("created_at")?,
        items: Vec::new(),
    })
}

fn order_item_from_row(row: &PgRow) -> sqlx::Result<OrderItem> {
    Ok(OrderItem {
        id: row.try_get("id")?,
        product_id: row.try_get("product_id")?,
        product_name: row.try_get("product_name")?,
        quantity: row.try_get("quantity")?,
        price: row.try_get("price")?,
    })
}

fn user_from_row(row: &PgRow) -> sqlx::Result<User> {
    let role: String = row.try_get("role")?;
    Ok(User {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        role: role.parse::<Role>().map_err(decode_error)?,
        created_at: row.try_get("created_at")?,
    })
}

fn cart_item_from_row(row: &PgRow) -> sqlx::Result<CartItem> {
    Ok(CartItem {
        id: row.try_get("id")?,
        cart_id: row.try_get("cart_id")?,
        product_id: row.try_get("product_id")?,
        quantity: row.try_get("quantity")?,
    })
}

#[async_trait]
impl ProductStore for PgStore {
    async fn get_product(&self, product_id: &str) -> ShopResult<Option<Product>> {
        let row = query(GET_PRODUCT_SQL)
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(ShopError::storage)?;

        row.as_ref()
            .map(product_from_row)
            .transpose()
            .map_err(ShopError::storage)
    }

    #[instrument(skip(self, product), fields(product_id = %product.id))]
    async fn insert_product(&self, product: Product) -> ShopResult<Product> {
        query(INSERT_PRODUCT_SQL)
            .bind(&product.id)
            .bind(&product.name)
            .bind(&product.description)
            .bind(product.price)
            .bind(product.stock)
            .bind(&product.category)
            .bind(&product.images)
            .bind(product.created_at)
            .execute(&self.pool)
            .await
            .map_err(ShopError::storage)?;

        // A concurrent insert may have won; the stored row is authoritative
        self.get_product(&product.id)
            .await?
            .ok_or_else(|| ShopError::Storage(format!("Product {} missing after insert", product.id)))
    }

    async fn list_products(&self, filter: &ProductFilter) -> ShopResult<Vec<Product>> {
        let rows = query(LIST_PRODUCTS_SQL)
            .bind(filter.category.as_deref())
            .bind(filter.search.as_deref())
            .fetch_all(&self.pool)
            .await
            .map_err(ShopError::storage)?;

        rows.iter()
            .map(product_from_row)
            .collect::<sqlx::Result<Vec<_>>>()
            .map_err(ShopError::storage)
    }
}

#[async_trait]
impl CartStore for PgStore {
    async fn get_cart(&self, user_id: Uuid) -> ShopResult<Option<Cart>> {
        let rows = query(GET_CART_LINES_SQL)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(ShopError::storage)?;

        let Some(first) = rows.first() else {
            return Ok(None);
        };
        let cart_id: Uuid = first.try_get("cart_id").map_err(ShopError::storage)?;

        let mut lines = Vec::with_capacity(rows.len());
        for row in &rows {
            // LEFT JOIN yields a single all-null line for an empty cart
            let item_id: Option<Uuid> = row.try_get("item_id").map_err(ShopError::storage)?;
            let Some(item_id) = item_id else {
                continue;
            };
            lines.push(CartLine {
                item_id,
                quantity: row.try_get("quantity").map_err(ShopError::storage)?,
                product: product_from_row(row).map_err(ShopError::storage)?,
            });
        }

        let mut cart = Cart {
            id: cart_id,
            user_id,
            lines,
        };
        cart.sort_lines();
        Ok(Some(cart))
    }

    async fn get_or_create_cart(&self, user_id: Uuid) -> ShopResult<Uuid> {
        let row = query(GET_OR_CREATE_CART_SQL)
            .bind(Uuid::new_v4())
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(ShopError::storage)?;

        row.try_get("id").map_err(ShopError::storage)
    }

    #[instrument(skip(self))]
    async fn add_item(&self, cart_id: Uuid, product_id: &str, quantity: i32) -> ShopResult<CartItem> {
        let row = query(UPSERT_CART_ITEM_SQL)
            .bind(Uuid::new_v4())
            .bind(cart_id)
            .bind(product_id)
            .bind(quantity)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    ShopError::ProductNotFound {
                        product_id: product_id.to_string(),
                    }
                } else if is_quantity_violation(&e) {
                    ShopError::Validation(format!("Quantity cannot exceed {}", MAX_ITEM_QUANTITY))
                } else {
                    ShopError::storage(e)
                }
            })?;

        cart_item_from_row(&row).map_err(ShopError::storage)
    }

    async fn find_item(&self, item_id: Uuid) -> ShopResult<Option<CartItemRecord>> {
        let row = query(FIND_CART_ITEM_SQL)
            .bind(item_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(ShopError::storage)?;

        row.as_ref()
            .map(|row| {
                Ok(CartItemRecord {
                    item: cart_item_from_row(row)?,
                    owner_id: row.try_get("owner_id")?,
                })
            })
            .transpose()
            .map_err(|e: sqlx::Error| ShopError::storage(e))
    }

    async fn set_quantity(&self, item_id: Uuid, quantity: i32) -> ShopResult<()> {
        if quantity < 1 {
            return Err(ShopError::Validation("Quantity must be at least 1".to_string()));
        }

        let affected = query(SET_CART_ITEM_QUANTITY_SQL)
            .bind(item_id)
            .bind(quantity)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_quantity_violation(&e) {
                    ShopError::Validation(format!("Quantity cannot exceed {}", MAX_ITEM_QUANTITY))
                } else {
                    ShopError::storage(e)
                }
            })?
            .rows_affected();

        if affected == 0 {
            return Err(ShopError::CartItemNotFound {
                item_id: item_id.to_string(),
            });
        }
        Ok(())
    }

    async fn delete_item(&self, item_id: Uuid) -> ShopResult<()> {
        let affected = query(DELETE_CART_ITEM_SQL)
            .bind(item_id)
            .execute(&self.pool)
            .await
            .map_err(ShopError::storage)?
            .rows_affected();

        if affected == 0 {
            return Err(ShopError::CartItemNotFound {
                item_id: item_id.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl OrderStore for PgStore {
    #[instrument(skip(self, order), fields(user_id = %order.user_id))]
    async fn place_order(&self, cart_id: Uuid, order: NewOrder) -> ShopResult<Order> {
        let order = order.into_order();
        let mut tx = self.pool.begin().await.map_err(ShopError::storage)?;

        query(INSERT_ORDER_SQL)
            .bind(order.id)
            .bind(order.user_id)
            .bind(order.total)
            .bind(order.currency.as_str())
            .bind(order.status.as_str())
            .bind(order.payment_method.as_str())
            .bind(order.payment_reference.as_deref())
            .bind(order.attempt_id.as_deref())
            .bind(order.shipping.clone().map(Json))
            .bind(order.created_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    ShopError::Conflict("Order already exists for this checkout attempt".to_string())
                } else {
                    ShopError::storage(e)
                }
            })?;

        for item in &order.items {
            query(INSERT_ORDER_ITEM_SQL)
                .bind(item.id)
                .bind(order.id)
                .bind(&item.product_id)
                .bind(&item.product_name)
                .bind(item.quantity)
                .bind(item.price)
                .execute(&mut *tx)
                .await
                .map_err(ShopError::storage)?;
        }

        let cleared = query(CLEAR_CART_SQL)
            .bind(cart_id)
            .execute(&mut *tx)
            .await
            .map_err(ShopError::storage)?
            .rows_affected();

        tx.commit().await.map_err(ShopError::storage)?;
        debug!(order_id = %order.id, cleared, "Order written and cart cleared");

        Ok(order)
    }

    async fn find_by_attempt(&self, user_id: Uuid, attempt_id: &str) -> ShopResult<Option<Order>> {
        let row = query(FIND_ORDER_BY_ATTEMPT_SQL)
            .bind(user_id)
            .bind(attempt_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(ShopError::storage)?;
        self.fetch_order(row).await
    }

    async fn find_by_payment_reference(&self, reference: &str) -> ShopResult<Option<Order>> {
        let row = query(FIND_ORDER_BY_REFERENCE_SQL)
            .bind(reference)
            .fetch_optional(&self.pool)
            .await
            .map_err(ShopError::storage)?;
        self.fetch_order(row).await
    }

    async fn get_order(&self, order_id: Uuid) -> ShopResult<Option<Order>> {
        let row = query(GET_ORDER_SQL)
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(ShopError::storage)?;
        self.fetch_order(row).await
    }

    async fn list_orders(&self, user_id: Uuid) -> ShopResult<Vec<Order>> {
        let rows = query(LIST_ORDERS_SQL)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(ShopError::storage)?;

        let orders = rows
            .iter()
            .map(order_from_row)
            .collect::<sqlx::Result<Vec<_>>>()
            .map_err(ShopError::storage)?;
        self.with_items(orders).await
    }

    #[instrument(skip(self))]
    async fn update_status(&self, order_id: Uuid, from: OrderStatus, to: OrderStatus) -> ShopResult<bool> {
        let affected = query(UPDATE_ORDER_STATUS_SQL)
            .bind(order_id)
            .bind(from.as_str())
            .bind(to.as_str())
            .execute(&self.pool)
            .await
            .map_err(ShopError::storage)?
            .rows_affected();

        if affected == 0 && self.get_order(order_id).await?.is_none() {
            return Err(ShopError::OrderNotFound {
                order_id: order_id.to_string(),
            });
        }
        Ok(affected == 1)
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn create_user(&self, user: User) -> ShopResult<User> {
        query(INSERT_USER_SQL)
            .bind(user.id)
            .bind(&user.name)
            .bind(&user.email)
            .bind(user.password_hash.as_deref())
            .bind(user.role.as_str())
            .bind(user.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    ShopError::Conflict("Email already registered".to_string())
                } else {
                    ShopError::storage(e)
                }
            })?;
        Ok(user)
    }

    async fn get_user(&self, user_id: Uuid) -> ShopResult<Option<User>> {
        let row = query(GET_USER_SQL)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(ShopError::storage)?;

        row.as_ref()
            .map(user_from_row)
            .transpose()
            .map_err(ShopError::storage)
    }

    async fn find_by_email(&self, email: &str) -> ShopResult<Option<User>> {
        let row = query(FIND_USER_BY_EMAIL_SQL)
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(ShopError::storage)?;

        row.as_ref()
            .map(user_from_row)
            .transpose()
            .map_err(ShopError::storage)
    }

    async fn update_profile(&self, user_id: Uuid, name: &str, email: &str) -> ShopResult<User> {
        let row = query(UPDATE_PROFILE_SQL)
            .bind(user_id)
            .bind(name)
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    ShopError::Conflict("Email already registered".to_string())
                } else {
                    ShopError::storage(e)
                }
            })?;

        match row {
            Some(row) => user_from_row(&row).map_err(ShopError::storage),
            None => Err(ShopError::Unauthenticated),
        }
    }

    async fn list_users(&self) -> ShopResult<Vec<User>> {
        let rows = query(LIST_USERS_SQL)
            .fetch_all(&self.pool)
            .await
            .map_err(ShopError::storage)?;

        rows.iter()
            .map(user_from_row)
            .collect::<sqlx::Result<Vec<_>>>()
            .map_err(ShopError::storage)
    }
}
