//! # Cart
//!
//! Per-user shopping cart. A user owns at most one cart, created lazily on the
//! first add. Products unknown to local storage are synced from the external
//! catalog before the cart is touched.

use crate::catalog::CatalogGateway;
use crate::error::{ShopError, ShopResult};
use crate::product::Product;
use crate::store::{CartStore, ProductStore};
use crate::user::{require_session, Session};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Cached view paths touched by cart mutations
pub const CART_VIEW: &str = "/cart";
pub const PRODUCTS_VIEW: &str = "/products";

/// Upper bound on the quantity of a single cart line
pub const MAX_ITEM_QUANTITY: i32 = 999;

/// A cart line: a cart item joined with its product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    pub item_id: Uuid,
    pub product: Product,
    pub quantity: i32,
}

impl CartLine {
    pub fn line_total(&self) -> Decimal {
        self.product.price * Decimal::from(self.quantity)
    }
}

/// A user's cart with lines sorted by product name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    pub id: Uuid,
    pub user_id: Uuid,
    pub lines: Vec<CartLine>,
}

impl Cart {
    /// Sum of price × quantity over all lines
    pub fn total(&self) -> Decimal {
        self.lines.iter().map(CartLine::line_total).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Total number of units across lines
    pub fn item_count(&self) -> i32 {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    /// Sort lines by product name
    pub fn sort_lines(&mut self) {
        self.lines.sort_by(|a, b| a.product.name.cmp(&b.product.name));
    }
}

/// A stored cart row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: Uuid,
    pub cart_id: Uuid,
    pub product_id: String,
    pub quantity: i32,
}

/// A cart item together with the user owning its cart
#[derive(Debug, Clone, PartialEq)]
pub struct CartItemRecord {
    pub item: CartItem,
    pub owner_id: Uuid,
}

/// Invalidates cached renderings of a path after a mutation.
///
/// The storefront front-end caches `/cart` and `/products`; the backend only
/// signals that they are stale.
pub trait ViewInvalidator: Send + Sync {
    fn invalidate(&self, path: &str);
}

/// Invalidator that only records the event in the log
#[derive(Debug, Clone, Default)]
pub struct LoggingInvalidator;

impl ViewInvalidator for LoggingInvalidator {
    fn invalidate(&self, path: &str) {
        debug!(path, "View invalidated");
    }
}

/// Cart operations on behalf of an authenticated user
#[derive(Clone)]
pub struct CartService {
    products: Arc<dyn ProductStore>,
    carts: Arc<dyn CartStore>,
    catalog: Arc<dyn CatalogGateway>,
    invalidator: Arc<dyn ViewInvalidator>,
}

impl CartService {
    pub fn new(
        products: Arc<dyn ProductStore>,
        carts: Arc<dyn CartStore>,
        catalog: Arc<dyn CatalogGateway>,
        invalidator: Arc<dyn ViewInvalidator>,
    ) -> Self {
        Self {
            products,
            carts,
            catalog,
            invalidator,
        }
    }

    /// The session user's cart, or `None` if they never added anything
    pub async fn get_cart(&self, session: Option<&Session>) -> ShopResult<Option<Cart>> {
        let session = require_session(session)?;
        self.carts.get_cart(session.user_id).await
    }

    /// Add `quantity` units of a product, syncing it from the catalog if needed.
    #[instrument(skip(self, session), fields(user_id))]
    pub async fn add_item(
        &self,
        session: Option<&Session>,
        product_id: &str,
        quantity: i32,
    ) -> ShopResult<Cart> {
        let session = require_session(session)?;
        tracing::Span::current().record("user_id", tracing::field::display(session.user_id));

        if quantity < 1 {
            return Err(ShopError::Validation(
                "Quantity must be at least 1".to_string(),
            ));
        }

        let current = self
            .carts
            .get_cart(session.user_id)
            .await?
            .and_then(|cart| {
                cart.lines
                    .into_iter()
                    .find(|line| line.product.id == product_id)
            })
            .map_or(0, |line| line.quantity);
        if current
            .checked_add(quantity)
            .map_or(true, |total| total > MAX_ITEM_QUANTITY)
        {
            return Err(quantity_too_large());
        }

        self.ensure_product(product_id).await?;

        let cart_id = self.carts.get_or_create_cart(session.user_id).await?;
        let item = self.carts.add_item(cart_id, product_id, quantity).await?;
        debug!(item_id = %item.id, quantity = item.quantity, "Cart item upserted");

        self.invalidator.invalidate(CART_VIEW);
        self.invalidator.invalidate(PRODUCTS_VIEW);

        self.carts
            .get_cart(session.user_id)
            .await?
            .ok_or_else(|| ShopError::Internal("Cart vanished after add".to_string()))
    }

    /// Overwrite an item's quantity; zero or below deletes it.
    #[instrument(skip(self, session))]
    pub async fn set_item_quantity(
        &self,
        session: Option<&Session>,
        item_id: Uuid,
        quantity: i32,
    ) -> ShopResult<()> {
        let session = require_session(session)?;
        self.owned_item(session, item_id).await?;

        if quantity > MAX_ITEM_QUANTITY {
            return Err(quantity_too_large());
        }
        if quantity <= 0 {
            self.carts.delete_item(item_id).await?;
        } else {
            self.carts.set_quantity(item_id, quantity).await?;
        }

        self.invalidator.invalidate(CART_VIEW);
        Ok(())
    }

    #[instrument(skip(self, session))]
    pub async fn remove_item(&self, session: Option<&Session>, item_id: Uuid) -> ShopResult<()> {
        let session = require_session(session)?;
        self.owned_item(session, item_id).await?;
        self.carts.delete_item(item_id).await?;
        self.invalidator.invalidate(CART_VIEW);
        Ok(())
    }

    /// Look up a product locally, falling back to the external catalog
    async fn ensure_product(&self, product_id: &str) -> ShopResult<Product> {
        if let Some(product) = self.products.get_product(product_id).await? {
            return Ok(product);
        }

        info!(product_id, "Product not stored locally, syncing from catalog");
        let record = self.catalog.fetch_product(product_id).await.map_err(|e| {
            warn!(product_id, error = %e, "Catalog sync failed");
            match e {
                ShopError::CatalogSync { .. } => e,
                other => ShopError::CatalogSync {
                    product_id: product_id.to_string(),
                    message: other.to_string(),
                },
            }
        })?;

        // Cart rows reference the id the caller used, whatever the catalog echoes
        let mut product = Product::from_catalog(record);
        if product.id != product_id {
            warn!(product_id, catalog_id = %product.id, "Catalog record id differs from requested id");
            product.id = product_id.to_string();
        }
        self.products.insert_product(product).await
    }

    /// Fetch an item and check it sits in the session user's cart
    async fn owned_item(&self, session: &Session, item_id: Uuid) -> ShopResult<CartItem> {
        match self.carts.find_item(item_id).await? {
            Some(record) if record.owner_id == session.user_id => Ok(record.item),
            Some(_) => {
                warn!(%item_id, user_id = %session.user_id, "Cart item belongs to another user");
                Err(ShopError::CartItemNotFound {
                    item_id: item_id.to_string(),
                })
            }
            None => Err(ShopError::CartItemNotFound {
                item_id: item_id.to_string(),
            }),
        }
    }
}

fn quantity_too_large() -> ShopError {
    ShopError::Validation(format!("Quantity cannot exceed {}", MAX_ITEM_QUANTITY))
}
