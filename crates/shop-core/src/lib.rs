//! # shop-core
//!
//! Core types and traits for the Duka storefront.
//!
//! This crate provides:
//! - `CartService` for per-user carts with lazy catalog sync
//! - `CheckoutOrchestrator` for turning a cart into an order exactly once
//! - `PaymentStrategy` trait for implementing payment providers
//! - Storage ports (`ProductStore`, `CartStore`, `OrderStore`, `UserStore`)
//! - `ShopError` for typed error handling
//!
//! ## Example
//!
//! ```rust,ignore
//! use shop_core::{CheckoutOrchestrator, PaymentMethod, PaymentStrategySelector};
//!
//! let strategies = PaymentStrategySelector::new()
//!     .with_strategy(Arc::new(stripe))
//!     .with_strategy(Arc::new(mpesa));
//!
//! let checkout = CheckoutOrchestrator::new(carts, orders, strategies, invalidator, Currency::KES);
//!
//! let summary = checkout.summary(Some(&session)).await?;
//! let pending = checkout
//!     .checkout_mobile_money(Some(&session), "0712345678", None, None)
//!     .await?;
//! ```

pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod error;
pub mod order;
pub mod payment;
pub mod product;
pub mod store;
pub mod user;

// Re-exports for convenience
pub use cart::{
    Cart, CartItem, CartItemRecord, CartLine, CartService, LoggingInvalidator, ViewInvalidator,
    CART_VIEW, MAX_ITEM_QUANTITY, PRODUCTS_VIEW,
};
pub use catalog::{CatalogGateway, CatalogProduct};
pub use checkout::{
    CardIntent, CheckoutOrchestrator, CheckoutSummary, MobileMoneyCheckout, UserLockGuard, UserLocks,
};
pub use error::{ShopError, ShopResult};
pub use order::{NewOrder, NewOrderItem, Order, OrderItem, OrderStatus, ShippingAddress};
pub use payment::{
    BoxedPaymentStrategy, PaymentConfirmation, PaymentEvent, PaymentInitiation, PaymentMethod,
    PaymentOutcome, PaymentRequest, PaymentStrategy, PaymentStrategySelector,
};
pub use product::{
    normalize_price, whole_units, Currency, NewProduct, Product, ProductCatalog, ProductFilter,
    PRICE_SCALE,
};
pub use store::{CartStore, OrderStore, ProductStore, UserStore};
pub use user::{require_session, Role, Session, User};
