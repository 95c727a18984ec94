//! # Order Types
//!
//! Orders are immutable snapshots of a cart taken at checkout time. Only their
//! status moves afterwards, through payment settlement or fulfillment.

use crate::cart::Cart;
use crate::error::{ShopError, ShopResult};
use crate::payment::PaymentMethod;
use crate::product::Currency;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Created, payment not yet confirmed
    Pending,
    /// Payment confirmed
    Paid,
    /// Payment failed or was declined
    Failed,
    /// Handed to the carrier
    Shipped,
    /// Received by the customer
    Delivered,
    /// Cancelled before fulfillment
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Paid => "PAID",
            OrderStatus::Failed => "FAILED",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    /// Whether an order in this status may move to `next`
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Paid)
                | (Pending, Failed)
                | (Pending, Cancelled)
                | (Paid, Shipped)
                | (Paid, Cancelled)
                | (Shipped, Delivered)
        )
    }

    /// Validate a transition, returning the target status
    pub fn transition(&self, next: OrderStatus) -> ShopResult<OrderStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(ShopError::InvalidStatusTransition {
                from: self.as_str().to_string(),
                to: next.as_str().to_string(),
            })
        }
    }
}

impl Default for OrderStatus {
    fn default() -> Self {
        OrderStatus::Pending
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(OrderStatus::Pending),
            "PAID" => Ok(OrderStatus::Paid),
            "FAILED" => Ok(OrderStatus::Failed),
            "SHIPPED" => Ok(OrderStatus::Shipped),
            "DELIVERED" => Ok(OrderStatus::Delivered),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            other => Err(format!("Invalid order status: {}", other)),
        }
    }
}

/// Where a physical order ships to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub name: String,
    pub line1: String,
    pub city: String,
    #[serde(default)]
    pub postal_code: String,
    /// ISO 3166-1 alpha-2
    pub country: String,
}

impl ShippingAddress {
    /// Boundary validation: required fields present, country code well-formed
    pub fn validate(&self) -> ShopResult<()> {
        for (field, value) in [("name", &self.name), ("line1", &self.line1), ("city", &self.city)] {
            if value.trim().is_empty() {
                return Err(ShopError::Validation(format!(
                    "Shipping {} is required",
                    field
                )));
            }
        }

        if self.country.len() != 2 || !self.country.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(ShopError::Validation(
                "Shipping country must be a two-letter code".to_string(),
            ));
        }

        Ok(())
    }
}

/// A line item in a placed order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub product_id: String,
    /// Product name (denormalized for display)
    pub product_name: String,
    pub quantity: i32,
    /// Unit price at the time of purchase
    pub price: Decimal,
}

impl OrderItem {
    /// Calculate the total price for this line item
    pub fn total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

/// A placed order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub total: Decimal,
    pub currency: Currency,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    /// Provider-side reference (payment intent id, STK checkout request id)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_reference: Option<String>,
    /// Checkout attempt id (idempotency token)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipping: Option<ShippingAddress>,
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderItem>,
}

impl Order {
    /// Get item count
    pub fn item_count(&self) -> i32 {
        self.items.iter().map(|i| i.quantity).sum()
    }
}

/// Order line to be written
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrderItem {
    pub product_id: String,
    pub product_name: String,
    pub quantity: i32,
    pub price: Decimal,
}

/// Everything needed to write an order in one transaction
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub user_id: Uuid,
    pub total: Decimal,
    pub currency: Currency,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub payment_reference: Option<String>,
    pub attempt_id: Option<String>,
    pub shipping: Option<ShippingAddress>,
    pub items: Vec<NewOrderItem>,
}

impl NewOrder {
    /// Snapshot a cart into an order draft.
    ///
    /// The total and every line price are taken from the cart as it is now;
    /// later product price changes never reach the order.
    pub fn from_cart(cart: &Cart, currency: Currency, method: PaymentMethod, status: OrderStatus) -> Self {
        Self {
            user_id: cart.user_id,
            total: cart.total(),
            currency,
            status,
            payment_method: method,
            payment_reference: None,
            attempt_id: None,
            shipping: None,
            items: cart
                .lines
                .iter()
                .map(|line| NewOrderItem {
                    product_id: line.product.id.clone(),
                    product_name: line.product.name.clone(),
                    quantity: line.quantity,
                    price: line.product.price,
                })
                .collect(),
        }
    }

    pub fn with_payment_reference(mut self, reference: impl Into<String>) -> Self {
        self.payment_reference = Some(reference.into());
        self
    }

    pub fn with_attempt_id(mut self, attempt_id: impl Into<String>) -> Self {
        self.attempt_id = Some(attempt_id.into());
        self
    }

    pub fn with_shipping(mut self, shipping: Option<ShippingAddress>) -> Self {
        self.shipping = shipping;
        self
    }

    /// Materialize into an order with fresh ids
    pub fn into_order(self) -> Order {
        Order {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            total: self.total,
            currency: self.currency,
            status: self.status,
            payment_method: self.payment_method,
            payment_reference: self.payment_reference,
            attempt_id: self.attempt_id,
            shipping: self.shipping,
            created_at: Utc::now(),
            items: self
                .items
                .into_iter()
                .map(|item| OrderItem {
                    id: Uuid::new_v4(),
                    product_id: item.product_id,
                    product_name: item.product_name,
                    quantity: item.quantity,
                    price: item.price,
                })
                .collect(),
        }
    }
}
