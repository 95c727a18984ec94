//! # Shop Error Types
//!
//! Typed error handling for the storefront.
//! Every cart, checkout and payment operation returns `Result<T, ShopError>`.

use thiserror::Error;

/// Core error type for all storefront operations
#[derive(Debug, Error)]
pub enum ShopError {
    /// No authenticated session
    #[error("Not authenticated")]
    Unauthenticated,

    /// Authenticated, but not allowed
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Malformed request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Field-level validation failure
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Checkout attempted with nothing in the cart
    #[error("Cart is empty")]
    EmptyCart,

    /// Configuration errors (missing keys, invalid config)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Product not found locally or in the external catalog
    #[error("Product not found: {product_id}")]
    ProductNotFound { product_id: String },

    /// Cart item missing, or owned by someone else
    #[error("Cart item not found: {item_id}")]
    CartItemNotFound { item_id: String },

    /// Order missing, or owned by someone else
    #[error("Order not found: {order_id}")]
    OrderNotFound { order_id: String },

    /// External catalog fetch failed during add-to-cart
    #[error("Catalog sync failed for product {product_id}: {message}")]
    CatalogSync { product_id: String, message: String },

    /// Payment provider API error
    #[error("Provider error [{provider}]: {message}")]
    ProviderError { provider: String, message: String },

    /// Provider answered but refused the request
    #[error("Payment rejected by {provider} (code {code}): {message}")]
    PaymentRejected {
        provider: String,
        code: String,
        message: String,
    },

    /// Server-side verification did not show a completed payment
    #[error("Payment {reference} not confirmed: {status}")]
    PaymentNotConfirmed { reference: String, status: String },

    /// Network/HTTP error communicating with an upstream service
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Webhook signature or token verification failed
    #[error("Webhook verification failed: {0}")]
    WebhookVerificationFailed(String),

    /// Webhook payload parsing error
    #[error("Webhook parse error: {0}")]
    WebhookParseError(String),

    /// Order status change not allowed
    #[error("Invalid order status transition: {from} -> {to}")]
    InvalidStatusTransition { from: String, to: String },

    /// Uniqueness conflict (duplicate email, duplicate attempt)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Persistence failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error (should not happen)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ShopError {
    /// Returns the HTTP status code appropriate for this error
    pub fn status_code(&self) -> u16 {
        match self {
            ShopError::Unauthenticated => 401,
            ShopError::Forbidden(_) => 403,
            ShopError::InvalidRequest(_) => 400,
            ShopError::Validation(_) => 422,
            ShopError::EmptyCart => 400,
            ShopError::Configuration(_) => 500,
            ShopError::ProductNotFound { .. } => 404,
            ShopError::CartItemNotFound { .. } => 404,
            ShopError::OrderNotFound { .. } => 404,
            ShopError::CatalogSync { .. } => 502,
            ShopError::ProviderError { .. } => 502,
            ShopError::PaymentRejected { .. } => 402,
            ShopError::PaymentNotConfirmed { .. } => 402,
            ShopError::NetworkError(_) => 503,
            ShopError::WebhookVerificationFailed(_) => 401,
            ShopError::WebhookParseError(_) => 400,
            ShopError::InvalidStatusTransition { .. } => 409,
            ShopError::Conflict(_) => 409,
            ShopError::Storage(_) => 500,
            ShopError::Serialization(_) => 500,
            ShopError::Internal(_) => 500,
        }
    }

    /// Short message safe to show to a shopper.
    ///
    /// Upstream and storage failures collapse to generic strings; the full error
    /// is only ever logged server-side.
    pub fn public_message(&self) -> String {
        match self {
            ShopError::Unauthenticated => "You must be logged in".to_string(),
            ShopError::Forbidden(_) => "Forbidden".to_string(),
            ShopError::InvalidRequest(msg) | ShopError::Validation(msg) => msg.clone(),
            ShopError::EmptyCart => "Cart is empty".to_string(),
            ShopError::Configuration(_) => "Payment method unavailable".to_string(),
            ShopError::ProductNotFound { .. } => "Product not found".to_string(),
            ShopError::CartItemNotFound { .. } => "Cart item not found".to_string(),
            ShopError::OrderNotFound { .. } => "Order not found".to_string(),
            ShopError::CatalogSync { .. } => "Failed to sync product data".to_string(),
            ShopError::ProviderError { .. } | ShopError::NetworkError(_) => {
                "Payment provider unavailable".to_string()
            }
            ShopError::PaymentRejected { .. } => "Payment request was rejected".to_string(),
            ShopError::PaymentNotConfirmed { .. } => "Payment has not been confirmed".to_string(),
            ShopError::WebhookVerificationFailed(_) => "Invalid signature".to_string(),
            ShopError::WebhookParseError(_) => "Invalid payload".to_string(),
            ShopError::InvalidStatusTransition { .. } => "Order cannot be updated".to_string(),
            ShopError::Conflict(msg) => msg.clone(),
            ShopError::Storage(_) | ShopError::Serialization(_) | ShopError::Internal(_) => {
                "Operation failed".to_string()
            }
        }
    }

    /// Shorthand for wrapping a storage failure
    pub fn storage(err: impl std::fmt::Display) -> Self {
        ShopError::Storage(err.to_string())
    }
}

/// Result type alias for storefront operations
pub type ShopResult<T> = Result<T, ShopError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ShopError::Unauthenticated.status_code(), 401);
        assert_eq!(ShopError::EmptyCart.status_code(), 400);
        assert_eq!(
            ShopError::PaymentRejected {
                provider: "mpesa".into(),
                code: "1".into(),
                message: "Insufficient balance".into()
            }
            .status_code(),
            402
        );
        assert_eq!(ShopError::storage("disk full").status_code(), 500);
    }

    #[test]
    fn test_public_message_hides_internals() {
        let err = ShopError::Storage("relation \"orders\" does not exist".into());
        assert_eq!(err.public_message(), "Operation failed");

        let err = ShopError::ProviderError {
            provider: "stripe".into(),
            message: "api key sk_test_123 invalid".into(),
        };
        assert!(!err.public_message().contains("sk_test"));
    }
}
