//! # shop-stripe
//!
//! Card payments for the Duka storefront through Stripe Payment Intents.
//!
//! 1. The orchestrator calls `initiate` with the server-computed total; the
//!    strategy creates a payment intent and returns its client secret.
//! 2. The browser confirms the card with Stripe using that secret.
//! 3. Before writing the order, `confirmation` re-reads the intent so only a
//!    `succeeded` intent for the right amount becomes a PAID order.
//! 4. Signed `payment_intent.*` webhooks settle orders that were still
//!    `processing`.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use shop_stripe::StripeCardStrategy;
//! use shop_core::{PaymentRequest, PaymentStrategy};
//!
//! let strategy = StripeCardStrategy::from_env()?;
//! let initiation = strategy.initiate(&request).await?;
//!
//! // In your webhook endpoint:
//! let event = strategy.verify_webhook(payload, Some(signature)).await?;
//! checkout.settle_payment(event).await?;
//! ```

pub mod config;
pub mod intent;
pub mod webhook;

// Re-exports
pub use config::StripeConfig;
pub use intent::{StripeCardStrategy, StripePaymentIntent};
pub use webhook::{
    compute_signature, parse_signature_header, sign_payload, verify_signature, StripeEvent,
    REQUIRED_WEBHOOK_EVENTS, SIGNATURE_TOLERANCE_SECS,
};
