//! # shop-mpesa
//!
//! Safaricom Daraja (M-Pesa Express / STK push) strategy for the Duka
//! storefront.
//!
//! Flow:
//! 1. `initiate` normalizes the payer's phone, authenticates with the
//!    client-credentials endpoint and pushes the prompt.
//! 2. `ResponseCode == "0"` means the prompt was accepted; the orchestrator
//!    records a PENDING order.
//! 3. Daraja later posts the result to `CallBackURL?token=...`;
//!    `verify_webhook` checks the token and turns the callback into a
//!    payment event for settlement.
//!
//! ```rust,ignore
//! use shop_mpesa::MpesaStkStrategy;
//!
//! let strategy = MpesaStkStrategy::from_env()?;
//! selector.register(Arc::new(strategy));
//! ```

pub mod auth;
pub mod callback;
pub mod config;
pub mod phone;
pub mod stk;
pub mod strategy;

pub use callback::StkCallback;
pub use config::MpesaConfig;
pub use phone::normalize_phone;
pub use stk::{password, timestamp, StkPushRequest, StkPushResponse};
pub use strategy::MpesaStkStrategy;
