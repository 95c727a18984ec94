//! # shop-api
//!
//! HTTP API layer for the Duka storefront.
//!
//! This crate provides:
//! - Axum-based HTTP server
//! - Bearer-token sessions and account endpoints
//! - REST endpoints for products, cart, checkout and orders
//! - Webhook handlers for card and mobile-money payment events
//!
//! ## Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | `/health` | Health check |
//! | POST | `/api/v1/auth/register` | Create account |
//! | POST | `/api/v1/auth/login` | Issue bearer token |
//! | GET | `/api/v1/products` | List products |
//! | POST | `/api/v1/products` | Create product (admin) |
//! | GET | `/api/v1/cart` | Get cart |
//! | POST | `/api/v1/cart/items` | Add item |
//! | PATCH | `/api/v1/cart/items/{item_id}` | Set quantity |
//! | DELETE | `/api/v1/cart/items/{item_id}` | Remove item |
//! | GET | `/api/v1/checkout` | Checkout summary |
//! | POST | `/api/v1/checkout/card/intent` | Create payment intent |
//! | POST | `/api/v1/checkout/card/complete` | Finalize card order |
//! | POST | `/api/v1/checkout/mobile-money` | STK push checkout |
//! | GET | `/api/v1/orders` | Order history |
//! | GET | `/api/v1/orders/{order_id}` | Get order |
//! | GET/PATCH | `/api/v1/profile` | Read or update profile |
//! | GET | `/api/v1/admin/users` | List users (admin) |
//! | POST | `/webhook/stripe` | Stripe webhook |
//! | POST | `/webhook/mpesa` | M-Pesa STK callback |

pub mod auth;
pub mod handlers;
pub mod routes;
pub mod state;

pub use handlers::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::{AppConfig, AppState};
