//! # Routes
//!
//! Axum router configuration for the storefront API.

use crate::auth;
use crate::handlers;
use crate::state::AppState;
use axum::{
    routing::{get, patch, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Create the main application router
///
/// Routes:
/// - API v1:
///   - POST /api/v1/auth/register, /api/v1/auth/login
///   - GET/POST /api/v1/products
///   - GET /api/v1/cart, POST /api/v1/cart/items
///   - PATCH/DELETE /api/v1/cart/items/{item_id}
///   - GET /api/v1/checkout
///   - POST /api/v1/checkout/card/intent, /api/v1/checkout/card/complete
///   - POST /api/v1/checkout/mobile-money
///   - GET /api/v1/orders, /api/v1/orders/{order_id}
///   - GET/PATCH /api/v1/profile
///   - GET /api/v1/admin/users
///
/// - Webhooks:
///   - POST /webhook/stripe - signed card events
///   - POST /webhook/mpesa?token= - STK callback
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login));

    let cart_routes = Router::new()
        .route("/", get(handlers::get_cart))
        .route("/items", post(handlers::add_cart_item))
        .route(
            "/items/{item_id}",
            patch(handlers::update_cart_item).delete(handlers::remove_cart_item),
        );

    let checkout_routes = Router::new()
        .route("/", get(handlers::checkout_summary))
        .route("/card/intent", post(handlers::create_card_intent))
        .route("/card/complete", post(handlers::complete_card_order))
        .route("/mobile-money", post(handlers::mobile_money_checkout));

    let api_routes = Router::new()
        .nest("/auth", auth_routes)
        .route(
            "/products",
            get(handlers::list_products).post(handlers::create_product),
        )
        .nest("/cart", cart_routes)
        .nest("/checkout", checkout_routes)
        .route("/orders", get(handlers::list_orders))
        .route("/orders/{order_id}", get(handlers::get_order))
        .route(
            "/profile",
            get(handlers::get_profile).patch(handlers::update_profile),
        )
        .route("/admin/users", get(handlers::list_users));

    // Raw bodies; providers are not browsers, so no CORS here
    let webhook_routes = Router::new()
        .route("/stripe", post(handlers::stripe_webhook))
        .route("/mpesa", post(handlers::mpesa_callback));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/", get(handlers::health))
        .nest("/api/v1", api_routes.layer(cors))
        .nest("/webhook", webhook_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
