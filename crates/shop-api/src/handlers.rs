//! # Request Handlers
//!
//! Axum request handlers for the storefront API.
//! Handlers only translate HTTP into core calls; every rule lives in
//! `CartService` and `CheckoutOrchestrator`.

use crate::auth::{require_admin, MaybeSession};
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shop_core::{
    require_session, Cart, CartLine, CardIntent, CheckoutSummary, Currency, MobileMoneyCheckout,
    NewProduct, Order, PaymentEvent, PaymentOutcome, Product, ProductFilter, ShippingAddress,
    ShopError, User, CART_VIEW,
};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

// =============================================================================
// Errors
// =============================================================================

/// `ShopError` rendered as `{"error": ...}` with the mapped status code
#[derive(Debug)]
pub struct ApiError(pub ShopError);

pub type ApiResult<T> = Result<T, ApiError>;

impl From<ShopError> for ApiError {
    fn from(err: ShopError) -> Self {
        ApiError(err)
    }
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        } else {
            warn!(error = %self.0, %status, "Request rejected");
        }

        let body = ErrorResponse {
            error: self.0.public_message(),
        };
        (status, Json(body)).into_response()
    }
}

/// Run `validator` rules, joining field messages into one validation error
pub fn validate(request: &impl Validate) -> Result<(), ShopError> {
    request.validate().map_err(|errors| {
        let mut messages: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| {
                    e.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("{} is invalid", field))
                })
            })
            .collect();
        messages.sort();
        ShopError::Validation(messages.join("; "))
    })
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// Cart as returned to the client; an absent cart is an empty one
#[derive(Debug, Serialize)]
pub struct CartResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cart_id: Option<Uuid>,
    pub lines: Vec<CartLine>,
    pub total: Decimal,
    pub item_count: i32,
    pub currency: Currency,
}

impl CartResponse {
    fn new(cart: Option<Cart>, currency: Currency) -> Self {
        match cart {
            Some(cart) => Self {
                cart_id: Some(cart.id),
                total: cart.total(),
                item_count: cart.item_count(),
                lines: cart.lines,
                currency,
            },
            None => Self {
                cart_id: None,
                lines: Vec::new(),
                total: Decimal::ZERO,
                item_count: 0,
                currency,
            },
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddItemRequest {
    #[validate(length(min = 1, max = 64, message = "Product id is required"))]
    pub product_id: String,
    #[serde(default = "default_quantity")]
    #[validate(range(min = 1, max = 999, message = "Quantity must be between 1 and 999"))]
    pub quantity: i32,
}

fn default_quantity() -> i32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct UpdateQuantityRequest {
    /// Zero or below removes the item
    pub quantity: i32,
}

#[derive(Debug, Default, Deserialize)]
pub struct CardIntentRequest {
    #[serde(default)]
    pub attempt_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CompleteCardRequest {
    #[validate(length(min = 1, max = 255, message = "Payment intent id is required"))]
    pub payment_intent_id: String,
    #[serde(default)]
    pub attempt_id: Option<String>,
    #[serde(default)]
    pub shipping: Option<ShippingAddress>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct MobileMoneyRequest {
    #[validate(length(min = 9, max = 16, message = "Phone number is invalid"))]
    pub phone_number: String,
    #[serde(default)]
    pub attempt_id: Option<String>,
    #[serde(default)]
    pub shipping: Option<ShippingAddress>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 200, message = "Name is required"))]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: Decimal,
    #[serde(default)]
    #[validate(range(min = 0, message = "Stock cannot be negative"))]
    pub stock: i32,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub images: Vec<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 100, message = "Name is required"))]
    pub name: String,
    #[validate(email(message = "Email is invalid"))]
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub token: Option<String>,
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "duka",
        "version": env!("CARGO_PKG_VERSION"),
        "payment_methods": state.checkout.strategies().methods(),
    }))
}

/// Local products, optionally filtered by `?category=&search=`
pub async fn list_products(
    State(state): State<AppState>,
    Query(filter): Query<ProductFilter>,
) -> ApiResult<impl IntoResponse> {
    let products = state.stores.products.list_products(&filter).await?;
    Ok(Json(serde_json::json!({
        "count": products.len(),
        "products": products,
    })))
}

/// Admin: create a product
#[instrument(skip(state, session, request), fields(name = %request.name))]
pub async fn create_product(
    State(state): State<AppState>,
    session: MaybeSession,
    Json(request): Json<CreateProductRequest>,
) -> ApiResult<(StatusCode, Json<Product>)> {
    require_admin(session.session())?;
    validate(&request)?;

    let product = NewProduct {
        name: request.name,
        description: request.description,
        price: request.price,
        stock: request.stock,
        category: request.category,
        images: request.images,
    }
    .into_product()?;

    let product = state.stores.products.insert_product(product).await?;
    info!(product_id = %product.id, "Product created");
    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn get_cart(State(state): State<AppState>, session: MaybeSession) -> ApiResult<Json<CartResponse>> {
    let cart = state.carts.get_cart(session.session()).await?;
    Ok(Json(CartResponse::new(cart, state.checkout.currency())))
}

#[instrument(skip(state, session, request), fields(product_id = %request.product_id))]
pub async fn add_cart_item(
    State(state): State<AppState>,
    session: MaybeSession,
    Json(request): Json<AddItemRequest>,
) -> ApiResult<Json<CartResponse>> {
    validate(&request)?;
    let cart = state
        .carts
        .add_item(session.session(), &request.product_id, request.quantity)
        .await?;
    Ok(Json(CartResponse::new(Some(cart), state.checkout.currency())))
}

pub async fn update_cart_item(
    State(state): State<AppState>,
    session: MaybeSession,
    Path(item_id): Path<Uuid>,
    Json(request): Json<UpdateQuantityRequest>,
) -> ApiResult<StatusCode> {
    state
        .carts
        .set_item_quantity(session.session(), item_id, request.quantity)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn remove_cart_item(
    State(state): State<AppState>,
    session: MaybeSession,
    Path(item_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.carts.remove_item(session.session(), item_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Checkout summary; an empty cart sends the shopper back to the cart view
pub async fn checkout_summary(State(state): State<AppState>, session: MaybeSession) -> ApiResult<Response> {
    match state.checkout.summary(session.session()).await {
        Ok(summary) => Ok(Json::<CheckoutSummary>(summary).into_response()),
        Err(ShopError::EmptyCart) => Ok(Redirect::to(CART_VIEW).into_response()),
        Err(e) => Err(e.into()),
    }
}

pub async fn create_card_intent(
    State(state): State<AppState>,
    session: MaybeSession,
    Json(request): Json<CardIntentRequest>,
) -> ApiResult<Json<CardIntent>> {
    let intent = state
        .checkout
        .start_card_checkout(session.session(), request.attempt_id)
        .await?;
    Ok(Json(intent))
}

pub async fn complete_card_order(
    State(state): State<AppState>,
    session: MaybeSession,
    Json(request): Json<CompleteCardRequest>,
) -> ApiResult<(StatusCode, Json<Order>)> {
    validate(&request)?;
    let order = state
        .checkout
        .finalize_card_order(
            session.session(),
            &request.payment_intent_id,
            request.shipping,
            request.attempt_id,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

pub async fn mobile_money_checkout(
    State(state): State<AppState>,
    session: MaybeSession,
    Json(request): Json<MobileMoneyRequest>,
) -> ApiResult<(StatusCode, Json<MobileMoneyCheckout>)> {
    require_session(session.session())?;
    validate(&request)?;
    let placed = state
        .checkout
        .checkout_mobile_money(
            session.session(),
            &request.phone_number,
            request.shipping,
            request.attempt_id,
        )
        .await?;
    Ok((StatusCode::ACCEPTED, Json(placed)))
}

pub async fn list_orders(State(state): State<AppState>, session: MaybeSession) -> ApiResult<Json<Vec<Order>>> {
    Ok(Json(state.checkout.order_history(session.session()).await?))
}

pub async fn get_order(
    State(state): State<AppState>,
    session: MaybeSession,
    Path(order_id): Path<Uuid>,
) -> ApiResult<Json<Order>> {
    Ok(Json(state.checkout.get_order(session.session(), order_id).await?))
}

pub async fn get_profile(State(state): State<AppState>, session: MaybeSession) -> ApiResult<Json<User>> {
    let session = require_session(session.session())?;
    let user = state
        .stores
        .users
        .get_user(session.user_id)
        .await?
        .ok_or(ShopError::Unauthenticated)?;
    Ok(Json(user))
}

pub async fn update_profile(
    State(state): State<AppState>,
    session: MaybeSession,
    Json(request): Json<UpdateProfileRequest>,
) -> ApiResult<Json<User>> {
    let session = require_session(session.session())?;
    validate(&request)?;
    let user = state
        .stores
        .users
        .update_profile(
            session.user_id,
            request.name.trim(),
            &request.email.trim().to_lowercase(),
        )
        .await?;
    Ok(Json(user))
}

/// Admin: every account
pub async fn list_users(State(state): State<AppState>, session: MaybeSession) -> ApiResult<Json<Vec<User>>> {
    require_admin(session.session())?;
    Ok(Json(state.stores.users.list_users().await?))
}

// =============================================================================
// Webhooks
// =============================================================================

/// Handle Stripe webhook (raw body is needed for signature verification)
#[instrument(skip(state, headers, body))]
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<serde_json::Value>> {
    let signature = headers.get("stripe-signature").and_then(|h| h.to_str().ok());

    let strategy = state
        .checkout
        .strategies()
        .by_provider("stripe")
        .cloned()
        .ok_or_else(|| ShopError::Configuration("Stripe is not configured".to_string()))?;

    let event = strategy.verify_webhook(&body, signature).await?;
    settle(&state, event).await?;

    Ok(Json(serde_json::json!({ "received": true })))
}

/// Handle the Daraja STK callback. The URL carries `?token=` since Daraja does not sign callbacks.
#[instrument(skip(state, query, body))]
pub async fn mpesa_callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
    body: Bytes,
) -> ApiResult<Json<serde_json::Value>> {
    let strategy = state
        .checkout
        .strategies()
        .by_provider("mpesa")
        .cloned()
        .ok_or_else(|| ShopError::Configuration("M-Pesa is not configured".to_string()))?;

    let event = strategy.verify_webhook(&body, query.token.as_deref()).await?;
    settle(&state, event).await?;

    Ok(Json(serde_json::json!({ "ResultCode": 0, "ResultDesc": "Accepted" })))
}

/// Settle a verified event. Late or conflicting events are acknowledged so the
/// provider stops redelivering them.
async fn settle(state: &AppState, event: PaymentEvent) -> Result<(), ShopError> {
    let reference = event.reference.clone();
    let succeeded = matches!(event.outcome, PaymentOutcome::Succeeded);

    match state.checkout.settle_payment(event).await {
        Ok(Some(order)) => {
            info!(order_id = %order.id, status = %order.status, succeeded, "Payment event applied");
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(ShopError::InvalidStatusTransition { from, to }) => {
            warn!(%reference, %from, %to, "Ignoring payment event for settled order");
            Ok(())
        }
        Err(e) => Err(e),
    }
}
