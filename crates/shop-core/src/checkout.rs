//! # Checkout Orchestrator
//!
//! Turns a non-empty cart into a paid or payment-pending order, at most once
//! per checkout attempt.
//!
//! ```text
//! summary ──► start_card_checkout ──► (client confirms) ──► finalize_card_order ─┐
//!    │                                                                           ├─► order + empty cart
//!    └──────────────► checkout_mobile_money (STK push acknowledged) ─────────────┘
//!
//! settle_payment ◄── verified webhook / STK callback  (PENDING → PAID | FAILED)
//! ```
//!
//! Order creation runs under a per-user lock and always re-reads the cart, so
//! the charged amount comes from server-side state only.

use crate::cart::{Cart, CartLine, ViewInvalidator, CART_VIEW};
use crate::error::{ShopError, ShopResult};
use crate::order::{NewOrder, Order, OrderStatus, ShippingAddress};
use crate::payment::{
    BoxedPaymentStrategy, PaymentConfirmation, PaymentEvent, PaymentInitiation, PaymentMethod,
    PaymentOutcome, PaymentRequest, PaymentStrategySelector,
};
use crate::product::Currency;
use crate::store::{CartStore, OrderStore};
use crate::user::{require_session, Session};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OwnedMutexGuard;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// What the buyer sees before paying
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutSummary {
    pub cart_id: Uuid,
    pub lines: Vec<CartLine>,
    pub total: Decimal,
    pub currency: Currency,
    pub item_count: i32,
    /// Payment methods currently configured
    pub payment_methods: Vec<PaymentMethod>,
}

/// Card intent handed to the client-side payment widget
#[derive(Debug, Clone, Serialize)]
pub struct CardIntent {
    pub attempt_id: String,
    pub intent_id: String,
    pub client_secret: String,
    pub amount: Decimal,
    pub amount_minor: i64,
    pub currency: Currency,
}

/// Result of an accepted mobile-money push
#[derive(Debug, Clone, Serialize)]
pub struct MobileMoneyCheckout {
    pub order: Order,
    /// Provider text to show the payer (e.g. "Success. Request accepted for processing")
    pub customer_message: String,
}

/// One async mutex per user, serializing order creation.
///
/// Entries live only while someone holds or waits on them; the last guard out
/// removes the user's entry.
#[derive(Debug, Default)]
pub struct UserLocks {
    locks: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for and hold the user's checkout lock
    pub async fn acquire(&self, user_id: Uuid) -> UserLockGuard<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(user_id).or_default().clone()
        };
        let guard = lock.clone().lock_owned().await;
        UserLockGuard {
            locks: self,
            user_id,
            lock,
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Held checkout lock for one user
pub struct UserLockGuard<'a> {
    locks: &'a UserLocks,
    user_id: Uuid,
    lock: Arc<tokio::sync::Mutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for UserLockGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.locks.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Map entry plus our handle: nobody else is waiting
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.user_id);
        }
    }
}

/// Sequences cart read, total, provider call, and order persistence
pub struct CheckoutOrchestrator {
    carts: Arc<dyn CartStore>,
    orders: Arc<dyn OrderStore>,
    strategies: PaymentStrategySelector,
    invalidator: Arc<dyn ViewInvalidator>,
    currency: Currency,
    locks: UserLocks,
}

impl CheckoutOrchestrator {
    pub fn new(
        carts: Arc<dyn CartStore>,
        orders: Arc<dyn OrderStore>,
        strategies: PaymentStrategySelector,
        invalidator: Arc<dyn ViewInvalidator>,
        currency: Currency,
    ) -> Self {
        Self {
            carts,
            orders,
            strategies,
            invalidator,
            currency,
            locks: UserLocks::new(),
        }
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn strategies(&self) -> &PaymentStrategySelector {
        &self.strategies
    }

    /// Cart lines and server-computed total. Fails with `EmptyCart` when there is nothing to buy.
    pub async fn summary(&self, session: Option<&Session>) -> ShopResult<CheckoutSummary> {
        let session = require_session(session)?;
        let cart = self.non_empty_cart(session.user_id).await?;

        Ok(CheckoutSummary {
            cart_id: cart.id,
            total: cart.total(),
            item_count: cart.item_count(),
            lines: cart.lines,
            currency: self.currency,
            payment_methods: self.strategies.methods(),
        })
    }

    /// Create a card payment intent for the current cart total. No order is written.
    #[instrument(skip(self, session), fields(user_id))]
    pub async fn start_card_checkout(
        &self,
        session: Option<&Session>,
        attempt_id: Option<String>,
    ) -> ShopResult<CardIntent> {
        let session = require_session(session)?;
        tracing::Span::current().record("user_id", tracing::field::display(session.user_id));

        let cart = self.non_empty_cart(session.user_id).await?;
        let strategy = self.strategies.require(PaymentMethod::Card)?;

        let attempt_id = attempt_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let amount = cart.total();
        let request = PaymentRequest::new(&attempt_id, session.user_id, amount, self.currency);

        match strategy.initiate(&request).await? {
            PaymentInitiation::IntentCreated {
                intent_id,
                client_secret,
                amount_minor,
            } => {
                info!(%intent_id, amount_minor, "Card payment intent created");
                Ok(CardIntent {
                    attempt_id,
                    intent_id,
                    client_secret,
                    amount,
                    amount_minor,
                    currency: self.currency,
                })
            }
            other => Err(ShopError::Internal(format!(
                "Card provider returned unexpected initiation: {:?}",
                other
            ))),
        }
    }

    /// Verify a confirmed card intent and turn the cart into an order.
    ///
    /// `succeeded` with the expected amount gives a PAID order, `processing`
    /// gives a PENDING one settled later by the webhook. Anything else is
    /// rejected and the cart is left alone.
    #[instrument(skip(self, session, shipping), fields(user_id))]
    pub async fn finalize_card_order(
        &self,
        session: Option<&Session>,
        payment_intent_id: &str,
        shipping: Option<ShippingAddress>,
        attempt_id: Option<String>,
    ) -> ShopResult<Order> {
        let session = require_session(session)?;
        tracing::Span::current().record("user_id", tracing::field::display(session.user_id));

        if payment_intent_id.trim().is_empty() {
            return Err(ShopError::InvalidRequest(
                "Payment intent id is required".to_string(),
            ));
        }
        if let Some(address) = &shipping {
            address.validate()?;
        }

        let attempt_id = attempt_id.unwrap_or_else(|| payment_intent_id.to_string());
        let _guard = self.locks.acquire(session.user_id).await;

        if let Some(existing) = self.existing_order(session.user_id, &attempt_id).await? {
            return Ok(existing);
        }
        if let Some(existing) = self.orders.find_by_payment_reference(payment_intent_id).await? {
            if existing.user_id == session.user_id {
                info!(order_id = %existing.id, "Intent already finalized");
                return Ok(existing);
            }
            return Err(ShopError::Conflict(
                "Payment already used for another order".to_string(),
            ));
        }

        let cart = self.non_empty_cart(session.user_id).await?;
        let expected_minor = self.currency.to_minor_units(cart.total())?;

        let strategy = self.strategies.require(PaymentMethod::Card)?;
        let confirmation = strategy.confirmation(payment_intent_id).await?;
        check_payer(payment_intent_id, session.user_id, &confirmation)?;

        let status = match confirmation {
            PaymentConfirmation::Succeeded { amount_minor, .. } if amount_minor == expected_minor => {
                OrderStatus::Paid
            }
            PaymentConfirmation::Succeeded { amount_minor, .. } => {
                warn!(amount_minor, expected_minor, "Intent amount does not match cart total");
                return Err(ShopError::PaymentNotConfirmed {
                    reference: payment_intent_id.to_string(),
                    status: "amount_mismatch".to_string(),
                });
            }
            PaymentConfirmation::Processing { .. } => OrderStatus::Pending,
            PaymentConfirmation::Failed { reason } => {
                return Err(ShopError::PaymentNotConfirmed {
                    reference: payment_intent_id.to_string(),
                    status: reason,
                });
            }
            PaymentConfirmation::RequiresAction { status } => {
                return Err(ShopError::PaymentNotConfirmed {
                    reference: payment_intent_id.to_string(),
                    status,
                });
            }
        };

        let draft = NewOrder::from_cart(&cart, self.currency, PaymentMethod::Card, status)
            .with_payment_reference(payment_intent_id)
            .with_attempt_id(&attempt_id)
            .with_shipping(shipping);

        let order = self.place(cart.id, draft).await?;
        if order.status != OrderStatus::Pending {
            return Ok(order);
        }
        self.recheck_pending_card(&strategy, order, expected_minor).await
    }

    /// Re-read a card payment after its PENDING order is committed.
    ///
    /// A `succeeded` webhook that lands between the first confirmation and the
    /// insert finds no order and is dropped, so the order would otherwise stay
    /// PENDING. Provider errors here leave the order as it is.
    async fn recheck_pending_card(
        &self,
        strategy: &BoxedPaymentStrategy,
        order: Order,
        expected_minor: i64,
    ) -> ShopResult<Order> {
        let Some(reference) = order.payment_reference.as_deref() else {
            return Ok(order);
        };

        let confirmation = match strategy.confirmation(reference).await {
            Ok(confirmation) => confirmation,
            Err(e) => {
                warn!(order_id = %order.id, error = %e, "Could not re-check pending card payment");
                return Ok(order);
            }
        };

        let target = match confirmation {
            PaymentConfirmation::Succeeded { amount_minor, payer }
                if amount_minor == expected_minor && payer == Some(order.user_id) =>
            {
                OrderStatus::Paid
            }
            PaymentConfirmation::Failed { .. } => OrderStatus::Failed,
            _ => return Ok(order),
        };

        if self.orders.update_status(order.id, OrderStatus::Pending, target).await? {
            info!(order_id = %order.id, to = %target, "Pending card order settled on re-check");
            return Ok(Order {
                status: target,
                ..order
            });
        }

        // A webhook got there first
        self.orders
            .get_order(order.id)
            .await?
            .ok_or_else(|| ShopError::OrderNotFound {
                order_id: order.id.to_string(),
            })
    }

    /// Push an STK prompt for the cart total and record a PENDING order on acceptance.
    #[instrument(skip(self, session, phone_number, shipping), fields(user_id))]
    pub async fn checkout_mobile_money(
        &self,
        session: Option<&Session>,
        phone_number: &str,
        shipping: Option<ShippingAddress>,
        attempt_id: Option<String>,
    ) -> ShopResult<MobileMoneyCheckout> {
        let session = require_session(session)?;
        tracing::Span::current().record("user_id", tracing::field::display(session.user_id));

        if phone_number.trim().is_empty() {
            return Err(ShopError::Validation("Phone number is required".to_string()));
        }
        if let Some(address) = &shipping {
            address.validate()?;
        }

        let attempt_id = attempt_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let _guard = self.locks.acquire(session.user_id).await;

        if let Some(order) = self.existing_order(session.user_id, &attempt_id).await? {
            return Ok(MobileMoneyCheckout {
                order,
                customer_message: "Request already submitted".to_string(),
            });
        }

        let cart = self.non_empty_cart(session.user_id).await?;
        let strategy = self.strategies.require(PaymentMethod::MobileMoney)?;

        let request = PaymentRequest::new(&attempt_id, session.user_id, cart.total(), self.currency)
            .with_phone_number(phone_number.trim())
            .with_description(format!("Order {}", &attempt_id));

        let PaymentInitiation::PushAccepted {
            checkout_request_id,
            merchant_request_id,
            customer_message,
        } = strategy.initiate(&request).await?
        else {
            return Err(ShopError::Internal(
                "Mobile-money provider returned a card intent".to_string(),
            ));
        };
        info!(%checkout_request_id, %merchant_request_id, "STK push accepted");

        let draft = NewOrder::from_cart(&cart, self.currency, PaymentMethod::MobileMoney, OrderStatus::Pending)
            .with_payment_reference(checkout_request_id)
            .with_attempt_id(&attempt_id)
            .with_shipping(shipping);

        let order = self.place(cart.id, draft).await?;
        Ok(MobileMoneyCheckout {
            order,
            customer_message,
        })
    }

    /// Apply a verified provider event to the order it references.
    ///
    /// Only PENDING orders move. Re-delivery for an order already in the target
    /// status is a no-op; unknown references are ignored.
    #[instrument(skip(self, event), fields(provider = %event.provider, reference = %event.reference))]
    pub async fn settle_payment(&self, event: PaymentEvent) -> ShopResult<Option<Order>> {
        let target = match &event.outcome {
            PaymentOutcome::Succeeded => OrderStatus::Paid,
            PaymentOutcome::Failed { reason } => {
                info!(%reason, "Provider reported failed payment");
                OrderStatus::Failed
            }
            PaymentOutcome::Ignored { event_type } => {
                info!(%event_type, "Ignoring provider event");
                return Ok(None);
            }
        };

        let Some(mut order) = self.orders.find_by_payment_reference(&event.reference).await? else {
            warn!("No order for payment reference");
            return Ok(None);
        };

        if order.status == target {
            return Ok(Some(order));
        }
        order.status.transition(target)?;

        if let Some(amount) = event.amount {
            if amount != order.total {
                warn!(%amount, total = %order.total, "Settled amount differs from order total");
            }
        }

        if !self.orders.update_status(order.id, order.status, target).await? {
            warn!(order_id = %order.id, "Order status changed concurrently");
            return self.orders.get_order(order.id).await;
        }

        info!(order_id = %order.id, from = %order.status, to = %target, "Order settled");
        order.status = target;
        Ok(Some(order))
    }

    /// The session user's orders, newest first
    pub async fn order_history(&self, session: Option<&Session>) -> ShopResult<Vec<Order>> {
        let session = require_session(session)?;
        self.orders.list_orders(session.user_id).await
    }

    /// One order, visible to its owner only
    pub async fn get_order(&self, session: Option<&Session>, order_id: Uuid) -> ShopResult<Order> {
        let session = require_session(session)?;
        match self.orders.get_order(order_id).await? {
            Some(order) if order.user_id == session.user_id => Ok(order),
            _ => Err(ShopError::OrderNotFound {
                order_id: order_id.to_string(),
            }),
        }
    }

    async fn non_empty_cart(&self, user_id: Uuid) -> ShopResult<Cart> {
        match self.carts.get_cart(user_id).await? {
            Some(cart) if !cart.is_empty() => Ok(cart),
            _ => Err(ShopError::EmptyCart),
        }
    }

    async fn existing_order(&self, user_id: Uuid, attempt_id: &str) -> ShopResult<Option<Order>> {
        let existing = self.orders.find_by_attempt(user_id, attempt_id).await?;
        if let Some(order) = &existing {
            info!(order_id = %order.id, attempt_id, "Checkout attempt already has an order");
        }
        Ok(existing)
    }

    /// Persist the order and clear the cart in one store transaction
    async fn place(&self, cart_id: Uuid, draft: NewOrder) -> ShopResult<Order> {
        let user_id = draft.user_id;
        let attempt_id = draft.attempt_id.clone();

        match self.orders.place_order(cart_id, draft).await {
            Ok(order) => {
                info!(order_id = %order.id, status = %order.status, total = %order.total, "Order placed");
                self.invalidator.invalidate(CART_VIEW);
                Ok(order)
            }
            Err(ShopError::Conflict(msg)) => {
                let existing = match &attempt_id {
                    Some(attempt_id) => self.orders.find_by_attempt(user_id, attempt_id).await?,
                    None => None,
                };
                existing.ok_or(ShopError::Conflict(msg))
            }
            Err(e) => Err(e),
        }
    }
}

/// Refuse a card payment created for a different user than the one finalizing it
fn check_payer(reference: &str, user_id: Uuid, confirmation: &PaymentConfirmation) -> ShopResult<()> {
    let live = matches!(
        confirmation,
        PaymentConfirmation::Succeeded { .. } | PaymentConfirmation::Processing { .. }
    );
    if !live || confirmation.payer() == Some(user_id) {
        return Ok(());
    }

    warn!(
        reference,
        %user_id,
        payer = ?confirmation.payer(),
        "Payment belongs to another user"
    );
    Err(ShopError::PaymentNotConfirmed {
        reference: reference.to_string(),
        status: "payer_mismatch".to_string(),
    })
}
