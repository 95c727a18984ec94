//! Cart and checkout scenarios over the in-memory store.
//!
//! These drive `CartService` and `CheckoutOrchestrator` from `shop-core`
//! against a real `MemoryStore`, so they live here rather than in `shop-core`.
//! A `shop-store` dev-dependency in `shop-core` would build a second copy of
//! `shop-core` for its unit tests, and the two copies' traits would not unify.

use crate::MemoryStore;
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use shop_core::{
    CartService, CatalogGateway, CatalogProduct, CheckoutOrchestrator, Currency, OrderStatus,
    OrderStore, PaymentConfirmation, PaymentEvent, PaymentInitiation, PaymentMethod,
    PaymentOutcome, PaymentRequest, PaymentStrategy, PaymentStrategySelector, Product, Role,
    Session, ShopError, ShopResult, ViewInvalidator, CART_VIEW, MAX_ITEM_QUANTITY,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

struct MockCatalog {
    products: HashMap<String, CatalogProduct>,
    calls: AtomicUsize,
}

impl MockCatalog {
    fn new(products: &[(&str, &str, Decimal)]) -> Self {
        Self {
            products: products
                .iter()
                .map(|(id, title, price)| {
                    (
                        id.to_string(),
                        CatalogProduct {
                            id: id.to_string(),
                            title: title.to_string(),
                            description: String::new(),
                            price: *price,
                            stock: 10,
                            category: "stationery".to_string(),
                            images: Vec::new(),
                        },
                    )
                })
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Serve `target`'s record, with its own id, when asked for `alias`
    fn alias(mut self, alias: &str, target: &str) -> Self {
        if let Some(record) = self.products.get(target).cloned() {
            self.products.insert(alias.to_string(), record);
        }
        self
    }
}

#[async_trait]
impl CatalogGateway for MockCatalog {
    async fn fetch_product(&self, product_id: &str) -> ShopResult<CatalogProduct> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.products
            .get(product_id)
            .cloned()
            .ok_or_else(|| ShopError::CatalogSync {
                product_id: product_id.to_string(),
                message: "HTTP 503".to_string(),
            })
    }
}

#[derive(Default)]
struct RecordingInvalidator {
    paths: Mutex<Vec<String>>,
}

impl RecordingInvalidator {
    fn paths(&self) -> Vec<String> {
        self.paths.lock().unwrap().clone()
    }
}

impl ViewInvalidator for RecordingInvalidator {
    fn invalidate(&self, path: &str) {
        self.paths.lock().unwrap().push(path.to_string());
    }
}

struct MockCard {
    confirmation: Mutex<PaymentConfirmation>,
    /// Replaces `confirmation` after the next lookup
    then: Mutex<Option<PaymentConfirmation>>,
    currency: Currency,
    intents: AtomicUsize,
    lookups: AtomicUsize,
}

impl MockCard {
    fn new(confirmation: PaymentConfirmation) -> Self {
        Self {
            confirmation: Mutex::new(confirmation),
            then: Mutex::new(None),
            currency: Currency::USD,
            intents: AtomicUsize::new(0),
            lookups: AtomicUsize::new(0),
        }
    }

    fn set(&self, confirmation: PaymentConfirmation) {
        *self.confirmation.lock().unwrap() = confirmation;
    }

    fn set_then(&self, confirmation: PaymentConfirmation) {
        *self.then.lock().unwrap() = Some(confirmation);
    }
}

fn paid(amount_minor: i64, user: &Session) -> PaymentConfirmation {
    PaymentConfirmation::Succeeded {
        amount_minor,
        payer: Some(user.user_id),
    }
}

fn processing(user: &Session) -> PaymentConfirmation {
    PaymentConfirmation::Processing {
        payer: Some(user.user_id),
    }
}

#[async_trait]
impl PaymentStrategy for MockCard {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Card
    }

    fn provider_name(&self) -> &'static str {
        "mock-card"
    }

    async fn initiate(&self, request: &PaymentRequest) -> ShopResult<PaymentInitiation> {
        let n = self.intents.fetch_add(1, Ordering::SeqCst);
        Ok(PaymentInitiation::IntentCreated {
            intent_id: format!("pi_{}", n),
            client_secret: format!("pi_{}_secret", n),
            amount_minor: self.currency.to_minor_units(request.amount)?,
        })
    }

    async fn confirmation(&self, _reference: &str) -> ShopResult<PaymentConfirmation> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let mut current = self.confirmation.lock().unwrap();
        let seen = current.clone();
        if let Some(next) = self.then.lock().unwrap().take() {
            *current = next;
        }
        Ok(seen)
    }

    async fn verify_webhook(&self, _payload: &[u8], _secret: Option<&str>) -> ShopResult<PaymentEvent> {
        Ok(PaymentEvent::ignored("mock-card", "ping"))
    }
}

struct MockMpesa {
    response_code: String,
    pushes: AtomicUsize,
    delay: Duration,
    amounts: Mutex<Vec<Decimal>>,
}

impl MockMpesa {
    fn accepting() -> Self {
        Self::with_code("0")
    }

    fn with_code(code: &str) -> Self {
        Self {
            response_code: code.to_string(),
            pushes: AtomicUsize::new(0),
            delay: Duration::ZERO,
            amounts: Mutex::new(Vec::new()),
        }
    }

    fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl PaymentStrategy for MockMpesa {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::MobileMoney
    }

    fn provider_name(&self) -> &'static str {
        "mock-mpesa"
    }

    async fn initiate(&self, request: &PaymentRequest) -> ShopResult<PaymentInitiation> {
        let n = self.pushes.fetch_add(1, Ordering::SeqCst);
        self.amounts.lock().unwrap().push(request.amount);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.response_code != "0" {
            return Err(ShopError::PaymentRejected {
                provider: "mock-mpesa".to_string(),
                code: self.response_code.clone(),
                message: "Request rejected".to_string(),
            });
        }
        Ok(PaymentInitiation::PushAccepted {
            checkout_request_id: format!("ws_CO_{}", n),
            merchant_request_id: format!("mr_{}", n),
            customer_message: "Success. Request accepted for processing".to_string(),
        })
    }

    async fn verify_webhook(&self, _payload: &[u8], _secret: Option<&str>) -> ShopResult<PaymentEvent> {
        Ok(PaymentEvent::ignored("mock-mpesa", "ping"))
    }
}

struct Shop {
    store: MemoryStore,
    catalog: Arc<MockCatalog>,
    invalidator: Arc<RecordingInvalidator>,
    carts: CartService,
    checkout: Arc<CheckoutOrchestrator>,
}

fn shop(strategies: PaymentStrategySelector, currency: Currency) -> Shop {
    let store = MemoryStore::new();
    let catalog = Arc::new(
        MockCatalog::new(&[
            ("1", "Notebook", dec!(10.00)),
            ("2", "Pen", dec!(5.00)),
            ("3", "Sack of rice", dec!(1200)),
        ])
        .alias("01", "1"),
    );
    let invalidator = Arc::new(RecordingInvalidator::default());
    let shared = Arc::new(store.clone());

    let carts = CartService::new(shared.clone(), shared.clone(), catalog.clone(), invalidator.clone());
    let checkout = Arc::new(CheckoutOrchestrator::new(
        shared.clone(),
        shared,
        strategies,
        invalidator.clone(),
        currency,
    ));

    Shop {
        store,
        catalog,
        invalidator,
        carts,
        checkout,
    }
}

fn session() -> Session {
    Session::new(Uuid::new_v4(), Role::User)
}

#[tokio::test]
async fn test_cart_total_and_order_snapshot() {
    let shop = shop(
        PaymentStrategySelector::new().with_strategy(Arc::new(MockMpesa::accepting())),
        Currency::USD,
    );
    let user = session();

    shop.carts.add_item(Some(&user), "1", 2).await.unwrap();
    let cart = shop.carts.add_item(Some(&user), "2", 1).await.unwrap();
    assert_eq!(cart.total(), dec!(25.00));

    let summary = shop.checkout.summary(Some(&user)).await.unwrap();
    assert_eq!(summary.total, dec!(25.00));
    assert_eq!(summary.item_count, 3);

    let placed = shop
        .checkout
        .checkout_mobile_money(Some(&user), "0712345678", None, None)
        .await
        .unwrap();
    assert_eq!(placed.order.total, dec!(25.00));

    shop.store.set_price("1", dec!(99.00)).await.unwrap();

    let history = shop.checkout.order_history(Some(&user)).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].total, dec!(25.00));
    let notebook = history[0].items.iter().find(|i| i.product_id == "1").unwrap();
    assert_eq!(notebook.price, dec!(10.00));
    assert_eq!(notebook.quantity, 2);
}

#[tokio::test]
async fn test_empty_cart_checkout_creates_nothing() {
    let card = Arc::new(MockCard::new(PaymentConfirmation::Processing { payer: None }));
    let shop = shop(
        PaymentStrategySelector::new().with_strategy(card.clone()),
        Currency::USD,
    );
    let user = session();

    assert!(matches!(
        shop.checkout.summary(Some(&user)).await,
        Err(ShopError::EmptyCart)
    ));
    assert!(matches!(
        shop.checkout.start_card_checkout(Some(&user), None).await,
        Err(ShopError::EmptyCart)
    ));
    assert_eq!(card.intents.load(Ordering::SeqCst), 0);
    assert_eq!(shop.store.order_count().await, 0);
}

#[tokio::test]
async fn test_card_intent_uses_minor_units() {
    let shop = shop(
        PaymentStrategySelector::new()
            .with_strategy(Arc::new(MockCard::new(PaymentConfirmation::Processing { payer: None }))),
        Currency::USD,
    );
    let user = session();

    shop.carts.add_item(Some(&user), "1", 4).await.unwrap();
    shop.store.set_price("1", dec!(10.625)).await.unwrap();

    let intent = shop
        .checkout
        .start_card_checkout(Some(&user), Some("attempt-1".to_string()))
        .await
        .unwrap();
    assert_eq!(intent.amount, dec!(42.52));
    assert_eq!(intent.amount_minor, 4252);
    assert_eq!(intent.attempt_id, "attempt-1");
    assert_eq!(shop.store.order_count().await, 0);
}

#[tokio::test]
async fn test_rejected_push_leaves_cart_untouched() {
    let shop = shop(
        PaymentStrategySelector::new().with_strategy(Arc::new(MockMpesa::with_code("1"))),
        Currency::KES,
    );
    let user = session();
    shop.carts.add_item(Some(&user), "3", 1).await.unwrap();

    let err = shop
        .checkout
        .checkout_mobile_money(Some(&user), "0712345678", None, None)
        .await
        .unwrap_err();

    assert!(matches!(err, ShopError::PaymentRejected { ref code, .. } if code == "1"));
    assert_eq!(shop.store.order_count().await, 0);
    let cart = shop.carts.get_cart(Some(&user)).await.unwrap().unwrap();
    assert_eq!(cart.lines.len(), 1);
}

#[tokio::test]
async fn test_accepted_push_creates_pending_order_and_clears_cart() {
    let mpesa = Arc::new(MockMpesa::accepting());
    let shop = shop(
        PaymentStrategySelector::new().with_strategy(mpesa.clone()),
        Currency::KES,
    );
    let user = session();
    shop.carts.add_item(Some(&user), "3", 1).await.unwrap();

    let placed = shop
        .checkout
        .checkout_mobile_money(Some(&user), "0712345678", None, None)
        .await
        .unwrap();

    assert_eq!(placed.order.status, OrderStatus::Pending);
    assert_eq!(placed.order.total, dec!(1200));
    assert_eq!(placed.order.payment_method, PaymentMethod::MobileMoney);
    assert_eq!(placed.order.payment_reference.as_deref(), Some("ws_CO_0"));
    assert_eq!(*mpesa.amounts.lock().unwrap(), vec![dec!(1200)]);
    assert_eq!(shop.store.order_count().await, 1);

    let cart = shop.carts.get_cart(Some(&user)).await.unwrap().unwrap();
    assert!(cart.is_empty());
    assert!(shop.invalidator.paths().iter().any(|p| p == CART_VIEW));
}

#[tokio::test]
async fn test_double_submit_places_one_order() {
    let mpesa = Arc::new(MockMpesa::accepting().slow(Duration::from_millis(20)));
    let shop = shop(
        PaymentStrategySelector::new().with_strategy(mpesa.clone()),
        Currency::KES,
    );
    let user = session();
    shop.carts.add_item(Some(&user), "3", 1).await.unwrap();

    let first = {
        let checkout = shop.checkout.clone();
        tokio::spawn(async move {
            checkout
                .checkout_mobile_money(Some(&user), "0712345678", None, Some("attempt-x".to_string()))
                .await
        })
    };
    let second = {
        let checkout = shop.checkout.clone();
        tokio::spawn(async move {
            checkout
                .checkout_mobile_money(Some(&user), "0712345678", None, Some("attempt-x".to_string()))
                .await
        })
    };

    let a = first.await.unwrap().unwrap();
    let b = second.await.unwrap().unwrap();

    assert_eq!(a.order.id, b.order.id);
    assert_eq!(shop.store.order_count().await, 1);
    assert_eq!(mpesa.pushes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_double_submit_without_attempt_id_finds_empty_cart() {
    let shop = shop(
        PaymentStrategySelector::new()
            .with_strategy(Arc::new(MockMpesa::accepting().slow(Duration::from_millis(10)))),
        Currency::KES,
    );
    let user = session();
    shop.carts.add_item(Some(&user), "3", 1).await.unwrap();

    let (a, b) = tokio::join!(
        shop.checkout
            .checkout_mobile_money(Some(&user), "0712345678", None, None),
        shop.checkout
            .checkout_mobile_money(Some(&user), "0712345678", None, None),
    );

    let placed = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(placed, 1);
    assert_eq!(shop.store.order_count().await, 1);
}

#[tokio::test]
async fn test_quantity_updates() {
    let shop = shop(PaymentStrategySelector::new(), Currency::USD);
    let user = session();

    shop.carts.add_item(Some(&user), "1", 1).await.unwrap();
    let cart = shop.carts.add_item(Some(&user), "1", 2).await.unwrap();
    assert_eq!(cart.lines.len(), 1);
    assert_eq!(cart.lines[0].quantity, 3);
    let item_id = cart.lines[0].item_id;

    shop.carts.set_item_quantity(Some(&user), item_id, 5).await.unwrap();
    let cart = shop.carts.get_cart(Some(&user)).await.unwrap().unwrap();
    assert_eq!(cart.lines[0].quantity, 5);

    shop.carts.set_item_quantity(Some(&user), item_id, 0).await.unwrap();
    let cart = shop.carts.get_cart(Some(&user)).await.unwrap().unwrap();
    assert!(cart.is_empty());

    assert!(matches!(
        shop.carts.add_item(Some(&user), "1", 0).await,
        Err(ShopError::Validation(_))
    ));
}

#[tokio::test]
async fn test_products_synced_once() {
    let shop = shop(PaymentStrategySelector::new(), Currency::USD);
    let user = session();

    shop.carts.add_item(Some(&user), "1", 1).await.unwrap();
    shop.carts.add_item(Some(&user), "1", 1).await.unwrap();

    assert_eq!(shop.catalog.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_catalog_failure_leaves_cart_unchanged() {
    let shop = shop(PaymentStrategySelector::new(), Currency::USD);
    let user = session();
    shop.carts.add_item(Some(&user), "1", 1).await.unwrap();

    let err = shop.carts.add_item(Some(&user), "404", 1).await.unwrap_err();
    assert!(matches!(err, ShopError::CatalogSync { .. }));

    let cart = shop.carts.get_cart(Some(&user)).await.unwrap().unwrap();
    assert_eq!(cart.lines.len(), 1);

    let stranger = session();
    assert!(shop.carts.add_item(Some(&stranger), "404", 1).await.is_err());
    assert!(shop.carts.get_cart(Some(&stranger)).await.unwrap().is_none());
}

#[tokio::test]
async fn test_other_users_items_are_not_found() {
    let shop = shop(PaymentStrategySelector::new(), Currency::USD);
    let owner = session();
    let intruder = session();

    let cart = shop.carts.add_item(Some(&owner), "1", 1).await.unwrap();
    let item_id = cart.lines[0].item_id;

    assert!(matches!(
        shop.carts.remove_item(Some(&intruder), item_id).await,
        Err(ShopError::CartItemNotFound { .. })
    ));
    assert!(matches!(
        shop.carts.set_item_quantity(Some(&intruder), item_id, 9).await,
        Err(ShopError::CartItemNotFound { .. })
    ));
    assert!(matches!(
        shop.carts.add_item(None, "1", 1).await,
        Err(ShopError::Unauthenticated)
    ));

    let cart = shop.carts.get_cart(Some(&owner)).await.unwrap().unwrap();
    assert_eq!(cart.lines[0].quantity, 1);
}

#[tokio::test]
async fn test_settlement_is_idempotent() {
    let shop = shop(
        PaymentStrategySelector::new().with_strategy(Arc::new(MockMpesa::accepting())),
        Currency::KES,
    );
    let user = session();
    shop.carts.add_item(Some(&user), "3", 1).await.unwrap();
    let placed = shop
        .checkout
        .checkout_mobile_money(Some(&user), "0712345678", None, None)
        .await
        .unwrap();

    let event = PaymentEvent {
        provider: "mpesa".to_string(),
        reference: "ws_CO_0".to_string(),
        outcome: PaymentOutcome::Succeeded,
        amount: Some(dec!(1200)),
        receipt: Some("NLJ7RT61SV".to_string()),
    };

    let settled = shop.checkout.settle_payment(event.clone()).await.unwrap().unwrap();
    assert_eq!(settled.id, placed.order.id);
    assert_eq!(settled.status, OrderStatus::Paid);

    let again = shop.checkout.settle_payment(event).await.unwrap().unwrap();
    assert_eq!(again.status, OrderStatus::Paid);

    let late_failure = PaymentEvent {
        provider: "mpesa".to_string(),
        reference: "ws_CO_0".to_string(),
        outcome: PaymentOutcome::Failed {
            reason: "Request cancelled by user".to_string(),
        },
        amount: None,
        receipt: None,
    };
    assert!(matches!(
        shop.checkout.settle_payment(late_failure).await,
        Err(ShopError::InvalidStatusTransition { .. })
    ));

    let unknown = PaymentEvent {
        provider: "mpesa".to_string(),
        reference: "ws_CO_unknown".to_string(),
        outcome: PaymentOutcome::Succeeded,
        amount: None,
        receipt: None,
    };
    assert!(shop.checkout.settle_payment(unknown).await.unwrap().is_none());
}

#[tokio::test]
async fn test_failed_settlement_marks_order_failed() {
    let shop = shop(
        PaymentStrategySelector::new().with_strategy(Arc::new(MockMpesa::accepting())),
        Currency::KES,
    );
    let user = session();
    shop.carts.add_item(Some(&user), "3", 1).await.unwrap();
    let placed = shop
        .checkout
        .checkout_mobile_money(Some(&user), "0712345678", None, None)
        .await
        .unwrap();

    let settled = shop
        .checkout
        .settle_payment(PaymentEvent {
            provider: "mpesa".to_string(),
            reference: "ws_CO_0".to_string(),
            outcome: PaymentOutcome::Failed {
                reason: "Request cancelled by user".to_string(),
            },
            amount: None,
            receipt: None,
        })
        .await
        .unwrap()
        .unwrap();

    assert_eq!(settled.status, OrderStatus::Failed);
    let stored = shop.store.get_order(placed.order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Failed);
}

#[tokio::test]
async fn test_card_finalize_outcomes() {
    let card = Arc::new(MockCard::new(PaymentConfirmation::Processing { payer: None }));
    let shop = shop(
        PaymentStrategySelector::new().with_strategy(card.clone()),
        Currency::USD,
    );
    let user = session();
    card.set(paid(999, &user));
    shop.carts.add_item(Some(&user), "1", 2).await.unwrap();

    let err = shop
        .checkout
        .finalize_card_order(Some(&user), "pi_0", None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ShopError::PaymentNotConfirmed { ref status, .. } if status == "amount_mismatch"));
    assert_eq!(shop.store.order_count().await, 0);

    card.set(PaymentConfirmation::Failed {
        reason: "requires_payment_method".to_string(),
    });
    assert!(matches!(
        shop.checkout.finalize_card_order(Some(&user), "pi_0", None, None).await,
        Err(ShopError::PaymentNotConfirmed { .. })
    ));

    card.set(processing(&user));
    let pending = shop
        .checkout
        .finalize_card_order(Some(&user), "pi_0", None, None)
        .await
        .unwrap();
    assert_eq!(pending.status, OrderStatus::Pending);
    assert_eq!(pending.total, dec!(20.00));

    let again = shop
        .checkout
        .finalize_card_order(Some(&user), "pi_0", None, None)
        .await
        .unwrap();
    assert_eq!(again.id, pending.id);
    assert_eq!(shop.store.order_count().await, 1);
}

#[tokio::test]
async fn test_card_finalize_paid() {
    let card = Arc::new(MockCard::new(PaymentConfirmation::Processing { payer: None }));
    let shop = shop(
        PaymentStrategySelector::new().with_strategy(card.clone()),
        Currency::USD,
    );
    let user = session();
    card.set(paid(2500, &user));
    shop.carts.add_item(Some(&user), "1", 2).await.unwrap();
    shop.carts.add_item(Some(&user), "2", 1).await.unwrap();

    let order = shop
        .checkout
        .finalize_card_order(Some(&user), "pi_7", None, Some("attempt-7".to_string()))
        .await
        .unwrap();

    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(order.payment_reference.as_deref(), Some("pi_7"));
    assert!(shop.carts.get_cart(Some(&user)).await.unwrap().unwrap().is_empty());

    let other = session();
    shop.carts.add_item(Some(&other), "1", 2).await.unwrap();
    assert!(matches!(
        shop.checkout.finalize_card_order(Some(&other), "pi_7", None, None).await,
        Err(ShopError::Conflict(_))
    ));
    assert!(matches!(
        shop.checkout.get_order(Some(&other), order.id).await,
        Err(ShopError::OrderNotFound { .. })
    ));
}

#[tokio::test]
async fn test_card_intent_of_another_user_is_refused() {
    let card = Arc::new(MockCard::new(PaymentConfirmation::Processing { payer: None }));
    let shop = shop(
        PaymentStrategySelector::new().with_strategy(card.clone()),
        Currency::USD,
    );
    let victim = session();
    let thief = session();
    card.set(paid(2000, &victim));
    shop.carts.add_item(Some(&thief), "1", 2).await.unwrap();

    let err = shop
        .checkout
        .finalize_card_order(Some(&thief), "pi_victim", None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ShopError::PaymentNotConfirmed { ref status, .. } if status == "payer_mismatch"));
    assert_eq!(shop.store.order_count().await, 0);
    let cart = shop.carts.get_cart(Some(&thief)).await.unwrap().unwrap();
    assert_eq!(cart.item_count(), 2);

    card.set(PaymentConfirmation::Succeeded {
        amount_minor: 2000,
        payer: None,
    });
    assert!(matches!(
        shop.checkout.finalize_card_order(Some(&thief), "pi_victim", None, None).await,
        Err(ShopError::PaymentNotConfirmed { .. })
    ));
    assert_eq!(shop.store.order_count().await, 0);
}

#[tokio::test]
async fn test_processing_card_order_rechecked_after_insert() {
    let card = Arc::new(MockCard::new(PaymentConfirmation::Processing { payer: None }));
    let shop = shop(
        PaymentStrategySelector::new().with_strategy(card.clone()),
        Currency::USD,
    );
    let user = session();
    card.set(processing(&user));
    card.set_then(paid(1000, &user));
    shop.carts.add_item(Some(&user), "1", 1).await.unwrap();

    let order = shop
        .checkout
        .finalize_card_order(Some(&user), "pi_late", None, None)
        .await
        .unwrap();

    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(card.lookups.load(Ordering::SeqCst), 2);
    let stored = shop.store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Paid);

    // The webhook for the same intent arriving afterwards changes nothing
    let settled = shop
        .checkout
        .settle_payment(PaymentEvent {
            provider: "mock-card".to_string(),
            reference: "pi_late".to_string(),
            outcome: PaymentOutcome::Succeeded,
            amount: Some(dec!(10.00)),
            receipt: None,
        })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(settled.status, OrderStatus::Paid);
}

#[tokio::test]
async fn test_catalog_id_echo_does_not_break_add() {
    let shop = shop(PaymentStrategySelector::new(), Currency::USD);
    let user = session();

    let cart = shop.carts.add_item(Some(&user), "01", 1).await.unwrap();
    assert_eq!(cart.lines.len(), 1);
    assert_eq!(cart.lines[0].product.id, "01");
    assert_eq!(cart.lines[0].product.name, "Notebook");

    let cart = shop.carts.add_item(Some(&user), "01", 2).await.unwrap();
    assert_eq!(cart.lines[0].quantity, 3);
    assert_eq!(shop.catalog.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_quantity_cap() {
    let shop = shop(PaymentStrategySelector::new(), Currency::USD);
    let user = session();

    assert!(matches!(
        shop.carts.add_item(Some(&user), "1", i32::MAX).await,
        Err(ShopError::Validation(_))
    ));
    assert!(shop.carts.get_cart(Some(&user)).await.unwrap().is_none());

    let cart = shop.carts.add_item(Some(&user), "1", 990).await.unwrap();
    assert!(matches!(
        shop.carts.add_item(Some(&user), "1", 10).await,
        Err(ShopError::Validation(_))
    ));
    assert!(matches!(
        shop.carts.add_item(Some(&user), "1", i32::MAX).await,
        Err(ShopError::Validation(_))
    ));
    let cart_after = shop.carts.add_item(Some(&user), "1", 9).await.unwrap();
    assert_eq!(cart_after.lines[0].quantity, MAX_ITEM_QUANTITY);

    let item_id = cart.lines[0].item_id;
    assert!(matches!(
        shop.carts.set_item_quantity(Some(&user), item_id, 1000).await,
        Err(ShopError::Validation(_))
    ));
    let cart = shop.carts.get_cart(Some(&user)).await.unwrap().unwrap();
    assert_eq!(cart.lines[0].quantity, MAX_ITEM_QUANTITY);
}

#[tokio::test]
async fn test_missing_provider_is_configuration_error() {
    let shop = shop(PaymentStrategySelector::new(), Currency::KES);
    let user = session();
    shop.carts.add_item(Some(&user), "3", 1).await.unwrap();

    assert!(matches!(
        shop.checkout
            .checkout_mobile_money(Some(&user), "0712345678", None, None)
            .await,
        Err(ShopError::Configuration(_))
    ));
    assert_eq!(shop.store.order_count().await, 0);
}

#[tokio::test]
async fn test_products_listed_after_sync() {
    let shop = shop(PaymentStrategySelector::new(), Currency::USD);
    let user = session();
    shop.carts.add_item(Some(&user), "2", 1).await.unwrap();
    shop.carts.add_item(Some(&user), "1", 1).await.unwrap();

    use shop_core::{ProductFilter, ProductStore};
    let products: Vec<Product> = shop
        .store
        .list_products(&ProductFilter::default())
        .await
        .unwrap();
    let names: Vec<_> = products.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["Notebook", "Pen"]);
}
