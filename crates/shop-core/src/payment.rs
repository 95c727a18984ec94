//! # Payment Strategy Trait
//!
//! Strategy pattern over payment providers. The buyer picks a `PaymentMethod`
//! at checkout and the orchestrator resolves it to a registered strategy.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    PaymentStrategy (trait)                  │
//! │  ├── initiate()                                             │
//! │  ├── confirmation()                                         │
//! │  ├── verify_webhook()                                       │
//! │  └── provider_name()                                        │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!                 ┌──────────┴──────────┐
//!                 │                     │
//!        ┌────────┴───────┐    ┌────────┴───────┐
//!        │ StripeCard     │    │ MpesaStk       │
//!        │   Strategy     │    │   Strategy     │
//!        └────────────────┘    └────────────────┘
//! ```

use crate::error::{ShopError, ShopResult};
use crate::product::Currency;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Payment method chosen by the buyer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Hosted card payment intent
    Card,
    /// Mobile-money STK push
    #[serde(alias = "mpesa")]
    MobileMoney,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "card",
            PaymentMethod::MobileMoney => "mobile_money",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "card" => Ok(PaymentMethod::Card),
            "mobile_money" | "mpesa" => Ok(PaymentMethod::MobileMoney),
            other => Err(format!("Invalid payment method: {}", other)),
        }
    }
}

/// What the orchestrator asks a provider to collect
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRequest {
    /// Checkout attempt id
    pub attempt_id: String,
    pub user_id: Uuid,
    /// Amount in major units, computed server-side from the cart
    pub amount: Decimal,
    pub currency: Currency,
    /// Payer phone number (mobile money only, already normalized)
    pub phone_number: Option<String>,
    pub description: String,
}

impl PaymentRequest {
    pub fn new(attempt_id: impl Into<String>, user_id: Uuid, amount: Decimal, currency: Currency) -> Self {
        Self {
            attempt_id: attempt_id.into(),
            user_id,
            amount,
            currency,
            phone_number: None,
            description: "Duka order".to_string(),
        }
    }

    pub fn with_phone_number(mut self, phone: impl Into<String>) -> Self {
        self.phone_number = Some(phone.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Key sent to providers that support idempotent requests
    pub fn idempotency_key(&self) -> String {
        format!("{}:{}", self.user_id, self.attempt_id)
    }
}

/// Provider acknowledgment of an initiated payment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentInitiation {
    /// Card: intent created, client confirms it with the secret
    IntentCreated {
        intent_id: String,
        client_secret: String,
        amount_minor: i64,
    },
    /// Mobile money: prompt pushed to the payer's phone
    PushAccepted {
        checkout_request_id: String,
        merchant_request_id: String,
        customer_message: String,
    },
}

impl PaymentInitiation {
    /// Provider reference stored on the order
    pub fn reference(&self) -> &str {
        match self {
            PaymentInitiation::IntentCreated { intent_id, .. } => intent_id,
            PaymentInitiation::PushAccepted {
                checkout_request_id,
                ..
            } => checkout_request_id,
        }
    }
}

/// Server-side view of a payment's state.
///
/// `payer` is the user the payment was created for, as recorded with the
/// provider at initiation. `None` when the provider record carries no user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentConfirmation {
    Succeeded { amount_minor: i64, payer: Option<Uuid> },
    Processing { payer: Option<Uuid> },
    Failed { reason: String },
    RequiresAction { status: String },
}

impl PaymentConfirmation {
    /// User recorded on a succeeded or processing payment
    pub fn payer(&self) -> Option<Uuid> {
        match self {
            PaymentConfirmation::Succeeded { payer, .. }
            | PaymentConfirmation::Processing { payer } => *payer,
            _ => None,
        }
    }
}

/// Outcome carried by a verified provider event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PaymentOutcome {
    Succeeded,
    Failed { reason: String },
    /// Event type the storefront does not act on
    Ignored { event_type: String },
}

/// A verified provider notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentEvent {
    pub provider: String,
    /// Intent id or checkout request id
    pub reference: String,
    pub outcome: PaymentOutcome,
    /// Amount reported by the provider, in major units
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,
    /// Provider receipt (e.g. M-Pesa receipt number)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<String>,
}

impl PaymentEvent {
    pub fn ignored(provider: impl Into<String>, event_type: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            reference: String::new(),
            outcome: PaymentOutcome::Ignored {
                event_type: event_type.into(),
            },
            amount: None,
            receipt: None,
        }
    }
}

/// Core trait for payment provider implementations.
#[async_trait]
pub trait PaymentStrategy: Send + Sync {
    /// Payment method this strategy serves
    fn method(&self) -> PaymentMethod;

    /// Provider name (for logging and routing)
    fn provider_name(&self) -> &'static str;

    /// Start collecting a payment.
    ///
    /// Acceptance is an acknowledgment, never proof of payment.
    async fn initiate(&self, request: &PaymentRequest) -> ShopResult<PaymentInitiation>;

    /// Ask the provider for the current state of a payment.
    async fn confirmation(&self, reference: &str) -> ShopResult<PaymentConfirmation> {
        Err(ShopError::ProviderError {
            provider: self.provider_name().to_string(),
            message: format!("status lookup not supported for {}", reference),
        })
    }

    /// Verify a provider notification and parse it into an event.
    ///
    /// `secret` is the signature header or callback token, whichever the
    /// provider uses.
    async fn verify_webhook(&self, payload: &[u8], secret: Option<&str>) -> ShopResult<PaymentEvent>;

    /// Webhook endpoint path for this provider
    fn webhook_path(&self) -> String {
        format!("/webhook/{}", self.provider_name())
    }
}

/// Type alias for a boxed payment strategy (dynamic dispatch)
pub type BoxedPaymentStrategy = Arc<dyn PaymentStrategy>;

/// Strategy selector keyed by payment method
#[derive(Clone, Default)]
pub struct PaymentStrategySelector {
    strategies: HashMap<PaymentMethod, BoxedPaymentStrategy>,
}

impl PaymentStrategySelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a payment strategy under its method
    pub fn register(&mut self, strategy: BoxedPaymentStrategy) {
        self.strategies.insert(strategy.method(), strategy);
    }

    /// Register with builder pattern
    pub fn with_strategy(mut self, strategy: BoxedPaymentStrategy) -> Self {
        self.register(strategy);
        self
    }

    pub fn get(&self, method: PaymentMethod) -> Option<&BoxedPaymentStrategy> {
        self.strategies.get(&method)
    }

    /// Resolve a method, failing as a configuration error when unregistered
    pub fn require(&self, method: PaymentMethod) -> ShopResult<BoxedPaymentStrategy> {
        self.get(method).cloned().ok_or_else(|| {
            ShopError::Configuration(format!("Payment method {} is not configured", method))
        })
    }

    /// Find a strategy by provider name (webhook routing)
    pub fn by_provider(&self, provider: &str) -> Option<&BoxedPaymentStrategy> {
        self.strategies
            .values()
            .find(|s| s.provider_name() == provider)
    }

    pub fn methods(&self) -> Vec<PaymentMethod> {
        self.strategies.keys().copied().collect()
    }

    pub fn has_method(&self, method: PaymentMethod) -> bool {
        self.strategies.contains_key(&method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    struct NullStrategy;

    #[async_trait]
    impl PaymentStrategy for NullStrategy {
        fn method(&self) -> PaymentMethod {
            PaymentMethod::Card
        }

        fn provider_name(&self) -> &'static str {
            "null"
        }

        async fn initiate(&self, request: &PaymentRequest) -> ShopResult<PaymentInitiation> {
            Ok(PaymentInitiation::IntentCreated {
                intent_id: "pi_null".into(),
                client_secret: "secret".into(),
                amount_minor: request.currency.to_minor_units(request.amount)?,
            })
        }

        async fn verify_webhook(&self, _payload: &[u8], _secret: Option<&str>) -> ShopResult<PaymentEvent> {
            Ok(PaymentEvent::ignored("null", "ping"))
        }
    }

    #[test]
    fn test_payment_method_serde() {
        assert_eq!(serde_json::to_value(PaymentMethod::MobileMoney).unwrap(), "mobile_money");
        let parsed: PaymentMethod = serde_json::from_value(serde_json::json!("mpesa")).unwrap();
        assert_eq!(parsed, PaymentMethod::MobileMoney);
        assert_eq!("card".parse::<PaymentMethod>().unwrap(), PaymentMethod::Card);
    }

    #[tokio::test]
    async fn test_strategy_selector() {
        let selector = PaymentStrategySelector::new().with_strategy(Arc::new(NullStrategy));

        assert!(selector.has_method(PaymentMethod::Card));
        assert!(selector.by_provider("null").is_some());
        assert!(matches!(
            selector.require(PaymentMethod::MobileMoney),
            Err(ShopError::Configuration(_))
        ));

        let strategy = selector.require(PaymentMethod::Card).unwrap();
        let request = PaymentRequest::new("attempt-1", Uuid::new_v4(), dec!(42.50), Currency::USD);
        let initiation = strategy.initiate(&request).await.unwrap();
        assert_eq!(initiation.reference(), "pi_null");
        assert!(strategy.confirmation("pi_null").await.is_err());
        assert_eq!(strategy.webhook_path(), "/webhook/null");
    }
}
