//! # Stripe Payment Intents
//!
//! Card strategy backed by the Payment Intents API. The server creates the
//! intent and hands the client secret to the browser widget, which confirms
//! the card directly with Stripe. Before an order is written the intent is
//! fetched again server-side.

use crate::config::StripeConfig;
use crate::webhook::{verify_signature, StripeEvent};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use shop_core::{
    PaymentConfirmation, PaymentEvent, PaymentInitiation, PaymentMethod, PaymentRequest,
    PaymentStrategy, ShopError, ShopResult,
};
use std::collections::HashMap;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

const PROVIDER: &str = "stripe";

/// Card payments through Stripe Payment Intents
pub struct StripeCardStrategy {
    config: StripeConfig,
    client: Client,
}

impl StripeCardStrategy {
    /// Create a new Stripe card strategy
    pub fn new(config: StripeConfig) -> ShopResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| ShopError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    /// Create from environment variables
    pub fn from_env() -> ShopResult<Self> {
        Self::new(StripeConfig::from_env()?)
    }

    pub fn config(&self) -> &StripeConfig {
        &self.config
    }

    /// POST /v1/payment_intents for the request amount in minor units
    #[instrument(skip(self, request), fields(attempt_id = %request.attempt_id))]
    pub async fn create_payment_intent(&self, request: &PaymentRequest) -> ShopResult<StripePaymentIntent> {
        if request.currency != self.config.currency {
            return Err(ShopError::InvalidRequest(format!(
                "Card payments are taken in {} only",
                self.config.currency
            )));
        }

        let amount = self.config.currency.to_minor_units(request.amount)?;
        if amount <= 0 {
            return Err(ShopError::InvalidRequest(
                "Payment amount must be positive".to_string(),
            ));
        }

        debug!(amount, currency = self.config.currency.as_str(), "Creating payment intent");

        let form_params: Vec<(&str, String)> = vec![
            ("amount", amount.to_string()),
            ("currency", self.config.currency.as_str().to_string()),
            ("automatic_payment_methods[enabled]", "true".to_string()),
            ("description", request.description.clone()),
            ("metadata[user_id]", request.user_id.to_string()),
            ("metadata[attempt_id]", request.attempt_id.clone()),
        ];

        let url = format!("{}/v1/payment_intents", self.config.api_base_url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", self.config.auth_header())
            .header("Stripe-Version", &self.config.api_version)
            .header("Idempotency-Key", request.idempotency_key())
            .form(&form_params)
            .send()
            .await
            .map_err(|e| ShopError::NetworkError(e.to_string()))?;

        let intent: StripePaymentIntent = read_response(response).await?;
        info!(intent_id = %intent.id, status = %intent.status, "Created Stripe payment intent");
        Ok(intent)
    }

    /// GET /v1/payment_intents/{id}
    #[instrument(skip(self))]
    pub async fn retrieve_payment_intent(&self, intent_id: &str) -> ShopResult<StripePaymentIntent> {
        if intent_id.is_empty() || !intent_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(ShopError::InvalidRequest(
                "Malformed payment intent id".to_string(),
            ));
        }

        let url = format!("{}/v1/payment_intents/{}", self.config.api_base_url, intent_id);

        let response = self
            .client
            .get(&url)
            .header("Authorization", self.config.auth_header())
            .header("Stripe-Version", &self.config.api_version)
            .send()
            .await
            .map_err(|e| ShopError::NetworkError(e.to_string()))?;

        read_response(response).await
    }
}

async fn read_response<T: DeserializeOwned>(response: Response) -> ShopResult<T> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ShopError::NetworkError(e.to_string()))?;

    if !status.is_success() {
        error!("Stripe API error: status={}, body={}", status, body);

        if let Ok(error_response) = serde_json::from_str::<StripeErrorResponse>(&body) {
            return Err(ShopError::ProviderError {
                provider: PROVIDER.to_string(),
                message: error_response.error.message,
            });
        }

        return Err(ShopError::ProviderError {
            provider: PROVIDER.to_string(),
            message: format!("HTTP {}: {}", status, body),
        });
    }

    serde_json::from_str(&body)
        .map_err(|e| ShopError::Serialization(format!("Failed to parse Stripe response: {}", e)))
}

#[async_trait]
impl PaymentStrategy for StripeCardStrategy {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Card
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }

    async fn initiate(&self, request: &PaymentRequest) -> ShopResult<PaymentInitiation> {
        let intent = self.create_payment_intent(request).await?;
        let client_secret = intent.client_secret.ok_or_else(|| ShopError::ProviderError {
            provider: PROVIDER.to_string(),
            message: "Payment intent has no client secret".to_string(),
        })?;

        Ok(PaymentInitiation::IntentCreated {
            intent_id: intent.id,
            client_secret,
            amount_minor: intent.amount,
        })
    }

    async fn confirmation(&self, reference: &str) -> ShopResult<PaymentConfirmation> {
        let intent = self.retrieve_payment_intent(reference).await?;
        debug!(intent_id = %intent.id, status = %intent.status, "Retrieved payment intent");

        if !intent.currency.eq_ignore_ascii_case(self.config.currency.as_str()) {
            return Ok(PaymentConfirmation::Failed {
                reason: format!("unexpected currency {}", intent.currency),
            });
        }

        Ok(intent.confirmation())
    }

    #[instrument(skip(self, payload, secret))]
    async fn verify_webhook(&self, payload: &[u8], secret: Option<&str>) -> ShopResult<PaymentEvent> {
        let header = secret.ok_or_else(|| {
            ShopError::WebhookVerificationFailed("Missing Stripe-Signature header".to_string())
        })?;

        verify_signature(&self.config.webhook_secret, payload, header, Utc::now().timestamp())?;

        let event = StripeEvent::parse(payload)?;
        debug!(event_id = %event.id, event_type = %event.event_type, "Verified Stripe webhook");
        Ok(event.into_payment_event(self.config.currency))
    }
}

// =============================================================================
// Stripe API Types
// =============================================================================

/// The subset of a PaymentIntent object the storefront reads
#[derive(Debug, Clone, Deserialize)]
pub struct StripePaymentIntent {
    pub id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    pub amount: i64,
    #[serde(default)]
    pub amount_received: Option<i64>,
    pub currency: String,
    pub status: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub last_payment_error: Option<StripeError>,
}

impl StripePaymentIntent {
    /// User id written into `metadata[user_id]` when the intent was created
    pub fn payer(&self) -> Option<Uuid> {
        let raw = self.metadata.get("user_id")?;
        match Uuid::parse_str(raw) {
            Ok(user_id) => Some(user_id),
            Err(_) => {
                warn!(intent_id = %self.id, user_id = %raw, "Intent metadata has a malformed user id");
                None
            }
        }
    }

    /// Map the intent status onto a provider-neutral confirmation
    pub fn confirmation(&self) -> PaymentConfirmation {
        match self.status.as_str() {
            "succeeded" => PaymentConfirmation::Succeeded {
                amount_minor: self.amount_received.unwrap_or(self.amount),
                payer: self.payer(),
            },
            "processing" => PaymentConfirmation::Processing {
                payer: self.payer(),
            },
            "canceled" => PaymentConfirmation::Failed {
                reason: "canceled".to_string(),
            },
            "requires_payment_method" if self.last_payment_error.is_some() => {
                PaymentConfirmation::Failed {
                    reason: self
                        .last_payment_error
                        .as_ref()
                        .map(|e| e.message.clone())
                        .unwrap_or_default(),
                }
            }
            other => PaymentConfirmation::RequiresAction {
                status: other.to_string(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct StripeErrorResponse {
    error: StripeError,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeError {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub code: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webhook::sign_payload;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use shop_core::{Currency, PaymentOutcome};
    use wiremock::matchers::{body_string_contains, header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn strategy(server: &MockServer) -> StripeCardStrategy {
        let config = StripeConfig::new("sk_test_123", "pk_test_123", "whsec_test")
            .with_api_base_url(server.uri());
        StripeCardStrategy::new(config).unwrap()
    }

    const PAYER: &str = "6f1c2a4e-0b7d-4c3a-9e8f-2d5b7a9c1e30";

    fn intent_json(status: &str, amount: i64) -> serde_json::Value {
        json!({
            "id": "pi_123",
            "object": "payment_intent",
            "client_secret": "pi_123_secret_abc",
            "amount": amount,
            "currency": "usd",
            "status": status,
            "metadata": { "user_id": PAYER, "attempt_id": "attempt-1" }
        })
    }

    #[tokio::test]
    async fn test_create_intent_in_minor_units() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/payment_intents"))
            .and(header("Authorization", "Bearer sk_test_123"))
            .and(header_exists("Idempotency-Key"))
            .and(body_string_contains("amount=4250"))
            .and(body_string_contains("currency=usd"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(intent_json("requires_payment_method", 4250)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let request = PaymentRequest::new("attempt-1", Uuid::new_v4(), dec!(42.50), Currency::USD);
        let initiation = strategy(&server).initiate(&request).await.unwrap();

        assert_eq!(
            initiation,
            PaymentInitiation::IntentCreated {
                intent_id: "pi_123".to_string(),
                client_secret: "pi_123_secret_abc".to_string(),
                amount_minor: 4250,
            }
        );
    }

    #[tokio::test]
    async fn test_provider_error_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/payment_intents"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": { "message": "Amount must be at least $0.50 usd", "code": "amount_too_small" }
            })))
            .mount(&server)
            .await;

        let request = PaymentRequest::new("attempt-1", Uuid::new_v4(), dec!(0.10), Currency::USD);
        let err = strategy(&server).initiate(&request).await.unwrap_err();

        match err {
            ShopError::ProviderError { provider, message } => {
                assert_eq!(provider, "stripe");
                assert!(message.contains("at least"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rejects_other_currency_without_calling_provider() {
        let server = MockServer::start().await;
        let request = PaymentRequest::new("attempt-1", Uuid::new_v4(), dec!(10), Currency::KES);

        let err = strategy(&server).initiate(&request).await.unwrap_err();
        assert!(matches!(err, ShopError::InvalidRequest(_)));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_confirmation_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/payment_intents/pi_123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(intent_json("succeeded", 4250)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/payment_intents/pi_456"))
            .respond_with(ResponseTemplate::new(200).set_body_json(intent_json("processing", 999)))
            .mount(&server)
            .await;

        let payer = Some(Uuid::parse_str(PAYER).unwrap());
        let strategy = strategy(&server);
        assert_eq!(
            strategy.confirmation("pi_123").await.unwrap(),
            PaymentConfirmation::Succeeded {
                amount_minor: 4250,
                payer
            }
        );
        assert_eq!(
            strategy.confirmation("pi_456").await.unwrap(),
            PaymentConfirmation::Processing { payer }
        );
        assert!(matches!(
            strategy.confirmation("../v1/customers").await,
            Err(ShopError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_intent_status_mapping() {
        let mut intent: StripePaymentIntent =
            serde_json::from_value(intent_json("requires_action", 100)).unwrap();
        assert_eq!(
            intent.confirmation(),
            PaymentConfirmation::RequiresAction {
                status: "requires_action".to_string()
            }
        );

        intent.status = "canceled".to_string();
        assert!(matches!(intent.confirmation(), PaymentConfirmation::Failed { .. }));
    }

    #[test]
    fn test_payer_from_metadata() {
        let mut intent: StripePaymentIntent =
            serde_json::from_value(intent_json("succeeded", 100)).unwrap();
        assert_eq!(intent.payer(), Some(Uuid::parse_str(PAYER).unwrap()));

        intent.metadata.insert("user_id".to_string(), "not-a-uuid".to_string());
        assert_eq!(intent.payer(), None);

        intent.metadata.clear();
        assert_eq!(
            intent.confirmation(),
            PaymentConfirmation::Succeeded {
                amount_minor: 100,
                payer: None
            }
        );
    }

    #[tokio::test]
    async fn test_verify_webhook() {
        let server = MockServer::start().await;
        let strategy = strategy(&server);
        let payload = json!({
            "id": "evt_1",
            "type": "payment_intent.succeeded",
            "data": { "object": { "id": "pi_123", "amount": 4250, "currency": "usd" } }
        })
        .to_string();

        let header = sign_payload("whsec_test", Utc::now().timestamp(), payload.as_bytes()).unwrap();
        let event = strategy
            .verify_webhook(payload.as_bytes(), Some(&header))
            .await
            .unwrap();
        assert_eq!(event.reference, "pi_123");
        assert_eq!(event.outcome, PaymentOutcome::Succeeded);

        assert!(matches!(
            strategy.verify_webhook(payload.as_bytes(), None).await,
            Err(ShopError::WebhookVerificationFailed(_))
        ));
    }
}
