//! # M-Pesa STK Strategy
//!
//! Mobile-money strategy: pushes a payment prompt to the payer's phone. The
//! synchronous answer only says the push was accepted; the outcome arrives
//! later on the callback URL.

use crate::auth::fetch_access_token;
use crate::callback::StkCallback;
use crate::config::MpesaConfig;
use crate::phone::normalize_phone;
use crate::stk::{password, timestamp, DarajaError, StkPushRequest, StkPushResponse};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use shop_core::{
    whole_units, PaymentEvent, PaymentInitiation, PaymentMethod, PaymentRequest, PaymentStrategy,
    ShopError, ShopResult,
};
use tracing::{debug, error, info, instrument, warn};

const PROVIDER: &str = "mpesa";

/// Daraja limits AccountReference to 12 characters
const ACCOUNT_REFERENCE_MAX: usize = 12;
/// and TransactionDesc to 13
const TRANSACTION_DESC_MAX: usize = 13;

pub struct MpesaStkStrategy {
    config: MpesaConfig,
    client: Client,
}

impl MpesaStkStrategy {
    pub fn new(config: MpesaConfig) -> ShopResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| ShopError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    /// Create from environment variables
    pub fn from_env() -> ShopResult<Self> {
        Self::new(MpesaConfig::from_env()?)
    }

    pub fn config(&self) -> &MpesaConfig {
        &self.config
    }

    /// Build the push body for a normalized phone and whole-unit amount
    pub fn build_push_request(&self, phone: &str, amount: i64, reference: &str, description: &str) -> StkPushRequest {
        let ts = timestamp(Utc::now());

        StkPushRequest {
            business_short_code: self.config.shortcode.clone(),
            password: password(&self.config.shortcode, &self.config.passkey, &ts),
            timestamp: ts,
            transaction_type: self.config.transaction_type.clone(),
            amount,
            party_a: phone.to_string(),
            party_b: self.config.shortcode.clone(),
            phone_number: phone.to_string(),
            call_back_url: self.config.signed_callback_url(),
            account_reference: truncate(reference, ACCOUNT_REFERENCE_MAX),
            transaction_desc: truncate(description, TRANSACTION_DESC_MAX),
        }
    }

    /// POST /mpesa/stkpush/v1/processrequest
    #[instrument(skip(self, body), fields(amount = body.amount))]
    pub async fn stk_push(&self, body: &StkPushRequest) -> ShopResult<StkPushResponse> {
        let token = fetch_access_token(&self.client, &self.config).await?;
        let url = format!("{}/mpesa/stkpush/v1/processrequest", self.config.api_base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|e| ShopError::NetworkError(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ShopError::NetworkError(e.to_string()))?;

        if !status.is_success() {
            error!("Daraja STK error: status={}, body={}", status, text);

            if let Ok(daraja) = serde_json::from_str::<DarajaError>(&text) {
                return Err(ShopError::PaymentRejected {
                    provider: PROVIDER.to_string(),
                    code: daraja.error_code,
                    message: daraja.error_message,
                });
            }

            return Err(ShopError::ProviderError {
                provider: PROVIDER.to_string(),
                message: format!("HTTP {}: {}", status, text),
            });
        }

        serde_json::from_str(&text)
            .map_err(|e| ShopError::Serialization(format!("Failed to parse STK response: {}", e)))
    }
}

fn truncate(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0, |acc, (x, y)| acc | (x ^ y))
        == 0
}

#[async_trait]
impl PaymentStrategy for MpesaStkStrategy {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::MobileMoney
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }

    #[instrument(skip(self, request), fields(attempt_id = %request.attempt_id))]
    async fn initiate(&self, request: &PaymentRequest) -> ShopResult<PaymentInitiation> {
        let raw_phone = request
            .phone_number
            .as_deref()
            .ok_or_else(|| ShopError::Validation("Phone number is required".to_string()))?;
        let phone = normalize_phone(raw_phone)?;

        let amount = whole_units(request.amount)?;
        if amount < 1 {
            return Err(ShopError::InvalidRequest(
                "Payment amount must be at least 1".to_string(),
            ));
        }

        let body = self.build_push_request(&phone, amount, "Duka", &request.description);
        let response = self.stk_push(&body).await?;

        if !response.is_accepted() {
            warn!(
                code = %response.response_code,
                description = %response.response_description,
                "STK push not accepted"
            );
            return Err(ShopError::PaymentRejected {
                provider: PROVIDER.to_string(),
                code: response.response_code,
                message: response.response_description,
            });
        }

        info!(checkout_request_id = %response.checkout_request_id, amount, "STK push accepted");

        Ok(PaymentInitiation::PushAccepted {
            checkout_request_id: response.checkout_request_id,
            merchant_request_id: response.merchant_request_id,
            customer_message: response.customer_message,
        })
    }

    /// `secret` is the `token` query parameter from the callback URL
    #[instrument(skip(self, payload, secret))]
    async fn verify_webhook(&self, payload: &[u8], secret: Option<&str>) -> ShopResult<PaymentEvent> {
        let token = secret.ok_or_else(|| {
            ShopError::WebhookVerificationFailed("Missing callback token".to_string())
        })?;

        if !constant_time_compare(token, &self.config.callback_token) {
            return Err(ShopError::WebhookVerificationFailed(
                "Callback token mismatch".to_string(),
            ));
        }

        let callback = StkCallback::parse(payload)?;
        debug!(
            checkout_request_id = %callback.checkout_request_id,
            result_code = callback.result_code,
            "Verified STK callback"
        );
        Ok(callback.into_payment_event())
    }
}
