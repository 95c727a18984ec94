//! # Stripe Webhook Handling
//!
//! Signature verification for the `Stripe-Signature` header and the typed
//! event payload. Only payment intent outcomes reach the orchestrator; every
//! other event type is acknowledged and ignored.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use shop_core::{Currency, PaymentEvent, PaymentOutcome, ShopError, ShopResult};
use std::collections::HashMap;

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a signed webhook, in seconds
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Events that should be enabled in the Stripe Dashboard
pub const REQUIRED_WEBHOOK_EVENTS: &[&str] = &[
    "payment_intent.succeeded",
    "payment_intent.payment_failed",
];

/// Parsed `Stripe-Signature` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    pub signatures: Vec<String>,
}

pub fn parse_signature_header(header: &str) -> ShopResult<SignatureHeader> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = value.parse().ok(),
            "v1" => signatures.push(value.to_string()),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or_else(|| {
        ShopError::WebhookVerificationFailed("Missing timestamp in signature".to_string())
    })?;

    if signatures.is_empty() {
        return Err(ShopError::WebhookVerificationFailed(
            "No v1 signature found".to_string(),
        ));
    }

    Ok(SignatureHeader {
        timestamp,
        signatures,
    })
}

/// Hex HMAC-SHA256 of `"{timestamp}.{payload}"`
pub fn compute_signature(secret: &str, timestamp: i64, payload: &[u8]) -> ShopResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ShopError::Internal(format!("Invalid HMAC key: {}", e)))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Build a `Stripe-Signature` header value for a payload
pub fn sign_payload(secret: &str, timestamp: i64, payload: &[u8]) -> ShopResult<String> {
    Ok(format!(
        "t={},v1={}",
        timestamp,
        compute_signature(secret, timestamp, payload)?
    ))
}

/// Check a signature header against the payload at time `now` (unix seconds)
pub fn verify_signature(secret: &str, payload: &[u8], header: &str, now: i64) -> ShopResult<()> {
    let parsed = parse_signature_header(header)?;

    if (now - parsed.timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(ShopError::WebhookVerificationFailed(
            "Timestamp outside tolerance".to_string(),
        ));
    }

    let expected = compute_signature(secret, parsed.timestamp, payload)?;
    let valid = parsed
        .signatures
        .iter()
        .any(|sig| constant_time_compare(sig, &expected));

    if !valid {
        return Err(ShopError::WebhookVerificationFailed(
            "Signature mismatch".to_string(),
        ));
    }

    Ok(())
}

pub(crate) fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0, |acc, (x, y)| acc | (x ^ y))
        == 0
}

/// A Stripe event envelope
#[derive(Debug, Clone, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub created: i64,
    pub data: StripeEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEventData {
    pub object: StripeEventObject,
}

/// The event's `data.object`; only payment intent fields are read
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StripeEventObject {
    pub id: String,
    pub object: String,
    pub amount: i64,
    pub amount_received: Option<i64>,
    pub currency: Option<String>,
    pub status: Option<String>,
    pub last_payment_error: Option<LastPaymentError>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LastPaymentError {
    pub code: Option<String>,
    pub message: Option<String>,
}

impl StripeEvent {
    pub fn parse(payload: &[u8]) -> ShopResult<Self> {
        serde_json::from_slice(payload)
            .map_err(|e| ShopError::WebhookParseError(format!("Failed to parse webhook: {}", e)))
    }

    /// Translate into a provider-neutral payment event
    pub fn into_payment_event(self, currency: Currency) -> PaymentEvent {
        let object = self.data.object;
        let outcome = match self.event_type.as_str() {
            "payment_intent.succeeded" => PaymentOutcome::Succeeded,
            "payment_intent.payment_failed" => PaymentOutcome::Failed {
                reason: object
                    .last_payment_error
                    .as_ref()
                    .and_then(|e| e.message.clone().or_else(|| e.code.clone()))
                    .unwrap_or_else(|| "payment_failed".to_string()),
            },
            other => return PaymentEvent::ignored("stripe", other),
        };

        let amount = match outcome {
            PaymentOutcome::Succeeded => {
                Some(currency.from_minor_units(object.amount_received.unwrap_or(object.amount)))
            }
            _ => None,
        };

        PaymentEvent {
            provider: "stripe".to_string(),
            reference: object.id,
            outcome,
            amount,
            receipt: None,
        }
    }
}
