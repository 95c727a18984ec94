//! # STK Callback
//!
//! Typed payload Daraja posts to the callback URL once the payer accepts or
//! dismisses the prompt.

use rust_decimal::Decimal;
use serde::Deserialize;
use shop_core::{PaymentEvent, PaymentOutcome, ShopError, ShopResult};
use std::str::FromStr;

#[derive(Debug, Clone, Deserialize)]
pub struct StkCallbackEnvelope {
    #[serde(rename = "Body")]
    pub body: StkCallbackBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StkCallbackBody {
    #[serde(rename = "stkCallback")]
    pub stk_callback: StkCallback,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "ResultCode")]
    pub result_code: i64,
    #[serde(rename = "ResultDesc", default)]
    pub result_desc: String,
    #[serde(rename = "CallbackMetadata", default)]
    pub callback_metadata: Option<CallbackMetadata>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackMetadata {
    #[serde(rename = "Item", default)]
    pub items: Vec<CallbackItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackItem {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value", default)]
    pub value: Option<serde_json::Value>,
}

impl StkCallback {
    pub fn parse(payload: &[u8]) -> ShopResult<Self> {
        let envelope: StkCallbackEnvelope = serde_json::from_slice(payload)
            .map_err(|e| ShopError::WebhookParseError(format!("Invalid STK callback: {}", e)))?;
        Ok(envelope.body.stk_callback)
    }

    fn item(&self, name: &str) -> Option<&serde_json::Value> {
        self.callback_metadata
            .as_ref()?
            .items
            .iter()
            .find(|item| item.name == name)?
            .value
            .as_ref()
    }

    /// Paid amount, in whole shillings
    pub fn amount(&self) -> Option<Decimal> {
        match self.item("Amount")? {
            serde_json::Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
            serde_json::Value::String(s) => Decimal::from_str(s).ok(),
            _ => None,
        }
    }

    pub fn receipt_number(&self) -> Option<String> {
        self.item("MpesaReceiptNumber")
            .and_then(|v| v.as_str())
            .map(String::from)
    }

    pub fn is_success(&self) -> bool {
        self.result_code == 0
    }

    pub fn into_payment_event(self) -> PaymentEvent {
        let (outcome, amount, receipt) = if self.is_success() {
            (PaymentOutcome::Succeeded, self.amount(), self.receipt_number())
        } else {
            (
                PaymentOutcome::Failed {
                    reason: self.result_desc.clone(),
                },
                None,
                None,
            )
        };

        PaymentEvent {
            provider: "mpesa".to_string(),
            reference: self.checkout_request_id,
            outcome,
            amount,
            receipt,
        }
    }
}
