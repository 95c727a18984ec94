//! # M-Pesa Configuration
//!
//! Daraja merchant credentials, loaded from environment variables.

use shop_core::{ShopError, ShopResult};
use std::env;

pub const SANDBOX_API_BASE_URL: &str = "https://sandbox.safaricom.co.ke";
pub const DEFAULT_TRANSACTION_TYPE: &str = "CustomerPayBillOnline";

/// Daraja API configuration
#[derive(Debug, Clone)]
pub struct MpesaConfig {
    /// App consumer key
    pub consumer_key: String,

    /// App consumer secret
    pub consumer_secret: String,

    /// Paybill or till number (BusinessShortCode and PartyB)
    pub shortcode: String,

    /// Lipa Na M-Pesa Online passkey
    pub passkey: String,

    /// Public URL Daraja posts the STK result to
    pub callback_url: String,

    /// Shared secret appended to the callback URL as `?token=`
    pub callback_token: String,

    /// API base URL (sandbox or production)
    pub api_base_url: String,

    /// `CustomerPayBillOnline` or `CustomerBuyGoodsOnline`
    pub transaction_type: String,
}

impl MpesaConfig {
    /// Load configuration from environment variables.
    ///
    /// Required env vars:
    /// - `MPESA_CONSUMER_KEY`
    /// - `MPESA_CONSUMER_SECRET`
    /// - `MPESA_SHORTCODE`
    /// - `MPESA_PASSKEY`
    /// - `MPESA_CALLBACK_URL`
    ///
    /// Optional: `MPESA_CALLBACK_TOKEN` (random per process when unset),
    /// `MPESA_API_BASE_URL`, `MPESA_TRANSACTION_TYPE`.
    pub fn from_env() -> ShopResult<Self> {
        dotenvy::dotenv().ok();

        let mut config = Self::new(
            required("MPESA_CONSUMER_KEY")?,
            required("MPESA_CONSUMER_SECRET")?,
            required("MPESA_SHORTCODE")?,
            required("MPESA_PASSKEY")?,
            required("MPESA_CALLBACK_URL")?,
        );

        if let Ok(token) = env::var("MPESA_CALLBACK_TOKEN") {
            config.callback_token = token;
        }
        if let Ok(url) = env::var("MPESA_API_BASE_URL") {
            config = config.with_api_base_url(url);
        }
        if let Ok(kind) = env::var("MPESA_TRANSACTION_TYPE") {
            config.transaction_type = kind;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn new(
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
        shortcode: impl Into<String>,
        passkey: impl Into<String>,
        callback_url: impl Into<String>,
    ) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
            shortcode: shortcode.into(),
            passkey: passkey.into(),
            callback_url: callback_url.into(),
            callback_token: uuid::Uuid::new_v4().simple().to_string(),
            api_base_url: SANDBOX_API_BASE_URL.to_string(),
            transaction_type: DEFAULT_TRANSACTION_TYPE.to_string(),
        }
    }

    pub fn validate(&self) -> ShopResult<()> {
        if self.shortcode.is_empty() || !self.shortcode.chars().all(|c| c.is_ascii_digit()) {
            return Err(ShopError::Configuration(
                "MPESA_SHORTCODE must be numeric".to_string(),
            ));
        }
        if !self.callback_url.starts_with("https://") && !self.callback_url.starts_with("http://") {
            return Err(ShopError::Configuration(
                "MPESA_CALLBACK_URL must be an absolute URL".to_string(),
            ));
        }
        if self.callback_token.len() < 16 {
            return Err(ShopError::Configuration(
                "MPESA_CALLBACK_TOKEN must be at least 16 characters".to_string(),
            ));
        }
        Ok(())
    }

    /// Callback URL including the verification token
    pub fn signed_callback_url(&self) -> String {
        let separator = if self.callback_url.contains('?') { '&' } else { '?' };
        format!("{}{}token={}", self.callback_url, separator, self.callback_token)
    }

    /// Builder: set custom API base URL (for testing)
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_callback_token(mut self, token: impl Into<String>) -> Self {
        self.callback_token = token.into();
        self
    }
}

fn required(key: &str) -> ShopResult<String> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ShopError::Configuration(format!("{} not set", key))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> MpesaConfig {
        MpesaConfig::new("key", "secret", "174379", "passkey", "https://shop.example.com/webhook/mpesa")
    }

    #[test]
    fn test_signed_callback_url() {
        let config = config().with_callback_token("0123456789abcdef");
        assert_eq!(
            config.signed_callback_url(),
            "https://shop.example.com/webhook/mpesa?token=0123456789abcdef"
        );
    }

    #[test]
    fn test_generated_token_is_valid() {
        let a = config();
        let b = config();
        assert!(a.validate().is_ok());
        assert_ne!(a.callback_token, b.callback_token);
    }

    #[test]
    fn test_validation() {
        let mut bad = config();
        bad.shortcode = "abc".into();
        assert!(matches!(bad.validate(), Err(ShopError::Configuration(_))));

        let bad = config().with_callback_token("short");
        assert!(bad.validate().is_err());
    }
}
