//! # Stripe Configuration
//!
//! Configuration management for the card provider.
//! All secrets are loaded from environment variables.

use shop_core::{Currency, ShopError, ShopResult};
use std::env;

pub const DEFAULT_API_BASE_URL: &str = "https://api.stripe.com";
pub const DEFAULT_API_VERSION: &str = "2024-12-18.acacia";

/// Stripe API configuration
#[derive(Debug, Clone)]
pub struct StripeConfig {
    /// Secret API key (sk_test_... or sk_live_...)
    pub secret_key: String,

    /// Publishable key handed to the client-side widget (pk_test_... or pk_live_...)
    pub publishable_key: String,

    /// Webhook signing secret (whsec_...)
    pub webhook_secret: String,

    /// API base URL (for testing/mocking)
    pub api_base_url: String,

    /// API version
    pub api_version: String,

    /// The single currency every intent is created in
    pub currency: Currency,
}

impl StripeConfig {
    /// Load configuration from environment variables.
    ///
    /// Required env vars:
    /// - `STRIPE_SECRET_KEY`
    /// - `STRIPE_PUBLISHABLE_KEY`
    /// - `STRIPE_WEBHOOK_SECRET`
    ///
    /// Optional: `STRIPE_API_BASE_URL`, `STRIPE_CURRENCY` (default `usd`).
    pub fn from_env() -> ShopResult<Self> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let secret_key = required("STRIPE_SECRET_KEY")?;
        let publishable_key = required("STRIPE_PUBLISHABLE_KEY")?;
        let webhook_secret = required("STRIPE_WEBHOOK_SECRET")?;

        let currency = match env::var("STRIPE_CURRENCY") {
            Ok(code) => Currency::parse(&code)?,
            Err(_) => Currency::USD,
        };

        let config = Self::new(secret_key, publishable_key, webhook_secret)
            .with_currency(currency)
            .with_api_base_url(
                env::var("STRIPE_API_BASE_URL").unwrap_or_else(|_| DEFAULT_API_BASE_URL.to_string()),
            );

        config.validate()?;
        Ok(config)
    }

    /// Create config with explicit values (for testing)
    pub fn new(
        secret_key: impl Into<String>,
        publishable_key: impl Into<String>,
        webhook_secret: impl Into<String>,
    ) -> Self {
        Self {
            secret_key: secret_key.into(),
            publishable_key: publishable_key.into(),
            webhook_secret: webhook_secret.into(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            currency: Currency::USD,
        }
    }

    /// Validate key formats
    pub fn validate(&self) -> ShopResult<()> {
        if !self.secret_key.starts_with("sk_test_") && !self.secret_key.starts_with("sk_live_") {
            return Err(ShopError::Configuration(
                "STRIPE_SECRET_KEY must start with sk_test_ or sk_live_".to_string(),
            ));
        }

        if !self.publishable_key.starts_with("pk_test_") && !self.publishable_key.starts_with("pk_live_") {
            return Err(ShopError::Configuration(
                "STRIPE_PUBLISHABLE_KEY must start with pk_test_ or pk_live_".to_string(),
            ));
        }

        if !self.webhook_secret.starts_with("whsec_") {
            return Err(ShopError::Configuration(
                "STRIPE_WEBHOOK_SECRET must start with whsec_".to_string(),
            ));
        }

        Ok(())
    }

    /// Check if using test keys
    pub fn is_test_mode(&self) -> bool {
        self.secret_key.starts_with("sk_test_")
    }

    /// Get authorization header value
    pub fn auth_header(&self) -> String {
        format!("Bearer {}", self.secret_key)
    }

    /// Builder: set custom API base URL (for testing)
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_currency(mut self, currency: Currency) -> Self {
        self.currency = currency;
        self
    }
}

fn required(key: &str) -> ShopResult<String> {
    env::var(key).map_err(|_| ShopError::Configuration(format!("{} not set", key)))
}
