//! # Catalog Configuration

use std::env;
use std::time::Duration;

pub const DEFAULT_CATALOG_URL: &str = "https://dummyjson.com";

/// External catalog endpoint settings
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Base URL; products are read from `{base_url}/products/{id}`
    pub base_url: String,

    /// Per-request timeout
    pub timeout: Duration,
}

impl CatalogConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Load from `CATALOG_API_URL` and `CATALOG_TIMEOUT_SECS`, both optional
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let mut config = Self::new(
            env::var("CATALOG_API_URL").unwrap_or_else(|_| DEFAULT_CATALOG_URL.to_string()),
        );
        if let Some(secs) = env::var("CATALOG_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            config.timeout = Duration::from_secs(secs);
        }
        config
    }

    pub fn product_url(&self, product_id: &str) -> String {
        format!("{}/products/{}", self.base_url, product_id)
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self::new(DEFAULT_CATALOG_URL)
    }
}
