//! # HTTP Catalog Gateway
//!
//! Reads single product records from a dummyjson-compatible catalog API.

use crate::config::CatalogConfig;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use shop_core::{CatalogGateway, CatalogProduct, ShopError, ShopResult};
use std::str::FromStr;
use tracing::{debug, instrument, warn};

/// `CatalogGateway` over HTTP
pub struct HttpCatalogGateway {
    config: CatalogConfig,
    client: Client,
}

impl HttpCatalogGateway {
    pub fn new(config: CatalogConfig) -> ShopResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ShopError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    pub fn from_env() -> ShopResult<Self> {
        Self::new(CatalogConfig::from_env())
    }

    fn sync_error(product_id: &str, message: impl Into<String>) -> ShopError {
        ShopError::CatalogSync {
            product_id: product_id.to_string(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl CatalogGateway for HttpCatalogGateway {
    #[instrument(skip(self))]
    async fn fetch_product(&self, product_id: &str) -> ShopResult<CatalogProduct> {
        if product_id.is_empty()
            || !product_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ShopError::ProductNotFound {
                product_id: product_id.to_string(),
            });
        }

        let url = self.config.product_url(product_id);
        debug!(%url, "Fetching catalog product");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Self::sync_error(product_id, e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ShopError::ProductNotFound {
                product_id: product_id.to_string(),
            });
        }
        if !status.is_success() {
            warn!(%status, "Catalog API error");
            return Err(Self::sync_error(product_id, format!("HTTP {}", status)));
        }

        let wire: WireProduct = response
            .json()
            .await
            .map_err(|e| Self::sync_error(product_id, format!("Invalid catalog payload: {}", e)))?;

        wire.into_catalog_product(product_id)
    }
}

/// Catalog payload: ids and prices arrive as JSON numbers.
///
/// The stored product is keyed by the id the cart asked for. The upstream may
/// normalize ids (`"01"` comes back as `1`), so its echo is only logged.
#[derive(Debug, Deserialize)]
struct WireProduct {
    #[serde(default)]
    id: Option<serde_json::Value>,
    title: String,
    #[serde(default)]
    description: String,
    price: serde_json::Number,
    #[serde(default)]
    stock: i32,
    #[serde(default)]
    category: String,
    #[serde(default)]
    images: Vec<String>,
}

impl WireProduct {
    fn into_catalog_product(self, requested_id: &str) -> ShopResult<CatalogProduct> {
        let echoed = match self.id {
            Some(serde_json::Value::Number(n)) => Some(n.to_string()),
            Some(serde_json::Value::String(s)) => Some(s),
            _ => None,
        };
        if let Some(echoed) = echoed.filter(|id| id != requested_id) {
            debug!(requested_id, %echoed, "Catalog returned a different product id");
        }

        let price = Decimal::from_str(&self.price.to_string())
            .or_else(|_| Decimal::from_scientific(&self.price.to_string()))
            .map_err(|e| HttpCatalogGateway::sync_error(requested_id, format!("Invalid price: {}", e)))?;

        Ok(CatalogProduct {
            id: requested_id.to_string(),
            title: self.title,
            description: self.description,
            price,
            stock: self.stock,
            category: self.category,
            images: self.images,
        })
    }
}
