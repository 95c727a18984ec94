//! # Catalog Gateway
//!
//! Port for the external, read-only product catalog. The cart uses it to sync
//! an unknown product id into local storage before adding it.

use crate::error::ShopResult;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A product record as served by the external catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogProduct {
    pub id: String,
    pub title: String,
    pub description: String,
    pub price: Decimal,
    pub stock: i32,
    pub category: String,
    pub images: Vec<String>,
}

/// Fetches single product records from the external catalog
#[async_trait]
pub trait CatalogGateway: Send + Sync {
    /// Fetch one product by id.
    ///
    /// Any failure (unknown id, non-2xx, network, bad payload) is reported as
    /// `ShopError::CatalogSync` or `ShopError::ProductNotFound`.
    async fn fetch_product(&self, product_id: &str) -> ShopResult<CatalogProduct>;
}
