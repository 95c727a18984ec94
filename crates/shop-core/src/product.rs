//! # Product Types
//!
//! Local product records and the currency they are priced in.
//! Products arrive either from an admin action, from `config/products.toml`,
//! or lazily from the external catalog the first time a cart references them.

use crate::catalog::CatalogProduct;
use crate::error::{ShopError, ShopResult};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Supported currencies (ISO 4217)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    USD,
    KES,
}

impl Currency {
    /// Returns the ISO 4217 currency code
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::USD => "usd",
            Currency::KES => "kes",
        }
    }

    /// Returns the number of decimal places of the minor unit
    pub fn decimal_places(&self) -> u32 {
        2
    }

    /// Convert a decimal amount to the smallest currency unit (cents, etc.)
    ///
    /// Half-way values round away from zero, so `42.505` becomes `4251`.
    pub fn to_minor_units(&self, amount: Decimal) -> ShopResult<i64> {
        let scaled = amount * Decimal::from(10_i64.pow(self.decimal_places()));
        scaled
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .ok_or_else(|| ShopError::InvalidRequest(format!("Amount out of range: {}", amount)))
    }

    /// Convert from smallest unit back to decimal
    pub fn from_minor_units(&self, amount: i64) -> Decimal {
        Decimal::new(amount, self.decimal_places())
    }

    /// Parse a lowercase or uppercase ISO code
    pub fn parse(code: &str) -> ShopResult<Self> {
        match code.to_ascii_lowercase().as_str() {
            "usd" => Ok(Currency::USD),
            "kes" => Ok(Currency::KES),
            other => Err(ShopError::Configuration(format!(
                "Unsupported currency: {}",
                other
            ))),
        }
    }
}

impl Default for Currency {
    fn default() -> Self {
        Currency::USD
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str().to_uppercase())
    }
}

/// Decimal places kept on stored prices; matches the `NUMERIC(12, 2)` columns.
pub const PRICE_SCALE: u32 = 2;

/// Round a price to [`PRICE_SCALE`] places, half-way values away from zero.
///
/// Every way a product enters storage goes through this, so cart totals are
/// the same whichever backend holds the product.
pub fn normalize_price(price: Decimal) -> Decimal {
    let mut price = price.round_dp_with_strategy(PRICE_SCALE, RoundingStrategy::MidpointAwayFromZero);
    price.rescale(PRICE_SCALE);
    price
}

/// Round an amount to a whole number of major units.
///
/// Mobile-money pushes only accept integer amounts.
pub fn whole_units(amount: Decimal) -> ShopResult<i64> {
    amount
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(|| ShopError::InvalidRequest(format!("Amount out of range: {}", amount)))
}

/// A product in local storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Product identifier (external catalog ids are reused verbatim)
    pub id: String,

    /// Display name
    pub name: String,

    /// Description
    #[serde(default)]
    pub description: String,

    /// Unit price
    pub price: Decimal,

    /// Units in stock
    #[serde(default)]
    pub stock: i32,

    /// Category slug
    #[serde(default)]
    pub category: String,

    /// Image URLs
    #[serde(default)]
    pub images: Vec<String>,

    /// Created timestamp
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Product {
    /// Create a product with just the fields checkout needs
    pub fn new(id: impl Into<String>, name: impl Into<String>, price: Decimal) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            price: normalize_price(price),
            stock: 0,
            category: String::new(),
            images: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Copy an external catalog record into a local product.
    ///
    /// The catalog id becomes the local primary key and the price is
    /// normalized to [`PRICE_SCALE`].
    pub fn from_catalog(record: CatalogProduct) -> Self {
        Self {
            id: record.id,
            name: record.title,
            description: record.description,
            price: normalize_price(record.price),
            stock: record.stock,
            category: record.category,
            images: record.images,
            created_at: Utc::now(),
        }
    }

    /// Builder: set description
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    /// Builder: set category
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Builder: set stock
    pub fn with_stock(mut self, stock: i32) -> Self {
        self.stock = stock;
        self
    }

    /// Builder: add an image URL
    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.images.push(url.into());
        self
    }
}

/// Admin-supplied fields for a new product
#[derive(Debug, Clone, Deserialize)]
pub struct NewProduct {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: Decimal,
    #[serde(default)]
    pub stock: i32,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub images: Vec<String>,
}

impl NewProduct {
    /// Validate and turn into a product with a generated id
    pub fn into_product(self) -> ShopResult<Product> {
        if self.name.trim().is_empty() {
            return Err(ShopError::Validation("Product name is required".to_string()));
        }
        if self.price.is_sign_negative() {
            return Err(ShopError::Validation("Price cannot be negative".to_string()));
        }
        if self.stock < 0 {
            return Err(ShopError::Validation("Stock cannot be negative".to_string()));
        }

        Ok(Product {
            id: uuid::Uuid::new_v4().to_string(),
            name: self.name,
            description: self.description,
            price: normalize_price(self.price),
            stock: self.stock,
            category: self.category,
            images: self.images,
            created_at: Utc::now(),
        })
    }
}

/// Listing filter for local products
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductFilter {
    /// Exact category match
    #[serde(default)]
    pub category: Option<String>,
    /// Case-insensitive match on name or description
    #[serde(default)]
    pub search: Option<String>,
}

impl ProductFilter {
    /// Check whether a product passes the filter
    pub fn matches(&self, product: &Product) -> bool {
        if let Some(category) = self.category.as_deref().filter(|c| !c.is_empty()) {
            if product.category != category {
                return false;
            }
        }

        match self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(needle) => {
                let needle = needle.to_lowercase();
                product.name.to_lowercase().contains(&needle)
                    || product.description.to_lowercase().contains(&needle)
            }
            None => true,
        }
    }
}

/// Seed catalog (loaded from config)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductCatalog {
    #[serde(default)]
    pub products: Vec<Product>,
}

impl ProductCatalog {
    /// Load catalog from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }
}
