//! # shop-catalog
//!
//! HTTP implementation of the `CatalogGateway` port. The cart calls it the
//! first time a product id is added that local storage has never seen.
//!
//! ```rust,ignore
//! use shop_catalog::HttpCatalogGateway;
//!
//! let catalog = HttpCatalogGateway::from_env()?;
//! let record = catalog.fetch_product("1").await?;
//! ```

pub mod config;
pub mod gateway;

pub use config::CatalogConfig;
pub use gateway::HttpCatalogGateway;
