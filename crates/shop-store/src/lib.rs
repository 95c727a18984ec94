//! # shop-store
//!
//! Storage backends for the Duka storefront.
//!
//! - `MemoryStore`: everything behind one `RwLock`, for tests and local runs
//! - `PgStore`: PostgreSQL through `sqlx`, migrations embedded from `migrations/`
//!
//! `Stores` bundles the four ports so the API layer can stay backend-agnostic.

pub mod memory;
pub mod postgres;

#[cfg(test)]
mod checkout_tests;
#[cfg(test)]
mod test_db;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use shop_core::{CartStore, OrderStore, ProductStore, ShopError, ShopResult, UserStore};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::info;

/// The four storage ports, backed by one store
#[derive(Clone)]
pub struct Stores {
    pub products: Arc<dyn ProductStore>,
    pub carts: Arc<dyn CartStore>,
    pub orders: Arc<dyn OrderStore>,
    pub users: Arc<dyn UserStore>,
}

impl Stores {
    /// Fresh in-memory stores
    pub fn memory() -> Self {
        Self::from_memory(MemoryStore::new())
    }

    pub fn from_memory(store: MemoryStore) -> Self {
        let store = Arc::new(store);
        Self {
            products: store.clone(),
            carts: store.clone(),
            orders: store.clone(),
            users: store,
        }
    }

    pub fn postgres(store: PgStore) -> Self {
        let store = Arc::new(store);
        Self {
            products: store.clone(),
            carts: store.clone(),
            orders: store.clone(),
            users: store,
        }
    }
}

/// Connect to PostgreSQL and apply pending migrations
pub async fn connect(database_url: &str, max_connections: u32) -> ShopResult<PgStore> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .map_err(|e| ShopError::Storage(format!("Failed to connect to database: {}", e)))?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| ShopError::Storage(format!("Failed to run migrations: {}", e)))?;

    info!("Database connected and migrated");
    Ok(PgStore::new(pool))
}
