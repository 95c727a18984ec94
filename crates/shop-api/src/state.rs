//! # Application State
//!
//! Shared state for the Axum application.
//! Wires stores, the catalog gateway and payment strategies into the cart
//! service and checkout orchestrator.

use crate::auth::AuthKeys;
use shop_catalog::HttpCatalogGateway;
use shop_core::{
    BoxedPaymentStrategy, CartService, CatalogGateway, CheckoutOrchestrator, Currency,
    LoggingInvalidator, PaymentStrategySelector, ProductCatalog, ShopError, ShopResult,
};
use shop_mpesa::MpesaStkStrategy;
use shop_store::Stores;
use shop_stripe::{StripeCardStrategy, StripeConfig};
use std::sync::Arc;
use tracing::{info, warn};

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Public base URL
    pub base_url: String,
    /// Environment (development, staging, production)
    pub environment: String,
    /// PostgreSQL URL; in-memory stores when unset
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    /// HS256 signing secret for session tokens
    pub jwt_secret: String,
    /// Store currency; every cart total and order is in this currency
    pub currency: Currency,
}

impl AppConfig {
    /// Load from environment variables
    pub fn from_env() -> ShopResult<Self> {
        dotenvy::dotenv().ok();

        let environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let jwt_secret = match std::env::var("JWT_SECRET") {
            Ok(secret) if secret.len() >= 32 => secret,
            Ok(_) => {
                return Err(ShopError::Configuration(
                    "JWT_SECRET must be at least 32 characters".to_string(),
                ))
            }
            Err(_) if environment == "production" => {
                return Err(ShopError::Configuration("JWT_SECRET not set".to_string()))
            }
            Err(_) => {
                warn!("JWT_SECRET not set, sessions will not survive a restart");
                format!("{}{}", uuid::Uuid::new_v4().simple(), uuid::Uuid::new_v4().simple())
            }
        };

        let currency = match std::env::var("SHOP_CURRENCY") {
            Ok(code) => Currency::parse(&code)?,
            Err(_) => Currency::KES,
        };

        Ok(Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            base_url: std::env::var("BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            environment,
            database_url: std::env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),
            database_max_connections: std::env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|n| n.parse().ok())
                .unwrap_or(5),
            jwt_secret,
            currency,
        })
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> ShopResult<std::net::SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| ShopError::Configuration(format!("Invalid socket address: {}", e)))
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub stores: Stores,
    pub carts: CartService,
    pub checkout: Arc<CheckoutOrchestrator>,
    pub auth: Arc<AuthKeys>,
}

impl AppState {
    /// Build the full application from the environment
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        let stores = match &config.database_url {
            Some(url) => {
                let store = shop_store::connect(url, config.database_max_connections)
                    .await
                    .map_err(|e| anyhow::anyhow!("Failed to open database: {}", e))?;
                Stores::postgres(store)
            }
            None => {
                warn!("DATABASE_URL not set, using in-memory stores");
                Stores::memory()
            }
        };

        seed_products(&stores).await?;

        let catalog = HttpCatalogGateway::from_env()
            .map_err(|e| anyhow::anyhow!("Failed to initialize catalog gateway: {}", e))?;

        let strategies = payment_strategies(config.currency);

        Ok(Self::from_parts(config, stores, Arc::new(catalog), strategies))
    }

    /// Assemble state from already-built collaborators
    pub fn from_parts(
        config: AppConfig,
        stores: Stores,
        catalog: Arc<dyn CatalogGateway>,
        strategies: PaymentStrategySelector,
    ) -> Self {
        let invalidator = Arc::new(LoggingInvalidator);

        let carts = CartService::new(
            stores.products.clone(),
            stores.carts.clone(),
            catalog,
            invalidator.clone(),
        );
        let checkout = CheckoutOrchestrator::new(
            stores.carts.clone(),
            stores.orders.clone(),
            strategies,
            invalidator,
            config.currency,
        );
        let auth = AuthKeys::new(&config.jwt_secret);

        Self {
            config,
            stores,
            carts,
            checkout: Arc::new(checkout),
            auth: Arc::new(auth),
        }
    }
}

/// Register every provider whose credentials are present.
///
/// A provider without configuration is left out, so choosing it at checkout
/// fails with a configuration error instead of a failed provider call.
fn payment_strategies(currency: Currency) -> PaymentStrategySelector {
    let mut strategies = PaymentStrategySelector::new();

    match StripeConfig::from_env().and_then(|c| StripeCardStrategy::new(c.with_currency(currency))) {
        Ok(stripe) => {
            if !stripe.config().is_test_mode() {
                info!("Stripe running with live keys");
            }
            strategies.register(Arc::new(stripe) as BoxedPaymentStrategy);
        }
        Err(e) => warn!(error = %e, "Card payments disabled"),
    }

    match MpesaStkStrategy::from_env() {
        Ok(mpesa) => {
            if currency != Currency::KES {
                warn!(%currency, "M-Pesa charges KES; store currency differs");
            }
            strategies.register(Arc::new(mpesa) as BoxedPaymentStrategy);
        }
        Err(e) => warn!(error = %e, "Mobile-money payments disabled"),
    }

    strategies
}

/// Load seed products from config/products.toml, if present
async fn seed_products(stores: &Stores) -> anyhow::Result<()> {
    let config_paths = [
        "config/products.toml",
        "../config/products.toml",
        "../../config/products.toml",
    ];

    for path in config_paths {
        if let Ok(content) = std::fs::read_to_string(path) {
            let catalog = ProductCatalog::from_toml(&content)
                .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path, e))?;
            let count = catalog.products.len();
            for product in catalog.products {
                stores
                    .products
                    .insert_product(product)
                    .await
                    .map_err(|e| anyhow::anyhow!("Failed to seed products: {}", e))?;
            }
            info!("Seeded {} products from {}", count, path);
            return Ok(());
        }
    }

    info!("No seed product file found");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> AppConfig {
        AppConfig {
            host: "0.0.0.0".to_string(),
            port: 3000,
            base_url: "http://localhost:3000".to_string(),
            environment: "test".to_string(),
            database_url: None,
            database_max_connections: 1,
            jwt_secret: "test-secret-test-secret-test-secret".to_string(),
            currency: Currency::KES,
        }
    }

    #[test]
    fn test_socket_addr() {
        let addr = test_config().socket_addr().unwrap();
        assert_eq!(addr.to_string(), "0.0.0.0:3000");

        let bad = AppConfig {
            host: "not a host".to_string(),
            ..test_config()
        };
        assert!(matches!(bad.socket_addr(), Err(ShopError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_seed_catalog_parses() {
        let catalog = ProductCatalog::from_toml(
            r#"
            [[products]]
            id = "kikoy-01"
            name = "Kikoy Beach Wrap"
            price = "1500.00"
            "#,
        )
        .unwrap();
        assert_eq!(catalog.products.len(), 1);

        let stores = Stores::memory();
        for product in catalog.products {
            stores.products.insert_product(product).await.unwrap();
        }
        assert!(stores.products.get_product("kikoy-01").await.unwrap().is_some());
    }
}
