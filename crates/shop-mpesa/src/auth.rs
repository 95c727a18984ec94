//! # Daraja OAuth
//!
//! Client-credentials exchange. Tokens are not cached: every STK push
//! authenticates again.

use crate::config::MpesaConfig;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use shop_core::{ShopError, ShopResult};
use tracing::{debug, error};

/// `Basic base64(key:secret)`
pub fn basic_auth_header(consumer_key: &str, consumer_secret: &str) -> String {
    format!(
        "Basic {}",
        STANDARD.encode(format!("{}:{}", consumer_key, consumer_secret))
    )
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<String>,
}

/// GET /oauth/v1/generate?grant_type=client_credentials
pub async fn fetch_access_token(client: &Client, config: &MpesaConfig) -> ShopResult<String> {
    let url = format!("{}/oauth/v1/generate", config.api_base_url);

    let response = client
        .get(&url)
        .query(&[("grant_type", "client_credentials")])
        .header(
            "Authorization",
            basic_auth_header(&config.consumer_key, &config.consumer_secret),
        )
        .send()
        .await
        .map_err(|e| ShopError::NetworkError(e.to_string()))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ShopError::NetworkError(e.to_string()))?;

    if !status.is_success() {
        error!("Daraja token error: status={}, body={}", status, body);
        return Err(ShopError::ProviderError {
            provider: "mpesa".to_string(),
            message: format!("Token request failed with HTTP {}", status),
        });
    }

    let token: TokenResponse = serde_json::from_str(&body)
        .map_err(|e| ShopError::Serialization(format!("Failed to parse Daraja token: {}", e)))?;
    debug!(expires_in = ?token.expires_in, "Obtained Daraja access token");

    Ok(token.access_token)
}
