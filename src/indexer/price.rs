//! DexScreener price feed
//!
//! Endpoint: https://api.dexscreener.com/latest/dex/tokens/{token}
//! The first pair's `priceUsd` is taken as the token price.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::fetcher::{FetchError, RateLimitedFetcher, RetryMode, RetryPolicy};
use crate::config::Config;

#[derive(Debug, Deserialize)]
struct DexScreenerTokens {
    #[serde(default)]
    pairs: Option<Vec<DexScreenerPair>>,
}

#[derive(Debug, Deserialize)]
struct DexScreenerPair {
    #[serde(rename = "priceUsd", default)]
    price_usd: Option<String>,
}

#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// Current token price in USD
    async fn price_usd(&self) -> Result<f64, FetchError>;
}

pub struct DexScreenerClient {
    url: String,
    fetcher: RateLimitedFetcher,
}

impl DexScreenerClient {
    pub fn new(config: &Config) -> eyre::Result<Self> {
        // Different upstream than TonAPI, so no pacing
        let fetcher = RateLimitedFetcher::new(
            Duration::from_secs(config.http_timeout_secs),
            Duration::ZERO,
            RetryPolicy {
                max_retries: config.max_retries,
                base_delay: Duration::from_millis(config.backoff_base_ms),
            },
            None,
        )?;

        Ok(Self {
            url: format!(
                "{}/{}",
                config.price_api_url.trim_end_matches('/'),
                config.token_address
            ),
            fetcher,
        })
    }
}

#[async_trait]
impl PriceOracle for DexScreenerClient {
    async fn price_usd(&self) -> Result<f64, FetchError> {
        let response: DexScreenerTokens = self
            .fetcher
            .get_json(&self.url, &[], RetryMode::OnThrottle)
            .await?;

        let price = response
            .pairs
            .unwrap_or_default()
            .first()
            .and_then(|p| p.price_usd.as_deref())
            .and_then(|p| p.parse::<f64>().ok())
            .filter(|p| p.is_finite() && *p >= 0.0);

        match price {
            Some(price) => Ok(price),
            None => {
                debug!("DexScreener returned no usable pair for {}", self.url);
                Ok(0.0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::fetcher::tests::spawn_server;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    async fn client_for(body: Value) -> DexScreenerClient {
        let router = Router::new().route(
            "/tokens/{token}",
            get(move || {
                let body = body.clone();
                async move { Json(body) }
            }),
        );
        let base = spawn_server(router).await;
        DexScreenerClient::new(&Config {
            price_api_url: format!("{}/tokens", base),
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_first_pair_price() {
        let client = client_for(json!({
            "pairs": [{ "priceUsd": "0.00123" }, { "priceUsd": "9.0" }]
        }))
        .await;
        assert_eq!(client.price_usd().await.unwrap(), 0.00123);
    }

    #[tokio::test]
    async fn test_missing_pairs_is_zero() {
        let client = client_for(json!({ "pairs": null })).await;
        assert_eq!(client.price_usd().await.unwrap(), 0.0);
    }
}
