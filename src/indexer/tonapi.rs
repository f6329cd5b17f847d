//! TonAPI v2 client
//!
//! Two endpoints are used:
//! - `GET /accounts/{pool}/events?limit=&before_lt=` - newest-first event feed
//! - `GET /accounts/{owner}/jettons` - current jetton balances of a wallet
//!
//! Events are decoded loosely: actions stay as raw JSON and only the
//! `JettonSwap` ones are parsed, so one odd action never costs a whole page.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::fetcher::{FetchError, RateLimitedFetcher, RetryMode, RetryPolicy};
use crate::address::canonical_key;
use crate::config::Config;

// ============================================
// API RESPONSE TYPES
// ============================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventPage {
    #[serde(default)]
    pub events: Vec<AccountEvent>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountEvent {
    #[serde(default)]
    pub event_id: String,
    #[serde(default)]
    pub timestamp: i64,
    /// Logical time; strictly increasing along the account's history
    #[serde(default)]
    pub lt: u64,
    #[serde(default)]
    pub actions: Vec<Value>,
}

/// An account reference. TonAPI sends `{"address": ..}` objects, older
/// payloads sometimes carry the bare string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AccountRef {
    Account { address: String },
    Plain(String),
}

impl AccountRef {
    pub fn address(&self) -> &str {
        match self {
            AccountRef::Account { address } => address,
            AccountRef::Plain(address) => address,
        }
    }
}

/// The `JettonSwap` action body. Missing jetton sides mean native TON.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JettonSwap {
    #[serde(default)]
    pub amount_in: Option<String>,
    #[serde(default)]
    pub amount_out: Option<String>,
    #[serde(default)]
    pub user_wallet: Option<AccountRef>,
    #[serde(default)]
    pub jetton_master_in: Option<AccountRef>,
    #[serde(default)]
    pub jetton_master_out: Option<AccountRef>,
}

impl AccountEvent {
    /// Parsed `JettonSwap` actions; malformed ones are dropped
    pub fn jetton_swaps(&self) -> impl Iterator<Item = JettonSwap> + '_ {
        self.actions.iter().filter_map(move |action| {
            if action.get("type").and_then(Value::as_str) != Some("JettonSwap") {
                return None;
            }
            let body = action.get("JettonSwap")?;
            match serde_json::from_value::<JettonSwap>(body.clone()) {
                Ok(swap) => Some(swap),
                Err(e) => {
                    debug!("Skipping malformed swap in event {}: {}", self.event_id, e);
                    None
                }
            }
        })
    }
}

#[derive(Debug, Deserialize)]
struct JettonBalances {
    #[serde(default)]
    balances: Vec<JettonBalance>,
}

#[derive(Debug, Deserialize)]
struct JettonBalance {
    #[serde(default)]
    balance: String,
    jetton: JettonInfo,
}

#[derive(Debug, Deserialize)]
struct JettonInfo {
    #[serde(default)]
    address: String,
}

/// Base-unit integer string to token units. `None` for non-numeric input.
pub fn parse_amount(raw: &str, decimals: u32) -> Option<f64> {
    let units: u128 = raw.trim().parse().ok()?;
    Some(units as f64 / 10f64.powi(decimals as i32))
}

// ============================================
// INDEXER SEAM
// ============================================

#[async_trait]
pub trait IndexerApi: Send + Sync {
    /// One newest-first page of the account's events, strictly older than
    /// `before_lt` when given
    async fn account_events(
        &self,
        account: &str,
        limit: usize,
        before_lt: Option<u64>,
    ) -> Result<EventPage, FetchError>;

    /// Tracked-jetton balance of `owner`, in token units
    async fn jetton_balance(&self, owner: &str) -> Result<f64, FetchError>;
}

pub struct TonApiClient {
    base_url: String,
    feed: RateLimitedFetcher,
    lookups: RateLimitedFetcher,
    token_keys: Vec<String>,
    token_decimals: u32,
}

impl TonApiClient {
    pub fn new(config: &Config) -> eyre::Result<Self> {
        let retry = RetryPolicy {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.backoff_base_ms),
        };

        Ok(Self {
            base_url: config.indexer_base_url.trim_end_matches('/').to_string(),
            feed: RateLimitedFetcher::new(
                Duration::from_secs(config.feed_timeout_secs),
                config.request_delay(),
                retry,
                config.indexer_api_key.clone(),
            )?,
            lookups: RateLimitedFetcher::new(
                Duration::from_secs(config.http_timeout_secs),
                config.request_delay(),
                retry,
                config.indexer_api_key.clone(),
            )?,
            token_keys: config.token_keys(),
            token_decimals: config.token_decimals,
        })
    }
}

#[async_trait]
impl IndexerApi for TonApiClient {
    async fn account_events(
        &self,
        account: &str,
        limit: usize,
        before_lt: Option<u64>,
    ) -> Result<EventPage, FetchError> {
        let url = format!("{}/accounts/{}/events", self.base_url, account);

        let mut query = vec![("limit", limit.to_string())];
        if let Some(lt) = before_lt {
            query.push(("before_lt", lt.to_string()));
        }

        self.feed.get_json(&url, &query, RetryMode::OnThrottle).await
    }

    async fn jetton_balance(&self, owner: &str) -> Result<f64, FetchError> {
        let url = format!("{}/accounts/{}/jettons", self.base_url, owner);

        let response: JettonBalances = self
            .lookups
            .get_json(&url, &[], RetryMode::OnAnyError)
            .await?;

        let balance = response
            .balances
            .iter()
            .find(|b| self.token_keys.contains(&canonical_key(&b.jetton.address)))
            .and_then(|b| parse_amount(&b.balance, self.token_decimals))
            .unwrap_or(0.0);

        Ok(balance)
    }
}

// ============================================
// TESTS
// ============================================
