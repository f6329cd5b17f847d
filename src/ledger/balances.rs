//! Balance oracle
//!
//! TTL cache in front of the TonAPI jetton-balance lookup. Misses are
//! fetched by a small fixed pool of workers; each lookup goes through the
//! fetcher's pacing delay, so the pool size alone bounds the request rate.

use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::address::short;
use crate::indexer::IndexerApi;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BalanceCacheEntry {
    pub balance: f64,
    pub cached_at: i64,
}

impl BalanceCacheEntry {
    /// Fresh while strictly younger than `ttl_secs`
    pub fn is_fresh(&self, now: i64, ttl_secs: i64) -> bool {
        now - self.cached_at < ttl_secs
    }
}

/// Cache statistics for one `resolve` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BalanceLookupStats {
    pub hits: usize,
    pub fetched: usize,
    pub failed: usize,
}

pub struct BalanceOracle {
    indexer: Arc<dyn IndexerApi>,
    cache: RwLock<HashMap<String, BalanceCacheEntry>>,
    ttl_secs: i64,
    workers: usize,
}

impl BalanceOracle {
    pub fn new(indexer: Arc<dyn IndexerApi>, ttl_secs: i64, workers: usize) -> Self {
        Self {
            indexer,
            cache: RwLock::new(HashMap::new()),
            ttl_secs,
            workers: workers.max(1),
        }
    }

    /// Current balances for `addresses`, refreshing stale or missing entries.
    ///
    /// A lookup that still fails after the fetcher's retries counts as a
    /// zero balance and is cached like any other result, so one broken
    /// wallet is not re-queried every pass.
    pub async fn resolve(
        &self,
        addresses: &[String],
        now: i64,
    ) -> (HashMap<String, f64>, BalanceLookupStats) {
        let mut stats = BalanceLookupStats::default();

        let stale: Vec<String> = {
            let cache = self.cache.read().await;
            addresses
                .iter()
                .filter(|a| {
                    !cache
                        .get(a.as_str())
                        .is_some_and(|entry| entry.is_fresh(now, self.ttl_secs))
                })
                .cloned()
                .collect()
        };
        stats.hits = addresses.len() - stale.len();

        if !stale.is_empty() {
            info!(
                "Checking balances for {} wallets (cache hits: {})",
                stale.len(),
                stats.hits
            );
        }

        let fetched: Vec<(String, Option<f64>)> = stream::iter(stale)
            .map(|address| async move {
                let result = self.indexer.jetton_balance(&address).await;
                match result {
                    Ok(balance) => (address, Some(balance)),
                    Err(e) => {
                        warn!("Error fetching balance for {}...: {}", short(&address), e);
                        (address, None)
                    }
                }
            })
            .buffer_unordered(self.workers)
            .collect()
            .await;

        let mut cache = self.cache.write().await;
        for (address, balance) in fetched {
            stats.fetched += 1;
            if balance.is_none() {
                stats.failed += 1;
            }
            cache.insert(
                address,
                BalanceCacheEntry {
                    balance: balance.unwrap_or(0.0),
                    cached_at: now,
                },
            );
        }

        let balances = addresses
            .iter()
            .map(|a| {
                let balance = cache.get(a).map(|e| e.balance).unwrap_or(0.0);
                (a.clone(), balance)
            })
            .collect();

        debug!(
            "Balance lookup: {} hits, {} fetched, {} failed",
            stats.hits, stats.fetched, stats.failed
        );

        (balances, stats)
    }
}
