//! Snapshot publisher
//!
//! Holds the last computed leaderboard and hands it to readers as a whole.
//! A pass replaces the `Arc` in one write; readers clone the `Arc` under a
//! read lock and never see a half-built board.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::ranking::RankedTrader;

const LOADING_ERROR: &str = "Fetching trading data from blockchain...";
const LOADING_MESSAGE: &str =
    "Leaderboard is being initialized. This takes about 1-2 minutes on first load.";

#[derive(Debug, Clone, PartialEq)]
pub struct LeaderboardSnapshot {
    pub data: Vec<RankedTrader>,
    pub updated_at: DateTime<Utc>,
    /// Set when the latest pass failed; `data` is then from the last good pass
    pub error: Option<String>,
    /// Wallets in the trader book when `data` was computed
    pub tracked_wallets: usize,
}

// ============================================
// RESPONSE BODIES
// ============================================

#[derive(Debug, Clone, Serialize)]
pub struct ReadyView {
    pub success: bool,
    pub loading: bool,
    pub data: Vec<RankedTrader>,
    pub updated_at: String,
    pub count: usize,
    pub active_traders: usize,
    pub tracked_wallets: usize,
    pub tracking_start_time: i64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadingView {
    pub success: bool,
    pub loading: bool,
    pub data: Vec<RankedTrader>,
    pub error: String,
    pub updated_at: Option<String>,
    pub message: String,
    pub tracking_start_time: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum LeaderboardView {
    Ready(ReadyView),
    Loading(LoadingView),
}

// ============================================
// PUBLISHER
// ============================================

pub struct SnapshotPublisher {
    current: RwLock<Option<Arc<LeaderboardSnapshot>>>,
    tracking_start_time: i64,
}

impl SnapshotPublisher {
    pub fn new(tracking_start_time: i64) -> Self {
        Self {
            current: RwLock::new(None),
            tracking_start_time,
        }
    }

    /// Replace the board with a fresh result and clear any error
    pub async fn publish_success(
        &self,
        data: Vec<RankedTrader>,
        tracked_wallets: usize,
        at: DateTime<Utc>,
    ) {
        let snapshot = Arc::new(LeaderboardSnapshot {
            data,
            updated_at: at,
            error: None,
            tracked_wallets,
        });
        *self.current.write().await = Some(snapshot);
    }

    /// Keep the previous board but attach `error`. With no previous board
    /// an empty one is published so readers stop seeing "loading".
    pub async fn record_failure(&self, error: String, at: DateTime<Utc>) {
        let mut current = self.current.write().await;
        let (data, tracked_wallets) = current
            .as_ref()
            .map(|s| (s.data.clone(), s.tracked_wallets))
            .unwrap_or_default();

        *current = Some(Arc::new(LeaderboardSnapshot {
            data,
            updated_at: at,
            error: Some(error),
            tracked_wallets,
        }));
    }

    pub async fn snapshot(&self) -> Option<Arc<LeaderboardSnapshot>> {
        self.current.read().await.clone()
    }

    pub async fn view(&self) -> LeaderboardView {
        match self.snapshot().await {
            Some(snapshot) => LeaderboardView::Ready(ReadyView {
                success: true,
                loading: false,
                data: snapshot.data.clone(),
                updated_at: snapshot.updated_at.to_rfc3339(),
                count: snapshot.data.len(),
                active_traders: snapshot.data.len(),
                tracked_wallets: snapshot.tracked_wallets,
                tracking_start_time: self.tracking_start_time,
                error: snapshot.error.clone(),
            }),
            None => LeaderboardView::Loading(LoadingView {
                success: true,
                loading: true,
                data: Vec::new(),
                error: LOADING_ERROR.to_string(),
                updated_at: None,
                message: LOADING_MESSAGE.to_string(),
                tracking_start_time: self.tracking_start_time,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(address: &str, net: f64) -> RankedTrader {
        RankedTrader {
            address: address.to_string(),
            display_name: None,
            purchases: net,
            sales: 0.0,
            net_volume: net,
            net_volume_usd: net,
            current_balance: 20_000.0,
            last_transaction: None,
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[tokio::test]
    async fn test_loading_until_first_pass() {
        let publisher = SnapshotPublisher::new(1_700_000_000);
        let body = serde_json::to_value(publisher.view().await).unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["loading"], true);
        assert_eq!(body["data"].as_array().unwrap().len(), 0);
        assert_eq!(body["error"], LOADING_ERROR);
        assert!(body["updated_at"].is_null());
        assert_eq!(body["tracking_start_time"], 1_700_000_000);
    }

    #[tokio::test]
    async fn test_success_then_failure_keeps_data() {
        let publisher = SnapshotPublisher::new(0);
        publisher
            .publish_success(vec![row("0:a", 5.0), row("0:b", 3.0)], 7, at(100))
            .await;
        publisher.record_failure("feed down".to_string(), at(200)).await;

        let snapshot = publisher.snapshot().await.unwrap();
        assert_eq!(snapshot.data.len(), 2);
        assert_eq!(snapshot.error.as_deref(), Some("feed down"));
        assert_eq!(snapshot.updated_at, at(200));
        assert_eq!(snapshot.tracked_wallets, 7);

        let body = serde_json::to_value(publisher.view().await).unwrap();
        assert_eq!(body["loading"], false);
        assert_eq!(body["count"], 2);
        assert_eq!(body["tracked_wallets"], 7);
        assert_eq!(body["error"], "feed down");

        publisher.publish_success(vec![row("0:c", 1.0)], 8, at(300)).await;
        let snapshot = publisher.snapshot().await.unwrap();
        assert_eq!(snapshot.error, None);
        assert_eq!(snapshot.data[0].address, "0:c");
    }

    #[tokio::test]
    async fn test_first_pass_failure_publishes_empty_board() {
        let publisher = SnapshotPublisher::new(0);
        publisher.record_failure("boom".to_string(), at(50)).await;

        let body = serde_json::to_value(publisher.view().await).unwrap();
        assert_eq!(body["loading"], false);
        assert_eq!(body["count"], 0);
        assert_eq!(body["error"], "boom");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_readers_never_see_torn_snapshot() {
        let publisher = Arc::new(SnapshotPublisher::new(0));

        let writer = {
            let publisher = publisher.clone();
            tokio::spawn(async move {
                for generation in 1..=200i64 {
                    let size = (generation % 5 + 1) as usize;
                    let rows = (0..size)
                        .map(|i| row(&format!("0:{}", i), generation as f64))
                        .collect();
                    publisher.publish_success(rows, size, at(generation)).await;
                    tokio::task::yield_now().await;
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let publisher = publisher.clone();
                tokio::spawn(async move {
                    for _ in 0..500 {
                        if let Some(s) = publisher.snapshot().await {
                            let generation = s.updated_at.timestamp();
                            assert_eq!(s.data.len(), (generation % 5 + 1) as usize);
                            assert_eq!(s.tracked_wallets, s.data.len());
                            assert!(s.data.iter().all(|r| r.net_volume == generation as f64));
                        }
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        writer.await.unwrap();
        for reader in readers {
            reader.await.unwrap();
        }
    }
}
