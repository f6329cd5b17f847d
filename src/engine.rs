//! Leaderboard engine
//!
//! Owns every piece of mutable aggregation state (cursor, trader book,
//! balance cache) and runs one pipeline pass end to end:
//!
//! price → feed ingestion → ranking → balances → filtering → publish

use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::bindings::WalletBindingStore;
use crate::config::Config;
use crate::indexer::{IndexerApi, PriceOracle};
use crate::ledger::{
    BalanceLookupStats, BalanceOracle, EventCursor, FeedIngestor, IngestReport, StopReason, TraderBook,
};
use crate::publisher::SnapshotPublisher;
use crate::ranking::{RankedTrader, Ranker};

/// What one successful pass did
#[derive(Debug, Clone)]
pub struct PassReport {
    pub price_usd: f64,
    pub ingest: IngestReport,
    /// Watermark after ingestion
    pub cursor_lt: Option<u64>,
    pub tracked_wallets: usize,
    pub candidates: usize,
    pub balances: BalanceLookupStats,
    pub board_size: usize,
    pub elapsed: Duration,
}

impl PassReport {
    pub fn log(&self) {
        if let StopReason::Interrupted(e) = &self.ingest.stop {
            warn!("Feed walk was cut short, events behind the failed page are skipped: {}", e);
        }
        info!(
            "Pass done in {:.1}s: price ${}, {} new events / {} swaps over {} pages (stop {:?}, head lt {:?}, cursor lt {:?}), {} wallets tracked, {} candidates, balances {} cached / {} fetched ({} failed), {} on board",
            self.elapsed.as_secs_f64(),
            self.price_usd,
            self.ingest.events,
            self.ingest.fills,
            self.ingest.pages,
            self.ingest.stop,
            self.ingest.head_lt,
            self.cursor_lt,
            self.tracked_wallets,
            self.candidates,
            self.balances.hits,
            self.balances.fetched,
            self.balances.failed,
            self.board_size
        );
    }
}

pub struct LeaderboardEngine {
    ingestor: FeedIngestor,
    cursor: Mutex<EventCursor>,
    book: RwLock<TraderBook>,
    balances: BalanceOracle,
    price: Arc<dyn PriceOracle>,
    ranker: Ranker,
    bindings: Arc<WalletBindingStore>,
    publisher: Arc<SnapshotPublisher>,
}

impl LeaderboardEngine {
    pub fn new(
        config: &Config,
        indexer: Arc<dyn IndexerApi>,
        price: Arc<dyn PriceOracle>,
        bindings: Arc<WalletBindingStore>,
        tracking_start_time: i64,
    ) -> Self {
        Self {
            ingestor: FeedIngestor::from_config(indexer.clone(), config),
            cursor: Mutex::new(EventCursor::new(tracking_start_time)),
            book: RwLock::new(TraderBook::new()),
            balances: BalanceOracle::new(indexer, config.balance_cache_ttl_secs, config.balance_workers),
            price,
            ranker: Ranker::from_config(config),
            bindings,
            publisher: Arc::new(SnapshotPublisher::new(tracking_start_time)),
        }
    }

    pub fn publisher(&self) -> Arc<SnapshotPublisher> {
        self.publisher.clone()
    }

    pub fn bindings(&self) -> Arc<WalletBindingStore> {
        self.bindings.clone()
    }

    /// Run one pass without publishing.
    ///
    /// A failed price lookup degrades to a price of zero. A failed feed
    /// page ends ingestion early; the swaps read before it are ranked as usual.
    pub async fn compute(&self, now: i64) -> (Vec<RankedTrader>, PassReport) {
        let started = Instant::now();

        let price_usd = match self.price.price_usd().await {
            Ok(price) => price,
            Err(e) => {
                warn!("Price lookup failed, USD values will be zero: {}", e);
                0.0
            }
        };
        info!("Token price: ${}", price_usd);

        let (ingest, cursor_lt) = {
            let mut cursor = self.cursor.lock().await;
            let ingest = self.ingestor.run(&mut cursor, &self.book).await;
            (ingest, cursor.last_processed_lt())
        };

        let (candidates, tracked_wallets) = {
            let book = self.book.read().await;
            if book.is_empty() {
                debug!("No swaps tracked since the epoch yet");
            }
            (self.ranker.candidates(&book), book.len())
        };
        let addresses: Vec<String> = candidates.iter().map(|c| c.address.clone()).collect();

        let (balances, balance_stats) = self.balances.resolve(&addresses, now).await;
        let names = self.bindings.display_names_for(&addresses).await;

        let candidate_count = candidates.len();
        let board = self.ranker.finalize(candidates, &balances, &names, price_usd);

        let report = PassReport {
            price_usd,
            ingest,
            cursor_lt,
            tracked_wallets,
            candidates: candidate_count,
            balances: balance_stats,
            board_size: board.len(),
            elapsed: started.elapsed(),
        };

        (board, report)
    }

    /// Run one pass and publish its board
    pub async fn refresh(&self) -> PassReport {
        let (board, report) = self.compute(Utc::now().timestamp()).await;
        self.publisher
            .publish_success(board, report.tracked_wallets, Utc::now())
            .await;
        report
    }
}
