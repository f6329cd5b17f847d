//! Feed ingestion
//!
//! Walks the pool's event feed newest-first until it reaches something it
//! has already seen, then folds the new swaps into the trader book.
//!
//! Stop conditions, checked per page / per event:
//! 1. empty page
//! 2. short page (processed, then stop)
//! 3. event older than the tracking epoch (not consumed)
//! 4. event at or below the cursor (not consumed)
//!
//! A page that fails to download ends the walk too; swaps from the pages
//! already read are kept and the pass carries on with them.
//!
//! After the walk the cursor jumps to the newest `lt` of the *first* page,
//! including when a later page failed. Events behind a failed page are not
//! retried on the next pass.

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, trace, warn};

use super::aggregator::TraderBook;
use super::cursor::{Admission, EventCursor};
use crate::address::{canonical_key, short};
use crate::config::Config;
use crate::indexer::{parse_amount, AccountEvent, AccountRef, IndexerApi, JettonSwap};

// ============================================
// SWAP CLASSIFICATION
// ============================================

/// One swap's contribution to a trader's totals
#[derive(Debug, Clone, PartialEq)]
pub struct SwapFill {
    pub trader: String,
    pub purchase: f64,
    pub sale: f64,
    pub timestamp: i64,
}

/// Decides whether a swap touches the tracked jetton and on which side
#[derive(Debug, Clone)]
pub struct SwapClassifier {
    token_keys: Vec<String>,
    excluded: Vec<String>,
    decimals: u32,
}

impl SwapClassifier {
    pub fn new(token_keys: Vec<String>, excluded: Vec<String>, decimals: u32) -> Self {
        Self {
            token_keys,
            excluded,
            decimals,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.token_keys(), config.excluded_keys(), config.token_decimals)
    }

    fn is_token(&self, side: Option<&AccountRef>) -> bool {
        side.map(|s| self.token_keys.contains(&canonical_key(s.address())))
            .unwrap_or(false)
    }

    /// Jetton out of the pool = purchase, jetton into the pool = sale.
    /// Returns `None` when the swap is irrelevant or carries no usable amount.
    pub fn classify(&self, swap: &JettonSwap, timestamp: i64) -> Option<SwapFill> {
        let trader = swap.user_wallet.as_ref().map(|w| w.address())?;
        if trader.is_empty() {
            return None;
        }
        let trader = canonical_key(trader);
        if self.excluded.contains(&trader) {
            return None;
        }

        let token_in = self.is_token(swap.jetton_master_in.as_ref());
        let token_out = self.is_token(swap.jetton_master_out.as_ref());
        if !token_in && !token_out {
            return None;
        }

        let amount = |raw: &Option<String>| {
            raw.as_deref()
                .and_then(|r| parse_amount(r, self.decimals))
                .filter(|a| *a > 0.0)
        };

        let purchase = if token_out { amount(&swap.amount_out) } else { None };
        let sale = if token_in { amount(&swap.amount_in) } else { None };
        if purchase.is_none() && sale.is_none() {
            return None;
        }

        Some(SwapFill {
            trader,
            purchase: purchase.unwrap_or(0.0),
            sale: sale.unwrap_or(0.0),
            timestamp,
        })
    }

    pub fn fills<'a>(&'a self, event: &'a AccountEvent) -> impl Iterator<Item = SwapFill> + 'a {
        event
            .jetton_swaps()
            .filter_map(move |swap| self.classify(&swap, event.timestamp))
    }
}

// ============================================
// INGESTOR
// ============================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    EmptyPage,
    LastPage,
    ReachedEpoch,
    ReachedCursor,
    /// A page request failed; holds the error text
    Interrupted(String),
}

#[derive(Debug, Clone)]
pub struct IngestReport {
    pub pages: usize,
    pub events: usize,
    pub fills: usize,
    /// Newest `lt` seen on the first page, if any
    pub head_lt: Option<u64>,
    pub stop: StopReason,
}

pub struct FeedIngestor {
    indexer: Arc<dyn IndexerApi>,
    pool: String,
    page_size: usize,
    classifier: SwapClassifier,
}

impl FeedIngestor {
    pub fn new(
        indexer: Arc<dyn IndexerApi>,
        pool: String,
        page_size: usize,
        classifier: SwapClassifier,
    ) -> Self {
        Self {
            indexer,
            pool,
            page_size,
            classifier,
        }
    }

    pub fn from_config(indexer: Arc<dyn IndexerApi>, config: &Config) -> Self {
        Self::new(
            indexer,
            config.pool_address.clone(),
            config.page_size,
            SwapClassifier::from_config(config),
        )
    }

    /// Pull everything newer than `cursor` and fold it into `book`.
    ///
    /// The book's write lock is taken once per page, after the page has
    /// been downloaded, so readers are never held up by network I/O.
    pub async fn run(&self, cursor: &mut EventCursor, book: &RwLock<TraderBook>) -> IngestReport {
        let mut pages = 0;
        let mut events = 0;
        let mut fills = 0;
        let mut head_lt = None;
        let mut before_lt = None;

        let stop = loop {
            let page = match self
                .indexer
                .account_events(&self.pool, self.page_size, before_lt)
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    warn!(
                        "Event feed for {} failed on page {}, keeping {} swaps already read: {}",
                        short(&self.pool),
                        pages + 1,
                        fills,
                        e
                    );
                    break StopReason::Interrupted(e.to_string());
                }
            };
            pages += 1;

            let Some(last) = page.events.last() else {
                break StopReason::EmptyPage;
            };
            let next_before = last.lt;

            if head_lt.is_none() {
                head_lt = page.events.iter().map(|e| e.lt).max();
            }

            let mut page_fills = Vec::new();
            let mut stop = None;
            for event in &page.events {
                match cursor.admit(event) {
                    Admission::Admit => {}
                    Admission::BeforeEpoch => {
                        stop = Some(StopReason::ReachedEpoch);
                        break;
                    }
                    Admission::AlreadySeen => {
                        stop = Some(StopReason::ReachedCursor);
                        break;
                    }
                }
                events += 1;
                page_fills.extend(self.classifier.fills(event));
            }

            if !page_fills.is_empty() {
                let mut book = book.write().await;
                for fill in &page_fills {
                    trace!(
                        "Swap by {}...: +{:.2} / -{:.2}",
                        short(&fill.trader),
                        fill.purchase,
                        fill.sale
                    );
                    book.apply(&fill.trader, fill.purchase, fill.sale, fill.timestamp);
                }
                fills += page_fills.len();
            }

            if let Some(reason) = stop {
                break reason;
            }
            if page.events.len() < self.page_size {
                break StopReason::LastPage;
            }
            before_lt = Some(next_before);
        };

        if let Some(lt) = head_lt {
            if cursor.advance(lt) {
                debug!("Cursor advanced to lt {}", lt);
            }
        }

        info!(
            "Ingested {} new events ({} swaps) over {} pages, stop: {:?}",
            events, fills, pages, stop
        );

        IngestReport {
            pages,
            events,
            fills,
            head_lt,
            stop,
        }
    }
}

// ============================================
// TESTS
// ============================================
