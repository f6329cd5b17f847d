//! The Ledger: incremental aggregation state
//!
//! Responsible for:
//! - Tracking how far into the pool's event feed we've already read
//! - Folding new swaps into per-wallet purchase/sale totals
//! - Keeping a TTL cache of current jetton balances

mod aggregator;
mod balances;
mod cursor;
mod ingest;

pub use aggregator::{TraderBook, TraderState};
pub use balances::{BalanceLookupStats, BalanceOracle};
pub use cursor::EventCursor;
pub use ingest::{FeedIngestor, IngestReport, StopReason};

#[cfg(test)]
pub(crate) use ingest::tests as fixtures;
