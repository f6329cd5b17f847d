//! Ranking: turns trader totals + balances into the published board

mod filter;

pub use filter::{RankedTrader, Ranker};
