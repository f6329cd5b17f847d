//! Upstream data sources
//!
//! TonAPI event feed + balances and the DexScreener price, all behind the
//! rate-limited fetcher.

mod fetcher;
mod price;
mod tonapi;

pub use price::{DexScreenerClient, PriceOracle};
pub use tonapi::{parse_amount, AccountEvent, AccountRef, IndexerApi, JettonSwap, TonApiClient};

#[cfg(test)]
pub(crate) use fetcher::{tests::spawn_server, FetchError};
#[cfg(test)]
pub(crate) use tonapi::EventPage;
