//! Ranking & Filtering
//!
//! Step 1: rank every wallet with positive net volume
//! Step 2: cut to the top candidates (caps balance lookups per pass)
//! Step 3: after balances are known, drop wallets below the holding
//!         threshold, attach display names, cut to the board size

use chrono::DateTime;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::info;

use crate::config::Config;
use crate::ledger::{TraderBook, TraderState};

/// One published leaderboard row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedTrader {
    pub address: String,
    /// Bound display name, if the wallet is connected to a user
    pub display_name: Option<String>,
    pub purchases: f64,
    pub sales: f64,
    pub net_volume: f64,
    pub net_volume_usd: f64,
    pub current_balance: f64,
    /// RFC 3339, UTC
    pub last_transaction: Option<String>,
}

/// A wallet that passed the net-volume cut
#[derive(Debug, Clone)]
pub struct Candidate {
    pub address: String,
    pub state: TraderState,
}

impl Candidate {
    pub fn net_volume(&self) -> f64 {
        self.state.net_volume()
    }
}

pub struct Ranker {
    min_balance: f64,
    top_candidates: usize,
    leaderboard_size: usize,
}

impl Ranker {
    pub fn new(min_balance: f64, top_candidates: usize, leaderboard_size: usize) -> Self {
        Self {
            min_balance,
            top_candidates,
            leaderboard_size,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.min_balance, config.top_candidates, config.leaderboard_size)
    }

    /// Positive-net wallets, best first, capped at `top_candidates`.
    /// Equal net volumes are ordered by address so repeated passes agree.
    pub fn candidates(&self, book: &TraderBook) -> Vec<Candidate> {
        let mut ranked: Vec<Candidate> = book
            .iter()
            .filter(|(_, state)| state.net_volume() > 0.0)
            .map(|(address, state)| Candidate {
                address: address.clone(),
                state: state.clone(),
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.net_volume()
                .partial_cmp(&a.net_volume())
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.address.cmp(&b.address))
        });

        info!("Ranked {} wallets by net volume", ranked.len());

        ranked.truncate(self.top_candidates);
        ranked
    }

    /// Apply the holding threshold and build the published rows.
    ///
    /// `balances` must hold an entry for every candidate; a missing one is
    /// read as zero.
    pub fn finalize(
        &self,
        candidates: Vec<Candidate>,
        balances: &HashMap<String, f64>,
        display_names: &HashMap<String, String>,
        price_usd: f64,
    ) -> Vec<RankedTrader> {
        let qualified: Vec<RankedTrader> = candidates
            .into_iter()
            .filter_map(|candidate| {
                let balance = balances.get(&candidate.address).copied().unwrap_or(0.0);
                if balance < self.min_balance {
                    return None;
                }

                let net_volume = candidate.net_volume();
                let last_transaction = (candidate.state.last_activity > 0)
                    .then(|| DateTime::from_timestamp(candidate.state.last_activity, 0))
                    .flatten()
                    .map(|t| t.to_rfc3339());

                Some(RankedTrader {
                    display_name: display_names.get(&candidate.address).cloned(),
                    address: candidate.address,
                    purchases: candidate.state.purchases,
                    sales: candidate.state.sales,
                    net_volume,
                    net_volume_usd: net_volume * price_usd,
                    current_balance: balance,
                    last_transaction,
                })
            })
            .collect();

        let total = qualified.len();
        let board: Vec<RankedTrader> = qualified.into_iter().take(self.leaderboard_size).collect();

        info!(
            "Leaderboard: top {} traders (from {} with ≥{} tokens)",
            board.len(),
            total,
            self.min_balance
        );

        board
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(entries: &[(&str, f64, f64)]) -> TraderBook {
        let mut book = TraderBook::new();
        for (addr, purchases, sales) in entries {
            book.apply(addr, *purchases, *sales, 1_700_000_000);
        }
        book
    }

    fn all_balances(book: &TraderBook, balance: f64) -> HashMap<String, f64> {
        book.iter().map(|(a, _)| (a.clone(), balance)).collect()
    }

    #[test]
    fn test_drops_non_positive_net() {
        let book = book(&[("0:a", 100.0, 0.0), ("0:b", 50.0, 50.0), ("0:c", 0.0, 10.0)]);
        let ranker = Ranker::new(10.0, 100, 50);

        let candidates = ranker.candidates(&book);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].address, "0:a");
    }

    #[test]
    fn test_ties_are_stable() {
        let book = book(&[("0:c", 50.0, 0.0), ("0:b", 100.0, 0.0), ("0:a", 100.0, 0.0)]);
        let ranker = Ranker::new(10.0, 100, 50);
        let balances = all_balances(&book, 1_000.0);

        let first: Vec<_> = ranker
            .finalize(ranker.candidates(&book), &balances, &HashMap::new(), 1.0)
            .into_iter()
            .map(|t| t.address)
            .collect();
        assert_eq!(first, vec!["0:a", "0:b", "0:c"]);

        for _ in 0..5 {
            let again: Vec<_> = ranker
                .finalize(ranker.candidates(&book), &balances, &HashMap::new(), 1.0)
                .into_iter()
                .map(|t| t.address)
                .collect();
            assert_eq!(again, first);
        }
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let book = book(&[("0:a", 100.0, 0.0), ("0:b", 90.0, 0.0)]);
        let ranker = Ranker::new(10_000.0, 100, 50);
        let balances = HashMap::from([
            ("0:a".to_string(), 10_000.0),
            ("0:b".to_string(), 9_999.0),
        ]);

        let board = ranker.finalize(ranker.candidates(&book), &balances, &HashMap::new(), 1.0);
        assert_eq!(board.len(), 1);
        assert_eq!(board[0].address, "0:a");
    }

    #[test]
    fn test_candidate_and_board_caps() {
        let entries: Vec<(String, f64, f64)> = (0..150)
            .map(|i| (format!("0:{:03}", i), 1_000.0 + i as f64, 0.0))
            .collect();
        let mut book = TraderBook::new();
        for (a, p, s) in &entries {
            book.apply(a, *p, *s, 1);
        }
        let ranker = Ranker::new(10.0, 100, 50);

        let candidates = ranker.candidates(&book);
        assert_eq!(candidates.len(), 100);
        assert_eq!(candidates[0].address, "0:149");
        assert_eq!(candidates[99].address, "0:050");

        let board = ranker.finalize(candidates, &all_balances(&book, 20.0), &HashMap::new(), 0.5);
        assert_eq!(board.len(), 50);
        assert_eq!(board[49].address, "0:100");
        assert_eq!(board[0].net_volume_usd, 1_149.0 * 0.5);
    }

    #[test]
    fn test_display_name_and_zero_price() {
        let book = book(&[("0:a", 100.0, 20.0), ("0:b", 60.0, 0.0)]);
        let ranker = Ranker::new(1.0, 100, 50);
        let names = HashMap::from([("0:b".to_string(), "alice".to_string())]);

        let board = ranker.finalize(ranker.candidates(&book), &all_balances(&book, 5.0), &names, 0.0);

        assert_eq!(board[0].address, "0:a");
        assert_eq!(board[0].display_name, None);
        assert_eq!(board[0].net_volume, 80.0);
        assert_eq!(board[0].net_volume_usd, 0.0);
        assert_eq!(board[1].display_name.as_deref(), Some("alice"));
        assert!(board[1].last_transaction.as_deref().unwrap().starts_with("2023-11-14T22:13:20"));
    }
}
