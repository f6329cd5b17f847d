//! Trader book
//!
//! Process-lifetime volumes per canonical address. Entries are created on
//! first sight and never removed; wallets that fall off the board are only
//! filtered out at ranking time.

use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TraderState {
    /// Tokens bought (swap output side)
    pub purchases: f64,
    /// Tokens sold (swap input side)
    pub sales: f64,
    /// Unix time of the newest folded swap
    pub last_activity: i64,
}

impl TraderState {
    pub fn net_volume(&self) -> f64 {
        self.purchases - self.sales
    }
}

#[derive(Debug, Default)]
pub struct TraderBook {
    traders: HashMap<String, TraderState>,
}

impl TraderBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one swap into `address`'s totals.
    ///
    /// Negative deltas are clamped to zero so both accumulators stay
    /// non-negative.
    pub fn apply(&mut self, address: &str, purchase: f64, sale: f64, event_time: i64) {
        let state = self.traders.entry(address.to_string()).or_default();
        state.purchases += purchase.max(0.0);
        state.sales += sale.max(0.0);
        state.last_activity = state.last_activity.max(event_time);
    }

    #[cfg(test)]
    pub fn get(&self, address: &str) -> Option<&TraderState> {
        self.traders.get(address)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TraderState)> {
        self.traders.iter()
    }

    pub fn len(&self) -> usize {
        self.traders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traders.is_empty()
    }
}
