//! Wallet bindings
//!
//! Maps a canonical wallet address to the Telegram user who connected it.
//! The whole map is persisted as pretty JSON after every change.

use eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::address::{canonical_key, short};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletBinding {
    pub telegram_id: i64,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub username: String,
    pub connected_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindOutcome {
    Bound,
    /// Bound to another Telegram user
    AlreadyBound { display_name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnbindOutcome {
    Unbound,
    NotBound,
    Unauthorized,
}

pub struct WalletBindingStore {
    path: PathBuf,
    bindings: RwLock<HashMap<String, WalletBinding>>,
}

impl WalletBindingStore {
    /// Open the store at `path`. A missing or unreadable file starts empty.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let bindings = match read_bindings(&path) {
            Ok(Some(bindings)) => {
                info!("Loaded {} wallet bindings from {}", bindings.len(), path.display());
                bindings
            }
            Ok(None) => {
                info!("No bindings file at {}, starting fresh", path.display());
                HashMap::new()
            }
            Err(e) => {
                warn!("Error loading wallet bindings: {:#}", e);
                HashMap::new()
            }
        };

        Self {
            path,
            bindings: RwLock::new(bindings),
        }
    }

    #[cfg(test)]
    pub async fn get(&self, address: &str) -> Option<WalletBinding> {
        self.bindings.read().await.get(&canonical_key(address)).cloned()
    }

    /// Connect `address` to `telegram_id`. Re-binding by the same user
    /// overwrites the display fields.
    pub async fn bind(
        &self,
        address: &str,
        telegram_id: i64,
        display_name: &str,
        username: &str,
        now: i64,
    ) -> BindOutcome {
        let key = canonical_key(address);
        let mut bindings = self.bindings.write().await;

        if let Some(existing) = bindings.get(&key) {
            if existing.telegram_id != telegram_id {
                let display_name = if existing.display_name.is_empty() {
                    "another user".to_string()
                } else {
                    existing.display_name.clone()
                };
                return BindOutcome::AlreadyBound { display_name };
            }
        }

        bindings.insert(
            key.clone(),
            WalletBinding {
                telegram_id,
                display_name: display_name.to_string(),
                username: username.to_string(),
                connected_at: now,
            },
        );
        self.persist(&bindings).await;

        info!(
            "Connected wallet {}... to user {} (ID: {})",
            short(&key),
            display_name,
            telegram_id
        );
        BindOutcome::Bound
    }

    pub async fn unbind(&self, address: &str, telegram_id: i64) -> UnbindOutcome {
        let key = canonical_key(address);
        let mut bindings = self.bindings.write().await;

        match bindings.get(&key) {
            None => UnbindOutcome::NotBound,
            Some(existing) if existing.telegram_id != telegram_id => UnbindOutcome::Unauthorized,
            Some(_) => {
                bindings.remove(&key);
                self.persist(&bindings).await;
                info!("Disconnected wallet {}... from user ID: {}", short(&key), telegram_id);
                UnbindOutcome::Unbound
            }
        }
    }

    /// Display names for whichever of `addresses` are bound
    pub async fn display_names_for(&self, addresses: &[String]) -> HashMap<String, String> {
        let bindings = self.bindings.read().await;
        addresses
            .iter()
            .filter_map(|a| {
                let key = canonical_key(a);
                bindings
                    .get(&key)
                    .map(|b| (a.clone(), b.display_name.clone()))
            })
            .collect()
    }

    // Called with the write guard held so file order matches memory order.
    async fn persist(&self, bindings: &HashMap<String, WalletBinding>) {
        match write_bindings(&self.path, bindings).await {
            Ok(()) => info!("Saved {} wallet bindings to {}", bindings.len(), self.path.display()),
            Err(e) => warn!("Error saving wallet bindings: {:#}", e),
        }
    }
}

fn read_bindings(path: &Path) -> Result<Option<HashMap<String, WalletBinding>>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read {}", path.display()))?;
    let bindings = serde_json::from_str(&content)
        .wrap_err_with(|| format!("failed to parse {}", path.display()))?;
    Ok(Some(bindings))
}

async fn write_bindings(path: &Path, bindings: &HashMap<String, WalletBinding>) -> Result<()> {
    let content = serde_json::to_string_pretty(bindings)?;
    tokio::fs::write(path, content)
        .await
        .wrap_err_with(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
