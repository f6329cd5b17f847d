//! Service Configuration for the Jetton Leaderboard
//!
//! All constants the aggregation engine depends on live here. They are read
//! once at process start (environment / .env, or a TOML file) and never
//! reloaded.

use eyre::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::address::canonicalize;

// ============================================
// DEFAULTS
// ============================================

/// PEDRO jetton master (user-friendly form)
const DEFAULT_TOKEN_ADDRESS: &str = "EQBGtsm26tdn6bRjZrmLZkZMqk-K8wd4R66k52ntPU4UzcV0";

/// PEDRO jetton master (raw form)
const DEFAULT_TOKEN_ADDRESS_RAW: &str =
    "0:46b6c9b6ead767e9b46366b98b66464caa4f8af3077847aea4e769ed3d4e14cd";

/// PEDRO/TON pool whose event feed is walked
const DEFAULT_POOL_ADDRESS: &str = "EQCcpx76m_J9douvLirGqvmwiHLDYQ-JdJULNc9mUw2Ppk3p";

/// Zero address, reported as `user_wallet` on some router-internal swaps
const ZERO_ADDRESS: &str = "EQAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAM9c";

// ============================================
// MAIN CONFIGURATION
// ============================================

/// Main configuration struct
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // ========== Upstream APIs ==========
    /// TonAPI base URL
    pub indexer_base_url: String,

    /// Optional TonAPI bearer key (raises the upstream rate limit)
    pub indexer_api_key: Option<String>,

    /// DexScreener token endpoint (token address is appended)
    pub price_api_url: String,

    // ========== Token Identity ==========
    /// Jetton master, user-friendly encoding
    pub token_address: String,

    /// Jetton master, raw encoding
    pub token_address_raw: String,

    /// Jetton decimals (amounts on the wire are base units)
    pub token_decimals: u32,

    /// DEX pool account whose events are ingested
    pub pool_address: String,

    /// Addresses that are never counted as traders (pool/system accounts)
    pub excluded_addresses: Vec<String>,

    // ========== Scheduling ==========
    /// Seconds between pipeline passes
    pub poll_interval_secs: u64,

    /// Delay before the very first pass
    pub startup_delay_secs: u64,

    /// Only events at or after this unix time are processed.
    /// `None` means "process start".
    pub tracking_start_time: Option<i64>,

    // ========== Leaderboard Shape ==========
    /// Minimum holding (token units) to appear on the board
    pub min_balance: f64,

    /// Candidates whose balance is checked each pass
    pub top_candidates: usize,

    /// Maximum published entries
    pub leaderboard_size: usize,

    /// Events requested per feed page (upstream caps at 100)
    pub page_size: usize,

    // ========== Rate Limiting ==========
    /// Concurrent balance lookups
    pub balance_workers: usize,

    /// Pacing delay applied before every upstream request
    pub request_delay_ms: u64,

    /// Balance cache time-to-live
    pub balance_cache_ttl_secs: i64,

    /// Timeout for price / balance calls
    pub http_timeout_secs: u64,

    /// Timeout for feed page calls
    pub feed_timeout_secs: u64,

    /// Retries after the first attempt
    pub max_retries: u32,

    /// First backoff delay, doubled on every retry
    pub backoff_base_ms: u64,

    // ========== Serving ==========
    /// HTTP listen address
    pub bind_addr: String,

    /// Wallet binding JSON file
    pub bindings_path: String,
}

impl Config {
    /// Load configuration from environment variables and .env file
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        Ok(Self {
            // Upstream
            indexer_base_url: env::var("INDEXER_BASE_URL")
                .unwrap_or(defaults.indexer_base_url),
            indexer_api_key: env::var("TONAPI_KEY").ok().filter(|k| !k.is_empty()),
            price_api_url: env::var("PRICE_API_URL").unwrap_or(defaults.price_api_url),

            // Token
            token_address: env::var("TOKEN_ADDRESS").unwrap_or(defaults.token_address),
            token_address_raw: env::var("TOKEN_ADDRESS_RAW")
                .unwrap_or(defaults.token_address_raw),
            token_decimals: env_parse("TOKEN_DECIMALS", defaults.token_decimals),
            pool_address: env::var("POOL_ADDRESS").unwrap_or(defaults.pool_address),
            excluded_addresses: env::var("EXCLUDED_ADDRESSES")
                .map(|s| s.split(',').map(|a| a.trim().to_string()).collect())
                .unwrap_or(defaults.excluded_addresses),

            // Scheduling
            poll_interval_secs: env_parse("POLL_INTERVAL_SECS", defaults.poll_interval_secs),
            startup_delay_secs: env_parse("STARTUP_DELAY_SECS", defaults.startup_delay_secs),
            tracking_start_time: env::var("TRACKING_START_TIME")
                .ok()
                .and_then(|s| s.parse().ok()),

            // Leaderboard
            min_balance: env_parse("MIN_BALANCE", defaults.min_balance),
            top_candidates: env_parse("TOP_CANDIDATES", defaults.top_candidates),
            leaderboard_size: env_parse("LEADERBOARD_SIZE", defaults.leaderboard_size),
            page_size: env_parse("PAGE_SIZE", defaults.page_size),

            // Rate limiting
            balance_workers: env_parse("BALANCE_WORKERS", defaults.balance_workers),
            request_delay_ms: env_parse("REQUEST_DELAY_MS", defaults.request_delay_ms),
            balance_cache_ttl_secs: env_parse(
                "BALANCE_CACHE_TTL_SECS",
                defaults.balance_cache_ttl_secs,
            ),
            http_timeout_secs: env_parse("HTTP_TIMEOUT_SECS", defaults.http_timeout_secs),
            feed_timeout_secs: env_parse("FEED_TIMEOUT_SECS", defaults.feed_timeout_secs),
            max_retries: env_parse("MAX_RETRIES", defaults.max_retries),
            backoff_base_ms: env_parse("BACKOFF_BASE_MS", defaults.backoff_base_ms),

            // Serving
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| {
                format!("0.0.0.0:{}", env_parse::<u16>("PORT", 5000))
            }),
            bindings_path: env::var("BINDINGS_FILE").unwrap_or(defaults.bindings_path),
        })
    }

    /// Load configuration from a TOML file. Missing keys take defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Canonical keys of the tracked jetton (both encodings collapse to one)
    pub fn token_keys(&self) -> Vec<String> {
        let mut keys = vec![
            canonicalize(&self.token_address).key,
            canonicalize(&self.token_address_raw).key,
        ];
        keys.dedup();
        keys
    }

    /// Canonical keys that must never be ranked as traders
    pub fn excluded_keys(&self) -> Vec<String> {
        self.excluded_addresses
            .iter()
            .chain(std::iter::once(&self.pool_address))
            .map(|a| canonicalize(a).key)
            .collect()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.startup_delay_secs)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    /// Validate configuration before starting the engine
    pub fn validate(&self) -> Result<()> {
        if self.indexer_base_url.is_empty() {
            return Err(eyre::eyre!("INDEXER_BASE_URL must not be empty"));
        }

        let token_keys = self.token_keys();
        if token_keys.len() != 1 {
            return Err(eyre::eyre!(
                "TOKEN_ADDRESS and TOKEN_ADDRESS_RAW refer to different accounts ({} vs {})",
                token_keys[0],
                token_keys[token_keys.len() - 1]
            ));
        }
        if !canonicalize(&self.pool_address).is_canonical {
            return Err(eyre::eyre!(
                "POOL_ADDRESS is not a valid TON address: {}",
                self.pool_address
            ));
        }

        if self.page_size == 0 || self.page_size > 100 {
            return Err(eyre::eyre!(
                "PAGE_SIZE must be between 1 and 100 (currently {})",
                self.page_size
            ));
        }
        if self.balance_workers == 0 {
            return Err(eyre::eyre!("BALANCE_WORKERS must be at least 1"));
        }
        if self.leaderboard_size == 0 || self.leaderboard_size > self.top_candidates {
            return Err(eyre::eyre!(
                "LEADERBOARD_SIZE must be between 1 and TOP_CANDIDATES ({})",
                self.top_candidates
            ));
        }
        if self.min_balance < 0.0 {
            return Err(eyre::eyre!("MIN_BALANCE must not be negative"));
        }
        if self.poll_interval_secs == 0 {
            return Err(eyre::eyre!("POLL_INTERVAL_SECS must be at least 1"));
        }
        if self.balance_cache_ttl_secs < 0 {
            return Err(eyre::eyre!("BALANCE_CACHE_TTL_SECS must not be negative"));
        }

        Ok(())
    }

    /// Print configuration summary
    pub fn print_summary(&self, tracking_start_time: i64) {
        let since = chrono::DateTime::from_timestamp(tracking_start_time, 0)
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| tracking_start_time.to_string());

        println!("╔════════════════════════════════════════════════════════════╗");
        println!("║             JETTON LEADERBOARD - CONFIGURATION             ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ Token:             {:<40} ║", short(&self.token_address));
        println!("║ Pool:              {:<40} ║", short(&self.pool_address));
        println!("║ Tracking Since:    {:<40} ║", since);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ LEADERBOARD                                                ║");
        println!("║ • Min Balance:     {:<40.0} ║", self.min_balance);
        println!("║ • Candidates:      {:<40} ║", self.top_candidates);
        println!("║ • Size:            {:<40} ║", self.leaderboard_size);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ RATE LIMITING                                              ║");
        println!("║ • Poll Interval:   {:<40} ║", format!("{}s", self.poll_interval_secs));
        println!("║ • Workers:         {:<40} ║", self.balance_workers);
        println!("║ • Request Delay:   {:<40} ║", format!("{}ms", self.request_delay_ms));
        println!("║ • Balance TTL:     {:<40} ║", format!("{}s", self.balance_cache_ttl_secs));
        println!("║ • TonAPI Key:      {:<40} ║",
            if self.indexer_api_key.is_some() { "✓ Configured" } else { "✗ Anonymous" }
        );
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ Listen:            {:<40} ║", self.bind_addr);
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            indexer_base_url: "https://tonapi.io/v2".to_string(),
            indexer_api_key: None,
            price_api_url: "https://api.dexscreener.com/latest/dex/tokens".to_string(),
            token_address: DEFAULT_TOKEN_ADDRESS.to_string(),
            token_address_raw: DEFAULT_TOKEN_ADDRESS_RAW.to_string(),
            token_decimals: 9,
            pool_address: DEFAULT_POOL_ADDRESS.to_string(),
            excluded_addresses: vec![ZERO_ADDRESS.to_string()],
            poll_interval_secs: 60,
            startup_delay_secs: 2,
            tracking_start_time: None,
            min_balance: 10_000.0,
            top_candidates: 100,
            leaderboard_size: 50,
            page_size: 100,
            balance_workers: 2,
            request_delay_ms: 700,
            balance_cache_ttl_secs: 180,
            http_timeout_secs: 10,
            feed_timeout_secs: 15,
            max_retries: 3,
            backoff_base_ms: 1000,
            bind_addr: "0.0.0.0:5000".to_string(),
            bindings_path: "wallet_bindings.json".to_string(),
        }
    }
}

/// Parse an env var, keeping the default when unset or unparsable
fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

/// Fit an address into the 40-column summary box
fn short(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() > 40 {
        let head: String = chars[..20].iter().collect();
        let tail: String = chars[chars.len() - 12..].iter().collect();
        format!("{}...{}", head, tail)
    } else {
        address.to_string()
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.min_balance, 10_000.0);
        assert_eq!(config.leaderboard_size, 50);
        assert_eq!(config.top_candidates, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_token_encodings_agree() {
        let config = Config::default();
        assert_eq!(
            config.token_keys(),
            vec![DEFAULT_TOKEN_ADDRESS_RAW.to_string()]
        );
    }

    #[test]
    fn test_excluded_keys_include_pool() {
        let config = Config::default();
        let excluded = config.excluded_keys();
        assert!(excluded.contains(&canonicalize(DEFAULT_POOL_ADDRESS).key));
        assert!(excluded.contains(&canonicalize(ZERO_ADDRESS).key));
    }

    #[test]
    fn test_validate_rejects_mismatched_token() {
        let config = Config {
            token_address_raw: format!("0:{}", "11".repeat(32)),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_oversized_page() {
        let config = Config {
            page_size: 250,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip_with_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leaderboard.toml");
        fs::write(&path, "min_balance = 500.0\nbalance_workers = 4\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.min_balance, 500.0);
        assert_eq!(config.balance_workers, 4);
        assert_eq!(config.page_size, 100);

        config.save_to_file(&path).unwrap();
        let reloaded = Config::from_file(&path).unwrap();
        assert_eq!(reloaded.balance_workers, 4);
    }

    #[test]
    fn test_short_handles_multibyte_addresses() {
        // byte 20 falls inside a two-byte char
        let wide = format!("a{}", "й".repeat(45));
        let shown = short(&wide);
        assert_eq!(shown.chars().count(), 35);
        assert_eq!(shown, format!("a{}...{}", "й".repeat(19), "й".repeat(12)));

        assert_eq!(short("0:abc"), "0:abc");
        assert_eq!(short(&"a".repeat(41)), format!("{}...{}", "a".repeat(20), "a".repeat(12)));
    }
}
