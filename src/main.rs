//! Jetton Leaderboard - incremental trader ranking for a TON jetton
//!
//! Run with: cargo run -- [--config leaderboard.toml] [--port 5000]
//!
//! A background task walks the pool's event feed once per interval, folds
//! new swaps into per-wallet totals and republishes the board. The HTTP
//! API only ever reads the last published snapshot.

use chrono::Utc;
use clap::Parser;
use color_eyre::eyre::Result;
use console::style;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod address;
mod bindings;
mod config;
mod engine;
mod indexer;
mod ledger;
mod publisher;
mod ranking;
mod scheduler;
mod server;

use bindings::WalletBindingStore;
use config::Config;
use engine::LeaderboardEngine;
use indexer::{DexScreenerClient, TonApiClient};
use server::AppState;

#[derive(Parser, Debug)]
#[command(name = "jetton-leaderboard", about = "Incremental trader leaderboard for a TON jetton")]
struct Args {
    /// TOML config file (defaults to environment / .env)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen port, overrides the configured bind address
    #[arg(short, long)]
    port: Option<u16>,

    /// Write the effective configuration to this TOML file and exit
    #[arg(long)]
    dump_config: Option<PathBuf>,
}

fn print_banner() {
    println!();
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!(
        "{}",
        style(" 🏆 JETTON LEADERBOARD - Incremental Trader Ranking").cyan().bold()
    );
    println!(
        "{}",
        style("    TonAPI feed | Balance cache | Live snapshot API").cyan()
    );
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!();
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("jetton_leaderboard=info".parse()?),
        )
        .init();

    let args = Args::parse();

    print_banner();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    if let Some(port) = args.port {
        config.bind_addr = format!("0.0.0.0:{}", port);
    }

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        error!("Please check your .env file or --config");
        return Err(e);
    }

    if let Some(path) = &args.dump_config {
        config.save_to_file(path)?;
        println!("{} Configuration written to {}", style("✓").green(), path.display());
        return Ok(());
    }

    let tracking_start_time = config
        .tracking_start_time
        .unwrap_or_else(|| Utc::now().timestamp());

    config.print_summary(tracking_start_time);
    println!();

    // Upstream clients
    let indexer = Arc::new(TonApiClient::new(&config)?);
    let price = Arc::new(DexScreenerClient::new(&config)?);
    let bindings = Arc::new(WalletBindingStore::load(&config.bindings_path));

    let engine = Arc::new(LeaderboardEngine::new(
        &config,
        indexer,
        price,
        bindings,
        tracking_start_time,
    ));

    // Background updater, non-blocking
    tokio::spawn(scheduler::refresh_task(
        engine.clone(),
        config.startup_delay(),
        config.poll_interval(),
    ));
    info!("Leaderboard updater started in background");

    server::run(&config.bind_addr, AppState { engine }).await
}
