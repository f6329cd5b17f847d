//! Background refresh loop
//!
//! One pass at a time: the next sleep starts only after the previous pass
//! has returned. Each pass runs on its own task so a panic inside it is
//! caught here and recorded like any other failed pass.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinError;
use tracing::{error, info};

use crate::engine::LeaderboardEngine;

/// Runs until the task is aborted.
pub async fn refresh_task(engine: Arc<LeaderboardEngine>, startup_delay: Duration, interval: Duration) {
    info!(
        "⏰ Starting leaderboard updater (first pass in {:?}, then every {:?})",
        startup_delay, interval
    );
    tokio::time::sleep(startup_delay).await;

    loop {
        run_pass(&engine).await;
        tokio::time::sleep(interval).await;
    }
}

pub async fn run_pass(engine: &Arc<LeaderboardEngine>) {
    info!("Leaderboard update starting");

    let task = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.refresh().await })
    };

    match task.await {
        Ok(report) => report.log(),
        Err(e) => {
            let reason = panic_reason(e);
            error!("Leaderboard update panicked: {}", reason);
            engine
                .publisher()
                .record_failure(format!("Error updating leaderboard: {}", reason), Utc::now())
                .await;
        }
    }
}

fn panic_reason(e: JoinError) -> String {
    if !e.is_panic() {
        return e.to_string();
    }
    let payload = e.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "pass panicked".to_string()
    }
}
