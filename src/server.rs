//! HTTP API
//!
//! - `GET  /api/leaderboard`       published snapshot (always 200)
//! - `POST /api/wallet/connect`    bind a wallet to a Telegram user
//! - `POST /api/wallet/disconnect` remove that binding

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use eyre::{Result, WrapErr};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::bindings::{BindOutcome, UnbindOutcome};
use crate::engine::LeaderboardEngine;
use crate::publisher::LeaderboardView;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<LeaderboardEngine>,
}

#[derive(Debug, Deserialize)]
struct ConnectRequest {
    wallet_address: Option<String>,
    telegram_id: Option<i64>,
    display_name: Option<String>,
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DisconnectRequest {
    wallet_address: Option<String>,
    telegram_id: Option<i64>,
}

type ApiResponse = (StatusCode, Json<Value>);

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/leaderboard", get(leaderboard_handler))
        .route("/api/wallet/connect", post(connect_handler))
        .route("/api/wallet/disconnect", post(disconnect_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run(bind_addr: &str, state: AppState) -> Result<()> {
    let listener = TcpListener::bind(bind_addr)
        .await
        .wrap_err_with(|| format!("failed to bind {}", bind_addr))?;
    info!("🌐 HTTP API listening on {}", bind_addr);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn leaderboard_handler(State(state): State<AppState>) -> Json<LeaderboardView> {
    Json(state.engine.publisher().view().await)
}

fn missing_fields() -> ApiResponse {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "success": false, "error": "Missing required fields" })),
    )
}

/// Both fields present and non-empty / non-zero
fn required(address: Option<String>, telegram_id: Option<i64>) -> Option<(String, i64)> {
    let address = address.filter(|a| !a.trim().is_empty())?;
    let telegram_id = telegram_id.filter(|id| *id != 0)?;
    Some((address, telegram_id))
}

async fn connect_handler(
    State(state): State<AppState>,
    body: Result<Json<ConnectRequest>, JsonRejection>,
) -> ApiResponse {
    let req = match body {
        Ok(Json(req)) => req,
        Err(e) => {
            warn!("Rejected connect request: {}", e);
            return missing_fields();
        }
    };
    let Some((address, telegram_id)) = required(req.wallet_address, req.telegram_id) else {
        return missing_fields();
    };

    let outcome = state
        .engine
        .bindings()
        .bind(
            &address,
            telegram_id,
            req.display_name.as_deref().unwrap_or_default(),
            req.username.as_deref().unwrap_or_default(),
            Utc::now().timestamp(),
        )
        .await;

    match outcome {
        BindOutcome::Bound => (
            StatusCode::OK,
            Json(json!({ "success": true, "message": "Wallet connected successfully" })),
        ),
        BindOutcome::AlreadyBound { display_name } => (
            StatusCode::CONFLICT,
            Json(json!({
                "success": false,
                "error": "WALLET_ALREADY_CONNECTED",
                "message": format!(
                    "This wallet is already connected to {}. Please disconnect it first.",
                    display_name
                ),
            })),
        ),
    }
}

async fn disconnect_handler(
    State(state): State<AppState>,
    body: Result<Json<DisconnectRequest>, JsonRejection>,
) -> ApiResponse {
    let req = match body {
        Ok(Json(req)) => req,
        Err(e) => {
            warn!("Rejected disconnect request: {}", e);
            return missing_fields();
        }
    };
    let Some((address, telegram_id)) = required(req.wallet_address, req.telegram_id) else {
        return missing_fields();
    };

    match state.engine.bindings().unbind(&address, telegram_id).await {
        UnbindOutcome::Unbound => (
            StatusCode::OK,
            Json(json!({ "success": true, "message": "Wallet disconnected successfully" })),
        ),
        UnbindOutcome::Unauthorized => (
            StatusCode::FORBIDDEN,
            Json(json!({
                "success": false,
                "error": "UNAUTHORIZED",
                "message": "You cannot disconnect a wallet connected to another user",
            })),
        ),
        UnbindOutcome::NotBound => (
            StatusCode::NOT_FOUND,
            Json(json!({ "success": false, "error": "Wallet not connected" })),
        ),
    }
}
