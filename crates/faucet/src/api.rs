//! HTTP API for faucet service

use crate::clock::Clock;
use crate::database::DistributionRecord;
use crate::error::{FaucetError, FaucetResult};
use crate::metrics::FaucetMetrics;
use crate::service::{AccountView, FaucetService, FaucetStatus};
use crate::throttle::RequestThrottle;
use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use spout_common::types::Address;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<FaucetService>,
    pub clock: Arc<dyn Clock>,
    pub metrics: Option<Arc<FaucetMetrics>>,
    pub throttle: Arc<RequestThrottle>,
}

/// Claim request
#[derive(Debug, Deserialize)]
pub struct ClaimRequest {
    pub address: String,
}

/// Receipt for a successful claim
#[derive(Debug, Serialize, Deserialize)]
pub struct ClaimResponse {
    pub account: Address,
    pub amount: u128,
    pub timestamp: i64,
    pub remaining_allowance: u128,
}

/// Pause request. The caller is authenticated upstream.
#[derive(Debug, Deserialize)]
pub struct PauseRequest {
    pub caller: String,
    pub paused: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PauseResponse {
    pub paused: bool,
}

/// Immutable faucet parameters
#[derive(Debug, Serialize, Deserialize)]
pub struct FaucetInfo {
    pub admin: Address,
    pub reserve: Address,
    pub max_supply: u128,
    pub claim_amount: u128,
    pub cooldown_secs: u64,
    pub lifetime_claim_limit: u32,
    pub lifetime_amount_cap: u128,
}

/// Query for the recent distribution list
#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    pub limit: Option<usize>,
}

const DEFAULT_RECENT_LIMIT: usize = 20;
const MAX_RECENT_LIMIT: usize = 100;

/// Success response
#[derive(Debug, Serialize)]
pub struct SuccessResponse<T> {
    pub data: T,
    pub timestamp: String,
}

impl<T> SuccessResponse<T> {
    fn new(data: T) -> Json<Self> {
        Json(Self {
            data,
            timestamp: chrono::Utc::now().to_rfc3339(),
        })
    }
}

/// Routes for every faucet operation. The server must provide `ConnectInfo<SocketAddr>`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/api/info", get(info_handler))
        .route("/api/status", get(status_handler))
        .route("/api/claim", post(claim_handler))
        .route("/api/accounts/:address", get(account_handler))
        .route("/api/accounts/:address/history", get(history_handler))
        .route("/api/distributions", get(recent_handler))
        .route("/api/admin/pause", post(pause_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn parse_address(raw: &str) -> FaucetResult<Address> {
    raw.trim()
        .parse()
        .map_err(|e| FaucetError::InvalidAddress(format!("{}: {}", raw, e)))
}

/// Claim handler
pub async fn claim_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(request): Json<ClaimRequest>,
) -> Response {
    info!("Claim request from {}: address={}", addr, request.address);

    match claim(&state, &addr, &request).await {
        Ok(receipt) => {
            info!(
                "Dispensed {} to {} at {}",
                receipt.amount, receipt.account, receipt.timestamp
            );
            SuccessResponse::new(receipt).into_response()
        }
        Err(e) => {
            if let Some(metrics) = &state.metrics {
                metrics.record_rejection(&e);
            }
            match &e {
                FaucetError::DatabaseError(_) | FaucetError::InternalError(_) => {
                    error!("Claim error: {:?}", e)
                }
                _ => warn!("Claim rejected for {}: {}", request.address, e),
            }
            e.into_response()
        }
    }
}

async fn claim(state: &AppState, addr: &SocketAddr, request: &ClaimRequest) -> FaucetResult<ClaimResponse> {
    state.throttle.check(addr.ip()).await?;
    let account = parse_address(&request.address)?;

    let receipt = state.service.dispense(account, state.clock.now()).await?;
    if let Some(metrics) = &state.metrics {
        metrics.record_claim(receipt.reserve_balance);
    }

    Ok(ClaimResponse {
        account: receipt.claimed.account,
        amount: receipt.claimed.amount,
        timestamp: receipt.claimed.timestamp,
        remaining_allowance: receipt.remaining_allowance,
    })
}

/// Account handler
pub async fn account_handler(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> FaucetResult<Json<SuccessResponse<AccountView>>> {
    let account = parse_address(&address)?;
    let view = state.service.account_view(&account, state.clock.now()).await;
    Ok(SuccessResponse::new(view))
}

/// Distribution history handler
pub async fn history_handler(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> FaucetResult<Json<SuccessResponse<Vec<DistributionRecord>>>> {
    let account = parse_address(&address)?;
    Ok(SuccessResponse::new(state.service.history(&account)?))
}

/// Recent distributions across all accounts
pub async fn recent_handler(
    State(state): State<AppState>,
    Query(query): Query<RecentQuery>,
) -> FaucetResult<Json<SuccessResponse<Vec<DistributionRecord>>>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_RECENT_LIMIT)
        .min(MAX_RECENT_LIMIT);
    Ok(SuccessResponse::new(state.service.recent_distributions(limit)?))
}

/// Admin pause handler
pub async fn pause_handler(
    State(state): State<AppState>,
    Json(request): Json<PauseRequest>,
) -> FaucetResult<Json<SuccessResponse<PauseResponse>>> {
    let caller = parse_address(&request.caller)?;

    if let Err(e) = state.service.set_paused(&caller, request.paused).await {
        warn!("Pause change by {} refused: {}", caller, e);
        return Err(e);
    }

    if let Some(metrics) = &state.metrics {
        metrics.set_paused(request.paused);
    }
    info!("Faucet paused={} by {}", request.paused, caller);

    Ok(SuccessResponse::new(PauseResponse {
        paused: request.paused,
    }))
}

/// Status handler
pub async fn status_handler(
    State(state): State<AppState>,
) -> FaucetResult<Json<SuccessResponse<FaucetStatus>>> {
    let status = state.service.status().await?;
    Ok(SuccessResponse::new(status))
}

/// Info handler
pub async fn info_handler(State(state): State<AppState>) -> Json<SuccessResponse<FaucetInfo>> {
    let params = state.service.params();
    SuccessResponse::new(FaucetInfo {
        admin: state.service.admin().await,
        reserve: state.service.reserve().await,
        max_supply: params.max_supply,
        claim_amount: params.claim_amount,
        cooldown_secs: params.cooldown_secs,
        lifetime_claim_limit: params.lifetime_claim_limit,
        lifetime_amount_cap: params.lifetime_amount_cap(),
    })
}

/// Prometheus metrics handler
pub async fn metrics_handler(State(state): State<AppState>) -> Response {
    let Some(metrics) = &state.metrics else {
        return (StatusCode::NOT_FOUND, "metrics disabled").into_response();
    };

    match metrics.gather() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            FaucetError::InternalError(e.to_string()).into_response()
        }
    }
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Root handler with info
pub async fn root_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": "Spout Faucet",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Token faucet with per-account cooldown and lifetime limits",
        "endpoints": {
            "POST /api/claim": "Request tokens",
            "GET /api/accounts/:address": "Balance, allowance and eligibility",
            "GET /api/accounts/:address/history": "Distribution history",
            "GET /api/distributions?limit=N": "Most recent distributions",
            "POST /api/admin/pause": "Pause or resume claims (admin only)",
            "GET /api/info": "Faucet parameters",
            "GET /api/status": "Get faucet status",
            "GET /health": "Health check",
            "GET /metrics": "Prometheus metrics"
        }
    }))
}
