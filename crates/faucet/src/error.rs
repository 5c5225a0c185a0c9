//! Error types for the faucet service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use spout_common::types::Address;
use thiserror::Error;

/// Faucet service errors
#[derive(Error, Debug)]
pub enum FaucetError {
    // --- claim path ---
    #[error("Caller is not the faucet administrator")]
    Unauthorized,

    #[error("Faucet is paused")]
    Paused,

    #[error("Cooldown period not elapsed: try again in {0} seconds")]
    CooldownActive(u64),

    #[error("Lifetime claim limit reached")]
    LimitReached,

    #[error("Faucet reserve cannot cover the claim amount")]
    InsufficientReserve,

    // --- ledger bookkeeping ---
    #[error("Insufficient balance for {account}: has {balance}, needs {requested}")]
    InsufficientBalance {
        account: Address,
        balance: u128,
        requested: u128,
    },

    #[error("Minting {requested} would exceed the maximum supply of {max_supply}")]
    SupplyCapExceeded { requested: u128, max_supply: u128 },

    #[error("Genesis supply has already been minted")]
    GenesisAlreadyMinted,

    // --- transport / ambient ---
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Rate limit exceeded: try again in {0} seconds")]
    RateLimitExceeded(u64),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sled::Error),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl FaucetError {
    /// Stable machine-readable code, also used as the metrics label.
    pub fn code(&self) -> &'static str {
        match self {
            FaucetError::Unauthorized => "UNAUTHORIZED",
            FaucetError::Paused => "PAUSED",
            FaucetError::CooldownActive(_) => "COOLDOWN_ACTIVE",
            FaucetError::LimitReached => "LIMIT_REACHED",
            FaucetError::InsufficientReserve => "INSUFFICIENT_RESERVE",
            FaucetError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            FaucetError::SupplyCapExceeded { .. } => "SUPPLY_CAP_EXCEEDED",
            FaucetError::GenesisAlreadyMinted => "GENESIS_ALREADY_MINTED",
            FaucetError::InvalidAddress(_) => "INVALID_ADDRESS",
            FaucetError::InvalidConfig(_) => "INVALID_CONFIG",
            FaucetError::RateLimitExceeded(_) => "RATE_LIMIT_EXCEEDED",
            FaucetError::DatabaseError(_) => "DATABASE_ERROR",
            FaucetError::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            FaucetError::Unauthorized | FaucetError::LimitReached => StatusCode::FORBIDDEN,
            FaucetError::Paused | FaucetError::InsufficientReserve => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            FaucetError::CooldownActive(_) | FaucetError::RateLimitExceeded(_) => {
                StatusCode::TOO_MANY_REQUESTS
            }
            FaucetError::InvalidAddress(_) => StatusCode::BAD_REQUEST,
            FaucetError::InsufficientBalance { .. }
            | FaucetError::SupplyCapExceeded { .. }
            | FaucetError::GenesisAlreadyMinted
            | FaucetError::InvalidConfig(_)
            | FaucetError::DatabaseError(_)
            | FaucetError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Seconds the caller should wait before retrying, when the error says so.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            FaucetError::CooldownActive(secs) | FaucetError::RateLimitExceeded(secs) => Some(*secs),
            _ => None,
        }
    }
}

impl IntoResponse for FaucetError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut body = json!({
            "error": self.code(),
            "message": self.to_string(),
            "timestamp": chrono::Utc::now().to_rfc3339()
        });
        if let Some(secs) = self.retry_after() {
            body["retry_after_secs"] = json!(secs);
        }

        (status, Json(body)).into_response()
    }
}

pub type FaucetResult<T> = Result<T, FaucetError>;
