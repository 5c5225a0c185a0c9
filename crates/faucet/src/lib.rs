//! Token faucet with per-account rate limits
//!
//! Accounts claim a fixed amount from a reserve funded out of a capped supply.
//! Claims are limited by:
//! - a cooldown window between claims of the same account
//! - a lifetime cap on the number of claims per account
//! - an administrator-controlled pause switch
//!
//! The state machine lives in [`service::FaucetService`]; persistence, metrics
//! and the HTTP surface are layered around it.

pub mod admin;
pub mod api;
pub mod clock;
pub mod config;
pub mod database;
pub mod error;
pub mod events;
pub mod ledger;
pub mod metrics;
pub mod policy;
pub mod service;
pub mod throttle;

pub use admin::AdminGate;
pub use config::{FaucetConfig, FaucetParams};
pub use database::{ClaimStore, DistributionRecord, FaucetStatistics, GenesisRecord};
pub use error::{FaucetError, FaucetResult};
pub use events::{EventSubscriber, FaucetEvent, TokensClaimed};
pub use ledger::Ledger;
pub use policy::{ClaimPolicy, ClaimRecord, Eligibility, Timestamp};
pub use service::{AccountView, ClaimReceipt, FaucetService, FaucetStatus, GenesisPlan};
