//! Faucet configuration

use crate::error::{FaucetError, FaucetResult};
use serde::{Deserialize, Serialize};
use spout_common::types::Address;
use spout_common::utils::config::load_config;
use spout_common::utils::logging::LoggingConfig;
use std::path::Path;

/// Limits fixed when the faucet is constructed. Never changed at runtime.
///
/// The lifetime cap is a claim count. Because every claim pays exactly
/// `claim_amount`, it is equivalent to a cumulative cap of
/// [`FaucetParams::lifetime_amount_cap`]; if claims ever pay variable amounts
/// the two stop being interchangeable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaucetParams {
    pub max_supply: u128,
    pub claim_amount: u128,
    pub cooldown_secs: u64,
    pub lifetime_claim_limit: u32,
}

impl FaucetParams {
    pub fn validate(&self) -> FaucetResult<()> {
        if self.max_supply == 0 {
            return Err(FaucetError::InvalidConfig("max_supply must be positive".into()));
        }
        if self.claim_amount == 0 {
            return Err(FaucetError::InvalidConfig("claim_amount must be positive".into()));
        }
        if self.lifetime_claim_limit == 0 {
            return Err(FaucetError::InvalidConfig(
                "lifetime_claim_limit must be positive".into(),
            ));
        }
        if self.claim_amount > self.max_supply {
            return Err(FaucetError::InvalidConfig(
                "claim_amount cannot exceed max_supply".into(),
            ));
        }
        Ok(())
    }

    /// Total an account can ever receive.
    pub fn lifetime_amount_cap(&self) -> u128 {
        (self.lifetime_claim_limit as u128).saturating_mul(self.claim_amount)
    }
}

/// Faucet service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FaucetConfig {
    /// Server address
    pub server_addr: String,

    /// Administrator allowed to pause the faucet
    pub admin_address: String,

    /// Faucet's own account holding the reserve
    pub reserve_address: String,

    /// Account receiving the genesis mint; the administrator when unset
    pub deployer_address: Option<String>,

    /// Hard cap on issuance (token units)
    pub max_supply: u64,

    /// Amount minted at genesis; the whole max supply when unset
    pub genesis_mint: Option<u64>,

    /// Amount transferred from the deployer into the reserve after genesis
    pub reserve_seed: u64,

    /// Amount paid per successful claim (token units)
    pub claim_amount: u64,

    /// Minimum seconds between two claims of the same account.
    /// No default: deployments must choose a window.
    pub cooldown_secs: Option<u64>,

    /// Maximum number of successful claims per account, ever
    pub lifetime_claim_limit: u32,

    /// Database path; state is kept in memory only when unset
    pub db_path: Option<String>,

    /// Per-IP HTTP request quota
    pub max_requests_per_minute: u32,

    /// Distribution log retention (days)
    pub history_retention_days: i64,

    /// Claim event channel capacity
    pub event_capacity: usize,

    /// Enable metrics
    pub metrics_enabled: bool,

    /// Enable CORS
    pub cors_enabled: bool,

    /// Allowed origins
    pub allowed_origins: Vec<String>,

    pub logging: LoggingConfig,
}

impl Default for FaucetConfig {
    fn default() -> Self {
        Self {
            server_addr: "0.0.0.0:3000".to_string(),
            admin_address: String::new(),
            reserve_address: String::new(),
            deployer_address: None,
            max_supply: 1_000_000,
            genesis_mint: None,
            reserve_seed: 10_000,
            claim_amount: 100,
            cooldown_secs: None,
            lifetime_claim_limit: 5,
            db_path: Some("./faucet_data".to_string()),
            max_requests_per_minute: 30,
            history_retention_days: 30,
            event_capacity: 1024,
            metrics_enabled: true,
            cors_enabled: true,
            allowed_origins: vec!["*".to_string()],
            logging: LoggingConfig::default(),
        }
    }
}

impl FaucetConfig {
    /// Load from environment variables with defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Load from a config file, then apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let mut config: FaucetConfig = load_config(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Applies `FAUCET_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("FAUCET_SERVER_ADDR") {
            self.server_addr = addr;
        }

        if let Some(admin) = lookup("FAUCET_ADMIN_ADDRESS") {
            self.admin_address = admin;
        }

        if let Some(reserve) = lookup("FAUCET_RESERVE_ADDRESS") {
            self.reserve_address = reserve;
        }

        if let Some(deployer) = lookup("FAUCET_DEPLOYER_ADDRESS") {
            self.deployer_address = Some(deployer);
        }

        if let Some(supply) = lookup("FAUCET_MAX_SUPPLY") {
            self.max_supply = supply.parse().unwrap_or(self.max_supply);
        }

        if let Some(seed) = lookup("FAUCET_RESERVE_SEED") {
            self.reserve_seed = seed.parse().unwrap_or(self.reserve_seed);
        }

        if let Some(amount) = lookup("FAUCET_CLAIM_AMOUNT") {
            self.claim_amount = amount.parse().unwrap_or(self.claim_amount);
        }

        if let Some(cooldown) = lookup("FAUCET_COOLDOWN_SECS") {
            if let Ok(secs) = cooldown.parse() {
                self.cooldown_secs = Some(secs);
            }
        }

        if let Some(limit) = lookup("FAUCET_LIFETIME_CLAIM_LIMIT") {
            self.lifetime_claim_limit = limit.parse().unwrap_or(self.lifetime_claim_limit);
        }

        if let Some(db_path) = lookup("FAUCET_DB_PATH") {
            self.db_path = if db_path.is_empty() { None } else { Some(db_path) };
        }

        if let Some(max_req) = lookup("FAUCET_MAX_REQUESTS_PER_MINUTE") {
            self.max_requests_per_minute = max_req.parse().unwrap_or(self.max_requests_per_minute);
        }

        if let Some(level) = lookup("FAUCET_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    /// Immutable claim limits derived from this configuration
    pub fn params(&self) -> FaucetResult<FaucetParams> {
        let cooldown_secs = self.cooldown_secs.ok_or_else(|| {
            FaucetError::InvalidConfig(
                "cooldown_secs must be set explicitly (file or FAUCET_COOLDOWN_SECS)".into(),
            )
        })?;

        let params = FaucetParams {
            max_supply: self.max_supply as u128,
            claim_amount: self.claim_amount as u128,
            cooldown_secs,
            lifetime_claim_limit: self.lifetime_claim_limit,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn admin(&self) -> FaucetResult<Address> {
        parse_address("admin_address", &self.admin_address)
    }

    pub fn reserve(&self) -> FaucetResult<Address> {
        parse_address("reserve_address", &self.reserve_address)
    }

    pub fn deployer(&self) -> FaucetResult<Address> {
        match &self.deployer_address {
            Some(deployer) => parse_address("deployer_address", deployer),
            None => self.admin(),
        }
    }

    pub fn genesis_mint(&self) -> u128 {
        self.genesis_mint.unwrap_or(self.max_supply) as u128
    }

    /// Checks everything the service needs before it starts
    pub fn validate(&self) -> FaucetResult<()> {
        let params = self.params()?;
        let reserve = self.reserve()?;
        let admin = self.admin()?;
        let deployer = self.deployer()?;

        if reserve == admin || reserve == deployer {
            return Err(FaucetError::InvalidConfig(
                "reserve_address must differ from the admin and deployer".into(),
            ));
        }
        if self.genesis_mint() > params.max_supply {
            return Err(FaucetError::InvalidConfig(
                "genesis_mint cannot exceed max_supply".into(),
            ));
        }
        if (self.reserve_seed as u128) > self.genesis_mint() {
            return Err(FaucetError::InvalidConfig(
                "reserve_seed cannot exceed genesis_mint".into(),
            ));
        }
        if self.max_requests_per_minute == 0 {
            return Err(FaucetError::InvalidConfig(
                "max_requests_per_minute must be positive".into(),
            ));
        }
        Ok(())
    }
}

fn parse_address(field: &str, value: &str) -> FaucetResult<Address> {
    if value.trim().is_empty() {
        return Err(FaucetError::InvalidConfig(format!("{} must be set", field)));
    }
    let address: Address = value
        .parse()
        .map_err(|e| FaucetError::InvalidConfig(format!("{}: {}", field, e)))?;
    if address.is_zero() {
        return Err(FaucetError::InvalidConfig(format!("{} cannot be the zero address", field)));
    }
    Ok(address)
}
