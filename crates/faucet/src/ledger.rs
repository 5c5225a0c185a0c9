//! Token balance ledger with a fixed maximum supply.
//!
//! Supply is minted exactly once, at genesis, to the deployer. The deployer
//! then seeds the faucet reserve with a single transfer. After that the only
//! movement is reserve → claimant; claims never mint.

use crate::error::{FaucetError, FaucetResult};
use serde::{Deserialize, Serialize};
use spout_common::types::Address;
use std::collections::HashMap;

/// Balance ledger.
#[derive(Debug, Clone)]
pub struct Ledger {
    balances: HashMap<Address, u128>,
    total_issued: u128,
    max_supply: u128,
    reserve: Address,
    genesis_minted: bool,
}

/// Point-in-time copy of the ledger, used to persist and restore it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub balances: Vec<(Address, u128)>,
    pub total_issued: u128,
    pub genesis_minted: bool,
}

impl Ledger {
    /// Empty ledger; nothing is issued until [`Ledger::mint_genesis`].
    pub fn new(max_supply: u128, reserve: Address) -> Self {
        Self {
            balances: HashMap::new(),
            total_issued: 0,
            max_supply,
            reserve,
            genesis_minted: false,
        }
    }

    /// Rebuilds a ledger from persisted state.
    pub fn from_snapshot(
        max_supply: u128,
        reserve: Address,
        snapshot: LedgerSnapshot,
    ) -> FaucetResult<Self> {
        if snapshot.total_issued > max_supply {
            return Err(FaucetError::SupplyCapExceeded {
                requested: snapshot.total_issued,
                max_supply,
            });
        }

        let mut sum: u128 = 0;
        for (_, amount) in &snapshot.balances {
            sum = sum.checked_add(*amount).ok_or_else(|| {
                FaucetError::InternalError("persisted balances overflow".to_string())
            })?;
        }
        if sum != snapshot.total_issued {
            return Err(FaucetError::InternalError(format!(
                "persisted balances sum to {} but total issued is {}",
                sum, snapshot.total_issued
            )));
        }

        Ok(Self {
            balances: snapshot.balances.into_iter().filter(|(_, v)| *v > 0).collect(),
            total_issued: snapshot.total_issued,
            max_supply,
            reserve,
            genesis_minted: snapshot.genesis_minted,
        })
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        let mut balances: Vec<(Address, u128)> =
            self.balances.iter().map(|(a, v)| (*a, *v)).collect();
        balances.sort_by(|a, b| a.0.cmp(&b.0));
        LedgerSnapshot {
            balances,
            total_issued: self.total_issued,
            genesis_minted: self.genesis_minted,
        }
    }

    /// One-time issuance of the initial supply to `to`.
    pub fn mint_genesis(&mut self, to: Address, amount: u128) -> FaucetResult<()> {
        if self.genesis_minted {
            return Err(FaucetError::GenesisAlreadyMinted);
        }
        let issued = self
            .total_issued
            .checked_add(amount)
            .filter(|total| *total <= self.max_supply)
            .ok_or(FaucetError::SupplyCapExceeded {
                requested: amount,
                max_supply: self.max_supply,
            })?;

        *self.balances.entry(to).or_insert(0) += amount;
        self.total_issued = issued;
        self.genesis_minted = true;
        Ok(())
    }

    /// Funds the reserve from `from`, normally the deployer right after genesis.
    pub fn seed_reserve(&mut self, from: Address, amount: u128) -> FaucetResult<()> {
        let reserve = self.reserve;
        self.transfer(from, reserve, amount)
    }

    /// Moves `amount` from `from` to `to`.
    ///
    /// Either both balances change or neither does. A shortfall on the reserve
    /// account is reported as [`FaucetError::InsufficientReserve`].
    pub fn transfer(&mut self, from: Address, to: Address, amount: u128) -> FaucetResult<()> {
        let available = self.balance_of(&from);
        if available < amount {
            if from == self.reserve {
                return Err(FaucetError::InsufficientReserve);
            }
            return Err(FaucetError::InsufficientBalance {
                account: from,
                balance: available,
                requested: amount,
            });
        }
        if from == to || amount == 0 {
            return Ok(());
        }

        // The credit cannot overflow: every balance is bounded by total_issued.
        let remaining = available - amount;
        if remaining == 0 {
            self.balances.remove(&from);
        } else {
            self.balances.insert(from, remaining);
        }
        *self.balances.entry(to).or_insert(0) += amount;
        Ok(())
    }

    pub fn balance_of(&self, account: &Address) -> u128 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    pub fn reserve_balance(&self) -> u128 {
        self.balance_of(&self.reserve)
    }

    pub fn reserve(&self) -> Address {
        self.reserve
    }

    pub fn total_issued(&self) -> u128 {
        self.total_issued
    }

    pub fn max_supply(&self) -> u128 {
        self.max_supply
    }

    pub fn genesis_minted(&self) -> bool {
        self.genesis_minted
    }
}
