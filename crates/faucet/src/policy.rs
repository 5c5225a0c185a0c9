//! Per-account claim history and eligibility rules.
//!
//! Two limits apply to every account independently: a cooldown window between
//! successful claims and a lifetime cap on the number of claims. The cap is
//! counted in claims; with a fixed claim amount this is the same as capping the
//! cumulative amount at `lifetime_claim_limit * claim_amount`.

use crate::config::FaucetParams;
use crate::error::{FaucetError, FaucetResult};
use serde::{Deserialize, Serialize};
use spout_common::types::Address;
use std::collections::HashMap;

/// Unix timestamp in seconds.
pub type Timestamp = i64;

/// Claim history of one account. Absent until the first successful claim.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRecord {
    pub last_claim_at: Option<Timestamp>,
    pub claim_count: u32,
}

/// Outcome of an eligibility check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Eligibility {
    Eligible,
    CooldownActive { seconds_remaining: u64 },
    LimitReached,
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Eligibility::Eligible)
    }

    pub fn into_result(self) -> FaucetResult<()> {
        match self {
            Eligibility::Eligible => Ok(()),
            Eligibility::CooldownActive { seconds_remaining } => {
                Err(FaucetError::CooldownActive(seconds_remaining))
            }
            Eligibility::LimitReached => Err(FaucetError::LimitReached),
        }
    }
}

/// Claim history for all accounts plus the limits applied to it.
#[derive(Debug, Clone)]
pub struct ClaimPolicy {
    records: HashMap<Address, ClaimRecord>,
    claim_amount: u128,
    cooldown_secs: u64,
    lifetime_claim_limit: u32,
}

impl ClaimPolicy {
    pub fn new(params: &FaucetParams) -> Self {
        Self {
            records: HashMap::new(),
            claim_amount: params.claim_amount,
            cooldown_secs: params.cooldown_secs,
            lifetime_claim_limit: params.lifetime_claim_limit,
        }
    }

    /// Rebuilds the policy from persisted records.
    pub fn from_records(
        params: &FaucetParams,
        records: impl IntoIterator<Item = (Address, ClaimRecord)>,
    ) -> FaucetResult<Self> {
        let mut policy = Self::new(params);
        for (account, record) in records {
            if record.claim_count > policy.lifetime_claim_limit {
                return Err(FaucetError::InternalError(format!(
                    "{} has {} claims, above the limit of {}",
                    account, record.claim_count, policy.lifetime_claim_limit
                )));
            }
            policy.records.insert(account, record);
        }
        Ok(policy)
    }

    /// Read-only eligibility check. The limit is checked before the cooldown so
    /// an exhausted account always reports `LimitReached`.
    pub fn check_eligible(&self, account: &Address, now: Timestamp) -> Eligibility {
        let record = self.record(account);

        if record.claim_count >= self.lifetime_claim_limit {
            return Eligibility::LimitReached;
        }

        if let Some(last) = record.last_claim_at {
            // A clock reading behind the last claim counts as no time elapsed.
            let elapsed = now.saturating_sub(last).max(0) as u64;
            if elapsed < self.cooldown_secs {
                return Eligibility::CooldownActive {
                    seconds_remaining: self.cooldown_secs - elapsed,
                };
            }
        }

        Eligibility::Eligible
    }

    /// Records a successful claim. Callers must have seen `Eligible` and moved
    /// the funds under the same lock.
    pub fn record_claim(&mut self, account: &Address, now: Timestamp) -> ClaimRecord {
        let record = self.records.entry(*account).or_default();
        debug_assert!(record.claim_count < self.lifetime_claim_limit);
        record.last_claim_at = Some(now);
        record.claim_count = record.claim_count.saturating_add(1);
        *record
    }

    /// Puts back a previous record, undoing [`ClaimPolicy::record_claim`].
    pub fn restore(&mut self, account: &Address, previous: Option<ClaimRecord>) {
        match previous {
            Some(record) => {
                self.records.insert(*account, record);
            }
            None => {
                self.records.remove(account);
            }
        }
    }

    /// Quota left under the lifetime cap, in token units.
    pub fn remaining_allowance(&self, account: &Address) -> u128 {
        let left = self
            .lifetime_claim_limit
            .saturating_sub(self.record(account).claim_count);
        (left as u128).saturating_mul(self.claim_amount)
    }

    /// Seconds until the account may claim again; `None` once the cap is hit.
    pub fn seconds_until_eligible(&self, account: &Address, now: Timestamp) -> Option<u64> {
        match self.check_eligible(account, now) {
            Eligibility::Eligible => Some(0),
            Eligibility::CooldownActive { seconds_remaining } => Some(seconds_remaining),
            Eligibility::LimitReached => None,
        }
    }

    pub fn record(&self, account: &Address) -> ClaimRecord {
        self.records.get(account).copied().unwrap_or_default()
    }

    pub fn existing_record(&self, account: &Address) -> Option<ClaimRecord> {
        self.records.get(account).copied()
    }

    pub fn last_claim_at(&self, account: &Address) -> Option<Timestamp> {
        self.record(account).last_claim_at
    }

    pub fn claim_count(&self, account: &Address) -> u32 {
        self.record(account).claim_count
    }

    /// Number of accounts that have claimed at least once.
    pub fn claimant_count(&self) -> usize {
        self.records.len()
    }
}
