//! Faucet database: durable ledger, claim history and distribution log

use crate::config::FaucetParams;
use crate::error::{FaucetError, FaucetResult};
use crate::ledger::LedgerSnapshot;
use crate::policy::{ClaimRecord, Timestamp};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::transaction::{abort, TransactionError, TransactionResult};
use sled::Transactional;
use sled::{Db, IVec, Tree};
use spout_common::types::Address;
use spout_common::utils::db_keys::{distribution_key, distribution_prefix};
use tracing::{debug, info};

const META_TOTAL_ISSUED: &[u8] = b"total_issued";
const META_GENESIS: &[u8] = b"genesis";
const META_PAUSED: &[u8] = b"paused";

/// Distribution record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionRecord {
    /// Recipient address
    pub address: Address,
    /// Amount dispensed (token units)
    pub amount: u128,
    /// Claim time (unix seconds)
    pub timestamp: Timestamp,
    /// 1-based index of this claim for the recipient
    pub claim_number: u32,
}

impl DistributionRecord {
    pub fn datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.timestamp, 0).unwrap_or_else(Utc::now)
    }
}

/// Everything a committed claim changes, written in one transaction.
#[derive(Debug, Clone)]
pub struct ClaimCommit {
    pub account: Address,
    pub account_balance: u128,
    pub reserve: Address,
    pub reserve_balance: u128,
    pub record: ClaimRecord,
    pub amount: u128,
    pub timestamp: Timestamp,
}

/// Identity and limits fixed at genesis. A store only ever serves the faucet
/// it was created for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisRecord {
    pub admin: Address,
    pub reserve: Address,
    pub params: FaucetParams,
}

/// State restored at startup.
#[derive(Debug, Clone)]
pub struct PersistedState {
    pub genesis: GenesisRecord,
    pub ledger: LedgerSnapshot,
    pub claims: Vec<(Address, ClaimRecord)>,
    pub paused: bool,
}

/// Faucet database
pub struct ClaimStore {
    db: Db,
    /// Account balances, u128 big-endian
    balances: Tree,
    /// Claim history per account, bincode
    claims: Tree,
    /// Issuance totals and flags
    meta: Tree,
    /// Append-only distribution log
    distributions: Tree,
}

impl ClaimStore {
    /// Create or open faucet database
    pub fn open(path: &str) -> FaucetResult<Self> {
        info!("Opening faucet database at: {}", path);

        let db = sled::Config::default()
            .path(path)
            .cache_capacity(64 * 1024 * 1024)
            .open()?;
        Self::from_db(db)
    }

    /// Throwaway database removed on drop
    pub fn temporary() -> FaucetResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> FaucetResult<Self> {
        let balances = db.open_tree("balances")?;
        let claims = db.open_tree("claims")?;
        let meta = db.open_tree("meta")?;
        let distributions = db.open_tree("distributions")?;

        Ok(Self {
            db,
            balances,
            claims,
            meta,
            distributions,
        })
    }

    /// Persisted state, or `None` when genesis has never been recorded.
    pub fn load(&self) -> FaucetResult<Option<PersistedState>> {
        let genesis: GenesisRecord = match self.meta.get(META_GENESIS)? {
            Some(bytes) => bincode::deserialize(&bytes)
                .map_err(|e| FaucetError::InternalError(format!("Corrupt genesis record: {}", e)))?,
            None => return Ok(None),
        };

        let mut balances = Vec::new();
        for item in self.balances.iter() {
            let (key, value) = item?;
            balances.push((decode_address(&key)?, decode_amount(&value)?));
        }

        let mut claims = Vec::new();
        for item in self.claims.iter() {
            let (key, value) = item?;
            let record: ClaimRecord = bincode::deserialize(&value)
                .map_err(|e| FaucetError::InternalError(e.to_string()))?;
            claims.push((decode_address(&key)?, record));
        }

        let total_issued = match self.meta.get(META_TOTAL_ISSUED)? {
            Some(bytes) => decode_amount(&bytes)?,
            None => 0,
        };
        let paused = self
            .meta
            .get(META_PAUSED)?
            .map(|v| v.first() == Some(&1u8))
            .unwrap_or(false);

        Ok(Some(PersistedState {
            genesis,
            ledger: LedgerSnapshot {
                balances,
                total_issued,
                genesis_minted: true,
            },
            claims,
            paused,
        }))
    }

    /// Records the genesis identity and the post-genesis ledger. Only ever
    /// written once per database.
    pub fn save_genesis(&self, genesis: &GenesisRecord, ledger: &LedgerSnapshot) -> FaucetResult<()> {
        let genesis_bytes = bincode::serialize(genesis)
            .map_err(|e| FaucetError::InternalError(e.to_string()))?;
        let entries: Vec<(Vec<u8>, Vec<u8>)> = ledger
            .balances
            .iter()
            .map(|(addr, amount)| (addr.0.to_vec(), amount.to_be_bytes().to_vec()))
            .collect();
        let total = ledger.total_issued.to_be_bytes().to_vec();

        let result: TransactionResult<(), String> =
            (&self.balances, &self.meta).transaction(|(balances, meta)| {
                if meta.get(META_GENESIS)?.is_some() {
                    return abort("genesis already recorded".to_string());
                }
                for (key, value) in &entries {
                    balances.insert(key.as_slice(), value.as_slice())?;
                }
                meta.insert(META_TOTAL_ISSUED, total.as_slice())?;
                meta.insert(META_GENESIS, genesis_bytes.as_slice())?;
                Ok(())
            });
        result.map_err(map_tx_error)?;

        info!(
            "Recorded genesis: {} accounts, {} issued",
            ledger.balances.len(),
            ledger.total_issued
        );
        Ok(())
    }

    /// Writes both balances, the claim record and the log entry atomically.
    ///
    /// The stored record must be the predecessor of `commit.record`; a store
    /// that disagrees with the caller's history rejects the commit untouched.
    pub fn commit_claim(&self, commit: &ClaimCommit) -> FaucetResult<()> {
        let record_bytes = bincode::serialize(&commit.record)
            .map_err(|e| FaucetError::InternalError(e.to_string()))?;
        let log_entry = DistributionRecord {
            address: commit.account,
            amount: commit.amount,
            timestamp: commit.timestamp,
            claim_number: commit.record.claim_count,
        };
        let log_bytes = bincode::serialize(&log_entry)
            .map_err(|e| FaucetError::InternalError(e.to_string()))?;
        let log_key = distribution_key(&commit.account, commit.timestamp, commit.record.claim_count);

        let account_balance = commit.account_balance.to_be_bytes();
        let reserve_balance = commit.reserve_balance.to_be_bytes();

        let expected_count = commit.record.claim_count.saturating_sub(1);

        let result: TransactionResult<(), String> = (&self.balances, &self.claims, &self.distributions)
            .transaction(|(balances, claims, distributions)| {
                let stored_count = match claims.get(&commit.account.0[..])? {
                    Some(bytes) => match bincode::deserialize::<ClaimRecord>(&bytes) {
                        Ok(record) => record.claim_count,
                        Err(e) => return abort(format!("corrupt claim record: {}", e)),
                    },
                    None => 0,
                };
                if stored_count != expected_count {
                    return abort(format!(
                        "claim history of {} diverged: stored {} claims, expected {}",
                        commit.account, stored_count, expected_count
                    ));
                }

                balances.insert(&commit.account.0[..], &account_balance[..])?;
                if commit.reserve_balance == 0 {
                    balances.remove(&commit.reserve.0[..])?;
                } else {
                    balances.insert(&commit.reserve.0[..], &reserve_balance[..])?;
                }
                claims.insert(&commit.account.0[..], record_bytes.as_slice())?;
                distributions.insert(log_key.as_slice(), log_bytes.as_slice())?;
                Ok(())
            });
        result.map_err(map_tx_error)?;

        debug!("Recorded distribution for address: {}", commit.account);
        Ok(())
    }

    pub fn set_paused(&self, paused: bool) -> FaucetResult<()> {
        self.meta.insert(META_PAUSED, &[paused as u8][..])?;
        Ok(())
    }

    /// Get all distributions for an address, newest first
    pub fn distributions_for_address(&self, address: &Address) -> FaucetResult<Vec<DistributionRecord>> {
        let mut records = Vec::new();

        for item in self.distributions.scan_prefix(distribution_prefix(address)) {
            let (_, value) = item?;
            records.push(decode_distribution(&value)?);
        }

        records.reverse();
        Ok(records)
    }

    /// Most recent distributions across all accounts
    pub fn recent_distributions(&self, limit: usize) -> FaucetResult<Vec<DistributionRecord>> {
        let mut records = Vec::new();

        for item in self.distributions.iter() {
            let (_, value) = item?;
            records.push(decode_distribution(&value)?);
        }

        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        records.truncate(limit);
        Ok(records)
    }

    /// Get statistics
    pub fn statistics(&self) -> FaucetResult<FaucetStatistics> {
        let mut total_amount = 0u128;
        let mut total_distributions = 0usize;

        for item in self.distributions.iter() {
            let (_, value) = item?;
            let record = decode_distribution(&value)?;
            total_amount = total_amount.saturating_add(record.amount);
            total_distributions += 1;
        }

        Ok(FaucetStatistics {
            total_distributions,
            total_amount,
            unique_addresses: self.claims.len() as u64,
        })
    }

    /// Drops log entries older than `days`. Claim history is never touched,
    /// so eligibility is unaffected.
    pub fn cleanup_old_records(&self, days: i64, now: Timestamp) -> FaucetResult<usize> {
        let cutoff = now - days * 86_400;
        let mut keys_to_remove = Vec::new();

        for item in self.distributions.iter() {
            let (key, value) = item?;
            if decode_distribution(&value)?.timestamp < cutoff {
                keys_to_remove.push(key);
            }
        }

        let removed = keys_to_remove.len();
        for key in keys_to_remove {
            self.distributions.remove(key)?;
        }

        info!("Cleaned up {} old records (older than {} days)", removed, days);
        Ok(removed)
    }

    pub async fn flush(&self) -> FaucetResult<()> {
        self.db.flush_async().await?;
        Ok(())
    }
}

/// Faucet statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaucetStatistics {
    pub total_distributions: usize,
    pub total_amount: u128,
    pub unique_addresses: u64,
}

fn map_tx_error(err: TransactionError<String>) -> FaucetError {
    match err {
        TransactionError::Abort(reason) => FaucetError::InternalError(reason),
        TransactionError::Storage(e) => FaucetError::DatabaseError(e),
    }
}

fn decode_address(bytes: &IVec) -> FaucetResult<Address> {
    Address::from_slice(bytes).map_err(|e| FaucetError::InternalError(e.to_string()))
}

fn decode_amount(bytes: &IVec) -> FaucetResult<u128> {
    let arr: [u8; 16] = bytes
        .as_ref()
        .try_into()
        .map_err(|_| FaucetError::InternalError("Invalid amount format".to_string()))?;
    Ok(u128::from_be_bytes(arr))
}

fn decode_distribution(bytes: &IVec) -> FaucetResult<DistributionRecord> {
    bincode::deserialize(bytes).map_err(|e| FaucetError::InternalError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const USER: Address = Address::repeat_byte(0x01);
    const RESERVE: Address = Address::repeat_byte(0xfa);
    const DEPLOYER: Address = Address::repeat_byte(0xd0);

    fn genesis_record() -> GenesisRecord {
        GenesisRecord {
            admin: DEPLOYER,
            reserve: RESERVE,
            params: FaucetParams {
                max_supply: 1_000_000,
                claim_amount: 100,
                cooldown_secs: 60,
                lifetime_claim_limit: 5,
            },
        }
    }

    fn genesis_snapshot() -> LedgerSnapshot {
        LedgerSnapshot {
            balances: vec![(DEPLOYER, 990_000), (RESERVE, 10_000)],
            total_issued: 1_000_000,
            genesis_minted: true,
        }
    }

    fn commit(count: u32, timestamp: i64) -> ClaimCommit {
        ClaimCommit {
            account: USER,
            account_balance: 100 * count as u128,
            reserve: RESERVE,
            reserve_balance: 10_000 - 100 * count as u128,
            record: ClaimRecord {
                last_claim_at: Some(timestamp),
                claim_count: count,
            },
            amount: 100,
            timestamp,
        }
    }

    #[test]
    fn test_fresh_store_has_no_state() {
        let store = ClaimStore::temporary().unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_genesis_and_claim_are_restored() {
        let store = ClaimStore::temporary().unwrap();
        store.save_genesis(&genesis_record(), &genesis_snapshot()).unwrap();
        store.commit_claim(&commit(1, 1_000)).unwrap();
        store.set_paused(true).unwrap();

        let state = store.load().unwrap().unwrap();
        assert!(state.paused);
        assert_eq!(state.genesis, genesis_record());
        assert_eq!(state.ledger.total_issued, 1_000_000);
        assert!(state.ledger.balances.contains(&(USER, 100)));
        assert!(state.ledger.balances.contains(&(RESERVE, 9_900)));
        assert_eq!(
            state.claims,
            vec![(USER, ClaimRecord { last_claim_at: Some(1_000), claim_count: 1 })]
        );
    }

    #[test]
    fn test_genesis_is_written_once() {
        let store = ClaimStore::temporary().unwrap();
        store.save_genesis(&genesis_record(), &genesis_snapshot()).unwrap();
        assert!(matches!(
            store.save_genesis(&genesis_record(), &genesis_snapshot()),
            Err(FaucetError::InternalError(_))
        ));
    }

    #[test]
    fn test_diverged_claim_history_is_rejected() {
        let store = ClaimStore::temporary().unwrap();
        store.save_genesis(&genesis_record(), &genesis_snapshot()).unwrap();
        store.commit_claim(&commit(1, 1_000)).unwrap();

        // Replaying the first claim, or skipping ahead, must not overwrite history.
        assert!(matches!(
            store.commit_claim(&commit(1, 2_000)),
            Err(FaucetError::InternalError(_))
        ));
        assert!(store.commit_claim(&commit(3, 2_000)).is_err());

        let state = store.load().unwrap().unwrap();
        assert_eq!(state.claims[0].1.last_claim_at, Some(1_000));
        assert!(state.ledger.balances.contains(&(RESERVE, 9_900)));
        assert_eq!(store.statistics().unwrap().total_distributions, 1);
    }

    #[test]
    fn test_reopen_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db");
        let path = path.to_str().unwrap();
        {
            let store = ClaimStore::open(path).unwrap();
            store.save_genesis(&genesis_record(), &genesis_snapshot()).unwrap();
            store.commit_claim(&commit(1, 1_000)).unwrap();
        }

        let store = ClaimStore::open(path).unwrap();
        let state = store.load().unwrap().unwrap();
        assert_eq!(state.claims.len(), 1);
        assert_eq!(store.statistics().unwrap().total_distributions, 1);
    }

    #[test]
    fn test_history_and_statistics() {
        let store = ClaimStore::temporary().unwrap();
        store.save_genesis(&genesis_record(), &genesis_snapshot()).unwrap();
        store.commit_claim(&commit(1, 1_000)).unwrap();
        store.commit_claim(&commit(2, 2_000)).unwrap();

        let history = store.distributions_for_address(&USER).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].timestamp, 2_000);
        assert_eq!(history[0].claim_number, 2);

        let stats = store.statistics().unwrap();
        assert_eq!(stats.total_distributions, 2);
        assert_eq!(stats.total_amount, 200);
        assert_eq!(stats.unique_addresses, 1);

        assert_eq!(store.recent_distributions(1).unwrap()[0].timestamp, 2_000);
    }

    #[test]
    fn test_cleanup_keeps_claim_history() {
        let store = ClaimStore::temporary().unwrap();
        store.save_genesis(&genesis_record(), &genesis_snapshot()).unwrap();
        store.commit_claim(&commit(1, 0)).unwrap();
        store.commit_claim(&commit(2, 40 * 86_400)).unwrap();

        let removed = store.cleanup_old_records(30, 45 * 86_400).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.distributions_for_address(&USER).unwrap().len(), 1);

        let state = store.load().unwrap().unwrap();
        assert_eq!(state.claims[0].1.claim_count, 2);
    }
}
