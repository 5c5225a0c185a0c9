//! Faucet service core logic
//!
//! All mutable state sits behind one `RwLock`. A claim holds the write lock
//! from the pause check through the event publication, so claims are totally
//! ordered and readers never see a transfer without its claim record.

use crate::admin::AdminGate;
use crate::config::{FaucetConfig, FaucetParams};
use crate::database::{ClaimCommit, ClaimStore, DistributionRecord, FaucetStatistics, GenesisRecord};
use crate::error::{FaucetError, FaucetResult};
use crate::events::{EventPublisher, EventSubscriber, FaucetEvent, TokensClaimed};
use crate::ledger::Ledger;
use crate::policy::{ClaimPolicy, Eligibility, Timestamp};
use serde::{Deserialize, Serialize};
use spout_common::types::Address;
use tokio::sync::RwLock;
use tracing::info;

/// Accounts and amounts used to issue the supply on first start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenesisPlan {
    pub admin: Address,
    pub deployer: Address,
    pub reserve: Address,
    pub genesis_mint: u128,
    pub reserve_seed: u128,
}

impl GenesisPlan {
    /// What a store created from this plan records about itself.
    pub fn record(&self, params: FaucetParams) -> GenesisRecord {
        GenesisRecord {
            admin: self.admin,
            reserve: self.reserve,
            params,
        }
    }

    pub fn from_config(config: &FaucetConfig) -> FaucetResult<Self> {
        Ok(Self {
            admin: config.admin()?,
            deployer: config.deployer()?,
            reserve: config.reserve()?,
            genesis_mint: config.genesis_mint(),
            reserve_seed: config.reserve_seed as u128,
        })
    }
}

/// State guarded by the service lock.
struct FaucetState {
    ledger: Ledger,
    policy: ClaimPolicy,
    admin: AdminGate,
}

/// Faucet service
pub struct FaucetService {
    params: FaucetParams,
    state: RwLock<FaucetState>,
    store: Option<ClaimStore>,
    events: EventPublisher,
}

impl FaucetService {
    /// In-memory faucet: mints the genesis supply and seeds the reserve.
    pub fn genesis(params: FaucetParams, plan: &GenesisPlan) -> FaucetResult<Self> {
        let state = Self::genesis_state(params, plan)?;
        Ok(Self::assemble(params, state, None, EventPublisher::default()))
    }

    /// Persistent faucet: restores from `store`, or runs genesis once and
    /// records it when the store is fresh.
    ///
    /// A restored store must match `params` and the plan's admin and reserve
    /// exactly; any difference fails with `InvalidConfig`.
    pub fn bootstrap(
        params: FaucetParams,
        plan: &GenesisPlan,
        store: ClaimStore,
        event_capacity: usize,
    ) -> FaucetResult<Self> {
        params.validate()?;

        let state = match store.load()? {
            Some(persisted) => {
                ensure_same_genesis(&persisted.genesis, &plan.record(params))?;
                let ledger = Ledger::from_snapshot(params.max_supply, plan.reserve, persisted.ledger)?;
                let policy = ClaimPolicy::from_records(&params, persisted.claims)?;
                info!(
                    "Restored faucet state: {} claimants, reserve balance {}, paused {}",
                    policy.claimant_count(),
                    ledger.reserve_balance(),
                    persisted.paused
                );
                FaucetState {
                    ledger,
                    policy,
                    admin: AdminGate::with_paused(plan.admin, persisted.paused),
                }
            }
            None => {
                let state = Self::genesis_state(params, plan)?;
                store.save_genesis(&plan.record(params), &state.ledger.snapshot())?;
                info!(
                    "Genesis complete: minted {} to {}, reserve seeded with {}",
                    plan.genesis_mint, plan.deployer, plan.reserve_seed
                );
                state
            }
        };

        Ok(Self::assemble(params, state, Some(store), EventPublisher::new(event_capacity)))
    }

    /// Builds the service described by `config`, persistent when a store is given.
    pub fn from_config(config: &FaucetConfig, store: Option<ClaimStore>) -> FaucetResult<Self> {
        config.validate()?;
        let params = config.params()?;
        let plan = GenesisPlan::from_config(config)?;

        match store {
            Some(store) => Self::bootstrap(params, &plan, store, config.event_capacity),
            None => {
                let state = Self::genesis_state(params, &plan)?;
                Ok(Self::assemble(params, state, None, EventPublisher::new(config.event_capacity)))
            }
        }
    }

    fn genesis_state(params: FaucetParams, plan: &GenesisPlan) -> FaucetResult<FaucetState> {
        params.validate()?;
        let mut ledger = Ledger::new(params.max_supply, plan.reserve);
        ledger.mint_genesis(plan.deployer, plan.genesis_mint)?;
        ledger.seed_reserve(plan.deployer, plan.reserve_seed)?;

        Ok(FaucetState {
            ledger,
            policy: ClaimPolicy::new(&params),
            admin: AdminGate::new(plan.admin),
        })
    }

    fn assemble(
        params: FaucetParams,
        state: FaucetState,
        store: Option<ClaimStore>,
        events: EventPublisher,
    ) -> Self {
        Self {
            params,
            state: RwLock::new(state),
            store,
            events,
        }
    }

    /// Pays `claim_amount` from the reserve to `account`.
    ///
    /// Checks run in a fixed order: pause flag, lifetime cap, cooldown,
    /// reserve balance. A rejection leaves every balance and claim record
    /// untouched and does not count against the account.
    pub async fn request_tokens(&self, account: Address, now: Timestamp) -> FaucetResult<TokensClaimed> {
        self.dispense(account, now).await.map(|receipt| receipt.claimed)
    }

    /// [`FaucetService::request_tokens`] plus the post-claim figures, read
    /// under the same lock as the commit.
    pub async fn dispense(&self, account: Address, now: Timestamp) -> FaucetResult<ClaimReceipt> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        state.admin.ensure_not_paused()?;
        if account.is_zero() || account == state.ledger.reserve() {
            return Err(FaucetError::InvalidAddress(format!(
                "{} cannot receive faucet claims",
                account
            )));
        }
        state.policy.check_eligible(&account, now).into_result()?;

        let reserve = state.ledger.reserve();
        let amount = self.params.claim_amount;
        state.ledger.transfer(reserve, account, amount)?;
        let previous = state.policy.existing_record(&account);
        let record = state.policy.record_claim(&account, now);

        if let Some(store) = &self.store {
            let commit = ClaimCommit {
                account,
                account_balance: state.ledger.balance_of(&account),
                reserve,
                reserve_balance: state.ledger.reserve_balance(),
                record,
                amount,
                timestamp: now,
            };
            if let Err(e) = store.commit_claim(&commit) {
                state.policy.restore(&account, previous);
                state.ledger.transfer(account, reserve, amount)?;
                return Err(e);
            }
        }

        let claimed = TokensClaimed {
            account,
            amount,
            timestamp: now,
        };
        self.events.publish(FaucetEvent::TokensClaimed(claimed));

        Ok(ClaimReceipt {
            claimed,
            remaining_allowance: state.policy.remaining_allowance(&account),
            reserve_balance: state.ledger.reserve_balance(),
        })
    }

    /// Sets the pause flag. Only the administrator may call this.
    pub async fn set_paused(&self, caller: &Address, paused: bool) -> FaucetResult<()> {
        let mut state = self.state.write().await;
        let previous = state.admin.is_paused();
        state.admin.set_paused(caller, paused)?;

        if let Some(store) = &self.store {
            if let Err(e) = store.set_paused(paused) {
                state.admin.set_paused(caller, previous)?;
                return Err(e);
            }
        }

        self.events.publish(FaucetEvent::PauseChanged {
            paused,
            by: *caller,
        });
        Ok(())
    }

    pub async fn balance_of(&self, account: &Address) -> u128 {
        self.state.read().await.ledger.balance_of(account)
    }

    pub async fn remaining_allowance(&self, account: &Address) -> u128 {
        self.state.read().await.policy.remaining_allowance(account)
    }

    pub async fn last_claim_at(&self, account: &Address) -> Option<Timestamp> {
        self.state.read().await.policy.last_claim_at(account)
    }

    pub async fn claim_count(&self, account: &Address) -> u32 {
        self.state.read().await.policy.claim_count(account)
    }

    pub async fn check_eligible(&self, account: &Address, now: Timestamp) -> Eligibility {
        self.state.read().await.policy.check_eligible(account, now)
    }

    /// Advisory pre-check for clients. `request_tokens` re-checks everything.
    pub async fn can_claim(&self, account: &Address, now: Timestamp) -> bool {
        let state = self.state.read().await;
        !state.admin.is_paused() && state.policy.check_eligible(account, now).is_eligible()
    }

    pub async fn is_paused(&self) -> bool {
        self.state.read().await.admin.is_paused()
    }

    pub async fn admin(&self) -> Address {
        self.state.read().await.admin.admin()
    }

    pub async fn reserve(&self) -> Address {
        self.state.read().await.ledger.reserve()
    }

    pub async fn reserve_balance(&self) -> u128 {
        self.state.read().await.ledger.reserve_balance()
    }

    pub async fn total_issued(&self) -> u128 {
        self.state.read().await.ledger.total_issued()
    }

    pub fn params(&self) -> FaucetParams {
        self.params
    }

    /// Consistent view of one account, read under a single lock acquisition.
    pub async fn account_view(&self, account: &Address, now: Timestamp) -> AccountView {
        let state = self.state.read().await;
        let eligibility = state.policy.check_eligible(account, now);
        let record = state.policy.record(account);

        AccountView {
            address: *account,
            balance: state.ledger.balance_of(account),
            remaining_allowance: state.policy.remaining_allowance(account),
            last_claim_at: record.last_claim_at,
            claim_count: record.claim_count,
            can_claim: !state.admin.is_paused() && eligibility.is_eligible(),
            seconds_until_eligible: state.policy.seconds_until_eligible(account, now),
            eligibility,
        }
    }

    /// Faucet-wide totals
    pub async fn status(&self) -> FaucetResult<FaucetStatus> {
        let mut status = {
            let state = self.state.read().await;
            FaucetStatus {
                admin: state.admin.admin(),
                reserve: state.ledger.reserve(),
                paused: state.admin.is_paused(),
                reserve_balance: state.ledger.reserve_balance(),
                total_issued: state.ledger.total_issued(),
                max_supply: state.ledger.max_supply(),
                claimants: state.policy.claimant_count(),
                params: self.params,
                statistics: None,
            }
        };

        if let Some(store) = &self.store {
            status.statistics = Some(store.statistics()?);
        }
        Ok(status)
    }

    /// Distribution log of one account, newest first. Empty without a store.
    pub fn history(&self, account: &Address) -> FaucetResult<Vec<DistributionRecord>> {
        match &self.store {
            Some(store) => store.distributions_for_address(account),
            None => Ok(Vec::new()),
        }
    }

    /// Latest distributions across all accounts, newest first. Empty without a store.
    pub fn recent_distributions(&self, limit: usize) -> FaucetResult<Vec<DistributionRecord>> {
        match &self.store {
            Some(store) => store.recent_distributions(limit),
            None => Ok(Vec::new()),
        }
    }

    /// Trims the distribution log. Claim history is kept.
    pub fn cleanup_old_records(&self, days: i64, now: Timestamp) -> FaucetResult<usize> {
        match &self.store {
            Some(store) => store.cleanup_old_records(days, now),
            None => Ok(0),
        }
    }

    pub async fn flush(&self) -> FaucetResult<()> {
        match &self.store {
            Some(store) => store.flush().await,
            None => Ok(()),
        }
    }

    pub fn subscribe(&self) -> EventSubscriber {
        self.events.subscribe()
    }
}

/// Result of a successful claim
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimReceipt {
    pub claimed: TokensClaimed,
    /// Allowance left for the claimant after this claim
    pub remaining_allowance: u128,
    /// Reserve balance right after this claim
    pub reserve_balance: u128,
}

fn ensure_same_genesis(recorded: &GenesisRecord, configured: &GenesisRecord) -> FaucetResult<()> {
    let (was, now) = (&recorded.params, &configured.params);
    let mut changed = Vec::new();

    if recorded.admin != configured.admin {
        changed.push(format!("admin {} -> {}", recorded.admin, configured.admin));
    }
    if recorded.reserve != configured.reserve {
        changed.push(format!("reserve {} -> {}", recorded.reserve, configured.reserve));
    }
    if was.max_supply != now.max_supply {
        changed.push(format!("max_supply {} -> {}", was.max_supply, now.max_supply));
    }
    if was.claim_amount != now.claim_amount {
        changed.push(format!("claim_amount {} -> {}", was.claim_amount, now.claim_amount));
    }
    if was.cooldown_secs != now.cooldown_secs {
        changed.push(format!("cooldown_secs {} -> {}", was.cooldown_secs, now.cooldown_secs));
    }
    if was.lifetime_claim_limit != now.lifetime_claim_limit {
        changed.push(format!(
            "lifetime_claim_limit {} -> {}",
            was.lifetime_claim_limit, now.lifetime_claim_limit
        ));
    }

    if changed.is_empty() {
        return Ok(());
    }
    Err(FaucetError::InvalidConfig(format!(
        "configuration differs from the genesis recorded in the store: {}",
        changed.join(", ")
    )))
}

/// Per-account view served to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountView {
    pub address: Address,
    pub balance: u128,
    pub remaining_allowance: u128,
    pub last_claim_at: Option<Timestamp>,
    pub claim_count: u32,
    pub can_claim: bool,
    /// `None` once the lifetime cap is reached
    pub seconds_until_eligible: Option<u64>,
    pub eligibility: Eligibility,
}

/// Faucet status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaucetStatus {
    pub admin: Address,
    pub reserve: Address,
    pub paused: bool,
    pub reserve_balance: u128,
    pub total_issued: u128,
    pub max_supply: u128,
    pub claimants: usize,
    pub params: FaucetParams,
    pub statistics: Option<FaucetStatistics>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::ClaimRecord;

    const ADMIN: Address = Address::repeat_byte(0xaa);
    const RESERVE: Address = Address::repeat_byte(0xfa);
    const USER: Address = Address::repeat_byte(0x01);

    fn params() -> FaucetParams {
        FaucetParams {
            max_supply: 1_000_000,
            claim_amount: 100,
            cooldown_secs: 60,
            lifetime_claim_limit: 5,
        }
    }

    fn plan() -> GenesisPlan {
        GenesisPlan {
            admin: ADMIN,
            deployer: ADMIN,
            reserve: RESERVE,
            genesis_mint: 1_000_000,
            reserve_seed: 10_000,
        }
    }

    #[tokio::test]
    async fn test_claim_moves_reserve_funds() {
        let service = FaucetService::genesis(params(), &plan()).unwrap();
        let claimed = service.request_tokens(USER, 1_000).await.unwrap();

        assert_eq!(claimed, TokensClaimed { account: USER, amount: 100, timestamp: 1_000 });
        assert_eq!(service.balance_of(&USER).await, 100);
        assert_eq!(service.reserve_balance().await, 9_900);
        assert_eq!(service.total_issued().await, 1_000_000);
        assert_eq!(service.last_claim_at(&USER).await, Some(1_000));
    }

    #[tokio::test]
    async fn test_reserve_and_zero_address_cannot_claim() {
        let service = FaucetService::genesis(params(), &plan()).unwrap();
        assert!(matches!(
            service.request_tokens(RESERVE, 0).await,
            Err(FaucetError::InvalidAddress(_))
        ));
        assert!(matches!(
            service.request_tokens(Address::ZERO, 0).await,
            Err(FaucetError::InvalidAddress(_))
        ));
        assert_eq!(service.reserve_balance().await, 10_000);
    }

    #[tokio::test]
    async fn test_pause_is_checked_first() {
        let service = FaucetService::genesis(params(), &plan()).unwrap();
        service.request_tokens(USER, 0).await.unwrap();
        service.set_paused(&ADMIN, true).await.unwrap();

        // In cooldown as well, but the pause is reported.
        assert!(matches!(service.request_tokens(USER, 1).await, Err(FaucetError::Paused)));
        assert!(!service.can_claim(&USER, 1_000).await);
    }

    #[tokio::test]
    async fn test_empty_reserve() {
        let plan = GenesisPlan { reserve_seed: 150, ..plan() };
        let service = FaucetService::genesis(params(), &plan).unwrap();
        service.request_tokens(USER, 0).await.unwrap();

        let other = Address::repeat_byte(0x02);
        assert!(matches!(
            service.request_tokens(other, 0).await,
            Err(FaucetError::InsufficientReserve)
        ));
        assert_eq!(service.claim_count(&other).await, 0);
        assert_eq!(service.reserve_balance().await, 50);
    }

    #[tokio::test]
    async fn test_account_view() {
        let service = FaucetService::genesis(params(), &plan()).unwrap();
        service.request_tokens(USER, 1_000).await.unwrap();

        let view = service.account_view(&USER, 1_030).await;
        assert_eq!(view.balance, 100);
        assert_eq!(view.remaining_allowance, 400);
        assert_eq!(view.claim_count, 1);
        assert!(!view.can_claim);
        assert_eq!(view.seconds_until_eligible, Some(30));
        assert_eq!(view.eligibility, Eligibility::CooldownActive { seconds_remaining: 30 });
    }

    #[tokio::test]
    async fn test_events_follow_commits() {
        let service = FaucetService::genesis(params(), &plan()).unwrap();
        let mut events = service.subscribe();

        service.request_tokens(USER, 5).await.unwrap();
        let _ = service.request_tokens(USER, 6).await;
        service.set_paused(&ADMIN, true).await.unwrap();

        assert_eq!(
            events.recv().await,
            Some(FaucetEvent::TokensClaimed(TokensClaimed { account: USER, amount: 100, timestamp: 5 }))
        );
        // The rejected claim emitted nothing.
        assert_eq!(
            events.recv().await,
            Some(FaucetEvent::PauseChanged { paused: true, by: ADMIN })
        );
    }

    #[tokio::test]
    async fn test_genesis_rejects_seed_above_mint() {
        let plan = GenesisPlan { genesis_mint: 100, reserve_seed: 200, ..plan() };
        assert!(matches!(
            FaucetService::genesis(params(), &plan),
            Err(FaucetError::InsufficientBalance { .. })
        ));
    }

    fn stray_commit(account: Address, count: u32, timestamp: Timestamp) -> ClaimCommit {
        ClaimCommit {
            account,
            account_balance: 100 * count as u128,
            reserve: RESERVE,
            reserve_balance: 9_000,
            record: ClaimRecord {
                last_claim_at: Some(timestamp),
                claim_count: count,
            },
            amount: 100,
            timestamp,
        }
    }

    #[tokio::test]
    async fn test_failed_commit_rolls_back_claim() {
        let store = ClaimStore::temporary().unwrap();
        let service = FaucetService::bootstrap(params(), &plan(), store, 16).unwrap();
        service.request_tokens(USER, 1_000).await.unwrap();

        // Claims written behind the service's back make the store refuse the next commits.
        let other = Address::repeat_byte(0x02);
        let store = service.store.as_ref().unwrap();
        store.commit_claim(&stray_commit(USER, 2, 1_030)).unwrap();
        store.commit_claim(&stray_commit(other, 1, 1_030)).unwrap();

        let mut events = service.subscribe();

        let result = service.request_tokens(USER, 2_000).await;
        assert!(matches!(result, Err(FaucetError::InternalError(_))));
        assert_eq!(service.balance_of(&USER).await, 100);
        assert_eq!(service.claim_count(&USER).await, 1);
        assert_eq!(service.last_claim_at(&USER).await, Some(1_000));

        // First-ever claim: the record must disappear again, not linger at zero.
        let result = service.request_tokens(other, 2_000).await;
        assert!(matches!(result, Err(FaucetError::InternalError(_))));
        assert_eq!(service.balance_of(&other).await, 0);
        assert_eq!(service.claim_count(&other).await, 0);
        assert_eq!(service.last_claim_at(&other).await, None);
        assert_eq!(service.check_eligible(&other, 2_000).await, Eligibility::Eligible);

        assert_eq!(service.reserve_balance().await, 9_900);
        assert_eq!(service.total_issued().await, 1_000_000);
        assert_eq!(service.status().await.unwrap().claimants, 1);
        assert!(events.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_dispense_receipt() {
        let service = FaucetService::genesis(params(), &plan()).unwrap();
        let receipt = service.dispense(USER, 10).await.unwrap();

        assert_eq!(receipt.claimed.amount, 100);
        assert_eq!(receipt.remaining_allowance, 400);
        assert_eq!(receipt.reserve_balance, 9_900);
    }

    #[test]
    fn test_genesis_mismatch_lists_changes() {
        let recorded = plan().record(params());
        assert!(ensure_same_genesis(&recorded, &recorded).is_ok());

        let configured = GenesisPlan { admin: USER, ..plan() }.record(FaucetParams {
            lifetime_claim_limit: 6,
            ..params()
        });
        match ensure_same_genesis(&recorded, &configured) {
            Err(FaucetError::InvalidConfig(msg)) => {
                assert!(msg.contains("admin"));
                assert!(msg.contains("lifetime_claim_limit 5 -> 6"));
                assert!(!msg.contains("reserve"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_status_without_store() {
        let service = FaucetService::genesis(params(), &plan()).unwrap();
        service.request_tokens(USER, 0).await.unwrap();

        let status = service.status().await.unwrap();
        assert_eq!(status.claimants, 1);
        assert_eq!(status.reserve_balance, 9_900);
        assert_eq!(status.max_supply, 1_000_000);
        assert!(status.statistics.is_none());
        assert!(service.history(&USER).unwrap().is_empty());
        assert!(service.recent_distributions(10).unwrap().is_empty());
    }
}
