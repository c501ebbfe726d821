//! In-process stand-ins for the chain, the wallet and the rewards API.

use crate::amount::Amount;
use crate::balance::Balance;
use crate::client::{
    AccountAddress, ContractAddress, LedgerClient, Operation, TxResult, WalletClient,
};
use crate::error::{AppError, Result};
use crate::fee::Fee;
use crate::ledger::{ensure_recordable, MigrationLedger};
use crate::registry::{Pool, PoolRegistry, RegistryStatus, TokenInfo};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

pub const USER: &str = "secret1user";
pub const SEFI_TOKEN: &str = "secret1sefi";

pub fn sefi_pool(address: &str) -> Pool {
    Pool {
        pool_address: ContractAddress::new(address),
        rewards_token: TokenInfo {
            address: ContractAddress::new(SEFI_TOKEN),
            symbol: "SEFI".to_string(),
            decimals: 6,
        },
        staked_token: None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub contract: ContractAddress,
    pub operation: Operation,
    pub fee: Fee,
}

#[derive(Default)]
struct ChainState {
    /// Staked balance of the single test account per pool contract.
    balances: HashMap<String, Amount>,
    /// Claimable rewards per pool contract.
    rewards: HashMap<String, Amount>,
    unauthorized: HashSet<String>,
    failing_contracts: HashSet<String>,
    fail_queries_after_submit: bool,
    submissions: Vec<Submission>,
    suggestions: Vec<ContractAddress>,
    reject_next: Option<String>,
    balance_queries: usize,
    no_grant: bool,
    fail_queries: bool,
    fail_submissions: bool,
    fail_suggestions: bool,
}

impl ChainState {
    fn authorized_read(
        &self,
        account: &AccountAddress,
        contract: &ContractAddress,
        table: impl Fn(&Self) -> &HashMap<String, Amount>,
    ) -> Result<Balance> {
        if self.fail_queries || self.failing_contracts.contains(contract.as_str()) {
            return Err(AppError::Ledger("query timed out".into()));
        }
        if account.as_str() != USER || self.unauthorized.contains(contract.as_str()) {
            return Ok(Balance::Unauthorized);
        }
        Ok(Balance::Known(
            table(self).get(contract.as_str()).copied().unwrap_or(0),
        ))
    }
}

/// Ledger client and wallet sharing one fake chain, so that suggesting a
/// token grants the viewing key the ledger then honors.
#[derive(Default)]
pub struct MockChain {
    state: Mutex<ChainState>,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn account() -> AccountAddress {
        AccountAddress::new(USER)
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ChainState> {
        self.state.lock().unwrap()
    }

    pub fn set_balance(&self, contract: &str, amount: Amount) {
        self.state().balances.insert(contract.to_string(), amount);
    }

    pub fn set_rewards(&self, contract: &str, amount: Amount) {
        self.state().rewards.insert(contract.to_string(), amount);
    }

    pub fn rewards(&self, contract: &str) -> Amount {
        self.state().rewards.get(contract).copied().unwrap_or(0)
    }

    pub fn staked(&self, contract: &str) -> Amount {
        self.state().balances.get(contract).copied().unwrap_or(0)
    }

    pub fn revoke(&self, contract: &str) {
        self.state().unauthorized.insert(contract.to_string());
    }

    pub fn set_grant_on_suggest(&self, grant: bool) {
        self.state().no_grant = !grant;
    }

    pub fn reject_next(&self, reason: &str) {
        self.state().reject_next = Some(reason.to_string());
    }

    pub fn fail_queries(&self, fail: bool) {
        self.state().fail_queries = fail;
    }

    /// Queries against `contract` time out; other contracts still answer.
    pub fn fail_queries_for(&self, contract: &str) {
        self.state().failing_contracts.insert(contract.to_string());
    }

    /// Every query fails once the next submission has been accepted.
    pub fn fail_queries_after_submit(&self) {
        self.state().fail_queries_after_submit = true;
    }

    pub fn fail_submissions(&self, fail: bool) {
        self.state().fail_submissions = fail;
    }

    pub fn fail_suggestions(&self, fail: bool) {
        self.state().fail_suggestions = fail;
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.state().submissions.clone()
    }

    pub fn suggestions(&self) -> Vec<ContractAddress> {
        self.state().suggestions.clone()
    }

    pub fn balance_queries(&self) -> usize {
        self.state().balance_queries
    }
}

#[async_trait]
impl LedgerClient for MockChain {
    async fn submit_transaction(
        &self,
        contract: &ContractAddress,
        operation: &Operation,
        fee: &Fee,
    ) -> Result<TxResult> {
        let mut state = self.state();
        if state.fail_submissions {
            return Err(AppError::Ledger("node unreachable".into()));
        }
        state.submissions.push(Submission {
            contract: contract.clone(),
            operation: operation.clone(),
            fee: *fee,
        });
        if let Some(reason) = state.reject_next.take() {
            return Ok(TxResult::Rejected { reason });
        }

        match operation {
            Operation::Redeem { amount } => {
                let staked = state.balances.entry(contract.to_string()).or_insert(0);
                if *amount > *staked {
                    return Ok(TxResult::Rejected {
                        reason: format!("insufficient funds: redeem {amount}, staked {staked}"),
                    });
                }
                *staked -= amount;
                state.rewards.remove(contract.as_str());
            }
            Operation::Deposit { recipient, amount } => {
                *state.balances.entry(recipient.to_string()).or_insert(0) += amount;
            }
        }

        if state.fail_queries_after_submit {
            state.fail_queries = true;
        }
        let tx_hash = format!("TX{:04}", state.submissions.len());
        Ok(TxResult::Success { tx_hash })
    }

    async fn query_balance(
        &self,
        account: &AccountAddress,
        contract: &ContractAddress,
    ) -> Result<Balance> {
        let mut state = self.state();
        state.balance_queries += 1;
        state.authorized_read(account, contract, |s| &s.balances)
    }

    async fn query_rewards(
        &self,
        account: &AccountAddress,
        contract: &ContractAddress,
    ) -> Result<Balance> {
        self.state()
            .authorized_read(account, contract, |s| &s.rewards)
    }
}

#[async_trait]
impl WalletClient for MockChain {
    async fn suggest_token(&self, _chain_id: &str, contract: &ContractAddress) -> Result<()> {
        let mut state = self.state();
        state.suggestions.push(contract.clone());
        if state.fail_suggestions {
            return Err(AppError::Wallet("request rejected by user".into()));
        }
        if !state.no_grant {
            state.unauthorized.remove(contract.as_str());
        }
        Ok(())
    }

    async fn account(&self, _chain_id: &str) -> Result<AccountAddress> {
        Ok(Self::account())
    }
}

/// Registry with a scripted readiness delay.
pub struct MockRegistry {
    pools: Vec<Pool>,
    pending_checks: AtomicUsize,
    status_checks: AtomicUsize,
    refreshes: AtomicUsize,
}

impl MockRegistry {
    pub fn new(pools: Vec<Pool>) -> Self {
        Self {
            pools,
            pending_checks: AtomicUsize::new(0),
            status_checks: AtomicUsize::new(0),
            refreshes: AtomicUsize::new(0),
        }
    }

    /// Report `Pending` for the next `checks` status calls.
    pub fn stay_pending_for(&self, checks: usize) {
        self.pending_checks.store(checks, Ordering::SeqCst);
    }

    pub fn status_checks(&self) -> usize {
        self.status_checks.load(Ordering::SeqCst)
    }

    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PoolRegistry for MockRegistry {
    fn status(&self) -> RegistryStatus {
        self.status_checks.fetch_add(1, Ordering::SeqCst);
        let pending = self
            .pending_checks
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if pending {
            RegistryStatus::Pending
        } else {
            RegistryStatus::Ready
        }
    }

    async fn refresh(&self) -> Result<()> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn find(&self, address: &ContractAddress) -> Option<Pool> {
        self.pools.iter().find(|p| p.pool_address == *address).cloned()
    }
}

/// Slot kept in memory, with switchable write failures.
#[derive(Default)]
pub struct MemoryLedger {
    slot: Mutex<Option<Amount>>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryLedger {
    pub fn with(amount: Option<Amount>) -> Self {
        Self {
            slot: Mutex::new(amount),
            ..Self::default()
        }
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn write(&self, value: Option<Amount>) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::Io(std::io::Error::other("disk full")));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        *self.slot.lock().unwrap() = value;
        Ok(())
    }
}

impl MigrationLedger for MemoryLedger {
    fn set(&self, amount: Amount) -> Result<()> {
        ensure_recordable(amount)?;
        self.write(Some(amount))
    }

    fn get(&self) -> Result<Option<Amount>> {
        Ok(*self.slot.lock().unwrap())
    }

    fn clear(&self) -> Result<()> {
        self.write(None)
    }
}
