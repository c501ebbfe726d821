//! The migration saga coordinator.
//!
//! A withdraw redeems the whole old pool balance and records it in the
//! migration ledger; a later deposit sends the recorded amount into the new
//! pool and clears the record. The record is the only state that survives a
//! restart, so an interrupted migration resumes at the deposit step.

pub mod events;
pub mod machine;

use crate::amount::{format_amount, Amount};
use crate::balance::BalanceProbe;
use crate::balance::Balance;
use crate::client::{
    AccountAddress, ContractAddress, LedgerClient, Operation, TxResult, WalletClient,
};
use crate::config::MigrationConfig;
use crate::error::{AppError, Result};
use crate::fee::{Fee, FeeTracker};
use crate::ledger::MigrationLedger;
use crate::registry::{resolve_pool, wait_until_ready, Pool, PoolRegistry};
use events::{MigrationEvent, MigrationView, Notification, NotificationLevel, PoolReading};
use machine::{
    after_deposit, after_withdraw, plan_deposit, plan_withdraw, DepositPlan, RecordUpdate,
    WithdrawPlan,
};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::Instrument;
use uuid::Uuid;

const EVENT_CAPACITY: usize = 64;

/// Collaborators the workflow drives.
pub struct MigrationDeps {
    pub registry: Arc<dyn PoolRegistry>,
    pub ledger: Arc<dyn MigrationLedger>,
    pub client: Arc<dyn LedgerClient>,
    pub wallet: Arc<dyn WalletClient>,
    pub fees: Arc<FeeTracker>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TransitionOutcome {
    Completed { tx_hash: String, amount: Amount },
    /// Precondition not met; nothing was submitted.
    Skipped { reason: String },
    /// Another transition is in flight.
    Busy,
    Failed { reason: String },
}

pub struct MigrationWorkflow {
    registry: Arc<dyn PoolRegistry>,
    ledger: Arc<dyn MigrationLedger>,
    client: Arc<dyn LedgerClient>,
    wallet: Arc<dyn WalletClient>,
    fees: Arc<FeeTracker>,
    probe: BalanceProbe,
    config: MigrationConfig,
    account: AccountAddress,
    busy: tokio::sync::Mutex<()>,
    view: Mutex<MigrationView>,
    events: broadcast::Sender<MigrationEvent>,
}

impl MigrationWorkflow {
    pub fn new(deps: MigrationDeps, config: MigrationConfig, account: AccountAddress) -> Self {
        let probe = BalanceProbe::new(
            deps.client.clone(),
            deps.wallet.clone(),
            config.chain_id.clone(),
        );
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            registry: deps.registry,
            ledger: deps.ledger,
            client: deps.client,
            wallet: deps.wallet,
            fees: deps.fees,
            probe,
            config,
            account,
            busy: tokio::sync::Mutex::new(()),
            view: Mutex::new(MigrationView::loading()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MigrationEvent> {
        self.events.subscribe()
    }

    /// Last published view.
    pub fn view(&self) -> MigrationView {
        self.view.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn account(&self) -> &AccountAddress {
        &self.account
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Load pool metadata and compute the first view. A pending record from an
    /// earlier session shows up here as an enabled deposit.
    pub async fn mount(&self) -> Result<MigrationView> {
        tracing::info!(
            "Mounting migration from {} to {} for {}",
            self.config.old_pool,
            self.config.new_pool,
            self.account
        );
        if let Err(e) = self.registry.refresh().await {
            tracing::warn!("Initial pool registry load failed: {e}");
        }
        self.refresh().await
    }

    /// Re-read the ledger and both balances and publish the resulting view.
    /// Never asks the wallet for viewing keys. While a transition runs this
    /// only republishes the busy view.
    pub async fn refresh(&self) -> Result<MigrationView> {
        if self.busy.try_lock().is_err() {
            tracing::debug!("Refresh during a transition, keeping controls disabled");
            let view = self.view().busy();
            self.publish_view(view.clone());
            return Ok(view);
        }
        self.reload().await
    }

    /// Only a ledger read failure fails the reload. A pool that cannot be
    /// read shows as unavailable while the record still drives deposit.
    async fn reload(&self) -> Result<MigrationView> {
        let record = self.ledger.get()?;
        let deadline = self.config.registry_timeout();
        if let Err(e) = wait_until_ready(self.registry.as_ref(), deadline).await {
            tracing::warn!("Pool metadata unavailable: {e}");
        }
        let old = self.read_pool(&self.config.old_pool).await;
        let new = self.read_pool(&self.config.new_pool).await;

        let view = MigrationView::build(record, &old, &new);
        self.publish_view(view.clone());
        Ok(view)
    }

    async fn read_pool(&self, address: &ContractAddress) -> PoolReading {
        let token = self.registry.find(address).map(|pool| pool.staked().clone());
        if token.is_none() {
            tracing::warn!("No metadata for pool {address}");
        }
        let balance = self
            .probe
            .get_balance(&self.account, address)
            .await
            .inspect_err(|e| tracing::warn!("Could not read balance in {address}: {e}"))
            .ok();
        PoolReading { balance, token }
    }

    /// Redeem the whole old pool balance and record it as pending.
    pub async fn withdraw(&self) -> TransitionOutcome {
        let Ok(_guard) = self.busy.try_lock() else {
            tracing::debug!("Withdraw ignored, another transition is running");
            return TransitionOutcome::Busy;
        };

        let span = tracing::info_span!("withdraw", transition_id = %Uuid::new_v4());
        async {
            let before = self.begin();
            let outcome = match self.try_withdraw().await {
                Ok(outcome) => outcome,
                Err(e) => self.fail("withdraw", e),
            };
            self.settle(before).await;
            outcome
        }
        .instrument(span)
        .await
    }

    async fn try_withdraw(&self) -> Result<TransitionOutcome> {
        let pool = self.resolve(&self.config.old_pool).await?;
        let balance = self
            .probe
            .get_balance_or_register(&self.account, &pool.pool_address)
            .await?;

        let amount = match plan_withdraw(balance) {
            WithdrawPlan::Redeem { amount } => amount,
            WithdrawPlan::NothingToWithdraw => {
                tracing::info!("Nothing staked in {}, skipping withdraw", pool.pool_address);
                return Ok(TransitionOutcome::Skipped {
                    reason: "nothing staked in the expired pool".into(),
                });
            }
            WithdrawPlan::NeedsViewingKey => {
                return Err(AppError::Unauthorized(pool.pool_address.to_string()));
            }
        };
        tracing::info!("Withdrawing {amount} from {}", pool.pool_address);
        let fee = self.fees.fee_for(&pool.pool_address);
        let tx_hash = self
            .submit(&pool.pool_address, Operation::Redeem { amount }, fee)
            .await?;
        self.apply(after_withdraw(amount), &tx_hash)?;

        let token = pool.staked();
        self.notify(
            NotificationLevel::Success,
            format!(
                "Removed {} s{} from the expired pool",
                format_amount(amount, token.decimals),
                token.symbol
            ),
        );
        Ok(TransitionOutcome::Completed { tx_hash, amount })
    }

    /// Send the pending amount into the new pool and clear the record.
    /// Without a record this is a no-op with no events at all.
    pub async fn deposit(&self) -> TransitionOutcome {
        let Ok(_guard) = self.busy.try_lock() else {
            tracing::debug!("Deposit ignored, another transition is running");
            return TransitionOutcome::Busy;
        };

        let amount = match self.ledger.get().map(plan_deposit) {
            Ok(DepositPlan::Deposit { amount }) => amount,
            Ok(DepositPlan::NoPendingRecord) => {
                tracing::debug!("Deposit triggered without a pending record");
                return TransitionOutcome::Skipped {
                    reason: "no pending migration".into(),
                };
            }
            Err(e) => return self.fail("deposit", e),
        };

        let span = tracing::info_span!("deposit", transition_id = %Uuid::new_v4());
        async {
            let before = self.begin();
            let outcome = match self.try_deposit(amount).await {
                Ok(outcome) => outcome,
                Err(e) => self.fail("deposit", e),
            };
            self.settle(before).await;
            outcome
        }
        .instrument(span)
        .await
    }

    async fn try_deposit(&self, amount: Amount) -> Result<TransitionOutcome> {
        let pool = self.resolve(&self.config.new_pool).await?;
        self.wallet
            .suggest_token(&self.config.chain_id, &pool.pool_address)
            .await?;

        tracing::info!("Depositing {amount} into {}", pool.pool_address);
        let fee = self.fees.fee_for(&pool.pool_address);
        let operation = Operation::Deposit {
            recipient: pool.pool_address.clone(),
            amount,
        };
        let token = pool.staked();
        let tx_hash = self.submit(&token.address, operation, fee).await?;
        self.apply(after_deposit(), &tx_hash)?;

        self.notify(
            NotificationLevel::Success,
            format!(
                "Staked {} s{} in the new pool",
                format_amount(amount, token.decimals),
                token.symbol
            ),
        );
        Ok(TransitionOutcome::Completed { tx_hash, amount })
    }

    /// Claim accrued rewards from `contract` with a zero redeem. Leaves the
    /// migration record alone and submits nothing when there is nothing to claim.
    pub async fn claim(&self, contract: &ContractAddress) -> TransitionOutcome {
        let Ok(_guard) = self.busy.try_lock() else {
            return TransitionOutcome::Busy;
        };

        let span = tracing::info_span!("claim", transition_id = %Uuid::new_v4(), %contract);
        async {
            let before = self.begin();
            let outcome = match self.try_claim(contract).await {
                Ok(outcome) => outcome,
                Err(e) => self.fail("claim", e),
            };
            self.settle(before).await;
            outcome
        }
        .instrument(span)
        .await
    }

    async fn try_claim(&self, contract: &ContractAddress) -> Result<TransitionOutcome> {
        let pool = self.resolve(contract).await?;
        let pending = self
            .client
            .query_rewards(&self.account, &pool.pool_address)
            .await?;
        let rewards = match pending {
            Balance::Known(0) => {
                tracing::info!("No rewards in {}, skipping claim", pool.pool_address);
                return Ok(TransitionOutcome::Skipped {
                    reason: "no rewards to claim".into(),
                });
            }
            Balance::Known(amount) => amount,
            Balance::Unauthorized => {
                return Err(AppError::Unauthorized(pool.pool_address.to_string()));
            }
        };

        let fee = self.fees.fee_for(&pool.pool_address);
        let tx_hash = self
            .submit(&pool.pool_address, Operation::Redeem { amount: 0 }, fee)
            .await?;

        let token = &pool.rewards_token;
        self.notify(
            NotificationLevel::Success,
            format!("Claimed {} {}", format_amount(rewards, token.decimals), token.symbol),
        );
        Ok(TransitionOutcome::Completed {
            tx_hash,
            amount: rewards,
        })
    }

    /// Ask the wallet for a viewing key on `contract`, then refresh.
    pub async fn unlock(&self, contract: &ContractAddress) -> Result<MigrationView> {
        tracing::info!("Requesting viewing key for {contract}");
        self.wallet.suggest_token(&self.config.chain_id, contract).await?;
        self.refresh().await
    }

    async fn resolve(&self, address: &ContractAddress) -> Result<Pool> {
        resolve_pool(self.registry.as_ref(), address, self.config.registry_timeout()).await
    }

    async fn submit(
        &self,
        contract: &ContractAddress,
        operation: Operation,
        fee: Fee,
    ) -> Result<String> {
        match self.client.submit_transaction(contract, &operation, &fee).await? {
            TxResult::Success { tx_hash } => {
                tracing::info!("{} confirmed: {tx_hash}", operation.name());
                Ok(tx_hash)
            }
            TxResult::Rejected { reason } => Err(AppError::Rejected(reason)),
        }
    }

    fn apply(&self, update: RecordUpdate, tx_hash: &str) -> Result<()> {
        let written = match update {
            RecordUpdate::Set(amount) => self.ledger.set(amount),
            RecordUpdate::Clear => self.ledger.clear(),
        };
        written.inspect_err(|e| {
            tracing::error!(
                "{tx_hash} confirmed but the migration record was not updated ({update:?}): {e}"
            );
        })
    }

    /// Publish a busy copy of the current view and return the original.
    fn begin(&self) -> MigrationView {
        let before = self.view();
        self.publish_view(before.busy());
        before
    }

    /// Reload after a transition. If the ledger cannot be read, put the
    /// pre-transition controls back so the user can retry.
    async fn settle(&self, before: MigrationView) {
        if let Err(e) = self.reload().await {
            tracing::warn!("Could not reload migration state: {e}");
            self.publish_view(MigrationView {
                loading: false,
                ..before
            });
        }
    }

    fn fail(&self, action: &str, error: AppError) -> TransitionOutcome {
        let reason = match error {
            AppError::Rejected(reason) => reason,
            other => other.to_string(),
        };
        tracing::warn!("Failed to {action}: {reason}");
        self.notify(NotificationLevel::Error, format!("Failed to {action}: {reason}"));
        TransitionOutcome::Failed { reason }
    }

    fn notify(&self, level: NotificationLevel, message: String) {
        if level == NotificationLevel::Success {
            tracing::info!("{message}");
        }
        let _ = self
            .events
            .send(MigrationEvent::Notification(Notification::new(level, message)));
    }

    fn publish_view(&self, view: MigrationView) {
        *self.view.lock().unwrap_or_else(|e| e.into_inner()) = view.clone();
        let _ = self.events.send(MigrationEvent::StateChanged(view));
    }
}
