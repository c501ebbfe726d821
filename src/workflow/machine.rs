//! Pure decisions of the migration saga: which actions are permitted, what
//! a transition submits, and what the slot holds after it confirms.

use crate::amount::Amount;
use crate::balance::Balance;
use serde::{Deserialize, Serialize};

/// Derived from the slot and the old pool balance, never stored. `None` for
/// an old balance means the query failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationPhase {
    /// Nothing pending, funds still in the old pool.
    Ready,
    /// Funds withdrawn, deposit outstanding.
    AwaitingDeposit,
    /// Nothing pending and the old pool is empty.
    Drained,
    /// Nothing pending and the old pool balance cannot be read.
    Locked,
}

impl MigrationPhase {
    pub fn derive(record: Option<Amount>, old_balance: Option<Balance>) -> Option<Self> {
        match (record, old_balance) {
            (Some(_), _) => Some(Self::AwaitingDeposit),
            (None, None) => None,
            (None, Some(Balance::Unauthorized)) => Some(Self::Locked),
            (None, Some(Balance::Known(0))) => Some(Self::Drained),
            (None, Some(Balance::Known(_))) => Some(Self::Ready),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actions {
    pub withdraw: bool,
    pub deposit: bool,
}

/// Withdraw needs a readable, positive old balance; deposit needs the slot.
/// With neither balance readable both stay off until viewing keys exist.
/// A balance that failed to load (`None`) only blocks withdraw.
pub fn permitted_actions(
    record: Option<Amount>,
    old_balance: Option<Balance>,
    new_balance: Option<Balance>,
) -> Actions {
    if old_balance == Some(Balance::Unauthorized) && new_balance == Some(Balance::Unauthorized) {
        return Actions::default();
    }
    Actions {
        withdraw: old_balance.is_some_and(|b| b.is_positive()),
        deposit: record.is_some(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WithdrawPlan {
    /// Redeem the whole old pool balance.
    Redeem { amount: Amount },
    NothingToWithdraw,
    /// Still unreadable after the one registration attempt.
    NeedsViewingKey,
}

pub fn plan_withdraw(old_balance: Balance) -> WithdrawPlan {
    match old_balance {
        Balance::Known(0) => WithdrawPlan::NothingToWithdraw,
        Balance::Known(amount) => WithdrawPlan::Redeem { amount },
        Balance::Unauthorized => WithdrawPlan::NeedsViewingKey,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepositPlan {
    Deposit { amount: Amount },
    /// Stale trigger; nothing is submitted and nothing is reported.
    NoPendingRecord,
}

pub fn plan_deposit(record: Option<Amount>) -> DepositPlan {
    match record {
        Some(amount) => DepositPlan::Deposit { amount },
        None => DepositPlan::NoPendingRecord,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordUpdate {
    Set(Amount),
    Clear,
}

/// Slot contents once a redeem of `withdrawn` has confirmed. The slot is
/// overwritten with the withdrawn balance, whatever it held before.
pub fn after_withdraw(withdrawn: Amount) -> RecordUpdate {
    RecordUpdate::Set(withdrawn)
}

pub fn after_deposit() -> RecordUpdate {
    RecordUpdate::Clear
}
