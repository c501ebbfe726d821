use crate::amount::{format_amount, format_fixed, Amount};
use crate::balance::Balance;
use crate::registry::TokenInfo;
use crate::workflow::machine::{permitted_actions, MigrationPhase};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fractional digits shown for staked balances
const DISPLAY_DIGITS: u8 = 2;

/// Shown while a balance is loading or unreadable
pub const BALANCE_PLACEHOLDER: &str = "--";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Success,
    Error,
}

/// User-visible message about a finished transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl Notification {
    pub fn new(level: NotificationLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum BalanceDisplay {
    Loading,
    /// No viewing key; deliberately not rendered as zero.
    Unknown,
    /// The last query failed.
    Unavailable,
    Amount(String),
}

impl BalanceDisplay {
    pub fn from_balance(balance: Balance, decimals: u8) -> Self {
        match balance {
            Balance::Known(amount) => Self::Amount(format_fixed(amount, decimals, DISPLAY_DIGITS)),
            Balance::Unauthorized => Self::Unknown,
        }
    }

    pub fn render(&self, symbol: &str) -> String {
        match self {
            Self::Amount(value) => format!("{value} {symbol}"),
            Self::Loading | Self::Unknown | Self::Unavailable => BALANCE_PLACEHOLDER.to_string(),
        }
    }
}

/// One pool as far as a refresh could read it. `None` parts failed to load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolReading {
    pub balance: Option<Balance>,
    /// Staked token of the pool, from the registry.
    pub token: Option<TokenInfo>,
}

impl PoolReading {
    pub fn new(balance: Balance, token: TokenInfo) -> Self {
        Self {
            balance: Some(balance),
            token: Some(token),
        }
    }

    fn display(&self) -> BalanceDisplay {
        match (self.balance, &self.token) {
            (Some(Balance::Unauthorized), _) => BalanceDisplay::Unknown,
            (Some(balance), Some(token)) => BalanceDisplay::from_balance(balance, token.decimals),
            _ => BalanceDisplay::Unavailable,
        }
    }
}

/// Everything the migration screen renders, recomputed after each change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationView {
    pub phase: Option<MigrationPhase>,
    pub old_balance: BalanceDisplay,
    pub new_balance: BalanceDisplay,
    pub symbol: String,
    /// Withdrawn amount awaiting deposit, human-readable. Also `None` while the
    /// token decimals are unknown.
    pub pending_amount: Option<String>,
    pub withdraw_enabled: bool,
    pub deposit_enabled: bool,
    pub loading: bool,
}

impl MigrationView {
    /// Initial state before the first refresh
    pub fn loading() -> Self {
        Self {
            phase: None,
            old_balance: BalanceDisplay::Loading,
            new_balance: BalanceDisplay::Loading,
            symbol: String::new(),
            pending_amount: None,
            withdraw_enabled: false,
            deposit_enabled: false,
            loading: true,
        }
    }

    /// Deposit availability comes from `record` alone, so it survives
    /// balances that failed to load.
    pub fn build(record: Option<Amount>, old: &PoolReading, new: &PoolReading) -> Self {
        let actions = permitted_actions(record, old.balance, new.balance);
        let token = new.token.as_ref().or(old.token.as_ref());
        Self {
            phase: MigrationPhase::derive(record, old.balance),
            old_balance: old.display(),
            new_balance: new.display(),
            symbol: token.map(|t| t.symbol.clone()).unwrap_or_default(),
            pending_amount: record
                .zip(token)
                .map(|(amount, token)| format_amount(amount, token.decimals)),
            withdraw_enabled: actions.withdraw,
            deposit_enabled: actions.deposit,
            loading: false,
        }
    }

    /// Same view with every control disabled while a transition runs.
    pub fn busy(&self) -> Self {
        Self {
            withdraw_enabled: false,
            deposit_enabled: false,
            loading: true,
            ..self.clone()
        }
    }

    pub fn old_pool_label(&self) -> String {
        format!("Staked in old pool: {}", self.old_balance.render(&self.symbol))
    }

    pub fn new_pool_label(&self) -> String {
        format!("Staked in new pool: {}", self.new_balance.render(&self.symbol))
    }
}

/// Pushed to the UI consumer whenever something it shows changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum MigrationEvent {
    Notification(Notification),
    StateChanged(MigrationView),
}
