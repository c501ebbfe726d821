//! Seams to the external collaborators: the ledger client that submits signed
//! transactions and answers authorized balance queries, and the wallet that
//! holds keys and viewing credentials.

use crate::amount::Amount;
use crate::balance::Balance;
use crate::error::Result;
use crate::fee::Fee;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Bech32 address of a contract (pool or token).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContractAddress(String);

impl ContractAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContractAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Bech32 address of the user's account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountAddress(String);

impl AccountAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Contract operation submitted through the ledger client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Withdraw `amount` staked tokens from a rewards pool, collecting pending
    /// rewards on the way. An amount of zero only claims rewards.
    Redeem { amount: Amount },
    /// Send `amount` of a token to the `recipient` pool, triggering its deposit hook.
    Deposit {
        recipient: ContractAddress,
        amount: Amount,
    },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Redeem { .. } => "redeem",
            Self::Deposit { .. } => "deposit",
        }
    }
}

/// Outcome reported by the ledger for a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TxResult {
    Success { tx_hash: String },
    Rejected { reason: String },
}

#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Sign and broadcast `operation` against `contract`.
    ///
    /// `Err` means the submission could not be attempted or its outcome is
    /// unknown; `Ok(TxResult::Rejected)` means the ledger refused it.
    async fn submit_transaction(
        &self,
        contract: &ContractAddress,
        operation: &Operation,
        fee: &Fee,
    ) -> Result<TxResult>;

    /// Authorized balance query. Missing viewing credentials yield
    /// [`Balance::Unauthorized`], never an error and never zero.
    async fn query_balance(
        &self,
        account: &AccountAddress,
        contract: &ContractAddress,
    ) -> Result<Balance>;

    /// Rewards accrued by `account` in the pool `contract`, claimable with a
    /// zero redeem. Same viewing-key rules as [`LedgerClient::query_balance`].
    async fn query_rewards(
        &self,
        account: &AccountAddress,
        contract: &ContractAddress,
    ) -> Result<Balance>;
}

#[async_trait]
pub trait WalletClient: Send + Sync {
    /// Register `contract` with the wallet, creating a viewing credential for it.
    async fn suggest_token(&self, chain_id: &str, contract: &ContractAddress) -> Result<()>;

    /// Address of the account the wallet signs for on `chain_id`.
    async fn account(&self, chain_id: &str) -> Result<AccountAddress>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_addresses_serialize_transparently() {
        let addr = ContractAddress::new("secret1pool");
        assert_eq!(serde_json::to_string(&addr).unwrap(), r#""secret1pool""#);
        let parsed: AccountAddress = serde_json::from_str(r#""secret1user""#).unwrap();
        assert_eq!(parsed.as_str(), "secret1user");
    }

    #[test]
    fn test_tx_result_tagged_by_status() {
        let json = serde_json::to_value(TxResult::Rejected {
            reason: "out of gas".into(),
        })
        .unwrap();
        assert_eq!(json["status"], "rejected");
        assert_eq!(json["reason"], "out of gas");
    }
}
