use crate::amount::Amount;
use crate::client::{AccountAddress, ContractAddress, LedgerClient, WalletClient};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Result of an authorized balance query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "amount", rename_all = "snake_case")]
pub enum Balance {
    Known(Amount),
    /// The account holds no viewing credential for the contract. Not zero.
    Unauthorized,
}

impl Balance {
    pub fn known(&self) -> Option<Amount> {
        match self {
            Self::Known(amount) => Some(*amount),
            Self::Unauthorized => None,
        }
    }

    pub fn is_positive(&self) -> bool {
        matches!(self, Self::Known(amount) if *amount > 0)
    }
}

/// Balance queries with the viewing-key recovery path.
pub struct BalanceProbe {
    client: Arc<dyn LedgerClient>,
    wallet: Arc<dyn WalletClient>,
    chain_id: String,
}

impl BalanceProbe {
    pub fn new(
        client: Arc<dyn LedgerClient>,
        wallet: Arc<dyn WalletClient>,
        chain_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            wallet,
            chain_id: chain_id.into(),
        }
    }

    /// Single authorized query; transient client failures propagate as errors.
    pub async fn get_balance(
        &self,
        account: &AccountAddress,
        contract: &ContractAddress,
    ) -> Result<Balance> {
        let balance = self.client.query_balance(account, contract).await?;
        tracing::debug!("Balance of {account} in {contract}: {balance:?}");
        Ok(balance)
    }

    /// Query, and on `Unauthorized` ask the wallet for a viewing credential
    /// once and query once more. The second answer is final.
    pub async fn get_balance_or_register(
        &self,
        account: &AccountAddress,
        contract: &ContractAddress,
    ) -> Result<Balance> {
        match self.get_balance(account, contract).await? {
            Balance::Unauthorized => {
                tracing::warn!("No viewing key for {contract}, requesting one from the wallet");
                self.wallet.suggest_token(&self.chain_id, contract).await?;
                self.get_balance(account, contract).await
            }
            known => Ok(known),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::testing::MockChain;

    fn probe(chain: &Arc<MockChain>) -> BalanceProbe {
        BalanceProbe::new(chain.clone(), chain.clone(), "secret-4")
    }

    #[tokio::test]
    async fn test_unauthorized_is_not_zero() {
        let chain = Arc::new(MockChain::new());
        chain.set_balance("secret1old", 0);
        chain.revoke("secret1old");

        let balance = probe(&chain)
            .get_balance(&MockChain::account(), &ContractAddress::new("secret1old"))
            .await
            .unwrap();
        assert_eq!(balance, Balance::Unauthorized);
        assert_eq!(balance.known(), None);
        assert!(!balance.is_positive());
    }

    #[tokio::test]
    async fn test_register_then_retry_once() {
        let chain = Arc::new(MockChain::new());
        chain.set_balance("secret1old", 1_200_000);
        chain.revoke("secret1old");

        let balance = probe(&chain)
            .get_balance_or_register(&MockChain::account(), &ContractAddress::new("secret1old"))
            .await
            .unwrap();
        assert_eq!(balance, Balance::Known(1_200_000));
        assert_eq!(chain.suggestions().len(), 1);
        assert_eq!(chain.balance_queries(), 2);
    }

    #[tokio::test]
    async fn test_register_gives_up_after_one_attempt() {
        let chain = Arc::new(MockChain::new());
        chain.set_balance("secret1old", 1_200_000);
        chain.revoke("secret1old");
        chain.set_grant_on_suggest(false);

        let balance = probe(&chain)
            .get_balance_or_register(&MockChain::account(), &ContractAddress::new("secret1old"))
            .await
            .unwrap();
        assert_eq!(balance, Balance::Unauthorized);
        assert_eq!(chain.suggestions().len(), 1);
        assert_eq!(chain.balance_queries(), 2);
    }

    #[tokio::test]
    async fn test_transient_failure_is_an_error() {
        let chain = Arc::new(MockChain::new());
        chain.set_balance("secret1old", 1_200_000);
        chain.fail_queries(true);

        let err = probe(&chain)
            .get_balance(&MockChain::account(), &ContractAddress::new("secret1old"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Ledger(_)));
    }

    #[tokio::test]
    async fn test_known_balance_skips_wallet() {
        let chain = Arc::new(MockChain::new());
        chain.set_balance("secret1new", 42);

        let balance = probe(&chain)
            .get_balance_or_register(&MockChain::account(), &ContractAddress::new("secret1new"))
            .await
            .unwrap();
        assert_eq!(balance, Balance::Known(42));
        assert!(chain.suggestions().is_empty());
    }
}
