use crate::amount::parse_amount;
use crate::balance::Balance;
use crate::client::{
    AccountAddress, ContractAddress, LedgerClient, Operation, TxResult, WalletClient,
};
use crate::error::{AppError, Result};
use crate::fee::{Fee, FEE_DENOM};
use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use url::Url;

/// Hook message a pool runs when it receives tokens through `send`.
const DEPOSIT_HOOK: &str = r#"{"deposit":{}}"#;

/// REST client for the local signing gateway, which fronts both the wallet
/// (keys, viewing keys) and the chain (encrypted queries, broadcast).
pub struct GatewayClient {
    base_url: String,
    http: Client,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    #[serde(default)]
    amount: Option<String>,
    #[serde(default)]
    viewing_key_error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct BroadcastResponse {
    #[serde(default)]
    txhash: String,
    #[serde(default)]
    code: u32,
    #[serde(default)]
    raw_log: String,
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    address: String,
}

/// First 200 bytes of a response body, cut on a char boundary.
pub(crate) fn snippet(body: &str) -> &str {
    let end = body
        .char_indices()
        .map(|(i, c)| i + c.len_utf8())
        .take_while(|end| *end <= 200)
        .last()
        .unwrap_or(0);
    &body[..end]
}

/// SNIP-20 style execute message for `operation`.
pub fn execute_msg(operation: &Operation) -> Value {
    match operation {
        Operation::Redeem { amount } => json!({
            "redeem": { "amount": amount.to_string() }
        }),
        Operation::Deposit { recipient, amount } => json!({
            "send": {
                "recipient": recipient.as_str(),
                "amount": amount.to_string(),
                "msg": base64::engine::general_purpose::STANDARD.encode(DEPOSIT_HOOK),
            }
        }),
    }
}

/// Standard fee object as the chain expects it.
pub fn fee_json(fee: &Fee) -> Value {
    json!({
        "amount": [{ "amount": fee.amount.to_string(), "denom": FEE_DENOM }],
        "gas": fee.gas.to_string(),
    })
}

impl GatewayClient {
    pub fn new(base_url: &Url) -> Self {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
            http,
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/v1{}", self.base_url, path)
    }

    /// GET an amount that needs a viewing key to read.
    async fn authorized_query(&self, path: &str) -> Result<Balance> {
        let resp = self
            .http
            .get(self.api_url(path))
            .send()
            .await
            .map_err(|e| AppError::Ledger(format!("Gateway request failed: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| AppError::Ledger(format!("Failed to read response: {e}")))?;
        balance_from_response(status, &body)
    }

    async fn error_body(resp: reqwest::Response) -> String {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        format!("gateway returned {status}: {}", snippet(&body))
    }
}

/// Interpret a balance or rewards query answer. Missing viewing keys come back
/// either as 401/403 or as a SNIP-20 `viewing_key_error` body.
fn balance_from_response(status: StatusCode, body: &str) -> Result<Balance> {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Ok(Balance::Unauthorized);
    }
    if !status.is_success() {
        return Err(AppError::Ledger(format!(
            "balance query returned {status}: {}",
            snippet(body)
        )));
    }

    let parsed: BalanceResponse = serde_json::from_str(body)
        .map_err(|e| AppError::Ledger(format!("Failed to parse balance: {e}")))?;
    if parsed.viewing_key_error.is_some() {
        return Ok(Balance::Unauthorized);
    }
    match parsed.amount {
        Some(amount) => Ok(Balance::Known(parse_amount(&amount)?)),
        None => Err(AppError::Ledger("balance response without amount".into())),
    }
}

fn tx_result_from_broadcast(resp: BroadcastResponse) -> TxResult {
    if resp.code == 0 {
        TxResult::Success {
            tx_hash: resp.txhash,
        }
    } else {
        TxResult::Rejected {
            reason: if resp.raw_log.is_empty() {
                format!("transaction failed with code {}", resp.code)
            } else {
                resp.raw_log
            },
        }
    }
}

#[async_trait]
impl LedgerClient for GatewayClient {
    async fn submit_transaction(
        &self,
        contract: &ContractAddress,
        operation: &Operation,
        fee: &Fee,
    ) -> Result<TxResult> {
        tracing::info!("Submitting {} to {contract} with {} gas", operation.name(), fee.gas);
        let resp = self
            .http
            .post(self.api_url(&format!("/contracts/{contract}/execute")))
            .json(&json!({ "msg": execute_msg(operation), "fee": fee_json(fee) }))
            .send()
            .await
            .map_err(|e| AppError::Ledger(format!("Gateway request failed: {e}")))?;

        // the gateway answers 4xx when the user declines signing
        if !resp.status().is_success() {
            return Ok(TxResult::Rejected {
                reason: Self::error_body(resp).await,
            });
        }

        let broadcast = resp
            .json::<BroadcastResponse>()
            .await
            .map_err(|e| AppError::Ledger(format!("Failed to parse broadcast result: {e}")))?;
        Ok(tx_result_from_broadcast(broadcast))
    }

    async fn query_balance(
        &self,
        account: &AccountAddress,
        contract: &ContractAddress,
    ) -> Result<Balance> {
        self.authorized_query(&format!("/accounts/{account}/balances/{contract}"))
            .await
    }

    async fn query_rewards(
        &self,
        account: &AccountAddress,
        contract: &ContractAddress,
    ) -> Result<Balance> {
        self.authorized_query(&format!("/accounts/{account}/rewards/{contract}"))
            .await
    }
}

#[async_trait]
impl WalletClient for GatewayClient {
    async fn suggest_token(&self, chain_id: &str, contract: &ContractAddress) -> Result<()> {
        let resp = self
            .http
            .post(self.api_url("/wallet/suggest-token"))
            .json(&json!({ "chain_id": chain_id, "contract_address": contract.as_str() }))
            .send()
            .await
            .map_err(|e| AppError::Wallet(format!("Gateway request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(AppError::Wallet(Self::error_body(resp).await));
        }
        Ok(())
    }

    async fn account(&self, chain_id: &str) -> Result<AccountAddress> {
        let resp = self
            .http
            .get(self.api_url("/wallet/account"))
            .query(&[("chain_id", chain_id)])
            .send()
            .await
            .map_err(|e| AppError::Wallet(format!("Gateway request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(AppError::Wallet(Self::error_body(resp).await));
        }

        let account = resp
            .json::<AccountResponse>()
            .await
            .map_err(|e| AppError::Wallet(format!("Failed to parse account: {e}")))?;
        Ok(AccountAddress::new(account.address))
    }
}
