use crate::client::ContractAddress;
use crate::error::{AppError, Result};
use crate::gateway::snippet;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use url::Url;

/// Fixed sleep between readiness checks.
pub const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Token descriptor, used to render human-readable amounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub address: ContractAddress,
    pub symbol: String,
    pub decimals: u8,
}

/// Rewards pool metadata as published by the rewards API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    pub pool_address: ContractAddress,
    pub rewards_token: TokenInfo,
    /// Token locked in the pool. Omitted when it is the rewards token itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staked_token: Option<TokenInfo>,
}

impl Pool {
    /// Token the staked balance is denominated in and deposits are sent from.
    pub fn staked(&self) -> &TokenInfo {
        self.staked_token.as_ref().unwrap_or(&self.rewards_token)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum RegistryStatus {
    Pending,
    Ready,
    Failed(String),
}

/// Source of pool metadata. Must report `Ready` before `find` is trusted.
#[async_trait]
pub trait PoolRegistry: Send + Sync {
    fn status(&self) -> RegistryStatus;

    /// Re-fetch the pool list.
    async fn refresh(&self) -> Result<()>;

    fn find(&self, address: &ContractAddress) -> Option<Pool>;
}

/// Sleep-and-recheck until the registry leaves `Pending`, giving up after `deadline`.
pub async fn wait_until_ready(registry: &dyn PoolRegistry, deadline: Duration) -> Result<()> {
    let started = Instant::now();
    let mut announced = false;
    loop {
        match registry.status() {
            RegistryStatus::Ready => return Ok(()),
            RegistryStatus::Failed(reason) => {
                return Err(AppError::DependencyNotReady(format!(
                    "pool registry failed to load: {reason}"
                )))
            }
            RegistryStatus::Pending => {}
        }

        if started.elapsed() >= deadline {
            tracing::error!("Pool registry still pending after {deadline:?}, aborting");
            return Err(AppError::DependencyNotReady(format!(
                "pool registry not ready after {}s",
                deadline.as_secs()
            )));
        }
        if !announced {
            tracing::info!("Waiting for pool registry to load");
            announced = true;
        }
        tokio::time::sleep(READY_POLL_INTERVAL).await;
    }
}

/// Wait for readiness, then look `address` up.
pub async fn resolve_pool(
    registry: &dyn PoolRegistry,
    address: &ContractAddress,
    deadline: Duration,
) -> Result<Pool> {
    wait_until_ready(registry, deadline).await?;
    registry
        .find(address)
        .ok_or_else(|| AppError::PoolNotFound(address.to_string()))
}

/// Refresh `registry` every `interval` until the handle is aborted.
pub fn spawn_registry_polling(
    registry: Arc<dyn PoolRegistry>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = registry.refresh().await {
                tracing::warn!("Pool registry refresh failed: {e}");
            }
        }
    })
}

struct RegistryState {
    status: RegistryStatus,
    pools: Vec<Pool>,
}

/// Pool registry backed by the rewards REST API.
pub struct HttpPoolRegistry {
    url: Url,
    http: Client,
    state: RwLock<RegistryState>,
}

impl HttpPoolRegistry {
    pub fn new(url: Url) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            url,
            http,
            state: RwLock::new(RegistryState {
                status: RegistryStatus::Pending,
                pools: Vec::new(),
            }),
        }
    }

    async fn fetch_pools(&self) -> Result<Vec<Pool>> {
        let resp = self
            .http
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("Rewards API request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::Internal(format!(
                "Rewards API returned {status}: {}",
                snippet(&body)
            )));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to read response: {e}")))?;
        parse_pools(&body)
    }

    fn apply(&self, fetched: Result<Vec<Pool>>) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        match fetched {
            Ok(pools) => {
                tracing::debug!("Pool registry loaded {} pools", pools.len());
                state.pools = pools;
                state.status = RegistryStatus::Ready;
                Ok(())
            }
            Err(e) => {
                // pool metadata is immutable, a previous load stays usable
                if state.status != RegistryStatus::Ready {
                    state.status = RegistryStatus::Failed(e.to_string());
                }
                Err(e)
            }
        }
    }
}

/// The API answers either a bare list or `{"data": [...]}`.
pub fn parse_pools(body: &str) -> Result<Vec<Pool>> {
    if let Ok(pools) = serde_json::from_str::<Vec<Pool>>(body) {
        return Ok(pools);
    }

    #[derive(Deserialize)]
    struct DataResponse {
        data: Vec<Pool>,
    }
    if let Ok(resp) = serde_json::from_str::<DataResponse>(body) {
        return Ok(resp.data);
    }

    Err(AppError::Internal(format!(
        "Unexpected rewards response format: {}",
        snippet(body)
    )))
}

#[async_trait]
impl PoolRegistry for HttpPoolRegistry {
    fn status(&self) -> RegistryStatus {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .status
            .clone()
    }

    async fn refresh(&self) -> Result<()> {
        let fetched = self.fetch_pools().await;
        self.apply(fetched)
    }

    fn find(&self, address: &ContractAddress) -> Option<Pool> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        if state.status != RegistryStatus::Ready {
            return None;
        }
        state
            .pools
            .iter()
            .find(|p| p.pool_address == *address)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sefi_pool, MockRegistry};

    const POOLS_JSON: &str = r#"[
        {"pool_address": "secret1old", "rewards_token": {"address": "secret1sefi", "symbol": "SEFI", "decimals": 6}, "total_locked": "10"},
        {"pool_address": "secret1new", "rewards_token": {"address": "secret1sefi", "symbol": "SEFI", "decimals": 6}}
    ]"#;

    fn http_registry() -> HttpPoolRegistry {
        HttpPoolRegistry::new(Url::parse("http://127.0.0.1:9/rewards").unwrap())
    }

    #[test]
    fn test_parse_pools_bare_list() {
        let pools = parse_pools(POOLS_JSON).unwrap();
        assert_eq!(pools.len(), 2);
        assert_eq!(pools[0].pool_address.as_str(), "secret1old");
        assert_eq!(pools[1].rewards_token.decimals, 6);
    }

    #[test]
    fn test_staked_token_defaults_to_rewards_token() {
        let pools = parse_pools(POOLS_JSON).unwrap();
        assert!(pools[0].staked_token.is_none());
        assert_eq!(pools[0].staked().symbol, "SEFI");

        let lp = parse_pools(
            r#"[{"pool_address": "secret1lp",
                 "rewards_token": {"address": "secret1sefi", "symbol": "SEFI", "decimals": 6},
                 "staked_token": {"address": "secret1lptoken", "symbol": "LP-SEFI-SSCRT", "decimals": 6}}]"#,
        )
        .unwrap();
        assert_eq!(lp[0].staked().address.as_str(), "secret1lptoken");
        assert_eq!(lp[0].rewards_token.symbol, "SEFI");
    }

    #[test]
    fn test_parse_pools_data_envelope() {
        let body = format!(r#"{{"data": {POOLS_JSON}}}"#);
        assert_eq!(parse_pools(&body).unwrap().len(), 2);
    }

    #[test]
    fn test_parse_pools_rejects_unknown_shape() {
        assert!(parse_pools(r#"{"pools": 3}"#).is_err());
    }

    #[test]
    fn test_http_registry_starts_pending_and_hides_pools() {
        let registry = http_registry();
        assert_eq!(registry.status(), RegistryStatus::Pending);
        assert!(registry.find(&ContractAddress::new("secret1old")).is_none());
    }

    #[test]
    fn test_failed_first_load_reports_failure() {
        let registry = http_registry();
        let _ = registry.apply(Err(AppError::Internal("connection refused".into())));
        assert!(matches!(registry.status(), RegistryStatus::Failed(_)));
    }

    #[test]
    fn test_failed_reload_keeps_previous_pools() {
        let registry = http_registry();
        registry.apply(parse_pools(POOLS_JSON)).unwrap();
        assert_eq!(registry.status(), RegistryStatus::Ready);

        let _ = registry.apply(Err(AppError::Internal("timeout".into())));
        assert_eq!(registry.status(), RegistryStatus::Ready);
        assert!(registry.find(&ContractAddress::new("secret1new")).is_some());
    }

    #[tokio::test]
    async fn test_wait_until_ready_polls_through_pending() {
        let registry = MockRegistry::new(vec![sefi_pool("secret1old")]);
        registry.stay_pending_for(3);

        let pool = resolve_pool(
            &registry,
            &ContractAddress::new("secret1old"),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        assert_eq!(pool.rewards_token.symbol, "SEFI");
        assert_eq!(registry.status_checks(), 4);
    }

    #[tokio::test]
    async fn test_wait_until_ready_gives_up() {
        let registry = MockRegistry::new(vec![]);
        registry.stay_pending_for(usize::MAX);

        let err = wait_until_ready(&registry, Duration::from_millis(250))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DependencyNotReady(_)));
    }

    #[tokio::test]
    async fn test_resolve_unknown_pool() {
        let registry = MockRegistry::new(vec![sefi_pool("secret1old")]);
        let err = resolve_pool(
            &registry,
            &ContractAddress::new("secret1other"),
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::PoolNotFound(_)));
    }

    #[tokio::test]
    async fn test_polling_refreshes_registry() {
        let registry = Arc::new(MockRegistry::new(vec![]));
        let handle = spawn_registry_polling(registry.clone(), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(110)).await;
        handle.abort();
        assert!(registry.refreshes() >= 2);
    }
}
