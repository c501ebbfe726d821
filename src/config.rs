use crate::client::ContractAddress;
use crate::error::{AppError, Result};
use crate::fee::{FeeEstimator, GasPrice};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

pub const DEFAULT_BASE_GAS: u64 = 750_000;
pub const DEFAULT_PROPOSAL_SURCHARGE: u64 = 10_000;
pub const DEFAULT_REGISTRY_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_REGISTRY_POLL_SECS: u64 = 20;

/// Environment-provided settings of the migration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Expired rewards pool (`SEFI_STAKING_OLD_CONTRACT`)
    pub old_pool: ContractAddress,
    /// Replacement rewards pool (`SEFI_STAKING_CONTRACT`)
    pub new_pool: ContractAddress,
    pub chain_id: String,
    /// Local signing gateway the ledger client and wallet talk to
    pub gateway_url: Url,
    /// Rewards API listing pool metadata
    pub rewards_api_url: Url,
    #[serde(default = "default_base_gas")]
    pub base_gas: u64,
    #[serde(default = "default_proposal_surcharge")]
    pub proposal_surcharge: u64,
    #[serde(default)]
    pub gas_price: GasPrice,
    #[serde(default = "default_registry_timeout_secs")]
    pub registry_timeout_secs: u64,
    #[serde(default = "default_registry_poll_secs")]
    pub registry_poll_secs: u64,
    #[serde(default)]
    pub ledger_path: Option<PathBuf>,
}

fn default_base_gas() -> u64 {
    DEFAULT_BASE_GAS
}

fn default_proposal_surcharge() -> u64 {
    DEFAULT_PROPOSAL_SURCHARGE
}

fn default_registry_timeout_secs() -> u64 {
    DEFAULT_REGISTRY_TIMEOUT_SECS
}

fn default_registry_poll_secs() -> u64 {
    DEFAULT_REGISTRY_POLL_SECS
}

impl MigrationConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| AppError::Config(format!("{key} is not set")))
        };
        let url = |key: &str| {
            let raw = required(key)?;
            Url::parse(&raw).map_err(|e| AppError::Config(format!("{key}='{raw}': {e}")))
        };
        let number = |key: &str, default: u64| match lookup(key) {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map_err(|e| AppError::Config(format!("{key}='{raw}': {e}"))),
            None => Ok(default),
        };

        let config = Self {
            old_pool: ContractAddress::new(required("SEFI_STAKING_OLD_CONTRACT")?),
            new_pool: ContractAddress::new(required("SEFI_STAKING_CONTRACT")?),
            chain_id: required("CHAIN_ID")?,
            gateway_url: url("MIGRATION_GATEWAY_URL")?,
            rewards_api_url: url("REWARDS_API_URL")?,
            base_gas: number("MIGRATION_BASE_GAS", DEFAULT_BASE_GAS)?,
            proposal_surcharge: number("MIGRATION_PROPOSAL_SURCHARGE", DEFAULT_PROPOSAL_SURCHARGE)?,
            gas_price: match lookup("MIGRATION_GAS_PRICE") {
                Some(raw) => raw.parse()?,
                None => GasPrice::default(),
            },
            registry_timeout_secs: number(
                "MIGRATION_REGISTRY_TIMEOUT_SECS",
                DEFAULT_REGISTRY_TIMEOUT_SECS,
            )?,
            registry_poll_secs: number("MIGRATION_REGISTRY_POLL_SECS", DEFAULT_REGISTRY_POLL_SECS)?,
            ledger_path: lookup("MIGRATION_LEDGER_PATH").map(PathBuf::from),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.old_pool == self.new_pool {
            return Err(AppError::Config(format!(
                "old and new pool are the same contract ({})",
                self.old_pool
            )));
        }
        if self.registry_poll_secs == 0 {
            return Err(AppError::Config("MIGRATION_REGISTRY_POLL_SECS must be positive".into()));
        }
        Ok(())
    }

    /// Deposits into the new pool pay the proposal surcharge.
    pub fn fee_estimator(&self) -> FeeEstimator {
        FeeEstimator {
            base_gas: self.base_gas,
            proposal_surcharge: self.proposal_surcharge,
            price: self.gas_price,
            surcharged: self.new_pool.clone(),
        }
    }

    pub fn registry_timeout(&self) -> Duration {
        Duration::from_secs(self.registry_timeout_secs)
    }

    pub fn registry_poll_interval(&self) -> Duration {
        Duration::from_secs(self.registry_poll_secs)
    }
}
