//! Transaction fee budgets.
//!
//! Contracts that run governance proposals charge extra gas per active
//! proposal, so the fee for those contracts tracks the live proposal count.

use crate::amount::Amount;
use crate::client::ContractAddress;
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Denomination fees are paid in.
pub const FEE_DENOM: &str = "uscrt";

/// Fee attached to a single submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fee {
    /// Fee in micro-denomination (`uscrt`).
    pub amount: Amount,
    pub gas: u64,
}

/// Price of one unit of gas in `uscrt`, as an exact fraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasPrice {
    pub numerator: u64,
    pub denominator: u64,
}

impl GasPrice {
    pub fn new(numerator: u64, denominator: u64) -> Result<Self> {
        if denominator == 0 {
            return Err(AppError::Config("gas price denominator must be non-zero".into()));
        }
        Ok(Self {
            numerator,
            denominator,
        })
    }

    /// Fee amount for `gas`, rounded up so the budget never falls short.
    pub fn fee_amount(&self, gas: u64) -> Amount {
        let scaled = u128::from(gas) * u128::from(self.numerator);
        let denominator = u128::from(self.denominator);
        scaled.div_ceil(denominator)
    }
}

impl Default for GasPrice {
    fn default() -> Self {
        Self {
            numerator: 1,
            denominator: 4,
        }
    }
}

impl fmt::Display for GasPrice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// Accepts `"n"` or `"n/d"`.
impl FromStr for GasPrice {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let parse = |part: &str| {
            part.trim()
                .parse::<u64>()
                .map_err(|e| AppError::Config(format!("invalid gas price '{s}': {e}")))
        };
        match s.split_once('/') {
            Some((num, den)) => Self::new(parse(num)?, parse(den)?),
            None => Self::new(parse(s)?, 1),
        }
    }
}

/// Gas budget: `base_gas` plus `proposal_surcharge` for every active proposal.
/// Overflow is rejected rather than wrapped.
pub fn compute_gas(base_gas: u64, active_proposals: u64, proposal_surcharge: u64) -> Result<u64> {
    if active_proposals == 0 {
        return Ok(base_gas);
    }
    proposal_surcharge
        .checked_mul(active_proposals)
        .and_then(|extra| extra.checked_add(base_gas))
        .ok_or_else(|| {
            AppError::FeeOverflow(format!(
                "{base_gas} + {proposal_surcharge} * {active_proposals} does not fit in u64"
            ))
        })
}

pub fn compute_fee(
    base_gas: u64,
    active_proposals: u64,
    proposal_surcharge: u64,
    price: GasPrice,
) -> Result<Fee> {
    let gas = compute_gas(base_gas, active_proposals, proposal_surcharge)?;
    Ok(Fee {
        amount: price.fee_amount(gas),
        gas,
    })
}

/// Fee schedule for the migration contracts. Only `surcharged` pays the
/// per-proposal surcharge.
#[derive(Debug, Clone)]
pub struct FeeEstimator {
    pub base_gas: u64,
    pub proposal_surcharge: u64,
    pub price: GasPrice,
    pub surcharged: ContractAddress,
}

impl FeeEstimator {
    pub fn base_fee(&self) -> Fee {
        Fee {
            amount: self.price.fee_amount(self.base_gas),
            gas: self.base_gas,
        }
    }

    pub fn estimate(&self, contract: &ContractAddress, active_proposals: u64) -> Result<Fee> {
        if *contract != self.surcharged {
            return Ok(self.base_fee());
        }
        compute_fee(
            self.base_gas,
            active_proposals,
            self.proposal_surcharge,
            self.price,
        )
    }
}

/// Keeps the surcharged fee in step with the active proposal count.
///
/// When the count is unavailable, or the recomputation overflows, the last
/// good fee stays in place.
pub struct FeeTracker {
    estimator: FeeEstimator,
    current: watch::Sender<Fee>,
}

impl FeeTracker {
    pub fn new(estimator: FeeEstimator) -> Self {
        let (current, _) = watch::channel(estimator.base_fee());
        Self { estimator, current }
    }

    /// Feed a new proposal count (`None` when it could not be fetched).
    pub fn observe(&self, active_proposals: Option<u64>) {
        let Some(count) = active_proposals else {
            tracing::warn!(
                "Active proposal count unavailable, keeping fee {:?}",
                *self.current.borrow()
            );
            return;
        };

        match self.estimator.estimate(&self.estimator.surcharged, count) {
            Ok(fee) => {
                self.current.send_if_modified(|current| {
                    if *current == fee {
                        return false;
                    }
                    tracing::info!(
                        "Fee for {} now {} gas ({count} active proposals)",
                        self.estimator.surcharged,
                        fee.gas
                    );
                    *current = fee;
                    true
                });
            }
            Err(e) => tracing::warn!("Keeping previous fee: {e}"),
        }
    }

    /// Fee to attach to a submission against `contract`.
    pub fn fee_for(&self, contract: &ContractAddress) -> Fee {
        if *contract == self.estimator.surcharged {
            *self.current.borrow()
        } else {
            self.estimator.base_fee()
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Fee> {
        self.current.subscribe()
    }

    /// Recompute on every change of `counts` until the sender side is dropped.
    pub fn track(self: Arc<Self>, mut counts: watch::Receiver<Option<u64>>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let initial = *counts.borrow_and_update();
            self.observe(initial);
            while counts.changed().await.is_ok() {
                let count = *counts.borrow_and_update();
                self.observe(count);
            }
            tracing::debug!("Proposal count source closed, fee tracking stopped");
        })
    }
}
