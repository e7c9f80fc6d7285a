//! Plain data types shared across the rpc, cluster, and wallet modules.

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::time::Duration;

/// A sliding-window budget: at most `limit` units per `duration_ms`
/// milliseconds. Units are requests for a request budget and response bytes
/// for a data budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateBudget {
    pub limit: u64,
    pub duration_ms: u64,
}

impl RateBudget {
    pub fn new(limit: u64, duration: Duration) -> Self {
        Self {
            limit,
            duration_ms: duration.as_millis() as u64,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

/// One RPC endpoint target. A bare url string converts into a descriptor
/// with no budgets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    pub url: String,
    #[serde(default)]
    pub request_budget: Option<RateBudget>,
    #[serde(default)]
    pub data_budget: Option<RateBudget>,
}

impl EndpointDescriptor {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            request_budget: None,
            data_budget: None,
        }
    }

    pub fn with_budgets(
        url: impl Into<String>,
        request_budget: RateBudget,
        data_budget: RateBudget,
    ) -> Self {
        Self {
            url: url.into(),
            request_budget: Some(request_budget),
            data_budget: Some(data_budget),
        }
    }
}

impl From<&str> for EndpointDescriptor {
    fn from(url: &str) -> Self {
        Self::new(url)
    }
}

/// Authoritative epoch/slot sample as reported by an RPC node.
#[derive(Debug, Clone, Copy, Default)]
pub struct EpochInfo {
    pub epoch: u64,
    pub absolute_slot: u64,
    pub slot_index: u64,
    pub slots_in_epoch: u64,
}

/// Raw account record as fetched over RPC. When a byte-range slice was
/// requested, `data` holds just the slice; `lamports` is always the full
/// account balance.
#[derive(Debug, Clone, Default)]
pub struct AccountData {
    pub lamports: u64,
    pub data: Vec<u8>,
}

/// One SPL token account owned by a wallet, as listed by the token-account
/// scan. `amount` is the raw token amount (no decimal scaling).
#[derive(Debug, Clone)]
pub struct TokenAccountInfo {
    pub pubkey: Pubkey,
    pub mint: Pubkey,
    pub owner: Pubkey,
    pub amount: u64,
    pub initialized: bool,
}

/// Decoded native stake account, reduced to the fields the wallet view
/// needs.
#[derive(Debug, Clone)]
pub struct StakeAccountInfo {
    pub pubkey: Pubkey,
    pub lamports: u64,
    pub withdraw_authority: Pubkey,
    pub lockup_epoch: u64,
    pub lockup_unix_timestamp: i64,
    /// Set when the stake is delegated.
    pub delegated_stake_lamports: Option<u64>,
    pub vote_account: Option<Pubkey>,
}

impl StakeAccountInfo {
    /// A stake with any nonzero lockup component is unusable by the wallet
    /// and is dropped from the merged stake set.
    pub fn is_locked(&self) -> bool {
        self.lockup_epoch != 0 || self.lockup_unix_timestamp != 0
    }
}

/// Extrapolated view of the network clock. `slot` and `unix_timestamp` are
/// linear projections from the last authoritative sample and may regress
/// between calls when a fresher but lower-valued sample lands.
#[derive(Debug, Clone, Copy)]
pub struct ClockReading {
    pub confirmed_epoch: u64,
    pub confirmed_slot: u64,
    pub confirmed_unix_timestamp: i64,
    pub slot: u64,
    pub unix_timestamp: i64,
    /// Percent of the sampled epoch elapsed at `slot`, when the epoch
    /// length is known.
    pub epoch_elapsed_percent: Option<f64>,
}
