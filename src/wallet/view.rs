//! Per-wallet derived view: balances, owned entries, bids, and stakes.
//!
//! Wallet address changes are user-driven and can land while a fetch is
//! suspended on the network. Every cached field is therefore versioned by
//! a generation counter bumped on each address change; an in-flight fetch
//! whose captured generation no longer matches on completion discards its
//! result instead of applying it. This is the one hazard in the crate that
//! sequential awaiting does not solve.

use crate::cluster::Cluster;
use crate::config::{ClientConfig, ProgramConfig};
use crate::error::{ClientError, Result};
use crate::keys;
use crate::rpc::EndpointPool;
use crate::types::{AccountData, StakeAccountInfo};
use crate::codec;
use futures::future::join_all;
use solana_sdk::pubkey::Pubkey;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::time::Instant;
use tracing::{debug, instrument};

/// A standing bid, keyed both by entry account and by entry mint.
/// `lamports` is the balance of the bid escrow account, which can exceed
/// the bid itself if lamports were added after bidding.
#[derive(Debug, Clone)]
pub struct BidRecord {
    pub entry_pubkey: Pubkey,
    pub entry_mint: Pubkey,
    pub lamports: u64,
}

/// A stake account usable by the wallet, with how it was discovered.
#[derive(Debug, Clone)]
pub struct StakeRecord {
    pub account: StakeAccountInfo,
    /// True when the stake was reached through an owned entry rather than
    /// (or in addition to) the withdraw-authority scan.
    pub via_entry: bool,
}

pub(crate) struct WalletState {
    pub generation: u64,
    pub pubkey: Option<Pubkey>,
    pub sol_balance: Option<u64>,
    pub balance_fetched_at: Option<Instant>,
    pub ki_balance: u64,
    pub owned_entries: HashSet<Pubkey>,
    pub bids_by_entry: HashMap<Pubkey, BidRecord>,
    pub bids_by_mint: HashMap<Pubkey, BidRecord>,
    pub tokens_fetched_at: Option<Instant>,
    pub stakes: HashMap<Pubkey, StakeRecord>,
    pub stakes_fetched_at: Option<Instant>,
}

impl WalletState {
    fn reset_caches(&mut self) {
        self.sol_balance = None;
        self.balance_fetched_at = None;
        self.ki_balance = 0;
        self.owned_entries = HashSet::new();
        self.bids_by_entry = HashMap::new();
        self.bids_by_mint = HashMap::new();
        self.tokens_fetched_at = None;
        self.stakes = HashMap::new();
        self.stakes_fetched_at = None;
    }
}

pub struct Wallet {
    pub(crate) pool: Arc<EndpointPool>,
    pub(crate) program: Arc<ProgramConfig>,
    pub(crate) config: Arc<ClientConfig>,
    /// Used to resolve stake accounts linked from owned entries.
    pub(crate) cluster: Option<Arc<Cluster>>,
    pub(crate) state: Mutex<WalletState>,
}

impl Wallet {
    pub fn new(
        pool: Arc<EndpointPool>,
        program: Arc<ProgramConfig>,
        config: Arc<ClientConfig>,
        cluster: Option<Arc<Cluster>>,
    ) -> Self {
        Self {
            pool,
            program,
            config,
            cluster,
            state: Mutex::new(WalletState {
                generation: 0,
                pubkey: None,
                sol_balance: None,
                balance_fetched_at: None,
                ki_balance: 0,
                owned_entries: HashSet::new(),
                bids_by_entry: HashMap::new(),
                bids_by_mint: HashMap::new(),
                tokens_fetched_at: None,
                stakes: HashMap::new(),
                stakes_fetched_at: None,
            }),
        }
    }

    /// Switch the active wallet. A no-op when the address is unchanged;
    /// otherwise every cached field resets and the generation advances,
    /// invalidating all in-flight fetches (including transitions to and
    /// from "no wallet").
    pub fn set_address(&self, new_pubkey: Option<Pubkey>) {
        let mut state = self.state.lock().unwrap();
        if state.pubkey == new_pubkey {
            return;
        }
        debug!(?new_pubkey, "wallet address changed; caches reset");
        state.pubkey = new_pubkey;
        state.generation += 1;
        state.reset_caches();
    }

    pub fn address(&self) -> Option<Pubkey> {
        self.state.lock().unwrap().pubkey
    }

    /// Error out if the wallet identity changed since `generation` was
    /// captured.
    pub(crate) fn ensure_generation(&self, generation: u64) -> Result<()> {
        if self.state.lock().unwrap().generation != generation {
            return Err(ClientError::WalletChanged);
        }
        Ok(())
    }

    /// Capture (generation, pubkey) for a guarded flow, failing when no
    /// wallet is selected.
    pub(crate) fn capture_identity(&self) -> Result<(u64, Pubkey)> {
        let state = self.state.lock().unwrap();
        match state.pubkey {
            Some(pubkey) => Ok((state.generation, pubkey)),
            None => Err(ClientError::NoWallet),
        }
    }

    /// Native balance in lamports, refreshed when older than the balance
    /// staleness window. `None` when no wallet is selected or nothing has
    /// been fetched for the current identity yet.
    pub async fn balance(&self) -> Result<Option<u64>> {
        let captured = {
            let state = self.state.lock().unwrap();
            let Some(pubkey) = state.pubkey else {
                return Ok(None);
            };
            let stale = match state.balance_fetched_at {
                None => true,
                Some(at) => at.elapsed() > self.config.balance_staleness,
            };
            stale.then_some((state.generation, pubkey))
        };

        if let Some((generation, pubkey)) = captured {
            let lamports = self
                .pool
                .dispatch(|endpoint| async move { endpoint.get_balance(&pubkey).await })
                .await?;
            let mut state = self.state.lock().unwrap();
            if state.generation == generation {
                state.sol_balance = Some(lamports);
                state.balance_fetched_at = Some(Instant::now());
            }
            // On mismatch the fetched value is dropped; the caches now
            // belong to a different identity.
        }

        Ok(self.state.lock().unwrap().sol_balance)
    }

    /// Balance of the fungible reward token, raw units.
    pub async fn ki_balance(&self) -> Result<u64> {
        self.update_token_data().await?;
        Ok(self.state.lock().unwrap().ki_balance)
    }

    /// Entry accounts owned by this wallet.
    pub async fn entry_pubkeys(&self) -> Result<Vec<Pubkey>> {
        self.update_token_data().await?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .owned_entries
            .iter()
            .copied()
            .collect())
    }

    pub async fn owns_entry(&self, entry_pubkey: &Pubkey) -> Result<bool> {
        self.update_token_data().await?;
        Ok(self.state.lock().unwrap().owned_entries.contains(entry_pubkey))
    }

    /// All standing bids, keyed by entry account.
    pub async fn bids(&self) -> Result<Vec<BidRecord>> {
        self.update_token_data().await?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .bids_by_entry
            .values()
            .cloned()
            .collect())
    }

    /// The wallet's bid on one entry mint, if any.
    pub async fn bid_for_mint(&self, entry_mint: &Pubkey) -> Result<Option<BidRecord>> {
        self.update_token_data().await?;
        Ok(self.state.lock().unwrap().bids_by_mint.get(entry_mint).cloned())
    }

    /// The wallet's bid on one entry account, if any.
    pub async fn bid_for_entry(&self, entry_pubkey: &Pubkey) -> Result<Option<BidRecord>> {
        self.update_token_data().await?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .bids_by_entry
            .get(entry_pubkey)
            .cloned())
    }

    /// Stake accounts usable by this wallet: withdraw-authority matches
    /// plus stakes linked from owned entries, minus anything locked.
    pub async fn stakes(&self) -> Result<Vec<StakeRecord>> {
        self.update_stakes().await?;
        Ok(self.state.lock().unwrap().stakes.values().cloned().collect())
    }

    /// The program admin address, read from the config account.
    pub async fn fetch_admin_pubkey(&self) -> Result<Option<Pubkey>> {
        let config_account = self.program.config_account;
        let result = self
            .pool
            .dispatch(|endpoint| async move {
                endpoint.get_account_slice(&config_account, 4, 32).await
            })
            .await?;
        match result {
            None => Ok(None),
            Some(account) => Ok(Some(codec::pubkey(&account.data, 0)?)),
        }
    }

    /// Refresh the token-derived caches (ki balance, owned entries, bids)
    /// when stale. One listing dispatch, then one classification follow-up
    /// per candidate account, all follow-ups concurrent; the merged result
    /// applies only if the identity is unchanged.
    #[instrument(skip(self))]
    pub(crate) async fn update_token_data(&self) -> Result<()> {
        let captured = {
            let state = self.state.lock().unwrap();
            let Some(pubkey) = state.pubkey else {
                return Ok(());
            };
            let stale = match state.tokens_fetched_at {
                None => true,
                Some(at) => at.elapsed() > self.config.tokens_staleness,
            };
            stale.then_some((state.generation, pubkey))
        };
        let Some((generation, wallet)) = captured else {
            return Ok(());
        };

        let token_program = self.program.spl_token_program;
        let accounts = self
            .pool
            .dispatch(|endpoint| async move {
                endpoint
                    .get_token_accounts_by_owner(&wallet, &token_program)
                    .await
            })
            .await?;

        let mut ki_balance = 0u64;
        let mut bid_marker_tokens = Vec::new();
        let mut candidate_mints = Vec::new();
        for account in accounts {
            if !account.initialized || account.amount == 0 || account.owner != wallet {
                continue;
            }
            if account.mint == self.program.bid_marker_mint {
                bid_marker_tokens.push(account.pubkey);
            } else if account.mint == self.program.ki_mint {
                ki_balance += account.amount;
            } else {
                candidate_mints.push(account.mint);
            }
        }

        let bid_futures = bid_marker_tokens
            .iter()
            .map(|token| self.resolve_bid(*token));
        let mint_futures = candidate_mints.iter().map(|mint| self.classify_mint(*mint));
        let (bid_results, mint_results) =
            futures::join!(join_all(bid_futures), join_all(mint_futures));

        let mut bids_by_entry = HashMap::new();
        let mut bids_by_mint = HashMap::new();
        for result in bid_results {
            if let Some(record) = result? {
                bids_by_mint.insert(record.entry_mint, record.clone());
                bids_by_entry.insert(record.entry_pubkey, record);
            }
        }
        let mut owned_entries = HashSet::new();
        for result in mint_results {
            if let Some(entry_pubkey) = result? {
                owned_entries.insert(entry_pubkey);
            }
        }

        let mut state = self.state.lock().unwrap();
        if state.generation == generation {
            state.ki_balance = ki_balance;
            state.owned_entries = owned_entries;
            state.bids_by_entry = bids_by_entry;
            state.bids_by_mint = bids_by_mint;
            state.tokens_fetched_at = Some(Instant::now());
        }
        Ok(())
    }

    /// A bid marker token account leads to the bid escrow account, whose
    /// data (entry mint at offset 4) identifies the entry bid on.
    async fn resolve_bid(&self, bid_marker_token: Pubkey) -> Result<Option<BidRecord>> {
        let bid_pubkey = keys::derive_bid_address(&self.program.program_id, &bid_marker_token);
        let result = self
            .pool
            .dispatch(|endpoint| async move {
                endpoint.get_account_slice(&bid_pubkey, 4, 32).await
            })
            .await?;
        let Some(account) = result else {
            return Ok(None);
        };
        let entry_mint = codec::pubkey(&account.data, 0)?;
        let entry_pubkey = keys::derive_entry_address(&self.program.program_id, &entry_mint);
        Ok(Some(BidRecord {
            entry_pubkey,
            entry_mint,
            lamports: account.lamports,
        }))
    }

    /// A held NFT is one of this program's entries exactly when the update
    /// authority on its metaplex metadata is the program authority.
    async fn classify_mint(&self, mint: Pubkey) -> Result<Option<Pubkey>> {
        let metadata_pubkey = keys::derive_metadata_address(&mint);
        let result = self
            .pool
            .dispatch(|endpoint| async move { endpoint.get_account(&metadata_pubkey).await })
            .await?;
        let Some(account) = result else {
            return Ok(None);
        };
        let update_authority = codec::pubkey(&account.data, 1)?;
        if update_authority == self.program.authority {
            Ok(Some(keys::derive_entry_address(
                &self.program.program_id,
                &mint,
            )))
        } else {
            Ok(None)
        }
    }

    /// Refresh the stake map when stale: one filtered program scan by
    /// withdraw authority, plus individual fetches of stakes linked from
    /// owned entries, merged by stake address. Locked stakes are excluded
    /// outright.
    #[instrument(skip(self))]
    pub(crate) async fn update_stakes(&self) -> Result<()> {
        let captured = {
            let state = self.state.lock().unwrap();
            let Some(pubkey) = state.pubkey else {
                return Ok(());
            };
            let stale = match state.stakes_fetched_at {
                None => true,
                Some(at) => at.elapsed() > self.config.stakes_staleness,
            };
            stale.then_some((state.generation, pubkey))
        };
        let Some((generation, wallet)) = captured else {
            return Ok(());
        };

        let stake_program = self.program.stake_program;
        let scanned = self
            .pool
            .dispatch(|endpoint| async move {
                endpoint
                    .get_program_accounts_memcmp(&stake_program, 44, &wallet)
                    .await
            })
            .await?;

        let mut stakes: HashMap<Pubkey, StakeRecord> = HashMap::new();
        for (pubkey, account) in scanned {
            let Some(info) = decode_stake_account(pubkey, &account) else {
                continue;
            };
            if info.is_locked() {
                continue;
            }
            stakes.insert(pubkey, StakeRecord {
                account: info,
                via_entry: false,
            });
        }

        // Stakes linked from owned entries may have a foreign withdraw
        // authority (the program's bridge) and are fetched individually.
        if let Some(cluster) = &self.cluster {
            let owned: Vec<Pubkey> = {
                let state = self.state.lock().unwrap();
                state.owned_entries.iter().copied().collect()
            };
            let mut linked = Vec::new();
            for entry_pubkey in owned {
                if let Some(entry) = cluster.entry(&entry_pubkey) {
                    let stake_pubkey = entry.read().unwrap().owned_stake_account;
                    if stake_pubkey != Pubkey::default() {
                        linked.push(stake_pubkey);
                    }
                }
            }

            let fetches = linked.iter().map(|pubkey| {
                let pubkey = *pubkey;
                async move {
                    let result = self
                        .pool
                        .dispatch(|endpoint| async move { endpoint.get_account(&pubkey).await })
                        .await?;
                    Ok::<Option<(Pubkey, AccountData)>, ClientError>(
                        result.map(|account| (pubkey, account)),
                    )
                }
            });
            for result in join_all(fetches).await {
                let Some((pubkey, account)) = result? else {
                    continue;
                };
                let Some(info) = decode_stake_account(pubkey, &account) else {
                    continue;
                };
                if info.is_locked() {
                    continue;
                }
                stakes
                    .entry(pubkey)
                    .and_modify(|record| record.via_entry = true)
                    .or_insert(StakeRecord {
                        account: info,
                        via_entry: true,
                    });
            }
        }

        let mut state = self.state.lock().unwrap();
        if state.generation == generation {
            state.stakes = stakes;
            state.stakes_fetched_at = Some(Instant::now());
        }
        Ok(())
    }
}

/// Decode a native stake account record. Returns `None` for accounts that
/// are neither initialized nor delegated (or are too short to decode).
pub(crate) fn decode_stake_account(
    pubkey: Pubkey,
    account: &AccountData,
) -> Option<StakeAccountInfo> {
    let data = &account.data;
    let state_tag = codec::le_u32(data, 0).ok()?;
    // 1 = initialized, 2 = delegated; anything else is unusable.
    if state_tag != 1 && state_tag != 2 {
        return None;
    }
    let withdraw_authority = codec::pubkey(data, 44).ok()?;
    let lockup_unix_timestamp = codec::le_i64(data, 76).ok()?;
    let lockup_epoch = codec::le_u64(data, 84).ok()?;

    let (delegated_stake_lamports, vote_account) = if state_tag == 2 {
        (
            Some(codec::le_u64(data, 156).ok()?),
            Some(codec::pubkey(data, 124).ok()?),
        )
    } else {
        (None, None)
    };

    Some(StakeAccountInfo {
        pubkey,
        lamports: account.lamports,
        withdraw_authority,
        lockup_epoch,
        lockup_unix_timestamp,
        delegated_stake_lamports,
        vote_account,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stake_data(tag: u32, withdrawer: Pubkey, lockup_ts: i64, lockup_epoch: u64) -> Vec<u8> {
        let mut data = vec![0u8; 200];
        data[0..4].copy_from_slice(&tag.to_le_bytes());
        data[44..76].copy_from_slice(withdrawer.as_ref());
        data[76..84].copy_from_slice(&lockup_ts.to_le_bytes());
        data[84..92].copy_from_slice(&lockup_epoch.to_le_bytes());
        data
    }

    #[test]
    fn decodes_initialized_and_delegated_stakes() {
        let withdrawer = Pubkey::new_unique();
        let account = AccountData {
            lamports: 5_000,
            data: stake_data(1, withdrawer, 0, 0),
        };
        let info = decode_stake_account(Pubkey::new_unique(), &account).unwrap();
        assert_eq!(info.withdraw_authority, withdrawer);
        assert!(info.delegated_stake_lamports.is_none());
        assert!(!info.is_locked());

        let voter = Pubkey::new_unique();
        let mut data = stake_data(2, withdrawer, 0, 0);
        data[124..156].copy_from_slice(voter.as_ref());
        data[156..164].copy_from_slice(&42_000u64.to_le_bytes());
        let account = AccountData { lamports: 1, data };
        let info = decode_stake_account(Pubkey::new_unique(), &account).unwrap();
        assert_eq!(info.delegated_stake_lamports, Some(42_000));
        assert_eq!(info.vote_account, Some(voter));
    }

    #[test]
    fn rejects_unusable_stake_states() {
        let account = AccountData {
            lamports: 0,
            data: stake_data(0, Pubkey::new_unique(), 0, 0),
        };
        assert!(decode_stake_account(Pubkey::new_unique(), &account).is_none());

        let account = AccountData {
            lamports: 0,
            data: stake_data(3, Pubkey::new_unique(), 0, 0),
        };
        assert!(decode_stake_account(Pubkey::new_unique(), &account).is_none());

        let account = AccountData {
            lamports: 0,
            data: vec![1, 0, 0, 0],
        };
        assert!(decode_stake_account(Pubkey::new_unique(), &account).is_none());
    }
}
