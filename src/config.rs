//! Client configuration and derived program addresses.
//!
//! Everything the JS generations kept in module-level singletons lives here
//! instead: tunable intervals and budgets in [`ClientConfig`], and the
//! program-derived address set in [`ProgramConfig`], built once and shared
//! by reference.

use crate::types::{EndpointDescriptor, RateBudget};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey;
use solana_sdk::pubkey::Pubkey;
use std::time::Duration;

/// Marketplace program deployed on mainnet.
pub const MARKETPLACE_PROGRAM_ID: Pubkey = pubkey!("ShinboVZNAn1UjpZ3rJsFzLcWMP5JF8LPdHPWaaGYTV");
/// Metaplex token-metadata program.
pub const METAPLEX_PROGRAM_ID: Pubkey = pubkey!("metaqbxxUerdq28cj1RbAWkYQm3ybzjb6a8bt518x1s");
/// SPL token program.
pub const SPL_TOKEN_PROGRAM_ID: Pubkey = pubkey!("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA");
/// SPL associated-token-account program.
pub const SPL_ASSOCIATED_TOKEN_PROGRAM_ID: Pubkey =
    pubkey!("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL");
/// Native stake program.
pub const STAKE_PROGRAM_ID: Pubkey = pubkey!("Stake11111111111111111111111111111111111111");

/// Conservative per-operation response-size estimates charged against an
/// endpoint's data budget at admission time. These are upper-bound guesses,
/// not measurements; callers with better knowledge of their RPC provider can
/// override them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SizeEstimates {
    /// Scalar calls: genesis hash, epoch info, block time, balance,
    /// blockhash.
    pub small: u64,
    /// One full account record.
    pub account: u64,
    /// Token-account listing for one owner.
    pub token_listing: u64,
    /// Filtered program-account scan.
    pub program_scan: u64,
    /// Raw-transaction submission.
    pub submission: u64,
}

impl Default for SizeEstimates {
    fn default() -> Self {
        Self {
            small: 1024,
            account: 10 * 1024,
            token_listing: 20 * 1024,
            program_scan: 128 * 1024,
            submission: 5 * 1024,
        }
    }
}

/// Tunable intervals, staleness windows, batch sizes, and retry constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Assumed seconds per slot when extrapolating the clock. Mainnet runs
    /// around 0.62; a localnet test validator runs around 0.1.
    pub default_slot_duration_seconds: f64,
    /// How often the clock sampler refreshes its authoritative sample.
    pub clock_refresh_interval: Duration,
    /// Delay between complete crawl passes over all blocks and entries.
    pub crawl_interval: Duration,
    /// Fixed backoff after any failed dispatch attempt or failed periodic
    /// pass.
    pub retry_backoff: Duration,
    /// Block addresses fetched per crawl batch.
    pub blocks_at_once: usize,
    /// Entry addresses fetched per crawl batch.
    pub entries_at_once: usize,
    /// Minimum age before a cached wallet balance is refetched.
    pub balance_staleness: Duration,
    /// Minimum age before wallet token-derived data is refetched.
    pub tokens_staleness: Duration,
    /// Minimum age before the wallet stake map is refetched.
    pub stakes_staleness: Duration,
    /// Slots-until-expiry figure handed to the sign callback. The reported
    /// last-valid-block-height is unreliable on public RPC, so a fixed
    /// window is used.
    pub sign_expiry_slots: u64,
    /// Submission retries after the initial attempt.
    pub submit_retry_limit: usize,
    /// Delay between submission attempts.
    pub submit_retry_delay: Duration,
    pub estimates: SizeEstimates,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            default_slot_duration_seconds: 0.62,
            clock_refresh_interval: Duration::from_secs(5),
            crawl_interval: Duration::from_secs(60),
            retry_backoff: Duration::from_secs(1),
            blocks_at_once: 3,
            entries_at_once: 20,
            balance_staleness: Duration::from_secs(5),
            tokens_staleness: Duration::from_secs(30),
            stakes_staleness: Duration::from_secs(30),
            sign_expiry_slots: 120,
            submit_retry_limit: 4,
            submit_retry_delay: Duration::from_secs(1),
            estimates: SizeEstimates::default(),
        }
    }
}

/// Built-in endpoint set used when `configure(None)` is called.
pub fn default_endpoints() -> Vec<EndpointDescriptor> {
    vec![
        EndpointDescriptor::with_budgets(
            "https://api.mainnet-beta.solana.com",
            RateBudget::new(40, Duration::from_secs(10)),
            RateBudget::new(100_000_000, Duration::from_secs(30)),
        ),
        EndpointDescriptor::new("https://ssc-dao.genesysgo.net"),
    ]
}

/// The marketplace program id plus every address derived from it, built
/// once at startup and injected wherever addresses are needed.
#[derive(Debug, Clone)]
pub struct ProgramConfig {
    pub program_id: Pubkey,
    pub metaplex_program: Pubkey,
    pub spl_token_program: Pubkey,
    pub spl_associated_token_program: Pubkey,
    pub stake_program: Pubkey,
    /// Program authority PDA; also the update authority on every entry's
    /// metaplex metadata.
    pub authority: Pubkey,
    /// Program configuration account (holds the admin pubkey at offset 4).
    pub config_account: Pubkey,
    pub master_stake: Pubkey,
    /// Mint of the fungible reward token ("Ki").
    pub ki_mint: Pubkey,
    pub ki_metadata: Pubkey,
    /// Mint marking bid-escrow token accounts.
    pub bid_marker_mint: Pubkey,
}

impl ProgramConfig {
    pub fn new(program_id: Pubkey) -> Self {
        let authority = Pubkey::find_program_address(&[&[2u8]], &program_id).0;
        let config_account = Pubkey::find_program_address(&[&[1u8]], &program_id).0;
        let master_stake = Pubkey::find_program_address(&[&[3u8]], &program_id).0;
        let ki_mint = Pubkey::find_program_address(&[&[4u8]], &program_id).0;
        let bid_marker_mint = Pubkey::find_program_address(&[&[11u8]], &program_id).0;
        let ki_metadata = crate::keys::derive_metadata_address(&ki_mint);
        Self {
            program_id,
            metaplex_program: METAPLEX_PROGRAM_ID,
            spl_token_program: SPL_TOKEN_PROGRAM_ID,
            spl_associated_token_program: SPL_ASSOCIATED_TOKEN_PROGRAM_ID,
            stake_program: STAKE_PROGRAM_ID,
            authority,
            config_account,
            master_stake,
            ki_mint,
            ki_metadata,
            bid_marker_mint,
        }
    }

    /// Addresses for the mainnet deployment.
    pub fn mainnet() -> Self {
        Self::new(MARKETPLACE_PROGRAM_ID)
    }
}
