//! Entry entity: one NFT within a block, with its auction, stake, and
//! leveling state.

use crate::cluster::block::Block;
use crate::codec;
use crate::error::{ClientError, Result};
use crate::types::ClockReading;
use solana_sdk::pubkey::Pubkey;
use std::sync::{Arc, RwLock};

pub const LEVEL_COUNT: usize = 9;
const LEVEL_METADATA_STRIDE: usize = 272;
const LEVEL_METADATA_BASE: usize = 400;
/// Minimum record length covering every decoded field.
pub const ENTRY_RECORD_LEN: usize = LEVEL_METADATA_BASE + LEVEL_COUNT * LEVEL_METADATA_STRIDE;

pub type SharedBlock = Arc<RwLock<Block>>;

/// Static per-level metadata baked into the entry at creation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LevelMetadata {
    pub form: u8,
    pub skill: u8,
    pub ki_factor: u32,
    pub name: String,
    pub uri: String,
    pub uri_contents_sha256: [u8; 32],
}

/// The state an entry is in at one evaluation instant. Never stored;
/// always derived from the raw fields plus a clock reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Not revealed yet, not owned.
    PreRevealUnowned,
    /// Owned, but the containing block has not met its reveal criteria.
    PreRevealOwned,
    /// Block met the reveal criteria, entry not yet revealed; unowned.
    WaitingForRevealUnowned,
    /// Block met the reveal criteria, entry not yet revealed; owned.
    WaitingForRevealOwned,
    /// In auction.
    InAuction,
    /// Auction ended with a winning bid waiting to be claimed.
    WaitingToBeClaimed,
    /// Past its auction end and unowned.
    Unowned,
    /// Owned and revealed, not staked.
    Owned,
    /// Owned, revealed, and staked.
    OwnedAndStaked,
}

/// In-memory mirror of one on-chain entry account. Identity (pubkey, block
/// linkage) and the level-metadata tables are immutable; everything else
/// can change across observations.
#[derive(Debug, Clone)]
pub struct Entry {
    pub block: SharedBlock,
    pub pubkey: Pubkey,
    pub group_number: u32,
    pub block_number: u32,
    pub entry_index: u16,
    pub mint_pubkey: Pubkey,
    pub token_pubkey: Pubkey,
    pub metaplex_metadata_pubkey: Pubkey,
    pub minimum_price_lamports: u64,
    pub has_auction: bool,
    pub duration: u32,
    pub non_auction_start_price_lamports: u64,
    pub reveal_sha256: [u8; 32],
    pub reveal_timestamp: i64,
    pub purchase_price_lamports: u64,
    pub refund_awarded: bool,
    pub commission: u16,
    pub auction_highest_bid_lamports: u64,
    pub auction_winning_bid_pubkey: Pubkey,
    pub owned_stake_account: Pubkey,
    pub owned_stake_initial_lamports: u64,
    pub owned_stake_epoch: u64,
    pub owned_last_ki_harvest_stake_account_lamports: u64,
    pub owned_last_commission_charge_stake_account_lamports: u64,
    pub level: u8,
    pub metadata_level_1_ki: u32,
    pub metadata_random: [u32; 16],
    pub level_metadata: Vec<LevelMetadata>,
}

impl Entry {
    pub fn decode(block: SharedBlock, pubkey: Pubkey, data: &[u8]) -> Result<Self> {
        let mut metadata_random = [0u32; 16];
        for (i, slot) in metadata_random.iter_mut().enumerate() {
            *slot = codec::le_u32(data, 336 + i * 4)?;
        }

        let mut level_metadata = Vec::with_capacity(LEVEL_COUNT);
        for i in 0..LEVEL_COUNT {
            let base = LEVEL_METADATA_BASE + i * LEVEL_METADATA_STRIDE;
            level_metadata.push(LevelMetadata {
                form: codec::byte(data, base)?,
                skill: codec::byte(data, base + 1)?,
                ki_factor: codec::le_u32(data, base + 4)?,
                name: codec::string(data, base + 8, 32)?,
                uri: codec::string(data, base + 40, 200)?,
                uri_contents_sha256: codec::sha256(data, base + 240)?,
            });
        }

        Ok(Self {
            block,
            pubkey,
            group_number: codec::le_u32(data, 36)?,
            block_number: codec::le_u32(data, 40)?,
            entry_index: codec::le_u16(data, 44)?,
            mint_pubkey: codec::pubkey(data, 46)?,
            token_pubkey: codec::pubkey(data, 78)?,
            metaplex_metadata_pubkey: codec::pubkey(data, 110)?,
            minimum_price_lamports: codec::le_u64(data, 144)?,
            has_auction: codec::byte(data, 152)? != 0,
            duration: codec::le_u32(data, 156)?,
            non_auction_start_price_lamports: codec::le_u64(data, 160)?,
            reveal_sha256: codec::sha256(data, 168)?,
            reveal_timestamp: codec::le_i64(data, 200)?,
            purchase_price_lamports: codec::le_u64(data, 208)?,
            refund_awarded: codec::byte(data, 216)? != 0,
            commission: codec::le_u16(data, 218)?,
            auction_highest_bid_lamports: codec::le_u64(data, 224)?,
            auction_winning_bid_pubkey: codec::pubkey(data, 232)?,
            owned_stake_account: codec::pubkey(data, 264)?,
            owned_stake_initial_lamports: codec::le_u64(data, 296)?,
            owned_stake_epoch: codec::le_u64(data, 304)?,
            owned_last_ki_harvest_stake_account_lamports: codec::le_u64(data, 312)?,
            owned_last_commission_charge_stake_account_lamports: codec::le_u64(data, 320)?,
            level: codec::byte(data, 328)?,
            metadata_level_1_ki: codec::le_u32(data, 332)?,
            metadata_random,
            level_metadata,
        })
    }

    /// Copy over the mutable fields that differ from a freshly-decoded
    /// record; returns whether anything changed.
    pub fn apply(&mut self, fresh: &Entry) -> bool {
        let mut changed = false;

        if fresh.reveal_sha256 != self.reveal_sha256 {
            self.reveal_sha256 = fresh.reveal_sha256;
            // reveal_timestamp only ever changes alongside reveal_sha256.
            self.reveal_timestamp = fresh.reveal_timestamp;
            changed = true;
        }
        if fresh.purchase_price_lamports != self.purchase_price_lamports {
            self.purchase_price_lamports = fresh.purchase_price_lamports;
            changed = true;
        }
        if fresh.refund_awarded != self.refund_awarded {
            self.refund_awarded = fresh.refund_awarded;
            changed = true;
        }
        if fresh.commission != self.commission {
            self.commission = fresh.commission;
            changed = true;
        }
        if fresh.auction_highest_bid_lamports != self.auction_highest_bid_lamports {
            self.auction_highest_bid_lamports = fresh.auction_highest_bid_lamports;
            changed = true;
        }
        if fresh.auction_winning_bid_pubkey != self.auction_winning_bid_pubkey {
            self.auction_winning_bid_pubkey = fresh.auction_winning_bid_pubkey;
            changed = true;
        }
        if fresh.owned_stake_account != self.owned_stake_account {
            self.owned_stake_account = fresh.owned_stake_account;
            changed = true;
        }
        if fresh.owned_stake_initial_lamports != self.owned_stake_initial_lamports {
            self.owned_stake_initial_lamports = fresh.owned_stake_initial_lamports;
            changed = true;
        }
        if fresh.owned_stake_epoch != self.owned_stake_epoch {
            self.owned_stake_epoch = fresh.owned_stake_epoch;
            changed = true;
        }
        if fresh.owned_last_ki_harvest_stake_account_lamports
            != self.owned_last_ki_harvest_stake_account_lamports
        {
            self.owned_last_ki_harvest_stake_account_lamports =
                fresh.owned_last_ki_harvest_stake_account_lamports;
            changed = true;
        }
        if fresh.owned_last_commission_charge_stake_account_lamports
            != self.owned_last_commission_charge_stake_account_lamports
        {
            self.owned_last_commission_charge_stake_account_lamports =
                fresh.owned_last_commission_charge_stake_account_lamports;
            changed = true;
        }
        if fresh.level != self.level {
            self.level = fresh.level;
            changed = true;
        }

        changed
    }

    fn is_revealed(&self) -> bool {
        self.reveal_sha256 == [0u8; 32]
    }

    fn is_owned(&self) -> bool {
        self.purchase_price_lamports > 0
    }

    fn is_staked(&self) -> bool {
        self.owned_stake_account != Pubkey::default()
    }

    /// Derive the entry's state at the instant described by `clock`.
    /// Exactly one state applies at any evaluation instant.
    pub fn state(&self, clock: &ClockReading) -> EntryState {
        if self.is_revealed() {
            if self.is_owned() {
                if self.is_staked() {
                    EntryState::OwnedAndStaked
                } else {
                    EntryState::Owned
                }
            } else if self.has_auction {
                if self.reveal_timestamp + self.duration as i64 > clock.unix_timestamp {
                    EntryState::InAuction
                } else if self.auction_highest_bid_lamports > 0 {
                    EntryState::WaitingToBeClaimed
                } else {
                    EntryState::Unowned
                }
            } else {
                EntryState::Unowned
            }
        } else if self.block.read().unwrap().is_revealable(clock) {
            if self.is_owned() {
                EntryState::WaitingForRevealOwned
            } else {
                EntryState::WaitingForRevealUnowned
            }
        } else if self.is_owned() {
            EntryState::PreRevealOwned
        } else {
            EntryState::PreRevealUnowned
        }
    }

    /// Current purchase price. Only meaningful when the state is
    /// `PreRevealUnowned` or `Unowned`.
    pub fn price(&self, clock: &ClockReading) -> u64 {
        if self.state(clock) == EntryState::PreRevealUnowned {
            let block = self.block.read().unwrap();
            let elapsed = (clock.unix_timestamp - block.block_start_timestamp).max(0) as u64;
            compute_price(
                block.mystery_phase_duration as u64,
                block.mystery_start_price_lamports,
                block.minimum_price_lamports,
                elapsed,
            )
        } else if self.has_auction {
            self.block.read().unwrap().minimum_price_lamports
        } else {
            let elapsed = (clock.unix_timestamp - self.reveal_timestamp).max(0) as u64;
            compute_price(
                self.duration as u64,
                self.non_auction_start_price_lamports,
                self.minimum_price_lamports,
                elapsed,
            )
        }
    }

    /// Smallest acceptable bid right now. Only meaningful in `InAuction`.
    pub fn auction_minimum_bid(&self, clock: &ClockReading) -> u64 {
        let elapsed = (clock.unix_timestamp - self.reveal_timestamp).max(0) as u64;
        compute_minimum_bid(
            self.duration as u64,
            self.minimum_price_lamports,
            self.auction_highest_bid_lamports,
            elapsed,
        )
    }

    /// Only meaningful in `InAuction`.
    pub fn auction_end_unix_timestamp(&self) -> i64 {
        self.reveal_timestamp + self.duration as i64
    }

    /// Deadline for an owner to reveal. Only meaningful in
    /// `WaitingForRevealOwned`.
    pub fn reveal_deadline(&self) -> i64 {
        let block = self.block.read().unwrap();
        block.mystery_phase_end_timestamp + block.reveal_period_duration as i64
    }
}

/// Declining purchase price between `start_price` and `end_price` over
/// `total_seconds`, matching the on-chain curve exactly. Prices are worked
/// at 1/1000-lamport granularity, so the result at `seconds_elapsed == 0`
/// sits within 1 % + truncation of `start_price`; at or past
/// `total_seconds` it is exactly `end_price`.
pub fn compute_price(
    total_seconds: u64,
    start_price: u64,
    end_price: u64,
    seconds_elapsed: u64,
) -> u64 {
    if seconds_elapsed >= total_seconds {
        return end_price;
    }

    let total = total_seconds as u128;
    let elapsed = seconds_elapsed as u128;
    let delta = (start_price.saturating_sub(end_price) as u128) / 1000;
    let end = (end_price as u128) / 1000;

    let ac = delta * 101;
    let ab = (100 * delta * elapsed) / total + delta;
    let bc = (100 * 101 * elapsed) / total + 101;

    ((end + (ac - ab) / bc) * 1000) as u64
}

/// Minimum acceptable next bid for an auction that has run
/// `seconds_elapsed` of `auction_duration`, given the standing maximum.
/// Clamped to at least max+2 % and at most 2×max+1 %.
pub fn compute_minimum_bid(
    auction_duration: u64,
    initial_minimum_bid: u64,
    current_max_bid: u64,
    seconds_elapsed: u64,
) -> u64 {
    let p = current_max_bid.max(initial_minimum_bid) as u128;
    let b = auction_duration as u128;
    let a = (seconds_elapsed as u128).min(b);

    let min_result = p + p / 50;
    let max_result = 2 * p + p / 100;

    let denominator = (b + b / 100).saturating_sub(a);
    if denominator == 0 {
        return max_result as u64;
    }

    let result = (p * ((1000 * b / denominator) + 101_000)) / 100_000;
    result.clamp(min_result, max_result) as u64
}

/// Extract the metadata URI from a raw metaplex token-metadata record:
/// skip key/update-authority/mint, then three length-prefixed strings
/// (name, symbol, uri) with sanity caps.
pub fn parse_metadata_uri(data: &[u8]) -> Result<String> {
    let mut offset = 1 + 32 + 32;

    let name_len = codec::le_u32(data, offset)? as usize;
    if name_len > 200 {
        return Err(ClientError::Decode("metadata name length".into()));
    }
    offset += 4 + name_len;

    let symbol_len = codec::le_u32(data, offset)? as usize;
    if symbol_len > 10 {
        return Err(ClientError::Decode("metadata symbol length".into()));
    }
    offset += 4 + symbol_len;

    let uri_len = codec::le_u32(data, offset)? as usize;
    if uri_len > 200 {
        return Err(ClientError::Decode("metadata uri length".into()));
    }
    codec::string(data, offset + 4, uri_len)
}
