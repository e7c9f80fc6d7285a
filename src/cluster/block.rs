//! Block entity: a group of entries sold together.

use crate::codec;
use crate::error::Result;
use crate::types::ClockReading;
use solana_sdk::pubkey::Pubkey;

/// Minimum record length covering every decoded field.
pub const BLOCK_RECORD_LEN: usize = 112;

/// In-memory mirror of one on-chain block account. Admitted to the cache
/// only once complete; after that the same instance is updated in place so
/// that handles held by subscribers never go stale.
#[derive(Debug, Clone)]
pub struct Block {
    pub pubkey: Pubkey,
    pub group_number: u32,
    pub block_number: u32,
    pub total_entry_count: u16,
    pub total_mystery_count: u16,
    pub mystery_phase_duration: u32,
    pub mystery_start_price_lamports: u64,
    pub reveal_period_duration: u32,
    pub minimum_price_lamports: u64,
    pub has_auction: bool,
    pub duration: u32,
    pub non_auction_start_price_lamports: u64,
    // Mutable fields follow; everything above is immutable once admitted.
    pub added_entries_count: u16,
    pub block_start_timestamp: i64,
    pub mysteries_sold_count: u16,
    pub mystery_phase_end_timestamp: i64,
    pub commission: u16,
    pub last_commission_change_epoch: u64,
}

impl Block {
    pub fn decode(pubkey: Pubkey, data: &[u8]) -> Result<Self> {
        Ok(Self {
            pubkey,
            group_number: codec::le_u32(data, 8)?,
            block_number: codec::le_u32(data, 12)?,
            total_entry_count: codec::le_u16(data, 16)?,
            total_mystery_count: codec::le_u16(data, 18)?,
            mystery_phase_duration: codec::le_u32(data, 20)?,
            mystery_start_price_lamports: codec::le_u64(data, 24)?,
            reveal_period_duration: codec::le_u32(data, 32)?,
            minimum_price_lamports: codec::le_u64(data, 40)?,
            has_auction: codec::le_u32(data, 48)? != 0,
            duration: codec::le_u32(data, 52)?,
            non_auction_start_price_lamports: codec::le_u64(data, 56)?,
            added_entries_count: codec::le_u16(data, 64)?,
            block_start_timestamp: codec::le_i64(data, 72)?,
            mysteries_sold_count: codec::le_u16(data, 80)?,
            mystery_phase_end_timestamp: codec::le_i64(data, 88)?,
            commission: codec::le_u16(data, 96)?,
            last_commission_change_epoch: codec::le_u64(data, 104)?,
        })
    }

    /// A block still being populated by the program does not exist as far
    /// as the cache is concerned.
    pub fn is_complete(&self) -> bool {
        self.added_entries_count == self.total_entry_count
    }

    /// Copy over the mutable fields that differ from a freshly-decoded
    /// record; returns whether anything changed. Paired fields move
    /// together so readers never see a counter without its timestamp.
    pub fn apply(&mut self, fresh: &Block) -> bool {
        let mut changed = false;

        if fresh.added_entries_count != self.added_entries_count {
            self.added_entries_count = fresh.added_entries_count;
            // block_start_timestamp only ever changes alongside
            // added_entries_count.
            self.block_start_timestamp = fresh.block_start_timestamp;
            changed = true;
        }

        if fresh.mysteries_sold_count != self.mysteries_sold_count {
            self.mysteries_sold_count = fresh.mysteries_sold_count;
            // mystery_phase_end_timestamp only ever changes alongside
            // mysteries_sold_count.
            self.mystery_phase_end_timestamp = fresh.mystery_phase_end_timestamp;
            changed = true;
        }

        if fresh.commission != self.commission {
            self.commission = fresh.commission;
            changed = true;
        }

        // last_commission_change_epoch can change while commission reads
        // the same (changed and changed back between polls), so it is
        // compared on its own.
        if fresh.last_commission_change_epoch != self.last_commission_change_epoch {
            self.last_commission_change_epoch = fresh.last_commission_change_epoch;
            changed = true;
        }

        changed
    }

    /// Entries become revealable once every mystery is sold or the mystery
    /// phase has timed out.
    pub fn is_revealable(&self, clock: &ClockReading) -> bool {
        if self.mysteries_sold_count == self.total_mystery_count {
            return true;
        }
        let mystery_phase_end =
            self.block_start_timestamp + self.mystery_phase_duration as i64;
        clock.unix_timestamp > mystery_phase_end
    }
}
