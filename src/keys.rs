//! Program-derived address helpers.
//!
//! Block and entry accounts live at deterministic addresses derived from
//! the marketplace program id; the crawl engine enumerates them instead of
//! scanning the program's whole account space.

use crate::config::{METAPLEX_PROGRAM_ID, SPL_ASSOCIATED_TOKEN_PROGRAM_ID, SPL_TOKEN_PROGRAM_ID};
use solana_sdk::pubkey::Pubkey;

/// Block account for `(group_number, block_number)`.
pub fn derive_block_address(program_id: &Pubkey, group_number: u32, block_number: u32) -> Pubkey {
    Pubkey::find_program_address(
        &[
            &[7u8],
            &group_number.to_le_bytes(),
            &block_number.to_le_bytes(),
        ],
        program_id,
    )
    .0
}

/// NFT mint for the entry at `entry_index` within a block.
pub fn derive_entry_mint_address(
    program_id: &Pubkey,
    block_pubkey: &Pubkey,
    entry_index: u16,
) -> Pubkey {
    Pubkey::find_program_address(
        &[&[5u8], block_pubkey.as_ref(), &entry_index.to_le_bytes()],
        program_id,
    )
    .0
}

/// Entry account for an entry mint.
pub fn derive_entry_address(program_id: &Pubkey, entry_mint: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(&[&[8u8], entry_mint.as_ref()], program_id).0
}

/// Stake bridge account for an entry mint.
pub fn derive_entry_bridge_address(program_id: &Pubkey, entry_mint: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(&[&[10u8], entry_mint.as_ref()], program_id).0
}

/// Token account holding a bidder's bid marker for an entry mint.
pub fn derive_bid_marker_token_address(
    program_id: &Pubkey,
    entry_mint: &Pubkey,
    bidder: &Pubkey,
) -> Pubkey {
    Pubkey::find_program_address(
        &[&[12u8], entry_mint.as_ref(), bidder.as_ref()],
        program_id,
    )
    .0
}

/// Bid escrow account for a bid marker token account.
pub fn derive_bid_address(program_id: &Pubkey, bid_marker_token: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(&[&[9u8], bid_marker_token.as_ref()], program_id).0
}

/// Metaplex metadata account for a mint.
pub fn derive_metadata_address(mint: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[
            b"metadata",
            METAPLEX_PROGRAM_ID.as_ref(),
            mint.as_ref(),
        ],
        &METAPLEX_PROGRAM_ID,
    )
    .0
}

/// Associated token account for `(owner, mint)`.
pub fn derive_associated_token_address(owner: &Pubkey, mint: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[
            owner.as_ref(),
            SPL_TOKEN_PROGRAM_ID.as_ref(),
            mint.as_ref(),
        ],
        &SPL_ASSOCIATED_TOKEN_PROGRAM_ID,
    )
    .0
}
