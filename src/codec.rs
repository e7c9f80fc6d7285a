//! Bounds-checked little-endian field extraction for fixed-layout account
//! records.
//!
//! The on-chain program lays its accounts out as packed C structs; every
//! reader here takes a byte offset from that layout and fails with
//! [`ClientError::Decode`] instead of panicking when a record is truncated.

use crate::error::{ClientError, Result};
use solana_sdk::pubkey::Pubkey;

fn slice_at<'a>(data: &'a [u8], offset: usize, len: usize) -> Result<&'a [u8]> {
    data.get(offset..offset + len).ok_or_else(|| {
        ClientError::Decode(format!(
            "record too short: need {} bytes at offset {}, have {}",
            len,
            offset,
            data.len()
        ))
    })
}

pub fn le_u16(data: &[u8], offset: usize) -> Result<u16> {
    let bytes = slice_at(data, offset, 2)?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

pub fn le_u32(data: &[u8], offset: usize) -> Result<u32> {
    let bytes = slice_at(data, offset, 4)?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

pub fn le_u64(data: &[u8], offset: usize) -> Result<u64> {
    let bytes: [u8; 8] = slice_at(data, offset, 8)?
        .try_into()
        .map_err(|_| ClientError::Decode("u64 slice".into()))?;
    Ok(u64::from_le_bytes(bytes))
}

pub fn le_i64(data: &[u8], offset: usize) -> Result<i64> {
    Ok(le_u64(data, offset)? as i64)
}

pub fn le_f64(data: &[u8], offset: usize) -> Result<f64> {
    Ok(f64::from_bits(le_u64(data, offset)?))
}

pub fn byte(data: &[u8], offset: usize) -> Result<u8> {
    Ok(slice_at(data, offset, 1)?[0])
}

pub fn pubkey(data: &[u8], offset: usize) -> Result<Pubkey> {
    let bytes: [u8; 32] = slice_at(data, offset, 32)?
        .try_into()
        .map_err(|_| ClientError::Decode("pubkey slice".into()))?;
    Ok(Pubkey::from(bytes))
}

pub fn sha256(data: &[u8], offset: usize) -> Result<[u8; 32]> {
    let bytes: [u8; 32] = slice_at(data, offset, 32)?
        .try_into()
        .map_err(|_| ClientError::Decode("sha256 slice".into()))?;
    Ok(bytes)
}

/// Fixed-width UTF-8 field, truncated at the first NUL.
pub fn string(data: &[u8], offset: usize, len: usize) -> Result<String> {
    let bytes = slice_at(data, offset, len)?;
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(len);
    Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_little_endian_fields() {
        let mut data = vec![0u8; 32];
        data[4..6].copy_from_slice(&0xBEEFu16.to_le_bytes());
        data[8..12].copy_from_slice(&0xDEAD_BEEFu32.to_le_bytes());
        data[16..24].copy_from_slice(&(-42i64).to_le_bytes());
        assert_eq!(le_u16(&data, 4).unwrap(), 0xBEEF);
        assert_eq!(le_u32(&data, 8).unwrap(), 0xDEAD_BEEF);
        assert_eq!(le_i64(&data, 16).unwrap(), -42);
    }

    #[test]
    fn truncated_record_is_an_error() {
        let data = vec![0u8; 4];
        assert!(le_u64(&data, 0).is_err());
        assert!(pubkey(&data, 0).is_err());
        assert!(le_u16(&data, 3).is_err());
    }

    #[test]
    fn string_trims_at_nul() {
        let mut data = vec![0u8; 16];
        data[..5].copy_from_slice(b"gohan");
        assert_eq!(string(&data, 0, 16).unwrap(), "gohan");
        // No NUL inside the window: whole window is the value.
        assert_eq!(string(&data, 0, 5).unwrap(), "gohan");
    }
}
