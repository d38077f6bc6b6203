//! ECDSA signature splitting for the `(v, r, s)` form of EIP-3009.
//!
//! Wallets disagree on how the recovery id is encoded in the last byte of a
//! 65-byte signature: raw parity (`0`/`1`), Ethereum legacy (`27`/`28`), or
//! EIP-155 chain-adjusted (`chain_id * 2 + 35 + parity`). The token contract
//! only accepts `27`/`28`, so [`normalize_v`] maps every form onto that range.

use alloy_primitives::B256;
pub use c402::verify::SIGNATURE_LENGTH;

/// Failure to split or normalize a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    /// The signature is not 65 bytes long.
    #[error("signature must be {SIGNATURE_LENGTH} bytes, got {0}")]
    InvalidLength(usize),
    /// The recovery id is not a known encoding.
    #[error("invalid signature recovery id {v} for chain {chain_id}")]
    InvalidRecoveryId {
        /// The raw recovery id.
        v: u64,
        /// The chain the signature was checked against.
        chain_id: u64,
    },
}

/// Maps a raw recovery id onto `{27, 28}`.
///
/// - `0` or `1` become `27` or `28`;
/// - `27` and `28` are returned unchanged;
/// - `chain_id * 2 + 35 + parity` becomes `27 + parity`.
///
/// # Errors
///
/// Returns [`SignatureError::InvalidRecoveryId`] for any other value.
pub fn normalize_v(raw: u64, chain_id: u64) -> Result<u8, SignatureError> {
    match raw {
        0 | 1 => return Ok(27 + u8::from(raw == 1)),
        27 | 28 => return Ok(u8::from(raw == 28) + 27),
        _ => {}
    }
    let eip155_base = chain_id.checked_mul(2).and_then(|v| v.checked_add(35));
    match eip155_base.and_then(|base| raw.checked_sub(base)) {
        Some(parity @ (0 | 1)) => Ok(27 + u8::from(parity == 1)),
        _ => Err(SignatureError::InvalidRecoveryId { v: raw, chain_id }),
    }
}

/// A signature split into its EIP-3009 call arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitSignature {
    /// Recovery id, always `27` or `28`.
    pub v: u8,
    /// First 32 bytes of the signature.
    pub r: B256,
    /// Second 32 bytes of the signature.
    pub s: B256,
}

impl SplitSignature {
    /// Splits a 65-byte `r || s || v` signature and normalizes `v`.
    ///
    /// # Errors
    ///
    /// Returns [`SignatureError`] if the length is wrong or `v` is not a
    /// recognised encoding for `chain_id`.
    pub fn from_bytes(bytes: &[u8], chain_id: u64) -> Result<Self, SignatureError> {
        if bytes.len() != SIGNATURE_LENGTH {
            return Err(SignatureError::InvalidLength(bytes.len()));
        }
        let r = B256::from_slice(&bytes[..32]);
        let s = B256::from_slice(&bytes[32..64]);
        let v = normalize_v(u64::from(bytes[64]), chain_id)?;
        Ok(Self { v, r, s })
    }
}
