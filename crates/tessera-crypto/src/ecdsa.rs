//! secp256k1 ECDSA recovery and Ethereum address derivation.

use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};

use crate::error::CryptoError;
use crate::hash::keccak_256;

/// `r || s || v`
pub const SIGNATURE_LEN: usize = 65;
/// SEC1 compressed public key.
pub const COMPRESSED_KEY_LEN: usize = 33;
/// SEC1 uncompressed public key, `0x04 || x || y`.
pub const UNCOMPRESSED_KEY_LEN: usize = 65;
pub const ETH_ADDRESS_LEN: usize = 20;

/// Recover the compressed public key that produced `signature` over `message_hash`.
///
/// The recovery byte may be given raw (0..=3) or Ethereum style (27..=30).
pub fn ecdsa_recover(
    signature: &[u8; SIGNATURE_LEN],
    message_hash: &[u8; 32],
) -> Result<[u8; COMPRESSED_KEY_LEN], CryptoError> {
    let v = signature[64];
    let recovery_id = RecoveryId::from_byte(if v >= 27 { v - 27 } else { v })
        .ok_or(CryptoError::InvalidRecoveryId(v))?;
    let sig = Signature::from_slice(&signature[..64]).map_err(|_| CryptoError::InvalidSignature)?;

    let key = VerifyingKey::recover_from_prehash(message_hash, &sig, recovery_id)
        .map_err(|_| CryptoError::RecoveryFailed)?;

    let point = key.to_encoded_point(true);
    point
        .as_bytes()
        .try_into()
        .map_err(|_| CryptoError::InvalidPublicKey)
}

/// Derive the Ethereum address of an uncompressed public key:
/// the low 20 bytes of keccak256 over the key without its `0x04` prefix.
pub fn eth_address(
    uncompressed: &[u8; UNCOMPRESSED_KEY_LEN],
) -> Result<[u8; ETH_ADDRESS_LEN], CryptoError> {
    if uncompressed[0] != 0x04 {
        return Err(CryptoError::InvalidPublicKey);
    }
    let digest = keccak_256(&uncompressed[1..]);
    let mut address = [0u8; ETH_ADDRESS_LEN];
    address.copy_from_slice(&digest[12..]);
    Ok(address)
}

/// Decompress a SEC1 compressed key and derive its Ethereum address.
pub fn ecdsa_to_eth_address(
    compressed: &[u8; COMPRESSED_KEY_LEN],
) -> Result<[u8; ETH_ADDRESS_LEN], CryptoError> {
    let key = VerifyingKey::from_sec1_bytes(compressed).map_err(|_| CryptoError::InvalidPublicKey)?;
    let point = key.to_encoded_point(false);
    let uncompressed: &[u8; UNCOMPRESSED_KEY_LEN] = point
        .as_bytes()
        .try_into()
        .map_err(|_| CryptoError::InvalidPublicKey)?;
    eth_address(uncompressed)
}
