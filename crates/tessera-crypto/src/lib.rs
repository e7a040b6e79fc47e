//! Tessera Crypto - Cryptographic primitives exposed to contracts.
//!
//! This crate provides:
//! - SHA2-256, Keccak-256, Blake2b-256 and Blake2b-128 hashing
//! - secp256k1 ECDSA public key recovery
//! - Ethereum-style address derivation from secp256k1 keys
//!
//! Every function is pure; metering and memory marshalling happen in the host.

pub mod hash;
pub mod ecdsa;
pub mod error;

pub use hash::{blake2_128, blake2_256, keccak_256, sha2_256};
pub use ecdsa::{ecdsa_recover, ecdsa_to_eth_address, eth_address};
pub use error::CryptoError;
