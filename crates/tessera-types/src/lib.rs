//! Tessera Types - Core type definitions shared by the contract host runtime.
//!
//! This crate provides the fundamental types that cross the host/guest boundary:
//! - Addresses (32-byte account ids, displayed as Bech32m)
//! - Hashes (32-byte digests)
//! - Weight (two-axis resource cost)
//! - Balance, block number and timestamp aliases

pub mod address;
pub mod hash;
pub mod weight;
pub mod error;

#[cfg(feature = "serde")]
mod serialization;

pub use address::Address;
pub use hash::Hash;
pub use weight::Weight;
pub use error::TypesError;

/// Token amount. Encoded as 16 little-endian bytes in guest memory.
pub type Balance = u128;

/// Block height. Encoded as 8 little-endian bytes in guest memory.
pub type BlockNumber = u64;

/// Milliseconds since the unix epoch.
pub type Moment = u64;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{Address, Balance, BlockNumber, Hash, Moment, TypesError, Weight};
}
