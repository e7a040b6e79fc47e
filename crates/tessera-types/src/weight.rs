//! Two-dimensional resource cost.
//!
//! `ref_time` approximates execution time, `proof_size` the amount of state a
//! light client needs to verify the execution. Every charge is a `Weight` and
//! a charge fails when either axis would drop below zero.

use std::fmt;

/// Resource cost along two independent axes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Weight {
    ref_time: u64,
    proof_size: u64,
}

impl Weight {
    pub const ZERO: Self = Self::from_parts(0, 0);
    pub const MAX: Self = Self::from_parts(u64::MAX, u64::MAX);

    /// Size of the guest-visible encoding: two little-endian u64.
    pub const ENCODED_LEN: usize = 16;

    pub const fn from_parts(ref_time: u64, proof_size: u64) -> Self {
        Self { ref_time, proof_size }
    }

    /// Weight with only the time axis set.
    pub const fn from_ref_time(ref_time: u64) -> Self {
        Self::from_parts(ref_time, 0)
    }

    pub const fn ref_time(&self) -> u64 {
        self.ref_time
    }

    pub const fn proof_size(&self) -> u64 {
        self.proof_size
    }

    pub const fn is_zero(&self) -> bool {
        self.ref_time == 0 && self.proof_size == 0
    }

    /// Subtract per axis, `None` if either axis underflows.
    pub fn checked_sub(&self, other: &Self) -> Option<Self> {
        Some(Self {
            ref_time: self.ref_time.checked_sub(other.ref_time)?,
            proof_size: self.proof_size.checked_sub(other.proof_size)?,
        })
    }

    /// Add per axis, `None` if either axis overflows.
    pub fn checked_add(&self, other: &Self) -> Option<Self> {
        Some(Self {
            ref_time: self.ref_time.checked_add(other.ref_time)?,
            proof_size: self.proof_size.checked_add(other.proof_size)?,
        })
    }

    pub const fn saturating_add(self, other: Self) -> Self {
        Self {
            ref_time: self.ref_time.saturating_add(other.ref_time),
            proof_size: self.proof_size.saturating_add(other.proof_size),
        }
    }

    pub const fn saturating_sub(self, other: Self) -> Self {
        Self {
            ref_time: self.ref_time.saturating_sub(other.ref_time),
            proof_size: self.proof_size.saturating_sub(other.proof_size),
        }
    }

    pub const fn saturating_mul(self, n: u64) -> Self {
        Self {
            ref_time: self.ref_time.saturating_mul(n),
            proof_size: self.proof_size.saturating_mul(n),
        }
    }

    /// Per-axis minimum.
    pub fn min(self, other: Self) -> Self {
        Self {
            ref_time: self.ref_time.min(other.ref_time),
            proof_size: self.proof_size.min(other.proof_size),
        }
    }

    /// True if any axis of `self` exceeds the same axis of `other`.
    pub const fn any_gt(&self, other: &Self) -> bool {
        self.ref_time > other.ref_time || self.proof_size > other.proof_size
    }

    /// Guest encoding: `ref_time` then `proof_size`, little-endian.
    pub fn to_le_bytes(&self) -> [u8; Self::ENCODED_LEN] {
        let mut out = [0u8; Self::ENCODED_LEN];
        out[..8].copy_from_slice(&self.ref_time.to_le_bytes());
        out[8..].copy_from_slice(&self.proof_size.to_le_bytes());
        out
    }
}

impl fmt::Debug for Weight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Weight(ref_time: {}, proof_size: {})", self.ref_time, self.proof_size)
    }
}

impl fmt::Display for Weight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
