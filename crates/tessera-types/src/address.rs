use crate::error::TypesError;
use std::fmt;
use std::str::FromStr;

/// 32-byte account id of a user or a contract.
/// Display format: Bech32m with "tsr" human-readable prefix.
///
/// Contracts see addresses as raw 32-byte buffers in their linear memory.
/// The bech32m form is what logs show; fixtures and configuration use hex.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address([u8; 32]);

impl Address {
    pub const ZERO: Self = Self([0u8; 32]);
    pub const LEN: usize = 32;

    /// Bech32m human-readable prefix
    pub const BECH32_HRP: &'static str = "tsr";

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Create from a byte slice
    pub fn from_slice(slice: &[u8]) -> Result<Self, TypesError> {
        let bytes: [u8; 32] = slice
            .try_into()
            .map_err(|_| TypesError::InvalidAddressLength(slice.len()))?;
        Ok(Self(bytes))
    }

    /// Check if this is the zero address
    pub fn is_zero(&self) -> bool {
        self == &Self::ZERO
    }

    /// Convert to hex string without 0x prefix
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hrp = bech32::Hrp::parse_unchecked(Self::BECH32_HRP);
        match bech32::encode::<bech32::Bech32m>(hrp, &self.0) {
            Ok(encoded) => write!(f, "{}", encoded),
            Err(_) => Err(fmt::Error),
        }
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address(0x{})", hex::encode(self.0))
    }
}

impl fmt::LowerHex for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// Parses the `0x`-prefixed hex form, the inverse of `{:x}` and of the
/// serde representation. Bech32m is display-only.
impl FromStr for Address {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stripped = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or_else(|| TypesError::InvalidAddressFormat(s.to_string()))?;
        let bytes = hex::decode(stripped)?;
        Self::from_slice(&bytes)
    }
}

impl From<[u8; 32]> for Address {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_zero() {
        assert_eq!(Address::ZERO.as_bytes(), &[0u8; 32]);
        assert!(Address::ZERO.is_zero());
    }

    #[test]
    fn test_address_from_slice() {
        let addr = Address::from_slice(&[7u8; 32]).unwrap();
        assert_eq!(addr.as_bytes(), &[7u8; 32]);

        assert_eq!(
            Address::from_slice(&[7u8; 20]),
            Err(TypesError::InvalidAddressLength(20))
        );
    }

    #[test]
    fn test_address_display_is_bech32m() {
        let bytes: [u8; 32] = core::array::from_fn(|i| i as u8);
        let addr = Address::from_bytes(bytes);

        let encoded = addr.to_string();
        assert!(encoded.starts_with("tsr1"));
        assert_ne!(encoded, Address::ZERO.to_string());
        // Display-only: the parser takes hex.
        assert!(encoded.parse::<Address>().is_err());
    }

    #[test]
    fn test_address_hex_roundtrip() {
        let addr = Address::from_bytes([0xab; 32]);
        let hex = format!("{:x}", addr);
        let parsed: Address = hex.parse().unwrap();
        assert_eq!(addr, parsed);
    }

    #[test]
    fn test_address_from_str_invalid() {
        assert!(Address::from_str("invalid").is_err());
        assert!(Address::from_str("0x1234").is_err());
    }

    #[test]
    fn test_address_ordering() {
        let addr1 = Address::from_bytes([0u8; 32]);
        let addr2 = Address::from_bytes([1u8; 32]);
        assert!(addr1 < addr2);
    }
}
