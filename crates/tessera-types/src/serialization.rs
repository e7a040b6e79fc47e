//! Serde implementations for tessera-types.
//!
//! Addresses and hashes are serialized as `0x`-prefixed hex strings so that
//! configuration files and fixtures stay human readable.

use crate::{Address, Hash};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::str::FromStr;

impl Serialize for Hash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_string().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Hash::from_str(&s).map_err(serde::de::Error::custom)
    }
}

impl Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        format!("{:x}", self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Address::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use crate::{Address, Hash, Weight};

    #[test]
    fn test_address_json_roundtrip() {
        let addr = Address::from_bytes([3u8; 32]);
        let json = serde_json::to_string(&addr).unwrap();
        assert!(json.contains("0x0303"));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(addr, back);
    }

    #[test]
    fn test_hash_json_roundtrip() {
        let hash = Hash::of_code(b"code");
        let json = serde_json::to_string(&hash).unwrap();
        let back: Hash = serde_json::from_str(&json).unwrap();
        assert_eq!(hash, back);
    }

    #[test]
    fn test_weight_json_fields() {
        let weight: Weight = serde_json::from_str(r#"{"ref_time": 7, "proof_size": 9}"#).unwrap();
        assert_eq!(weight, Weight::from_parts(7, 9));
    }
}
