//! Fixed-width digests available to contracts.

use sha2::{Digest, Sha256};
use sha3::Keccak256;

/// SHA2-256 digest.
pub fn sha2_256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Keccak-256 digest (pre-standard SHA3 padding, as used by Ethereum).
pub fn keccak_256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// Blake2b digest with a 32-byte output.
pub fn blake2_256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(blake2_rfc::blake2b::blake2b(32, &[], data).as_bytes());
    out
}

/// Blake2b digest with a 16-byte output.
pub fn blake2_128(data: &[u8]) -> [u8; 16] {
    let mut out = [0u8; 16];
    out.copy_from_slice(blake2_rfc::blake2b::blake2b(16, &[], data).as_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha2_256_vectors() {
        assert_eq!(
            hex::encode(sha2_256(b"")),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            hex::encode(sha2_256(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_keccak_256_vectors() {
        assert_eq!(
            hex::encode(keccak_256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_blake2_vectors() {
        assert_eq!(
            hex::encode(blake2_256(b"")),
            "0e5751c026e543b2e8ab2eb06099daa1d1e5df47778f7787faab45cdf12fe3a8"
        );
        assert_eq!(hex::encode(blake2_128(b"")), "cae66941d9efbd404e4d88758ea67670");
    }

    #[test]
    fn test_digests_differ_per_algorithm() {
        let data = b"tessera";
        assert_ne!(sha2_256(data), keccak_256(data));
        assert_ne!(keccak_256(data), blake2_256(data));
        assert_ne!(&blake2_256(data)[..16], &blake2_128(data)[..]);
    }
}
