use thiserror::Error;

/// Errors that can occur in cryptographic operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CryptoError {
    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Invalid recovery id: {0}")]
    InvalidRecoveryId(u8),

    #[error("Public key recovery failed")]
    RecoveryFailed,

    #[error("Invalid public key")]
    InvalidPublicKey,
}
