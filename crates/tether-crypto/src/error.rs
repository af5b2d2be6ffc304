//! Error types for key and signature operations.

use thiserror::Error;

/// Cryptographic failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    /// Public key bytes do not describe a curve point.
    #[error("invalid public key")]
    InvalidPublicKey,

    /// Signature bytes are malformed or fail verification.
    #[error("invalid signature")]
    InvalidSignature,

    /// Key material has the wrong length.
    #[error("invalid key length: {0}")]
    InvalidKeyLength(usize),
}
