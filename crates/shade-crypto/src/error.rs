//! Crypto error types.

/// Errors produced by key derivation and cipher construction.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("unknown cipher method: {0}")]
    UnknownCipher(String),

    #[error("invalid key length: expected {expected} bytes, got {got}")]
    InvalidKeySize { expected: usize, got: usize },

    #[error("key derivation failed")]
    KeyDerivation,

    #[error("authentication failed")]
    Authentication,
}
