//! Error types for the credential vault.

use thiserror::Error;

/// Failures in vault operations. Decryption failures deliberately carry no
/// plaintext or key material.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Sealed value is malformed")]
    MalformedSealed,

    #[error("Nonce space exhausted, vault must be re-created")]
    NonceExhausted,
}
