//! Credential vault for the termgate gateway.
//!
//! Symmetric encryption of secrets at rest (SSH passwords, private keys,
//! passphrases) using ChaCha20-Poly1305 with a key derived from the
//! configured secret via HKDF-SHA256. Sealed values are self-describing
//! strings carrying their own nonce.

pub mod encoding;
pub mod error;
pub mod vault;

pub use error::CryptoError;
pub use vault::CredentialVault;
