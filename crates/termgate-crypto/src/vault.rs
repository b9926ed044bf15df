//! Process-wide vault for secrets at rest.
//!
//! The vault key is derived once from the configured secret via
//! HKDF-SHA256 and is immutable for the process lifetime. Sealed values
//! are `base64(nonce || ciphertext)` so each carries everything needed for
//! decryption except the key.

use std::sync::atomic::{AtomicU32, Ordering};

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use hkdf::Hkdf;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::encoding;
use crate::error::CryptoError;

/// HKDF info string for vault key derivation.
const HKDF_INFO: &[u8] = b"termgate-vault-v1";

/// HKDF salt for domain separation (recommended by RFC 5869).
const HKDF_SALT: &[u8] = b"termgate-vault-hkdf-salt-v1";

/// Nonce size for ChaCha20-Poly1305.
pub const NONCE_SIZE: usize = 12;

/// Vault holding the derived symmetric key.
///
/// Nonces never repeat within a vault instance: a 4-byte monotonic counter
/// is combined with an 8-byte random prefix chosen at construction.
pub struct CredentialVault {
    cipher: ChaCha20Poly1305,
    nonce_prefix: [u8; 8],
    nonce_counter: AtomicU32,
}

impl Drop for CredentialVault {
    fn drop(&mut self) {
        self.nonce_prefix.zeroize();
    }
}

impl CredentialVault {
    /// Build a vault from the configured secret.
    pub fn new(secret: &[u8]) -> Result<Self, CryptoError> {
        let hk = Hkdf::<Sha256>::new(Some(HKDF_SALT), secret);
        let mut key_bytes = [0u8; 32];
        hk.expand(HKDF_INFO, &mut key_bytes)
            .map_err(|e| CryptoError::KeyDerivationFailed(e.to_string()))?;

        let key = Key::from_slice(&key_bytes);
        let cipher = ChaCha20Poly1305::new(key);
        key_bytes.zeroize();

        let mut nonce_prefix = [0u8; 8];
        OsRng.fill_bytes(&mut nonce_prefix);

        Ok(Self {
            cipher,
            nonce_prefix,
            nonce_counter: AtomicU32::new(0),
        })
    }

    /// Encrypt a secret, returning the self-describing sealed string.
    pub fn seal(&self, plaintext: &[u8]) -> Result<String, CryptoError> {
        let nonce_bytes = self.next_nonce()?;
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        let mut packed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        packed.extend_from_slice(&nonce_bytes);
        packed.extend_from_slice(&ciphertext);
        Ok(encoding::encode(&packed))
    }

    /// Convenience for string secrets.
    pub fn seal_str(&self, plaintext: &str) -> Result<String, CryptoError> {
        self.seal(plaintext.as_bytes())
    }

    /// Decrypt a sealed value. Fails on tamper, wrong key or malformed
    /// input; callers never see partial plaintext.
    pub fn open(&self, sealed: &str) -> Result<Vec<u8>, CryptoError> {
        let packed = encoding::decode(sealed).ok_or(CryptoError::MalformedSealed)?;
        if packed.len() <= NONCE_SIZE {
            return Err(CryptoError::MalformedSealed);
        }
        let (nonce_bytes, ciphertext) = packed.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);
        self.cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
    }

    /// Decrypt a sealed value that is expected to be UTF-8.
    pub fn open_str(&self, sealed: &str) -> Result<String, CryptoError> {
        let bytes = self.open(sealed)?;
        String::from_utf8(bytes).map_err(|_| CryptoError::MalformedSealed)
    }

    /// Generate the next unique nonce.
    ///
    /// Layout: [4-byte counter (big-endian)] [8-byte random prefix].
    /// Compare-and-swap prevents counter wrapping under concurrent access;
    /// `Ordering::Relaxed` suffices because only uniqueness matters.
    fn next_nonce(&self) -> Result<[u8; NONCE_SIZE], CryptoError> {
        loop {
            let current = self.nonce_counter.load(Ordering::Relaxed);
            if current == u32::MAX {
                return Err(CryptoError::NonceExhausted);
            }
            if let Ok(prev) = self.nonce_counter.compare_exchange_weak(
                current,
                current + 1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                let mut nonce = [0u8; NONCE_SIZE];
                nonce[..4].copy_from_slice(&prev.to_be_bytes());
                nonce[4..].copy_from_slice(&self.nonce_prefix);
                return Ok(nonce);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn test_vault() -> CredentialVault {
        CredentialVault::new(b"test-secret-for-vault").unwrap()
    }

    #[test]
    fn seal_open_roundtrip() {
        let vault = test_vault();
        let sealed = vault.seal_str("s3cret-password").unwrap();
        assert_eq!(vault.open_str(&sealed).unwrap(), "s3cret-password");
    }

    #[test]
    fn sealing_twice_yields_different_ciphertexts() {
        let vault = test_vault();
        let a = vault.seal_str("same plaintext").unwrap();
        let b = vault.seal_str("same plaintext").unwrap();
        assert_ne!(a, b);
        assert_eq!(vault.open_str(&a).unwrap(), "same plaintext");
        assert_eq!(vault.open_str(&b).unwrap(), "same plaintext");
    }

    #[test]
    fn same_secret_opens_across_instances() {
        let a = CredentialVault::new(b"shared-secret").unwrap();
        let b = CredentialVault::new(b"shared-secret").unwrap();
        let sealed = a.seal_str("portable").unwrap();
        assert_eq!(b.open_str(&sealed).unwrap(), "portable");
    }

    #[test]
    fn wrong_key_fails() {
        let a = CredentialVault::new(b"secret-a").unwrap();
        let b = CredentialVault::new(b"secret-b").unwrap();
        let sealed = a.seal_str("hidden").unwrap();
        assert!(matches!(
            b.open(&sealed),
            Err(CryptoError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn tampering_any_byte_fails() {
        let vault = test_vault();
        let sealed = vault.seal_str("hidden").unwrap();
        let mut packed = crate::encoding::decode(&sealed).unwrap();
        for i in 0..packed.len() {
            packed[i] ^= 0x01;
            let tampered = crate::encoding::encode(&packed);
            assert!(vault.open(&tampered).is_err(), "byte {i} tamper accepted");
            packed[i] ^= 0x01;
        }
    }

    #[test]
    fn malformed_input_is_rejected() {
        let vault = test_vault();
        assert!(matches!(
            vault.open("not base64 at all!"),
            Err(CryptoError::MalformedSealed)
        ));
        // valid base64 but shorter than a nonce
        let short = crate::encoding::encode(b"tiny");
        assert!(matches!(
            vault.open(&short),
            Err(CryptoError::MalformedSealed)
        ));
    }

    #[test]
    fn empty_plaintext_roundtrip() {
        let vault = test_vault();
        let sealed = vault.seal(b"").unwrap();
        assert!(vault.open(&sealed).unwrap().is_empty());
    }

    #[test]
    fn nonces_never_repeat() {
        let vault = test_vault();
        let mut nonces = std::collections::HashSet::new();
        for _ in 0..1000 {
            let sealed = vault.seal(b"x").unwrap();
            let packed = crate::encoding::decode(&sealed).unwrap();
            let mut nonce = [0u8; NONCE_SIZE];
            nonce.copy_from_slice(&packed[..NONCE_SIZE]);
            assert!(nonces.insert(nonce), "nonce collision detected");
        }
    }

    #[test]
    fn nonce_exhaustion_returns_error() {
        let vault = test_vault();
        vault.nonce_counter.store(u32::MAX, Ordering::Relaxed);
        assert!(matches!(
            vault.seal(b"should fail"),
            Err(CryptoError::NonceExhausted)
        ));
    }
}
