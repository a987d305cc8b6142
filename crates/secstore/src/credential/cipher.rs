//! Symmetric encryption for reversible credentials.
//!
//! ChaCha20-Poly1305 under a provider-level key. The nonce is synthetic:
//! HKDF-SHA256 over the key, expanded with the plaintext as info. Encrypting
//! the same plaintext twice therefore yields the same ciphertext, which lets
//! callers verify a candidate by re-encoding it, and a nonce only repeats for
//! an identical plaintext.
//!
//! Sealed layout: `nonce (12 bytes) ‖ ciphertext ‖ tag (16 bytes)`.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Result, SecStoreError};

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// Domain separation for the nonce derivation.
const NONCE_SALT: &[u8] = b"secstore/credential-nonce";

/// 32-byte key for reversible credentials. Wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey([u8; KEY_LEN]);

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey(..)")
    }
}

impl EncryptionKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Derive a key from a provider secret using HKDF-SHA256 (RFC 5869),
    /// with `context` as info.
    ///
    /// # Errors
    ///
    /// `SecStoreError::InvalidConfig` for an empty secret.
    pub fn derive(secret: &[u8], context: &str) -> Result<Self> {
        if secret.is_empty() {
            return Err(SecStoreError::InvalidConfig(
                "encryption secret must not be empty".to_string(),
            ));
        }
        let hk = Hkdf::<Sha256>::new(None, secret);
        let mut output = [0u8; KEY_LEN];
        hk.expand(context.as_bytes(), &mut output)
            .map_err(|e| SecStoreError::InvalidConfig(format!("HKDF expand failed: {e}")))?;
        Ok(Self(output))
    }

    fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

fn synthetic_nonce(key: &EncryptionKey, plaintext: &[u8]) -> Result<[u8; NONCE_LEN]> {
    let hk = Hkdf::<Sha256>::new(Some(NONCE_SALT), key.as_bytes());
    let mut nonce = [0u8; NONCE_LEN];
    hk.expand(plaintext, &mut nonce)
        .map_err(|e| SecStoreError::EncryptionFailed(format!("nonce derivation: {e}")))?;
    Ok(nonce)
}

/// Encrypt `plaintext`; returns `nonce ‖ ciphertext`.
pub fn seal(key: &EncryptionKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let nonce_bytes = synthetic_nonce(key, plaintext)?;
    let cipher = ChaCha20Poly1305::new_from_slice(key.as_bytes())
        .map_err(|e| SecStoreError::EncryptionFailed(format!("cipher init: {e}")))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|e| SecStoreError::EncryptionFailed(format!("encrypt: {e}")))?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Decrypt a `nonce ‖ ciphertext` blob produced by [`seal`].
pub fn open(key: &EncryptionKey, sealed: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() < NONCE_LEN {
        return Err(SecStoreError::DecryptionFailed(
            "ciphertext shorter than nonce".to_string(),
        ));
    }
    let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
    let cipher = ChaCha20Poly1305::new_from_slice(key.as_bytes())
        .map_err(|e| SecStoreError::DecryptionFailed(format!("cipher init: {e}")))?;
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| SecStoreError::DecryptionFailed("authentication failed".to_string()))
}
