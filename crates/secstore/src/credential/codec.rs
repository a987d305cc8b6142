//! `CredentialCodec`: turns plain secrets into stored form and back.
//!
//! Formats:
//! - `Clear` stores the secret unchanged with an empty salt.
//! - `Hashed` stores the uppercase hex SHA-1 of `salt + secret` (UTF-8).
//! - `Encrypted` seals `salt bytes ‖ UTF-16LE(secret)` with the provider key
//!   and stores the result base64-encoded.
//!
//! Hashed and Encrypted values are deterministic for a given salt, so a
//! candidate is verified by encoding it with the stored salt and comparing.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use sha1::{Digest, Sha1};

use super::cipher::{self, EncryptionKey};
use super::format::CredentialFormat;
use super::random::{generate_salt, SALT_LEN};
use crate::compare;
use crate::error::{Result, SecStoreError};

/// A secret in stored form. `salt` is empty exactly when the format is Clear.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedCredential {
    pub value: String,
    pub salt: String,
}

/// Encoder for one provider's credential format.
#[derive(Debug, Clone)]
pub struct CredentialCodec {
    format: CredentialFormat,
    key: Option<EncryptionKey>,
    case_sensitive: bool,
}

impl CredentialCodec {
    /// Create a codec.
    ///
    /// # Errors
    ///
    /// `SecStoreError::InvalidConfig` when `format` is Encrypted and no key
    /// is supplied.
    pub fn new(
        format: CredentialFormat,
        key: Option<EncryptionKey>,
        case_sensitive: bool,
    ) -> Result<Self> {
        if format == CredentialFormat::Encrypted && key.is_none() {
            return Err(SecStoreError::InvalidConfig(
                "Encrypted credential format requires an encryption key".to_string(),
            ));
        }
        Ok(Self {
            format,
            key,
            case_sensitive,
        })
    }

    pub fn format(&self) -> CredentialFormat {
        self.format
    }

    pub fn case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    /// Encode `plain`. Hashed and Encrypted reuse `salt` when given and
    /// generate a fresh one otherwise. Clear ignores it.
    pub fn encode(&self, plain: &str, salt: Option<&str>) -> Result<EncodedCredential> {
        match self.format {
            CredentialFormat::Clear => Ok(EncodedCredential {
                value: plain.to_string(),
                salt: String::new(),
            }),
            CredentialFormat::Hashed | CredentialFormat::Encrypted => {
                let salt = match salt {
                    Some(s) if !s.is_empty() => s.to_string(),
                    _ => generate_salt(),
                };
                let value = self.encode_with_salt(plain, &salt)?;
                Ok(EncodedCredential { value, salt })
            }
        }
    }

    /// Recover the plain secret from its stored form.
    ///
    /// # Errors
    ///
    /// - `SecStoreError::IrreversibleCredential` for Hashed values.
    /// - `SecStoreError::DecryptionFailed` when an Encrypted value is not
    ///   valid base64, fails authentication, or does not hold a salt
    ///   followed by UTF-16LE text.
    pub fn decode(&self, stored: &str) -> Result<String> {
        match self.format {
            CredentialFormat::Clear => Ok(stored.to_string()),
            CredentialFormat::Hashed => Err(SecStoreError::IrreversibleCredential),
            CredentialFormat::Encrypted => {
                let sealed = STANDARD
                    .decode(stored.trim())
                    .map_err(|e| SecStoreError::DecryptionFailed(format!("base64: {e}")))?;
                let plaintext = cipher::open(self.key()?, &sealed)?;
                if plaintext.len() < SALT_LEN {
                    return Err(SecStoreError::DecryptionFailed(
                        "payload shorter than salt".to_string(),
                    ));
                }
                utf16le_decode(&plaintext[SALT_LEN..])
            }
        }
    }

    /// Check `candidate` against a stored value and its salt.
    ///
    /// Clear values compare with the configured case sensitivity; hex
    /// digests ignore case; ciphertexts compare exactly.
    pub fn verify(&self, candidate: &str, stored: &str, salt: &str) -> Result<bool> {
        match self.format {
            CredentialFormat::Clear => {
                Ok(compare::equals(candidate, stored, self.case_sensitive))
            }
            CredentialFormat::Hashed => {
                let encoded = self.encode_with_salt(candidate, salt)?;
                Ok(encoded.eq_ignore_ascii_case(stored.trim()))
            }
            CredentialFormat::Encrypted => {
                let encoded = self.encode_with_salt(candidate, salt)?;
                Ok(encoded == stored.trim())
            }
        }
    }

    fn encode_with_salt(&self, plain: &str, salt: &str) -> Result<String> {
        match self.format {
            CredentialFormat::Clear => Ok(plain.to_string()),
            CredentialFormat::Hashed => {
                let mut hasher = Sha1::new();
                hasher.update(salt.as_bytes());
                hasher.update(plain.as_bytes());
                Ok(hex::encode_upper(hasher.finalize()))
            }
            CredentialFormat::Encrypted => {
                let salt_bytes = STANDARD
                    .decode(salt)
                    .map_err(|e| SecStoreError::InvalidSalt(format!("not base64: {e}")))?;
                if salt_bytes.len() != SALT_LEN {
                    return Err(SecStoreError::InvalidSalt(format!(
                        "expected {SALT_LEN} bytes, got {}",
                        salt_bytes.len()
                    )));
                }
                let mut payload = salt_bytes;
                payload.extend(plain.encode_utf16().flat_map(u16::to_le_bytes));
                let sealed = cipher::seal(self.key()?, &payload)?;
                Ok(STANDARD.encode(sealed))
            }
        }
    }

    fn key(&self) -> Result<&EncryptionKey> {
        self.key.as_ref().ok_or_else(|| {
            SecStoreError::InvalidConfig("no encryption key configured".to_string())
        })
    }
}

fn utf16le_decode(bytes: &[u8]) -> Result<String> {
    if bytes.len() % 2 != 0 {
        return Err(SecStoreError::DecryptionFailed(
            "odd-length UTF-16 payload".to_string(),
        ));
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units)
        .map_err(|e| SecStoreError::DecryptionFailed(format!("invalid UTF-16: {e}")))
}
