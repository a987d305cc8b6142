//! Storage format for credentials.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SecStoreError;

/// How a secret is stored. Fixed per store, not per record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CredentialFormat {
    /// Stored as given.
    Clear,
    /// One-way digest of salt and secret.
    #[default]
    Hashed,
    /// Reversible symmetric encryption of salt and secret.
    Encrypted,
}

impl CredentialFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialFormat::Clear => "Clear",
            CredentialFormat::Hashed => "Hashed",
            CredentialFormat::Encrypted => "Encrypted",
        }
    }

    /// Whether stored values of this format carry a salt.
    pub fn uses_salt(&self) -> bool {
        !matches!(self, CredentialFormat::Clear)
    }
}

impl fmt::Display for CredentialFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CredentialFormat {
    type Err = SecStoreError;

    /// Parse a format name, ignoring case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "clear" => Ok(CredentialFormat::Clear),
            "hashed" => Ok(CredentialFormat::Hashed),
            "encrypted" => Ok(CredentialFormat::Encrypted),
            other => Err(SecStoreError::InvalidConfig(format!(
                "unknown credential format {other:?}"
            ))),
        }
    }
}
