//! Provider configuration.
//!
//! Read once, then handed to the codecs and stores it configures.
//!
//! ```json
//! {
//!   "case_sensitive": false,
//!   "password_format": "Hashed",
//!   "use_universal_time": true,
//!   "store": { "change_detection": "poll", "poll_interval_ms": 500 }
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::credential::{CredentialCodec, CredentialFormat, EncryptionKey};
use crate::error::{Result, SecStoreError};
use crate::profile::ProfileCodec;
use crate::storage::StoreOptions;

/// Settings shared by every store and codec of one provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Name comparisons (user names, property names, clear passwords).
    pub case_sensitive: bool,
    pub password_format: CredentialFormat,
    /// Render timestamps in UTC rather than the local zone.
    pub use_universal_time: bool,
    pub store: StoreOptions,
}

impl SecurityConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| SecStoreError::InvalidConfig(format!("config: {e}")))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|source| SecStoreError::Load {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("loaded config from {}", path.display());
        Self::from_json_str(&json)
    }

    /// A credential codec for the configured format.
    ///
    /// # Errors
    ///
    /// `SecStoreError::InvalidConfig` when the format is Encrypted and `key`
    /// is `None`.
    pub fn credential_codec(&self, key: Option<EncryptionKey>) -> Result<CredentialCodec> {
        CredentialCodec::new(self.password_format, key, self.case_sensitive)
    }

    pub fn profile_codec(&self) -> ProfileCodec {
        ProfileCodec::new(self.case_sensitive)
    }
}
