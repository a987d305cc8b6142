//! Credential encoding: clear, salted hash, or reversible encryption.
//!
//! - [`format`]: the `CredentialFormat` enum.
//! - [`codec`]: `CredentialCodec` encode / decode / verify.
//! - [`cipher`]: the symmetric key and sealing used by the Encrypted format.
//! - [`random`]: salt and password generation.

pub mod cipher;
pub mod codec;
pub mod format;
pub mod random;

pub use cipher::EncryptionKey;
pub use codec::{CredentialCodec, EncodedCredential};
pub use format::CredentialFormat;
pub use random::{generate_password, generate_salt, SALT_LEN};
