//! Secure random salts and generated secrets.
//!
//! Uses the operating system's cryptographic random source via `rand`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rand::RngCore;

/// Length in bytes of every generated salt.
pub const SALT_LEN: usize = 16;

/// Length in bytes of the random material behind a generated password.
const GENERATED_PASSWORD_BYTES: usize = 16;

/// Fill a buffer with cryptographically secure random bytes.
pub fn fill_random(buf: &mut [u8]) {
    rand::thread_rng().fill_bytes(buf);
}

/// Generate a fixed-size array of cryptographically secure random bytes.
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut buf = [0u8; N];
    fill_random(&mut buf);
    buf
}

/// Generate a fresh 16-byte salt, base64-encoded for storage.
pub fn generate_salt() -> String {
    STANDARD.encode(random_bytes::<SALT_LEN>())
}

/// Generate a random password, e.g. for a reset.
pub fn generate_password() -> String {
    STANDARD.encode(random_bytes::<GENERATED_PASSWORD_BYTES>())
}
