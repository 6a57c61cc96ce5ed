//! Password-based key derivation
//!
//! Keys are derived with PBKDF2 using HMAC-SHA256 as the PRF. The iteration
//! count is not recorded in containers, so both directions must agree on
//! [`ITERATIONS`]. Changing it makes existing containers undecryptable.

use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;
use zeroize::Zeroizing;

/// Length of salt in bytes
pub const SALT_LEN: usize = 16;

/// Length of derived key in bytes
pub const KEY_LEN: usize = 32;

/// PBKDF2 work factor
pub const ITERATIONS: u32 = 480_000;

/// Derive a 32-byte key from a password and salt.
///
/// Deterministic in `(password, salt)`. The password is used as its UTF-8
/// bytes without any normalization; an empty password is accepted.
pub fn derive_key(password: &str, salt: &[u8; SALT_LEN]) -> Zeroizing<[u8; KEY_LEN]> {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, ITERATIONS, &mut *key);
    key
}

/// Generate a fresh salt from the operating system's CSPRNG.
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}
