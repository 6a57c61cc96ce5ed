//! In-memory container codec
//!
//! A container is the salt used for key derivation followed by the sealed
//! output of [`secretcrypt`]:
//! - salt: 16 bytes
//! - nonce: 24 bytes
//! - sealed box: variable length (includes 16-byte Poly1305 tag)
//!
//! There is no magic number and no version field.

use crate::error::{ErrorCategory, ErrorKind, Result, SmaiError};
use crate::kdf::{self, SALT_LEN};
use crate::secretcrypt::{self, NONCE_LEN};
use zeroize::Zeroizing;

/// Borrowed view of a parsed container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Container<'a> {
    pub salt: [u8; SALT_LEN],
    pub sealed: &'a [u8],
}

impl<'a> Container<'a> {
    /// Split raw bytes into salt and sealed region.
    pub fn parse(bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() < SALT_LEN {
            return Err(SmaiError::with_kind(
                ErrorCategory::User,
                ErrorKind::MalformedContainer,
                format!(
                    "input likely truncated while reading salt ({} of {} bytes)",
                    bytes.len(),
                    SALT_LEN
                ),
            ));
        }
        let (salt, sealed) = bytes.split_at(SALT_LEN);
        let salt: [u8; SALT_LEN] = salt.try_into().map_err(|_| {
            SmaiError::with_kind(
                ErrorCategory::Internal,
                ErrorKind::MalformedContainer,
                "failed to read salt",
            )
        })?;
        Ok(Self { salt, sealed })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut output = Vec::with_capacity(SALT_LEN + self.sealed.len());
        output.extend_from_slice(&self.salt);
        output.extend_from_slice(self.sealed);
        output
    }
}

/// Encrypt plaintext with a password using a fresh salt and nonce.
pub fn seal(password: &str, plaintext: &[u8]) -> Result<Vec<u8>> {
    let salt = kdf::generate_salt();
    let key = kdf::derive_key(password, &salt);
    let sealed = secretcrypt::seal(&key, plaintext)?;
    Ok(Container {
        salt,
        sealed: &sealed,
    }
    .to_bytes())
}

/// Encrypt plaintext with a password using the provided salt and nonce.
///
/// This function is ONLY for generating deterministic output in tests.
/// NEVER use this in production - always use `seal()`.
pub fn seal_with(
    password: &str,
    plaintext: &[u8],
    salt: &[u8; SALT_LEN],
    nonce: &[u8; NONCE_LEN],
) -> Result<Vec<u8>> {
    let key = kdf::derive_key(password, salt);
    let sealed = secretcrypt::seal_with_nonce(&key, nonce, plaintext)?;
    Ok(Container {
        salt: *salt,
        sealed: &sealed,
    }
    .to_bytes())
}

/// Decrypt and authenticate a container with a password.
///
/// Structural problems are reported before the (slow) key derivation runs.
pub fn open(password: &str, bytes: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    let container = Container::parse(bytes)?;
    if container.sealed.len() < secretcrypt::MIN_SEALED_LEN {
        return Err(SmaiError::with_kind(
            ErrorCategory::User,
            ErrorKind::MalformedContainer,
            "input likely truncated while reading sealed box",
        ));
    }
    let key = kdf::derive_key(password, &container.salt);
    secretcrypt::open(&key, container.sealed)
}
