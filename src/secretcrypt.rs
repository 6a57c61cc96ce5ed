//! Authenticated encryption using NaCl secretbox (XSalsa20Poly1305)
//!
//! The sealed format is self-contained:
//! - nonce: 24 bytes
//! - sealed box: variable length (16-byte Poly1305 tag followed by the ciphertext)

use crate::error::{ErrorCategory, ErrorKind, Result, SmaiError};
use crate::kdf::KEY_LEN;
use crypto_secretbox::aead::{Aead, KeyInit};
use crypto_secretbox::{Nonce, XSalsa20Poly1305};
use rand::RngCore;
use rand::rngs::OsRng;
use zeroize::Zeroizing;

/// Length of nonce in bytes
pub const NONCE_LEN: usize = 24;

/// Length of the Poly1305 tag in bytes
pub const TAG_LEN: usize = 16;

/// Smallest possible sealed output (empty plaintext)
pub const MIN_SEALED_LEN: usize = NONCE_LEN + TAG_LEN;

/// Seal plaintext under `key` using a random nonce.
///
/// Returns nonce(24) + sealedbox(variable).
pub fn seal(key: &[u8; KEY_LEN], plaintext: &[u8]) -> Result<Vec<u8>> {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    seal_with_nonce(key, &nonce, plaintext)
}

/// Seal plaintext under `key` using the provided nonce.
///
/// Only for producing deterministic output in tests. Reusing a nonce with
/// the same key destroys confidentiality; use [`seal`] everywhere else.
pub fn seal_with_nonce(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    plaintext: &[u8],
) -> Result<Vec<u8>> {
    let cipher = XSalsa20Poly1305::new(&(*key).into());
    let sealed_box = cipher
        .encrypt(&Nonce::from(*nonce), plaintext)
        .map_err(|e| {
            SmaiError::with_kind(
                ErrorCategory::Internal,
                ErrorKind::Cipher,
                format!("secretbox seal failed: {}", e),
            )
        })?;

    let mut output = Vec::with_capacity(NONCE_LEN + sealed_box.len());
    output.extend_from_slice(nonce);
    output.extend_from_slice(&sealed_box);
    Ok(output)
}

/// Open sealed data produced by [`seal`], verifying its authenticity.
pub fn open(key: &[u8; KEY_LEN], sealed: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    if sealed.len() < MIN_SEALED_LEN {
        return Err(SmaiError::with_kind(
            ErrorCategory::User,
            ErrorKind::MalformedContainer,
            "input likely truncated while reading sealed box",
        ));
    }
    let (nonce, sealed_box) = sealed.split_at(NONCE_LEN);
    let nonce: [u8; NONCE_LEN] = nonce.try_into().map_err(|_| {
        SmaiError::with_kind(
            ErrorCategory::Internal,
            ErrorKind::MalformedContainer,
            "failed to read nonce",
        )
    })?;

    let cipher = XSalsa20Poly1305::new(&(*key).into());
    let plaintext = cipher
        .decrypt(&Nonce::from(nonce), sealed_box)
        .map_err(|_| {
            SmaiError::with_kind(
                ErrorCategory::User,
                ErrorKind::AuthenticationFailed,
                "corrupt input, tampered-with data, or bad password",
            )
        })?;

    Ok(Zeroizing::new(plaintext))
}
