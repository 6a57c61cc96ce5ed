//! smaicrypt - Password-based file encryption into `.smai` containers
//!
//! A container is a 16-byte random salt followed by a NaCl secretbox
//! (XSalsa20Poly1305) whose key is derived from the password and salt with
//! PBKDF2-HMAC-SHA256. See [`file_ops`] for the file-level operations.

#![forbid(unsafe_code)]

pub mod container;
pub mod error;
pub mod file_ops;
pub mod kdf;
pub mod passphrase;
pub mod secretcrypt;

pub use error::{ErrorCategory, ErrorKind, Result, SmaiError};
pub use file_ops::{
    Options, OverwritePolicy, decrypt_file, decrypt_file_with_options, encrypt_file,
    encrypt_file_with_options,
};
