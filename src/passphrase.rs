//! Password reading functionality

use crate::error::{ErrorCategory, ErrorKind, Result, SmaiError};
use std::io::{self, IsTerminal, Read, Write};
use zeroize::Zeroizing;

/// Trait for reading passwords from various sources
pub trait PassphraseReader {
    /// Read a password as UTF-8 text.
    ///
    /// Returns the password wrapped in `Zeroizing` to ensure it is securely
    /// wiped from memory when dropped.
    fn read_passphrase(&mut self) -> Result<Zeroizing<String>>;
}

/// Returns a fixed password (for testing)
pub struct ConstantPassphraseReader {
    passphrase: Zeroizing<String>,
}

impl ConstantPassphraseReader {
    pub fn new(passphrase: impl Into<String>) -> Self {
        Self {
            passphrase: Zeroizing::new(passphrase.into()),
        }
    }
}

impl PassphraseReader for ConstantPassphraseReader {
    fn read_passphrase(&mut self) -> Result<Zeroizing<String>> {
        Ok(self.passphrase.clone())
    }
}

/// Reads the password from any io::Read source until EOF
///
/// The input is used verbatim; a trailing newline is part of the password.
pub struct ReaderPassphraseReader {
    reader: Box<dyn Read>,
}

impl ReaderPassphraseReader {
    pub fn new(reader: Box<dyn Read>) -> Self {
        Self { reader }
    }
}

impl PassphraseReader for ReaderPassphraseReader {
    fn read_passphrase(&mut self) -> Result<Zeroizing<String>> {
        let mut data = Zeroizing::new(Vec::new());
        self.reader.read_to_end(&mut data).map_err(|e| {
            SmaiError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                format!("error reading password: {}", e),
                e,
            )
        })?;
        let passphrase = std::str::from_utf8(&data).map_err(|e| {
            SmaiError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::PassphraseUnavailable,
                "password is not valid UTF-8",
                e,
            )
        })?;
        Ok(Zeroizing::new(passphrase.to_owned()))
    }
}

/// Reads the password from the terminal with no echo
#[derive(Default)]
pub struct TerminalPassphraseReader {
    confirm: bool,
}

impl TerminalPassphraseReader {
    pub fn new() -> Self {
        Self { confirm: false }
    }

    /// Ask for the password twice and fail if the entries differ.
    pub fn with_confirmation() -> Self {
        Self { confirm: true }
    }

    fn prompt(&self, prompt: &str) -> Result<Zeroizing<String>> {
        let mut stderr = io::stderr();
        stderr.write_all(prompt.as_bytes()).map_err(|e| {
            SmaiError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                format!("failed to write prompt: {}", e),
                e,
            )
        })?;
        stderr.flush().map_err(|e| {
            SmaiError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                format!("failed to flush prompt: {}", e),
                e,
            )
        })?;

        // Read password *without echo*
        let passphrase = rpassword::read_password().map_err(|e| {
            SmaiError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::PassphraseUnavailable,
                format!("failure reading password: {}", e),
                e,
            )
        })?;

        Ok(Zeroizing::new(passphrase))
    }
}

impl PassphraseReader for TerminalPassphraseReader {
    fn read_passphrase(&mut self) -> Result<Zeroizing<String>> {
        if !io::stdin().is_terminal() {
            return Err(SmaiError::with_kind(
                ErrorCategory::User,
                ErrorKind::PassphraseUnavailable,
                "cannot read password from terminal - stdin is not a terminal",
            ));
        }

        let passphrase = self.prompt("Password (smaicrypt): ")?;
        if self.confirm {
            let again = self.prompt("Confirm password (smaicrypt): ")?;
            if *again != *passphrase {
                return Err(SmaiError::with_kind(
                    ErrorCategory::User,
                    ErrorKind::PassphraseUnavailable,
                    "passwords do not match",
                ));
            }
        }
        Ok(passphrase)
    }
}

/// Wraps another PassphraseReader and caches the result
///
/// Provides "at most once" semantics - the upstream reader is called
/// only on the first successful invocation, and subsequent calls return
/// the cached value.
pub struct CachingPassphraseReader {
    upstream: Box<dyn PassphraseReader>,
    cached: Option<Zeroizing<String>>,
}

impl CachingPassphraseReader {
    pub fn new(upstream: Box<dyn PassphraseReader>) -> Self {
        Self {
            upstream,
            cached: None,
        }
    }
}

impl PassphraseReader for CachingPassphraseReader {
    fn read_passphrase(&mut self) -> Result<Zeroizing<String>> {
        if let Some(cached) = &self.cached {
            return Ok(cached.clone());
        }
        let passphrase = self.upstream.read_passphrase()?;
        self.cached = Some(passphrase.clone());
        Ok(passphrase)
    }
}

/// Rejects empty passwords from the wrapped reader
///
/// The cryptographic core accepts any password; this is where the command
/// line front end applies its minimal policy.
pub struct NonEmptyPassphraseReader {
    upstream: Box<dyn PassphraseReader>,
}

impl NonEmptyPassphraseReader {
    pub fn new(upstream: Box<dyn PassphraseReader>) -> Self {
        Self { upstream }
    }
}

impl PassphraseReader for NonEmptyPassphraseReader {
    fn read_passphrase(&mut self) -> Result<Zeroizing<String>> {
        let passphrase = self.upstream.read_passphrase()?;
        if passphrase.is_empty() {
            return Err(SmaiError::with_kind(
                ErrorCategory::User,
                ErrorKind::PassphraseUnavailable,
                "password must not be empty",
            ));
        }
        Ok(passphrase)
    }
}
