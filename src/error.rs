use std::error::Error as StdError;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorCategory {
    /// Any failure that cannot be confidently attributed to any other error
    /// category in this enum.
    ///
    /// In particular this means that use of Internal is never a guarantee
    /// the error is not, for example, due to a user error - merely that it
    /// cannot be confidently determined by the code.
    Internal,

    /// The user provided invalid input or performed an action that is
    /// unsupported or impossible to complete.
    User,
}

/// Fine-grained condition flags for consumers that want to branch on error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Reading the source or preparing the destination failed.
    Io,
    /// The input is not a container: wrong file suffix, or too short to hold
    /// a salt, nonce and tag.
    MalformedContainer,
    /// Authentication failed due to an incorrect password or tampering
    /// or corruption. These cases are indistinguishable.
    AuthenticationFailed,
    /// Writing the destination was aborted before the final rename. Nothing
    /// was left at the destination path.
    PartialWrite,
    /// The destination already exists and overwriting was not permitted.
    OutputExists,
    /// A password could not be obtained from the configured reader.
    PassphraseUnavailable,
    /// The cipher refused to seal the plaintext.
    Cipher,
}

impl ErrorKind {
    /// Short explanation of the condition, suitable for a status line.
    pub fn reason(self) -> &'static str {
        match self {
            ErrorKind::Io => "the file could not be read or the destination could not be prepared",
            ErrorKind::MalformedContainer => "the file is not a .smai container",
            ErrorKind::AuthenticationFailed => {
                "the password is wrong or the file is corrupted (these cannot be told apart)"
            }
            ErrorKind::PartialWrite => {
                "writing the output failed; no partial output was left behind"
            }
            ErrorKind::OutputExists => "the output file already exists",
            ErrorKind::PassphraseUnavailable => "no usable password was provided",
            ErrorKind::Cipher => "the cipher failed to encrypt the data",
        }
    }
}

#[derive(Debug, Error)]
#[error("{msg}")]
pub struct SmaiError {
    /// Broad error category, always provided.
    pub category: ErrorCategory,
    /// Optional specific condition tag for consumers that need to
    /// branch their behavior. Any code consuming errors MUST handle
    /// the absence of a defined kind.
    pub kind: Option<ErrorKind>,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    msg: String,
}

impl SmaiError {
    /// Creates a new error with a required category and display message.
    pub fn new(category: ErrorCategory, msg: impl Into<String>) -> Self {
        Self {
            category,
            kind: None,
            source: None,
            msg: msg.into(),
        }
    }

    /// Creates a new error that also tags the failure with a kind.
    pub fn with_kind(category: ErrorCategory, kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self {
            category,
            kind: Some(kind),
            source: None,
            msg: msg.into(),
        }
    }

    /// Creates a new error that carries both a kind tag and the originating source error.
    pub fn with_kind_and_source(
        category: ErrorCategory,
        kind: ErrorKind,
        msg: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            category,
            kind: Some(kind),
            source: Some(Box::new(source)),
            msg: msg.into(),
        }
    }

    /// The user-facing message carried by the error.
    pub fn message(&self) -> &str {
        &self.msg
    }

    /// Human-readable reason derived from the kind, if one is set.
    pub fn reason(&self) -> Option<&'static str> {
        self.kind.map(ErrorKind::reason)
    }

    /// Returns the preserved source error if present.
    pub fn source_error(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    /// Wraps the current error with a higher-level message while preserving the original as source.
    pub fn with_context(self, msg: impl Into<String>) -> Self {
        let category = self.category;
        let kind = self.kind;
        Self {
            category,
            kind,
            source: Some(Box::new(self)),
            msg: msg.into(),
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, SmaiError>;
