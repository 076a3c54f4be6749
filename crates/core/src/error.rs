//! Error-kind taxonomy.

use thiserror::Error;

/// Classification tag carried by every error that can reach a caller.
///
/// Callers dispatch on the kind, never on message text.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Client input violates a business rule.
    Validation,
    /// The identifier has no corresponding durable row.
    NotFound,
    /// The event log was unreachable or send retries were exhausted.
    Transport,
    /// Unexpected store/cache failure.
    Internal,
    /// The consumer could not persist a decoded event (retried via redelivery).
    Apply,
    /// The event payload could not be decoded (dropped permanently).
    Decode,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation_error",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Transport => "transport_failure",
            ErrorKind::Internal => "internal_error",
            ErrorKind::Apply => "apply_failure",
            ErrorKind::Decode => "decode_failure",
        }
    }
}

impl core::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier parse failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid identifier: {0}")]
pub struct IdError(pub String);
