//! Error types for KV service calls.

use std::io;

use thiserror::Error;

/// Errors a KV backend can report.
///
/// None of these say anything about the presence of a key; absence is
/// expressed through `Option` and [`CasOutcome`](crate::CasOutcome).
#[derive(Debug, Error)]
pub enum KvError {
    /// The service could not serve the request (transport failure, lock
    /// poisoning, injected fault).
    #[error("kv service unavailable: {0}")]
    Unavailable(String),

    /// I/O error from a durable backend.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Serialization or deserialization of a log entry failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Durable state is inconsistent and cannot be replayed.
    #[error("corrupt store: {0}")]
    Corrupt(String),

    /// The backend refuses writes until it is reopened.
    #[error("kv store closed: {0}")]
    Closed(String),
}

impl KvError {
    /// Whether a write that failed with this error may still have taken
    /// effect. `Closed` and `Serialization` are raised before anything is
    /// written.
    pub fn write_may_have_applied(&self) -> bool {
        !matches!(self, KvError::Closed(_) | KvError::Serialization(_))
    }
}

/// Convenience type alias for KV operations.
pub type KvResult<T> = std::result::Result<T, KvError>;
