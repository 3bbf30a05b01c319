//! Error taxonomy of the record store.

use std::time::Duration;

use garuda_kv::KvError;
use garuda_types::{RecordError, Username};
use thiserror::Error;

/// Errors from record store operations.
///
/// The first group describes the caller's request against the current state
/// and is never worth retrying unchanged. The second group (see
/// [`StoreError::is_unavailable`]) means the KV layer could not give a
/// trustworthy answer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The referenced user does not exist.
    #[error("user not found: {username}")]
    NotFound { username: String },

    /// A user with this name already exists.
    #[error("user already exists: {username}")]
    AlreadyExists { username: String },

    /// The user has no post with this title.
    #[error("post {title:?} not found for {username}")]
    PostNotFound { username: String, title: String },

    /// The follower does not follow the followee.
    #[error("{follower} does not follow {followee}")]
    FollowingNotFound { follower: String, followee: String },

    /// The follower already follows the followee.
    #[error("{follower} already follows {followee}")]
    AlreadyFollowing { follower: String, followee: String },

    /// A user tried to follow themselves.
    #[error("cannot follow yourself: {username}")]
    SelfFollow { username: String },

    /// The username cannot be used as a key.
    #[error("invalid username {name:?}: {reason}")]
    InvalidUsername { name: String, reason: String },

    /// Transport or backend failure reported by the KV service.
    ///
    /// When `ambiguous` is set the failed call was a write that may still
    /// have been applied.
    #[error("store unavailable: {source} (write outcome unknown: {ambiguous})")]
    Unavailable {
        #[source]
        source: KvError,
        ambiguous: bool,
    },

    /// A single KV call exceeded its deadline.
    ///
    /// When `ambiguous` is set the call was a write that may or may not have
    /// been applied.
    #[error("kv {op} timed out after {after:?} (write outcome unknown: {ambiguous})")]
    Timeout {
        op: &'static str,
        after: Duration,
        ambiguous: bool,
    },

    /// Stored bytes could not be decoded into a record.
    #[error("corrupt record: {0}")]
    Decode(String),

    /// A record could not be encoded.
    #[error("record encoding failed: {0}")]
    Encode(String),

    /// The encoded record exceeds the maximum stored size.
    #[error("record for {username} too large: {size} bytes (max {max})")]
    RecordTooLarge {
        username: String,
        size: usize,
        max: usize,
    },

    /// Concurrent writers kept winning the compare-and-swap race.
    #[error("gave up on {username} after {attempts} conflicting attempts")]
    Contention { username: String, attempts: u32 },

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// Attach the record owner to an in-memory record error.
    pub fn from_record(owner: &Username, err: RecordError) -> Self {
        match err {
            RecordError::InvalidUsername { name, reason } => Self::InvalidUsername { name, reason },
            RecordError::PostNotFound { title } => Self::PostNotFound {
                username: owner.to_string(),
                title,
            },
            RecordError::FollowingNotFound { followee } => Self::FollowingNotFound {
                follower: owner.to_string(),
                followee,
            },
            RecordError::AlreadyFollowing { followee } => Self::AlreadyFollowing {
                follower: owner.to_string(),
                followee,
            },
            RecordError::SelfFollow { username } => Self::SelfFollow { username },
        }
    }

    /// Wrap a failed KV call. `write` marks calls that modify the store.
    pub(crate) fn kv(source: KvError, write: bool) -> Self {
        let ambiguous = write && source.write_may_have_applied();
        Self::Unavailable { source, ambiguous }
    }

    pub(crate) fn not_found(username: &Username) -> Self {
        Self::NotFound {
            username: username.to_string(),
        }
    }

    /// Returns `true` for the store-unavailable class: transport failures,
    /// timeouts, undecodable records and exhausted CAS retries.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::Unavailable { .. }
                | Self::Timeout { .. }
                | Self::Decode(_)
                | Self::Contention { .. }
        )
    }

    /// Returns `true` if re-running the whole operation may succeed and
    /// cannot double-apply it.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Contention { .. } => true,
            Self::Unavailable { ambiguous, .. } | Self::Timeout { ambiguous, .. } => !ambiguous,
            _ => false,
        }
    }
}

impl From<KvError> for StoreError {
    /// KV failures outside a store operation, such as opening a backend.
    fn from(source: KvError) -> Self {
        Self::Unavailable {
            source,
            ambiguous: false,
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
