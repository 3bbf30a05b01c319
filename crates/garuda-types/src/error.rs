//! Error types for record-level operations.

use thiserror::Error;

/// Errors raised while validating or mutating a [`UserRecord`](crate::UserRecord)
/// in memory.
///
/// These never involve the KV service; the store layer lifts them into its
/// own error type together with the username the operation targeted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    /// The username is not usable as a store key.
    #[error("invalid username {name:?}: {reason}")]
    InvalidUsername { name: String, reason: String },

    /// No post with this title exists in the record.
    #[error("post not found: {title}")]
    PostNotFound { title: String },

    /// The record does not follow this user.
    #[error("not following {followee}")]
    FollowingNotFound { followee: String },

    /// The record already follows this user.
    #[error("already following {followee}")]
    AlreadyFollowing { followee: String },

    /// A user attempted to follow themselves.
    #[error("cannot follow yourself: {username}")]
    SelfFollow { username: String },
}

/// Convenience type alias for record operations.
pub type Result<T> = std::result::Result<T, RecordError>;
