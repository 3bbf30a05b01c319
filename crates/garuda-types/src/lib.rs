//! Foundation types for the Garuda record store.
//!
//! Each user owns exactly one [`UserRecord`], keyed by its [`Username`]. The
//! record folds three logical entities together:
//!
//! - **Credentials** -- an opaque password hash produced upstream.
//! - **Posts** -- an ordered list of [`Post`]s; titles may repeat.
//! - **Following** -- the set of users this user follows. Edges are stored
//!   only on the follower's side.
//!
//! # Modules
//!
//! - [`error`] -- [`RecordError`] for in-memory record mutations
//! - [`names`] -- username validation and the [`Username`] newtype
//! - [`record`] -- [`UserRecord`] and [`Post`]

pub mod error;
pub mod names;
pub mod record;

pub use error::{RecordError, Result};
pub use names::{validate_username, Username, MAX_USERNAME_LEN};
pub use record::{Post, UserRecord};
