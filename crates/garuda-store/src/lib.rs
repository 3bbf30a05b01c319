//! Per-user record store for Garuda.
//!
//! Each user is one key in a strongly-consistent KV service; the value is the
//! encoded [`UserRecord`](garuda_types::UserRecord) holding the user's
//! credential, posts and following set. [`RecordStore`] exposes the account,
//! post and following operations on top of that single key.
//!
//! # Concurrency
//!
//! The store keeps no locks and no cache. Every mutation reads the record
//! with its revision, changes a local copy and writes it back with
//! compare-and-swap, re-running the cycle when another writer got there
//! first. Each KV call carries its own deadline.
//!
//! # Modules
//!
//! - [`codec`] -- binary encoding of stored records
//! - [`config`] -- [`StoreConfig`] and backend selection
//! - [`error`] -- [`StoreError`] taxonomy
//! - [`store`] -- [`RecordStore`] operations

pub mod codec;
pub mod config;
pub mod error;
pub mod store;

pub use codec::{RecordCodec, FORMAT_VERSION, MAX_RECORD_SIZE};
pub use config::{BackendConfig, StoreConfig};
pub use error::{StoreError, StoreResult};
pub use store::{FeedItem, RecordStore};

pub use garuda_types::{Post, UserRecord, Username};
