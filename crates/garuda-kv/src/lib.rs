//! Key-value service contract for the Garuda record store.
//!
//! The record store sits on a strongly-consistent KV service and only ever
//! touches one key per call. This crate pins down that contract and ships two
//! backends for it.
//!
//! # Contract
//!
//! - `get`, `put`, `delete` are linearizable per key.
//! - Every mutation advances a store-wide [`Revision`] and stamps the key
//!   with it.
//! - `compare_and_swap` writes only if the key's revision still equals the
//!   expected one (or the key is still absent), which is what makes
//!   read-modify-write cycles safe.
//!
//! # Backends
//!
//! - [`InMemoryKv`] -- `HashMap`-based, with latency and fault injection for tests
//! - [`FileKv`] -- single-node durable store replayed from a CRC-framed log

pub mod error;
pub mod file;
mod keyspace;
pub mod log;
pub mod memory;
pub mod traits;
pub mod types;

pub use error::{KvError, KvResult};
pub use file::{CompactionStats, FileKv};
pub use log::SyncMode;
pub use memory::InMemoryKv;
pub use traits::KvClient;
pub use types::{CasOutcome, KeyValue, Revision};
