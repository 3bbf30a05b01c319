//! The [`KvClient`] trait: the contract of the external KV service.
//!
//! The record store only ever touches one key per call. Anything that
//! implements this trait with linearizable per-key semantics can back it.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::KvResult;
use crate::types::{CasOutcome, KeyValue, Revision};

/// Client for a linearizable key-value service.
///
/// Implementations must be thread-safe (`Send + Sync`). Every method is a
/// single round trip; callers bound each call with their own deadline.
#[async_trait]
pub trait KvClient: Send + Sync {
    /// Read a key. Returns `Ok(None)` if it does not exist.
    async fn get(&self, key: &str) -> KvResult<Option<KeyValue>>;

    /// Write a key unconditionally and return the new revision.
    async fn put(&self, key: &str, value: Vec<u8>) -> KvResult<Revision>;

    /// Delete a key unconditionally.
    ///
    /// Returns `Ok(true)` if the key existed and was deleted, `Ok(false)` if
    /// it did not exist.
    async fn delete(&self, key: &str) -> KvResult<bool>;

    /// Write `value` only if the key's modification revision equals
    /// `expected`. `expected = None` requires the key to be absent.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<Revision>,
        value: Vec<u8>,
    ) -> KvResult<CasOutcome>;

    /// The current store-wide revision.
    async fn revision(&self) -> KvResult<Revision>;

    /// Check whether a key exists.
    async fn contains(&self, key: &str) -> KvResult<bool> {
        Ok(self.get(key).await?.is_some())
    }
}

#[async_trait]
impl<T: KvClient + ?Sized> KvClient for Arc<T> {
    async fn get(&self, key: &str) -> KvResult<Option<KeyValue>> {
        (**self).get(key).await
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> KvResult<Revision> {
        (**self).put(key, value).await
    }

    async fn delete(&self, key: &str) -> KvResult<bool> {
        (**self).delete(key).await
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<Revision>,
        value: Vec<u8>,
    ) -> KvResult<CasOutcome> {
        (**self).compare_and_swap(key, expected, value).await
    }

    async fn revision(&self) -> KvResult<Revision> {
        (**self).revision().await
    }

    async fn contains(&self, key: &str) -> KvResult<bool> {
        (**self).contains(key).await
    }
}
