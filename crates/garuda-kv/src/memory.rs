//! In-memory KV service for tests and embedding.
//!
//! [`InMemoryKv`] keeps all keys in a `HashMap` behind a `RwLock`. Every
//! method takes the lock once, so each call is linearizable. It also offers
//! two testing hooks that a real service exhibits on its own: added latency
//! and transient failures.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{KvError, KvResult};
use crate::keyspace::Keyspace;
use crate::traits::KvClient;
use crate::types::{CasOutcome, KeyValue, Revision};

/// An in-memory implementation of [`KvClient`].
///
/// Data is lost when the store is dropped.
#[derive(Debug, Default)]
pub struct InMemoryKv {
    keyspace: RwLock<Keyspace>,
    /// Remaining calls that fail with [`KvError::Unavailable`].
    fail_next: AtomicU32,
    /// Delay applied before every call, in microseconds.
    latency_us: AtomicU64,
}

impl InMemoryKv {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` calls fail as if the service were unreachable.
    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Delay every subsequent call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.latency_us.store(micros, Ordering::SeqCst);
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.read().map(|ks| ks.len()).unwrap_or(0)
    }

    /// Returns `true` if no keys are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted list of all keys.
    pub fn keys(&self) -> Vec<String> {
        self.read().map(|ks| ks.keys()).unwrap_or_default()
    }

    /// Remove every key. The revision keeps counting from where it was.
    pub fn clear(&self) -> KvResult<()> {
        self.write()?.clear();
        Ok(())
    }

    fn read(&self) -> KvResult<RwLockReadGuard<'_, Keyspace>> {
        self.keyspace
            .read()
            .map_err(|e| KvError::Unavailable(format!("lock poisoned: {e}")))
    }

    fn write(&self) -> KvResult<RwLockWriteGuard<'_, Keyspace>> {
        self.keyspace
            .write()
            .map_err(|e| KvError::Unavailable(format!("lock poisoned: {e}")))
    }

    /// Apply the configured latency and fault injection.
    async fn enter(&self, op: &'static str) -> KvResult<()> {
        let micros = self.latency_us.load(Ordering::SeqCst);
        if micros > 0 {
            tokio::time::sleep(Duration::from_micros(micros)).await;
        }

        let injected = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            debug!(op, "injected kv failure");
            return Err(KvError::Unavailable(format!("injected failure in {op}")));
        }
        Ok(())
    }
}

#[async_trait]
impl KvClient for InMemoryKv {
    async fn get(&self, key: &str) -> KvResult<Option<KeyValue>> {
        self.enter("get").await?;
        Ok(self.read()?.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> KvResult<Revision> {
        self.enter("put").await?;
        Ok(self.write()?.put(key, value))
    }

    async fn delete(&self, key: &str) -> KvResult<bool> {
        self.enter("delete").await?;
        Ok(self.write()?.delete(key).is_some())
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<Revision>,
        value: Vec<u8>,
    ) -> KvResult<CasOutcome> {
        self.enter("compare_and_swap").await?;
        let mut ks = self.write()?;
        if let Err(conflict) = ks.check(key, expected) {
            return Ok(conflict);
        }
        Ok(CasOutcome::Swapped(ks.put(key, value)))
    }

    async fn revision(&self) -> KvResult<Revision> {
        self.enter("revision").await?;
        Ok(self.read()?.revision())
    }

    async fn contains(&self, key: &str) -> KvResult<bool> {
        self.enter("contains").await?;
        Ok(self.read()?.contains(key))
    }
}
