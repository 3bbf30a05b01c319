//! Durable single-node KV service backed by a mutation log.
//!
//! [`FileKv`] serves reads from an in-memory [`Keyspace`] and makes every
//! mutation durable in a [`MutationLog`] before applying it. Opening the store
//! replays the log. Both live under one mutex, so log order and revision order
//! are the same thing.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::{KvError, KvResult};
use crate::keyspace::Keyspace;
use crate::log::{LogEntry, LogOp, MutationLog, SyncMode};
use crate::traits::KvClient;
use crate::types::{CasOutcome, KeyValue, Revision};

struct Inner {
    keyspace: Keyspace,
    log: MutationLog,
}

/// A [`KvClient`] that persists to a single log file.
///
/// Trait calls run on tokio's blocking pool, so a slow disk ties up a pool
/// thread and the caller's deadline still fires. A write abandoned that way
/// finishes in the background.
pub struct FileKv {
    inner: Arc<Mutex<Inner>>,
    path: PathBuf,
}

/// Outcome of [`FileKv::compact`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompactionStats {
    pub live_keys: usize,
    pub bytes_before: u64,
    pub bytes_after: u64,
}

impl FileKv {
    /// Open (or create) the store at `path` and replay its log.
    ///
    /// Fails with [`KvError::Corrupt`] if the log's revisions go backwards.
    pub fn open(path: impl AsRef<Path>, sync_mode: SyncMode) -> KvResult<Self> {
        let path = path.as_ref();
        let log = MutationLog::open(path, sync_mode)?;

        let mut keyspace = Keyspace::new();
        let entries = log.recover()?;
        let replayed = entries.len();
        for entry in entries {
            let current = keyspace.revision();
            let in_order = match entry.op {
                LogOp::Checkpoint => entry.revision >= current,
                LogOp::Put { .. } | LogOp::Delete { .. } => entry.revision > current,
            };
            if !in_order {
                return Err(KvError::Corrupt(format!(
                    "{}: entry at {} follows {current}",
                    path.display(),
                    entry.revision
                )));
            }
            match entry.op {
                LogOp::Put { key, value } => keyspace.put_at(&key, value, entry.revision),
                LogOp::Delete { key } => keyspace.delete_at(&key, entry.revision),
                LogOp::Checkpoint => keyspace.advance_to(entry.revision),
            }
        }

        info!(
            path = %path.display(),
            replayed,
            keys = keyspace.len(),
            revision = %keyspace.revision(),
            "opened file kv"
        );

        Ok(Self {
            inner: Arc::new(Mutex::new(Inner { keyspace, log })),
            path: path.to_path_buf(),
        })
    }

    /// Path of the backing log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of live keys.
    pub fn len(&self) -> KvResult<usize> {
        Ok(lock(&self.inner)?.keyspace.len())
    }

    pub fn is_empty(&self) -> KvResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Rewrite the log so it holds one entry per live key plus a checkpoint
    /// that preserves the store revision. Also reopens a log that closed
    /// after a failed write.
    ///
    /// Runs on the calling thread.
    pub fn compact(&self) -> KvResult<CompactionStats> {
        let mut inner = lock(&self.inner)?;
        let bytes_before = inner.log.offset();

        let mut entries: Vec<LogEntry> = inner
            .keyspace
            .iter()
            .map(|(key, kv)| LogEntry {
                revision: kv.revision,
                op: LogOp::Put {
                    key: key.clone(),
                    value: kv.value.clone(),
                },
            })
            .collect();
        entries.sort_by_key(|e| e.revision);
        entries.push(LogEntry {
            revision: inner.keyspace.revision(),
            op: LogOp::Checkpoint,
        });

        let live_keys = entries.len() - 1;
        inner.log.rewrite(&entries)?;
        let stats = CompactionStats {
            live_keys,
            bytes_before,
            bytes_after: inner.log.offset(),
        };
        info!(?stats, "compacted file kv");
        Ok(stats)
    }

    /// Run `f` against the locked state on the blocking pool.
    async fn with_inner<T, F>(&self, f: F) -> KvResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Inner) -> KvResult<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || f(&mut *lock(&inner)?))
            .await
            .map_err(|e| KvError::Unavailable(format!("file kv task failed: {e}")))?
    }
}

fn lock(inner: &Mutex<Inner>) -> KvResult<MutexGuard<'_, Inner>> {
    inner
        .lock()
        .map_err(|e| KvError::Unavailable(format!("lock poisoned: {e}")))
}

impl Inner {
    /// Log a put at the next revision, then apply it.
    fn put(&mut self, key: &str, value: Vec<u8>) -> KvResult<Revision> {
        let revision = self.keyspace.revision().next();
        self.log.append(&LogEntry {
            revision,
            op: LogOp::Put {
                key: key.to_string(),
                value: value.clone(),
            },
        })?;
        self.keyspace.put_at(key, value, revision);
        Ok(revision)
    }

    fn delete(&mut self, key: &str) -> KvResult<bool> {
        if !self.keyspace.contains(key) {
            return Ok(false);
        }
        let revision = self.keyspace.revision().next();
        self.log.append(&LogEntry {
            revision,
            op: LogOp::Delete {
                key: key.to_string(),
            },
        })?;
        self.keyspace.delete_at(key, revision);
        Ok(true)
    }
}

impl std::fmt::Debug for FileKv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileKv").field("path", &self.path).finish()
    }
}

#[async_trait]
impl KvClient for FileKv {
    async fn get(&self, key: &str) -> KvResult<Option<KeyValue>> {
        let key = key.to_owned();
        self.with_inner(move |inner| Ok(inner.keyspace.get(&key).cloned()))
            .await
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> KvResult<Revision> {
        let key = key.to_owned();
        self.with_inner(move |inner| inner.put(&key, value)).await
    }

    async fn delete(&self, key: &str) -> KvResult<bool> {
        let key = key.to_owned();
        self.with_inner(move |inner| inner.delete(&key)).await
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<Revision>,
        value: Vec<u8>,
    ) -> KvResult<CasOutcome> {
        let key = key.to_owned();
        self.with_inner(move |inner| {
            if let Err(conflict) = inner.keyspace.check(&key, expected) {
                debug!(key = %key, ?expected, "cas conflict");
                return Ok(conflict);
            }
            Ok(CasOutcome::Swapped(inner.put(&key, value)?))
        })
        .await
    }

    async fn revision(&self) -> KvResult<Revision> {
        self.with_inner(|inner| Ok(inner.keyspace.revision())).await
    }

    async fn contains(&self, key: &str) -> KvResult<bool> {
        let key = key.to_owned();
        self.with_inner(move |inner| Ok(inner.keyspace.contains(&key)))
            .await
    }
}
