//! Revision bookkeeping shared by the backends.
//!
//! [`Keyspace`] is a plain map plus the store revision. It performs no
//! locking and no I/O; backends wrap it in a lock and decide whether a change
//! must be made durable before it is applied.

use std::collections::HashMap;

use crate::types::{CasOutcome, KeyValue, Revision};

#[derive(Debug, Default)]
pub(crate) struct Keyspace {
    entries: HashMap<String, KeyValue>,
    revision: Revision,
}

impl Keyspace {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn get(&self, key: &str) -> Option<&KeyValue> {
        self.entries.get(key)
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub(crate) fn revision(&self) -> Revision {
        self.revision
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Evaluate a CAS expectation without applying anything.
    pub(crate) fn check(&self, key: &str, expected: Option<Revision>) -> Result<(), CasOutcome> {
        let current = self.entries.get(key).map(|kv| kv.revision);
        if current == expected {
            Ok(())
        } else {
            Err(CasOutcome::Conflict { current })
        }
    }

    /// Store `value` at the next revision and return it.
    pub(crate) fn put(&mut self, key: &str, value: Vec<u8>) -> Revision {
        let revision = self.revision.next();
        self.put_at(key, value, revision);
        revision
    }

    /// Remove `key`, advancing the revision only if it existed.
    pub(crate) fn delete(&mut self, key: &str) -> Option<Revision> {
        self.entries.remove(key)?;
        self.revision = self.revision.next();
        Some(self.revision)
    }

    /// Replay a put recorded at a known revision.
    pub(crate) fn put_at(&mut self, key: &str, value: Vec<u8>, revision: Revision) {
        self.entries
            .insert(key.to_string(), KeyValue { value, revision });
        self.advance_to(revision);
    }

    /// Replay a delete recorded at a known revision.
    pub(crate) fn delete_at(&mut self, key: &str, revision: Revision) {
        self.entries.remove(key);
        self.advance_to(revision);
    }

    /// Move the store revision forward; never backwards.
    pub(crate) fn advance_to(&mut self, revision: Revision) {
        if revision > self.revision {
            self.revision = revision;
        }
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&String, &KeyValue)> {
        self.entries.iter()
    }

    pub(crate) fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}
