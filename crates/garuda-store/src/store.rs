//! The [`RecordStore`]: account, post and following operations.
//!
//! Every mutation is one read-modify-write cycle against a single username:
//!
//! 1. read the record and the revision it was last written at,
//! 2. apply the change to a local copy,
//! 3. write it back with compare-and-swap against that revision.
//!
//! A lost race re-runs the whole cycle, so concurrent writers to the same
//! user never overwrite each other. Different users never contend.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use garuda_kv::{CasOutcome, KvClient, KvResult, Revision};
use garuda_types::{Post, RecordError, UserRecord, Username};
use rand::Rng;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::codec::RecordCodec;
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};

/// One post in a user's home feed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FeedItem {
    pub author: String,
    pub title: String,
    pub content: String,
}

/// Per-user record store over a KV service.
///
/// Holds no mutable state of its own; clones share the same KV client.
pub struct RecordStore<K: ?Sized = dyn KvClient> {
    kv: Arc<K>,
    config: StoreConfig,
}

impl<K: ?Sized> Clone for RecordStore<K> {
    fn clone(&self) -> Self {
        Self {
            kv: Arc::clone(&self.kv),
            config: self.config.clone(),
        }
    }
}

impl RecordStore {
    /// Validate `config`, connect its backend and build a store on it.
    pub fn open(config: StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        let kv = config.backend.connect()?;
        Ok(Self { kv, config })
    }
}

impl<K: KvClient + ?Sized> RecordStore<K> {
    pub fn new(kv: Arc<K>, config: StoreConfig) -> Self {
        Self { kv, config }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn kv(&self) -> &Arc<K> {
        &self.kv
    }

    // ---- Accounts ----

    /// Create a user with no posts and no followees.
    ///
    /// The existence check and the write are one conditional write, so two
    /// racing creates cannot both succeed.
    pub async fn create(&self, username: &str, password_hash: &str) -> StoreResult<()> {
        let username = parse_username(username)?;
        let record = UserRecord::new(username.clone(), password_hash);
        let bytes = RecordCodec::encode(&record)?;

        let outcome = self
            .call(
                "compare_and_swap",
                true,
                self.kv.compare_and_swap(username.as_str(), None, bytes),
            )
            .await?;
        match outcome {
            CasOutcome::Swapped(revision) => {
                info!(user = %username, %revision, "user created");
                Ok(())
            }
            CasOutcome::Conflict { .. } => Err(StoreError::AlreadyExists {
                username: username.into_inner(),
            }),
        }
    }

    /// Fetch a user's full record.
    pub async fn get(&self, username: &str) -> StoreResult<UserRecord> {
        let username = parse_username(username)?;
        let (record, _) = self.require(&username).await?;
        Ok(record)
    }

    /// Returns `true` if the user exists.
    pub async fn exists(&self, username: &str) -> StoreResult<bool> {
        let username = parse_username(username)?;
        self.call("contains", false, self.kv.contains(username.as_str()))
            .await
    }

    /// Replace the stored credential. Posts and following are kept.
    pub async fn update_credential(&self, username: &str, password_hash: &str) -> StoreResult<()> {
        let username = parse_username(username)?;
        self.mutate(&username, |record| {
            record.set_password_hash(password_hash);
            Ok(())
        })
        .await?;
        info!(user = %username, "credential updated");
        Ok(())
    }

    /// Remove the user's record.
    ///
    /// Other users' following edges that point at this user are left in
    /// place; see [`RecordStore::prune_following`].
    pub async fn delete(&self, username: &str) -> StoreResult<()> {
        let username = parse_username(username)?;
        let existed = self
            .call("delete", true, self.kv.delete(username.as_str()))
            .await?;
        if !existed {
            return Err(StoreError::not_found(&username));
        }
        info!(user = %username, "user deleted");
        Ok(())
    }

    // ---- Posts ----

    /// Append a post. Titles need not be unique.
    pub async fn create_post(&self, username: &str, title: &str, content: &str) -> StoreResult<()> {
        let username = parse_username(username)?;
        self.mutate(&username, |record| {
            record.append_post(title, content);
            Ok(())
        })
        .await?;
        debug!(user = %username, title, "post created");
        Ok(())
    }

    /// The user's posts in insertion order.
    pub async fn list_posts(&self, username: &str) -> StoreResult<Vec<Post>> {
        Ok(self.get(username).await?.posts().to_vec())
    }

    /// Replace the content of the first post titled `title`.
    pub async fn update_post(&self, username: &str, title: &str, content: &str) -> StoreResult<()> {
        let username = parse_username(username)?;
        self.mutate(&username, |record| record.update_post(title, content))
            .await?;
        debug!(user = %username, title, "post updated");
        Ok(())
    }

    /// Remove the first post titled `title`.
    pub async fn delete_post(&self, username: &str, title: &str) -> StoreResult<()> {
        let username = parse_username(username)?;
        self.mutate(&username, |record| record.remove_post(title).map(drop))
            .await?;
        debug!(user = %username, title, "post deleted");
        Ok(())
    }

    // ---- Following ----

    /// Record that `follower` follows `followee`.
    ///
    /// Only the follower's record is written.
    pub async fn add_following(&self, follower: &str, followee: &str) -> StoreResult<()> {
        let follower = parse_username(follower)?;
        let followee = parse_username(followee)?;
        self.require_exists(&followee).await?;

        self.mutate(&follower, |record| record.follow(followee.clone()))
            .await?;
        debug!(%follower, %followee, "following added");
        Ok(())
    }

    /// The users `username` follows, in no particular order.
    pub async fn list_following(&self, username: &str) -> StoreResult<Vec<String>> {
        let record = self.get(username).await?;
        Ok(record.following().map(|u| u.to_string()).collect())
    }

    /// How many users `username` follows.
    pub async fn following_count(&self, username: &str) -> StoreResult<usize> {
        Ok(self.get(username).await?.following_count())
    }

    /// Remove the edge `follower -> followee`. Both users must exist.
    pub async fn remove_following(&self, follower: &str, followee: &str) -> StoreResult<()> {
        let follower = parse_username(follower)?;
        let followee = parse_username(followee)?;
        self.require_exists(&follower).await?;
        self.require_exists(&followee).await?;

        self.mutate(&follower, |record| record.unfollow(&followee))
            .await?;
        debug!(%follower, %followee, "following removed");
        Ok(())
    }

    /// Drop every edge from `username` to a user that no longer exists.
    ///
    /// Returns the removed followees. Deleting a user never touches other
    /// records, so this is how stale edges get cleaned up.
    pub async fn prune_following(&self, username: &str) -> StoreResult<Vec<String>> {
        let username = parse_username(username)?;
        let (record, _) = self.require(&username).await?;

        let mut dangling = Vec::new();
        for followee in record.following() {
            if !self
                .call("contains", false, self.kv.contains(followee.as_str()))
                .await?
            {
                dangling.push(followee.clone());
            }
        }
        if dangling.is_empty() {
            return Ok(Vec::new());
        }

        // A concurrent unfollow may already have removed some of them.
        self.mutate(&username, |record| {
            for followee in &dangling {
                match record.unfollow(followee) {
                    Ok(()) | Err(RecordError::FollowingNotFound { .. }) => {}
                    Err(e) => return Err(e),
                }
            }
            Ok(())
        })
        .await?;

        info!(user = %username, pruned = dangling.len(), "pruned dangling following edges");
        Ok(dangling.into_iter().map(Username::into_inner).collect())
    }

    /// Posts of everyone `username` follows, grouped by author.
    ///
    /// Followees that have been deleted are skipped.
    pub async fn feed(&self, username: &str) -> StoreResult<Vec<FeedItem>> {
        let username = parse_username(username)?;
        let (record, _) = self.require(&username).await?;

        let mut items = Vec::new();
        for followee in record.following() {
            let author = match self.fetch(followee).await? {
                Some((author, _)) => author,
                None => {
                    debug!(user = %username, %followee, "skipping deleted followee in feed");
                    continue;
                }
            };
            items.extend(author.posts().iter().map(|p| FeedItem {
                author: followee.to_string(),
                title: p.title.clone(),
                content: p.content.clone(),
            }));
        }
        Ok(items)
    }

    // ---- Internals ----

    /// Run one KV call under a fresh deadline.
    ///
    /// `write` marks calls whose effect is unknown if they time out or fail.
    async fn call<T, F>(&self, op: &'static str, write: bool, fut: F) -> StoreResult<T>
    where
        F: Future<Output = KvResult<T>>,
    {
        let after = self.config.request_timeout();
        match tokio::time::timeout(after, fut).await {
            Ok(result) => result.map_err(|e| {
                debug!(op, error = %e, write, "kv call failed");
                StoreError::kv(e, write)
            }),
            Err(_) => {
                warn!(op, ?after, "kv call timed out");
                Err(StoreError::Timeout {
                    op,
                    after,
                    ambiguous: write,
                })
            }
        }
    }

    /// Read and decode a record, with the revision it was written at.
    async fn fetch(&self, username: &Username) -> StoreResult<Option<(UserRecord, Revision)>> {
        let Some(kv) = self
            .call("get", false, self.kv.get(username.as_str()))
            .await?
        else {
            return Ok(None);
        };

        let record = RecordCodec::decode(&kv.value)?;
        if record.username() != username {
            return Err(StoreError::Decode(format!(
                "record stored under {username} belongs to {}",
                record.username()
            )));
        }
        Ok(Some((record, kv.revision)))
    }

    async fn require(&self, username: &Username) -> StoreResult<(UserRecord, Revision)> {
        self.fetch(username)
            .await?
            .ok_or_else(|| StoreError::not_found(username))
    }

    async fn require_exists(&self, username: &Username) -> StoreResult<()> {
        if self
            .call("contains", false, self.kv.contains(username.as_str()))
            .await?
        {
            Ok(())
        } else {
            Err(StoreError::not_found(username))
        }
    }

    /// The read-modify-write cycle shared by every mutation.
    ///
    /// `apply` may run several times, always on a freshly read record. Its
    /// errors abort the cycle without writing.
    async fn mutate<F>(&self, username: &Username, mut apply: F) -> StoreResult<UserRecord>
    where
        F: FnMut(&mut UserRecord) -> Result<(), RecordError>,
    {
        let max = self.config.max_cas_retries;
        for attempt in 1..=max {
            let (mut record, revision) = self.require(username).await?;
            apply(&mut record).map_err(|e| StoreError::from_record(username, e))?;
            let bytes = RecordCodec::encode(&record)?;

            let outcome = self
                .call(
                    "compare_and_swap",
                    true,
                    self.kv
                        .compare_and_swap(username.as_str(), Some(revision), bytes),
                )
                .await?;
            match outcome {
                CasOutcome::Swapped(new_revision) => {
                    debug!(user = %username, %revision, %new_revision, attempt, "record written");
                    return Ok(record);
                }
                CasOutcome::Conflict { current } => {
                    debug!(user = %username, %revision, ?current, attempt, "cas conflict");
                    if attempt < max {
                        self.backoff(attempt).await;
                    }
                }
            }
        }

        warn!(user = %username, attempts = max, "cas retries exhausted");
        Err(StoreError::Contention {
            username: username.to_string(),
            attempts: max,
        })
    }

    /// Linear back-off with full jitter on top.
    async fn backoff(&self, attempt: u32) {
        let base = self.config.retry_backoff();
        if base.is_zero() {
            tokio::task::yield_now().await;
            return;
        }
        let delay = {
            let mut rng = rand::thread_rng();
            let jitter_us = rng.gen_range(0..=base.as_micros() as u64);
            base * attempt + Duration::from_micros(jitter_us)
        };
        tokio::time::sleep(delay).await;
    }
}

fn parse_username(name: &str) -> StoreResult<Username> {
    Username::new(name).map_err(|e| match e {
        RecordError::InvalidUsername { name, reason } => StoreError::InvalidUsername { name, reason },
        other => StoreError::InvalidUsername {
            name: name.to_string(),
            reason: other.to_string(),
        },
    })
}
