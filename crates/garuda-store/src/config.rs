use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use garuda_kv::{FileKv, InMemoryKv, KvClient, SyncMode};
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Tunables for a [`RecordStore`](crate::RecordStore).
///
/// Every field has a default, so an empty TOML document is a valid config.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Deadline for each individual KV call.
    pub request_timeout_ms: u64,
    /// Attempts at a read-modify-write cycle before giving up with
    /// [`StoreError::Contention`].
    pub max_cas_retries: u32,
    /// Base delay between conflicting attempts; grows linearly with jitter.
    pub retry_backoff_ms: u64,
    pub backend: BackendConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 5_000,
            max_cas_retries: 16,
            retry_backoff_ms: 2,
            backend: BackendConfig::default(),
        }
    }
}

/// Which KV service to talk to.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum BackendConfig {
    /// Process-local store; contents vanish on exit.
    #[default]
    Memory,
    /// Durable single-node store at `path`.
    File {
        path: PathBuf,
        #[serde(default)]
        sync: SyncMode,
    },
}

impl BackendConfig {
    /// Open the configured backend.
    pub fn connect(&self) -> StoreResult<Arc<dyn KvClient>> {
        match self {
            BackendConfig::Memory => Ok(Arc::new(InMemoryKv::new())),
            BackendConfig::File { path, sync } => Ok(Arc::new(FileKv::open(path, *sync)?)),
        }
    }
}

impl StoreConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> StoreResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| StoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: &Path) -> StoreResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> StoreResult<()> {
        if self.request_timeout_ms == 0 {
            return Err(StoreError::Config("request_timeout_ms must be positive".into()));
        }
        if self.max_cas_retries == 0 {
            return Err(StoreError::Config("max_cas_retries must be at least 1".into()));
        }
        if let BackendConfig::File { path, .. } = &self.backend {
            if path.as_os_str().is_empty() {
                return Err(StoreError::Config("backend.path must not be empty".into()));
            }
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}
