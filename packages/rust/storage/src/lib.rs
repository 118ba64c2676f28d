//! Step cache: the persistent mapping from step id to its last envelope.
//!
//! Two backends implement [`StepCache`]:
//! - [`FileStepCache`]: a whole-snapshot JSON file, replaced atomically on
//!   every write
//! - [`SqlStepCache`]: a libSQL database with one row per step
//!
//! **Contract shared by both:**
//! - reads always go to the backing medium (no in-process staleness)
//! - a missing or unreadable store reads as empty; the failure is logged,
//!   never returned
//! - a write replaces the whole record for its key; writes to different
//!   keys never clobber each other, same-key races are last-writer-wins

mod file;
mod migrations;
mod sql;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tickerflow_shared::{CacheBackend, CacheConfig, CacheRecord, Result, StepEnvelope, expand_home};

pub use file::FileStepCache;
pub use sql::SqlStepCache;

/// Full cache contents keyed by step id.
pub type Snapshot = BTreeMap<String, CacheRecord>;

/// Persistent step-keyed cache.
#[async_trait]
pub trait StepCache: Send + Sync {
    /// Current record for `step_id`, or `None` if absent (or unreadable).
    async fn get(&self, step_id: &str) -> Option<CacheRecord>;

    /// Replace the record for `step_id` with a fresh one holding `envelope`.
    async fn put(&self, step_id: &str, envelope: StepEnvelope) -> Result<()>;

    /// Every record currently stored.
    async fn dump_all(&self) -> Snapshot;

    /// Backend name for tracing.
    fn name(&self) -> &str;
}

/// Open the backend selected by `config`.
pub async fn open_cache(config: &CacheConfig) -> Result<Arc<dyn StepCache>> {
    let path = expand_home(&config.path)?;
    tracing::info!(backend = ?config.backend, ?path, "opening step cache");

    match config.backend {
        CacheBackend::File => Ok(Arc::new(FileStepCache::new(path))),
        CacheBackend::Libsql => Ok(Arc::new(SqlStepCache::open(&path).await?)),
    }
}
