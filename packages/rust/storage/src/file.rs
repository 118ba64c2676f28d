//! Whole-snapshot JSON file backend.
//!
//! Every `put` re-reads the file, replaces one key, and writes the result to
//! a sibling temp file that is then renamed over the original. The whole
//! read-modify-rename runs under an exclusive advisory lock on a sibling
//! `.<name>.lock` file, so writers sharing a path never drop each other's keys,
//! whether they are separate handles or separate processes.

use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fs2::FileExt;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use tickerflow_shared::{CacheRecord, Result, StepEnvelope, TickerflowError};

use crate::{Snapshot, StepCache};

/// Step cache stored as one pretty-printed JSON object.
pub struct FileStepCache {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStepCache {
    /// Use `path` as the snapshot file. Nothing is touched until the first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the snapshot, degrading to empty on any failure.
    async fn read_snapshot(&self) -> Snapshot {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = ?self.path, "cache file not found, treating as empty");
                return Snapshot::new();
            }
            Err(e) => {
                warn!(path = ?self.path, error = %e, "cache file unreadable, treating as empty");
                return Snapshot::new();
            }
        };

        match serde_json::from_slice::<Snapshot>(&bytes) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(path = ?self.path, error = %e, "cache file is corrupt, treating as empty");
                Snapshot::new()
            }
        }
    }

    async fn ensure_parent(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| TickerflowError::io(parent, e))?;
        }
        Ok(())
    }

    /// Block (off the runtime) until this process holds the writer lock for the path.
    /// The lock is released when the returned file is dropped.
    async fn lock_exclusive(&self) -> Result<File> {
        self.ensure_parent().await?;
        let lock_path = self.sibling_path("lock");

        tokio::task::spawn_blocking(move || {
            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(&lock_path)
                .map_err(|e| TickerflowError::io(&lock_path, e))?;
            FileExt::lock_exclusive(&file).map_err(|e| TickerflowError::io(&lock_path, e))?;
            Ok(file)
        })
        .await
        .map_err(|e| TickerflowError::Storage(format!("cache lock task failed: {e}")))?
    }

    /// Atomically replace the snapshot file.
    async fn write_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        self.ensure_parent().await?;

        let bytes = encode_snapshot(snapshot)?;
        let tmp = self.temp_path();

        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| TickerflowError::io(&tmp, e))?;

        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(TickerflowError::io(&self.path, e));
        }
        Ok(())
    }

    /// `.<file name>.<uuid>.tmp` next to the snapshot, so the rename stays on one filesystem.
    fn temp_path(&self) -> PathBuf {
        self.sibling_path(&format!("{}.tmp", Uuid::now_v7()))
    }

    /// `.<file name>.<suffix>` in the snapshot's directory.
    fn sibling_path(&self, suffix: &str) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "cache".into());
        self.path.with_file_name(format!(".{name}.{suffix}"))
    }
}

/// Deterministic encoding: same snapshot, same bytes.
pub(crate) fn encode_snapshot(snapshot: &Snapshot) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec_pretty(snapshot)?;
    bytes.push(b'\n');
    Ok(bytes)
}

#[async_trait]
impl StepCache for FileStepCache {
    async fn get(&self, step_id: &str) -> Option<CacheRecord> {
        self.read_snapshot().await.remove(step_id)
    }

    #[instrument(skip(self, envelope), fields(path = ?self.path))]
    async fn put(&self, step_id: &str, envelope: StepEnvelope) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let lock = self.lock_exclusive().await?;

        let mut snapshot = self.read_snapshot().await;
        snapshot.insert(step_id.to_string(), CacheRecord::new(step_id, envelope));
        let written = self.write_snapshot(&snapshot).await;
        drop(lock);
        written?;

        debug!(entries = snapshot.len(), "cache snapshot written");
        Ok(())
    }

    async fn dump_all(&self) -> Snapshot {
        self.read_snapshot().await
    }

    fn name(&self) -> &str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::test_support::{sample_envelope, temp_path};
    use proptest::prelude::*;
    use serde_json::{Value, json};
    use tickerflow_shared::EnvelopeFormat;

    /// JSON values of the kind steps store: nested objects and arrays with
    /// strings, integers, bools and floats that print exactly.
    fn json_content() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            (-80_000i32..80_000).prop_map(|n| json!(f64::from(n) / 8.0)),
            ".{0,16}".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 32, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                prop::collection::btree_map("[a-z_]{1,8}", inner, 0..6)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    #[tokio::test]
    async fn missing_file_reads_empty() {
        let cache = FileStepCache::new(temp_path("absent.json"));
        assert!(cache.get("idea_generation").await.is_none());
        assert!(cache.dump_all().await.is_empty());
    }

    #[tokio::test]
    async fn put_then_get() {
        let cache = FileStepCache::new(temp_path("cache.json"));
        let envelope = sample_envelope();

        cache.put("idea_generation", envelope.clone()).await.expect("put");

        let record = cache.get("idea_generation").await.expect("record");
        assert_eq!(record.step_id, "idea_generation");
        assert_eq!(record.envelope, envelope);
        assert!(cache.get("sentiment_analysis").await.is_none());
    }

    #[tokio::test]
    async fn put_replaces_previous_record() {
        let cache = FileStepCache::new(temp_path("cache.json"));
        cache.put("vetting_turnarounds", sample_envelope()).await.unwrap();
        cache
            .put("vetting_turnarounds", StepEnvelope::error("AI evaluation failed: boom", "fast"))
            .await
            .unwrap();

        let all = cache.dump_all().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all["vetting_turnarounds"].envelope.format, EnvelopeFormat::Error);
    }

    #[tokio::test]
    async fn corrupt_file_reads_empty_and_is_recoverable() {
        let path = temp_path("cache.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"{ this is not json").unwrap();

        let cache = FileStepCache::new(&path);
        assert!(cache.get("idea_generation").await.is_none());
        assert!(cache.dump_all().await.is_empty());

        cache.put("idea_generation", sample_envelope()).await.expect("put over corrupt file");
        assert_eq!(cache.dump_all().await.len(), 1);
    }

    #[tokio::test]
    async fn rewrite_is_byte_identical() {
        let cache = FileStepCache::new(temp_path("cache.json"));
        cache.put("idea_generation", sample_envelope()).await.unwrap();
        let first = std::fs::read(cache.path()).unwrap();

        let snapshot = cache.dump_all().await;
        cache.write_snapshot(&snapshot).await.unwrap();
        let second = std::fs::read(cache.path()).unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn no_temp_files_left_behind() {
        let cache = FileStepCache::new(temp_path("cache.json"));
        cache.put("a", sample_envelope()).await.unwrap();
        cache.put("b", sample_envelope()).await.unwrap();

        let dir = cache.path().parent().unwrap();
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec![".cache.json.lock".to_string(), "cache.json".to_string()]);
    }

    #[tokio::test]
    async fn concurrent_puts_to_different_keys_all_survive() {
        let cache = Arc::new(FileStepCache::new(temp_path("cache.json")));

        let mut handles = Vec::new();
        for i in 0..16 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                cache.put(&format!("step_{i}"), sample_envelope()).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(cache.dump_all().await.len(), 16);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn separate_handles_on_one_path_keep_every_key() {
        for _ in 0..10 {
            let path = temp_path("cache.json");
            let first = Arc::new(FileStepCache::new(&path));
            let second = Arc::new(FileStepCache::new(&path));

            let mut handles = Vec::new();
            for i in 0..8 {
                let cache = if i % 2 == 0 { Arc::clone(&first) } else { Arc::clone(&second) };
                handles.push(tokio::spawn(async move {
                    cache.put(&format!("step_{i}"), sample_envelope()).await
                }));
            }
            for handle in handles {
                handle.await.unwrap().unwrap();
            }

            let all = FileStepCache::new(&path).dump_all().await;
            assert_eq!(all.len(), 8, "keys: {:?}", all.keys().collect::<Vec<_>>());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_puts_to_one_key_leave_one_complete_record() {
        let path = temp_path("cache.json");
        let candidates: Vec<StepEnvelope> = (0..8)
            .map(|i| StepEnvelope::json(json!({"round": i, "tickers": ["AAPL", "MSFT"]}), "fast"))
            .collect();

        let mut handles = Vec::new();
        for envelope in candidates.clone() {
            let cache = FileStepCache::new(&path);
            handles.push(tokio::spawn(async move {
                cache.put("final_selection", envelope).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let all = FileStepCache::new(&path).dump_all().await;
        assert_eq!(all.len(), 1);
        let record = &all["final_selection"];
        assert_eq!(record.step_id, "final_selection");
        assert!(candidates.contains(&record.envelope));
    }

    proptest! {
        #[test]
        fn persisted_envelope_reads_back_equal(
            text in ".{0,64}",
            model in "[a-z]{1,8}",
            as_error in any::<bool>(),
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(async {
                let cache = FileStepCache::new(temp_path("cache.json"));
                let envelope = if as_error {
                    StepEnvelope::error(text.clone(), model.clone())
                } else {
                    StepEnvelope::text(text.clone(), model.clone())
                };
                cache.put("step", envelope.clone()).await.unwrap();
                let back = cache.get("step").await.unwrap();
                assert_eq!(back.envelope, envelope);
            });
        }

        #[test]
        fn persisted_json_envelope_reads_back_equal(
            content in json_content(),
            model in "[a-z]{1,8}",
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(async {
                let cache = FileStepCache::new(temp_path("cache.json"));
                let envelope = StepEnvelope::json(content.clone(), model.clone());
                cache.put("step", envelope.clone()).await.unwrap();
                let first = std::fs::read(cache.path()).unwrap();

                let back = cache.get("step").await.unwrap();
                assert_eq!(back.envelope, envelope);

                cache.write_snapshot(&cache.dump_all().await).await.unwrap();
                assert_eq!(std::fs::read(cache.path()).unwrap(), first);
            });
        }
    }
}
