//! libSQL backend: one row per step id.

use std::path::Path;

use async_trait::async_trait;
use libsql::{Connection, Database, params};
use tracing::{debug, instrument, warn};

use tickerflow_shared::{CacheRecord, Result, StepEnvelope, TickerflowError};

use crate::migrations;
use crate::{Snapshot, StepCache};

/// Step cache stored in a local libSQL database.
pub struct SqlStepCache {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl SqlStepCache {
    /// Open or create the database at `path` and bring its schema up to date.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| TickerflowError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| TickerflowError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| TickerflowError::Storage(e.to_string()))?;

        let cache = Self { db, conn };
        cache.run_migrations().await?;
        Ok(cache)
    }

    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        TickerflowError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 on a fresh database.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => match rows.next().await {
                Ok(Some(row)) => row.get::<u32>(0).unwrap_or(0),
                _ => 0,
            },
            Err(_) => 0,
        }
    }

    async fn try_get(&self, step_id: &str) -> Result<Option<CacheRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT record_json FROM step_cache WHERE step_id = ?1",
                params![step_id],
            )
            .await
            .map_err(|e| TickerflowError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let json = row
                    .get::<String>(0)
                    .map_err(|e| TickerflowError::Storage(e.to_string()))?;
                Ok(Some(serde_json::from_str(&json)?))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(TickerflowError::Storage(e.to_string())),
        }
    }

    async fn try_dump_all(&self) -> Result<Snapshot> {
        let mut rows = self
            .conn
            .query(
                "SELECT step_id, record_json FROM step_cache ORDER BY step_id",
                params![],
            )
            .await
            .map_err(|e| TickerflowError::Storage(e.to_string()))?;

        let mut snapshot = Snapshot::new();
        while let Ok(Some(row)) = rows.next().await {
            let step_id = row
                .get::<String>(0)
                .map_err(|e| TickerflowError::Storage(e.to_string()))?;
            let json = row
                .get::<String>(1)
                .map_err(|e| TickerflowError::Storage(e.to_string()))?;
            match serde_json::from_str::<CacheRecord>(&json) {
                Ok(record) => {
                    snapshot.insert(step_id, record);
                }
                Err(e) => warn!(%step_id, error = %e, "skipping unreadable cache row"),
            }
        }
        Ok(snapshot)
    }
}

#[async_trait]
impl StepCache for SqlStepCache {
    async fn get(&self, step_id: &str) -> Option<CacheRecord> {
        match self.try_get(step_id).await {
            Ok(record) => record,
            Err(e) => {
                warn!(step_id, error = %e, "cache read failed, treating as miss");
                None
            }
        }
    }

    #[instrument(skip(self, envelope))]
    async fn put(&self, step_id: &str, envelope: StepEnvelope) -> Result<()> {
        let record = CacheRecord::new(step_id, envelope);
        let json = serde_json::to_string(&record)?;
        let timestamp = record.timestamp.to_rfc3339();

        self.conn
            .execute(
                "INSERT INTO step_cache (step_id, timestamp, record_json)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(step_id) DO UPDATE SET
                    timestamp = excluded.timestamp,
                    record_json = excluded.record_json",
                params![step_id, timestamp.as_str(), json.as_str()],
            )
            .await
            .map_err(|e| TickerflowError::Storage(e.to_string()))?;

        debug!("cache row written");
        Ok(())
    }

    async fn dump_all(&self) -> Snapshot {
        match self.try_dump_all().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "cache dump failed, treating as empty");
                Snapshot::new()
            }
        }
    }

    fn name(&self) -> &str {
        "libsql"
    }
}
