//! Schema migrations for the libSQL step cache.
//!
//! Applied in ascending order on open; each body runs as one batch and
//! records its own version in `schema_migrations`.

pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: step_cache",
        sql: r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per pipeline step; record_json holds the serialized CacheRecord
CREATE TABLE IF NOT EXISTS step_cache (
    step_id     TEXT PRIMARY KEY,
    timestamp   TEXT NOT NULL,
    record_json TEXT NOT NULL
);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
