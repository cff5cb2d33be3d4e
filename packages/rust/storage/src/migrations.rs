//! SQL migration definitions for the TermForge pipeline database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed within a transaction.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: source_files, checkpoints, records, generation_jobs, cost_ledger",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Ingested source files, keyed by content hash: identical bytes hash
-- identically, which is what makes checkpoints reusable across uploads.
CREATE TABLE IF NOT EXISTS source_files (
    content_hash   TEXT PRIMARY KEY,
    byte_size      INTEGER NOT NULL,
    format         TEXT NOT NULL,
    strategy       TEXT NOT NULL,
    estimated_rows INTEGER,
    created_at     TEXT NOT NULL
);

-- One checkpoint per source file; mutated only after a durably
-- acknowledged batch commit.
CREATE TABLE IF NOT EXISTS checkpoints (
    source_hash               TEXT PRIMARY KEY
                              REFERENCES source_files(content_hash) ON DELETE CASCADE,
    last_committed_row_offset INTEGER NOT NULL DEFAULT 0,
    rows_processed            INTEGER NOT NULL DEFAULT 0,
    rows_failed               INTEGER NOT NULL DEFAULT 0,
    status                    TEXT NOT NULL,
    updated_at                TEXT NOT NULL
);

-- Content records. The 42 section slots live in the sections JSON column;
-- section updates go through json_set so concurrent workers touching
-- different sections of one record cannot lose writes.
CREATE TABLE IF NOT EXISTS records (
    record_key       TEXT PRIMARY KEY,
    term             TEXT NOT NULL,
    source_hash      TEXT NOT NULL,
    category_ref     TEXT,
    subcategory_refs TEXT NOT NULL DEFAULT '[]',
    row_content_hash TEXT NOT NULL,
    sections         TEXT NOT NULL,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_records_source ON records(source_hash);

-- Generation job history; one row per job, terminal states persisted.
CREATE TABLE IF NOT EXISTS generation_jobs (
    id            TEXT PRIMARY KEY,
    record_key    TEXT NOT NULL,
    section       TEXT NOT NULL,
    model_id      TEXT NOT NULL,
    attempts      INTEGER NOT NULL DEFAULT 0,
    status        TEXT NOT NULL,
    cost_incurred REAL NOT NULL DEFAULT 0,
    quality_score REAL,
    created_at    TEXT NOT NULL,
    finished_at   TEXT
);

CREATE INDEX IF NOT EXISTS idx_jobs_record ON generation_jobs(record_key, section);
CREATE INDEX IF NOT EXISTS idx_jobs_status ON generation_jobs(status);

-- Append-only spend ledger; running totals are derived, never mutated.
CREATE TABLE IF NOT EXISTS cost_ledger (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id     TEXT NOT NULL,
    model_id   TEXT NOT NULL,
    amount     REAL NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_ledger_job ON cost_ledger(job_id);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
