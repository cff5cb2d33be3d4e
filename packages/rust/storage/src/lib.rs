//! libSQL persistence layer for the TermForge pipeline.
//!
//! The [`Storage`] struct wraps a libSQL database holding source files,
//! checkpoints, content records, generation jobs, and the cost ledger.
//! The pipeline only depends on the operations exposed here; how they are
//! stored is this crate's concern alone.

mod migrations;

use std::path::Path;

use chrono::Utc;
use libsql::{Connection, Database, params};

use termforge_shared::{
    Checkpoint, CheckpointStatus, ContentRecord, CostLedgerEntry, GenerationJob, JobStatus,
    RecordKey, Result, Section, SectionId, SourceFile, SourceFormat, TermForgeError,
};

/// Outcome of a bulk upsert: which records landed, which were rejected.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub succeeded: Vec<RecordKey>,
    pub failed: Vec<(RecordKey, String)>,
}

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl Storage {
    /// Open or create a database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| TermForgeError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| TermForgeError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| TermForgeError::Storage(e.to_string()))?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
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
                        TermForgeError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Source file operations
    // -----------------------------------------------------------------------

    /// Upsert a source file profile (re-inspection refreshes strategy and
    /// estimate, never the identity).
    pub async fn upsert_source_file(&self, source: &SourceFile) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO source_files (content_hash, byte_size, format, strategy, estimated_rows, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(content_hash) DO UPDATE SET
                   strategy = excluded.strategy,
                   estimated_rows = excluded.estimated_rows",
                params![
                    source.content_hash.as_str(),
                    source.byte_size as i64,
                    source.format.as_str(),
                    source.strategy.as_str(),
                    source.estimated_rows.map(|r| r as i64),
                    now.as_str(),
                ],
            )
            .await
            .map_err(|e| TermForgeError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Get a stored source file by content hash.
    pub async fn get_source_file(&self, content_hash: &str) -> Result<Option<SourceFile>> {
        let mut rows = self
            .conn
            .query(
                "SELECT content_hash, byte_size, format, strategy, estimated_rows
                 FROM source_files WHERE content_hash = ?1",
                params![content_hash],
            )
            .await
            .map_err(|e| TermForgeError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let format: String = row
                    .get(2)
                    .map_err(|e| TermForgeError::Storage(e.to_string()))?;
                let strategy: String = row
                    .get(3)
                    .map_err(|e| TermForgeError::Storage(e.to_string()))?;
                Ok(Some(SourceFile {
                    content_hash: row
                        .get(0)
                        .map_err(|e| TermForgeError::Storage(e.to_string()))?,
                    byte_size: row.get::<i64>(1).unwrap_or(0) as u64,
                    format: parse_format(&format)?,
                    strategy: parse_strategy(&strategy)?,
                    estimated_rows: row.get::<i64>(4).ok().map(|r| r as u64),
                }))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(TermForgeError::Storage(e.to_string())),
        }
    }

    /// All stored source files, newest first.
    pub async fn list_source_files(&self) -> Result<Vec<SourceFile>> {
        let mut rows = self
            .conn
            .query(
                "SELECT content_hash, byte_size, format, strategy, estimated_rows
                 FROM source_files ORDER BY created_at DESC",
                params![],
            )
            .await
            .map_err(|e| TermForgeError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let format: String = row
                .get(2)
                .map_err(|e| TermForgeError::Storage(e.to_string()))?;
            let strategy: String = row
                .get(3)
                .map_err(|e| TermForgeError::Storage(e.to_string()))?;
            results.push(SourceFile {
                content_hash: row
                    .get(0)
                    .map_err(|e| TermForgeError::Storage(e.to_string()))?,
                byte_size: row.get::<i64>(1).unwrap_or(0) as u64,
                format: parse_format(&format)?,
                strategy: parse_strategy(&strategy)?,
                estimated_rows: row.get::<i64>(4).ok().map(|r| r as u64),
            });
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Checkpoint operations
    // -----------------------------------------------------------------------

    /// Get the checkpoint for a source file, if one exists.
    pub async fn get_checkpoint(&self, source_hash: &str) -> Result<Option<Checkpoint>> {
        let mut rows = self
            .conn
            .query(
                "SELECT source_hash, last_committed_row_offset, rows_processed, rows_failed, status, updated_at
                 FROM checkpoints WHERE source_hash = ?1",
                params![source_hash],
            )
            .await
            .map_err(|e| TermForgeError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_checkpoint(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(TermForgeError::Storage(e.to_string())),
        }
    }

    /// Save a checkpoint (upsert by source hash).
    ///
    /// The committed offset never moves backwards, even if a stale caller
    /// hands one in: the SQL takes the max of old and new.
    pub async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO checkpoints (source_hash, last_committed_row_offset, rows_processed, rows_failed, status, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(source_hash) DO UPDATE SET
                   last_committed_row_offset = MAX(checkpoints.last_committed_row_offset, excluded.last_committed_row_offset),
                   rows_processed = excluded.rows_processed,
                   rows_failed = excluded.rows_failed,
                   status = excluded.status,
                   updated_at = excluded.updated_at",
                params![
                    checkpoint.source_hash.as_str(),
                    checkpoint.last_committed_row_offset as i64,
                    checkpoint.rows_processed as i64,
                    checkpoint.rows_failed as i64,
                    checkpoint.status.as_str(),
                    checkpoint.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| TermForgeError::Storage(e.to_string()))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Record operations
    // -----------------------------------------------------------------------

    /// Idempotent bulk upsert keyed on record key.
    ///
    /// Per-record outcomes: a rejected record never fails the batch, it is
    /// reported in `failed` so the writer can checkpoint below it.
    pub async fn upsert_records(&self, records: &[ContentRecord]) -> Result<BatchOutcome> {
        let mut outcome = BatchOutcome::default();
        let now = Utc::now().to_rfc3339();

        for record in records {
            match self.upsert_one(record, &now).await {
                Ok(()) => outcome.succeeded.push(record.key.clone()),
                Err(e) => outcome.failed.push((record.key.clone(), e.to_string())),
            }
        }

        Ok(outcome)
    }

    async fn upsert_one(&self, record: &ContentRecord, now: &str) -> Result<()> {
        let sections = serde_json::to_string(&record.sections)
            .map_err(|e| TermForgeError::Storage(format!("serialize sections: {e}")))?;
        let subcategories = serde_json::to_string(&record.subcategory_refs)
            .map_err(|e| TermForgeError::Storage(format!("serialize subcategories: {e}")))?;

        self.conn
            .execute(
                "INSERT INTO records (record_key, term, source_hash, category_ref, subcategory_refs, row_content_hash, sections, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(record_key) DO UPDATE SET
                   term = excluded.term,
                   source_hash = excluded.source_hash,
                   category_ref = excluded.category_ref,
                   subcategory_refs = excluded.subcategory_refs,
                   row_content_hash = excluded.row_content_hash,
                   sections = excluded.sections,
                   updated_at = excluded.updated_at",
                params![
                    record.key.as_str(),
                    record.term.as_str(),
                    record.source_hash.as_str(),
                    record.category_ref.as_deref(),
                    subcategories.as_str(),
                    record.row_content_hash.as_str(),
                    sections.as_str(),
                    now,
                    now,
                ],
            )
            .await
            .map_err(|e| TermForgeError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Get a record by key, with its fixed section slot set re-established.
    pub async fn get_record(&self, key: &RecordKey) -> Result<Option<ContentRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT record_key, term, source_hash, category_ref, subcategory_refs, row_content_hash, sections
                 FROM records WHERE record_key = ?1",
                params![key.as_str()],
            )
            .await
            .map_err(|e| TermForgeError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_record(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(TermForgeError::Storage(e.to_string())),
        }
    }

    /// Number of records for a source file.
    pub async fn count_records(&self, source_hash: &str) -> Result<u64> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM records WHERE source_hash = ?1",
                params![source_hash],
            )
            .await
            .map_err(|e| TermForgeError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(row.get::<i64>(0).unwrap_or(0) as u64),
            _ => Ok(0),
        }
    }

    /// All (key, term) pairs for a source, used to seed duplicate
    /// resolution on resume.
    pub async fn list_record_keys(&self, source_hash: &str) -> Result<Vec<(RecordKey, String)>> {
        let mut rows = self
            .conn
            .query(
                "SELECT record_key, term FROM records WHERE source_hash = ?1 ORDER BY record_key",
                params![source_hash],
            )
            .await
            .map_err(|e| TermForgeError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let key: String = row
                .get(0)
                .map_err(|e| TermForgeError::Storage(e.to_string()))?;
            let term: String = row
                .get(1)
                .map_err(|e| TermForgeError::Storage(e.to_string()))?;
            results.push((RecordKey(key), term));
        }
        Ok(results)
    }

    /// A page of records for a source, in key order. Used by the gap scan.
    pub async fn list_records_page(
        &self,
        source_hash: &str,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<ContentRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT record_key, term, source_hash, category_ref, subcategory_refs, row_content_hash, sections
                 FROM records WHERE source_hash = ?1 ORDER BY record_key LIMIT ?2 OFFSET ?3",
                params![source_hash, limit as i64, offset as i64],
            )
            .await
            .map_err(|e| TermForgeError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_record(&row)?);
        }
        Ok(results)
    }

    /// Atomically replace one section of a record.
    ///
    /// A single `json_set` statement, so concurrent workers updating
    /// different sections of the same record serialize in the database
    /// instead of racing a read-modify-write in process.
    pub async fn update_section(
        &self,
        key: &RecordKey,
        section: SectionId,
        value: &Section,
    ) -> Result<()> {
        let payload = serde_json::to_string(value)
            .map_err(|e| TermForgeError::Storage(format!("serialize section: {e}")))?;
        let now = Utc::now().to_rfc3339();

        let changed = self
            .conn
            .execute(
                "UPDATE records
                 SET sections = json_set(sections, '$.' || ?1, json(?2)), updated_at = ?3
                 WHERE record_key = ?4",
                params![section.as_str(), payload.as_str(), now.as_str(), key.as_str()],
            )
            .await
            .map_err(|e| TermForgeError::Storage(e.to_string()))?;

        if changed == 0 {
            return Err(TermForgeError::Storage(format!(
                "record {key} not found for section update"
            )));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Generation job operations
    // -----------------------------------------------------------------------

    /// Save a job (upsert by id; attempts, status, cost and score refresh).
    pub async fn save_job(&self, job: &GenerationJob) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO generation_jobs (id, record_key, section, model_id, attempts, status, cost_incurred, quality_score, created_at, finished_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(id) DO UPDATE SET
                   model_id = excluded.model_id,
                   attempts = excluded.attempts,
                   status = excluded.status,
                   cost_incurred = excluded.cost_incurred,
                   quality_score = excluded.quality_score,
                   finished_at = excluded.finished_at",
                params![
                    job.id.as_str(),
                    job.record_key.as_str(),
                    job.section.as_str(),
                    job.model_id.as_str(),
                    job.attempts as i64,
                    job.status.as_str(),
                    job.cost_incurred,
                    job.quality_score,
                    job.created_at.to_rfc3339(),
                    job.finished_at.map(|t| t.to_rfc3339()),
                ],
            )
            .await
            .map_err(|e| TermForgeError::Storage(e.to_string()))?;
        Ok(())
    }

    /// All jobs recorded for one record, newest first.
    pub async fn list_jobs_for_record(&self, key: &RecordKey) -> Result<Vec<GenerationJob>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, record_key, section, model_id, attempts, status, cost_incurred, quality_score, created_at, finished_at
                 FROM generation_jobs WHERE record_key = ?1 ORDER BY created_at DESC",
                params![key.as_str()],
            )
            .await
            .map_err(|e| TermForgeError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_job(&row)?);
        }
        Ok(results)
    }

    /// Job counts grouped by status, for the status report.
    pub async fn count_jobs_by_status(&self) -> Result<Vec<(String, u64)>> {
        let mut rows = self
            .conn
            .query(
                "SELECT status, COUNT(*) FROM generation_jobs GROUP BY status ORDER BY status",
                params![],
            )
            .await
            .map_err(|e| TermForgeError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let status: String = row
                .get(0)
                .map_err(|e| TermForgeError::Storage(e.to_string()))?;
            let count: i64 = row.get(1).unwrap_or(0);
            results.push((status, count as u64));
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Cost ledger operations
    // -----------------------------------------------------------------------

    /// Append a spend entry. The ledger is append-only by construction:
    /// there is no update or delete operation.
    pub async fn append_cost(&self, entry: &CostLedgerEntry) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO cost_ledger (job_id, model_id, amount, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    entry.job_id.as_str(),
                    entry.model_id.as_str(),
                    entry.amount,
                    entry.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| TermForgeError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Derived total spend across the whole ledger, in USD.
    pub async fn total_cost(&self) -> Result<f64> {
        let mut rows = self
            .conn
            .query("SELECT COALESCE(SUM(amount), 0) FROM cost_ledger", params![])
            .await
            .map_err(|e| TermForgeError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(row.get::<f64>(0).unwrap_or(0.0)),
            _ => Ok(0.0),
        }
    }

    /// Derived spend for one job, in USD.
    pub async fn cost_for_job(&self, job_id: &str) -> Result<f64> {
        let mut rows = self
            .conn
            .query(
                "SELECT COALESCE(SUM(amount), 0) FROM cost_ledger WHERE job_id = ?1",
                params![job_id],
            )
            .await
            .map_err(|e| TermForgeError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(row.get::<f64>(0).unwrap_or(0.0)),
            _ => Ok(0.0),
        }
    }

    /// Number of ledger entries for one job.
    pub async fn ledger_entry_count(&self, job_id: &str) -> Result<u64> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM cost_ledger WHERE job_id = ?1",
                params![job_id],
            )
            .await
            .map_err(|e| TermForgeError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(row.get::<i64>(0).unwrap_or(0) as u64),
            _ => Ok(0),
        }
    }
}

// ---------------------------------------------------------------------------
// Row conversion helpers
// ---------------------------------------------------------------------------

fn parse_format(s: &str) -> Result<SourceFormat> {
    match s {
        "workbook" => Ok(SourceFormat::Workbook),
        "delimited" => Ok(SourceFormat::Delimited),
        other => Err(TermForgeError::Storage(format!("unknown format: {other}"))),
    }
}

fn parse_strategy(s: &str) -> Result<termforge_shared::IngestStrategy> {
    use termforge_shared::IngestStrategy::*;
    match s {
        "direct" => Ok(Direct),
        "stream-native" => Ok(StreamNative),
        "convert-then-stream" => Ok(ConvertThenStream),
        other => Err(TermForgeError::Storage(format!("unknown strategy: {other}"))),
    }
}

fn parse_job_status(s: &str) -> Result<JobStatus> {
    match s {
        "queued" => Ok(JobStatus::Queued),
        "running" => Ok(JobStatus::Running),
        "succeeded" => Ok(JobStatus::Succeeded),
        "failed" => Ok(JobStatus::Failed),
        "budget_exceeded" => Ok(JobStatus::BudgetExceeded),
        other => Err(TermForgeError::Storage(format!("unknown job status: {other}"))),
    }
}

/// Convert a database row to a [`Checkpoint`].
fn row_to_checkpoint(row: &libsql::Row) -> Result<Checkpoint> {
    let status: String = row
        .get(4)
        .map_err(|e| TermForgeError::Storage(e.to_string()))?;
    Ok(Checkpoint {
        source_hash: row
            .get(0)
            .map_err(|e| TermForgeError::Storage(e.to_string()))?,
        last_committed_row_offset: row.get::<i64>(1).unwrap_or(0) as u64,
        rows_processed: row.get::<i64>(2).unwrap_or(0) as u64,
        rows_failed: row.get::<i64>(3).unwrap_or(0) as u64,
        status: CheckpointStatus::parse(&status)
            .ok_or_else(|| TermForgeError::Storage(format!("unknown checkpoint status: {status}")))?,
        updated_at: parse_timestamp(row, 5)?,
    })
}

/// Convert a database row to a [`ContentRecord`].
fn row_to_record(row: &libsql::Row) -> Result<ContentRecord> {
    let sections_json: String = row
        .get(6)
        .map_err(|e| TermForgeError::Storage(e.to_string()))?;
    let subcategories_json: String = row.get::<String>(4).unwrap_or_else(|_| "[]".to_string());

    let mut record = ContentRecord {
        key: RecordKey(
            row.get(0)
                .map_err(|e| TermForgeError::Storage(e.to_string()))?,
        ),
        term: row
            .get(1)
            .map_err(|e| TermForgeError::Storage(e.to_string()))?,
        source_hash: row
            .get(2)
            .map_err(|e| TermForgeError::Storage(e.to_string()))?,
        category_ref: row.get::<String>(3).ok(),
        subcategory_refs: serde_json::from_str(&subcategories_json)
            .map_err(|e| TermForgeError::Storage(format!("invalid subcategories JSON: {e}")))?,
        row_content_hash: row
            .get(5)
            .map_err(|e| TermForgeError::Storage(e.to_string()))?,
        sections: serde_json::from_str(&sections_json)
            .map_err(|e| TermForgeError::Storage(format!("invalid sections JSON: {e}")))?,
    };
    record.normalize_sections();
    Ok(record)
}

/// Convert a database row to a [`GenerationJob`].
fn row_to_job(row: &libsql::Row) -> Result<GenerationJob> {
    let section: String = row
        .get(2)
        .map_err(|e| TermForgeError::Storage(e.to_string()))?;
    let status: String = row
        .get(5)
        .map_err(|e| TermForgeError::Storage(e.to_string()))?;
    Ok(GenerationJob {
        id: row
            .get(0)
            .map_err(|e| TermForgeError::Storage(e.to_string()))?,
        record_key: RecordKey(
            row.get(1)
                .map_err(|e| TermForgeError::Storage(e.to_string()))?,
        ),
        section: parse_section(&section)?,
        model_id: row
            .get(3)
            .map_err(|e| TermForgeError::Storage(e.to_string()))?,
        attempts: row.get::<i64>(4).unwrap_or(0) as u32,
        status: parse_job_status(&status)?,
        cost_incurred: row.get::<f64>(6).unwrap_or(0.0),
        quality_score: row.get::<f64>(7).ok(),
        created_at: parse_timestamp(row, 8)?,
        finished_at: parse_timestamp(row, 9).ok(),
    })
}

/// Resolve a section slug back to its id.
fn parse_section(slug: &str) -> Result<SectionId> {
    SectionId::ALL
        .iter()
        .find(|id| id.as_str() == slug)
        .copied()
        .ok_or_else(|| TermForgeError::Storage(format!("unknown section: {slug}")))
}

fn parse_timestamp(row: &libsql::Row, index: i32) -> Result<chrono::DateTime<chrono::Utc>> {
    let s: String = row
        .get(index)
        .map_err(|e| TermForgeError::Storage(e.to_string()))?;
    chrono::DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(|e| TermForgeError::Storage(format!("invalid date: {e}")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
