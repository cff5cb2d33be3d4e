//! End-to-end ingestion run: file → router → stream → mapper → batch
//! writer → persisted partial records, with checkpoint consulted at
//! startup and advanced after every committed chunk.
//!
//! The phase is single-pass and single-writer: one stream, one mapper,
//! one writer, in row order. Parallelism lives in the generation phase.

use std::path::Path;
use std::time::Instant;

use tracing::{info, instrument, warn};

use termforge_mapper::{MapOutcome, Mapper, mapping};
use termforge_reader::{OpenedStream, open_stream};
use termforge_shared::{
    Checkpoint, CheckpointStatus, IngestConfig, IngestStrategy, Result, TermForgeError,
};
use termforge_storage::Storage;

use crate::events::{EventSink, PipelineEvent};
use crate::writer::{BatchWriter, FailedWrite};

/// Exit report of an ingestion run.
///
/// Always produced, even on partial failure; only `InputError` and
/// `SchemaMismatchError` abort with zero persisted writes.
#[derive(Debug)]
pub struct IngestReport {
    pub source_hash: String,
    pub strategy: IngestStrategy,
    /// Rows read in this run (resumed runs only read past the checkpoint).
    pub rows_read: u64,
    pub rows_mapped: u64,
    pub rows_skipped_duplicate: u64,
    pub rows_rejected: u64,
    /// Mapped rows the store rejected at write time.
    pub rows_failed_write: u64,
    pub final_checkpoint_offset: u64,
    /// Per-row rejection details.
    pub rejected: Vec<(u64, String)>,
    /// Per-record write failures.
    pub failed_writes: Vec<FailedWrite>,
    pub elapsed: std::time::Duration,
}

/// Run ingestion for one source file.
///
/// 1. Inspect: hash, format, strategy
/// 2. Consult checkpoint, pick resume offset
/// 3. Open + validate the row stream (fail fast on layout mismatch)
/// 4. Map rows, buffer, flush with checkpoint advancement
/// 5. Mark the checkpoint completed and report
#[instrument(skip_all, fields(path = %path.display()))]
pub async fn run_ingest(
    path: &Path,
    storage: &Storage,
    config: &IngestConfig,
    events: &dyn EventSink,
) -> Result<IngestReport> {
    let start = Instant::now();

    // --- Inspect (no writes on failure) ---
    let source = termforge_reader::inspect(path, config)?;

    // --- Consult checkpoint ---
    let existing = storage.get_checkpoint(&source.content_hash).await?;
    if let Some(cp) = &existing {
        if cp.status == CheckpointStatus::Completed {
            info!(
                hash = %source.content_hash,
                offset = cp.last_committed_row_offset,
                "source already fully ingested, nothing to do"
            );
            return Ok(IngestReport {
                source_hash: source.content_hash,
                strategy: source.strategy,
                rows_read: 0,
                rows_mapped: 0,
                rows_skipped_duplicate: 0,
                rows_rejected: 0,
                rows_failed_write: 0,
                final_checkpoint_offset: cp.last_committed_row_offset,
                rejected: Vec::new(),
                failed_writes: Vec::new(),
                elapsed: start.elapsed(),
            });
        }
    }

    let resume_offset = existing
        .as_ref()
        .map(|cp| cp.last_committed_row_offset)
        .unwrap_or(0);
    if resume_offset > 0 {
        info!(
            hash = %source.content_hash,
            resume_offset,
            "resuming interrupted ingestion"
        );
    }

    // --- Open and validate the stream (still no writes) ---
    let OpenedStream {
        mut stream,
        layout,
        estimated_rows,
        ..
    } = open_stream(path, &source, resume_offset, &config.spool_dir)?;

    events.emit(&PipelineEvent::StrategySelected {
        source_hash: source.content_hash.clone(),
        strategy: source.strategy,
        estimated_rows: estimated_rows.or(source.estimated_rows),
    });

    // A fresh source with no data rows is unreadable input, caught before
    // any write lands.
    let mut pending = stream.next_row()?;
    if pending.is_none() && resume_offset == 0 {
        return Err(TermForgeError::input(format!(
            "{}: no data rows",
            path.display()
        )));
    }

    // --- First writes: source profile + checkpoint ---
    let mut source = source;
    source.estimated_rows = estimated_rows.or(source.estimated_rows);
    storage.upsert_source_file(&source).await?;

    let checkpoint = match existing {
        Some(mut cp) => {
            cp.status = CheckpointStatus::InProgress;
            cp
        }
        None => Checkpoint::new(source.content_hash.clone()),
    };
    storage.save_checkpoint(&checkpoint).await?;

    // --- Mapper, seeded with prior keys on resume ---
    let decl = declaration_for(layout.version)?;
    let mut mapper = Mapper::new(decl, source.content_hash.clone());
    if resume_offset > 0 {
        let prior = storage.list_record_keys(&source.content_hash).await?;
        mapper.preload_keys(prior);
    }

    let mut writer = BatchWriter::new(
        storage,
        events,
        checkpoint,
        config.batch_max_records,
        config.batch_max_bytes,
    );

    // --- Single-pass row loop ---
    let mut rows_read = 0u64;
    let mut rows_mapped = 0u64;
    let mut rows_skipped_duplicate = 0u64;
    let mut rows_rejected = 0u64;
    let mut rejected: Vec<(u64, String)> = Vec::new();

    while let Some(row) = pending {
        rows_read += 1;
        events.emit(&PipelineEvent::RowProcessed { offset: row.offset });

        match mapper.map_row(&row) {
            MapOutcome::Mapped(mapped) => {
                rows_mapped += 1;
                writer.push(*mapped).await?;
            }
            MapOutcome::SkippedDuplicate { offset, key } => {
                rows_skipped_duplicate += 1;
                events.emit(&PipelineEvent::RowSkippedDuplicate { offset, key });
            }
            MapOutcome::Rejected { offset, reason } => {
                rows_rejected += 1;
                warn!(offset, reason = %reason, "row rejected");
                events.emit(&PipelineEvent::RowRejected {
                    offset,
                    reason: reason.clone(),
                });
                rejected.push((offset, reason));
            }
        }

        pending = stream.next_row()?;
    }

    // --- Final flush and completion ---
    let (mut checkpoint, failed_writes) = writer.finish().await?;
    checkpoint.status = CheckpointStatus::Completed;
    storage.save_checkpoint(&checkpoint).await?;

    let report = IngestReport {
        source_hash: source.content_hash,
        strategy: source.strategy,
        rows_read,
        rows_mapped,
        rows_skipped_duplicate,
        rows_rejected,
        rows_failed_write: failed_writes.len() as u64,
        final_checkpoint_offset: checkpoint.last_committed_row_offset,
        rejected,
        failed_writes,
        elapsed: start.elapsed(),
    };

    info!(
        hash = %report.source_hash,
        strategy = report.strategy.as_str(),
        rows_read = report.rows_read,
        rows_mapped = report.rows_mapped,
        rows_skipped_duplicate = report.rows_skipped_duplicate,
        rows_rejected = report.rows_rejected,
        rows_failed_write = report.rows_failed_write,
        final_offset = report.final_checkpoint_offset,
        elapsed_ms = report.elapsed.as_millis(),
        "ingestion run complete"
    );

    Ok(report)
}

/// Resolve the mapping declaration for a detected layout version.
fn declaration_for(version: u32) -> Result<&'static termforge_mapper::MappingDeclaration> {
    match version {
        1 => Ok(mapping::v1()),
        other => Err(TermForgeError::schema_mismatch(format!(
            "no mapping declaration for layout version {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::SilentEvents;
    use crate::events::test_support::RecordingEvents;
    use std::path::PathBuf;
    use termforge_shared::{AppConfig, RecordKey, SectionId, SectionStatus};
    use uuid::Uuid;

    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("tf_pipeline_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn test_config() -> IngestConfig {
        let mut config = IngestConfig::from(&AppConfig::default());
        config.spool_dir = std::env::temp_dir();
        config
    }

    fn write_csv(rows: &[&str]) -> PathBuf {
        let header = "Term,Introduction – Definition and Overview,\
                      Introduction – Key Concepts and Principles,\
                      Theoretical Concepts – Key Mathematical and Statistical Foundations,\
                      Applications – Real-world Use Cases and Examples,\
                      Conclusion – Summary and Key Takeaways";
        let mut content = String::from(header);
        content.push('\n');
        for row in rows {
            content.push_str(row);
            content.push('\n');
        }
        let path = std::env::temp_dir().join(format!("tf_ingest_{}.csv", Uuid::now_v7()));
        std::fs::write(&path, content).expect("write test csv");
        path
    }

    #[tokio::test]
    async fn ingests_simple_file() {
        let storage = test_storage().await;
        let path = write_csv(&[
            "Gradient Descent,An optimizer.,Learning rates.,Convex analysis.,Training,Summary.",
            "Attention,A weighting mechanism.,,,,",
        ]);

        let report = run_ingest(&path, &storage, &test_config(), &SilentEvents)
            .await
            .expect("ingest");

        assert_eq!(report.rows_read, 2);
        assert_eq!(report.rows_mapped, 2);
        assert_eq!(report.rows_rejected, 0);
        assert_eq!(report.rows_skipped_duplicate, 0);
        assert_eq!(report.final_checkpoint_offset, 2);
        assert_eq!(report.strategy, IngestStrategy::Direct);

        let record = storage
            .get_record(&RecordKey("gradient-descent".into()))
            .await
            .unwrap()
            .expect("record stored");
        assert_eq!(record.term, "Gradient Descent");
        assert_eq!(
            record.sections[&SectionId::DefinitionOverview].status,
            SectionStatus::Mapped
        );
        // Unmapped columns stay empty
        assert_eq!(
            record.sections[&SectionId::Faqs].status,
            SectionStatus::Empty
        );

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn report_arithmetic_holds_with_duplicates_and_rejections() {
        let storage = test_storage().await;
        let path = write_csv(&[
            "Alpha,def a,,,,",
            ",missing key,,,,",
            "Alpha,def a again,,,,",
            "Beta,def b,,,,",
        ]);

        let events = RecordingEvents::default();
        let report = run_ingest(&path, &storage, &test_config(), &events)
            .await
            .expect("ingest");

        assert_eq!(report.rows_read, 4);
        assert_eq!(report.rows_mapped, 2);
        assert_eq!(report.rows_rejected, 1);
        assert_eq!(report.rows_skipped_duplicate, 1);
        assert_eq!(
            report.rows_read,
            report.rows_mapped + report.rows_skipped_duplicate + report.rows_rejected
        );
        // Rejections do not halt the stream: the last row landed.
        assert_eq!(report.final_checkpoint_offset, 4);
        assert_eq!(storage.count_records(&report.source_hash).await.unwrap(), 2);

        // The duplicate produced exactly one skip event.
        let skips = events
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, PipelineEvent::RowSkippedDuplicate { .. }))
            .count();
        assert_eq!(skips, 1);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn rerun_of_completed_source_is_a_no_op() {
        let storage = test_storage().await;
        let path = write_csv(&["Alpha,def,,,,", "Beta,def,,,,"]);

        let first = run_ingest(&path, &storage, &test_config(), &SilentEvents)
            .await
            .expect("first run");
        assert_eq!(first.rows_read, 2);

        let second = run_ingest(&path, &storage, &test_config(), &SilentEvents)
            .await
            .expect("second run");
        assert_eq!(second.rows_read, 0);
        assert_eq!(second.final_checkpoint_offset, 2);
        assert_eq!(storage.count_records(&first.source_hash).await.unwrap(), 2);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn resume_after_simulated_crash_matches_uninterrupted_run() {
        let rows = [
            "Alpha,def a,,,,",
            "Beta,def b,,,,",
            "Gamma,def c,,,,",
            "Delta,def d,,,,",
        ];

        // Uninterrupted run
        let full_storage = test_storage().await;
        let path = write_csv(&rows);
        let full = run_ingest(&path, &full_storage, &test_config(), &SilentEvents)
            .await
            .expect("full run");
        let mut expected = full_storage
            .list_record_keys(&full.source_hash)
            .await
            .unwrap();
        expected.sort();

        // Crashed run: first two rows committed, checkpoint at 2, then the
        // process died before completion.
        let crashed_storage = test_storage().await;
        let partial_path = write_csv(&rows[..2]);
        let partial = run_ingest(&partial_path, &crashed_storage, &test_config(), &SilentEvents)
            .await
            .expect("partial run");
        // Rewrite the checkpoint under the FULL file's hash to model a
        // crash mid-file: offset 2, still in progress.
        let mut cp = Checkpoint::new(full.source_hash.clone());
        cp.advance_to(2);
        cp.rows_processed = 2;
        // Re-home the two written records under the full file's hash.
        for (key, _) in crashed_storage
            .list_record_keys(&partial.source_hash)
            .await
            .unwrap()
        {
            let mut record = crashed_storage.get_record(&key).await.unwrap().unwrap();
            record.source_hash = full.source_hash.clone();
            crashed_storage.upsert_records(&[record]).await.unwrap();
        }
        let source = termforge_reader::inspect(&path, &test_config()).unwrap();
        crashed_storage.upsert_source_file(&source).await.unwrap();
        crashed_storage.save_checkpoint(&cp).await.unwrap();

        // Resume against the full file
        let resumed = run_ingest(&path, &crashed_storage, &test_config(), &SilentEvents)
            .await
            .expect("resumed run");
        assert_eq!(resumed.rows_read, 2, "resume reads only rows past offset 2");

        let mut resumed_keys = crashed_storage
            .list_record_keys(&full.source_hash)
            .await
            .unwrap();
        resumed_keys.sort();
        assert_eq!(resumed_keys, expected);

        let final_cp = crashed_storage
            .get_checkpoint(&full.source_hash)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(final_cp.status, CheckpointStatus::Completed);
        assert_eq!(final_cp.last_committed_row_offset, 4);

        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(&partial_path);
    }

    #[tokio::test]
    async fn unknown_layout_writes_nothing() {
        let storage = test_storage().await;
        let path = std::env::temp_dir().join(format!("tf_bad_{}.csv", Uuid::now_v7()));
        std::fs::write(&path, "id,name\n1,alpha\n").unwrap();

        let err = run_ingest(&path, &storage, &test_config(), &SilentEvents)
            .await
            .unwrap_err();
        assert!(matches!(err, TermForgeError::SchemaMismatch { .. }));

        // Zero persisted writes: no source file row, no checkpoint.
        let hash = termforge_reader::hash_file(&path).unwrap();
        assert!(storage.get_source_file(&hash).await.unwrap().is_none());
        assert!(storage.get_checkpoint(&hash).await.unwrap().is_none());

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn header_only_file_is_input_error() {
        let storage = test_storage().await;
        let path = write_csv(&[]);

        let err = run_ingest(&path, &storage, &test_config(), &SilentEvents)
            .await
            .unwrap_err();
        assert!(matches!(err, TermForgeError::Input { .. }));

        let hash = termforge_reader::hash_file(&path).unwrap();
        assert!(storage.get_checkpoint(&hash).await.unwrap().is_none());

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn strategy_tag_differs_but_output_matches_across_tiers() {
        let rows = ["Alpha,def a,,,,", "Beta,def b,,,,"];

        let direct_storage = test_storage().await;
        let path = write_csv(&rows);
        let direct = run_ingest(&path, &direct_storage, &test_config(), &SilentEvents)
            .await
            .expect("direct run");
        assert_eq!(direct.strategy, IngestStrategy::Direct);

        // Same bytes under thresholds that force the large tier.
        let stream_storage = test_storage().await;
        let mut tiny = test_config();
        tiny.direct_max_bytes = 1;
        tiny.convert_max_bytes = 2;
        let converted = run_ingest(&path, &stream_storage, &tiny, &SilentEvents)
            .await
            .expect("convert-tier run");
        assert_eq!(converted.strategy, IngestStrategy::ConvertThenStream);

        let mut direct_keys = direct_storage
            .list_record_keys(&direct.source_hash)
            .await
            .unwrap();
        direct_keys.sort();
        let mut converted_keys = stream_storage
            .list_record_keys(&converted.source_hash)
            .await
            .unwrap();
        converted_keys.sort();
        assert_eq!(direct_keys, converted_keys);

        let _ = std::fs::remove_file(&path);
    }
}
