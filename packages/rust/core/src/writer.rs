//! Bounded-buffer batch writer with checkpoint advancement.
//!
//! The ordering contract this type exists for: records are upserted
//! first, and only after the store acknowledges does the checkpoint
//! advance. A crash between the two replays a few already-written rows,
//! which the keyed upsert absorbs; a crash before the upsert loses
//! nothing that was committed.

use tracing::{debug, warn};

use termforge_mapper::MappedRecord;
use termforge_shared::{Checkpoint, ContentRecord, RecordKey, Result};
use termforge_storage::Storage;

use crate::events::{EventSink, PipelineEvent};

/// A record that the store rejected during a flush.
#[derive(Debug, Clone)]
pub struct FailedWrite {
    pub offset: u64,
    pub key: RecordKey,
    pub reason: String,
}

/// Buffers mapped records and flushes them as bounded, idempotent bulk
/// upserts. Single writer per source file by design: row order and
/// checkpoint monotonicity depend on it.
pub struct BatchWriter<'a> {
    store: &'a Storage,
    events: &'a dyn EventSink,
    max_records: usize,
    max_bytes: u64,
    buffer: Vec<(u64, ContentRecord)>,
    buffered_bytes: u64,
    checkpoint: Checkpoint,
    failed: Vec<FailedWrite>,
}

impl<'a> BatchWriter<'a> {
    pub fn new(
        store: &'a Storage,
        events: &'a dyn EventSink,
        checkpoint: Checkpoint,
        max_records: usize,
        max_bytes: u64,
    ) -> Self {
        Self {
            store,
            events,
            max_records: max_records.max(1),
            max_bytes: max_bytes.max(1),
            buffer: Vec::new(),
            buffered_bytes: 0,
            checkpoint,
            failed: Vec::new(),
        }
    }

    /// Buffer one mapped record, flushing when either bound is reached.
    pub async fn push(&mut self, mapped: MappedRecord) -> Result<()> {
        self.buffered_bytes += approximate_size(&mapped.record);
        self.buffer.push((mapped.offset, mapped.record));

        if self.buffer.len() >= self.max_records || self.buffered_bytes >= self.max_bytes {
            self.flush().await?;
        }
        Ok(())
    }

    /// Flush the buffer: upsert, then advance the checkpoint to the
    /// highest row offset fully covered by succeeded records.
    pub async fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let batch: Vec<(u64, ContentRecord)> = std::mem::take(&mut self.buffer);
        self.buffered_bytes = 0;

        let records: Vec<ContentRecord> = batch.iter().map(|(_, r)| r.clone()).collect();
        let outcome = self.store.upsert_records(&records).await?;

        // Offsets of records the store rejected, in row order.
        let mut failed_offsets: Vec<u64> = Vec::new();
        for (key, reason) in &outcome.failed {
            if let Some((offset, _)) = batch.iter().find(|(_, r)| &r.key == key) {
                warn!(offset, key = %key, reason = %reason, "record rejected by store");
                failed_offsets.push(*offset);
                self.failed.push(FailedWrite {
                    offset: *offset,
                    key: key.clone(),
                    reason: reason.clone(),
                });
            }
        }

        let batch_offsets: Vec<u64> = batch.iter().map(|(offset, _)| *offset).collect();
        self.checkpoint
            .advance_to(commit_offset(&batch_offsets, &failed_offsets));
        self.checkpoint.rows_processed += outcome.succeeded.len() as u64;
        self.checkpoint.rows_failed += outcome.failed.len() as u64;
        self.store.save_checkpoint(&self.checkpoint).await?;

        debug!(
            records = records.len(),
            failed = outcome.failed.len(),
            checkpoint_offset = self.checkpoint.last_committed_row_offset,
            "batch committed"
        );
        self.events.emit(&PipelineEvent::BatchCommitted {
            records: outcome.succeeded.len(),
            failed: outcome.failed.len(),
            checkpoint_offset: self.checkpoint.last_committed_row_offset,
        });

        Ok(())
    }

    /// Flush the tail and hand back the final checkpoint plus the failed
    /// writes collected across the run.
    pub async fn finish(mut self) -> Result<(Checkpoint, Vec<FailedWrite>)> {
        self.flush().await?;
        Ok((self.checkpoint, self.failed))
    }

    /// Current committed offset (for tests and progress reporting).
    pub fn committed_offset(&self) -> u64 {
        self.checkpoint.last_committed_row_offset
    }
}

/// Highest row offset fully covered by succeeded records: the whole
/// batch when nothing failed, otherwise just below the lowest failed
/// offset. Partial failure commits the succeeding subset, but resume
/// must replay everything from the first failure on.
fn commit_offset(batch_offsets: &[u64], failed_offsets: &[u64]) -> u64 {
    let highest = batch_offsets.iter().copied().max().unwrap_or(0);
    match failed_offsets.iter().copied().min() {
        None => highest,
        Some(first_failed) => first_failed.saturating_sub(1),
    }
}

/// Cheap byte-size approximation for the buffer bound: key, term, and the
/// content payloads dominate a record's footprint.
fn approximate_size(record: &ContentRecord) -> u64 {
    let mut size = record.key.as_str().len() + record.term.len() + 64;
    for section in record.sections.values() {
        if let Some(content) = &section.content {
            size += match content {
                termforge_shared::SectionContent::Text(text) => text.len() + 16,
                termforge_shared::SectionContent::Structured(value) => {
                    value.to_string().len() + 16
                }
            };
        }
    }
    size as u64
}
