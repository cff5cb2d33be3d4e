//! Structured progress events for external monitoring collaborators.
//!
//! The pipeline emits these through an [`EventSink`]; it does not render
//! or store dashboards itself. The CLI adapts them onto progress bars,
//! headless callers can forward them wherever they like.

use termforge_shared::{IngestStrategy, JobStatus, RecordKey, SectionId};

/// One structured pipeline event.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// The router picked a strategy for a source file.
    StrategySelected {
        source_hash: String,
        strategy: IngestStrategy,
        estimated_rows: Option<u64>,
    },
    /// A row was read and handed to the mapper.
    RowProcessed { offset: u64 },
    /// A row repeated an existing key; first occurrence won.
    RowSkippedDuplicate { offset: u64, key: RecordKey },
    /// A row could not be mapped.
    RowRejected { offset: u64, reason: String },
    /// A batch was durably committed and the checkpoint advanced.
    BatchCommitted {
        records: usize,
        failed: usize,
        checkpoint_offset: u64,
    },
    /// A generation job changed state.
    JobTransition {
        job_id: String,
        record_key: RecordKey,
        section: SectionId,
        status: JobStatus,
        attempt: u32,
    },
    /// The budget ceiling stopped a job before dispatch.
    BudgetExceeded {
        job_id: String,
        ceiling_usd: f64,
        projected_usd: f64,
    },
}

/// Consumer of pipeline events.
pub trait EventSink: Send + Sync {
    /// Called for every emitted event, in emission order per phase.
    fn emit(&self, event: &PipelineEvent);
}

/// No-op sink for headless/test usage.
pub struct SilentEvents;

impl EventSink for SilentEvents {
    fn emit(&self, _event: &PipelineEvent) {}
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::Mutex;

    /// Sink that records every event for assertions.
    #[derive(Default)]
    pub struct RecordingEvents {
        pub events: Mutex<Vec<PipelineEvent>>,
    }

    impl EventSink for RecordingEvents {
        fn emit(&self, event: &PipelineEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }
}
