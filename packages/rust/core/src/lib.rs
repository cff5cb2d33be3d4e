//! Core pipeline orchestration for TermForge.
//!
//! This crate ties together routing, stream reading, mapping, batch
//! writing, and AI generation into the two end-to-end runs:
//! [`pipeline::run_ingest`] and [`generation::run_generation`].

pub mod events;
pub mod generation;
pub mod ledger;
pub mod pipeline;
pub mod quality;
pub mod writer;

pub use events::{EventSink, PipelineEvent, SilentEvents};
pub use generation::{GenerationReport, run_generation};
pub use ledger::CostLedger;
pub use pipeline::{IngestReport, run_ingest};
pub use quality::{QualityDecision, QualityEvaluator, QualityVerdict};
pub use writer::{BatchWriter, FailedWrite};
