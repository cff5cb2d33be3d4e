//! Shared types, error model, and configuration for TermForge.
//!
//! This crate is the foundation depended on by all other TermForge crates.
//! It provides:
//! - [`TermForgeError`] — the unified error type
//! - Domain types ([`ContentRecord`], [`SectionId`], [`Checkpoint`],
//!   [`GenerationJob`], [`RawRow`])
//! - Configuration ([`AppConfig`], [`IngestConfig`], [`GenerationConfig`],
//!   config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BackendConfig, DefaultsConfig, GapOrder, GenerationConfig,
    GenerationPoliciesConfig, IngestConfig, IngestPoliciesConfig, ModelPrice, QualityConfig,
    config_dir, config_file_path, expand_home, init_config, load_config, load_config_from,
    validate_api_key,
};
pub use error::{Result, TermForgeError};
pub use types::{
    CellValue, Checkpoint, CheckpointStatus, ContentCategory, ContentRecord, CostLedgerEntry,
    GenerationJob, IngestStrategy, JobStatus, RawRow, RecordKey, SECTION_COUNT, Section,
    SectionContent, SectionId, SectionStatus, SourceFile, SourceFormat,
};
