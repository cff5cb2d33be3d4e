//! AI backend boundary for section generation.
//!
//! This crate provides:
//! - [`GenerationBackend`] — the backend-agnostic generation contract
//! - [`OpenRouterBackend`] — HTTP implementation over a chat-completions API
//! - [`prompt`] — prompt construction for section backfill

pub mod openrouter;
pub mod prompt;

use async_trait::async_trait;
use serde_json::Value;

use termforge_shared::{Result, SectionId};

pub use openrouter::OpenRouterBackend;

/// One generation request: a single empty section of a single record.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Display form of the term.
    pub term: String,
    /// Section to produce content for.
    pub section: SectionId,
    /// Context payload handed to the backend (already-mapped content the
    /// prompt may lean on, e.g. the record's definition).
    pub context: Value,
    /// Backend model identifier.
    pub model_id: String,
}

/// Successful generation result with its cost accounting.
#[derive(Debug, Clone)]
pub struct GeneratedContent {
    pub content: String,
    /// USD cost of this call, from per-model token prices.
    pub cost_incurred: f64,
    pub tokens_in: u64,
    pub tokens_out: u64,
    /// Model that actually served the call.
    pub model: String,
    pub latency_ms: u64,
}

/// Backend-agnostic generation contract.
///
/// Multiple backends are addressed through the request's `model_id`; the
/// orchestrator never assumes anything beyond this trait. Errors carry a
/// retryable/terminal classification via
/// [`TermForgeError::Generation`](termforge_shared::TermForgeError).
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Backend name for logs and events.
    fn name(&self) -> &str;

    /// Produce content for one section.
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedContent>;
}
