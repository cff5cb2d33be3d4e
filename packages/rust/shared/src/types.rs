//! Core domain types for the TermForge ingestion and generation pipeline.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// RecordKey
// ---------------------------------------------------------------------------

/// Stable external key of a [`ContentRecord`], derived from the designated
/// key column of the source (lowercased, trimmed, whitespace collapsed).
///
/// Collisions between distinct rows are resolved by the mapper with a
/// numeric suffix; identical keys from re-reads are upsert-idempotent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordKey(pub String);

impl RecordKey {
    /// Normalize a raw term into a key: trim, lowercase, collapse
    /// whitespace runs into single hyphens.
    pub fn normalize(term: &str) -> Self {
        let mut out = String::with_capacity(term.len());
        let mut last_was_sep = true;
        for ch in term.trim().chars() {
            if ch.is_whitespace() {
                if !last_was_sep {
                    out.push('-');
                    last_was_sep = true;
                }
            } else {
                for lower in ch.to_lowercase() {
                    out.push(lower);
                }
                last_was_sep = false;
            }
        }
        while out.ends_with('-') {
            out.pop();
        }
        Self(out)
    }

    /// Derive a collision key for the `n`-th duplicate occurrence (n >= 2).
    pub fn with_suffix(&self, n: u32) -> Self {
        Self(format!("{}-{n}", self.0))
    }

    /// Borrow the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Raw rows
// ---------------------------------------------------------------------------

/// A single raw cell value from the tabular source.
///
/// `Empty` is distinct from an empty string: blank cells must stay
/// distinguishable from present-but-empty content downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellValue {
    Text(String),
    Number(f64),
    Bool(bool),
    Empty,
}

impl CellValue {
    /// The cell as trimmed text, or `None` for blank cells.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Text(s) => {
                let t = s.trim();
                if t.is_empty() { None } else { Some(t.to_string()) }
            }
            Self::Number(n) => Some(format_number(*n)),
            Self::Bool(b) => Some(b.to_string()),
            Self::Empty => None,
        }
    }

    /// Whether this cell carries no usable content.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }
}

/// Render a numeric cell without a trailing `.0` for whole numbers.
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// One source record in flight between reader and mapper. Never persisted.
#[derive(Debug, Clone)]
pub struct RawRow {
    /// 1-based data-row offset within the source (header excluded).
    pub offset: u64,
    /// Normalized column header -> raw cell value.
    pub cells: HashMap<String, CellValue>,
}

impl RawRow {
    /// Look up a cell by normalized column name.
    pub fn get(&self, column: &str) -> &CellValue {
        self.cells.get(column).unwrap_or(&CellValue::Empty)
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Number of content sections in every [`ContentRecord`].
pub const SECTION_COUNT: usize = 42;

/// The fixed identity set of content sections composing a record.
///
/// Adding or removing a variant is a mapping-layout change and must come
/// with a new mapping declaration version.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SectionId {
    DefinitionOverview,
    KeyConcepts,
    ImportanceRelevance,
    BriefBackground,
    LimitationsAssumptions,
    Prerequisites,
    TheoreticalConcepts,
    HowItWorks,
    VariantsExtensions,
    Applications,
    Implementation,
    EvaluationMetrics,
    AdvantagesDisadvantages,
    EthicsResponsibleAi,
    HistoricalContext,
    IllustrationDiagram,
    RelatedConcepts,
    CaseStudies,
    ExpertInterviews,
    HandsOnTutorials,
    InteractiveElements,
    IndustryInsights,
    CommonChallenges,
    DatasetsBenchmarks,
    ResearchPapers,
    CareerGuidance,
    FutureDirections,
    GlossaryDefinitions,
    Faqs,
    TagsKeywords,
    Appendices,
    IndexEntries,
    References,
    Conclusion,
    MetadataNotes,
    BestPractices,
    SecurityConsiderations,
    OptimizationTechniques,
    ComparisonAlternatives,
    DidYouKnow,
    QuickQuiz,
    FurtherReading,
}

/// Semantic grouping of sections, used for quality thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentCategory {
    /// Explanatory prose: definitions, theory, context.
    Conceptual,
    /// Actionable content: implementation, tutorials, practices.
    Practical,
    /// Lookup material: lists, links, citations, metadata.
    Reference,
    /// Engagement content: quizzes, diagrams, trivia.
    Interactive,
}

impl SectionId {
    /// Every section, in canonical (source-column) order.
    pub const ALL: [SectionId; SECTION_COUNT] = [
        Self::DefinitionOverview,
        Self::KeyConcepts,
        Self::ImportanceRelevance,
        Self::BriefBackground,
        Self::LimitationsAssumptions,
        Self::Prerequisites,
        Self::TheoreticalConcepts,
        Self::HowItWorks,
        Self::VariantsExtensions,
        Self::Applications,
        Self::Implementation,
        Self::EvaluationMetrics,
        Self::AdvantagesDisadvantages,
        Self::EthicsResponsibleAi,
        Self::HistoricalContext,
        Self::IllustrationDiagram,
        Self::RelatedConcepts,
        Self::CaseStudies,
        Self::ExpertInterviews,
        Self::HandsOnTutorials,
        Self::InteractiveElements,
        Self::IndustryInsights,
        Self::CommonChallenges,
        Self::DatasetsBenchmarks,
        Self::ResearchPapers,
        Self::CareerGuidance,
        Self::FutureDirections,
        Self::GlossaryDefinitions,
        Self::Faqs,
        Self::TagsKeywords,
        Self::Appendices,
        Self::IndexEntries,
        Self::References,
        Self::Conclusion,
        Self::MetadataNotes,
        Self::BestPractices,
        Self::SecurityConsiderations,
        Self::OptimizationTechniques,
        Self::ComparisonAlternatives,
        Self::DidYouKnow,
        Self::QuickQuiz,
        Self::FurtherReading,
    ];

    /// Stable slug used as JSON key and in job rows.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DefinitionOverview => "definition_overview",
            Self::KeyConcepts => "key_concepts",
            Self::ImportanceRelevance => "importance_relevance",
            Self::BriefBackground => "brief_background",
            Self::LimitationsAssumptions => "limitations_assumptions",
            Self::Prerequisites => "prerequisites",
            Self::TheoreticalConcepts => "theoretical_concepts",
            Self::HowItWorks => "how_it_works",
            Self::VariantsExtensions => "variants_extensions",
            Self::Applications => "applications",
            Self::Implementation => "implementation",
            Self::EvaluationMetrics => "evaluation_metrics",
            Self::AdvantagesDisadvantages => "advantages_disadvantages",
            Self::EthicsResponsibleAi => "ethics_responsible_ai",
            Self::HistoricalContext => "historical_context",
            Self::IllustrationDiagram => "illustration_diagram",
            Self::RelatedConcepts => "related_concepts",
            Self::CaseStudies => "case_studies",
            Self::ExpertInterviews => "expert_interviews",
            Self::HandsOnTutorials => "hands_on_tutorials",
            Self::InteractiveElements => "interactive_elements",
            Self::IndustryInsights => "industry_insights",
            Self::CommonChallenges => "common_challenges",
            Self::DatasetsBenchmarks => "datasets_benchmarks",
            Self::ResearchPapers => "research_papers",
            Self::CareerGuidance => "career_guidance",
            Self::FutureDirections => "future_directions",
            Self::GlossaryDefinitions => "glossary_definitions",
            Self::Faqs => "faqs",
            Self::TagsKeywords => "tags_keywords",
            Self::Appendices => "appendices",
            Self::IndexEntries => "index_entries",
            Self::References => "references",
            Self::Conclusion => "conclusion",
            Self::MetadataNotes => "metadata_notes",
            Self::BestPractices => "best_practices",
            Self::SecurityConsiderations => "security_considerations",
            Self::OptimizationTechniques => "optimization_techniques",
            Self::ComparisonAlternatives => "comparison_alternatives",
            Self::DidYouKnow => "did_you_know",
            Self::QuickQuiz => "quick_quiz",
            Self::FurtherReading => "further_reading",
        }
    }

    /// Human heading used in prompts and reports.
    pub fn title(&self) -> &'static str {
        match self {
            Self::DefinitionOverview => "Definition and Overview",
            Self::KeyConcepts => "Key Concepts and Principles",
            Self::ImportanceRelevance => "Importance and Relevance",
            Self::BriefBackground => "Brief History or Background",
            Self::LimitationsAssumptions => "Limitations and Assumptions",
            Self::Prerequisites => "Prerequisites",
            Self::TheoreticalConcepts => "Theoretical Concepts",
            Self::HowItWorks => "How It Works",
            Self::VariantsExtensions => "Variants or Extensions",
            Self::Applications => "Applications",
            Self::Implementation => "Implementation",
            Self::EvaluationMetrics => "Evaluation and Metrics",
            Self::AdvantagesDisadvantages => "Advantages and Disadvantages",
            Self::EthicsResponsibleAi => "Ethics and Responsible AI",
            Self::HistoricalContext => "Historical Context",
            Self::IllustrationDiagram => "Illustration or Diagram",
            Self::RelatedConcepts => "Related Concepts",
            Self::CaseStudies => "Case Studies",
            Self::ExpertInterviews => "Interviews with Experts",
            Self::HandsOnTutorials => "Hands-on Tutorials",
            Self::InteractiveElements => "Interactive Elements",
            Self::IndustryInsights => "Industry Insights",
            Self::CommonChallenges => "Common Challenges and Pitfalls",
            Self::DatasetsBenchmarks => "Real-world Datasets and Benchmarks",
            Self::ResearchPapers => "Research Papers",
            Self::CareerGuidance => "Career Guidance",
            Self::FutureDirections => "Future Directions",
            Self::GlossaryDefinitions => "Glossary and Definitions",
            Self::Faqs => "Frequently Asked Questions",
            Self::TagsKeywords => "Tags and Keywords",
            Self::Appendices => "Appendices",
            Self::IndexEntries => "Index",
            Self::References => "References",
            Self::Conclusion => "Conclusion",
            Self::MetadataNotes => "Metadata",
            Self::BestPractices => "Best Practices",
            Self::SecurityConsiderations => "Security Considerations",
            Self::OptimizationTechniques => "Optimization Techniques",
            Self::ComparisonAlternatives => "Comparison with Alternatives",
            Self::DidYouKnow => "Did You Know?",
            Self::QuickQuiz => "Quick Quiz",
            Self::FurtherReading => "Further Reading",
        }
    }

    /// Semantic category for quality thresholds.
    pub fn category(&self) -> ContentCategory {
        use ContentCategory::*;
        match self {
            Self::DefinitionOverview
            | Self::KeyConcepts
            | Self::ImportanceRelevance
            | Self::BriefBackground
            | Self::LimitationsAssumptions
            | Self::TheoreticalConcepts
            | Self::HowItWorks
            | Self::VariantsExtensions
            | Self::HistoricalContext
            | Self::RelatedConcepts
            | Self::FutureDirections
            | Self::ComparisonAlternatives
            | Self::Conclusion => Conceptual,
            Self::Prerequisites
            | Self::Applications
            | Self::Implementation
            | Self::EvaluationMetrics
            | Self::AdvantagesDisadvantages
            | Self::EthicsResponsibleAi
            | Self::CaseStudies
            | Self::HandsOnTutorials
            | Self::IndustryInsights
            | Self::CommonChallenges
            | Self::CareerGuidance
            | Self::BestPractices
            | Self::SecurityConsiderations
            | Self::OptimizationTechniques => Practical,
            Self::ExpertInterviews
            | Self::DatasetsBenchmarks
            | Self::ResearchPapers
            | Self::GlossaryDefinitions
            | Self::Faqs
            | Self::TagsKeywords
            | Self::Appendices
            | Self::IndexEntries
            | Self::References
            | Self::MetadataNotes
            | Self::FurtherReading => Reference,
            Self::IllustrationDiagram
            | Self::InteractiveElements
            | Self::DidYouKnow
            | Self::QuickQuiz => Interactive,
        }
    }
}

impl std::fmt::Display for SectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle state of a section slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SectionStatus {
    /// No source column carried content and nothing was generated yet.
    #[default]
    Empty,
    /// Populated deterministically from source columns.
    Mapped,
    /// Produced by an AI backend; passed the salvage floor but not the
    /// verify threshold, or evaluation was skipped.
    Generated,
    /// Generated content that passed its category's quality threshold.
    Verified,
    /// Below the salvage floor; queued for human review.
    Flagged,
}

/// Content payload of a populated section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SectionContent {
    /// Prose content.
    Text(String),
    /// Structured payload (e.g. a split list, a coerced flag).
    Structured(serde_json::Value),
}

/// One of the 42 content slots of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    /// Populated content; `None` while `status` is `Empty`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<SectionContent>,
    /// Lifecycle state.
    #[serde(default)]
    pub status: SectionStatus,
    /// Confidence in the source mapping, 0.0..=1.0. Mapped content gets
    /// 1.0; generated content carries its normalized quality score.
    #[serde(default)]
    pub source_confidence: f32,
}

impl Section {
    /// An untouched, empty slot.
    pub fn empty() -> Self {
        Self {
            content: None,
            status: SectionStatus::Empty,
            source_confidence: 0.0,
        }
    }

    /// A slot populated deterministically from the source.
    pub fn mapped(content: SectionContent) -> Self {
        Self {
            content: Some(content),
            status: SectionStatus::Mapped,
            source_confidence: 1.0,
        }
    }
}

impl Default for Section {
    fn default() -> Self {
        Self::empty()
    }
}

// ---------------------------------------------------------------------------
// ContentRecord
// ---------------------------------------------------------------------------

/// A fully-shaped glossary record: exactly [`SECTION_COUNT`] section slots,
/// plus opaque category references passed through from the mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentRecord {
    /// Stable external key.
    pub key: RecordKey,
    /// Display form of the term (original casing preserved).
    pub term: String,
    /// Content hash of the source file this record came from.
    pub source_hash: String,
    /// Opaque category reference, passed through without interpretation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_ref: Option<String>,
    /// Opaque sub-category references.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subcategory_refs: Vec<String>,
    /// SHA-256 of the raw row, for change detection on re-import.
    pub row_content_hash: String,
    /// The 42 section slots.
    pub sections: BTreeMap<SectionId, Section>,
}

impl ContentRecord {
    /// Create a record with all sections initialized to empty.
    pub fn new(key: RecordKey, term: impl Into<String>, source_hash: impl Into<String>) -> Self {
        let sections = SectionId::ALL
            .iter()
            .map(|id| (*id, Section::empty()))
            .collect();
        Self {
            key,
            term: term.into(),
            source_hash: source_hash.into(),
            category_ref: None,
            subcategory_refs: Vec::new(),
            row_content_hash: String::new(),
            sections,
        }
    }

    /// Re-establish the fixed slot set after deserialization: any section
    /// missing from the stored JSON becomes an empty slot.
    pub fn normalize_sections(&mut self) {
        for id in SectionId::ALL {
            self.sections.entry(id).or_insert_with(Section::empty);
        }
    }

    /// Sections still awaiting content.
    pub fn empty_sections(&self) -> Vec<SectionId> {
        SectionId::ALL
            .iter()
            .filter(|id| {
                self.sections
                    .get(id)
                    .is_none_or(|s| s.status == SectionStatus::Empty)
            })
            .copied()
            .collect()
    }

    /// Number of sections populated from the source.
    pub fn mapped_count(&self) -> usize {
        self.sections
            .values()
            .filter(|s| s.status == SectionStatus::Mapped)
            .count()
    }
}

// ---------------------------------------------------------------------------
// Source files & checkpoints
// ---------------------------------------------------------------------------

/// Physical shape of the tabular source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    /// Native spreadsheet workbook (xlsx).
    Workbook,
    /// Flat delimited text (csv).
    Delimited,
}

impl SourceFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Workbook => "workbook",
            Self::Delimited => "delimited",
        }
    }
}

/// Processing strategy selected by the ingestion router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IngestStrategy {
    /// Parse the whole file in memory.
    Direct,
    /// Stream through the native reader, with convert-then-stream as the
    /// documented contingency branch.
    StreamNative,
    /// Convert to a delimited spool file first, then stream that.
    ConvertThenStream,
}

impl IngestStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::StreamNative => "stream-native",
            Self::ConvertThenStream => "convert-then-stream",
        }
    }
}

/// Identity and routing profile of an ingested source file.
///
/// Immutable once hashed: re-uploading identical bytes yields the same
/// hash and therefore the same checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFile {
    /// SHA-256 of the file bytes.
    pub content_hash: String,
    /// File size in bytes.
    pub byte_size: u64,
    /// Physical format.
    pub format: SourceFormat,
    /// Strategy chosen by the router.
    pub strategy: IngestStrategy,
    /// Estimated data-row count, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_rows: Option<u64>,
}

/// Checkpoint lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    InProgress,
    Completed,
    Aborted,
}

impl CheckpointStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "aborted" => Some(Self::Aborted),
            _ => None,
        }
    }
}

/// Durable marker of ingestion progress for one source file.
///
/// `last_committed_row_offset` is 1-based over data rows; 0 means nothing
/// committed. It only ever advances, and only after the corresponding
/// batch upsert was durably acknowledged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub source_hash: String,
    pub last_committed_row_offset: u64,
    pub rows_processed: u64,
    pub rows_failed: u64,
    pub status: CheckpointStatus,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    /// A fresh checkpoint for a source about to be ingested.
    pub fn new(source_hash: impl Into<String>) -> Self {
        Self {
            source_hash: source_hash.into(),
            last_committed_row_offset: 0,
            rows_processed: 0,
            rows_failed: 0,
            status: CheckpointStatus::InProgress,
            updated_at: Utc::now(),
        }
    }

    /// Advance the committed offset. Offsets never move backwards.
    pub fn advance_to(&mut self, offset: u64) {
        if offset > self.last_committed_row_offset {
            self.last_committed_row_offset = offset;
        }
        self.updated_at = Utc::now();
    }
}

// ---------------------------------------------------------------------------
// Generation jobs & cost ledger
// ---------------------------------------------------------------------------

/// Lifecycle state of a generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    BudgetExceeded,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::BudgetExceeded => "budget_exceeded",
        }
    }

    /// Whether this state ends the job.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::BudgetExceeded)
    }
}

/// One attempt-tracked unit of AI backfill work: a single empty section of
/// a single record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationJob {
    /// UUID v7, time-sortable.
    pub id: String,
    pub record_key: RecordKey,
    pub section: SectionId,
    pub model_id: String,
    /// Attempts consumed so far (1-based once running).
    pub attempts: u32,
    pub status: JobStatus,
    /// Total cost across all attempts, in USD.
    pub cost_incurred: f64,
    /// Quality score of the accepted content, when evaluated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f64>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl GenerationJob {
    /// A freshly queued job for one record/section gap.
    pub fn queued(record_key: RecordKey, section: SectionId, model_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            record_key,
            section,
            model_id: model_id.into(),
            attempts: 0,
            status: JobStatus::Queued,
            cost_incurred: 0.0,
            quality_score: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }
}

/// Append-only spend record. Running sums are derived, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostLedgerEntry {
    pub job_id: String,
    pub model_id: String,
    /// USD. Zero-cost entries are written for budget-exceeded and failed
    /// attempts so the audit trail stays complete.
    pub amount: f64,
    pub created_at: DateTime<Utc>,
}
