//! Quality scoring for generated section content.
//!
//! Stateless and side-effect-free: content plus the section's semantic
//! category in, a score in 0..=100 and a decision out. Thresholds come
//! from run configuration, not constants.

use termforge_shared::{ContentCategory, QualityConfig, SectionId};

/// What the orchestrator should do with the content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityDecision {
    /// Meets the category threshold; store as verified.
    Verified,
    /// Below threshold but salvageable; worth one regeneration attempt.
    Regenerate,
    /// Below the salvage floor; flag for human review instead of
    /// retrying indefinitely.
    Flagged,
}

/// Score plus decision for one piece of content.
#[derive(Debug, Clone, Copy)]
pub struct QualityVerdict {
    pub score: f64,
    pub decision: QualityDecision,
}

/// Content markers that zero out the cleanliness dimension: refusals and
/// placeholder output have no business in a glossary section.
const REJECT_MARKERS: &[&str] = &[
    "as an ai",
    "i cannot",
    "i can't",
    "i'm sorry",
    "[todo",
    "lorem ipsum",
];

/// Scores generated content along fixed dimensions: length adequacy,
/// term relevance, structure, and cleanliness.
pub struct QualityEvaluator {
    config: QualityConfig,
}

impl QualityEvaluator {
    pub fn new(config: QualityConfig) -> Self {
        Self { config }
    }

    /// Evaluate content generated for one section of one term.
    pub fn evaluate(&self, section: SectionId, term: &str, content: &str) -> QualityVerdict {
        // Refusals and placeholder output are not salvageable by
        // regeneration with the same prompt; flag them outright.
        let lower = content.to_lowercase();
        if REJECT_MARKERS.iter().any(|marker| lower.contains(marker)) {
            return QualityVerdict {
                score: 0.0,
                decision: QualityDecision::Flagged,
            };
        }

        let category = section.category();
        let score = length_score(content, category)
            + relevance_score(term, content)
            + structure_score(content)
            + cleanliness_score(content);
        let score = score.min(100.0);

        let decision = if score >= self.config.threshold_for(category) {
            QualityDecision::Verified
        } else if score >= self.config.salvage_floor {
            QualityDecision::Regenerate
        } else {
            QualityDecision::Flagged
        };

        QualityVerdict { score, decision }
    }
}

/// Length adequacy, 0..=40. Conceptual and practical sections expect real
/// prose; reference and interactive sections may be short lists.
fn length_score(content: &str, category: ContentCategory) -> f64 {
    let len = content.trim().len();
    if len <= 10 {
        return 0.0;
    }
    let full_length = match category {
        ContentCategory::Conceptual | ContentCategory::Practical => 200,
        ContentCategory::Reference | ContentCategory::Interactive => 80,
    };
    (40.0 * len as f64 / full_length as f64).min(40.0)
}

/// Term relevance, 0..=30: does the content actually talk about the term?
fn relevance_score(term: &str, content: &str) -> f64 {
    let content_lower = content.to_lowercase();
    let term_lower = term.trim().to_lowercase();
    if !term_lower.is_empty() && content_lower.contains(&term_lower) {
        return 30.0;
    }
    let any_word = term_lower
        .split_whitespace()
        .filter(|word| word.len() > 3)
        .any(|word| content_lower.contains(word));
    if any_word { 18.0 } else { 6.0 }
}

/// Structural sanity, 0..=15: sentences or list shape.
fn structure_score(content: &str) -> f64 {
    let trimmed = content.trim();
    let sentence_marks = trimmed
        .chars()
        .filter(|c| matches!(c, '.' | '?' | '!'))
        .count();
    let has_list_shape = trimmed.lines().count() > 1
        || trimmed.contains("- ")
        || trimmed.contains("1.");

    if sentence_marks >= 2 || has_list_shape {
        15.0
    } else if sentence_marks == 1 {
        10.0
    } else {
        0.0
    }
}

/// Cleanliness, 0..=15: no stray headings (refusal markers are handled
/// before scoring starts).
fn cleanliness_score(content: &str) -> f64 {
    if content.trim_start().starts_with('#') {
        return 5.0;
    }
    15.0
}
