//! Static, versioned column-to-section mapping declarations.
//!
//! A declaration binds a header layout version to the fixed section set:
//! which source columns feed each section, and through which transform.
//! Declarations are compiled in, loaded once, and never mutated at
//! runtime.

use termforge_shared::SectionId;

use crate::transform::{CoerceKind, Transform};

/// Mapping for a single section.
#[derive(Debug)]
pub struct SectionMapping {
    pub section: SectionId,
    pub sources: &'static [&'static str],
    pub transform: Transform,
}

/// A complete mapping declaration for one header layout version.
#[derive(Debug)]
pub struct MappingDeclaration {
    /// Declaration version (matches the reader's layout version).
    pub version: u32,
    /// Column whose value becomes the record key.
    pub key_column: &'static str,
    /// Opaque category reference column, passed through unmodified.
    pub category_column: &'static str,
    /// Opaque sub-category reference column (comma/semicolon separated).
    pub subcategory_column: &'static str,
    /// One entry per section, in canonical section order.
    pub sections: &'static [SectionMapping],
}

impl MappingDeclaration {
    /// Mapping entry for a section.
    pub fn mapping_for(&self, section: SectionId) -> Option<&SectionMapping> {
        self.sections.iter().find(|m| m.section == section)
    }

    /// All distinct source columns referenced by this declaration,
    /// including the key and category passthrough columns.
    pub fn source_columns(&self) -> Vec<&'static str> {
        let mut columns = vec![self.key_column, self.category_column, self.subcategory_column];
        for mapping in self.sections {
            columns.extend_from_slice(mapping.sources);
        }
        columns.sort_unstable();
        columns.dedup();
        columns
    }
}

/// The v1 declaration, matching header layout v1 (the 295-column AI/ML
/// glossary workbook).
pub fn v1() -> &'static MappingDeclaration {
    &DECLARATION_V1
}

static DECLARATION_V1: MappingDeclaration = MappingDeclaration {
    version: 1,
    key_column: "Term",
    category_column: "Introduction – Category and Sub-category of the Term – Main Category",
    subcategory_column: "Introduction – Category and Sub-category of the Term – Sub-category",
    sections: &SECTIONS_V1,
};

static SECTIONS_V1: [SectionMapping; 42] = [
    SectionMapping {
        section: SectionId::DefinitionOverview,
        sources: &["Introduction – Definition and Overview"],
        transform: Transform::Verbatim,
    },
    SectionMapping {
        section: SectionId::KeyConcepts,
        sources: &["Introduction – Key Concepts and Principles"],
        transform: Transform::Verbatim,
    },
    SectionMapping {
        section: SectionId::ImportanceRelevance,
        sources: &["Introduction – Importance and Relevance in AI/ML"],
        transform: Transform::Verbatim,
    },
    SectionMapping {
        section: SectionId::BriefBackground,
        sources: &["Introduction – Brief History or Background"],
        transform: Transform::Verbatim,
    },
    SectionMapping {
        section: SectionId::LimitationsAssumptions,
        sources: &["Introduction – Limitations and Assumptions"],
        transform: Transform::Verbatim,
    },
    SectionMapping {
        section: SectionId::Prerequisites,
        sources: &[
            "Prerequisites – Prior Knowledge or Skills",
            "Prerequisites – Recommended Background or Experience",
        ],
        transform: Transform::Concat { separator: "\n\n" },
    },
    SectionMapping {
        section: SectionId::TheoreticalConcepts,
        sources: &[
            "Theoretical Concepts – Key Mathematical and Statistical Foundations",
            "Theoretical Concepts – Underlying Algorithms or Techniques",
        ],
        transform: Transform::Concat { separator: "\n\n" },
    },
    SectionMapping {
        section: SectionId::HowItWorks,
        sources: &["How It Works – Step-by-step Explanation of the Process"],
        transform: Transform::Verbatim,
    },
    SectionMapping {
        section: SectionId::VariantsExtensions,
        sources: &["Variants or Extensions – Different Types or Categories"],
        transform: Transform::Verbatim,
    },
    SectionMapping {
        section: SectionId::Applications,
        sources: &[
            "Applications – Real-world Use Cases and Examples",
            "Applications – Industries or Domains of Application",
        ],
        transform: Transform::Concat { separator: "\n\n" },
    },
    SectionMapping {
        section: SectionId::Implementation,
        sources: &[
            "Implementation – Popular Programming Languages and Libraries",
            "Implementation – Code Snippets or Pseudocode",
        ],
        transform: Transform::Concat { separator: "\n\n" },
    },
    SectionMapping {
        section: SectionId::EvaluationMetrics,
        sources: &["Evaluation and Metrics – Appropriate Evaluation Techniques"],
        transform: Transform::Verbatim,
    },
    SectionMapping {
        section: SectionId::AdvantagesDisadvantages,
        sources: &[
            "Advantages and Disadvantages – Strengths and Benefits",
            "Advantages and Disadvantages – Weaknesses and Limitations",
        ],
        transform: Transform::Concat { separator: "\n\n" },
    },
    SectionMapping {
        section: SectionId::EthicsResponsibleAi,
        sources: &["Ethics and Responsible AI – Ethical Considerations and Implications"],
        transform: Transform::Verbatim,
    },
    SectionMapping {
        section: SectionId::HistoricalContext,
        sources: &["Historical Context – Timeline of Key Developments"],
        transform: Transform::Verbatim,
    },
    SectionMapping {
        section: SectionId::IllustrationDiagram,
        sources: &["Illustration or Diagram – Visual Representation of the Concept"],
        transform: Transform::Verbatim,
    },
    SectionMapping {
        section: SectionId::RelatedConcepts,
        sources: &["Related Concepts – Connection to Other AI/ML Terms or Topics"],
        transform: Transform::SplitList { delimiter: ';' },
    },
    SectionMapping {
        section: SectionId::CaseStudies,
        sources: &["Case Studies – In-depth Examples of Real-world Applications"],
        transform: Transform::Verbatim,
    },
    SectionMapping {
        section: SectionId::ExpertInterviews,
        sources: &["Interviews with Experts – Insights from Practitioners"],
        transform: Transform::Verbatim,
    },
    SectionMapping {
        section: SectionId::HandsOnTutorials,
        sources: &["Hands-on Tutorials – Step-by-step Guides for Implementation"],
        transform: Transform::Verbatim,
    },
    SectionMapping {
        section: SectionId::InteractiveElements,
        sources: &["Interactive Elements – Quizzes or Exercises"],
        transform: Transform::Verbatim,
    },
    SectionMapping {
        section: SectionId::IndustryInsights,
        sources: &["Industry Insights – Current Trends and Adoption"],
        transform: Transform::Verbatim,
    },
    SectionMapping {
        section: SectionId::CommonChallenges,
        sources: &["Common Challenges and Pitfalls – Typical Mistakes or Misconceptions"],
        transform: Transform::Verbatim,
    },
    SectionMapping {
        section: SectionId::DatasetsBenchmarks,
        sources: &["Real-world Datasets and Benchmarks – Popular Datasets for Training and Testing"],
        transform: Transform::SplitList { delimiter: ';' },
    },
    SectionMapping {
        section: SectionId::ResearchPapers,
        sources: &["Research Papers – Seminal or Foundational Papers"],
        transform: Transform::SplitList { delimiter: ';' },
    },
    SectionMapping {
        section: SectionId::CareerGuidance,
        sources: &["Career Guidance – Relevant Roles or Job Titles"],
        transform: Transform::Verbatim,
    },
    SectionMapping {
        section: SectionId::FutureDirections,
        sources: &["Future Directions – Emerging Research or Open Problems"],
        transform: Transform::Verbatim,
    },
    SectionMapping {
        section: SectionId::GlossaryDefinitions,
        sources: &["Glossary and Definitions – Key Terms and Their Meanings"],
        transform: Transform::Verbatim,
    },
    SectionMapping {
        section: SectionId::Faqs,
        sources: &["FAQs – Common Questions and Answers"],
        transform: Transform::Verbatim,
    },
    SectionMapping {
        section: SectionId::TagsKeywords,
        sources: &["Metadata – Tags and Keywords"],
        transform: Transform::SplitList { delimiter: ',' },
    },
    SectionMapping {
        section: SectionId::Appendices,
        sources: &["Appendices – Additional Resources or Materials"],
        transform: Transform::Verbatim,
    },
    SectionMapping {
        section: SectionId::IndexEntries,
        sources: &["Index – Alphabetical Listing of Covered Topics"],
        transform: Transform::SplitList { delimiter: ',' },
    },
    SectionMapping {
        section: SectionId::References,
        sources: &["References – Citations and Sources"],
        transform: Transform::SplitList { delimiter: ';' },
    },
    SectionMapping {
        section: SectionId::Conclusion,
        sources: &["Conclusion – Summary and Key Takeaways"],
        transform: Transform::Verbatim,
    },
    SectionMapping {
        section: SectionId::MetadataNotes,
        sources: &["Metadata – Estimated Reading Time (Minutes)"],
        transform: Transform::Coerce(CoerceKind::Number),
    },
    SectionMapping {
        section: SectionId::BestPractices,
        sources: &["Best Practices – Guidelines for Effective Use"],
        transform: Transform::Verbatim,
    },
    SectionMapping {
        section: SectionId::SecurityConsiderations,
        sources: &["Security Considerations – Risks and Mitigations"],
        transform: Transform::Verbatim,
    },
    SectionMapping {
        section: SectionId::OptimizationTechniques,
        sources: &["Optimization Techniques – Performance Tuning Approaches"],
        transform: Transform::Verbatim,
    },
    SectionMapping {
        section: SectionId::ComparisonAlternatives,
        sources: &["Comparison with Alternatives – Similar Methods and Tradeoffs"],
        transform: Transform::Verbatim,
    },
    SectionMapping {
        section: SectionId::DidYouKnow,
        sources: &["Did You Know? – Interesting Facts or Trivia"],
        transform: Transform::Verbatim,
    },
    SectionMapping {
        section: SectionId::QuickQuiz,
        sources: &["Quick Quiz – Review Questions"],
        transform: Transform::SplitList { delimiter: '|' },
    },
    SectionMapping {
        section: SectionId::FurtherReading,
        sources: &[
            "Further Reading – Books and Articles",
            "Further Reading – Online Courses and Tutorials",
        ],
        transform: Transform::Concat { separator: "\n\n" },
    },
];
