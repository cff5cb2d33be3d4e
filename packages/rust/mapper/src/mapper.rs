//! Row-to-record mapping.
//!
//! `map_row` is deterministic over (declaration, row, prior keys): the
//! only state the mapper carries is the set of keys already produced,
//! which drives duplicate resolution. On resume the pipeline preloads
//! that set from the store so a restarted run resolves duplicates the
//! same way an uninterrupted one would.

use std::collections::{BTreeMap, HashMap};

use sha2::{Digest, Sha256};
use tracing::debug;

use termforge_shared::{ContentRecord, RawRow, RecordKey, Section};

use crate::mapping::MappingDeclaration;
use crate::transform;

/// A record produced from one source row, with its completeness summary.
#[derive(Debug)]
pub struct MappedRecord {
    /// Source row offset the record came from.
    pub offset: u64,
    /// Sections populated from the source.
    pub mapped_sections: usize,
    pub record: ContentRecord,
}

/// Outcome of mapping a single row.
#[derive(Debug)]
pub enum MapOutcome {
    /// Row became a new record.
    Mapped(Box<MappedRecord>),
    /// Row repeats an already-produced key; first occurrence won.
    SkippedDuplicate { offset: u64, key: RecordKey },
    /// Row could not be mapped (recorded, stream continues).
    Rejected { offset: u64, reason: String },
}

/// Maps raw rows into content records under a static declaration.
pub struct Mapper {
    decl: &'static MappingDeclaration,
    source_hash: String,
    /// Normalized key -> first display term (trimmed) seen for it.
    seen: HashMap<String, String>,
}

impl Mapper {
    pub fn new(decl: &'static MappingDeclaration, source_hash: impl Into<String>) -> Self {
        Self {
            decl,
            source_hash: source_hash.into(),
            seen: HashMap::new(),
        }
    }

    /// Seed the duplicate-resolution state with keys already persisted
    /// for this source (used on resume).
    pub fn preload_keys(&mut self, pairs: impl IntoIterator<Item = (RecordKey, String)>) {
        for (key, term) in pairs {
            self.seen.insert(key.0, term.trim().to_string());
        }
    }

    /// Map one row. Never fails the stream: unusable rows come back as
    /// `Rejected`, repeated keys as `SkippedDuplicate`.
    pub fn map_row(&mut self, row: &RawRow) -> MapOutcome {
        let Some(term) = row.get(self.decl.key_column).as_text() else {
            debug!(offset = row.offset, "row rejected: blank key column");
            return MapOutcome::Rejected {
                offset: row.offset,
                reason: format!("blank or missing key column '{}'", self.decl.key_column),
            };
        };

        let key = match self.resolve_key(&term) {
            KeyResolution::Taken(key) => key,
            KeyResolution::Duplicate(key) => {
                debug!(offset = row.offset, key = %key, "row skipped: duplicate key");
                return MapOutcome::SkippedDuplicate {
                    offset: row.offset,
                    key,
                };
            }
        };

        let mut record = ContentRecord::new(key, &term, self.source_hash.clone());
        record.row_content_hash = row_hash(row);
        record.category_ref = row.get(self.decl.category_column).as_text();
        record.subcategory_refs = row
            .get(self.decl.subcategory_column)
            .as_text()
            .map(|text| split_refs(&text))
            .unwrap_or_default();

        for mapping in self.decl.sections {
            if let Some(content) = transform::apply(mapping.transform, mapping.sources, row) {
                record
                    .sections
                    .insert(mapping.section, Section::mapped(content));
            }
        }

        let mapped_sections = record.mapped_count();
        MapOutcome::Mapped(Box::new(MappedRecord {
            offset: row.offset,
            mapped_sections,
            record,
        }))
    }

    /// Resolve the key for a term against everything produced so far.
    ///
    /// Re-occurrences of the same term are duplicates (first wins).
    /// Distinct terms that normalize to the same key get a deterministic
    /// numeric suffix instead of overwriting each other.
    fn resolve_key(&mut self, term: &str) -> KeyResolution {
        let trimmed = term.trim().to_string();
        let base = RecordKey::normalize(term);

        match self.seen.get(base.as_str()) {
            None => {
                self.seen.insert(base.0.clone(), trimmed);
                KeyResolution::Taken(base)
            }
            Some(first_term) if *first_term == trimmed => KeyResolution::Duplicate(base),
            Some(_) => {
                for n in 2.. {
                    let candidate = base.with_suffix(n);
                    match self.seen.get(candidate.as_str()) {
                        None => {
                            self.seen.insert(candidate.0.clone(), trimmed);
                            return KeyResolution::Taken(candidate);
                        }
                        Some(existing) if *existing == trimmed => {
                            return KeyResolution::Duplicate(candidate);
                        }
                        Some(_) => continue,
                    }
                }
                unreachable!("suffix search is unbounded")
            }
        }
    }
}

enum KeyResolution {
    Taken(RecordKey),
    Duplicate(RecordKey),
}

/// SHA-256 over the row's cells in column order, for change detection on
/// re-import.
fn row_hash(row: &RawRow) -> String {
    let ordered: BTreeMap<&String, Option<String>> = row
        .cells
        .iter()
        .map(|(column, value)| (column, value.as_text()))
        .collect();

    let mut hasher = Sha256::new();
    for (column, value) in ordered {
        hasher.update(column.as_bytes());
        hasher.update([0u8]);
        if let Some(text) = value {
            hasher.update(text.as_bytes());
        }
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

/// Split a passthrough reference cell on commas, falling back to
/// semicolons.
fn split_refs(text: &str) -> Vec<String> {
    let delimiter = if text.contains(',') { ',' } else { ';' };
    text.split(delimiter)
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping;
    use crate::transform::{CoerceKind, Transform};
    use termforge_shared::{CellValue, SECTION_COUNT, SectionId, SectionStatus};

    fn row_with(offset: u64, cells: Vec<(String, CellValue)>) -> RawRow {
        RawRow {
            offset,
            cells: cells.into_iter().collect(),
        }
    }

    fn minimal_row(offset: u64, term: &str, definition: &str) -> RawRow {
        row_with(
            offset,
            vec![
                ("Term".to_string(), CellValue::Text(term.to_string())),
                (
                    "Introduction – Definition and Overview".to_string(),
                    CellValue::Text(definition.to_string()),
                ),
            ],
        )
    }

    /// A row carrying plausible content for every mapped source column.
    fn full_row(offset: u64, term: &str) -> RawRow {
        let decl = mapping::v1();
        let mut cells = vec![
            ("Term".to_string(), CellValue::Text(term.to_string())),
            (
                decl.category_column.to_string(),
                CellValue::Text("Machine Learning".into()),
            ),
            (
                decl.subcategory_column.to_string(),
                CellValue::Text("Optimization, Deep Learning".into()),
            ),
        ];
        for m in decl.sections {
            for source in m.sources {
                let value = match m.transform {
                    Transform::SplitList { delimiter } => {
                        CellValue::Text(format!("first{delimiter} second{delimiter} third"))
                    }
                    Transform::Coerce(CoerceKind::Number) => CellValue::Text("7".into()),
                    Transform::Coerce(CoerceKind::Bool) => CellValue::Text("yes".into()),
                    _ => CellValue::Text(format!("Sample content for {source}")),
                };
                cells.push((source.to_string(), value));
            }
        }
        row_with(offset, cells)
    }

    #[test]
    fn full_row_leaves_no_empty_sections() {
        let mut mapper = Mapper::new(mapping::v1(), "hash");
        let outcome = mapper.map_row(&full_row(1, "Gradient Descent"));

        let MapOutcome::Mapped(mapped) = outcome else {
            panic!("expected mapped outcome");
        };
        assert_eq!(mapped.mapped_sections, SECTION_COUNT);
        assert!(mapped.record.empty_sections().is_empty());
        assert_eq!(mapped.record.key.as_str(), "gradient-descent");
        assert_eq!(mapped.record.category_ref.as_deref(), Some("Machine Learning"));
        assert_eq!(
            mapped.record.subcategory_refs,
            vec!["Optimization".to_string(), "Deep Learning".to_string()]
        );
        assert!(!mapped.record.row_content_hash.is_empty());
    }

    #[test]
    fn sparse_row_keeps_absent_sections_empty() {
        let mut mapper = Mapper::new(mapping::v1(), "hash");
        let MapOutcome::Mapped(mapped) = mapper.map_row(&minimal_row(1, "ReLU", "An activation."))
        else {
            panic!("expected mapped outcome");
        };

        assert_eq!(mapped.mapped_sections, 1);
        assert_eq!(mapped.record.empty_sections().len(), SECTION_COUNT - 1);

        // Present-but-empty never happens: the section is Empty, with no content.
        let faqs = &mapped.record.sections[&SectionId::Faqs];
        assert_eq!(faqs.status, SectionStatus::Empty);
        assert!(faqs.content.is_none());
    }

    #[test]
    fn blank_key_is_rejected_not_fatal() {
        let mut mapper = Mapper::new(mapping::v1(), "hash");
        let row = row_with(
            3,
            vec![("Term".to_string(), CellValue::Text("   ".into()))],
        );
        match mapper.map_row(&row) {
            MapOutcome::Rejected { offset, reason } => {
                assert_eq!(offset, 3);
                assert!(reason.contains("key column"));
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn repeated_term_is_skipped_duplicate() {
        let mut mapper = Mapper::new(mapping::v1(), "hash");
        assert!(matches!(
            mapper.map_row(&minimal_row(1, "Transformer", "v1")),
            MapOutcome::Mapped(_)
        ));
        match mapper.map_row(&minimal_row(2, "Transformer", "v2")) {
            MapOutcome::SkippedDuplicate { offset, key } => {
                assert_eq!(offset, 2);
                assert_eq!(key.as_str(), "transformer");
            }
            other => panic!("expected duplicate skip, got {other:?}"),
        }
    }

    #[test]
    fn distinct_terms_with_colliding_keys_get_suffixes() {
        let mut mapper = Mapper::new(mapping::v1(), "hash");
        let MapOutcome::Mapped(first) = mapper.map_row(&minimal_row(1, "ReLU", "a")) else {
            panic!("first should map");
        };
        assert_eq!(first.record.key.as_str(), "relu");

        // Different display term, same normalized key
        let MapOutcome::Mapped(second) = mapper.map_row(&minimal_row(2, "RELU", "b")) else {
            panic!("second should map with suffix");
        };
        assert_eq!(second.record.key.as_str(), "relu-2");

        // Re-occurrence of the suffixed spelling is now a duplicate
        assert!(matches!(
            mapper.map_row(&minimal_row(3, "RELU", "c")),
            MapOutcome::SkippedDuplicate { .. }
        ));
    }

    #[test]
    fn preloaded_keys_dedupe_across_resume() {
        let mut mapper = Mapper::new(mapping::v1(), "hash");
        mapper.preload_keys(vec![(
            RecordKey("transformer".into()),
            "Transformer".to_string(),
        )]);

        assert!(matches!(
            mapper.map_row(&minimal_row(10, "Transformer", "again")),
            MapOutcome::SkippedDuplicate { .. }
        ));
    }

    #[test]
    fn row_hash_is_deterministic_and_content_sensitive() {
        let h1 = row_hash(&minimal_row(1, "A", "def"));
        let h2 = row_hash(&minimal_row(99, "A", "def"));
        let h3 = row_hash(&minimal_row(1, "A", "changed"));
        // Offset does not participate; content does.
        assert_eq!(h1, h2);
        assert_ne!(h1, h3);
    }

    #[test]
    fn split_refs_falls_back_to_semicolons() {
        assert_eq!(split_refs("a, b"), vec!["a", "b"]);
        assert_eq!(split_refs("a; b"), vec!["a", "b"]);
        assert_eq!(split_refs("solo"), vec!["solo"]);
    }
}
