//! Versioned header layouts and column-name normalization.
//!
//! Source workbooks carry a wide, dash-separated header scheme
//! (`"Introduction – Definition and Overview"`). Before any row is
//! yielded, the header is normalized and matched against the known layout
//! versions; an unrecognized column set fails fast with a schema mismatch
//! rather than failing row-by-row.

use termforge_shared::{Result, TermForgeError};

/// A recognized header layout version.
#[derive(Debug)]
pub struct LayoutVersion {
    /// Layout version number.
    pub version: u32,
    /// The designated key column.
    pub key_column: &'static str,
    /// Marker columns that must all be present (canonical form).
    pub required_markers: &'static [&'static str],
    /// Declared column count of the full layout, for logging only.
    pub declared_columns: usize,
}

/// Layout v1: the 295-column AI/ML glossary workbook.
static LAYOUT_V1: LayoutVersion = LayoutVersion {
    version: 1,
    key_column: "Term",
    required_markers: &[
        "Introduction – Definition and Overview",
        "Introduction – Key Concepts and Principles",
        "Theoretical Concepts – Key Mathematical and Statistical Foundations",
        "Applications – Real-world Use Cases and Examples",
        "Conclusion – Summary and Key Takeaways",
    ],
    declared_columns: 295,
};

/// All known layouts, newest first.
static KNOWN_LAYOUTS: &[&LayoutVersion] = &[&LAYOUT_V1];

/// Normalize a raw header cell into canonical column form: trim, collapse
/// whitespace runs, and unify hyphen separators to the en-dash form used
/// by the layout declarations.
pub fn normalize_column(raw: &str) -> String {
    let mut collapsed = String::with_capacity(raw.len());
    let mut last_was_space = true;
    for ch in raw.trim().chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                collapsed.push(' ');
                last_was_space = true;
            }
        } else {
            collapsed.push(ch);
            last_was_space = false;
        }
    }
    while collapsed.ends_with(' ') {
        collapsed.pop();
    }
    collapsed.replace(" - ", " – ")
}

/// Match a normalized header against the known layouts.
///
/// Marker comparison is case-insensitive; the canonical casing of the
/// layout declaration wins for downstream lookups.
pub fn detect_layout(header: &[String]) -> Result<&'static LayoutVersion> {
    if header.is_empty() {
        return Err(TermForgeError::input("header row is empty"));
    }

    let lowered: Vec<String> = header.iter().map(|h| h.to_lowercase()).collect();
    let contains = |name: &str| lowered.iter().any(|h| h == &name.to_lowercase());

    for layout in KNOWN_LAYOUTS {
        if !contains(layout.key_column) {
            continue;
        }
        let missing: Vec<&str> = layout
            .required_markers
            .iter()
            .filter(|m| !contains(m))
            .copied()
            .collect();
        if missing.is_empty() {
            tracing::debug!(
                version = layout.version,
                columns = header.len(),
                "header matched layout"
            );
            return Ok(layout);
        }
    }

    Err(TermForgeError::schema_mismatch(format!(
        "header with {} columns matches no known layout version",
        header.len()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v1_header() -> Vec<String> {
        let mut header = vec!["Term".to_string()];
        header.extend(
            LAYOUT_V1
                .required_markers
                .iter()
                .map(|m| m.to_string()),
        );
        header
    }

    #[test]
    fn normalize_collapses_whitespace() {
        assert_eq!(
            normalize_column("  Introduction  –  Definition and Overview "),
            "Introduction – Definition and Overview"
        );
    }

    #[test]
    fn normalize_unifies_hyphen_separator() {
        assert_eq!(
            normalize_column("Introduction - Definition and Overview"),
            "Introduction – Definition and Overview"
        );
        // Hyphens inside words are untouched
        assert_eq!(normalize_column("Sub-category"), "Sub-category");
    }

    #[test]
    fn detects_v1_layout() {
        let layout = detect_layout(&v1_header()).expect("detect");
        assert_eq!(layout.version, 1);
        assert_eq!(layout.key_column, "Term");
    }

    #[test]
    fn detection_is_case_insensitive() {
        let header: Vec<String> = v1_header().iter().map(|h| h.to_uppercase()).collect();
        assert!(detect_layout(&header).is_ok());
    }

    #[test]
    fn unknown_header_is_schema_mismatch() {
        let header = vec!["id".to_string(), "name".to_string(), "value".to_string()];
        let err = detect_layout(&header).unwrap_err();
        assert!(matches!(err, TermForgeError::SchemaMismatch { .. }));
    }

    #[test]
    fn missing_marker_is_schema_mismatch() {
        let mut header = v1_header();
        header.retain(|h| h != "Conclusion – Summary and Key Takeaways");
        let err = detect_layout(&header).unwrap_err();
        assert!(matches!(err, TermForgeError::SchemaMismatch { .. }));
    }

    #[test]
    fn empty_header_is_input_error() {
        let err = detect_layout(&[]).unwrap_err();
        assert!(matches!(err, TermForgeError::Input { .. }));
    }
}
