//! Transform kinds applied when populating a section from source columns.

use termforge_shared::{CellValue, RawRow, SectionContent};

/// How one or more source columns become section content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    /// Copy the first source column's text as-is.
    Verbatim,
    /// Join the non-blank source columns with a separator.
    Concat { separator: &'static str },
    /// Split the first source column into a structured string list.
    SplitList { delimiter: char },
    /// Coerce the first source column into a structured scalar.
    Coerce(CoerceKind),
}

/// Target type of a coercion transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoerceKind {
    Number,
    Bool,
}

/// Apply a transform over the named source columns of a row.
///
/// Returns `None` when no source cell carries usable content, so the
/// section stays `Empty` — never a present-but-empty payload.
pub fn apply(transform: Transform, sources: &[&str], row: &RawRow) -> Option<SectionContent> {
    match transform {
        Transform::Verbatim => sources
            .first()
            .and_then(|column| row.get(column).as_text())
            .map(SectionContent::Text),

        Transform::Concat { separator } => {
            let parts: Vec<String> = sources
                .iter()
                .filter_map(|column| row.get(column).as_text())
                .collect();
            if parts.is_empty() {
                None
            } else {
                Some(SectionContent::Text(parts.join(separator)))
            }
        }

        Transform::SplitList { delimiter } => {
            let text = sources.first().and_then(|column| row.get(column).as_text())?;
            let items: Vec<serde_json::Value> = text
                .split(delimiter)
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(|item| serde_json::Value::String(item.to_string()))
                .collect();
            if items.is_empty() {
                None
            } else {
                Some(SectionContent::Structured(serde_json::Value::Array(items)))
            }
        }

        Transform::Coerce(kind) => {
            let cell = sources.first().map(|column| row.get(column))?;
            coerce_cell(cell, kind).map(SectionContent::Structured)
        }
    }
}

/// Coerce a single cell into a JSON scalar, or `None` when the value does
/// not parse.
fn coerce_cell(cell: &CellValue, kind: CoerceKind) -> Option<serde_json::Value> {
    match kind {
        CoerceKind::Number => match cell {
            CellValue::Number(n) => serde_json::Number::from_f64(*n).map(serde_json::Value::Number),
            CellValue::Text(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(serde_json::Value::Number),
            _ => None,
        },
        CoerceKind::Bool => match cell {
            CellValue::Bool(b) => Some(serde_json::Value::Bool(*b)),
            CellValue::Number(n) => match *n {
                n if n == 1.0 => Some(serde_json::Value::Bool(true)),
                n if n == 0.0 => Some(serde_json::Value::Bool(false)),
                _ => None,
            },
            CellValue::Text(s) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" | "1" => Some(serde_json::Value::Bool(true)),
                "false" | "no" | "0" => Some(serde_json::Value::Bool(false)),
                _ => None,
            },
            CellValue::Empty => None,
        },
    }
}
