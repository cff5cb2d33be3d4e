//! Native spreadsheet-workbook reader.
//!
//! Backed by `calamine`, which materializes the worksheet range in memory.
//! That is exactly why the router only routes small and mid-size files
//! here; restart still avoids building [`RawRow`] cell maps for skipped
//! rows by advancing the row cursor directly.

use std::path::Path;

use calamine::{Data, Range, Reader, Xlsx, open_workbook};

use termforge_shared::{CellValue, RawRow, Result, TermForgeError};

use crate::RowStream;
use crate::layout::normalize_column;

/// Reader over the first worksheet of an xlsx workbook.
#[derive(Debug)]
pub struct WorkbookReader {
    range: Range<Data>,
    header: Vec<String>,
    /// Row index into the range; row 0 is the header, so the index doubles
    /// as the 1-based data-row offset.
    cursor: usize,
}

impl WorkbookReader {
    /// Open `path` and position the stream so the next row yielded has
    /// offset `start_offset + 1`.
    pub fn open(path: &Path, start_offset: u64) -> Result<Self> {
        let mut workbook: Xlsx<_> = open_workbook(path)
            .map_err(|e| TermForgeError::input(format!("{}: {e}", path.display())))?;

        let sheet_names = workbook.sheet_names();
        let sheet = sheet_names
            .first()
            .cloned()
            .ok_or_else(|| TermForgeError::input(format!("{}: workbook has no sheets", path.display())))?;

        let range = workbook
            .worksheet_range(&sheet)
            .map_err(|e| TermForgeError::input(format!("{}: sheet {sheet}: {e}", path.display())))?;

        if range.height() == 0 {
            return Err(TermForgeError::input(format!(
                "{}: sheet {sheet} has zero rows",
                path.display()
            )));
        }

        let header: Vec<String> = (0..range.width())
            .map(|col| match range.get((0, col)) {
                Some(cell) => normalize_column(&cell.to_string()),
                None => String::new(),
            })
            .collect();

        let cursor = (start_offset as usize).saturating_add(1);

        Ok(Self {
            range,
            header,
            cursor,
        })
    }

    /// The normalized header row.
    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// Number of data rows in the sheet (header excluded).
    pub fn data_row_count(&self) -> u64 {
        (self.range.height().saturating_sub(1)) as u64
    }
}

impl RowStream for WorkbookReader {
    fn next_row(&mut self) -> Result<Option<RawRow>> {
        if self.cursor >= self.range.height() {
            return Ok(None);
        }

        let row = self.cursor;
        let cells = self
            .header
            .iter()
            .enumerate()
            .filter(|(_, column)| !column.is_empty())
            .map(|(col, column)| {
                let value = self
                    .range
                    .get((row, col))
                    .map(cell_to_value)
                    .unwrap_or(CellValue::Empty);
                (column.clone(), value)
            })
            .collect();

        self.cursor += 1;
        Ok(Some(RawRow {
            offset: row as u64,
            cells,
        }))
    }
}

/// Convert a spreadsheet cell into the pipeline's cell value model.
///
/// Formula errors read as blank cells; dates keep their display form.
pub(crate) fn cell_to_value(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Empty,
        Data::String(s) => {
            if s.trim().is_empty() {
                CellValue::Empty
            } else {
                CellValue::Text(s.clone())
            }
        }
        Data::Float(f) => CellValue::Number(*f),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::Error(_) => CellValue::Empty,
        other => CellValue::Text(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_conversion_covers_scalar_kinds() {
        assert_eq!(cell_to_value(&Data::Empty), CellValue::Empty);
        assert_eq!(
            cell_to_value(&Data::String("hello".into())),
            CellValue::Text("hello".into())
        );
        assert_eq!(cell_to_value(&Data::String("  ".into())), CellValue::Empty);
        assert_eq!(cell_to_value(&Data::Float(1.5)), CellValue::Number(1.5));
        assert_eq!(cell_to_value(&Data::Int(7)), CellValue::Number(7.0));
        assert_eq!(cell_to_value(&Data::Bool(true)), CellValue::Bool(true));
    }

    #[test]
    fn missing_workbook_is_input_error() {
        let err = WorkbookReader::open(Path::new("/nonexistent/book.xlsx"), 0).unwrap_err();
        assert!(matches!(err, TermForgeError::Input { .. }));
    }
}
