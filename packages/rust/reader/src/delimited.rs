//! Flat delimited-text reader: streaming, restartable, strict source order.

use std::fs::File;
use std::path::Path;

use termforge_shared::{CellValue, RawRow, Result, TermForgeError};

use crate::RowStream;
use crate::layout::normalize_column;

/// Streaming CSV reader.
///
/// Restart is a true skip: rows below the start offset are discarded as
/// raw byte records without decoding them into [`RawRow`] cell maps.
#[derive(Debug)]
pub struct DelimitedReader {
    reader: csv::Reader<File>,
    header: Vec<String>,
    next_offset: u64,
}

impl DelimitedReader {
    /// Open `path` and position the stream so the next row yielded has
    /// offset `start_offset + 1` (offsets are 1-based over data rows).
    pub fn open(path: &Path, start_offset: u64) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)
            .map_err(|e| TermForgeError::input(format!("{}: {e}", path.display())))?;

        let header: Vec<String> = reader
            .headers()
            .map_err(|e| TermForgeError::input(format!("{}: header: {e}", path.display())))?
            .iter()
            .map(normalize_column)
            .collect();

        if header.is_empty() {
            return Err(TermForgeError::input(format!(
                "{}: empty header row",
                path.display()
            )));
        }

        // Skip committed rows without building cell maps.
        let mut scratch = csv::ByteRecord::new();
        let mut skipped = 0u64;
        while skipped < start_offset {
            let more = reader
                .read_byte_record(&mut scratch)
                .map_err(|e| TermForgeError::input(format!("{}: {e}", path.display())))?;
            if !more {
                break;
            }
            skipped += 1;
        }

        Ok(Self {
            reader,
            header,
            next_offset: start_offset + 1,
        })
    }

    /// The normalized header row.
    pub fn header(&self) -> &[String] {
        &self.header
    }
}

impl RowStream for DelimitedReader {
    fn next_row(&mut self) -> Result<Option<RawRow>> {
        let mut record = csv::StringRecord::new();
        let more = self
            .reader
            .read_record(&mut record)
            .map_err(|e| TermForgeError::input(format!("row read: {e}")))?;
        if !more {
            return Ok(None);
        }

        let cells = self
            .header
            .iter()
            .enumerate()
            .map(|(i, column)| {
                let value = match record.get(i) {
                    Some(raw) if !raw.trim().is_empty() => CellValue::Text(raw.to_string()),
                    _ => CellValue::Empty,
                };
                (column.clone(), value)
            })
            .collect();

        let offset = self.next_offset;
        self.next_offset += 1;
        Ok(Some(RawRow { offset, cells }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp_csv(content: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("tf_csv_{}.csv", uuid::Uuid::now_v7()));
        std::fs::write(&path, content).expect("write temp csv");
        path
    }

    #[test]
    fn reads_rows_in_source_order() {
        let path = write_temp_csv("Term,Definition\nalpha,first\nbeta,second\ngamma,third\n");
        let mut reader = DelimitedReader::open(&path, 0).expect("open");

        let row = reader.next_row().expect("read").expect("row");
        assert_eq!(row.offset, 1);
        assert_eq!(row.get("Term").as_text().as_deref(), Some("alpha"));

        let row = reader.next_row().unwrap().unwrap();
        assert_eq!(row.offset, 2);
        assert_eq!(row.get("Term").as_text().as_deref(), Some("beta"));

        let row = reader.next_row().unwrap().unwrap();
        assert_eq!(row.offset, 3);
        assert!(reader.next_row().unwrap().is_none());

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn restart_skips_committed_rows() {
        let path = write_temp_csv("Term,Definition\nalpha,a\nbeta,b\ngamma,c\ndelta,d\n");
        let mut reader = DelimitedReader::open(&path, 2).expect("open at offset");

        let row = reader.next_row().unwrap().unwrap();
        assert_eq!(row.offset, 3);
        assert_eq!(row.get("Term").as_text().as_deref(), Some("gamma"));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn blank_cells_are_empty_not_empty_string() {
        let path = write_temp_csv("Term,Definition,Notes\nalpha,,  \n");
        let mut reader = DelimitedReader::open(&path, 0).expect("open");
        let row = reader.next_row().unwrap().unwrap();

        assert_eq!(row.get("Definition"), &CellValue::Empty);
        assert_eq!(row.get("Notes"), &CellValue::Empty);
        // Unknown columns read as empty too
        assert_eq!(row.get("Nonexistent"), &CellValue::Empty);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn short_rows_fill_with_empty() {
        let path = write_temp_csv("Term,Definition,Notes\nalpha,only-def\n");
        let mut reader = DelimitedReader::open(&path, 0).expect("open");
        let row = reader.next_row().unwrap().unwrap();
        assert_eq!(row.get("Definition").as_text().as_deref(), Some("only-def"));
        assert_eq!(row.get("Notes"), &CellValue::Empty);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn restart_past_end_yields_no_rows() {
        let path = write_temp_csv("Term\nalpha\n");
        let mut reader = DelimitedReader::open(&path, 10).expect("open");
        assert!(reader.next_row().unwrap().is_none());

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn missing_file_is_input_error() {
        let err = DelimitedReader::open(Path::new("/nonexistent/file.csv"), 0).unwrap_err();
        assert!(matches!(err, TermForgeError::Input { .. }));
    }
}
