//! Workbook-to-delimited conversion for the convert-then-stream path.
//!
//! Rows are written straight to the spool file as they are visited; no
//! per-row cell maps or record structs are built, which is what makes
//! this path viable for sources the native in-memory reader cannot be
//! trusted with.

use std::path::Path;

use calamine::{Data, Reader, Xlsx, open_workbook};

use termforge_shared::{Result, TermForgeError};

/// Convert the first worksheet of `input` into a CSV file at `output`.
///
/// The header row is carried over verbatim; blank cells become empty
/// fields. Returns the number of data rows written (header excluded).
pub fn convert_workbook_to_delimited(input: &Path, output: &Path) -> Result<u64> {
    let mut workbook: Xlsx<_> = open_workbook(input)
        .map_err(|e| TermForgeError::input(format!("{}: {e}", input.display())))?;

    let sheet_names = workbook.sheet_names();
    let sheet = sheet_names
        .first()
        .cloned()
        .ok_or_else(|| TermForgeError::input(format!("{}: workbook has no sheets", input.display())))?;

    let range = workbook
        .worksheet_range(&sheet)
        .map_err(|e| TermForgeError::input(format!("{}: sheet {sheet}: {e}", input.display())))?;

    if range.height() == 0 {
        return Err(TermForgeError::input(format!(
            "{}: sheet {sheet} has zero rows",
            input.display()
        )));
    }

    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent).map_err(|e| TermForgeError::io(parent, e))?;
    }

    let mut writer = csv::Writer::from_path(output)
        .map_err(|e| TermForgeError::io(output, std::io::Error::other(e)))?;

    let mut data_rows = 0u64;
    for (i, row) in range.rows().enumerate() {
        let fields: Vec<String> = row.iter().map(cell_to_field).collect();
        writer
            .write_record(&fields)
            .map_err(|e| TermForgeError::io(output, std::io::Error::other(e)))?;
        if i > 0 {
            data_rows += 1;
        }
    }

    writer
        .flush()
        .map_err(|e| TermForgeError::io(output, e))?;

    tracing::info!(
        input = %input.display(),
        output = %output.display(),
        rows = data_rows,
        "converted workbook to delimited spool"
    );

    Ok(data_rows)
}

/// Render a spreadsheet cell as a CSV field.
fn cell_to_field(data: &Data) -> String {
    match data {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_input_is_input_error() {
        let out = std::env::temp_dir().join(format!("tf_spool_{}.csv", uuid::Uuid::now_v7()));
        let err =
            convert_workbook_to_delimited(Path::new("/nonexistent/book.xlsx"), &out).unwrap_err();
        assert!(matches!(err, TermForgeError::Input { .. }));
    }

    #[test]
    fn cell_field_rendering() {
        assert_eq!(cell_to_field(&Data::Empty), "");
        assert_eq!(cell_to_field(&Data::String("x".into())), "x");
        assert_eq!(cell_to_field(&Data::Int(3)), "3");
        assert_eq!(cell_to_field(&Data::Bool(true)), "true");
    }
}
