//! Tabular stream reading and ingestion routing.
//!
//! This crate provides:
//! - [`router`] — size/shape inspection and strategy selection
//! - [`layout`] — versioned header layouts and normalization
//! - [`DelimitedReader`] / [`WorkbookReader`] — restartable row streams
//! - [`convert`] — workbook-to-delimited spooling for the large tier

pub mod convert;
pub mod delimited;
pub mod layout;
pub mod router;
pub mod sheet;

use termforge_shared::{RawRow, Result};

pub use convert::convert_workbook_to_delimited;
pub use delimited::DelimitedReader;
pub use layout::{LayoutVersion, detect_layout, normalize_column};
pub use router::{OpenedStream, hash_file, inspect, open_stream, select_strategy, spool_path_for};
pub use sheet::WorkbookReader;

/// A lazy, finite, restartable sequence of raw rows in strict source
/// order.
///
/// Implementations take the resume offset at open time and perform a true
/// skip: rows at or below it are never decoded into [`RawRow`]s.
pub trait RowStream {
    /// Yield the next row, or `None` at end of input.
    fn next_row(&mut self) -> Result<Option<RawRow>>;
}
