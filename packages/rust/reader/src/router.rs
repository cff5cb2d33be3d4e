//! Ingestion router: size/shape inspection and strategy selection.
//!
//! The strategy is decided up front from file size and format. The
//! native-parser fallback is not exception-driven control flow: it is a
//! documented contingency branch taken only when the mid-tier native open
//! fails, and the large tier never touches the native parser's row path.

use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use termforge_shared::{
    IngestConfig, IngestStrategy, Result, SourceFile, SourceFormat, TermForgeError,
};

use crate::RowStream;
use crate::convert::convert_workbook_to_delimited;
use crate::delimited::DelimitedReader;
use crate::layout::{LayoutVersion, detect_layout};
use crate::sheet::WorkbookReader;

/// An opened, validated row stream, ready to yield from the requested
/// offset.
pub struct OpenedStream {
    pub stream: Box<dyn RowStream>,
    pub header: Vec<String>,
    pub layout: &'static LayoutVersion,
    /// Row count estimate, when the opened path makes one available.
    pub estimated_rows: Option<u64>,
}

impl std::fmt::Debug for OpenedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenedStream")
            .field("stream", &"Box<dyn RowStream>")
            .field("header", &self.header)
            .field("layout", &self.layout)
            .field("estimated_rows", &self.estimated_rows)
            .finish()
    }
}

/// Inspect a source file: hash its bytes, sniff the format, and select
/// the processing strategy.
///
/// Fails with `InputError` for unreadable or empty files; performs no
/// writes of any kind.
pub fn inspect(path: &Path, config: &IngestConfig) -> Result<SourceFile> {
    let meta = std::fs::metadata(path)
        .map_err(|e| TermForgeError::input(format!("{}: {e}", path.display())))?;
    let byte_size = meta.len();
    if byte_size == 0 {
        return Err(TermForgeError::input(format!(
            "{}: file is empty",
            path.display()
        )));
    }

    let content_hash = hash_file(path)?;
    let format = sniff_format(path)?;
    let strategy = select_strategy(byte_size, config);
    let estimated_rows = match format {
        SourceFormat::Delimited => estimate_delimited_rows(path, byte_size).ok(),
        SourceFormat::Workbook => None,
    };

    tracing::info!(
        path = %path.display(),
        hash = %content_hash,
        bytes = byte_size,
        format = format.as_str(),
        strategy = strategy.as_str(),
        estimated_rows,
        "source inspected"
    );

    Ok(SourceFile {
        content_hash,
        byte_size,
        format,
        strategy,
        estimated_rows,
    })
}

/// Pure strategy policy: direct below `direct_max`, native streaming with
/// a convert contingency below `convert_max`, convert-then-stream above.
pub fn select_strategy(byte_size: u64, config: &IngestConfig) -> IngestStrategy {
    if byte_size < config.direct_max_bytes {
        IngestStrategy::Direct
    } else if byte_size < config.convert_max_bytes {
        IngestStrategy::StreamNative
    } else {
        IngestStrategy::ConvertThenStream
    }
}

/// Open the row stream for an inspected source, validating the header
/// layout before any row can be yielded.
pub fn open_stream(
    path: &Path,
    source: &SourceFile,
    start_offset: u64,
    spool_dir: &Path,
) -> Result<OpenedStream> {
    match source.format {
        // Delimited input is inherently streaming; strategy only affects
        // the tag reported upstream.
        SourceFormat::Delimited => open_delimited(path, start_offset, source.estimated_rows),
        SourceFormat::Workbook => match source.strategy {
            IngestStrategy::Direct => open_workbook_native(path, start_offset),
            IngestStrategy::StreamNative => match open_workbook_native(path, start_offset) {
                Ok(opened) => Ok(opened),
                // Contingency branch: the mid-tier native parse failed at
                // open; convert and stream the flat form instead.
                Err(TermForgeError::Input { message }) => {
                    tracing::warn!(
                        error = %message,
                        "native workbook parse failed, converting to delimited"
                    );
                    open_converted(path, source, start_offset, spool_dir)
                }
                Err(e) => Err(e),
            },
            IngestStrategy::ConvertThenStream => {
                open_converted(path, source, start_offset, spool_dir)
            }
        },
    }
}

fn open_delimited(
    path: &Path,
    start_offset: u64,
    estimated_rows: Option<u64>,
) -> Result<OpenedStream> {
    let reader = DelimitedReader::open(path, start_offset)?;
    let header = reader.header().to_vec();
    let layout = detect_layout(&header)?;
    Ok(OpenedStream {
        stream: Box::new(reader),
        header,
        layout,
        estimated_rows,
    })
}

fn open_workbook_native(path: &Path, start_offset: u64) -> Result<OpenedStream> {
    let reader = WorkbookReader::open(path, start_offset)?;
    let header = reader.header().to_vec();
    let layout = detect_layout(&header)?;
    let estimated_rows = Some(reader.data_row_count());
    Ok(OpenedStream {
        stream: Box::new(reader),
        header,
        layout,
        estimated_rows,
    })
}

fn open_converted(
    path: &Path,
    source: &SourceFile,
    start_offset: u64,
    spool_dir: &Path,
) -> Result<OpenedStream> {
    let spool_path = spool_path_for(source, spool_dir);
    let estimated = if spool_path.exists() {
        tracing::info!(spool = %spool_path.display(), "reusing existing spool file");
        None
    } else {
        Some(convert_workbook_to_delimited(path, &spool_path)?)
    };
    let mut opened = open_delimited(&spool_path, start_offset, estimated)?;
    if opened.estimated_rows.is_none() {
        opened.estimated_rows = source.estimated_rows;
    }
    Ok(opened)
}

/// Spool files are keyed by source content hash, so a resumed run reuses
/// the conversion from the interrupted one.
pub fn spool_path_for(source: &SourceFile, spool_dir: &Path) -> PathBuf {
    spool_dir.join(format!("{}.csv", source.content_hash))
}

/// SHA-256 over the file bytes, streamed in 64 KiB chunks.
pub fn hash_file(path: &Path) -> Result<String> {
    let file = std::fs::File::open(path).map_err(|e| TermForgeError::io(path, e))?;
    let mut reader = BufReader::with_capacity(64 * 1024, file);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader
            .read(&mut buf)
            .map_err(|e| TermForgeError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Sniff the physical format from the extension, falling back to the ZIP
/// magic shared by OOXML containers.
fn sniff_format(path: &Path) -> Result<SourceFormat> {
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        match ext.to_lowercase().as_str() {
            "xlsx" | "xlsm" | "xls" => return Ok(SourceFormat::Workbook),
            "csv" | "tsv" | "txt" => return Ok(SourceFormat::Delimited),
            _ => {}
        }
    }

    let mut file = std::fs::File::open(path).map_err(|e| TermForgeError::io(path, e))?;
    let mut magic = [0u8; 4];
    let n = file.read(&mut magic).map_err(|e| TermForgeError::io(path, e))?;
    if n >= 4 && magic == [0x50, 0x4B, 0x03, 0x04] {
        Ok(SourceFormat::Workbook)
    } else {
        Ok(SourceFormat::Delimited)
    }
}

/// Estimate data-row count from the average byte length of a sample of
/// leading rows.
fn estimate_delimited_rows(path: &Path, byte_size: u64) -> Result<u64> {
    let file = std::fs::File::open(path).map_err(|e| TermForgeError::io(path, e))?;
    let reader = BufReader::new(file);

    let mut header_bytes = 0u64;
    let mut sample_bytes = 0u64;
    let mut sampled = 0u64;
    for (i, line) in reader.lines().take(51).enumerate() {
        let line = line.map_err(|e| TermForgeError::io(path, e))?;
        let len = line.len() as u64 + 1;
        if i == 0 {
            header_bytes = len;
        } else {
            sample_bytes += len;
            sampled += 1;
        }
    }

    if sampled == 0 {
        return Ok(0);
    }
    let avg = (sample_bytes / sampled).max(1);
    Ok(byte_size.saturating_sub(header_bytes) / avg)
}
