//! File ingestion: raw grid -> header discovery -> canonical records
//!
//! Readers return a plain grid of text cells with no header assumed.
//! Everything about the schema is discovered afterwards.

use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use calamine::{open_workbook_auto, Data, Reader};
use encoding_rs::WINDOWS_1252;
use tracing::debug;

use crate::services::column_classifier::classify_columns;
use crate::services::header_locator::locate_header;
use crate::services::record_unifier::consolidate_file;
use crate::types::{CanonicalRecord, RawRow, RecordOrigin};

/// Label prefix for header cells that are empty or missing
pub const PLACEHOLDER_COLUMN: &str = "Col_Vacia";

/// Source of raw cell grids
pub trait SheetReader: Send + Sync {
    fn read_grid(&self, path: &Path) -> Result<Vec<Vec<String>>>;
}

/// Reads CSV files and Excel/ODS workbooks from disk
#[derive(Debug, Clone, Copy, Default)]
pub struct FsSheetReader;

impl SheetReader for FsSheetReader {
    fn read_grid(&self, path: &Path) -> Result<Vec<Vec<String>>> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "csv" => read_csv(path),
            "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => read_workbook(path),
            other => bail!("unsupported file format '{}'", other),
        }
    }
}

/// Lines inspected when choosing between `,` and `;`
const SNIFF_LINES: usize = 10;

fn sniff_delimiter(content: &str) -> u8 {
    let (semicolons, commas) = content
        .lines()
        .take(SNIFF_LINES)
        .fold((0, 0), |(semi, comma), line| {
            (semi + line.matches(';').count(), comma + line.matches(',').count())
        });
    if semicolons > commas {
        b';'
    } else {
        b','
    }
}

/// UTF-8 when valid, otherwise Windows-1252 (the usual encoding of Excel CSV exports)
fn decode_text(bytes: Vec<u8>) -> String {
    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => WINDOWS_1252.decode(e.as_bytes()).0.into_owned(),
    };
    match text.strip_prefix('\u{feff}') {
        Some(rest) => rest.to_string(),
        None => text,
    }
}

fn read_csv(path: &Path) -> Result<Vec<Vec<String>>> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let content = decode_text(bytes);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(sniff_delimiter(&content))
        .from_reader(content.as_bytes());

    let mut grid = Vec::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("malformed CSV in {}", path.display()))?;
        grid.push(record.iter().map(str::to_string).collect());
    }
    Ok(grid)
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        other => other.to_string(),
    }
}

fn read_workbook(path: &Path) -> Result<Vec<Vec<String>>> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("failed to open workbook {}", path.display()))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| anyhow!("workbook {} has no sheets", path.display()))?
        .with_context(|| format!("failed to read first sheet of {}", path.display()))?;

    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_text).collect())
        .collect())
}

/// Outcome of ingesting one file
#[derive(Debug, Clone, Default)]
pub struct IngestedFile {
    pub path: String,
    /// Non-blank data rows below the header
    pub rows_read: usize,
    /// Per-file consolidated records, ready for the in-memory table
    pub records: Vec<CanonicalRecord>,
}

fn header_labels(row: &[String], width: usize) -> Vec<String> {
    (0..width)
        .map(|i| match row.get(i).map(|c| c.trim()) {
            Some(label) if !label.is_empty() => label.to_string(),
            _ => format!("{}_{}", PLACEHOLDER_COLUMN, i + 1),
        })
        .collect()
}

/// Turn a raw grid into canonical records (one per non-blank data row)
pub fn grid_to_records(grid: &[Vec<String>], file: &str, scan_rows: usize) -> Vec<CanonicalRecord> {
    let width = grid.iter().map(Vec::len).max().unwrap_or(0);

    let (labels, data_start) = match locate_header(grid, scan_rows) {
        Some(idx) => (header_labels(&grid[idx], width), idx + 1),
        None => (header_labels(&[], width), 0),
    };
    let layout = classify_columns(&labels);
    debug!("{}: header row {:?}, columns {:?}", file, data_start.checked_sub(1), layout.labels);

    grid.iter()
        .enumerate()
        .skip(data_start)
        .map(|(row_idx, cells)| RawRow {
            cells: layout.project(cells),
            origin: RecordOrigin {
                file: file.to_string(),
                row: row_idx,
            },
        })
        .filter(|row| !row.is_blank())
        .map(|row| CanonicalRecord::from_raw(&row))
        .collect()
}

/// Read, classify and consolidate one file
pub fn ingest_file(
    reader: &dyn SheetReader,
    path: &Path,
    scan_rows: usize,
) -> Result<IngestedFile> {
    let file = path.display().to_string();
    let grid = reader.read_grid(path)?;
    let records = grid_to_records(&grid, &file, scan_rows);
    let rows_read = records.len();
    let records = consolidate_file(records)
        .with_context(|| format!("failed to consolidate rows of {}", file))?;

    debug!("{}: {} rows -> {} records", file, rows_read, records.len());

    Ok(IngestedFile {
        path: file,
        rows_read,
        records,
    })
}
