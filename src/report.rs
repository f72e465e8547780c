//! Artifacts handed between stages and the final run report.
//!
//! Each artifact is owned by the stage that produces it and handed off by
//! value to the next stage; no shared mutable state crosses a stage
//! boundary.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One raw row as the Extractor produced it.
///
/// Cell counts need not be uniform here — per-page header reprints and
/// merged cells are expected and resolved by the Normalizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    /// 1-indexed page the row was extracted from.
    pub page: usize,
    /// Cell texts in left-to-right order, untrimmed.
    pub cells: Vec<String>,
}

/// The cleaned, schema-uniform table.
///
/// Invariant: every row has exactly `columns.len()` cells, all text is
/// UTF-8 and already normalized, and no row is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    /// Column names in output order (the CSV header).
    pub columns: Vec<String>,
    /// Data rows; each row has exactly one cell per column.
    pub rows: Vec<Vec<String>>,
}

impl Dataset {
    /// Number of data rows (the header is not a row).
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Per-stage wall-clock durations in milliseconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageTimings {
    pub locate_ms: u64,
    pub download_ms: u64,
    pub extract_ms: u64,
    pub normalize_ms: u64,
    pub write_ms: u64,
    pub package_ms: u64,
    pub total_ms: u64,
}

/// Summary of a completed run, suitable for `--json` output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// The discovered download URL (absent when run from a local PDF).
    pub pdf_url: Option<String>,
    /// Where the PDF was read from.
    pub pdf_path: PathBuf,
    /// Bytes written by the Downloader (0 when run from a local PDF).
    pub bytes_downloaded: u64,
    /// Raw rows the Extractor produced across all pages.
    pub rows_extracted: usize,
    /// Per-page header reprints dropped by the Normalizer.
    pub header_rows_dropped: usize,
    /// Fully empty rows dropped by the Normalizer.
    pub empty_rows_dropped: usize,
    /// Rows rejected for a cell-count mismatch (logged at WARN).
    pub rows_rejected: usize,
    /// Data rows in the final CSV (excludes the header line).
    pub rows_written: usize,
    /// The CSV the Writer produced.
    pub csv_path: PathBuf,
    /// The zip archive the Packager produced.
    pub archive_path: PathBuf,
    /// Per-stage durations.
    pub timings: StageTimings,
}
