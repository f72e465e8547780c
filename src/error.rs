//! Error types for the ans-rol-etl library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`AnsEtlError`] — **Fatal**: the run cannot proceed past the current
//!   stage (portal unreachable, no matching link, unreadable PDF, zero valid
//!   rows, disk failure). Returned as `Err(AnsEtlError)` from [`crate::run`]
//!   and logged at ERROR with the failing stage.
//!
//! * [`RowDefect`] — **Non-fatal**: a single extracted row was dropped or
//!   rejected (repeated header, empty row, wrong cell count). Counted in the
//!   [`crate::report::RunReport`] and logged, never propagated — isolated bad
//!   rows must not abort an otherwise valid extraction.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the ans-rol-etl library.
///
/// Row-level defects use [`RowDefect`] and are recorded in
/// [`crate::report::RunReport`] rather than propagated here.
#[derive(Debug, Error)]
pub enum AnsEtlError {
    // ── Locator errors ────────────────────────────────────────────────────
    /// The portal page could not be retrieved.
    #[error("Failed to fetch portal page '{url}': {reason}\nCheck the URL and your internet connection.")]
    Fetch { url: String, reason: String },

    /// The portal page was fetched but contains no matching anchor.
    #[error("No link matching '{pattern}' found on '{url}'\nThe portal layout may have changed; adjust --pattern.")]
    NotFound { url: String, pattern: String },

    // ── Downloader errors ─────────────────────────────────────────────────
    /// The PDF download failed (non-2xx, interrupted transfer, disk error,
    /// or the body is not a PDF).
    #[error("Failed to download '{url}': {reason}")]
    Download { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Extractor errors ──────────────────────────────────────────────────
    /// The PDF is unreadable or contains no tabular region.
    #[error("Table extraction failed for '{}': {detail}", path.display())]
    Extraction { path: PathBuf, detail: String },

    // ── Normalizer errors ─────────────────────────────────────────────────
    /// Cleanup left zero valid rows — the extraction as a whole is invalid.
    #[error(
        "No valid rows after cleanup: {extracted} extracted, {dropped} dropped/rejected.\n\
         The PDF layout probably does not match the configured schema."
    )]
    Schema { extracted: usize, dropped: usize },

    // ── Writer errors ─────────────────────────────────────────────────────
    /// Could not create or write the output CSV.
    #[error("Failed to write output file '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Packager errors ───────────────────────────────────────────────────
    /// Could not create the zip archive.
    #[error("Failed to create archive '{}': {detail}", path.display())]
    Packaging { path: PathBuf, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder or schema validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal defect in a single extracted row.
///
/// The Normalizer drops or rejects the row, records the defect, and the
/// pipeline continues as long as at least one valid row remains.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum RowDefect {
    /// The row repeats the table header (appears on every extracted page).
    #[error("page {page}, row {row}: repeated header row")]
    RepeatedHeader { page: usize, row: usize },

    /// Every cell in the row is empty after cleanup.
    #[error("page {page}, row {row}: empty row")]
    Empty { page: usize, row: usize },

    /// Cell count does not match the schema after cleanup.
    #[error("page {page}, row {row}: {got} cells, schema expects {expected}")]
    CellCountMismatch {
        page: usize,
        row: usize,
        got: usize,
        expected: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_error_display() {
        let e = AnsEtlError::Schema {
            extracted: 42,
            dropped: 42,
        };
        let msg = e.to_string();
        assert!(msg.contains("42 extracted"), "got: {msg}");
    }

    #[test]
    fn not_found_display() {
        let e = AnsEtlError::NotFound {
            url: "https://www.gov.br/ans".into(),
            pattern: "Anexo_I".into(),
        };
        assert!(e.to_string().contains("Anexo_I"));
        assert!(e.to_string().contains("gov.br"));
    }

    #[test]
    fn download_timeout_display() {
        let e = AnsEtlError::DownloadTimeout {
            url: "https://example.org/Anexo_I.pdf".into(),
            secs: 120,
        };
        assert!(e.to_string().contains("120s"));
    }

    #[test]
    fn cell_count_mismatch_display() {
        let d = RowDefect::CellCountMismatch {
            page: 3,
            row: 17,
            got: 6,
            expected: 13,
        };
        let msg = d.to_string();
        assert!(msg.contains("6 cells"));
        assert!(msg.contains("13"));
        assert!(msg.contains("page 3"));
    }
}
