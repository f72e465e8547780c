//! Normalizer: turn ragged raw rows into a schema-uniform [`Dataset`].
//!
//! This is the only stage with real domain logic. Applied per row:
//!
//! 1. clean every cell (diacritics, stray characters, whitespace runs);
//! 2. trim trailing empty cells (gutter artifacts from the extractor);
//! 3. drop fully empty rows and per-page header reprints — logged at
//!    WARN and counted;
//! 4. reject rows whose cell count does not match the schema — logged at
//!    WARN and counted, never fatal;
//! 5. coerce flag columns to their canonical labels. Procedure codes stay
//!    text so leading zeros survive.
//!
//! Re-running the Normalizer on its own output is a no-op: cleaning is
//! idempotent, flag labels are stored already-cleaned, and valid data rows
//! never match the header signature.
//!
//! The stage fails only when zero valid rows remain — isolated bad rows are
//! tolerated; an empty result means the extraction itself is invalid.

use crate::config::{ColumnKind, PipelineConfig};
use crate::error::{AnsEtlError, RowDefect};
use crate::report::{Dataset, RawRow};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, warn};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Everything the Normalizer produced, valid rows and defect counts alike.
#[derive(Debug)]
pub struct NormalizeOutcome {
    pub dataset: Dataset,
    pub header_rows: usize,
    pub empty_rows: usize,
    pub rejected_rows: usize,
    pub defects: Vec<RowDefect>,
}

// Mirrors the upstream deliverable contract: strip everything outside word
// characters, whitespace, and `,.;-` once diacritics are decomposed away.
static RE_DISALLOWED: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s,.;-]").unwrap());
static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Clean one cell: NFKD-decompose and drop combining marks (ó → o),
/// remove disallowed characters, collapse whitespace runs, trim.
pub fn clean_cell(raw: &str) -> String {
    let decomposed: String = raw.nfkd().filter(|c| !is_combining_mark(*c)).collect();
    let stripped = RE_DISALLOWED.replace_all(&decomposed, "");
    RE_WHITESPACE.replace_all(&stripped, " ").trim().to_string()
}

/// Normalize the extracted rows against the configured schema.
pub fn normalize(
    raw_rows: Vec<RawRow>,
    config: &PipelineConfig,
) -> Result<NormalizeOutcome, AnsEtlError> {
    let schema = &config.schema;
    let expected = schema.width();
    let total = raw_rows.len();

    let mut rows: Vec<Vec<String>> = Vec::with_capacity(total);
    let mut defects: Vec<RowDefect> = Vec::new();
    let mut header_rows = 0usize;
    let mut empty_rows = 0usize;
    let mut rejected_rows = 0usize;
    let mut row_in_page = 0usize;
    let mut current_page = 0usize;

    for raw in raw_rows {
        if raw.page != current_page {
            current_page = raw.page;
            row_in_page = 0;
        }
        row_in_page += 1;

        let mut cells: Vec<String> = raw.cells.iter().map(|c| clean_cell(c)).collect();
        while cells.last().is_some_and(|c| c.is_empty()) {
            cells.pop();
        }

        if cells.is_empty() {
            empty_rows += 1;
            let defect = RowDefect::Empty {
                page: raw.page,
                row: row_in_page,
            };
            warn!("Row dropped: {}", defect);
            notify(config, &defect);
            defects.push(defect);
            continue;
        }

        if schema.is_header_row(&cells) {
            header_rows += 1;
            let defect = RowDefect::RepeatedHeader {
                page: raw.page,
                row: row_in_page,
            };
            warn!("Row dropped: {}", defect);
            notify(config, &defect);
            defects.push(defect);
            continue;
        }

        if cells.len() != expected {
            rejected_rows += 1;
            let defect = RowDefect::CellCountMismatch {
                page: raw.page,
                row: row_in_page,
                got: cells.len(),
                expected,
            };
            warn!("Row rejected: {}", defect);
            notify(config, &defect);
            defects.push(defect);
            continue;
        }

        for (cell, col) in cells.iter_mut().zip(&schema.columns) {
            if let ColumnKind::Flag { label } = &col.kind {
                *cell = coerce_flag(cell, &col.name, label.as_deref());
            }
        }

        rows.push(cells);
    }

    if rows.is_empty() {
        return Err(AnsEtlError::Schema {
            extracted: total,
            dropped: header_rows + empty_rows + rejected_rows,
        });
    }

    info!(
        "Normalized {} rows ({} headers, {} empty, {} rejected)",
        rows.len(),
        header_rows,
        empty_rows,
        rejected_rows
    );

    Ok(NormalizeOutcome {
        dataset: Dataset {
            columns: schema.column_names(),
            rows,
        },
        header_rows,
        empty_rows,
        rejected_rows,
        defects,
    })
}

/// Map a flag cell onto its canonical value.
///
/// The published table marks coverage by reprinting the column abbreviation
/// in the cell ("OD" under the OD column). A cell equal to the column name
/// becomes the configured label; an already-coerced label passes through;
/// anything else is kept as cleaned.
fn coerce_flag(cell: &str, column_name: &str, label: Option<&str>) -> String {
    if cell.eq_ignore_ascii_case(column_name) {
        label.unwrap_or(column_name).to_string()
    } else {
        cell.to_string()
    }
}

fn notify(config: &PipelineConfig, defect: &RowDefect) {
    if let Some(ref obs) = config.observer {
        obs.on_row_defect(defect);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TableSchema;
    use crate::report::RawRow;

    fn test_config() -> PipelineConfig {
        PipelineConfig::default()
    }

    fn row(page: usize, cells: &[&str]) -> RawRow {
        RawRow {
            page,
            cells: cells.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// A full-width data row for the 13-column default schema.
    fn data_row(page: usize, name: &str) -> RawRow {
        row(
            page,
            &[
                name, "428", "01.04.2021", "OD", "AMB", "", "", "", "", "64", "CONSULTAS",
                "PROCEDIMENTOS GERAIS", "ODONTOLOGIA",
            ],
        )
    }

    fn header_row(page: usize) -> RawRow {
        RawRow {
            page,
            cells: TableSchema::anexo_i().column_names(),
        }
    }

    #[test]
    fn clean_cell_strips_diacritics() {
        assert_eq!(clean_cell("Consulta Médica"), "Consulta Medica");
        assert_eq!(clean_cell("AVALIAÇÃO"), "AVALIACAO");
        assert_eq!(clean_cell("Seg. Odontológica"), "Seg. Odontologica");
    }

    #[test]
    fn clean_cell_collapses_whitespace() {
        assert_eq!(clean_cell("  a   b\n\nc\t d  "), "a b c d");
    }

    #[test]
    fn clean_cell_removes_disallowed_characters() {
        assert_eq!(clean_cell("ate* (com) [diretriz]"), "ate com diretriz");
        assert_eq!(clean_cell("cod. 10.101.012-0;"), "cod. 10.101.012-0;");
    }

    #[test]
    fn clean_cell_is_idempotent() {
        for raw in ["Consulta Médica", "  a   b ", "até* 3x", "10,5; ok."] {
            let once = clean_cell(raw);
            assert_eq!(clean_cell(&once), once, "not idempotent for {raw:?}");
        }
    }

    #[test]
    fn header_and_empty_rows_are_dropped() {
        let rows = vec![
            header_row(1),
            data_row(1, "CONSULTA A"),
            row(1, &["", "  ", ""]),
            header_row(2),
            data_row(2, "CONSULTA B"),
        ];
        let outcome = normalize(rows, &test_config()).unwrap();
        assert_eq!(outcome.dataset.len(), 2);
        assert_eq!(outcome.header_rows, 2);
        assert_eq!(outcome.empty_rows, 1);
        assert_eq!(outcome.rejected_rows, 0);
    }

    #[test]
    fn short_row_is_rejected_not_fatal() {
        let rows = vec![
            data_row(1, "CONSULTA A"),
            row(1, &["TRUNCADA", "428", "01.04.2021"]),
            data_row(1, "CONSULTA B"),
        ];
        let outcome = normalize(rows, &test_config()).unwrap();
        assert_eq!(outcome.dataset.len(), 2);
        assert_eq!(outcome.rejected_rows, 1);
        assert!(outcome
            .defects
            .iter()
            .any(|d| matches!(d, RowDefect::CellCountMismatch { got: 3, .. })));
    }

    #[test]
    fn flag_cells_expand_to_labels() {
        let rows = vec![data_row(1, "CONSULTA")];
        let outcome = normalize(rows, &test_config()).unwrap();
        let r = &outcome.dataset.rows[0];
        assert_eq!(r[3], "Seg. Odontologica");
        assert_eq!(r[4], "Seg. Ambulatorial");
        // Unlabelled flags keep the column name; empty flags stay empty.
        assert_eq!(r[5], "");
    }

    #[test]
    fn unlabelled_flag_keeps_column_name() {
        let mut raw = data_row(1, "CONSULTA");
        raw.cells[5] = "HCO".into();
        let outcome = normalize(vec![raw], &test_config()).unwrap();
        assert_eq!(outcome.dataset.rows[0][5], "HCO");
    }

    #[test]
    fn normalize_is_idempotent_on_its_own_output() {
        let rows = vec![
            header_row(1),
            data_row(1, "Consulta Médica"),
            data_row(1, "AVALIAÇÃO TÉCNICA"),
        ];
        let config = test_config();
        let first = normalize(rows, &config).unwrap();

        let again: Vec<RawRow> = first
            .dataset
            .rows
            .iter()
            .map(|cells| RawRow {
                page: 1,
                cells: cells.clone(),
            })
            .collect();
        let second = normalize(again, &config).unwrap();

        assert_eq!(first.dataset, second.dataset);
        assert_eq!(second.header_rows, 0);
        assert_eq!(second.empty_rows, 0);
        assert_eq!(second.rejected_rows, 0);
    }

    #[test]
    fn all_header_rows_is_a_schema_error() {
        let rows = vec![header_row(1), header_row(2), header_row(3)];
        let err = normalize(rows, &test_config()).unwrap_err();
        match err {
            AnsEtlError::Schema { extracted, dropped } => {
                assert_eq!(extracted, 3);
                assert_eq!(dropped, 3);
            }
            other => panic!("expected Schema error, got {other:?}"),
        }
    }

    #[test]
    fn no_rows_is_a_schema_error() {
        let err = normalize(Vec::new(), &test_config()).unwrap_err();
        assert!(matches!(err, AnsEtlError::Schema { extracted: 0, .. }));
    }

    #[test]
    fn dropped_rows_are_logged_at_warn() {
        use std::io;
        use std::sync::{Arc, Mutex};

        #[derive(Clone)]
        struct SharedBuf(Arc<Mutex<Vec<u8>>>);

        impl io::Write for SharedBuf {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SharedBuf {
            type Writer = SharedBuf;
            fn make_writer(&'a self) -> Self::Writer {
                self.clone()
            }
        }

        let buf = SharedBuf(Arc::new(Mutex::new(Vec::new())));
        let subscriber = tracing_subscriber::fmt()
            .with_writer(buf.clone())
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let rows = vec![header_row(2), row(2, &["", ""]), data_row(2, "CONSULTA")];
            normalize(rows, &test_config()).unwrap();
        });

        let out = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        assert!(out.contains("repeated header"), "got: {out}");
        assert!(out.contains("empty row"), "got: {out}");
    }

    #[test]
    fn row_counts_reconcile() {
        // Scenario: 10 valid + 2 header reprints + 1 short row.
        let mut rows: Vec<RawRow> = (0..5).map(|i| data_row(1, &format!("P{i}"))).collect();
        rows.insert(0, header_row(1));
        rows.push(header_row(2));
        rows.extend((5..10).map(|i| data_row(2, &format!("P{i}"))));
        rows.push(row(2, &["so", "tres", "celulas"]));

        let total = rows.len();
        let outcome = normalize(rows, &test_config()).unwrap();
        assert_eq!(
            outcome.dataset.len(),
            total - outcome.header_rows - outcome.empty_rows - outcome.rejected_rows
        );
        assert_eq!(outcome.dataset.len(), 10);
    }
}
