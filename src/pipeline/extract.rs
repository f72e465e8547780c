//! Extractor: pull the tabular text layer out of the PDF via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async
//! contexts. `tokio::task::spawn_blocking` moves the work onto the blocking
//! thread pool so Tokio workers do not stall during extraction.
//!
//! ## How rows and cells are reconstructed
//!
//! The Anexo I table is a lattice layout: every cell's text sits on a
//! shared baseline per row, and column gutters are wider than any word gap
//! inside a cell. The extractor reads pdfium text segments (runs of text
//! with a bounding rectangle), clusters them into rows by vertical
//! proximity, sorts each row left-to-right, and starts a new cell wherever
//! the horizontal gap between segments exceeds the configured threshold.
//! PDF coordinates have a bottom-left origin, so rows are ordered by
//! descending y to preserve reading order.
//!
//! Cell counts are *not* uniform at this stage — header reprints, page
//! furniture and merged cells all come out as-is. Uniformity is the
//! Normalizer's job.

use crate::config::PipelineConfig;
use crate::error::AnsEtlError;
use crate::report::RawRow;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info};

/// A positioned run of text, the unit of row/cell clustering.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Fragment {
    pub text: String,
    pub left: f32,
    pub right: f32,
    pub mid_y: f32,
}

/// Extract all table rows from the PDF, in page order then top-to-bottom.
pub async fn extract_tables(
    pdf_path: &Path,
    config: &PipelineConfig,
) -> Result<Vec<RawRow>, AnsEtlError> {
    let path = pdf_path.to_path_buf();
    let row_tol = config.row_tolerance_pts;
    let col_gap = config.min_column_gap_pts;

    tokio::task::spawn_blocking(move || extract_tables_blocking(&path, row_tol, col_gap))
        .await
        .map_err(|e| AnsEtlError::Internal(format!("Extraction task panicked: {e}")))?
}

/// Blocking implementation of table extraction.
fn extract_tables_blocking(
    pdf_path: &Path,
    row_tol: f32,
    col_gap: f32,
) -> Result<Vec<RawRow>, AnsEtlError> {
    let pdfium = Pdfium::default();

    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| {
            let detail = format!("{e:?}");
            AnsEtlError::Extraction {
                path: pdf_path.to_path_buf(),
                detail: if detail.to_lowercase().contains("password") {
                    "document is password-protected".to_string()
                } else {
                    format!("cannot open document: {detail}")
                },
            }
        })?;

    let pages = document.pages();
    info!("PDF loaded: {} pages", pages.len());

    let mut rows: Vec<RawRow> = Vec::new();

    for (page_idx, page) in pages.iter().enumerate() {
        let page_num = page_idx + 1;
        let text = page.text().map_err(|e| AnsEtlError::Extraction {
            path: pdf_path.to_path_buf(),
            detail: format!("no text layer on page {page_num}: {e:?}"),
        })?;

        let mut fragments: Vec<Fragment> = Vec::new();
        for segment in text.segments().iter() {
            let content = segment.text();
            if content.trim().is_empty() {
                continue;
            }
            let bounds = segment.bounds();
            fragments.push(Fragment {
                text: content,
                left: bounds.left().value,
                right: bounds.right().value,
                mid_y: (bounds.top().value + bounds.bottom().value) / 2.0,
            });
        }

        let page_rows = cluster_rows(fragments, row_tol, col_gap);
        debug!("Page {}: {} rows", page_num, page_rows.len());
        rows.extend(page_rows.into_iter().map(|cells| RawRow {
            page: page_num,
            cells,
        }));
    }

    // A page header or footer yields 1-cell rows; a real table yields rows
    // with multiple cells. No multi-cell row anywhere means there is no
    // tabular region (scanned image, wrong document).
    if !rows.iter().any(|r| r.cells.len() >= 2) {
        return Err(AnsEtlError::Extraction {
            path: pdf_path.to_path_buf(),
            detail: format!(
                "no tabular region found ({} text rows, none with 2+ cells)",
                rows.len()
            ),
        });
    }

    info!("Extracted {} raw rows", rows.len());
    Ok(rows)
}

/// Cluster fragments into rows (by vertical proximity, top to bottom),
/// then split each row into cells (by horizontal gaps, left to right).
pub(crate) fn cluster_rows(
    mut fragments: Vec<Fragment>,
    row_tol: f32,
    col_gap: f32,
) -> Vec<Vec<String>> {
    if fragments.is_empty() {
        return Vec::new();
    }

    // Descending y = top of page first (PDF origin is bottom-left).
    fragments.sort_by(|a, b| {
        b.mid_y
            .partial_cmp(&a.mid_y)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut rows: Vec<Vec<Fragment>> = Vec::new();
    let mut anchor_y = f32::INFINITY;
    for frag in fragments {
        match rows.last_mut() {
            Some(row) if (anchor_y - frag.mid_y).abs() <= row_tol => row.push(frag),
            _ => {
                anchor_y = frag.mid_y;
                rows.push(vec![frag]);
            }
        }
    }

    rows.into_iter()
        .map(|row| split_cells(row, col_gap))
        .collect()
}

/// Split one row of fragments into cell strings on horizontal gaps.
fn split_cells(mut row: Vec<Fragment>, col_gap: f32) -> Vec<String> {
    row.sort_by(|a, b| {
        a.left
            .partial_cmp(&b.left)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut cells: Vec<String> = Vec::new();
    let mut cell_right = f32::NEG_INFINITY;

    for frag in row {
        match cells.last_mut() {
            Some(cell) if frag.left - cell_right <= col_gap => {
                cell.push(' ');
                cell.push_str(&frag.text);
            }
            _ => cells.push(frag.text),
        }
        cell_right = cell_right.max(frag.right);
    }

    cells
}
