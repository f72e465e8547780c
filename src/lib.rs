//! # ans-rol-etl
//!
//! Download, extract, clean, and package the ANS "Anexo I" procedure list.
//!
//! ANS (Agência Nacional de Saúde Suplementar) publishes the Rol de
//! Procedimentos — the list of procedures Brazilian health plans must
//! cover — as a large multi-page PDF table on a gov.br portal page. This
//! crate automates the whole deliverable: discover the current PDF link,
//! download it, rebuild the table from the PDF text layer, normalize the
//! records, write a delimited CSV, and wrap it in a labelled zip archive.
//!
//! ## Pipeline Overview
//!
//! ```text
//! portal page
//!  │
//!  ├─ 1. Locate    find the Anexo I link on the portal (scraper)
//!  ├─ 2. Download  stream the PDF to downloads/ with bounded retry
//!  ├─ 3. Extract   rebuild table rows from the text layer (pdfium)
//!  ├─ 4. Normalize clean cells, drop header reprints, enforce schema
//!  ├─ 5. Write     output/Rol_Procedimentos.csv (`;`-delimited)
//!  └─ 6. Package   output/<label>_Rol_Procedimentos.zip
//! ```
//!
//! Stages run strictly in order; a failure at any stage aborts the run.
//! Individual malformed rows do not — they are dropped, counted, and
//! reported in the [`RunReport`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ans_rol_etl::{run, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::builder()
//!         .label("Teste_Ana_Perini")
//!         .build()?;
//!     let report = run(&config).await?;
//!     println!("{} rows → {}", report.rows_written, report.archive_path.display());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `ans-rol` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! ans-rol-etl = { version = "0.1", default-features = false }
//! ```
//!
//! ## Schema as configuration
//!
//! ANS revises the table layout between publications, so the column names,
//! column kinds, and the repeated-header signature live in
//! [`TableSchema`] — defaulting to the current 13-column Anexo I layout
//! and replaceable from a JSON file without recompiling.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod observe;
pub mod pipeline;
pub mod report;
pub mod run;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ColumnKind, ColumnSpec, PipelineConfig, PipelineConfigBuilder, TableSchema};
pub use error::{AnsEtlError, RowDefect};
pub use observe::{NoopObserver, Observer, PipelineObserver};
pub use report::{Dataset, RawRow, RunReport, StageTimings};
pub use run::{run, run_from_pdf, Stage};
