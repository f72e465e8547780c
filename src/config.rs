//! Configuration types for the ANS Anexo I pipeline.
//!
//! All run behaviour is controlled through [`PipelineConfig`], built via its
//! [`PipelineConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to substitute pieces in tests (a fake portal page, a local PDF
//! fixture) without touching global state, and to log the effective
//! configuration of a run.
//!
//! The table schema — column names, column kinds, and the repeated-header
//! signature derived from the names — is deliberately *configuration*, not
//! code: ANS revises the Anexo I layout between publications, and operators
//! can supply a replacement schema as JSON without recompiling.

use crate::error::AnsEtlError;
use crate::observe::PipelineObserver;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default portal page listing the current Rol de Procedimentos downloads.
pub const DEFAULT_PORTAL_URL: &str = "https://www.gov.br/ans/pt-br/acesso-a-informacao/participacao-da-sociedade/atualizacao-do-rol-de-procedimentos";

/// Configuration for one pipeline run.
///
/// Built via [`PipelineConfig::builder()`] or [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use ans_rol_etl::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .label("Teste_Ana_Perini")
///     .delimiter(b';')
///     .max_retries(3)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Portal page fetched by the Locator. Default: [`DEFAULT_PORTAL_URL`].
    pub portal_url: String,

    /// Substring an anchor's href must contain to be the Anexo I link.
    /// Default: `"Anexo_I"`.
    pub link_pattern: String,

    /// Accepted link extensions, matched case-insensitively. Default: `[".pdf"]`.
    ///
    /// The portal has historically published the same annex as both `.pdf`
    /// and `.xlsx`; only the PDF path is implemented, but the match set is
    /// configurable so a changed portal does not require a code change to
    /// diagnose.
    pub link_extensions: Vec<String>,

    /// Directory the fetched PDF is written to. Default: `downloads`.
    pub download_dir: PathBuf,

    /// Directory for the CSV and the zip archive. Default: `output`.
    pub output_dir: PathBuf,

    /// CSV file name inside `output_dir`. Default: `Rol_Procedimentos.csv`.
    pub csv_name: String,

    /// CSV field delimiter. Default: `b';'`.
    ///
    /// The original deliverable uses `;` because many of the procedure
    /// descriptions contain commas; any single byte except quote, CR and LF
    /// is accepted.
    pub delimiter: u8,

    /// Label embedded in the archive name (`<label>_<csv-stem>.zip`).
    /// Default: `"Teste"`.
    pub label: String,

    /// Timeout for the portal page fetch in seconds. Default: 30.
    pub fetch_timeout_secs: u64,

    /// Timeout for the PDF download in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Maximum retry attempts for a transient download failure. Default: 3.
    ///
    /// 5xx responses, connection resets and timeouts are retried; permanent
    /// errors (404, TLS failure) surface immediately.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (doubles per attempt). Default: 500.
    pub retry_backoff_ms: u64,

    /// Vertical tolerance in PDF points when clustering text segments into
    /// rows. Default: 3.0.
    ///
    /// Cell text in the Anexo I table sits on a shared baseline per row;
    /// 3 pt absorbs sub/superscript jitter without merging adjacent rows
    /// (row pitch in the published PDFs is ~10 pt).
    pub row_tolerance_pts: f32,

    /// Minimum horizontal gap in PDF points that separates two cells on the
    /// same row. Default: 9.0.
    ///
    /// Word gaps inside a cell are 2–4 pt at the table's font size; column
    /// gutters are well above 9 pt. Lower this for tightly packed layouts.
    pub min_column_gap_pts: f32,

    /// The expected table schema. Default: [`TableSchema::anexo_i()`].
    pub schema: TableSchema,

    /// Observer notified of stage transitions and rejected rows.
    pub observer: Option<Arc<dyn PipelineObserver>>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            portal_url: DEFAULT_PORTAL_URL.to_string(),
            link_pattern: "Anexo_I".to_string(),
            link_extensions: vec![".pdf".to_string()],
            download_dir: PathBuf::from("downloads"),
            output_dir: PathBuf::from("output"),
            csv_name: "Rol_Procedimentos.csv".to_string(),
            delimiter: b';',
            label: "Teste".to_string(),
            fetch_timeout_secs: 30,
            download_timeout_secs: 120,
            max_retries: 3,
            retry_backoff_ms: 500,
            row_tolerance_pts: 3.0,
            min_column_gap_pts: 9.0,
            schema: TableSchema::anexo_i(),
            observer: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("portal_url", &self.portal_url)
            .field("link_pattern", &self.link_pattern)
            .field("link_extensions", &self.link_extensions)
            .field("download_dir", &self.download_dir)
            .field("output_dir", &self.output_dir)
            .field("csv_name", &self.csv_name)
            .field("delimiter", &(self.delimiter as char))
            .field("label", &self.label)
            .field("max_retries", &self.max_retries)
            .field("schema_columns", &self.schema.width())
            .field("observer", &self.observer.as_ref().map(|_| "<dyn PipelineObserver>"))
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Full path of the output CSV (`output_dir/csv_name`).
    pub fn csv_path(&self) -> PathBuf {
        self.output_dir.join(&self.csv_name)
    }

    /// Full path of the zip archive (`output_dir/<label>_<csv-stem>.zip`).
    pub fn archive_path(&self) -> PathBuf {
        let stem = Path::new(&self.csv_name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.csv_name.clone());
        self.output_dir
            .join(format!("{}_{}.zip", self.label, stem))
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn portal_url(mut self, url: impl Into<String>) -> Self {
        self.config.portal_url = url.into();
        self
    }

    pub fn link_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.config.link_pattern = pattern.into();
        self
    }

    pub fn link_extensions(mut self, exts: Vec<String>) -> Self {
        self.config.link_extensions = exts;
        self
    }

    pub fn download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.download_dir = dir.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn csv_name(mut self, name: impl Into<String>) -> Self {
        self.config.csv_name = name.into();
        self
    }

    pub fn delimiter(mut self, delim: u8) -> Self {
        self.config.delimiter = delim;
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.config.label = label.into();
        self
    }

    pub fn fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.fetch_timeout_secs = secs.max(1);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs.max(1);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn row_tolerance_pts(mut self, pts: f32) -> Self {
        self.config.row_tolerance_pts = pts.max(0.1);
        self
    }

    pub fn min_column_gap_pts(mut self, pts: f32) -> Self {
        self.config.min_column_gap_pts = pts.max(0.1);
        self
    }

    pub fn schema(mut self, schema: TableSchema) -> Self {
        self.config.schema = schema;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.config.observer = Some(observer);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, AnsEtlError> {
        let c = &self.config;
        if c.schema.width() == 0 {
            return Err(AnsEtlError::InvalidConfig(
                "Schema must define at least one column".into(),
            ));
        }
        if matches!(c.delimiter, b'"' | b'\r' | b'\n') {
            return Err(AnsEtlError::InvalidConfig(format!(
                "Delimiter {:?} conflicts with CSV quoting",
                c.delimiter as char
            )));
        }
        if c.label.is_empty() {
            return Err(AnsEtlError::InvalidConfig("Label must not be empty".into()));
        }
        Ok(self.config)
    }
}

// ── Schema ───────────────────────────────────────────────────────────────

/// The expected shape of the extracted table.
///
/// Holds one [`ColumnSpec`] per column in output order. The column names
/// double as the repeated-header signature: an extracted row whose cells
/// match the names is a per-page header reprint and is dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub columns: Vec<ColumnSpec>,
}

/// One column: its output name and how its values are coerced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(default)]
    pub kind: ColumnKind,
}

/// How cell values in a column are treated after text cleanup.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    /// Free text, kept as cleaned.
    #[default]
    Text,
    /// Identifier kept verbatim as text — never parsed as a number, so
    /// leading zeros in procedure codes survive.
    Code,
    /// Coverage flag: a cell equal to the column name is replaced by the
    /// canonical `label` (or kept as the name when no label is configured).
    Flag {
        #[serde(default)]
        label: Option<String>,
    },
}

impl TableSchema {
    /// The 13-column ANS Anexo I schema in publication order.
    ///
    /// Flag labels are stored diacritic-free ("Seg. Odontologica") so that
    /// re-normalizing an already-normalized dataset is a no-op.
    pub fn anexo_i() -> Self {
        fn text(name: &str) -> ColumnSpec {
            ColumnSpec {
                name: name.to_string(),
                kind: ColumnKind::Text,
            }
        }
        fn code(name: &str) -> ColumnSpec {
            ColumnSpec {
                name: name.to_string(),
                kind: ColumnKind::Code,
            }
        }
        fn flag(name: &str, label: Option<&str>) -> ColumnSpec {
            ColumnSpec {
                name: name.to_string(),
                kind: ColumnKind::Flag {
                    label: label.map(str::to_string),
                },
            }
        }

        Self {
            columns: vec![
                text("PROCEDIMENTO"),
                code("RN_alteracao"),
                text("VIGENCIA"),
                flag("OD", Some("Seg. Odontologica")),
                flag("AMB", Some("Seg. Ambulatorial")),
                flag("HCO", None),
                flag("HSO", None),
                flag("REF", None),
                flag("PAC", None),
                code("DUT"),
                text("SUBGRUPO"),
                text("GRUPO"),
                text("CAPITULO"),
            ],
        }
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Column names in output order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Whether `cells` (already cleaned) reprints the header row.
    ///
    /// A cell matches when it equals its column name case-insensitively.
    /// The first cell must match and at least half of the present cells
    /// must match — per-page reprints occasionally lose a trailing column
    /// to the extractor, so an exact full-width match is too strict.
    pub fn is_header_row(&self, cells: &[String]) -> bool {
        if cells.is_empty() || cells.len() > self.width() {
            return false;
        }
        let matches = cells
            .iter()
            .zip(&self.columns)
            .filter(|(cell, col)| cell.eq_ignore_ascii_case(&col.name))
            .count();
        matches * 2 >= cells.len()
            && cells[0].eq_ignore_ascii_case(&self.columns[0].name)
    }

    /// Load a schema from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, AnsEtlError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            AnsEtlError::InvalidConfig(format!("Cannot read schema file '{}': {e}", path.display()))
        })?;
        let schema: TableSchema = serde_json::from_str(&text).map_err(|e| {
            AnsEtlError::InvalidConfig(format!("Invalid schema JSON in '{}': {e}", path.display()))
        })?;
        if schema.width() == 0 {
            return Err(AnsEtlError::InvalidConfig(format!(
                "Schema '{}' defines no columns",
                path.display()
            )));
        }
        Ok(schema)
    }
}
