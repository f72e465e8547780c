//! CLI binary for ans-rol-etl.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig`, wires the log sinks, and prints one status line per
//! stage.

use anyhow::{Context, Result};
use ans_rol_etl::{
    run, run_from_pdf, PipelineConfig, PipelineObserver, RowDefect, RunReport, Stage, TableSchema,
};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::prelude::*;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI observer using indicatif ─────────────────────────────────────────────

/// Terminal observer: a six-step progress bar with one printed line per
/// completed stage plus a running count of rejected rows.
struct CliObserver {
    bar: ProgressBar,
    rejected: AtomicUsize,
}

impl CliObserver {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(6);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:24.green/238}] {pos}/{len} stages  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(style);
        bar.set_prefix("Processing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            rejected: AtomicUsize::new(0),
        })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl PipelineObserver for CliObserver {
    fn on_stage_start(&self, stage: Stage) {
        self.bar.set_message(stage.to_string());
    }

    fn on_stage_complete(&self, stage: Stage, detail: &str) {
        // Keep long URLs/paths from wrapping the status line.
        let detail = if detail.chars().count() > 72 {
            let head: String = detail.chars().take(71).collect();
            format!("{head}\u{2026}")
        } else {
            detail.to_string()
        };
        self.bar
            .println(format!("  {} {:<9}  {}", green("✓"), stage, dim(&detail)));
        self.bar.inc(1);
    }

    fn on_row_defect(&self, defect: &RowDefect) {
        if matches!(defect, RowDefect::CellCountMismatch { .. }) {
            let n = self.rejected.fetch_add(1, Ordering::SeqCst) + 1;
            self.bar.set_message(format!("normalize ({n} rejected)"));
        }
    }

    fn on_failure(&self, stage: Stage, error: &str) {
        self.bar
            .println(format!("  {} {:<9}  {}", red("✗"), stage, red(error)));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Full run with defaults (portal → downloads/ → output/)
  ans-rol

  # Label the deliverable with your name
  ans-rol --label Teste_Ana_Perini

  # Re-process an already-downloaded PDF (skips portal + download)
  ans-rol --input downloads/Anexo_I.pdf

  # Only discover and print the current PDF URL
  ans-rol --locate-only

  # Operator-supplied schema and a comma delimiter
  ans-rol --schema rol_2025.json --delimiter ','

  # Machine-readable run report
  ans-rol --json > report.json

OUTPUT LAYOUT:
  downloads/<source-name>.pdf            the fetched Anexo I
  output/Rol_Procedimentos.csv           cleaned table, ';'-delimited, UTF-8
  output/<label>_Rol_Procedimentos.zip   the final deliverable
  ans_processor.log                      append-only, timestamped, leveled

SCHEMA FILE:
  JSON with one entry per column, e.g.
    { "columns": [
        { "name": "PROCEDIMENTO" },
        { "name": "DUT", "kind": "code" },
        { "name": "OD",  "kind": { "flag": { "label": "Seg. Odontologica" } } }
    ] }
  Omitted "kind" defaults to free text. "code" keeps values verbatim
  (leading zeros survive); "flag" maps a cell equal to the column name to
  its canonical label.

EXIT STATUS:
  0  full success
  1  any stage failed (details in ans_processor.log)
"#;

/// Download, extract, clean, and package the ANS Anexo I procedure list.
#[derive(Parser, Debug)]
#[command(
    name = "ans-rol",
    version,
    about = "Download, extract, clean, and package the ANS Anexo I procedure list",
    long_about = "Fetches the ANS Rol de Procedimentos portal page, downloads the current \
Anexo I PDF, rebuilds its table from the text layer, normalizes the records, writes a \
delimited CSV, and packages it into a labelled zip archive.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Skip portal + download and process this local PDF instead.
    #[arg(long, env = "ANS_ROL_INPUT")]
    input: Option<PathBuf>,

    /// Portal page to scan for the Anexo I link.
    #[arg(long, env = "ANS_ROL_PORTAL_URL")]
    portal_url: Option<String>,

    /// Substring the link href must contain.
    #[arg(long, env = "ANS_ROL_PATTERN", default_value = "Anexo_I")]
    pattern: String,

    /// Directory for the downloaded PDF.
    #[arg(long, env = "ANS_ROL_DOWNLOAD_DIR", default_value = "downloads")]
    download_dir: PathBuf,

    /// Directory for the CSV and the archive.
    #[arg(long, env = "ANS_ROL_OUTPUT_DIR", default_value = "output")]
    output_dir: PathBuf,

    /// Output CSV file name.
    #[arg(long, env = "ANS_ROL_CSV_NAME", default_value = "Rol_Procedimentos.csv")]
    csv_name: String,

    /// CSV field delimiter (single character).
    #[arg(long, env = "ANS_ROL_DELIMITER", default_value = ";")]
    delimiter: String,

    /// Label embedded in the archive name (<label>_<csv-stem>.zip).
    #[arg(short, long, env = "ANS_ROL_LABEL", default_value = "Teste")]
    label: String,

    /// Path to a JSON schema file replacing the built-in Anexo I schema.
    #[arg(long, env = "ANS_ROL_SCHEMA")]
    schema: Option<PathBuf>,

    /// Retries for a transient download failure.
    #[arg(long, env = "ANS_ROL_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Initial retry backoff in milliseconds (doubles per attempt).
    #[arg(long, env = "ANS_ROL_BACKOFF_MS", default_value_t = 500)]
    backoff_ms: u64,

    /// Portal fetch timeout in seconds.
    #[arg(long, env = "ANS_ROL_FETCH_TIMEOUT", default_value_t = 30)]
    fetch_timeout: u64,

    /// PDF download timeout in seconds.
    #[arg(long, env = "ANS_ROL_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Append-only diagnostic log file.
    #[arg(long, env = "ANS_ROL_LOG_FILE", default_value = "ans_processor.log")]
    log_file: PathBuf,

    /// Print the discovered PDF URL and exit without downloading.
    #[arg(long)]
    locate_only: bool,

    /// Output the run report as JSON instead of the summary lines.
    #[arg(long, env = "ANS_ROL_JSON")]
    json: bool,

    /// Disable the progress bar.
    #[arg(long, env = "ANS_ROL_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level logs.
    #[arg(short, long, env = "ANS_ROL_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "ANS_ROL_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Two sinks: the append-only file gets full detail for every run; the
    // terminal gets errors only while the progress bar is active, since the
    // bar carries the per-stage status.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.locate_only;
    let stderr_filter = if cli.quiet || show_progress {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    let file_filter = if cli.verbose { "debug" } else { "info" };

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&cli.log_file)
        .with_context(|| format!("Failed to open log file {:?}", cli.log_file))?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(log_file)
                .with_filter(EnvFilter::new(file_filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_filter(
                    EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| EnvFilter::new(stderr_filter)),
                ),
        )
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let observer = if show_progress {
        Some(CliObserver::new())
    } else {
        None
    };
    let config = build_config(&cli, observer.clone())?;

    // ── Locate-only mode ─────────────────────────────────────────────────
    if cli.locate_only {
        let url = ans_rol_etl::pipeline::locate::locate(&config)
            .await
            .context("Failed to locate the Anexo I link")?;
        println!("{url}");
        return Ok(());
    }

    // ── Run pipeline ─────────────────────────────────────────────────────
    let result = match cli.input {
        Some(ref pdf) => run_from_pdf(pdf, &config).await,
        None => run(&config).await,
    };

    if let Some(ref obs) = observer {
        obs.finish();
    }

    let report = result.context("Pipeline failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
        println!("{json}");
    } else if !cli.quiet {
        print_summary(&report);
    }

    Ok(())
}

/// Human-readable run summary, one line per fact.
fn print_summary(report: &RunReport) {
    let dropped = report.header_rows_dropped + report.empty_rows_dropped;
    eprintln!(
        "{}  {} rows written  {}  →  {}",
        if report.rows_rejected == 0 {
            green("✔")
        } else {
            cyan("⚠")
        },
        bold(&report.rows_written.to_string()),
        dim(&format!("{}ms", report.timings.total_ms)),
        bold(&report.archive_path.display().to_string()),
    );
    eprintln!(
        "   {} extracted  /  {} header+empty dropped  /  {} rejected",
        dim(&report.rows_extracted.to_string()),
        dim(&dropped.to_string()),
        if report.rows_rejected == 0 {
            dim("0")
        } else {
            red(&report.rows_rejected.to_string())
        },
    );
    if let Some(ref url) = report.pdf_url {
        eprintln!("   {} {}", dim("source"), dim(url));
    }
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli, observer: Option<Arc<CliObserver>>) -> Result<PipelineConfig> {
    let delimiter = parse_delimiter(&cli.delimiter)?;

    let mut builder = PipelineConfig::builder()
        .link_pattern(&cli.pattern)
        .download_dir(&cli.download_dir)
        .output_dir(&cli.output_dir)
        .csv_name(&cli.csv_name)
        .delimiter(delimiter)
        .label(&cli.label)
        .max_retries(cli.max_retries)
        .retry_backoff_ms(cli.backoff_ms)
        .fetch_timeout_secs(cli.fetch_timeout)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref url) = cli.portal_url {
        builder = builder.portal_url(url);
    }
    if let Some(ref path) = cli.schema {
        let schema = TableSchema::from_json_file(path)
            .with_context(|| format!("Failed to load schema from {:?}", path))?;
        builder = builder.schema(schema);
    }
    if let Some(obs) = observer {
        builder = builder.observer(obs);
    }

    builder.build().context("Invalid configuration")
}

/// Parse `--delimiter` into a single byte.
fn parse_delimiter(s: &str) -> Result<u8> {
    let unescaped = match s {
        "\\t" | "tab" => "\t",
        other => other,
    };
    let bytes = unescaped.as_bytes();
    if bytes.len() != 1 {
        anyhow::bail!("Delimiter must be a single ASCII character, got {s:?}");
    }
    Ok(bytes[0])
}
