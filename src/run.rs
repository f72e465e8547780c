//! Pipeline orchestration: run the six stages in strict order.
//!
//! The pipeline is a straight line — each stage consumes the previous
//! stage's artifact and no stage runs concurrently with another. Progress
//! through the run is modelled by [`Stage`]; no stage is reachable except
//! via its strict predecessor, and any failure is terminal for the run
//! (there is no cross-run resume — a failed run starts over from the
//! beginning on the next invocation).

use crate::config::PipelineConfig;
use crate::error::AnsEtlError;
use crate::pipeline::{download, extract, locate, normalize, package, write};
use crate::report::{RunReport, StageTimings};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info};

/// Progress marker for a pipeline run.
///
/// Each variant names the stage that has *completed*; `Failed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    NotStarted,
    Located,
    Downloaded,
    Extracted,
    Normalized,
    Written,
    Packaged,
    Done,
    Failed,
}

impl Stage {
    /// The stage that follows this one on the success path.
    pub fn next(self) -> Stage {
        match self {
            Stage::NotStarted => Stage::Located,
            Stage::Located => Stage::Downloaded,
            Stage::Downloaded => Stage::Extracted,
            Stage::Extracted => Stage::Normalized,
            Stage::Normalized => Stage::Written,
            Stage::Written => Stage::Packaged,
            Stage::Packaged => Stage::Done,
            Stage::Done | Stage::Failed => self,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::NotStarted => "not started",
            Stage::Located => "locate",
            Stage::Downloaded => "download",
            Stage::Extracted => "extract",
            Stage::Normalized => "normalize",
            Stage::Written => "write",
            Stage::Packaged => "package",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Run the full pipeline: locate, download, extract, normalize, write,
/// package.
///
/// Returns the [`RunReport`] on success. On any stage failure the error is
/// logged with the failing stage, the observer (if any) is notified, and
/// the error is returned — callers decide the process exit code.
pub async fn run(config: &PipelineConfig) -> Result<RunReport, AnsEtlError> {
    let total_start = Instant::now();
    let mut timings = StageTimings::default();

    // ── Locate ───────────────────────────────────────────────────────────
    stage_begin(config, Stage::Located);
    let stage_start = Instant::now();
    let url = advance(config, Stage::Located, locate::locate(config).await)?;
    timings.locate_ms = stage_start.elapsed().as_millis() as u64;
    stage_done(config, Stage::Located, &url);

    // ── Download ─────────────────────────────────────────────────────────
    stage_begin(config, Stage::Downloaded);
    let stage_start = Instant::now();
    let (pdf_path, bytes) = advance(
        config,
        Stage::Downloaded,
        download::download(&url, config).await,
    )?;
    timings.download_ms = stage_start.elapsed().as_millis() as u64;
    stage_done(
        config,
        Stage::Downloaded,
        &format!("{} bytes → {}", bytes, pdf_path.display()),
    );

    finish(
        config,
        Some(url),
        pdf_path,
        bytes,
        timings,
        total_start,
    )
    .await
}

/// Run the pipeline from an already-downloaded PDF, skipping the Locator
/// and Downloader.
///
/// Intended for tests and offline reruns against a fixed fixture.
pub async fn run_from_pdf(
    pdf_path: impl AsRef<Path>,
    config: &PipelineConfig,
) -> Result<RunReport, AnsEtlError> {
    let total_start = Instant::now();
    let pdf_path = pdf_path.as_ref().to_path_buf();
    info!("Running from local PDF: {}", pdf_path.display());

    finish(config, None, pdf_path, 0, StageTimings::default(), total_start).await
}

/// Shared tail of the pipeline: extract, normalize, write, package.
async fn finish(
    config: &PipelineConfig,
    pdf_url: Option<String>,
    pdf_path: PathBuf,
    bytes_downloaded: u64,
    mut timings: StageTimings,
    total_start: Instant,
) -> Result<RunReport, AnsEtlError> {
    // ── Extract ──────────────────────────────────────────────────────────
    stage_begin(config, Stage::Extracted);
    let stage_start = Instant::now();
    let raw_rows = advance(
        config,
        Stage::Extracted,
        extract::extract_tables(&pdf_path, config).await,
    )?;
    timings.extract_ms = stage_start.elapsed().as_millis() as u64;
    let rows_extracted = raw_rows.len();
    stage_done(config, Stage::Extracted, &format!("{rows_extracted} raw rows"));

    // ── Normalize ────────────────────────────────────────────────────────
    stage_begin(config, Stage::Normalized);
    let stage_start = Instant::now();
    let outcome = advance(
        config,
        Stage::Normalized,
        normalize::normalize(raw_rows, config),
    )?;
    timings.normalize_ms = stage_start.elapsed().as_millis() as u64;
    stage_done(
        config,
        Stage::Normalized,
        &format!(
            "{} rows ({} rejected)",
            outcome.dataset.len(),
            outcome.rejected_rows
        ),
    );

    // ── Write ────────────────────────────────────────────────────────────
    let csv_path = config.csv_path();
    stage_begin(config, Stage::Written);
    let stage_start = Instant::now();
    advance(
        config,
        Stage::Written,
        write::write_csv(&outcome.dataset, &csv_path, config.delimiter).await,
    )?;
    timings.write_ms = stage_start.elapsed().as_millis() as u64;
    stage_done(config, Stage::Written, &csv_path.display().to_string());

    // ── Package ──────────────────────────────────────────────────────────
    let archive_path = config.archive_path();
    stage_begin(config, Stage::Packaged);
    let stage_start = Instant::now();
    advance(
        config,
        Stage::Packaged,
        package::package(std::slice::from_ref(&csv_path), &archive_path).await,
    )?;
    timings.package_ms = stage_start.elapsed().as_millis() as u64;
    stage_done(config, Stage::Packaged, &archive_path.display().to_string());

    timings.total_ms = total_start.elapsed().as_millis() as u64;
    info!(
        "Pipeline done: {} rows written, archive at {} ({}ms total)",
        outcome.dataset.len(),
        archive_path.display(),
        timings.total_ms
    );

    Ok(RunReport {
        pdf_url,
        pdf_path,
        bytes_downloaded,
        rows_extracted,
        header_rows_dropped: outcome.header_rows,
        empty_rows_dropped: outcome.empty_rows,
        rows_rejected: outcome.rejected_rows,
        rows_written: outcome.dataset.len(),
        csv_path,
        archive_path,
        timings,
    })
}

/// Announce a stage and unwrap its result, routing failures to the log and
/// the observer before surfacing them.
fn advance<T>(
    config: &PipelineConfig,
    stage: Stage,
    result: Result<T, AnsEtlError>,
) -> Result<T, AnsEtlError> {
    match result {
        Ok(value) => Ok(value),
        Err(e) => {
            error!("Stage '{}' failed: {}", stage, e);
            if let Some(ref obs) = config.observer {
                obs.on_failure(stage, &e.to_string());
            }
            Err(e)
        }
    }
}

fn stage_begin(config: &PipelineConfig, stage: Stage) {
    if let Some(ref obs) = config.observer {
        obs.on_stage_start(stage);
    }
}

fn stage_done(config: &PipelineConfig, stage: Stage, detail: &str) {
    info!("Stage '{}' complete: {}", stage, detail);
    if let Some(ref obs) = config.observer {
        obs.on_stage_complete(stage, detail);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_advance_in_strict_order() {
        let order = [
            Stage::NotStarted,
            Stage::Located,
            Stage::Downloaded,
            Stage::Extracted,
            Stage::Normalized,
            Stage::Written,
            Stage::Packaged,
            Stage::Done,
        ];
        for pair in order.windows(2) {
            assert_eq!(pair[0].next(), pair[1]);
        }
    }

    #[test]
    fn terminal_stages_do_not_advance() {
        assert_eq!(Stage::Done.next(), Stage::Done);
        assert_eq!(Stage::Failed.next(), Stage::Failed);
    }

    #[test]
    fn stage_display_names() {
        assert_eq!(Stage::Located.to_string(), "locate");
        assert_eq!(Stage::Packaged.to_string(), "package");
        assert_eq!(Stage::Failed.to_string(), "failed");
    }
}
