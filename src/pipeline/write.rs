//! Writer: serialize the [`Dataset`] to a delimited text file.
//!
//! Quoting is minimal: the `csv` crate quotes exactly the fields that
//! contain the delimiter, a quote, or a line break, so the file reconstructs
//! the Dataset byte-for-byte on read-back. The write is atomic (temp file +
//! rename) so a failed run never leaves a partial CSV that looks complete.

use crate::error::AnsEtlError;
use crate::report::Dataset;
use csv::{QuoteStyle, WriterBuilder};
use std::path::Path;
use tracing::info;

/// Write `dataset` to `path` with the given field delimiter.
///
/// The first record is the header row in schema column order.
pub async fn write_csv(
    dataset: &Dataset,
    path: &Path,
    delimiter: u8,
) -> Result<(), AnsEtlError> {
    let dataset = dataset.clone();
    let path_buf = path.to_path_buf();

    tokio::task::spawn_blocking(move || write_csv_blocking(&dataset, &path_buf, delimiter))
        .await
        .map_err(|e| AnsEtlError::Internal(format!("Write task panicked: {e}")))?
}

fn write_csv_blocking(dataset: &Dataset, path: &Path, delimiter: u8) -> Result<(), AnsEtlError> {
    let io_err = |e: std::io::Error| AnsEtlError::Write {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
    }

    let tmp = path.with_extension("csv.tmp");
    {
        let file = std::fs::File::create(&tmp).map_err(io_err)?;
        let mut writer = WriterBuilder::new()
            .delimiter(delimiter)
            .quote_style(QuoteStyle::Necessary)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(file);

        writer
            .write_record(&dataset.columns)
            .map_err(|e| csv_err(path, e))?;
        for row in &dataset.rows {
            writer.write_record(row).map_err(|e| csv_err(path, e))?;
        }
        writer.flush().map_err(io_err)?;
    }

    std::fs::rename(&tmp, path).map_err(io_err)?;

    info!("Wrote {} rows to {}", dataset.len(), path.display());
    Ok(())
}

fn csv_err(path: &Path, e: csv::Error) -> AnsEtlError {
    match e.into_kind() {
        csv::ErrorKind::Io(io) => AnsEtlError::Write {
            path: path.to_path_buf(),
            source: io,
        },
        other => AnsEtlError::Internal(format!("CSV serialization: {other:?}")),
    }
}
