//! Downloader: stream the PDF to the downloads directory.
//!
//! The published Anexo I runs to several megabytes, so the body is streamed
//! chunk-by-chunk to disk instead of buffered. Writes go to a `.part` file
//! renamed into place only after the transfer completes and the `%PDF`
//! magic is verified — a failed run never leaves a file that looks like a
//! finished download.
//!
//! ## Retry strategy
//!
//! gov.br frontends shed load with transient 5xx responses and dropped
//! connections. Those are retried a bounded number of times with
//! exponential backoff (`retry_backoff_ms * 2^attempt`); permanent errors
//! (404, TLS failure) surface immediately.

use crate::config::PipelineConfig;
use crate::error::AnsEtlError;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

/// Download `url` into `config.download_dir`, returning the final path and
/// the number of bytes written.
pub async fn download(url: &str, config: &PipelineConfig) -> Result<(PathBuf, u64), AnsEtlError> {
    tokio::fs::create_dir_all(&config.download_dir)
        .await
        .map_err(|e| AnsEtlError::Download {
            url: url.to_string(),
            reason: format!(
                "cannot create '{}': {e}",
                config.download_dir.display()
            ),
        })?;

    let filename = filename_from_url(url);
    let dest = config.download_dir.join(&filename);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.download_timeout_secs))
        .build()
        .map_err(|e| AnsEtlError::Download {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let mut last_err: Option<AnsEtlError> = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = backoff_ms(config.retry_backoff_ms, attempt);
            warn!(
                "Download retry {}/{} after {}ms: {}",
                attempt, config.max_retries, backoff, url
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        match try_download(&client, url, &dest, config.download_timeout_secs).await {
            Ok(bytes) => {
                info!("Downloaded {} bytes to {}", bytes, dest.display());
                return Ok((dest, bytes));
            }
            Err(e) if is_transient(&e) => {
                warn!("Transient download failure (attempt {}): {}", attempt + 1, e);
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_err.unwrap_or_else(|| AnsEtlError::Download {
        url: url.to_string(),
        reason: "retries exhausted".into(),
    }))
}

/// Single download attempt: GET, stream to `<dest>.part`, verify, rename.
async fn try_download(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    timeout_secs: u64,
) -> Result<u64, AnsEtlError> {
    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            AnsEtlError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            AnsEtlError::Download {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(AnsEtlError::Download {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let part = dest.with_extension("part");
    let (written, head) = match stream_body(response, url, &part, timeout_secs).await {
        Ok(outcome) => outcome,
        Err(e) => {
            // A failed attempt must not leave a partial file for the next
            // attempt (or a later run) to trip over.
            let _ = tokio::fs::remove_file(&part).await;
            return Err(e);
        }
    };

    // Reject HTML error pages served with a 200 status.
    if dest
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
        && head != b"%PDF"
    {
        let _ = tokio::fs::remove_file(&part).await;
        return Err(AnsEtlError::Download {
            url: url.to_string(),
            reason: format!("response is not a PDF (first bytes: {head:?})"),
        });
    }

    tokio::fs::rename(&part, dest)
        .await
        .map_err(|e| AnsEtlError::Download {
            url: url.to_string(),
            reason: format!("cannot finalize '{}': {e}", dest.display()),
        })?;

    debug!("Transfer complete: {} bytes", written);
    Ok(written)
}

/// Stream the response body to `part`, returning the byte count and the
/// first four body bytes.
async fn stream_body(
    response: reqwest::Response,
    url: &str,
    part: &Path,
    timeout_secs: u64,
) -> Result<(u64, Vec<u8>), AnsEtlError> {
    let mut file = tokio::fs::File::create(part)
        .await
        .map_err(|e| AnsEtlError::Download {
            url: url.to_string(),
            reason: format!("cannot create '{}': {e}", part.display()),
        })?;

    let mut stream = response.bytes_stream();
    let mut written: u64 = 0;
    let mut head: Vec<u8> = Vec::with_capacity(4);

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| {
            if e.is_timeout() {
                AnsEtlError::DownloadTimeout {
                    url: url.to_string(),
                    secs: timeout_secs,
                }
            } else {
                AnsEtlError::Download {
                    url: url.to_string(),
                    reason: format!("interrupted transfer: {e}"),
                }
            }
        })?;
        if head.len() < 4 {
            head.extend(chunk.iter().take(4 - head.len()));
        }
        file.write_all(&chunk)
            .await
            .map_err(|e| AnsEtlError::Download {
                url: url.to_string(),
                reason: format!("disk write failed: {e}"),
            })?;
        written += chunk.len() as u64;
    }

    file.flush().await.map_err(|e| AnsEtlError::Download {
        url: url.to_string(),
        reason: format!("disk flush failed: {e}"),
    })?;

    Ok((written, head))
}

/// Exponential backoff for retry `attempt` (1-based), capped so large
/// retry counts cannot overflow the shift.
fn backoff_ms(base: u64, attempt: u32) -> u64 {
    base.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1).min(16)))
}

/// Whether the error is worth retrying.
fn is_transient(err: &AnsEtlError) -> bool {
    match err {
        AnsEtlError::DownloadTimeout { .. } => true,
        AnsEtlError::Download { reason, .. } => {
            reason.contains("HTTP 5")
                || reason.contains("interrupted transfer")
                || reason.contains("connection")
        }
        _ => false,
    }
}

/// Derive the destination filename from the last URL path segment.
pub fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }
    "Anexo_I.pdf".to_string()
}
