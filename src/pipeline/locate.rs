//! Locator: discover the Anexo I download URL on the portal page.
//!
//! The portal is a CMS page whose download links move between publications;
//! the only stable signal is the anchor href itself, which always carries
//! the annex name (e.g. `Anexo_I_Rol_2021RN_465.2021_RN627L.2024.pdf`).
//! Matching is therefore done on the href — substring pattern plus an
//! accepted extension — rather than on the anchor text, which the CMS
//! rewrites freely.

use crate::config::PipelineConfig;
use crate::error::AnsEtlError;
use scraper::{Html, Selector};
use tracing::{debug, info};

/// Fetch the portal page and return the absolute URL of the Anexo I file.
pub async fn locate(config: &PipelineConfig) -> Result<String, AnsEtlError> {
    let url = &config.portal_url;
    debug!("Fetching portal page: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(config.fetch_timeout_secs))
        .build()
        .map_err(|e| AnsEtlError::Fetch {
            url: url.clone(),
            reason: e.to_string(),
        })?;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| AnsEtlError::Fetch {
            url: url.clone(),
            reason: if e.is_timeout() {
                format!("timed out after {}s", config.fetch_timeout_secs)
            } else {
                e.to_string()
            },
        })?;

    if !response.status().is_success() {
        return Err(AnsEtlError::Fetch {
            url: url.clone(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let html = response.text().await.map_err(|e| AnsEtlError::Fetch {
        url: url.clone(),
        reason: e.to_string(),
    })?;

    let found = find_link(
        &html,
        url,
        &config.link_pattern,
        &config.link_extensions,
    )?;
    info!("Anexo I URL discovered: {}", found);
    Ok(found)
}

/// Scan `html` for the first anchor whose href contains `pattern` and ends
/// with one of `extensions` (case-insensitive on the extension).
///
/// Absolute hrefs are returned unchanged. Relative hrefs are resolved
/// against `base_url`.
pub fn find_link(
    html: &str,
    base_url: &str,
    pattern: &str,
    extensions: &[String],
) -> Result<String, AnsEtlError> {
    let document = Html::parse_document(html);
    // The selector literal is valid; parse can only fail on a malformed
    // selector string.
    let selector = Selector::parse("a[href]")
        .map_err(|e| AnsEtlError::Internal(format!("anchor selector: {e:?}")))?;

    for anchor in document.select(&selector) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        if !href.contains(pattern) {
            continue;
        }
        let lower = href.to_lowercase();
        if !extensions.iter().any(|ext| lower.ends_with(&ext.to_lowercase())) {
            continue;
        }

        if href.starts_with("http://") || href.starts_with("https://") {
            return Ok(href.to_string());
        }

        // Relative href: resolve against the portal URL.
        let base = reqwest::Url::parse(base_url).map_err(|e| AnsEtlError::Fetch {
            url: base_url.to_string(),
            reason: format!("invalid base URL: {e}"),
        })?;
        let joined = base.join(href).map_err(|e| AnsEtlError::NotFound {
            url: base_url.to_string(),
            pattern: format!("{pattern} (unresolvable href '{href}': {e})"),
        })?;
        return Ok(joined.to_string());
    }

    Err(AnsEtlError::NotFound {
        url: base_url.to_string(),
        pattern: pattern.to_string(),
    })
}
