//! Input resolution: turn a path or URL into validated PDF bytes.
//!
//! pdfium loads documents from a byte slice, so both local files and
//! downloads end up as a `Vec<u8>`. The `%PDF` magic is checked before the
//! bytes reach pdfium so callers get a meaningful error rather than a
//! generic parse failure.

use crate::error::StoryError;
use std::path::Path;
use tracing::{debug, info};

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Reject empty input and anything that does not start with `%PDF`.
pub fn validate_pdf(bytes: &[u8]) -> Result<(), StoryError> {
    if bytes.is_empty() {
        return Err(StoryError::EmptyInput);
    }
    if !bytes.starts_with(b"%PDF") {
        return Err(StoryError::NotAPdf {
            magic: bytes.iter().take(4).copied().collect(),
        });
    }
    Ok(())
}

/// Read a local file or download a URL, then validate the PDF magic.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<Vec<u8>, StoryError> {
    let bytes = if is_url(input) {
        download_url(input, timeout_secs).await?
    } else {
        read_local(Path::new(input)).await?
    };
    validate_pdf(&bytes)?;
    Ok(bytes)
}

async fn read_local(path: &Path) -> Result<Vec<u8>, StoryError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => StoryError::FileNotFound {
            path: path.display().to_string(),
        },
        _ => StoryError::Internal(format!("Failed to read {}: {}", path.display(), e)),
    })?;
    debug!("Read local PDF: {} ({} bytes)", path.display(), bytes.len());
    Ok(bytes)
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<Vec<u8>, StoryError> {
    info!("Downloading PDF from: {}", url);

    let failed = |reason: String| StoryError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            failed(format!("timed out after {timeout_secs}s"))
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;
    info!("Downloaded {} bytes", bytes.len());
    Ok(bytes.to_vec())
}
