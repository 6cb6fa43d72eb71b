//! Error types for the pdf2story library.
//!
//! Two error types mirror the two ways a stage can go wrong:
//!
//! * [`StoryError`] — **Fatal**: the job cannot produce a story at all
//!   (unreadable PDF, nothing to narrate, storage refused every retry).
//!   Returned as `Err(StoryError)` from [`crate::story::StoryPipeline::run`].
//!
//! * [`ProviderError`] — **Non-fatal**: one call to an external collaborator
//!   failed (speech backend, vision model, describe service). Each stage
//!   absorbs these locally (a failed description becomes empty narration, a
//!   failed synthesis becomes silence), so they never reach the caller.

use thiserror::Error;

/// All fatal errors returned by the pdf2story library.
///
/// Collaborator failures use [`ProviderError`] and are recovered inside the
/// stage that hit them.
#[derive(Debug, Error)]
pub enum StoryError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The bytes handed to the pipeline are empty.
    #[error("Input PDF is empty")]
    EmptyInput,

    /// The bytes do not start with the `%PDF` magic.
    #[error("Input is not a valid PDF\nFirst bytes: {magic:?}")]
    NotAPdf { magic: Vec<u8> },

    /// A local input path does not exist.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: String },

    /// Downloading a remote input failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// pdfium could not parse the document.
    #[error("PDF is corrupt: {detail}\nTry repairing with: qpdf input.pdf output.pdf")]
    CorruptPdf { detail: String },

    /// Rendering a specific page failed.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide.\n\
Pre-built libraries: https://github.com/bblanchon/pdfium-binaries/releases\n"
    )]
    PdfiumBindingFailed(String),

    // ── Pipeline errors ───────────────────────────────────────────────────
    /// Extraction produced no panels even after the whole-page fallback.
    #[error("No panels extracted from PDF")]
    NoPanels,

    /// Extraction produced more panels than a single job may narrate.
    #[error("Too many panels extracted ({count}, limit {limit}). Please use a cleaner comic PDF.")]
    TooManyPanels { count: usize, limit: usize },

    /// Reconciliation produced no scenes to narrate.
    #[error("No scenes with audio generated")]
    NoScenes,

    /// Merged audio track could not be encoded.
    #[error("Failed to encode the audio track: {0}")]
    AudioEncodeFailed(String),

    // ── Storage errors ────────────────────────────────────────────────────
    /// An upload failed after every retry.
    #[error("Upload of '{path}' failed after {attempts} attempts: {detail}")]
    UploadFailed {
        path: String,
        attempts: u32,
        detail: String,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// A collaborator could not be constructed (missing key etc.).
    #[error("Provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (a worker task panicked, …).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal failure of one external collaborator call.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Transport-level failure (connection reset, DNS, TLS, …).
    #[error("request failed: {0}")]
    Request(String),

    /// The service answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The call exceeded its timeout.
    #[error("timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The service answered, but the payload is unusable.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Returned audio could not be decoded.
    #[error("audio decode failed: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout { secs: 0 }
        } else {
            ProviderError::Request(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn too_many_panels_display() {
        let e = StoryError::TooManyPanels {
            count: 61,
            limit: 50,
        };
        let msg = e.to_string();
        assert!(msg.contains("61"), "got: {msg}");
        assert!(msg.contains("50"), "got: {msg}");
    }

    #[test]
    fn upload_failed_display() {
        let e = StoryError::UploadFailed {
            path: "story/audio/master_audio.wav".into(),
            attempts: 3,
            detail: "HTTP 503".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("master_audio.wav"));
        assert!(msg.contains("3 attempts"));
    }

    #[test]
    fn not_a_pdf_shows_magic() {
        let e = StoryError::NotAPdf {
            magic: b"PK\x03\x04".to_vec(),
        };
        assert!(e.to_string().contains("not a valid PDF"));
    }

    #[test]
    fn provider_status_display() {
        let e = ProviderError::Status {
            status: 429,
            body: "slow down".into(),
        };
        assert_eq!(e.to_string(), "HTTP 429: slow down");
    }
}
