//! Configuration types for PDF-to-story conversion.
//!
//! Every knob of the pipeline lives in [`StoryConfig`], built via its
//! [`StoryConfigBuilder`]. Collaborators (rasteriser, narrator, speech
//! backend, storage, cache) are *not* configured here; they are passed to
//! [`crate::story::StoryPipeline::new`] so tests can swap them for fakes.

use crate::error::StoryError;
use crate::progress::ProgressCallback;
use crate::retry::RetryPolicy;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;

/// Configuration for one story job.
///
/// # Example
/// ```rust
/// use pdf2story::StoryConfig;
///
/// let config = StoryConfig::builder()
///     .dpi(150)
///     .describe_concurrency(2)
///     .model("gpt-4.1-mini")
///     .build()
///     .unwrap();
/// assert_eq!(config.dpi, 150);
/// ```
#[derive(Clone)]
pub struct StoryConfig {
    // ── Extraction ───────────────────────────────────────────────────────
    /// Rendering DPI. Range: 72–400. Default: 120.
    pub dpi: u32,

    /// Longest rendered edge in pixels. Default: 2000.
    pub max_rendered_pixels: u32,

    /// Pages beyond this are ignored. Default: 50.
    pub max_pages: usize,

    /// Panels kept per page after sorting. Default: 20.
    pub max_panels_per_page: usize,

    /// Panels allowed per job; more is fatal. Default: 50.
    pub max_panels: usize,

    /// Minimum panel height as a fraction of the page height. Default: 0.15.
    pub min_height_frac: f32,

    /// Minimum panel width as a fraction of the page width. Default: 0.20.
    pub min_width_frac: f32,

    /// Minimum panel area as a fraction of the page area. Default: 0.05.
    pub min_area_frac: f32,

    /// Pages segmented at once on the blocking pool. Default: 4.
    pub page_concurrency: usize,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    // ── Narration ────────────────────────────────────────────────────────
    /// Panels sent to the narration model. Default: 15.
    ///
    /// Panels past the cap are covered by the describe fallback.
    pub narration_image_cap: usize,

    /// Concurrent describe-fallback calls. Default: 4.
    pub describe_concurrency: usize,

    /// Also transcribe speech-bubble text per panel and feed it to the
    /// narrator and the fallback. Default: false.
    pub transcribe_panels: bool,

    /// LLM model identifier. If None, uses `gpt-4.1-nano`.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for narration. Default: 0.6.
    pub temperature: f32,

    /// Maximum tokens for the narration response. Default: 2500.
    pub max_tokens: usize,

    /// Custom narration system prompt. If None, uses the built-in one.
    pub narration_prompt: Option<String>,

    /// Per-LLM-call timeout in seconds. Default: 120.
    pub llm_timeout_secs: u64,

    // ── Speech ───────────────────────────────────────────────────────────
    /// Sample rate of every clip and of the merged track. Default: 24000.
    pub sample_rate: u32,

    /// Silence emitted for a scene with no narration. Default: 2.0.
    pub empty_narration_silence_secs: f64,

    /// Silence emitted when synthesis fails completely. Default: 1.0.
    pub failed_synthesis_silence_secs: f64,

    /// Upper bound on characters per speech request. Default: 4000.
    pub speech_chunk_chars: usize,

    /// Speech responses smaller than this are corrupt. Default: 1024.
    pub min_audio_bytes: usize,

    /// Speech responses shorter than this are corrupt. Default: 0.2.
    pub min_clip_secs: f64,

    /// Timeout per speech attempt in seconds. Default: 60.
    pub speech_timeout_secs: u64,

    /// Retry policy per speech chunk. Default: 3 attempts, 500 ms base.
    pub speech_retry: RetryPolicy,

    /// Clips synthesised ahead of the timeline cursor. Default: 2.
    pub synthesis_prefetch: usize,

    // ── Storage ──────────────────────────────────────────────────────────
    /// Concurrent uploads. Default: 5.
    pub upload_concurrency: usize,

    /// Retry policy per upload. Default: 3 attempts, 1500 ms base.
    pub upload_retry: RetryPolicy,

    /// Upload `result.json` next to the assets. Default: true.
    pub upload_manifest: bool,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Receives progress events. Default: None.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for StoryConfig {
    fn default() -> Self {
        Self {
            dpi: 120,
            max_rendered_pixels: 2000,
            max_pages: 50,
            max_panels_per_page: 20,
            max_panels: 50,
            min_height_frac: 0.15,
            min_width_frac: 0.20,
            min_area_frac: 0.05,
            page_concurrency: 4,
            password: None,
            narration_image_cap: 15,
            describe_concurrency: 4,
            transcribe_panels: false,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.6,
            max_tokens: 2500,
            narration_prompt: None,
            llm_timeout_secs: 120,
            sample_rate: 24_000,
            empty_narration_silence_secs: 2.0,
            failed_synthesis_silence_secs: 1.0,
            speech_chunk_chars: 4000,
            min_audio_bytes: 1024,
            min_clip_secs: 0.2,
            speech_timeout_secs: 60,
            speech_retry: RetryPolicy::new(3, 500),
            synthesis_prefetch: 2,
            upload_concurrency: 5,
            upload_retry: RetryPolicy::new(3, 1500),
            upload_manifest: true,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for StoryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoryConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("max_pages", &self.max_pages)
            .field("max_panels_per_page", &self.max_panels_per_page)
            .field("max_panels", &self.max_panels)
            .field("page_concurrency", &self.page_concurrency)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("narration_image_cap", &self.narration_image_cap)
            .field("describe_concurrency", &self.describe_concurrency)
            .field("transcribe_panels", &self.transcribe_panels)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("sample_rate", &self.sample_rate)
            .field("speech_chunk_chars", &self.speech_chunk_chars)
            .field("speech_retry", &self.speech_retry)
            .field("synthesis_prefetch", &self.synthesis_prefetch)
            .field("upload_concurrency", &self.upload_concurrency)
            .field("upload_retry", &self.upload_retry)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn StoryProgressCallback>"),
            )
            .finish()
    }
}

impl StoryConfig {
    /// Create a new builder for `StoryConfig`.
    pub fn builder() -> StoryConfigBuilder {
        StoryConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`StoryConfig`].
pub struct StoryConfigBuilder {
    config: StoryConfig,
}

impl fmt::Debug for StoryConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.config.fmt(f)
    }
}

impl StoryConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn max_pages(mut self, n: usize) -> Self {
        self.config.max_pages = n;
        self
    }

    pub fn max_panels_per_page(mut self, n: usize) -> Self {
        self.config.max_panels_per_page = n;
        self
    }

    pub fn max_panels(mut self, n: usize) -> Self {
        self.config.max_panels = n;
        self
    }

    /// Minimum panel `(height, width, area)` fractions.
    pub fn min_panel_fractions(mut self, height: f32, width: f32, area: f32) -> Self {
        self.config.min_height_frac = height;
        self.config.min_width_frac = width;
        self.config.min_area_frac = area;
        self
    }

    pub fn page_concurrency(mut self, n: usize) -> Self {
        self.config.page_concurrency = n.max(1);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn narration_image_cap(mut self, n: usize) -> Self {
        self.config.narration_image_cap = n;
        self
    }

    pub fn describe_concurrency(mut self, n: usize) -> Self {
        self.config.describe_concurrency = n.max(1);
        self
    }

    pub fn transcribe_panels(mut self, v: bool) -> Self {
        self.config.transcribe_panels = v;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn narration_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.narration_prompt = Some(prompt.into());
        self
    }

    pub fn llm_timeout_secs(mut self, secs: u64) -> Self {
        self.config.llm_timeout_secs = secs;
        self
    }

    pub fn sample_rate(mut self, hz: u32) -> Self {
        self.config.sample_rate = hz;
        self
    }

    pub fn empty_narration_silence_secs(mut self, secs: f64) -> Self {
        self.config.empty_narration_silence_secs = secs;
        self
    }

    pub fn failed_synthesis_silence_secs(mut self, secs: f64) -> Self {
        self.config.failed_synthesis_silence_secs = secs;
        self
    }

    pub fn speech_chunk_chars(mut self, n: usize) -> Self {
        self.config.speech_chunk_chars = n;
        self
    }

    /// Corruption thresholds for speech responses.
    pub fn corruption_thresholds(mut self, min_bytes: usize, min_secs: f64) -> Self {
        self.config.min_audio_bytes = min_bytes;
        self.config.min_clip_secs = min_secs;
        self
    }

    pub fn speech_timeout_secs(mut self, secs: u64) -> Self {
        self.config.speech_timeout_secs = secs;
        self
    }

    pub fn speech_retry(mut self, policy: RetryPolicy) -> Self {
        self.config.speech_retry = policy;
        self
    }

    pub fn synthesis_prefetch(mut self, n: usize) -> Self {
        self.config.synthesis_prefetch = n.max(1);
        self
    }

    pub fn upload_concurrency(mut self, n: usize) -> Self {
        self.config.upload_concurrency = n.max(1);
        self
    }

    pub fn upload_retry(mut self, policy: RetryPolicy) -> Self {
        self.config.upload_retry = policy;
        self
    }

    pub fn upload_manifest(mut self, v: bool) -> Self {
        self.config.upload_manifest = v;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<StoryConfig, StoryError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 400 {
            return Err(StoryError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        if c.max_pages == 0 || c.max_panels == 0 || c.max_panels_per_page == 0 {
            return Err(StoryError::InvalidConfig(
                "Page and panel limits must be ≥ 1".into(),
            ));
        }
        for (name, v) in [
            ("min_height_frac", c.min_height_frac),
            ("min_width_frac", c.min_width_frac),
            ("min_area_frac", c.min_area_frac),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(StoryError::InvalidConfig(format!(
                    "{name} must be within 0.0–1.0, got {v}"
                )));
            }
        }
        if !(8_000..=192_000).contains(&c.sample_rate) {
            return Err(StoryError::InvalidConfig(format!(
                "Sample rate must be 8000–192000 Hz, got {}",
                c.sample_rate
            )));
        }
        if c.speech_chunk_chars == 0 {
            return Err(StoryError::InvalidConfig(
                "Speech chunk size must be ≥ 1 character".into(),
            ));
        }
        for (name, v) in [
            ("empty_narration_silence_secs", c.empty_narration_silence_secs),
            ("failed_synthesis_silence_secs", c.failed_synthesis_silence_secs),
            ("min_clip_secs", c.min_clip_secs),
        ] {
            if !v.is_finite() || v < 0.0 {
                return Err(StoryError::InvalidConfig(format!(
                    "{name} must be a non-negative number, got {v}"
                )));
            }
        }
        if c.speech_retry.max_attempts == 0 || c.upload_retry.max_attempts == 0 {
            return Err(StoryError::InvalidConfig(
                "Retry policies need at least one attempt".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documentation() {
        let c = StoryConfig::default();
        assert_eq!(c.dpi, 120);
        assert_eq!(c.max_pages, 50);
        assert_eq!(c.max_panels_per_page, 20);
        assert_eq!(c.narration_image_cap, 15);
        assert_eq!(c.describe_concurrency, 4);
        assert_eq!(c.upload_concurrency, 5);
        assert_eq!(c.sample_rate, 24_000);
        assert_eq!(c.empty_narration_silence_secs, 2.0);
        assert_eq!(c.failed_synthesis_silence_secs, 1.0);
        assert_eq!(c.speech_retry.max_attempts, 3);
    }

    #[test]
    fn builder_clamps() {
        let c = StoryConfig::builder()
            .dpi(10)
            .page_concurrency(0)
            .synthesis_prefetch(0)
            .build()
            .unwrap();
        assert_eq!(c.dpi, 72);
        assert_eq!(c.page_concurrency, 1);
        assert_eq!(c.synthesis_prefetch, 1);
    }

    #[test]
    fn builder_rejects_bad_values() {
        assert!(StoryConfig::builder().max_panels(0).build().is_err());
        assert!(StoryConfig::builder().sample_rate(1000).build().is_err());
        assert!(StoryConfig::builder()
            .min_panel_fractions(1.5, 0.2, 0.05)
            .build()
            .is_err());
        assert!(StoryConfig::builder()
            .failed_synthesis_silence_secs(f64::NAN)
            .build()
            .is_err());
    }

    #[test]
    fn debug_redacts_password() {
        let c = StoryConfig::builder().password("hunter2").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("<redacted>"));
    }
}
