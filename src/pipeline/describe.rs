//! Single-panel vision calls: fallback description and bubble transcription.

use crate::config::StoryConfig;
use crate::error::ProviderError;
use crate::pipeline::encode::jpeg_image_data;
use crate::pipeline::llm::{build_options, chat_with_images};
use crate::pipeline::text::clean_narration;
use crate::prompts::{DESCRIBE_PROMPT, TRANSCRIBE_PROMPT};
use async_trait::async_trait;
use edgequake_llm::{CompletionOptions, LLMProvider};
use std::sync::Arc;
use std::time::Duration;

/// Describes one panel in a sentence. Used for panels the narration
/// proposal did not cover.
#[async_trait]
pub trait Describer: Send + Sync {
    async fn describe(&self, jpeg: &[u8]) -> Result<String, ProviderError>;
}

/// Reads the speech-bubble text of one panel.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, jpeg: &[u8]) -> Result<String, ProviderError>;
}

/// A one-shot vision prompt over a single image.
struct PanelPrompt {
    provider: Arc<dyn LLMProvider>,
    instruction: &'static str,
    options: CompletionOptions,
    timeout: Duration,
}

impl PanelPrompt {
    fn new(
        provider: Arc<dyn LLMProvider>,
        instruction: &'static str,
        max_tokens: usize,
        config: &StoryConfig,
    ) -> Self {
        Self {
            provider,
            instruction,
            options: build_options(config.temperature, max_tokens),
            timeout: Duration::from_secs(config.llm_timeout_secs.max(1)),
        }
    }

    async fn ask(&self, jpeg: &[u8]) -> Result<String, ProviderError> {
        let raw = chat_with_images(
            &self.provider,
            "You are a careful assistant that looks at comic panels.",
            self.instruction,
            vec![jpeg_image_data(jpeg)],
            &self.options,
            self.timeout,
        )
        .await?;
        Ok(clean_narration(&raw))
    }
}

/// [`Describer`] backed by a vision LLM.
pub struct LlmDescriber(PanelPrompt);

impl LlmDescriber {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &StoryConfig) -> Self {
        Self(PanelPrompt::new(provider, DESCRIBE_PROMPT, 120, config))
    }
}

#[async_trait]
impl Describer for LlmDescriber {
    async fn describe(&self, jpeg: &[u8]) -> Result<String, ProviderError> {
        self.0.ask(jpeg).await
    }
}

/// [`Transcriber`] backed by a vision LLM.
pub struct LlmTranscriber(PanelPrompt);

impl LlmTranscriber {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &StoryConfig) -> Self {
        Self(PanelPrompt::new(provider, TRANSCRIBE_PROMPT, 400, config))
    }
}

#[async_trait]
impl Transcriber for LlmTranscriber {
    async fn transcribe(&self, jpeg: &[u8]) -> Result<String, ProviderError> {
        self.0.ask(jpeg).await
    }
}
