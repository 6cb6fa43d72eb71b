//! Vision-LLM plumbing shared by the narrator, describer and transcriber.
//!
//! Prompt text lives in [`crate::prompts`]; this module only builds the
//! message list, applies the timeout and resolves which provider to talk to.

use crate::config::StoryConfig;
use crate::error::{ProviderError, StoryError};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default vision model when none is configured.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Send one system prompt plus one user turn carrying `images`.
///
/// Returns the raw completion text.
pub async fn chat_with_images(
    provider: &Arc<dyn LLMProvider>,
    system_prompt: &str,
    user_text: &str,
    images: Vec<ImageData>,
    options: &CompletionOptions,
    timeout: Duration,
) -> Result<String, ProviderError> {
    let start = Instant::now();
    let image_count = images.len();
    let messages = vec![
        ChatMessage::system(system_prompt),
        ChatMessage::user_with_images(user_text, images),
    ];

    let response = tokio::time::timeout(timeout, provider.chat(&messages, Some(options)))
        .await
        .map_err(|_| ProviderError::Timeout {
            secs: timeout.as_secs(),
        })?
        .map_err(|e| ProviderError::Request(e.to_string()))?;

    debug!(
        "LLM: {} images, {} input tokens, {} output tokens, {:?}",
        image_count,
        response.prompt_tokens,
        response.completion_tokens,
        start.elapsed()
    );
    Ok(response.content)
}

pub fn build_options(temperature: f32, max_tokens: usize) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(temperature),
        max_tokens: Some(max_tokens),
        ..Default::default()
    }
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, StoryError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        StoryError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the vision provider, from most-specific to least-specific:
///
/// 1. `config.provider` — used as-is
/// 2. `config.provider_name` (+ `config.model`)
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, when both are set
/// 4. OpenAI, when `OPENAI_API_KEY` is set
/// 5. [`ProviderFactory::from_env`] auto-detection
pub fn resolve_provider(config: &StoryConfig) -> Result<Arc<dyn LLMProvider>, StoryError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);

    if let Some(ref name) = config.provider_name {
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            return create_vision_provider(&prov, &env_model);
        }
    }

    if std::env::var("OPENAI_API_KEY").is_ok_and(|k| !k.is_empty()) {
        return create_vision_provider("openai", model);
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| StoryError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No vision LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_options_sets_fields() {
        let opts = build_options(0.6, 2500);
        assert_eq!(opts.temperature, Some(0.6));
        assert_eq!(opts.max_tokens, Some(2500));
    }
}
