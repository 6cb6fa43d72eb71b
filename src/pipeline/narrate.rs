//! Narration proposal: the generative step that writes one line per panel.
//!
//! The proposal is unreliable by nature. It may return fewer scenes than
//! panels, more, or none at all; [`crate::pipeline::reconcile`] repairs the
//! count. This module only turns the model's reply into a
//! [`NarrationProposal`].

use crate::config::StoryConfig;
use crate::error::ProviderError;
use crate::model::RawScene;
use crate::pipeline::encode::jpeg_image_data;
use crate::pipeline::llm::{build_options, chat_with_images};
use crate::pipeline::text::{clean_narration, extract_json_object};
use crate::prompts::{narration_request, DEFAULT_NARRATION_PROMPT};
use crate::retry::{RetryError, RetryPolicy};
use async_trait::async_trait;
use edgequake_llm::{CompletionOptions, LLMProvider};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Everything the narrator sees.
#[derive(Debug, Clone, Copy)]
pub struct NarrationRequest<'a> {
    pub name: &'a str,
    pub genre: &'a str,
    /// JPEG bytes, in panel order. May be a prefix of all panels.
    pub panel_images: &'a [Vec<u8>],
    /// Speech-bubble text, possibly empty.
    pub extracted_text: &'a str,
}

/// The model's answer: an optional teaser plus scenes in panel order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NarrationProposal {
    #[serde(default)]
    pub full_narration: Option<String>,
    #[serde(default)]
    pub scenes: Vec<RawScene>,
}

impl NarrationProposal {
    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }
}

/// Proposes narration for a run of panels.
#[async_trait]
pub trait Narrator: Send + Sync {
    async fn propose(
        &self,
        request: &NarrationRequest<'_>,
    ) -> Result<NarrationProposal, ProviderError>;
}

/// Parse a raw completion into a cleaned proposal.
///
/// The JSON object is taken from the first `{` to the last `}` so prose or
/// fences around it are tolerated.
pub fn parse_proposal(raw: &str) -> Result<NarrationProposal, ProviderError> {
    let json = extract_json_object(raw)
        .ok_or_else(|| ProviderError::InvalidResponse("no JSON object in reply".into()))?;
    let mut proposal: NarrationProposal = serde_json::from_str(json)
        .map_err(|e| ProviderError::InvalidResponse(format!("bad narration JSON: {e}")))?;

    for scene in &mut proposal.scenes {
        scene.narration = clean_narration(&scene.narration);
    }
    proposal.full_narration = proposal
        .full_narration
        .map(|t| clean_narration(&t))
        .filter(|t| !t.is_empty());
    Ok(proposal)
}

/// [`Narrator`] backed by a vision LLM.
pub struct LlmNarrator {
    provider: Arc<dyn LLMProvider>,
    system_prompt: String,
    options: CompletionOptions,
    timeout: Duration,
    retry: RetryPolicy,
}

impl LlmNarrator {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &StoryConfig) -> Self {
        Self {
            provider,
            system_prompt: config
                .narration_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_NARRATION_PROMPT.to_string()),
            options: build_options(config.temperature, config.max_tokens),
            timeout: Duration::from_secs(config.llm_timeout_secs.max(1)),
            retry: RetryPolicy::new(2, 1000),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl Narrator for LlmNarrator {
    async fn propose(
        &self,
        request: &NarrationRequest<'_>,
    ) -> Result<NarrationProposal, ProviderError> {
        let user_text = narration_request(
            request.name,
            request.genre,
            request.panel_images.len(),
            request.extracted_text,
        );

        // Unparseable replies are retried like transport errors.
        let proposal = self
            .retry
            .run("Narration", |_| {
                let images = request.panel_images.iter().map(|b| jpeg_image_data(b)).collect();
                let user_text = &user_text;
                async move {
                    let raw = chat_with_images(
                        &self.provider,
                        &self.system_prompt,
                        user_text,
                        images,
                        &self.options,
                        self.timeout,
                    )
                    .await?;
                    parse_proposal(&raw)
                }
            })
            .await
            .map_err(|e| match e {
                RetryError::Exhausted { last, .. } => last,
                other => ProviderError::InvalidResponse(other.to_string()),
            })?;

        if proposal.scenes.len() < request.panel_images.len() {
            warn!(
                "Narrator returned {} scenes for {} panels",
                proposal.scenes.len(),
                request.panel_images.len()
            );
        } else {
            info!("Narrator returned {} scenes", proposal.scenes.len());
        }
        Ok(proposal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wrapped_json() {
        let raw = r#"Here is your script:
```json
{
  "full_narration": "**A hero rises.**",
  "scenes": [
    { "image_page_index": 0, "narration_segment": "Scene 1: The city sleeps." },
    { "image_page_index": 1, "narration_segment": "A shadow   moves." }
  ]
}
```"#;
        let p = parse_proposal(raw).unwrap();
        assert_eq!(p.full_narration.as_deref(), Some("A hero rises."));
        assert_eq!(p.scenes.len(), 2);
        assert_eq!(p.scenes[0].narration, "The city sleeps.");
        assert_eq!(p.scenes[1].narration, "A shadow moves.");
        assert_eq!(p.scenes[1].panel_index, Some(1));
    }

    #[test]
    fn missing_scenes_is_empty_proposal() {
        let p = parse_proposal(r#"{"full_narration": ""}"#).unwrap();
        assert!(p.is_empty());
        assert_eq!(p.full_narration, None);
    }

    #[test]
    fn rejects_non_json() {
        assert!(matches!(
            parse_proposal("I cannot help with that."),
            Err(ProviderError::InvalidResponse(_))
        ));
        assert!(parse_proposal("{ not json }").is_err());
    }
}
