//! Speech backends: text in, encoded audio out.
//!
//! A backend handles one request; chunking, retries, caching and silence
//! fallbacks live in [`crate::pipeline::synth`].

use crate::error::{ProviderError, StoryError};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use tracing::debug;

/// A text-to-speech provider.
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    /// Short identifier for logs.
    fn name(&self) -> &str;

    /// Longest input, in characters, a single request accepts.
    fn max_chars(&self) -> usize;

    /// Synthesize one chunk. Any container symphonia can decode is fine.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, ProviderError>;
}

/// OpenAI-compatible `POST {base_url}/audio/speech`.
#[derive(Clone)]
pub struct OpenAiSpeech {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    voice: String,
}

impl fmt::Debug for OpenAiSpeech {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiSpeech")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("voice", &self.voice)
            .finish()
    }
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
}

impl OpenAiSpeech {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.openai.com/v1";
    pub const DEFAULT_MODEL: &'static str = "gpt-4o-mini-tts";
    pub const DEFAULT_VOICE: &'static str = "onyx";
    /// Input limit of the `/audio/speech` endpoint.
    pub const MAX_CHARS: usize = 4096;

    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: Self::DEFAULT_MODEL.to_string(),
            voice: Self::DEFAULT_VOICE.to_string(),
        }
    }

    /// Build from `OPENAI_API_KEY`, honouring `OPENAI_BASE_URL`,
    /// `PDF2STORY_TTS_MODEL` and `PDF2STORY_TTS_VOICE` when set.
    pub fn from_env() -> Result<Self, StoryError> {
        let key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| StoryError::ProviderNotConfigured {
                provider: "openai-tts".into(),
                hint: "Set OPENAI_API_KEY to enable speech synthesis.".into(),
            })?;

        let mut speech = Self::new(key);
        if let Some(url) = non_empty_env("OPENAI_BASE_URL") {
            speech = speech.with_base_url(url);
        }
        if let Some(model) = non_empty_env("PDF2STORY_TTS_MODEL") {
            speech = speech.with_model(model);
        }
        if let Some(voice) = non_empty_env("PDF2STORY_TTS_VOICE") {
            speech = speech.with_voice(voice);
        }
        Ok(speech)
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = voice.into();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/audio/speech", self.base_url)
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

#[async_trait]
impl SpeechBackend for OpenAiSpeech {
    fn name(&self) -> &str {
        "openai"
    }

    fn max_chars(&self) -> usize {
        Self::MAX_CHARS
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, ProviderError> {
        let body = SpeechRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            response_format: "wav",
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let bytes = response.bytes().await?;
        debug!("Speech: {} chars → {} bytes", text.chars().count(), bytes.len());
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_strips_trailing_slash() {
        let s = OpenAiSpeech::new("sk-test").with_base_url("http://localhost:8080/v1/");
        assert_eq!(s.endpoint(), "http://localhost:8080/v1/audio/speech");
    }

    #[test]
    fn debug_redacts_key() {
        let s = OpenAiSpeech::new("sk-very-secret");
        assert!(!format!("{s:?}").contains("sk-very-secret"));
    }

    #[test]
    fn request_body_shape() {
        let body = SpeechRequest {
            model: "m",
            input: "hello",
            voice: "onyx",
            response_format: "wav",
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["input"], "hello");
        assert_eq!(json["response_format"], "wav");
    }
}
