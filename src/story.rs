//! Story generation entry points.
//!
//! [`StoryPipeline`] wires the four core components together:
//!
//! ```text
//! PDF ─▶ PanelExtractor ─▶ panels ─┬─▶ upload images ─────────────────────────┐
//!                                  └─▶ propose ─▶ SceneReconciler ─▶ Timeline ─┴─▶ StoryOutput
//! ```
//!
//! Image uploads run alongside narration and synthesis; only the audio
//! track and manifest uploads wait for the timeline.

use crate::config::StoryConfig;
use crate::error::StoryError;
use crate::output::{StoryOutput, StoryStats};
use crate::pipeline::cache::{ClipCache, MemoryCache};
use crate::pipeline::describe::{Describer, LlmDescriber, LlmTranscriber, Transcriber};
use crate::pipeline::encode::encode_jpeg;
use crate::pipeline::extract::PanelExtractor;
use crate::pipeline::input::{resolve_input, validate_pdf};
use crate::pipeline::llm::resolve_provider;
use crate::pipeline::narrate::{LlmNarrator, NarrationProposal, NarrationRequest, Narrator};
use crate::pipeline::reconcile::SceneReconciler;
use crate::pipeline::render::{PdfiumRasterizer, Rasterizer};
use crate::pipeline::speech::{OpenAiSpeech, SpeechBackend};
use crate::pipeline::storage::{upload_all, upload_with_retry, ObjectStore, UploadItem};
use crate::pipeline::synth::{NarrationSynthesizer, SynthOptions};
use crate::pipeline::timeline::{Timeline, TimelineAssembler};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// What to call the story and how to pitch it.
#[derive(Debug, Clone)]
pub struct StoryRequest {
    pub name: String,
    /// Passed to the narrator as context; never interpreted.
    pub genre: String,
    /// Makes the storage folder unique when set.
    pub job_id: Option<String>,
}

impl StoryRequest {
    pub fn new(name: impl Into<String>, genre: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            genre: genre.into(),
            job_id: None,
        }
    }

    pub fn with_job_id(mut self, id: impl Into<String>) -> Self {
        self.job_id = Some(id.into());
        self
    }

    /// Storage folder for this story's assets.
    pub fn folder(&self) -> String {
        folder_slug(&self.name, self.job_id.as_deref())
    }
}

/// `"My Comic/Ch 1"` + `"3f2a9c1d-..."` → `"my_comic_ch_1_3f2a9c1d"`.
pub fn folder_slug(name: &str, job_id: Option<&str>) -> String {
    let mut slug: String = name
        .trim()
        .chars()
        .map(|c| if c.is_whitespace() || c == '/' { '_' } else { c })
        .collect::<String>()
        .to_lowercase();
    if slug.is_empty() {
        slug.push_str("story");
    }
    if let Some(id) = job_id.filter(|id| !id.is_empty()) {
        slug.push('_');
        slug.extend(id.chars().take(8));
    }
    slug
}

/// The external services a pipeline talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub rasterizer: Arc<dyn Rasterizer>,
    pub narrator: Arc<dyn Narrator>,
    pub describer: Arc<dyn Describer>,
    /// Speech-bubble transcription; `None` skips it.
    pub transcriber: Option<Arc<dyn Transcriber>>,
    pub speech: Arc<dyn SpeechBackend>,
    pub cache: Arc<dyn ClipCache>,
    pub store: Arc<dyn ObjectStore>,
}

impl Collaborators {
    /// Production collaborators: pdfium, the resolved vision LLM, OpenAI
    /// speech and an in-memory clip cache.
    pub fn from_env(config: &StoryConfig, store: Arc<dyn ObjectStore>) -> Result<Self, StoryError> {
        let provider = resolve_provider(config)?;
        let transcriber: Option<Arc<dyn Transcriber>> = if config.transcribe_panels {
            Some(Arc::new(LlmTranscriber::new(Arc::clone(&provider), config)))
        } else {
            None
        };
        Ok(Self {
            rasterizer: Arc::new(PdfiumRasterizer::new()),
            narrator: Arc::new(LlmNarrator::new(Arc::clone(&provider), config)),
            describer: Arc::new(LlmDescriber::new(provider, config)),
            transcriber,
            speech: Arc::new(OpenAiSpeech::from_env()?),
            cache: Arc::new(MemoryCache::new()),
            store,
        })
    }

    pub fn with_cache(mut self, cache: Arc<dyn ClipCache>) -> Self {
        self.cache = cache;
        self
    }
}

pub struct StoryPipeline {
    config: StoryConfig,
    extractor: PanelExtractor,
    narrator: Arc<dyn Narrator>,
    transcriber: Option<Arc<dyn Transcriber>>,
    reconciler: SceneReconciler,
    assembler: TimelineAssembler,
    store: Arc<dyn ObjectStore>,
}

impl StoryPipeline {
    pub fn new(config: StoryConfig, parts: Collaborators) -> Self {
        let synth = Arc::new(NarrationSynthesizer::new(
            parts.speech,
            parts.cache,
            SynthOptions::from(&config),
        ));
        Self {
            extractor: PanelExtractor::new(parts.rasterizer, &config),
            narrator: parts.narrator,
            transcriber: parts.transcriber,
            reconciler: SceneReconciler::new(parts.describer, config.describe_concurrency),
            assembler: TimelineAssembler::new(synth, config.synthesis_prefetch)
                .with_progress(config.progress_callback.clone()),
            store: parts.store,
            config,
        }
    }

    pub fn config(&self) -> &StoryConfig {
        &self.config
    }

    /// Resolve a local path or URL, then [`run`](Self::run).
    pub async fn run_input(
        &self,
        input: &str,
        request: &StoryRequest,
    ) -> Result<StoryOutput, StoryError> {
        let pdf = resolve_input(input, self.config.download_timeout_secs).await?;
        self.run(&pdf, request).await
    }

    /// Turn PDF bytes into a narrated, timed story.
    ///
    /// # Errors
    /// Only fatal conditions: unreadable PDF, no panels, too many panels,
    /// no scenes, or an upload that exhausted its retries. Narration and
    /// synthesis failures degrade to silence instead.
    pub async fn run(&self, pdf: &[u8], request: &StoryRequest) -> Result<StoryOutput, StoryError> {
        let total_start = Instant::now();
        validate_pdf(pdf)?;
        let folder = request.folder();
        info!("Starting story '{}' → {}", request.name, folder);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_story_start(&request.name);
        }

        // ── Panels ───────────────────────────────────────────────────────
        let extract_start = Instant::now();
        let extraction = self.extractor.extract(pdf).await?;
        let panel_count = extraction.panels.len();
        let images: Vec<_> = extraction.panels.into_iter().map(|p| p.image).collect();
        let jpegs = tokio::task::spawn_blocking(move || {
            images.iter().map(encode_jpeg).collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(|e| StoryError::Internal(format!("Encode task panicked: {e}")))?
        .map_err(|e| StoryError::Internal(format!("Panel encoding failed: {e}")))?;
        let extract_duration_ms = extract_start.elapsed().as_millis() as u64;
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_panels_extracted(extraction.pages, panel_count);
        }

        // ── Images upload ∥ narration + timeline ─────────────────────────
        let image_items: Vec<UploadItem> = jpegs
            .iter()
            .enumerate()
            .map(|(i, bytes)| UploadItem {
                path: format!("{folder}/images/page_{i:02}.jpg"),
                bytes: bytes.clone(),
                content_type: "image/jpeg",
            })
            .collect();

        let uploads = async {
            let start = Instant::now();
            let urls = upload_all(
                Arc::clone(&self.store),
                self.config.upload_retry,
                image_items,
                self.config.upload_concurrency,
            )
            .await?;
            Ok::<_, StoryError>((urls, start.elapsed().as_millis() as u64))
        };
        let (image_result, narrated) = tokio::join!(uploads, self.narrate(&jpegs, request));
        let (image_urls, mut upload_duration_ms) = image_result?;
        let narrated = narrated?;

        // ── Audio + manifest ─────────────────────────────────────────────
        let upload_start = Instant::now();
        let audio_path = format!("{folder}/audio/master_audio.wav");
        let audio_url = upload_with_retry(
            self.store.as_ref(),
            &self.config.upload_retry,
            &narrated.timeline.audio,
            &audio_path,
            "audio/wav",
        )
        .await?;
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_upload_complete(&audio_path);
        }

        let scenes = narrated.timeline.scenes;
        let full_narration = narrated.full_narration.or_else(|| {
            let joined = scenes
                .iter()
                .filter(|s| !s.is_silent())
                .map(|s| s.narration_text.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            (!joined.is_empty()).then_some(joined)
        });
        let stats = StoryStats {
            pages: extraction.pages,
            panels: panel_count,
            proposed_scenes: narrated.proposed,
            described_scenes: narrated.described,
            silent_scenes: scenes.iter().filter(|s| s.is_silent()).count(),
            extract_duration_ms,
            narrate_duration_ms: narrated.narrate_ms,
            synth_duration_ms: narrated.synth_ms,
            upload_duration_ms: 0,
            total_duration_ms: 0,
        };
        let mut output = StoryOutput {
            name: request.name.clone(),
            image_urls,
            audio_url,
            scenes,
            total_duration: narrated.timeline.total_duration,
            full_narration,
            stats,
        };

        if self.config.upload_manifest {
            let manifest_path = format!("{folder}/result.json");
            let json = serde_json::to_vec_pretty(&output)
                .map_err(|e| StoryError::Internal(format!("Manifest serialisation: {e}")))?;
            upload_with_retry(
                self.store.as_ref(),
                &self.config.upload_retry,
                &json,
                &manifest_path,
                "application/json",
            )
            .await?;
            if let Some(ref cb) = self.config.progress_callback {
                cb.on_upload_complete(&manifest_path);
            }
        }
        upload_duration_ms += upload_start.elapsed().as_millis() as u64;

        output.stats.upload_duration_ms = upload_duration_ms;
        output.stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
        info!(
            "Story '{}' complete: {} scenes, {:.2}s of audio in {}ms",
            output.name,
            output.scenes.len(),
            output.total_duration,
            output.stats.total_duration_ms
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_story_complete(output.scenes.len(), output.total_duration);
        }
        Ok(output)
    }

    /// Propose, reconcile and time the scenes for `jpegs`.
    async fn narrate(&self, jpegs: &[Vec<u8>], request: &StoryRequest) -> Result<Narrated, StoryError> {
        let narrate_start = Instant::now();
        let transcripts = self.transcribe(jpegs).await;

        let cap = self.config.narration_image_cap.min(jpegs.len());
        let extracted_text = join_transcripts(&transcripts);
        let proposal_request = NarrationRequest {
            name: &request.name,
            genre: &request.genre,
            panel_images: &jpegs[..cap],
            extracted_text: &extracted_text,
        };
        let mut proposal = match self.narrator.propose(&proposal_request).await {
            Ok(p) => p,
            Err(e) => {
                warn!("Narration proposal failed ({}), describing every panel", e);
                NarrationProposal::default()
            }
        };
        // The narrator only saw the first `cap` panels.
        proposal.scenes.truncate(cap);

        let reconciled = self
            .reconciler
            .reconcile_with_text(jpegs, proposal.scenes, &transcripts)
            .await;
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_scenes_reconciled(reconciled.scenes.len(), reconciled.described);
        }
        let narrate_ms = narrate_start.elapsed().as_millis() as u64;

        let synth_start = Instant::now();
        let timeline = self.assembler.assemble(reconciled.scenes).await?;
        Ok(Narrated {
            timeline,
            full_narration: proposal.full_narration,
            proposed: reconciled.proposed,
            described: reconciled.described,
            narrate_ms,
            synth_ms: synth_start.elapsed().as_millis() as u64,
        })
    }

    /// Bubble text per panel, `""` where unavailable.
    async fn transcribe(&self, jpegs: &[Vec<u8>]) -> Vec<String> {
        let Some(ref transcriber) = self.transcriber else {
            return Vec::new();
        };
        let mut slots = vec![String::new(); jpegs.len()];
        let mut results = stream::iter(jpegs.iter().enumerate())
            .map(|(i, jpeg)| {
                let transcriber = Arc::clone(transcriber);
                async move { (i, transcriber.transcribe(jpeg).await) }
            })
            .buffer_unordered(self.config.describe_concurrency.max(1));
        while let Some((i, result)) = results.next().await {
            match result {
                Ok(text) => slots[i] = text,
                Err(e) => warn!("Transcription failed for panel {}: {}", i, e),
            }
        }
        slots
    }
}

const PAGE_BREAK: &str = "\n\n--- PAGE BREAK ---\n\n";

/// Every non-empty transcript, in panel order, separated by page breaks.
fn join_transcripts(transcripts: &[String]) -> String {
    transcripts
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(PAGE_BREAK)
}

struct Narrated {
    timeline: Timeline,
    full_narration: Option<String>,
    proposed: usize,
    described: usize,
    narrate_ms: u64,
    synth_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_replaces_spaces_and_slashes() {
        assert_eq!(folder_slug("My Comic/Ch 1", None), "my_comic_ch_1");
        assert_eq!(
            folder_slug("Solo Leveling", Some("3f2a9c1d-7e4b-4c1a")),
            "solo_leveling_3f2a9c1d"
        );
        assert_eq!(folder_slug("  ", Some("")), "story");
    }

    #[test]
    fn transcripts_join_with_page_breaks() {
        let t = vec![
            "Run!".to_string(),
            "  ".to_string(),
            "Too late.".to_string(),
            String::new(),
            "Behind you".to_string(),
        ];
        assert_eq!(
            join_transcripts(&t),
            "Run!\n\n--- PAGE BREAK ---\n\nToo late.\n\n--- PAGE BREAK ---\n\nBehind you"
        );
        assert_eq!(join_transcripts(&[]), "");
    }

    #[test]
    fn request_folder_uses_job_id() {
        let r = StoryRequest::new("Tower", "fantasy").with_job_id("abc");
        assert_eq!(r.folder(), "tower_abc");
    }
}
