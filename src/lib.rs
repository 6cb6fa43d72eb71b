//! # pdf2story
//!
//! Turn a comic or manhwa PDF into a narrated audio story: an ordered list
//! of panel images, one speech track, and a start time and duration for
//! every panel so a renderer can assemble the video.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Extract    rasterise pages, segment panels (edges → contours), whole-page fallback
//!  ├─ 2. Propose    one vision-LLM call narrates the first K panels
//!  ├─ 3. Reconcile  describe every panel the proposal missed → exactly one scene per panel
//!  ├─ 4. Synthesize text → speech with caching, chunking, retries, silence fallback
//!  ├─ 5. Timeline   concatenate clips in panel order, cumulative start times
//!  └─ 6. Upload     panel JPEGs, master_audio.wav, result.json
//! ```
//!
//! Only four things abort a job: an unreadable PDF, no panels, an upload
//! that exhausted its retries, and no scenes. Everything the narration,
//! description and speech services get wrong degrades to less narration or
//! silence.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf2story::{Collaborators, LocalStore, StoryConfig, StoryPipeline, StoryRequest};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Vision provider from OPENAI_API_KEY / EDGEQUAKE_LLM_PROVIDER, pdfium from PDFIUM_LIB_PATH
//!     let config = StoryConfig::default();
//!     let store = Arc::new(LocalStore::new("out"));
//!     let pipeline = StoryPipeline::new(config.clone(), Collaborators::from_env(&config, store)?);
//!
//!     let request = StoryRequest::new("Tower of Dawn", "fantasy");
//!     let story = pipeline.run_input("chapter1.pdf", &request).await?;
//!     for (panel, start, duration) in story.timing_table() {
//!         println!("panel {panel}: {start}s +{duration}s");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2story` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod retry;
pub mod story;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{StoryConfig, StoryConfigBuilder};
pub use error::{ProviderError, StoryError};
pub use model::{AudioClip, BoundingBox, Page, Panel, RawScene, Scene, SceneBuilder};
pub use output::{StoryOutput, StoryStats};
pub use pipeline::cache::{ClipCache, DiskCache, MemoryCache, NoCache};
pub use pipeline::describe::{Describer, Transcriber};
pub use pipeline::extract::PanelExtractor;
pub use pipeline::narrate::{NarrationProposal, NarrationRequest, Narrator};
pub use pipeline::reconcile::SceneReconciler;
pub use pipeline::render::{PdfiumRasterizer, Rasterizer};
pub use pipeline::speech::{OpenAiSpeech, SpeechBackend};
pub use pipeline::storage::{LocalStore, ObjectStore, SupabaseStore};
pub use pipeline::synth::NarrationSynthesizer;
pub use pipeline::timeline::{Timeline, TimelineAssembler};
pub use progress::{NoopProgressCallback, ProgressCallback, StoryProgressCallback};
pub use retry::RetryPolicy;
pub use story::{Collaborators, StoryPipeline, StoryRequest};
