//! CLI binary for pdf2story.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `StoryConfig`, picks a storage backend and prints the result.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdf2story::{
    ClipCache, Collaborators, DiskCache, LocalStore, MemoryCache, ObjectStore, ProgressCallback,
    StoryConfig, StoryPipeline, StoryProgressCallback, StoryRequest, SupabaseStore,
};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner while panels are extracted, then one bar tick per timed scene.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Extracting panels…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl StoryProgressCallback for CliProgressCallback {
    fn on_story_start(&self, name: &str) {
        self.bar
            .println(format!("{} {}", cyan("◆"), bold(&format!("Narrating '{name}'…"))));
    }

    fn on_panels_extracted(&self, pages: usize, panels: usize) {
        self.bar.println(format!(
            "  {} {} panels from {} pages",
            green("✓"),
            panels,
            pages
        ));
        self.bar.set_message("Writing narration…");
    }

    fn on_scenes_reconciled(&self, scenes: usize, described: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} scenes  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        self.bar.set_length(scenes as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Speaking");
        if described > 0 {
            self.bar.println(format!(
                "  {} {} scenes described individually",
                cyan("⚠"),
                described
            ));
        }
    }

    fn on_scene_timed(&self, panel_index: usize, total: usize, duration: f64) {
        self.bar.println(format!(
            "  {} Scene {:>3}/{:<3}  {}",
            green("✓"),
            panel_index + 1,
            total,
            dim(&format!("{duration:.2}s")),
        ));
        self.bar.inc(1);
    }

    fn on_upload_complete(&self, path: &str) {
        self.bar.set_message(format!("uploaded {path}"));
    }

    fn on_story_complete(&self, total_scenes: usize, total_duration: f64) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} scenes, {:.1}s of narration",
            green("✔"),
            bold(&total_scenes.to_string()),
            total_duration
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Narrate a local chapter, writing assets under ./out
  pdf2story chapter1.pdf --name "Tower of Dawn" --genre fantasy --out-dir out

  # Upload to Supabase Storage instead
  pdf2story https://example.com/ch1.pdf --name "Tower of Dawn" --supabase

  # Print the full result as JSON
  pdf2story chapter1.pdf --name demo --out-dir out --json

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY              OpenAI key (vision model and speech)
  EDGEQUAKE_LLM_PROVIDER      Override vision provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL             Override vision model ID
  PDF2STORY_TTS_MODEL         Speech model (default gpt-4o-mini-tts)
  PDF2STORY_TTS_VOICE         Speech voice (default onyx)
  SUPABASE_URL                Supabase project URL (with --supabase)
  SUPABASE_SERVICE_ROLE_KEY   Supabase service key (with --supabase)
  SUPABASE_BUCKET             Bucket name (default comic-results; SUPABASE_BUCKET_NAME also read)
  PDFIUM_LIB_PATH             Path to libpdfium
"#;

/// Turn a comic PDF into a narrated audio story.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2story",
    version,
    about = "Turn a comic PDF into a narrated, timed audio story",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Story name; also names the storage folder.
    #[arg(long, env = "PDF2STORY_NAME")]
    name: String,

    /// Genre passed to the narrator as context.
    #[arg(long, env = "PDF2STORY_GENRE", default_value = "action")]
    genre: String,

    /// Job id appended (first 8 chars) to the storage folder.
    #[arg(long, env = "PDF2STORY_JOB_ID")]
    job_id: Option<String>,

    /// Write assets under this directory.
    #[arg(long, env = "PDF2STORY_OUT_DIR", conflicts_with = "supabase")]
    out_dir: Option<PathBuf>,

    /// Upload assets to Supabase Storage (SUPABASE_* env vars).
    #[arg(long, env = "PDF2STORY_SUPABASE")]
    supabase: bool,

    /// Vision model ID (e.g. gpt-4.1-nano, gpt-4.1-mini).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// Vision provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Rendering DPI (72–400).
    #[arg(long, env = "PDF2STORY_DPI", default_value_t = 120,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Panels sent to the narrator in one request.
    #[arg(long, env = "PDF2STORY_IMAGE_CAP", default_value_t = 15)]
    image_cap: usize,

    /// Maximum panels per job.
    #[arg(long, env = "PDF2STORY_MAX_PANELS", default_value_t = 50)]
    max_panels: usize,

    /// Transcribe speech bubbles before narrating.
    #[arg(long, env = "PDF2STORY_TRANSCRIBE")]
    transcribe: bool,

    /// Output sample rate in Hz.
    #[arg(long, env = "PDF2STORY_SAMPLE_RATE", default_value_t = 24_000)]
    sample_rate: u32,

    /// Keep synthesized clips under this directory between runs.
    #[arg(long, env = "PDF2STORY_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF2STORY_PASSWORD")]
    password: Option<String>,

    /// Skip uploading result.json.
    #[arg(long, env = "PDF2STORY_NO_MANIFEST")]
    no_manifest: bool,

    /// Output the full result as JSON.
    #[arg(long, env = "PDF2STORY_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF2STORY_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2STORY_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2STORY_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDF2STORY_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config + collaborators ─────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn StoryProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    let store: Arc<dyn ObjectStore> = match (&cli.out_dir, cli.supabase) {
        (_, true) => Arc::new(SupabaseStore::from_env().context("Supabase storage")?),
        (Some(dir), false) => Arc::new(LocalStore::new(dir)),
        (None, false) => Arc::new(LocalStore::new("pdf2story-out")),
    };
    let cache: Arc<dyn ClipCache> = match cli.cache_dir {
        Some(ref dir) => Arc::new(DiskCache::new(dir)),
        None => Arc::new(MemoryCache::new()),
    };
    let parts = Collaborators::from_env(&config, store)
        .context("Failed to configure providers")?
        .with_cache(cache);
    let pipeline = StoryPipeline::new(config, parts);

    // ── Run ──────────────────────────────────────────────────────────────
    let mut request = StoryRequest::new(&cli.name, &cli.genre);
    if let Some(ref id) = cli.job_id {
        request = request.with_job_id(id);
    }
    let story = pipeline
        .run_input(&cli.input, &request)
        .await
        .context("Story generation failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&story).context("Failed to serialise output")?;
        println!("{json}");
    } else if !cli.quiet {
        for (panel, start, duration) in story.timing_table() {
            println!("panel {panel:>3}  start {start:>8.2}s  duration {duration:>6.2}s");
        }
        println!("audio  {}", story.audio_url);
        eprintln!(
            "{}  {} panels ({} described, {} silent)  {:.1}s audio  {}ms",
            green("✔"),
            story.stats.panels,
            story.stats.described_scenes,
            story.stats.silent_scenes,
            story.total_duration,
            story.stats.total_duration_ms,
        );
    }
    Ok(())
}

/// Map CLI args to `StoryConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<StoryConfig> {
    let mut builder = StoryConfig::builder()
        .dpi(cli.dpi)
        .narration_image_cap(cli.image_cap)
        .max_panels(cli.max_panels)
        .transcribe_panels(cli.transcribe)
        .sample_rate(cli.sample_rate)
        .upload_manifest(!cli.no_manifest)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    builder.build().context("Invalid configuration")
}
