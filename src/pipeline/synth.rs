//! NarrationSynthesizer: narration text → playable [`AudioClip`].
//!
//! `synthesize` never fails. The worst case is a clip of silence:
//!
//! | Input / outcome                     | Result                                  |
//! |-------------------------------------|-----------------------------------------|
//! | empty or whitespace                 | `empty_narration_silence_secs` silence  |
//! | valid cache entry                   | cached clip, no backend call            |
//! | some chunks synthesised             | those chunks concatenated, not cached   |
//! | every chunk failed all retries      | `failed_synthesis_silence_secs` silence |
//!
//! Backend output is decoded, downmixed and resampled so the duration is
//! always measured from PCM frames.
//!
//! Concurrent calls for the same normalised text are serialised on a
//! per-key lock, so the second caller finds the first caller's clip in the
//! cache instead of making its own backend call.

use crate::config::StoryConfig;
use crate::error::ProviderError;
use crate::model::AudioClip;
use crate::pipeline::audio::{self, AudioError};
use crate::pipeline::cache::{cache_key, ClipCache};
use crate::pipeline::speech::SpeechBackend;
use crate::retry::RetryPolicy;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Synthesis knobs, taken from [`StoryConfig`].
#[derive(Debug, Clone)]
pub struct SynthOptions {
    pub sample_rate: u32,
    pub empty_silence_secs: f64,
    pub failed_silence_secs: f64,
    pub chunk_chars: usize,
    pub min_audio_bytes: usize,
    pub min_clip_secs: f64,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl From<&StoryConfig> for SynthOptions {
    fn from(c: &StoryConfig) -> Self {
        Self {
            sample_rate: c.sample_rate,
            empty_silence_secs: c.empty_narration_silence_secs,
            failed_silence_secs: c.failed_synthesis_silence_secs,
            chunk_chars: c.speech_chunk_chars,
            min_audio_bytes: c.min_audio_bytes,
            min_clip_secs: c.min_clip_secs,
            timeout: Duration::from_secs(c.speech_timeout_secs.max(1)),
            retry: c.speech_retry,
        }
    }
}

/// Decoded audio of one chunk plus the size of the raw response.
struct ChunkAudio {
    raw_len: usize,
    samples: Vec<f32>,
}

/// Concatenated chunks; `complete` is false when any chunk was skipped.
struct Synthesized {
    clip: AudioClip,
    complete: bool,
}

pub struct NarrationSynthesizer {
    backend: Arc<dyn SpeechBackend>,
    cache: Arc<dyn ClipCache>,
    opts: SynthOptions,
    in_flight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl NarrationSynthesizer {
    pub fn new(
        backend: Arc<dyn SpeechBackend>,
        cache: Arc<dyn ClipCache>,
        opts: SynthOptions,
    ) -> Self {
        Self {
            backend,
            cache,
            opts,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.opts.sample_rate
    }

    /// Turn narration into audio. Always returns a playable clip.
    pub async fn synthesize(&self, text: &str) -> AudioClip {
        let spoken = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if spoken.is_empty() {
            return self.silence(self.opts.empty_silence_secs);
        }

        let key = cache_key(&spoken);
        let lock = self.key_lock(&key).await;
        let clip = {
            let _guard = lock.lock().await;
            self.synthesize_keyed(&key, &spoken).await
        };
        self.release_key(&key, lock).await;
        clip
    }

    async fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut in_flight = self.in_flight.lock().await;
        Arc::clone(in_flight.entry(key.to_string()).or_default())
    }

    /// Drop the key's lock from the map once no other caller holds it.
    async fn release_key(&self, key: &str, lock: Arc<Mutex<()>>) {
        let mut in_flight = self.in_flight.lock().await;
        // The map and `lock` itself.
        if Arc::strong_count(&lock) <= 2 {
            in_flight.remove(key);
        }
    }

    async fn synthesize_keyed(&self, key: &str, spoken: &str) -> AudioClip {
        // ── Cache ────────────────────────────────────────────────────────
        if let Some(bytes) = self.cache.get(key).await {
            match self.validate_cached(bytes).await {
                Some(clip) => {
                    debug!("Cache hit {} ({:.2}s)", &key[..12], clip.duration_secs());
                    return clip;
                }
                None => {
                    warn!("Cached clip {} is corrupt, evicting", &key[..12]);
                    self.cache.evict(key).await;
                }
            }
        }

        // ── Chunked synthesis ────────────────────────────────────────────
        match self.synthesize_chunks(spoken).await {
            Some(Synthesized {
                clip,
                complete: true,
            }) => {
                self.cache.put(key, &clip.bytes).await;
                clip
            }
            Some(Synthesized { clip, .. }) => {
                warn!("Clip {} is missing chunks, not caching", &key[..12]);
                clip
            }
            None => {
                warn!(
                    "Synthesis failed for {} chars, using {:.1}s of silence",
                    spoken.chars().count(),
                    self.opts.failed_silence_secs
                );
                self.silence(self.opts.failed_silence_secs)
            }
        }
    }

    async fn synthesize_chunks(&self, spoken: &str) -> Option<Synthesized> {
        let budget = self.backend.max_chars().min(self.opts.chunk_chars).max(1);
        let chunks = split_into_chunks(spoken, budget);
        let total = chunks.len();
        let min_frames = audio::frames_for(self.opts.min_clip_secs, self.opts.sample_rate);

        let mut merged: Vec<f32> = Vec::new();
        let mut ok_chunks = 0usize;

        for (i, chunk) in chunks.iter().enumerate() {
            let label = format!("Speech chunk {}/{}", i + 1, total);
            let result = self
                .opts
                .retry
                .run_validated(
                    &label,
                    |_| self.synthesize_once(chunk),
                    |a: &ChunkAudio| {
                        a.raw_len < self.opts.min_audio_bytes || (a.samples.len() as u64) < min_frames
                    },
                )
                .await;

            match result {
                Ok(a) => {
                    merged.extend(a.samples);
                    ok_chunks += 1;
                }
                Err(e) => warn!("{} skipped: {}", label, e),
            }
        }

        if ok_chunks == 0 {
            return None;
        }

        let frames = merged.len() as u64;
        let bytes = match audio::encode_wav(&merged, self.opts.sample_rate) {
            Ok(b) => b,
            Err(e) => {
                warn!("Failed to encode synthesized clip: {}", e);
                return None;
            }
        };
        info!(
            "Synthesized {}/{} chunks → {:.2}s",
            ok_chunks,
            total,
            frames as f64 / self.opts.sample_rate as f64
        );
        Some(Synthesized {
            clip: AudioClip {
                bytes,
                sample_rate: self.opts.sample_rate,
                frames,
            },
            complete: ok_chunks == total,
        })
    }

    /// One backend call, bounded by the timeout, decoded to the track rate.
    async fn synthesize_once(&self, chunk: &str) -> Result<ChunkAudio, ProviderError> {
        let raw = tokio::time::timeout(self.opts.timeout, self.backend.synthesize(chunk))
            .await
            .map_err(|_| ProviderError::Timeout {
                secs: self.opts.timeout.as_secs(),
            })??;

        let raw_len = raw.len();
        let rate = self.opts.sample_rate;
        let samples = tokio::task::spawn_blocking(move || decode_resampled(&raw, rate))
            .await
            .map_err(|e| ProviderError::Decode(format!("decode task panicked: {e}")))?
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        Ok(ChunkAudio { raw_len, samples })
    }

    async fn validate_cached(&self, bytes: Vec<u8>) -> Option<AudioClip> {
        if bytes.len() < self.opts.min_audio_bytes {
            return None;
        }
        let rate = self.opts.sample_rate;
        let clip = tokio::task::spawn_blocking(move || audio::normalize_clip(&bytes, rate))
            .await
            .ok()?
            .ok()?;
        (clip.duration_secs() >= self.opts.min_clip_secs).then_some(clip)
    }

    fn silence(&self, secs: f64) -> AudioClip {
        let rate = self.opts.sample_rate;
        audio::silence_clip(secs, rate).unwrap_or_else(|e| {
            warn!("Failed to encode silence: {}", e);
            AudioClip {
                bytes: Vec::new(),
                sample_rate: rate,
                frames: audio::frames_for(secs, rate),
            }
        })
    }
}

fn decode_resampled(raw: &[u8], rate: u32) -> Result<Vec<f32>, AudioError> {
    let pcm = audio::decode_to_mono(raw)?;
    audio::resample(&pcm.samples, pcm.sample_rate, rate)
}

/// Split text at word boundaries into chunks of at most `max_chars`
/// characters. A single word longer than the budget is hard-split.
pub fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let max = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();

        if word_len > max {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let chars: Vec<char> = word.chars().collect();
            chunks.extend(chars.chunks(max).map(|c| c.iter().collect::<String>()));
            continue;
        }

        let needed = if current.is_empty() {
            word_len
        } else {
            current_len + 1 + word_len
        };
        if needed > max {
            chunks.push(std::mem::take(&mut current));
            current.push_str(word);
            current_len = word_len;
        } else {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
            current_len = needed;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::cache::{MemoryCache, NoCache};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Speaks `frames_per_char` frames of tone per character, at 16 kHz so
    /// every clip goes through the resampler.
    struct ToneSpeech {
        calls: AtomicUsize,
        inputs: Mutex<Vec<String>>,
        max_chars: usize,
        fail_first: usize,
        /// Fails this exact chunk the given number of times.
        fail_chunk: Option<(&'static str, usize)>,
        chunk_failures: AtomicUsize,
    }

    impl ToneSpeech {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                inputs: Mutex::new(Vec::new()),
                max_chars: 4096,
                fail_first: 0,
                fail_chunk: None,
                chunk_failures: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SpeechBackend for ToneSpeech {
        fn name(&self) -> &str {
            "tone"
        }

        fn max_chars(&self) -> usize {
            self.max_chars
        }

        async fn synthesize(&self, text: &str) -> Result<Vec<u8>, ProviderError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            self.inputs.lock().unwrap().push(text.to_string());
            let chunk_fails = match self.fail_chunk {
                Some((chunk, times)) if chunk == text => {
                    self.chunk_failures.fetch_add(1, Ordering::SeqCst) < times
                }
                _ => false,
            };
            if n < self.fail_first || chunk_fails {
                return Err(ProviderError::Status {
                    status: 503,
                    body: "busy".into(),
                });
            }
            // 0.5 s at 16 kHz per chunk.
            let samples: Vec<f32> = (0..8000).map(|i| ((i % 40) as f32 / 40.0) - 0.5).collect();
            Ok(audio::encode_wav(&samples, 16_000).unwrap())
        }
    }

    fn opts() -> SynthOptions {
        SynthOptions::from(
            &StoryConfig::builder()
                .speech_retry(RetryPolicy::new(3, 0))
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn chunks_respect_budget() {
        let chunks = split_into_chunks("aa bb cc dd", 5);
        assert_eq!(chunks, vec!["aa bb", "cc dd"]);
        assert!(chunks.iter().all(|c| c.chars().count() <= 5));
    }

    #[test]
    fn long_word_is_hard_split() {
        let chunks = split_into_chunks("hi abcdefghij yo", 4);
        assert_eq!(chunks, vec!["hi", "abcd", "efgh", "ij", "yo"]);
    }

    #[test]
    fn empty_text_has_no_chunks() {
        assert!(split_into_chunks("   ", 10).is_empty());
    }

    #[tokio::test]
    async fn empty_text_is_silence_without_backend_call() {
        let backend = Arc::new(ToneSpeech::new());
        let s = NarrationSynthesizer::new(backend.clone(), Arc::new(NoCache), opts());
        let clip = s.synthesize(" \n\t ").await;
        assert!((clip.duration_secs() - 2.0).abs() < 1e-9);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn measured_duration_after_resampling() {
        let backend = Arc::new(ToneSpeech::new());
        let s = NarrationSynthesizer::new(backend, Arc::new(NoCache), opts());
        let clip = s.synthesize("Hello there").await;
        assert_eq!(clip.sample_rate, 24_000);
        assert_eq!(clip.frames, 12_000);
    }

    #[tokio::test]
    async fn second_call_hits_cache() {
        let backend = Arc::new(ToneSpeech::new());
        let cache = Arc::new(MemoryCache::new());
        let s = NarrationSynthesizer::new(backend.clone(), cache.clone(), opts());
        let a = s.synthesize("The hero   rises").await;
        let b = s.synthesize("the HERO rises").await;
        assert_eq!(a.frames, b.frames);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.hits(), 1);
    }

    #[tokio::test]
    async fn corrupt_cache_entry_is_evicted_and_resynthesized() {
        let backend = Arc::new(ToneSpeech::new());
        let cache = Arc::new(MemoryCache::new());
        cache.put(&cache_key("boom"), &[0u8; 16]).await;
        let s = NarrationSynthesizer::new(backend.clone(), cache.clone(), opts());
        let clip = s.synthesize("boom").await;
        assert_eq!(clip.frames, 12_000);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let backend = Arc::new(ToneSpeech {
            fail_first: 2,
            ..ToneSpeech::new()
        });
        let s = NarrationSynthesizer::new(backend.clone(), Arc::new(NoCache), opts());
        let clip = s.synthesize("again").await;
        assert_eq!(clip.frames, 12_000);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn total_failure_is_uncached_silence() {
        let backend = Arc::new(ToneSpeech {
            fail_first: usize::MAX,
            ..ToneSpeech::new()
        });
        let cache = Arc::new(MemoryCache::new());
        let s = NarrationSynthesizer::new(backend.clone(), cache.clone(), opts());
        let clip = s.synthesize("nobody home").await;
        assert!((clip.duration_secs() - 1.0).abs() < 1e-9);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn long_text_is_chunked_and_concatenated() {
        let backend = Arc::new(ToneSpeech {
            max_chars: 10,
            ..ToneSpeech::new()
        });
        let s = NarrationSynthesizer::new(backend.clone(), Arc::new(NoCache), opts());
        let clip = s.synthesize("one two three four five").await;
        let inputs = backend.inputs.lock().unwrap().clone();
        assert_eq!(inputs, vec!["one two", "three four", "five"]);
        assert_eq!(clip.frames, 3 * 12_000);
    }

    #[tokio::test]
    async fn clip_with_skipped_chunk_is_not_cached() {
        let backend = Arc::new(ToneSpeech {
            max_chars: 10,
            fail_chunk: Some(("three four", 3)),
            ..ToneSpeech::new()
        });
        let cache = Arc::new(MemoryCache::new());
        let s = NarrationSynthesizer::new(backend.clone(), cache.clone(), opts());

        let first = s.synthesize("one two three four five").await;
        assert_eq!(first.frames, 2 * 12_000);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 5);
        assert!(cache.is_empty().await);

        let second = s.synthesize("one two three four five").await;
        assert_eq!(second.frames, 3 * 12_000);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 8);

        let third = s.synthesize("one two three four five").await;
        assert_eq!(third.frames, 3 * 12_000);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 8);
    }

    #[tokio::test]
    async fn concurrent_identical_text_makes_one_call() {
        let backend = Arc::new(ToneSpeech::new());
        let cache = Arc::new(MemoryCache::new());
        let s = NarrationSynthesizer::new(backend.clone(), cache.clone(), opts());
        let (a, b) = tokio::join!(s.synthesize("Silence falls."), s.synthesize("silence   FALLS."));
        assert_eq!(a.frames, b.frames);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.hits(), 1);
        assert!(s.in_flight.lock().await.is_empty());
    }
}
