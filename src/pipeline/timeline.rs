//! TimelineAssembler: synthesize every scene in order and time it.
//!
//! Synthesis is prefetched up to `synthesis_prefetch` scenes ahead, but
//! `buffered` yields clips in scene order, so the cumulative timeline is
//! always applied in panel-index order. Positions are accumulated in sample
//! frames and converted to seconds per scene, which keeps
//! `total_duration == Σ duration == last.start_time + last.duration`.

use crate::error::StoryError;
use crate::model::{AudioClip, Scene};
use crate::pipeline::audio;
use crate::pipeline::synth::NarrationSynthesizer;
use crate::progress::ProgressCallback;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The merged track plus the timed scenes.
#[derive(Debug, Clone)]
pub struct Timeline {
    /// 16-bit mono WAV.
    pub audio: Vec<u8>,
    pub sample_rate: u32,
    pub scenes: Vec<Scene>,
    pub total_duration: f64,
}

pub struct TimelineAssembler {
    synth: Arc<NarrationSynthesizer>,
    prefetch: usize,
    progress: Option<ProgressCallback>,
}

impl TimelineAssembler {
    pub fn new(synth: Arc<NarrationSynthesizer>, prefetch: usize) -> Self {
        Self {
            synth,
            prefetch: prefetch.max(1),
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: Option<ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    pub async fn assemble(&self, mut scenes: Vec<Scene>) -> Result<Timeline, StoryError> {
        if scenes.is_empty() {
            return Err(StoryError::NoScenes);
        }
        let rate = self.synth.sample_rate();
        let total = scenes.len();
        let texts: Vec<String> = scenes.iter().map(|s| s.narration_text.clone()).collect();

        let synth = &self.synth;
        let mut clips = stream::iter(texts)
            .map(|text| async move { synth.synthesize(&text).await })
            .buffered(self.prefetch);

        let mut track: Vec<i16> = Vec::new();
        let mut cursor: u64 = 0;

        for scene in scenes.iter_mut() {
            let clip = match clips.next().await {
                Some(clip) => clip,
                None => {
                    return Err(StoryError::Internal(
                        "synthesis stream ended early".to_string(),
                    ))
                }
            };
            let samples = clip_samples(&clip, rate, scene.panel_index);
            let frames = samples.len() as u64;
            track.extend_from_slice(&samples);

            scene.start_time = cursor as f64 / rate as f64;
            scene.duration = frames as f64 / rate as f64;
            cursor += frames;

            debug!(
                "Scene {} at {:.2}s for {:.2}s",
                scene.panel_index, scene.start_time, scene.duration
            );
            if let Some(ref cb) = self.progress {
                cb.on_scene_timed(scene.panel_index, total, scene.duration);
            }
        }

        let total_duration = cursor as f64 / rate as f64;
        let audio = tokio::task::spawn_blocking(move || audio::encode_wav_i16(&track, rate))
            .await
            .map_err(|e| StoryError::Internal(format!("track encode task: {e}")))?
            .map_err(|e| StoryError::AudioEncodeFailed(e.to_string()))?;

        info!(
            "Timeline: {} scenes, {:.2}s, {} bytes",
            total,
            total_duration,
            audio.len()
        );
        Ok(Timeline {
            audio,
            sample_rate: rate,
            scenes,
            total_duration,
        })
    }
}

/// PCM of `clip`, or silence of its measured length when it cannot be read.
fn clip_samples(clip: &AudioClip, rate: u32, panel_index: usize) -> Vec<i16> {
    match audio::read_wav(&clip.bytes, rate) {
        Ok(samples) => samples,
        Err(e) => {
            warn!(
                "Scene {} clip unreadable ({}), substituting {:.2}s of silence",
                panel_index,
                e,
                clip.duration_secs()
            );
            vec![0; clip.frames as usize]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreadable_clip_becomes_silence_of_same_length() {
        let clip = AudioClip {
            bytes: b"not a wav".to_vec(),
            sample_rate: 24_000,
            frames: 1200,
        };
        let s = clip_samples(&clip, 24_000, 0);
        assert_eq!(s.len(), 1200);
        assert!(s.iter().all(|&v| v == 0));
    }

    #[test]
    fn readable_clip_keeps_samples() {
        let clip = audio::silence_clip(0.5, 16_000).unwrap();
        assert_eq!(clip_samples(&clip, 16_000, 0).len(), 8000);
    }
}
