//! Result types returned by [`crate::story::StoryPipeline::run`].

use crate::model::Scene;
use serde::{Deserialize, Serialize};

/// The finished story: where the assets live and when each panel plays.
///
/// Serialises to the JSON manifest uploaded as `{folder}/result.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryOutput {
    pub name: String,
    /// Public URL per panel, in panel-index order.
    pub image_urls: Vec<String>,
    pub audio_url: String,
    /// Exactly one timed scene per panel, in panel-index order.
    pub scenes: Vec<Scene>,
    /// Seconds; equals `last.start_time + last.duration`.
    pub total_duration: f64,
    /// Teaser narration returned alongside the scene list, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_narration: Option<String>,
    pub stats: StoryStats,
}

/// Statistics for a single run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoryStats {
    /// Pages rasterised.
    pub pages: usize,
    /// Panels extracted (== scenes).
    pub panels: usize,
    /// Scenes covered by the narration proposal.
    pub proposed_scenes: usize,
    /// Scenes filled by the describe fallback.
    pub described_scenes: usize,
    /// Scenes that play as silence.
    pub silent_scenes: usize,
    pub extract_duration_ms: u64,
    pub narrate_duration_ms: u64,
    pub synth_duration_ms: u64,
    pub upload_duration_ms: u64,
    pub total_duration_ms: u64,
}

impl StoryOutput {
    /// Scene timing as `(panel_index, start, duration)`, rounded to
    /// centiseconds for display.
    pub fn timing_table(&self) -> Vec<(usize, f64, f64)> {
        self.scenes
            .iter()
            .map(|s| (s.panel_index, round2(s.start_time), round2(s.duration)))
            .collect()
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_json_shape() {
        let mut scene = Scene::builder(0).narration("Once upon a time").build();
        scene.duration = 1.234_567;
        let out = StoryOutput {
            name: "demo".into(),
            image_urls: vec!["file:///tmp/demo/images/page_00.jpg".into()],
            audio_url: "file:///tmp/demo/audio/master_audio.wav".into(),
            total_duration: scene.duration,
            scenes: vec![scene],
            full_narration: None,
            stats: StoryStats::default(),
        };
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["scenes"][0]["narration_text"], "Once upon a time");
        assert!(json.get("full_narration").is_none());
        assert_eq!(out.timing_table(), vec![(0, 0.0, 1.23)]);
    }
}
