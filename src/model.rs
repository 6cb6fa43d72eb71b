//! Core data types flowing between the pipeline stages.
//!
//! ```text
//! Page ──segment──▶ Panel ──propose──▶ RawScene ──reconcile──▶ Scene ──time──▶ Scene (timed)
//!                                                               │
//!                                                    AudioClip ◀┘ synthesize
//! ```

use image::DynamicImage;
use serde::{Deserialize, Deserializer, Serialize};

/// Animation hint used when the generative service gives none.
pub const DEFAULT_ANIMATION_HINT: &str = "zoom_pan";

/// Provisional duration of a scene proposed by the generative service.
pub const DEFAULT_SCENE_SECS: f64 = 3.0;

/// Provisional duration of a scene filled by the describe fallback.
pub const FALLBACK_SCENE_SECS: f64 = 4.0;

// ── Pages & panels ───────────────────────────────────────────────────────

/// One rasterised PDF page.
#[derive(Debug, Clone)]
pub struct Page {
    /// 0-based page ordinal in the document.
    pub index: usize,
    pub image: DynamicImage,
}

impl Page {
    pub fn new(index: usize, image: DynamicImage) -> Self {
        Self { index, image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Axis-aligned rectangle in source-page pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    /// The box covering a whole `width × height` page.
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn area(&self) -> u64 {
        self.w as u64 * self.h as u64
    }
}

/// One visual unit of the story.
///
/// `index` is global and dense: panels of page 0 come first (top to bottom),
/// then page 1, and so on.
#[derive(Debug, Clone)]
pub struct Panel {
    pub index: usize,
    pub page_index: usize,
    pub image: DynamicImage,
    pub bounding_box: BoundingBox,
}

// ── Scenes ───────────────────────────────────────────────────────────────

/// One narration entry as proposed by the generative service.
///
/// Field names accept both our own spelling and the keys the narration
/// prompt asks the model to emit (`image_page_index`, `narration_segment`,
/// `animation_type`). Malformed values degrade to `None`/empty instead of
/// rejecting the whole proposal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawScene {
    #[serde(default, alias = "image_page_index", deserialize_with = "lenient_index")]
    pub panel_index: Option<usize>,

    #[serde(default, alias = "narration_segment", deserialize_with = "lenient_text")]
    pub narration: String,

    #[serde(default, alias = "animation_type", deserialize_with = "lenient_opt_text")]
    pub animation_hint: Option<String>,

    #[serde(default, deserialize_with = "lenient_secs")]
    pub duration: Option<f64>,
}

impl RawScene {
    pub fn new(narration: impl Into<String>) -> Self {
        Self {
            narration: narration.into(),
            ..Default::default()
        }
    }
}

fn lenient_index<'de, D: Deserializer<'de>>(d: D) -> Result<Option<usize>, D::Error> {
    let v = serde_json::Value::deserialize(d)?;
    Ok(match v {
        serde_json::Value::Number(n) => n.as_u64().map(|n| n as usize),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(lenient_opt_text(d)?.unwrap_or_default())
}

fn lenient_opt_text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    let v = serde_json::Value::deserialize(d)?;
    Ok(match v {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_secs<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    let v = serde_json::Value::deserialize(d)?;
    Ok(match v {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// A narrated, (eventually) timed panel.
///
/// Before [`crate::pipeline::timeline::TimelineAssembler`] runs, `duration`
/// is provisional and `start_time` is `0.0`. Afterwards both come from the
/// measured audio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub panel_index: usize,
    /// Empty means the scene plays as silence.
    pub narration_text: String,
    pub animation_hint: String,
    pub start_time: f64,
    pub duration: f64,
    /// Narration came from the describe fallback rather than the proposal.
    #[serde(default, skip_serializing)]
    pub described: bool,
}

impl Scene {
    pub fn builder(panel_index: usize) -> SceneBuilder {
        SceneBuilder {
            panel_index,
            narration_text: String::new(),
            animation_hint: None,
            duration: None,
            described: false,
        }
    }

    pub fn is_silent(&self) -> bool {
        self.narration_text.trim().is_empty()
    }
}

/// Builds a [`Scene`], filling every missing attribute with its default.
#[derive(Debug, Clone)]
pub struct SceneBuilder {
    panel_index: usize,
    narration_text: String,
    animation_hint: Option<String>,
    duration: Option<f64>,
    described: bool,
}

impl SceneBuilder {
    pub fn narration(mut self, text: impl Into<String>) -> Self {
        self.narration_text = text.into();
        self
    }

    pub fn animation_hint(mut self, hint: Option<String>) -> Self {
        self.animation_hint = hint;
        self
    }

    pub fn duration(mut self, secs: Option<f64>) -> Self {
        self.duration = secs;
        self
    }

    /// Mark the scene as filled by the describe fallback. Changes the
    /// default provisional duration.
    pub fn described(mut self, v: bool) -> Self {
        self.described = v;
        self
    }

    pub fn build(self) -> Scene {
        let default_secs = if self.described {
            FALLBACK_SCENE_SECS
        } else {
            DEFAULT_SCENE_SECS
        };
        let duration = self
            .duration
            .filter(|d| d.is_finite() && *d > 0.0)
            .unwrap_or(default_secs);
        let animation_hint = self
            .animation_hint
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| DEFAULT_ANIMATION_HINT.to_string());

        Scene {
            panel_index: self.panel_index,
            narration_text: self.narration_text,
            animation_hint,
            start_time: 0.0,
            duration,
            described: self.described,
        }
    }
}

// ── Audio ────────────────────────────────────────────────────────────────

/// Encoded speech plus its measured length.
///
/// `bytes` is a 16-bit mono WAV at `sample_rate`; `frames` was measured by
/// decoding, never estimated from text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    pub bytes: Vec<u8>,
    pub sample_rate: u32,
    pub frames: u64,
}

impl AudioClip {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames as f64 / self.sample_rate as f64
    }
}
