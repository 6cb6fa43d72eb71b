//! Progress-callback trait for story pipeline events.
//!
//! Inject an [`Arc<dyn StoryProgressCallback>`] via
//! [`crate::config::StoryConfigBuilder::progress_callback`] to receive events
//! as the job moves through extraction, narration, timing and upload.
//!
//! # Example
//!
//! ```rust
//! use pdf2story::{StoryConfig, StoryProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     timed: AtomicUsize,
//! }
//!
//! impl StoryProgressCallback for CountingCallback {
//!     fn on_scene_timed(&self, panel_index: usize, total_scenes: usize, duration: f64) {
//!         self.timed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Scene {}/{} → {:.2}s", panel_index + 1, total_scenes, duration);
//!     }
//! }
//!
//! let cb = Arc::new(CountingCallback { timed: AtomicUsize::new(0) });
//! let config = StoryConfig::builder()
//!     .progress_callback(cb as Arc<dyn StoryProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the story pipeline as it progresses.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Describe and upload events can arrive concurrently
/// from different tasks.
pub trait StoryProgressCallback: Send + Sync {
    /// Called once before the PDF is rasterised.
    fn on_story_start(&self, name: &str) {
        let _ = name;
    }

    /// Called after extraction with the page and panel counts.
    fn on_panels_extracted(&self, pages: usize, panels: usize) {
        let _ = (pages, panels);
    }

    /// Called after reconciliation.
    ///
    /// # Arguments
    /// * `scenes`    — total scenes (== panels)
    /// * `described` — how many needed the describe fallback
    fn on_scenes_reconciled(&self, scenes: usize, described: usize) {
        let _ = (scenes, described);
    }

    /// Called once per scene, in panel order, when its audio is measured.
    fn on_scene_timed(&self, panel_index: usize, total_scenes: usize, duration: f64) {
        let _ = (panel_index, total_scenes, duration);
    }

    /// Called after each successful upload.
    fn on_upload_complete(&self, path: &str) {
        let _ = path;
    }

    /// Called once when the story is assembled and uploaded.
    fn on_story_complete(&self, total_scenes: usize, total_duration: f64) {
        let _ = (total_scenes, total_duration);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl StoryProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::StoryConfig`].
pub type ProgressCallback = Arc<dyn StoryProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TrackingCallback {
        timed: AtomicUsize,
        uploads: Mutex<Vec<String>>,
        finished_with: AtomicUsize,
    }

    impl StoryProgressCallback for TrackingCallback {
        fn on_scene_timed(&self, _panel_index: usize, _total: usize, _duration: f64) {
            self.timed.fetch_add(1, Ordering::SeqCst);
        }

        fn on_upload_complete(&self, path: &str) {
            self.uploads.lock().unwrap().push(path.to_string());
        }

        fn on_story_complete(&self, total_scenes: usize, _total_duration: f64) {
            self.finished_with.store(total_scenes, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_story_start("demo");
        cb.on_panels_extracted(2, 5);
        cb.on_scenes_reconciled(5, 3);
        cb.on_scene_timed(0, 5, 1.5);
        cb.on_upload_complete("demo/audio/master_audio.wav");
        cb.on_story_complete(5, 9.0);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        for i in 0..3 {
            tracker.on_scene_timed(i, 3, 1.0);
        }
        tracker.on_upload_complete("a/images/page_00.jpg");
        tracker.on_story_complete(3, 3.0);

        assert_eq!(tracker.timed.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.uploads.lock().unwrap().len(), 1);
        assert_eq!(tracker.finished_with.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_panels_extracted(1, 1);
    }
}
