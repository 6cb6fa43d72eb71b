//! Align a partial narration proposal to the exact panel count.
//!
//! After [`SceneReconciler::reconcile`] returns, `scenes.len() == panels` and
//! `scenes[i].panel_index == i` for every `i`, no matter how many scenes the
//! proposal contained.

use crate::model::{RawScene, Scene};
use crate::pipeline::describe::Describer;
use crate::pipeline::text::clean_narration;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Reconciled scenes plus where their narration came from.
#[derive(Debug, Clone)]
pub struct Reconciled {
    pub scenes: Vec<Scene>,
    /// Scenes taken from the proposal.
    pub proposed: usize,
    /// Scenes filled by the describe fallback (including failed ones).
    pub described: usize,
}

pub struct SceneReconciler {
    describer: Arc<dyn Describer>,
    concurrency: usize,
}

impl SceneReconciler {
    pub fn new(describer: Arc<dyn Describer>, concurrency: usize) -> Self {
        Self {
            describer,
            concurrency: concurrency.max(1),
        }
    }

    /// Complete `raw` to one scene per entry of `panel_images` (JPEG bytes).
    pub async fn reconcile(&self, panel_images: &[Vec<u8>], raw: Vec<RawScene>) -> Reconciled {
        self.reconcile_with_text(panel_images, raw, &[]).await
    }

    /// Like [`reconcile`](Self::reconcile); fallback scenes additionally get
    /// the panel's transcript (if any) appended to the description.
    pub async fn reconcile_with_text(
        &self,
        panel_images: &[Vec<u8>],
        mut raw: Vec<RawScene>,
        transcripts: &[String],
    ) -> Reconciled {
        let total = panel_images.len();
        if raw.len() > total {
            warn!(
                "Dropping {} proposed scenes beyond the {} panels",
                raw.len() - total,
                total
            );
            raw.truncate(total);
        }
        let proposed = raw.len();

        let mut scenes = Vec::with_capacity(total);
        for (i, r) in raw.into_iter().enumerate() {
            if let Some(reported) = r.panel_index.filter(|&p| p != i) {
                warn!("Scene {} reported panel {}, rebinding to {}", i, reported, i);
            }
            scenes.push(
                Scene::builder(i)
                    .narration(clean_narration(&r.narration))
                    .animation_hint(r.animation_hint)
                    .duration(r.duration)
                    .build(),
            );
        }

        let missing: Vec<usize> = (proposed..total).collect();
        if !missing.is_empty() {
            info!(
                "Describing {} panels not covered by the proposal (concurrency {})",
                missing.len(),
                self.concurrency
            );
        }

        let mut slots: Vec<Option<String>> = vec![None; missing.len()];
        let mut results = stream::iter(missing.iter().copied().enumerate())
            .map(|(slot, panel)| {
                let describer = Arc::clone(&self.describer);
                let jpeg = &panel_images[panel];
                async move {
                    let text = match describer.describe(jpeg).await {
                        Ok(text) => clean_narration(&text),
                        Err(e) => {
                            warn!("Describe failed for panel {}: {}", panel, e);
                            String::new()
                        }
                    };
                    (slot, text)
                }
            })
            .buffer_unordered(self.concurrency);

        while let Some((slot, text)) = results.next().await {
            slots[slot] = Some(text);
        }

        for (panel, description) in missing.iter().copied().zip(slots) {
            let transcript = transcripts.get(panel).map(String::as_str).unwrap_or("");
            let narration = format!("{} {}", description.unwrap_or_default(), transcript.trim())
                .trim()
                .to_string();
            debug!("Panel {} fallback narration: {:?}", panel, narration);
            scenes.push(Scene::builder(panel).narration(narration).described(true).build());
        }

        Reconciled {
            scenes,
            proposed,
            described: missing.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Echoes the first JPEG byte, failing for byte 0xFF.
    struct ByteDescriber {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Describer for ByteDescriber {
        async fn describe(&self, jpeg: &[u8]) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match jpeg.first() {
                Some(0xFF) => Err(ProviderError::Request("connection reset".into())),
                Some(b) => Ok(format!("panel {b}")),
                None => Ok(String::new()),
            }
        }
    }

    fn reconciler() -> (SceneReconciler, Arc<ByteDescriber>) {
        let d = Arc::new(ByteDescriber {
            calls: AtomicUsize::new(0),
        });
        (SceneReconciler::new(d.clone(), 2), d)
    }

    fn images(n: u8) -> Vec<Vec<u8>> {
        (0..n).map(|i| vec![i]).collect()
    }

    #[tokio::test]
    async fn fills_missing_panels_in_order() {
        let (r, d) = reconciler();
        let raw = vec![RawScene::new("a"), RawScene::new("b"), RawScene::new("c")];
        let out = r.reconcile(&images(5), raw).await;

        assert_eq!(out.scenes.len(), 5);
        for (i, s) in out.scenes.iter().enumerate() {
            assert_eq!(s.panel_index, i);
        }
        assert_eq!(out.scenes[3].narration_text, "panel 3");
        assert_eq!(out.scenes[4].narration_text, "panel 4");
        assert_eq!(out.scenes[4].duration, 4.0);
        assert_eq!(out.scenes[0].duration, 3.0);
        assert_eq!((out.proposed, out.described), (3, 2));
        assert_eq!(d.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_describe_is_empty_narration() {
        let (r, _) = reconciler();
        let mut imgs = images(2);
        imgs[1] = vec![0xFF];
        let out = r.reconcile(&imgs, vec![RawScene::new("a")]).await;
        assert_eq!(out.scenes.len(), 2);
        assert!(out.scenes[1].is_silent());
    }

    #[tokio::test]
    async fn over_production_is_truncated_and_indices_rebound() {
        let (r, d) = reconciler();
        let raw: Vec<RawScene> = (0..4)
            .map(|i| RawScene {
                panel_index: Some(10 + i),
                ..RawScene::new(format!("s{i}"))
            })
            .collect();
        let out = r.reconcile(&images(2), raw).await;
        assert_eq!(out.scenes.len(), 2);
        assert_eq!(out.scenes[1].panel_index, 1);
        assert_eq!(out.scenes[1].narration_text, "s1");
        assert_eq!(d.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn transcript_is_appended_to_fallback() {
        let (r, _) = reconciler();
        let transcripts = vec![String::new(), "  Run!  ".to_string()];
        let out = r.reconcile_with_text(&images(2), vec![], &transcripts).await;
        assert_eq!(out.scenes[0].narration_text, "panel 0");
        assert_eq!(out.scenes[1].narration_text, "panel 1 Run!");
    }

    #[tokio::test]
    async fn proposed_defaults_are_filled() {
        let (r, _) = reconciler();
        let raw = vec![RawScene {
            animation_hint: Some("shake".into()),
            duration: Some(0.0),
            ..RawScene::new("**Boom**")
        }];
        let out = r.reconcile(&images(1), raw).await;
        let s = &out.scenes[0];
        assert_eq!(s.narration_text, "Boom");
        assert_eq!(s.animation_hint, "shake");
        assert_eq!(s.duration, 3.0);
    }
}
