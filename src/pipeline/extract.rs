//! PanelExtractor: PDF bytes → ordered, globally indexed panels.
//!
//! Rasterisation runs once on the blocking pool; segmentation then runs per
//! page on the blocking pool with at most `page_concurrency` pages in
//! flight. `buffered` (not `buffer_unordered`) keeps page order, so global
//! indices are assigned in a single pass afterwards.

use crate::config::StoryConfig;
use crate::error::StoryError;
use crate::model::{BoundingBox, Page, Panel};
use crate::pipeline::enhance::autocontrast;
use crate::pipeline::render::{Rasterizer, RenderOptions};
use crate::pipeline::segment::{crop, find_panel_boxes, SegmentParams};
use futures::stream::{self, StreamExt};
use image::DynamicImage;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Contrast cutoff applied to each cropped panel.
const PANEL_CUTOFF_PCT: f32 = 3.0;

/// Panels plus how many pages they came from.
#[derive(Debug)]
pub struct Extraction {
    pub pages: usize,
    pub panels: Vec<Panel>,
}

pub struct PanelExtractor {
    rasterizer: Arc<dyn Rasterizer>,
    render: RenderOptions,
    segment: SegmentParams,
    page_concurrency: usize,
    max_panels: usize,
}

impl PanelExtractor {
    pub fn new(rasterizer: Arc<dyn Rasterizer>, config: &StoryConfig) -> Self {
        Self {
            rasterizer,
            render: RenderOptions {
                dpi: config.dpi,
                max_rendered_pixels: config.max_rendered_pixels,
                max_pages: config.max_pages,
                password: config.password.clone(),
            },
            segment: SegmentParams {
                min_height_frac: config.min_height_frac,
                min_width_frac: config.min_width_frac,
                min_area_frac: config.min_area_frac,
                max_panels_per_page: config.max_panels_per_page,
                ..SegmentParams::default()
            },
            page_concurrency: config.page_concurrency.max(1),
            max_panels: config.max_panels,
        }
    }

    /// Rasterise and segment a whole PDF.
    ///
    /// # Errors
    /// Fails if the PDF cannot be rasterised, yields no panels, or yields
    /// more than `max_panels`.
    pub async fn extract(&self, pdf: &[u8]) -> Result<Extraction, StoryError> {
        let rasterizer = Arc::clone(&self.rasterizer);
        let options = self.render.clone();
        let bytes = pdf.to_vec();

        let pages = tokio::task::spawn_blocking(move || rasterizer.rasterize(&bytes, &options))
            .await
            .map_err(|e| StoryError::Internal(format!("Render task panicked: {e}")))??;
        info!("Rasterised {} pages", pages.len());

        self.extract_pages(pages).await
    }

    /// Segment already-rasterised pages.
    pub async fn extract_pages(&self, pages: Vec<Page>) -> Result<Extraction, StoryError> {
        let page_count = pages.len();

        let per_page: Vec<Vec<(BoundingBox, DynamicImage)>> = stream::iter(pages)
            .map(|page| {
                let params = self.segment.clone();
                let image = Arc::new(page.image);
                let worker_image = Arc::clone(&image);
                let page_index = page.index;
                async move {
                    let worker = tokio::task::spawn_blocking(move || {
                        segment_page(&worker_image, &params)
                    });
                    match worker.await {
                        Ok(crops) => crops,
                        Err(e) => {
                            warn!(
                                "Page {}: segmentation failed ({}), using whole page",
                                page_index + 1,
                                e
                            );
                            vec![whole_page(&image)]
                        }
                    }
                }
            })
            .buffered(self.page_concurrency)
            .collect()
            .await;

        let mut panels = Vec::new();
        for (page_index, crops) in per_page.into_iter().enumerate() {
            debug!("Page {}: {} panels", page_index + 1, crops.len());
            for (bounding_box, image) in crops {
                panels.push(Panel {
                    index: panels.len(),
                    page_index,
                    image,
                    bounding_box,
                });
            }
        }

        if panels.is_empty() {
            return Err(StoryError::NoPanels);
        }
        if panels.len() > self.max_panels {
            return Err(StoryError::TooManyPanels {
                count: panels.len(),
                limit: self.max_panels,
            });
        }

        info!(
            "Extracted {} panels from {} pages",
            panels.len(),
            page_count
        );
        Ok(Extraction {
            pages: page_count,
            panels,
        })
    }
}

/// Boxes for one page, cropped and contrast-normalised; whole page when no
/// box survives.
fn segment_page(page: &DynamicImage, params: &SegmentParams) -> Vec<(BoundingBox, DynamicImage)> {
    let boxes = find_panel_boxes(page, params);
    if boxes.is_empty() {
        debug!("No panel candidates survived, using whole page");
        return vec![whole_page(page)];
    }
    boxes
        .into_iter()
        .map(|b| (b, autocontrast(&crop(page, &b), PANEL_CUTOFF_PCT)))
        .collect()
}

fn whole_page(page: &DynamicImage) -> (BoundingBox, DynamicImage) {
    (
        BoundingBox::full(page.width(), page.height()),
        autocontrast(page, PANEL_CUTOFF_PCT),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    struct StaticPages(Vec<Page>);

    impl Rasterizer for StaticPages {
        fn rasterize(&self, _pdf: &[u8], options: &RenderOptions) -> Result<Vec<Page>, StoryError> {
            Ok(self.0.iter().take(options.max_pages).cloned().collect())
        }
    }

    struct BrokenPdf;

    impl Rasterizer for BrokenPdf {
        fn rasterize(&self, _pdf: &[u8], _options: &RenderOptions) -> Result<Vec<Page>, StoryError> {
            Err(StoryError::CorruptPdf {
                detail: "xref table missing".into(),
            })
        }
    }

    fn blank(index: usize) -> Page {
        Page::new(
            index,
            DynamicImage::ImageRgb8(RgbImage::from_pixel(200, 300, Rgb([250, 250, 250]))),
        )
    }

    #[tokio::test]
    async fn blank_pages_fall_back_to_whole_page() {
        let ex = PanelExtractor::new(
            Arc::new(StaticPages(vec![blank(0), blank(1), blank(2)])),
            &StoryConfig::default(),
        );
        let out = ex.extract(b"%PDF").await.unwrap();
        assert_eq!(out.pages, 3);
        let idx: Vec<_> = out.panels.iter().map(|p| (p.index, p.page_index)).collect();
        assert_eq!(idx, vec![(0, 0), (1, 1), (2, 2)]);
        assert_eq!(out.panels[0].bounding_box, BoundingBox::full(200, 300));
    }

    #[tokio::test]
    async fn max_pages_limits_rendering() {
        let config = StoryConfig::builder().max_pages(2).build().unwrap();
        let ex = PanelExtractor::new(
            Arc::new(StaticPages(vec![blank(0), blank(1), blank(2)])),
            &config,
        );
        assert_eq!(ex.extract(b"%PDF").await.unwrap().panels.len(), 2);
    }

    #[tokio::test]
    async fn too_many_panels_is_fatal() {
        let config = StoryConfig::builder().max_panels(2).build().unwrap();
        let ex = PanelExtractor::new(
            Arc::new(StaticPages(vec![blank(0), blank(1), blank(2)])),
            &config,
        );
        let err = ex.extract(b"%PDF").await.unwrap_err();
        assert!(matches!(err, StoryError::TooManyPanels { count: 3, limit: 2 }));
    }

    #[tokio::test]
    async fn no_pages_is_no_panels() {
        let ex = PanelExtractor::new(Arc::new(StaticPages(vec![])), &StoryConfig::default());
        assert!(matches!(ex.extract(b"%PDF").await, Err(StoryError::NoPanels)));
    }

    #[tokio::test]
    async fn rasterizer_error_propagates() {
        let ex = PanelExtractor::new(Arc::new(BrokenPdf), &StoryConfig::default());
        assert!(matches!(
            ex.extract(b"%PDF").await,
            Err(StoryError::CorruptPdf { .. })
        ));
    }
}
