//! PDF rasterisation: render pages to [`Page`]s via pdfium.
//!
//! The [`Rasterizer`] trait is the seam between the extractor and pdfium so
//! the extraction logic can be tested with synthetic page images.
//!
//! pdfium wraps a C++ library that is not async-safe, so all of its work
//! happens inside a single `spawn_blocking` call.

use crate::error::StoryError;
use crate::model::Page;
use pdfium_render::prelude::*;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Page rendering knobs, taken from [`crate::config::StoryConfig`].
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub dpi: u32,
    pub max_rendered_pixels: u32,
    pub max_pages: usize,
    pub password: Option<String>,
}

/// Turns PDF bytes into page rasters, in document order.
pub trait Rasterizer: Send + Sync {
    /// Blocking; callers run it on the blocking pool.
    fn rasterize(&self, pdf: &[u8], options: &RenderOptions) -> Result<Vec<Page>, StoryError>;
}

/// [`Rasterizer`] backed by a pdfium shared library.
///
/// Binds to `library_path` when given, otherwise to `PDFIUM_LIB_PATH`,
/// otherwise to the system library.
#[derive(Debug, Clone, Default)]
pub struct PdfiumRasterizer {
    library_path: Option<PathBuf>,
}

impl PdfiumRasterizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_library(path: impl Into<PathBuf>) -> Self {
        Self {
            library_path: Some(path.into()),
        }
    }

    fn bind(&self) -> Result<Pdfium, StoryError> {
        let explicit = self
            .library_path
            .clone()
            .or_else(|| std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from));

        let bindings = match explicit {
            Some(path) => {
                debug!("Binding pdfium from {}", path.display());
                Pdfium::bind_to_library(&path)
            }
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| StoryError::PdfiumBindingFailed(format!("{e:?}")))?;

        Ok(Pdfium::new(bindings))
    }
}

impl Rasterizer for PdfiumRasterizer {
    fn rasterize(&self, pdf: &[u8], options: &RenderOptions) -> Result<Vec<Page>, StoryError> {
        let pdfium = self.bind()?;

        let document = pdfium
            .load_pdf_from_byte_slice(pdf, options.password.as_deref())
            .map_err(|e| StoryError::CorruptPdf {
                detail: format!("{e:?}"),
            })?;

        let pages = document.pages();
        let total_pages = pages.len() as usize;
        let wanted = total_pages.min(options.max_pages);
        info!("PDF loaded: {} pages, rendering {}", total_pages, wanted);
        if wanted < total_pages {
            warn!(
                "Ignoring {} pages past the {}-page limit",
                total_pages - wanted,
                options.max_pages
            );
        }

        let max_px = options.max_rendered_pixels as i32;
        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(options.dpi as f32 / 72.0)
            .set_maximum_width(max_px)
            .set_maximum_height(max_px);

        let mut results = Vec::with_capacity(wanted);
        for idx in 0..wanted {
            let page = pages
                .get(idx as u16)
                .map_err(|e| StoryError::RasterisationFailed {
                    page: idx + 1,
                    detail: format!("{e:?}"),
                })?;

            let bitmap = page.render_with_config(&render_config).map_err(|e| {
                StoryError::RasterisationFailed {
                    page: idx + 1,
                    detail: format!("{e:?}"),
                }
            })?;

            let image = bitmap.as_image();
            debug!(
                "Rendered page {} → {}x{} px",
                idx + 1,
                image.width(),
                image.height()
            );
            results.push(Page::new(idx, image));
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_library_path_is_kept() {
        let r = PdfiumRasterizer::with_library("/opt/pdfium/libpdfium.so");
        assert_eq!(
            r.library_path.as_deref(),
            Some(std::path::Path::new("/opt/pdfium/libpdfium.so"))
        );
    }

    #[test]
    fn missing_library_is_a_binding_error() {
        let r = PdfiumRasterizer::with_library("/definitely/not/libpdfium.so");
        let opts = RenderOptions {
            dpi: 120,
            max_rendered_pixels: 2000,
            max_pages: 50,
            password: None,
        };
        let err = r.rasterize(b"%PDF-1.4", &opts).unwrap_err();
        assert!(matches!(err, StoryError::PdfiumBindingFailed(_)));
    }
}
