//! Pipeline stages for PDF-to-story conversion.
//!
//! Each submodule implements one step. Collaborators with network or native
//! dependencies (rasteriser, vision LLM, speech backend, cache, storage) sit
//! behind traits so each stage can be tested with in-memory fakes.
//!
//! ## Data Flow
//!
//! ```text
//! input ─▶ render ─▶ enhance/segment ─▶ extract ─▶ encode ─▶ narrate ─▶ reconcile ─▶ timeline ─▶ storage
//! (bytes)  (pdfium)  (imageproc)         (panels)   (JPEG)    (VLM)      (1:1)        (synth)
//! ```
//!
//! 1. [`input`]     — read a local path or download a URL; check the `%PDF` magic
//! 2. [`render`]    — rasterise pages via pdfium on the blocking pool
//! 3. [`enhance`]   — autocontrast and sharpen before edge detection
//! 4. [`segment`]   — edges, dilation, outer contours, size filter, reading order
//! 5. [`extract`]   — per-page segmentation with bounded concurrency and the
//!    whole-page fallback
//! 6. [`encode`]    — JPEG for upload and base64 `ImageData` for the VLM
//! 7. [`narrate`]   — the narration proposal ([`llm`], [`text`] clean it up)
//! 8. [`describe`]  — single-panel description and transcription
//! 9. [`reconcile`] — exactly one scene per panel
//! 10. [`synth`]    — text → measured audio ([`speech`], [`cache`], [`audio`])
//! 11. [`timeline`] — ordered synthesis and cumulative timing
//! 12. [`storage`]  — uploads with retry

pub mod audio;
pub mod cache;
pub mod describe;
pub mod encode;
pub mod enhance;
pub mod extract;
pub mod input;
pub mod llm;
pub mod narrate;
pub mod reconcile;
pub mod render;
pub mod segment;
pub mod speech;
pub mod storage;
pub mod synth;
pub mod text;
pub mod timeline;
