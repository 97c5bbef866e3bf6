//! Pipeline stages for offer-to-document generation.
//!
//! Each submodule implements exactly one transformation step, so each can be
//! tested on its own and the renderer can be swapped without touching the
//! context-building stages.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ normalize ──▶ image ──▶ render
//! (JSON)    (context)     (decode)  (docx)
//! ```
//!
//! 1. [`input`]     parse the payload text and insist on a JSON object
//! 2. [`normalize`] build the [`TemplateContext`](crate::context::TemplateContext)
//!    from the loosely-typed record; never fails
//! 3. [`image`]     decode line-item data-URIs and size them for embedding;
//!    bad images are dropped, not reported
//! 4. [`render`]    fill the `.docx` template; CPU-bound, so callers run it
//!    in `spawn_blocking`

pub mod image;
pub mod input;
pub mod normalize;
pub mod render;
