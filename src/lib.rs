//! # ofertus
//!
//! Turn a commercial offer, described as loosely-typed JSON, into a filled-in
//! Word (`.docx`) document.
//!
//! ## Why this crate?
//!
//! Offers are put together by front-ends and spreadsheets that never quite
//! agree on key names: `lp` or `LP`, `nazwa_rysunek` or `name`, a `systemy`
//! list that may have three entries or seven. This crate normalises all of
//! that into one predictable template context, resolves embedded data-URI
//! pictures, and fills a Word template that a non-programmer can edit.
//!
//! ## Pipeline Overview
//!
//! ```text
//! JSON offer
//!  │
//!  ├─ 1. Input      parse the payload, insist on an object
//!  ├─ 2. Normalize  fixed placeholder keys, systems, line items (never fails)
//!  ├─ 3. Images     data-URI → PNG/JPEG with a physical size (bad ones dropped)
//!  ├─ 4. Render     fill the .docx template (CPU-bound, spawn_blocking)
//!  └─ 5. Store      keep the document under a random name
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ofertus::{render_offer, GeneratorConfig};
//! use serde_json::json;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let template = std::fs::read("templates/oferta_template.docx")?;
//!     let offer = json!({
//!         "numer_oferty": "186112025",
//!         "systemy": ["AS 75"],
//!         "items": [{"lp": 1, "nazwa_rysunek": "Poz. OZ 1", "ilosc": "X1"}]
//!     });
//!     let doc = render_offer(&offer, &template, &GeneratorConfig::default())?;
//!     std::fs::write("oferta.docx", doc.bytes)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `ofertus` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! ofertus = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod context;
pub mod error;
pub mod generate;
pub mod output;
pub mod pipeline;
pub mod server;
pub mod storage;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    AliasPolicy, ContextLayout, GeneratorConfig, GeneratorConfigBuilder, ImageSizing,
    ServerConfig, DEFAULT_TEMPLATE_NAME,
};
pub use context::{LineContext, TemplateContext};
pub use error::OfertusError;
pub use generate::{generate, preview_context, render_offer, GenerateRequest};
pub use output::{GeneratedDocument, GenerationStats};
pub use pipeline::normalize::normalize;
pub use pipeline::render::{DocxTemplate, RenderedDocument, DOCX_MEDIA_TYPE};
pub use server::{build_router, serve, AppState};
pub use storage::{DiskStore, DocumentStore, MemoryStore};
