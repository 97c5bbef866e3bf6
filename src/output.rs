//! Result types returned by the generation entry points.

use serde::Serialize;

/// A rendered offer document.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedDocument {
    /// Suggested download name, e.g. `oferta_3f2a….docx`.
    pub file_name: String,

    /// Where the store put it (a path for [`crate::storage::DiskStore`]).
    pub location: String,

    /// The `.docx` package.
    #[serde(skip_serializing)]
    pub bytes: Vec<u8>,

    /// Statistics about the rendering.
    pub stats: GenerationStats,
}

/// Counters collected while rendering one offer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GenerationStats {
    /// Line items in the context.
    pub line_items: usize,
    /// Line items whose image resolved.
    pub images_resolved: usize,
    /// Images actually placed into the document by an `IMAGE` placeholder.
    pub images_embedded: usize,
    /// `true` when an uploaded template was used instead of the default.
    pub uploaded_template: bool,
    /// Wall-clock time of the render step.
    pub render_duration_ms: u64,
}
