//! Offer generation entry points.
//!
//! ## Why three functions?
//!
//! - [`generate`] is what the server calls: template selection, storage and
//!   rendering, with the CPU-bound part moved onto the blocking pool.
//! - [`render_offer`] is the pure core (payload + template bytes → docx
//!   bytes). The CLI `render` command and tests use it without a store.
//! - [`preview_context`] stops before rendering, so a caller can see exactly
//!   what the template would receive.

use crate::config::GeneratorConfig;
use crate::context::TemplateContext;
use crate::error::OfertusError;
use crate::output::{GeneratedDocument, GenerationStats};
use crate::pipeline::image::attach_images;
use crate::pipeline::normalize::normalize;
use crate::pipeline::render::{DocxTemplate, RenderedDocument};
use crate::storage::{DocumentStore, OutputKind};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// One document request.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    /// The offer record (a JSON object).
    pub payload: Value,
    /// Template uploaded with this request. Empty uploads count as absent.
    pub template: Option<Vec<u8>>,
}

impl GenerateRequest {
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            template: None,
        }
    }

    pub fn with_template(mut self, template: Vec<u8>) -> Self {
        self.template = Some(template);
        self
    }
}

/// Render an offer and keep the result in `store`.
///
/// The uploaded template, if any, wins over the default for this request
/// only and is itself kept in the store.
///
/// # Errors
/// - [`OfertusError::MissingTemplate`] when nothing was uploaded and the
///   store has no default template
/// - [`OfertusError::TemplateLoad`] / [`OfertusError::TemplateRender`]
/// - storage errors from `store`
pub async fn generate(
    request: GenerateRequest,
    store: Arc<dyn DocumentStore>,
    config: &GeneratorConfig,
) -> Result<GeneratedDocument, OfertusError> {
    let config = config.clone();
    tokio::task::spawn_blocking(move || generate_blocking(request, store.as_ref(), &config))
        .await
        .map_err(|e| OfertusError::Internal(format!("Generation task panicked: {}", e)))?
}

/// Blocking implementation of [`generate`].
pub fn generate_blocking(
    request: GenerateRequest,
    store: &dyn DocumentStore,
    config: &GeneratorConfig,
) -> Result<GeneratedDocument, OfertusError> {
    // ── Step 1: Pick the template ────────────────────────────────────────
    let (template_bytes, uploaded_template) = match request.template.filter(|t| !t.is_empty()) {
        Some(bytes) => {
            let stored = store.store_template(&bytes)?;
            info!("Using uploaded template {}", stored.name);
            (bytes, true)
        }
        None => match store.default_template()? {
            Some(bytes) => (bytes, false),
            None => return Err(store.missing_template()),
        },
    };
    let template = DocxTemplate::load(&template_bytes)?;

    // ── Step 2: Build the context ────────────────────────────────────────
    let mut context = normalize(&request.payload, config);
    let images_resolved = attach_images(&mut context, config.image_sizing);
    if config.persist_images {
        persist_images(&mut context, store)?;
    }

    // ── Step 3: Render and store ─────────────────────────────────────────
    let render_start = Instant::now();
    let rendered = template.render(&context)?;
    let render_duration_ms = render_start.elapsed().as_millis() as u64;

    let stored = store.store_output(OutputKind::Document, &rendered.bytes)?;
    info!(
        "Generated {} ({} items, {} images) in {}ms",
        stored.name,
        context.items.len(),
        rendered.images_embedded,
        render_duration_ms
    );

    Ok(GeneratedDocument {
        file_name: stored.name,
        location: stored.location,
        stats: GenerationStats {
            line_items: context.items.len(),
            images_resolved,
            images_embedded: rendered.images_embedded,
            uploaded_template,
            render_duration_ms,
        },
        bytes: rendered.bytes,
    })
}

/// Render an offer straight to `.docx` bytes, without any storage.
pub fn render_offer(
    payload: &Value,
    template: &[u8],
    config: &GeneratorConfig,
) -> Result<RenderedDocument, OfertusError> {
    let template = DocxTemplate::load(template)?;
    let context = preview_context(payload, config);
    template.render(&context)
}

/// The context a template would receive for `payload`, images resolved.
pub fn preview_context(payload: &Value, config: &GeneratorConfig) -> TemplateContext {
    let mut context = normalize(payload, config);
    let resolved = attach_images(&mut context, config.image_sizing);
    debug!(
        "Context: {} fields, {} items, {} images",
        context.fields.len(),
        context.items.len(),
        resolved
    );
    context
}

fn persist_images(context: &mut TemplateContext, store: &dyn DocumentStore) -> Result<(), OfertusError> {
    for img in context.items.iter_mut().filter_map(|line| line.image.as_mut()) {
        let stored = store.store_output(OutputKind::Image(img.format.extension()), &img.bytes)?;
        img.stored_as = Some(stored.name);
    }
    Ok(())
}
