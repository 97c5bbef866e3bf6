//! Error types for the ofertus library.
//!
//! There is a single fatal error type, [`OfertusError`]: a request either
//! produces a complete document or fails with one of these. Image problems
//! are *not* represented here: a line item whose picture cannot be decoded
//! simply renders without one (see [`crate::pipeline::image::ResolvedImage`]).
//!
//! The HTTP layer maps each variant to a status code via
//! [`OfertusError::is_client_error`]; nothing below the request boundary
//! knows about HTTP.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the ofertus library.
#[derive(Debug, Error)]
pub enum OfertusError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The offer payload is not valid JSON.
    #[error("Invalid JSON payload: {detail}")]
    InvalidPayload { detail: String },

    /// The offer payload parsed, but is not a JSON object.
    #[error("Offer payload must be a JSON object, got {found}")]
    PayloadNotObject { found: &'static str },

    /// A multipart request did not carry the `payload` field.
    #[error("Missing form field '{field}'")]
    MissingField { field: &'static str },

    /// The request body could not be read (truncated upload, bad multipart framing).
    #[error("Could not read request body: {detail}")]
    UnreadableBody { detail: String },

    // ── Template errors ───────────────────────────────────────────────────
    /// No template was uploaded and no default template exists.
    #[error(
        "No default template '{name}' in '{dir}'.\n\
Put your template there or send one in the 'template_file' form field."
    )]
    MissingTemplate { name: String, dir: PathBuf },

    /// The template bytes are not a readable Word package.
    #[error("Failed to load template: {detail}")]
    TemplateLoad { detail: String },

    /// The template was readable but could not be filled.
    #[error("Failed to render template: {detail}")]
    TemplateRender { detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not assemble or persist the generated document.
    #[error("Failed to save document '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not read or write a file in the template/output directories.
    #[error("Storage error at '{path}': {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl OfertusError {
    /// `true` when the caller sent something unusable; `false` for failures
    /// on our side (template, storage, rendering).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            OfertusError::InvalidPayload { .. }
                | OfertusError::PayloadNotObject { .. }
                | OfertusError::MissingField { .. }
                | OfertusError::UnreadableBody { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_template_mentions_upload_field() {
        let e = OfertusError::MissingTemplate {
            name: "oferta_template.docx".into(),
            dir: PathBuf::from("templates"),
        };
        let msg = e.to_string();
        assert!(msg.contains("oferta_template.docx"), "got: {msg}");
        assert!(msg.contains("template_file"), "got: {msg}");
    }

    #[test]
    fn invalid_payload_carries_parser_detail() {
        let e = OfertusError::InvalidPayload {
            detail: "expected value at line 1 column 1".into(),
        };
        assert!(e.to_string().contains("line 1 column 1"));
    }

    #[test]
    fn output_write_exposes_source() {
        let e = OfertusError::OutputWriteFailed {
            path: PathBuf::from("generated/oferta.docx"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(std::error::Error::source(&e).is_some());
        assert!(e.to_string().contains("generated/oferta.docx"));
    }

    #[test]
    fn client_and_server_errors_are_split() {
        assert!(OfertusError::MissingField { field: "payload" }.is_client_error());
        assert!(OfertusError::PayloadNotObject { found: "array" }.is_client_error());
        assert!(!OfertusError::TemplateRender {
            detail: "unclosed loop".into()
        }
        .is_client_error());
        assert!(!OfertusError::Internal("boom".into()).is_client_error());
    }
}
