//! HTTP surface: health, document generation and context preview.
//!
//! | Route | Method | Body | Response |
//! |-------|--------|------|----------|
//! | `/`, `/health` | GET | none | `{"status":"ok"}` |
//! | `/generate-docx` | POST | multipart or JSON | the `.docx` as an attachment |
//! | `/preview-context` | POST | multipart or JSON | the template context as JSON |
//!
//! Both POST routes take either `multipart/form-data` with a `payload` text
//! field (the offer JSON) and an optional `template_file`, or the offer
//! record itself as an `application/json` body. Failures are returned as
//! `{"detail": "..."}`: 400 for unusable input, 500 for everything else.

use crate::config::{GeneratorConfig, ServerConfig};
use crate::error::OfertusError;
use crate::generate::{self, GenerateRequest};
use crate::pipeline::input;
use crate::pipeline::render::DOCX_MEDIA_TYPE;
use crate::storage::{DiskStore, DocumentStore};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, FromRequest, Multipart, Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

/// Shared per-process state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub config: Arc<GeneratorConfig>,
}

impl AppState {
    pub fn new(store: Arc<dyn DocumentStore>, config: GeneratorConfig) -> Self {
        Self {
            store,
            config: Arc::new(config),
        }
    }
}

/// Build the router with all routes and middleware.
pub fn build_router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/generate-docx", post(generate_docx))
        .route("/preview-context", post(preview_context))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Open the disk store and serve until Ctrl-C.
pub async fn serve(server: ServerConfig, generator: GeneratorConfig) -> Result<(), OfertusError> {
    let store = DiskStore::open(
        server.templates_dir.clone(),
        server.output_dir.clone(),
        server.default_template.clone(),
    )?;
    if store.default_template()?.is_none() {
        warn!(
            "No default template at {}; requests must upload 'template_file'",
            store.default_template_path().display()
        );
    }

    let app = build_router(AppState::new(Arc::new(store), generator), server.max_body_bytes);

    let listener = TcpListener::bind(server.bind)
        .await
        .map_err(|e| OfertusError::Internal(format!("failed to bind to {}: {}", server.bind, e)))?;
    info!("ofertus listening on {}", server.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| OfertusError::Internal(format!("server error: {}", e)))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Could not listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

// ── Handlers ─────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn generate_docx(
    State(state): State<AppState>,
    request: Request,
) -> Result<Response, ApiError> {
    let request = read_offer(request, &state).await?;
    let doc = generate::generate(request, Arc::clone(&state.store), &state.config).await?;

    let disposition = format!("attachment; filename=\"{}\"", doc.file_name);
    Ok((
        [
            (header::CONTENT_TYPE, DOCX_MEDIA_TYPE.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        doc.bytes,
    )
        .into_response())
}

async fn preview_context(
    State(state): State<AppState>,
    request: Request,
) -> Result<Response, ApiError> {
    let request = read_offer(request, &state).await?;
    let config = Arc::clone(&state.config);
    let context = tokio::task::spawn_blocking(move || {
        generate::preview_context(&request.payload, &config)
    })
    .await
    .map_err(|e| OfertusError::Internal(format!("Preview task panicked: {}", e)))?;
    Ok(Json(context).into_response())
}

/// Accept a multipart form or a bare JSON record.
async fn read_offer(request: Request, state: &AppState) -> Result<GenerateRequest, ApiError> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.to_ascii_lowercase().starts_with("multipart/form-data"));

    if is_multipart {
        let multipart = Multipart::from_request(request, state)
            .await
            .map_err(|e| ApiError::unreadable(e.status(), e.body_text()))?;
        read_form(multipart).await
    } else {
        let body = Bytes::from_request(request, state)
            .await
            .map_err(|e| ApiError::unreadable(e.status(), e.body_text()))?;
        let text = std::str::from_utf8(&body).map_err(|e| OfertusError::InvalidPayload {
            detail: e.to_string(),
        })?;
        Ok(GenerateRequest::new(input::parse_payload(text)?))
    }
}

async fn read_form(mut multipart: Multipart) -> Result<GenerateRequest, ApiError> {
    let mut payload = None;
    let mut template = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::unreadable(e.status(), e.body_text()))?
    {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("payload") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::unreadable(e.status(), e.body_text()))?;
                payload = Some(text);
            }
            Some("template_file") => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::unreadable(e.status(), e.body_text()))?;
                debug!("Received template upload ({} bytes)", bytes.len());
                template = Some(bytes.to_vec());
            }
            other => debug!("Ignoring form field {:?}", other),
        }
    }

    let payload = payload.ok_or(OfertusError::MissingField { field: "payload" })?;
    Ok(GenerateRequest {
        payload: input::parse_payload(&payload)?,
        template,
    })
}

// ── Errors ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ErrorResponse {
    detail: String,
}

/// An error on its way out as `{"detail": ...}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    /// A body that could not be read. Keeps the rejection's status, which is
    /// 413 for an oversized body and 400 for broken framing.
    fn unreadable(status: StatusCode, detail: String) -> Self {
        let err = OfertusError::UnreadableBody { detail };
        if status.is_client_error() {
            Self::new(status, err.to_string())
        } else {
            Self::from(err)
        }
    }
}

impl From<OfertusError> for ApiError {
    fn from(e: OfertusError) -> Self {
        let status = if e.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self::new(status, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("Request failed: {}", self.detail);
        } else {
            warn!("Request rejected ({}): {}", self.status, self.detail);
        }
        (self.status, Json(ErrorResponse { detail: self.detail })).into_response()
    }
}
