//! HTTP-level integration tests for the ofertus service.
//!
//! Requests go through the full router (body limit, CORS, tracing layers)
//! via `tower::ServiceExt::oneshot`; no socket is opened.
//!
//! Run with: cargo test --test http -- --nocapture

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use common::{offer_template, part_names, part_text};
use http_body_util::BodyExt;
use ofertus::{build_router, AppState, DiskStore, DocumentStore, GeneratorConfig, MemoryStore};
use serde_json::{json, Value};
use std::io::Cursor;
use std::sync::Arc;
use tower::ServiceExt;

const BOUNDARY: &str = "ofertus-test-boundary";
const DOCX: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

// ── Test app builder ───────────────────────────────────────────

fn app_with(store: Arc<dyn DocumentStore>) -> Router {
    build_router(AppState::new(store, GeneratorConfig::default()), 1024 * 1024)
}

fn app() -> (Router, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::with_default_template(offer_template("DEFAULT")));
    (app_with(store.clone()), store)
}

fn reference_offer() -> Value {
    json!({
        "data": "21.11.2025",
        "numer_oferty": "186112025",
        "systemy": ["AS 75"],
        "kolor": "RAL 7016",
        "klient_imie": "Jan Kowalski",
        "items": [
            {"lp": 1, "nazwa_rysunek": "Poz. OZ 1", "ilosc": "X1", "opis": "test"}
        ]
    })
}

fn png_data_uri() -> String {
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(image::RgbaImage::new(20, 10))
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    format!("data:image/png;base64,{}", STANDARD.encode(&buf))
}

// ── Request helpers ────────────────────────────────────────────

/// Multipart body with a `payload` text field and an optional template file.
fn multipart_body(payload: Option<&str>, template: Option<&[u8]>) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some(payload) = payload {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"payload\"\r\n\r\n{payload}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some(template) = template {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"template_file\"; filename=\"t.docx\"\r\nContent-Type: {DOCX}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(template);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn multipart_request(uri: &str, payload: Option<&str>, template: Option<&[u8]>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(payload, template)))
        .unwrap()
}

fn json_request(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

async fn body_json(response: axum::response::Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

// ── Health ─────────────────────────────────────────────────────

#[tokio::test]
async fn health_and_root_report_ok() {
    let (app, _) = app();
    for uri in ["/health", "/"] {
        let resp = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await, json!({"status": "ok"}));
    }
}

// ── /generate-docx ─────────────────────────────────────────────

#[tokio::test]
async fn generate_from_multipart_returns_docx_attachment() {
    let (app, store) = app();
    let payload = reference_offer().to_string();
    let resp = app
        .oneshot(multipart_request("/generate-docx", Some(&payload), None))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], DOCX);
    let disposition = resp.headers()[header::CONTENT_DISPOSITION].to_str().unwrap().to_string();
    assert!(
        disposition.starts_with("attachment; filename=\"oferta_") && disposition.ends_with(".docx\""),
        "{disposition}"
    );

    let docx = body_bytes(resp).await;
    let xml = part_text(&docx, "word/document.xml");
    assert!(xml.contains("DEFAULT"));
    assert!(xml.contains("Oferta nr 186112025 z dnia 21.11.2025"), "{xml}");
    assert!(xml.contains("Systemy: AS 75 "), "{xml}");
    assert!(xml.contains("Poz. OZ 1"));
    assert!(!xml.contains("{{") && !xml.contains("{%"));
    assert_eq!(store.outputs().len(), 1);
}

#[tokio::test]
async fn generate_accepts_plain_json_body() {
    let (app, _) = app();
    let resp = app
        .oneshot(json_request("/generate-docx", &reference_offer().to_string()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let xml = part_text(&body_bytes(resp).await, "word/document.xml");
    assert!(xml.contains("186112025"));
}

#[tokio::test]
async fn uploaded_template_wins_for_that_request() {
    let (app, store) = app();
    let payload = reference_offer().to_string();
    let upload = offer_template("UPLOADED");

    let resp = app
        .clone()
        .oneshot(multipart_request("/generate-docx", Some(&payload), Some(&upload)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(part_text(&body_bytes(resp).await, "word/document.xml").contains("UPLOADED"));
    assert_eq!(store.templates().len(), 1);

    let resp = app
        .oneshot(multipart_request("/generate-docx", Some(&payload), None))
        .await
        .unwrap();
    assert!(part_text(&body_bytes(resp).await, "word/document.xml").contains("DEFAULT"));
}

#[tokio::test]
async fn line_item_image_is_embedded() {
    let (app, _) = app();
    let payload = json!({
        "numer_oferty": "1",
        "items": [
            {"lp": 1, "nazwa_rysunek": "Okno", "image": png_data_uri()},
            {"lp": 2, "nazwa_rysunek": "Drzwi", "image": "not-a-data-uri"}
        ]
    })
    .to_string();

    let resp = app
        .oneshot(multipart_request("/generate-docx", Some(&payload), None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let docx = body_bytes(resp).await;
    let xml = part_text(&docx, "word/document.xml");
    assert_eq!(xml.matches("<w:drawing>").count(), 1);
    assert!(xml.contains("Drzwi"));
    assert!(part_names(&docx).iter().any(|n| n == "word/media/ofertus_image1.png"));
    assert!(part_text(&docx, "[Content_Types].xml").contains(r#"Extension="png""#));
}

#[tokio::test]
async fn malformed_payload_is_400_with_detail() {
    let (app, store) = app();
    let resp = app
        .oneshot(multipart_request("/generate-docx", Some("{not json"), None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = body_json(resp).await;
    assert!(
        body["detail"].as_str().unwrap().contains("Invalid JSON payload"),
        "{body}"
    );
    assert!(store.outputs().is_empty());
}

#[tokio::test]
async fn non_object_and_missing_payload_are_400() {
    let (app, _) = app();
    let resp = app
        .clone()
        .oneshot(json_request("/generate-docx", "[1, 2, 3]"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = app
        .oneshot(multipart_request("/generate-docx", None, None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = body_json(resp).await;
    assert!(body["detail"].as_str().unwrap().contains("payload"), "{body}");
}

#[tokio::test]
async fn missing_default_template_is_500_with_instructions() {
    let app = app_with(Arc::new(MemoryStore::new()));
    let resp = app
        .oneshot(json_request("/generate-docx", &reference_offer().to_string()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(resp).await;
    let detail = body["detail"].as_str().unwrap();
    assert!(detail.contains("oferta_template.docx"), "{detail}");
    assert!(detail.contains("template_file"), "{detail}");
}

#[tokio::test]
async fn broken_template_is_500() {
    let (app, _) = app();
    let payload = reference_offer().to_string();
    let resp = app
        .oneshot(multipart_request(
            "/generate-docx",
            Some(&payload),
            Some(b"definitely not a zip"),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(resp).await;
    assert!(body["detail"].as_str().unwrap().contains("Failed to load template"));
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let store = Arc::new(MemoryStore::with_default_template(offer_template("T")));
    let app = build_router(AppState::new(store, GeneratorConfig::default()), 1024);
    let big = json!({"opis": "x".repeat(4096)}).to_string();
    let resp = app.oneshot(json_request("/generate-docx", &big)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body = body_json(resp).await;
    let detail = body["detail"].as_str().unwrap();
    assert!(detail.starts_with("Could not read request body"), "{detail}");
}

#[tokio::test]
async fn multipart_without_boundary_is_400() {
    let (app, _) = app();
    let request = Request::builder()
        .method("POST")
        .uri("/generate-docx")
        .header(header::CONTENT_TYPE, "multipart/form-data")
        .body(Body::from("payload={}"))
        .unwrap();
    let resp = app.oneshot(request).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = body_json(resp).await;
    let detail = body["detail"].as_str().unwrap();
    assert!(detail.starts_with("Could not read request body"), "{detail}");
}

#[tokio::test]
async fn template_tags_in_values_render_as_text() {
    let (app, _) = app();
    let mut offer = reference_offer();
    offer["klient_imie"] = json!("{{ KLIENT_EMAIL }}");
    offer["klient_email"] = json!("jan@example.com");
    offer["items"] = json!([
        {"lp": 1, "nazwa_rysunek": "{% for x in items %}{{ x.opis }}{% endfor %}"},
        {"lp": 2, "nazwa_rysunek": "{%tr endfor %}"}
    ]);

    let resp = app
        .oneshot(json_request("/generate-docx", &offer.to_string()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let xml = part_text(&body_bytes(resp).await, "word/document.xml");
    assert_eq!(xml.matches("jan@example.com").count(), 1, "{xml}");
    assert!(xml.contains("&#123;%tr endfor %&#125;"), "{xml}");
    // Header row plus one row per item.
    assert_eq!(xml.matches("<w:tr>").count(), 3, "{xml}");
}

#[tokio::test]
async fn disk_store_keeps_documents_and_uploads() {
    let root = tempfile::TempDir::new().unwrap();
    let store = DiskStore::open(
        root.path().join("templates"),
        root.path().join("generated"),
        "oferta_template.docx",
    )
    .unwrap();
    std::fs::write(store.default_template_path(), offer_template("DISK")).unwrap();
    let app = app_with(Arc::new(store));

    let payload = reference_offer().to_string();
    let upload = offer_template("UP");
    let resp = app
        .oneshot(multipart_request("/generate-docx", Some(&payload), Some(&upload)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let generated: Vec<_> = std::fs::read_dir(root.path().join("generated"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(generated.len(), 1);
    assert!(generated[0].starts_with("oferta_"));

    let templates = std::fs::read_dir(root.path().join("templates")).unwrap().count();
    assert_eq!(templates, 2);
}

// ── /preview-context ───────────────────────────────────────────

#[tokio::test]
async fn preview_returns_normalised_context() {
    let (app, store) = app();
    let payload = reference_offer().to_string();
    let resp = app
        .oneshot(multipart_request("/preview-context", Some(&payload), None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let ctx = body_json(resp).await;
    assert_eq!(ctx["NUMER_OFERTY"], "186112025");
    assert_eq!(ctx["DATA"], "21.11.2025");
    assert_eq!(ctx["SYSTEM1"], "AS 75");
    assert_eq!(ctx["SYSTEM5"], "");
    assert_eq!(ctx["KLIENT_TEL"], "");
    let item = &ctx["items"][0];
    assert_eq!(item["lp"], 1);
    assert_eq!(item["LP"], 1);
    assert_eq!(item["nazwa_rysunek"], "Poz. OZ 1");
    assert_eq!(item["ilosc"], "X1");
    assert_eq!(item["opis"], "test");
    assert!(item.get("IMAGE").is_none());
    assert!(store.outputs().is_empty());
}

#[tokio::test]
async fn preview_rejects_bad_json() {
    let (app, _) = app();
    let resp = app
        .oneshot(json_request("/preview-context", "nope"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}
