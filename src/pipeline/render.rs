//! Docx rendering: fill a `.docx` template package with a [`TemplateContext`].
//!
//! A `.docx` is a zip of XML parts. Rendering touches only the story parts
//! (`word/document.xml`, headers, footers) and, when pictures are embedded,
//! the document relationships and `[Content_Types].xml`. Every other part is
//! copied through byte for byte.
//!
//! ## Supported template syntax
//!
//! | Construct | Meaning |
//! |-----------|---------|
//! | `{{ NAME }}` | top-level placeholder |
//! | `{%tr for item in items %}` … `{%tr endfor %}` | repeat the table rows in between |
//! | `{%p for s in SYSTEMY %}` … `{%p endfor %}` | repeat the paragraphs in between |
//! | `{% for … %}` … `{% endfor %}` | repeat inline text |
//! | `{{ item.FIELD }}`, `{{ s }}`, `{{ loop.index }}` | per-iteration values |
//! | `{{ item.IMAGE }}` | the line's picture, as an inline drawing |
//!
//! There are no expressions, filters, conditionals or nested loops.
//! Unknown placeholders render as nothing.
//!
//! ## Why merge runs first?
//!
//! Word splits text into runs whenever formatting, spell-check state or
//! editing history changes, so `{{ NUMER_OFERTY }}` typed by a human often
//! lands in the XML as `{{ NUMER_</w:t></w:r><w:r><w:t>OFERTY }}`. The first
//! pass strips the markup *inside* each tag so the later passes can match
//! tags with plain regexes. The stripped markup is balanced (a run closed
//! and a run reopened), so the part stays well-formed.

use crate::context::{display_text, LineContext, TemplateContext, IMAGE_KEY, ITEMS_KEY};
use crate::error::OfertusError;
use crate::pipeline::image::InlineImage;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;
use std::io::{Cursor, Read, Write};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub const DOCX_MEDIA_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

const DOCUMENT_PART: &str = "word/document.xml";
const DOCUMENT_RELS_PART: &str = "word/_rels/document.xml.rels";
const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

const NS_RELS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const NS_CT: &str = "http://schemas.openxmlformats.org/package/2006/content-types";
const IMAGE_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";

/// First drawing id handed out; kept well clear of ids Word assigns itself.
const DRAWING_ID_BASE: usize = 10_000;

static RE_STORY_PART: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^word/(?:document|header\d*|footer\d*)\.xml$").unwrap());

static RE_SPLIT_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)\{(?:<[^>]*>)*([{%])(.*?)([}%])(?:<[^>]*>)*\}").unwrap()
});

static RE_XML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());

static RE_FOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{%(tr|p)?\s*for\s+([A-Za-z_][A-Za-z0-9_]*)\s+in\s+([A-Za-z_][A-Za-z0-9_]*)\s*%\}")
        .unwrap()
});

static RE_ENDFOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{%(tr|p)?\s*endfor\s*%\}").unwrap());

static RE_PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)?)\s*\}\}").unwrap()
});

/// A loaded template package.
#[derive(Debug, Clone)]
pub struct DocxTemplate {
    parts: Vec<Part>,
}

#[derive(Debug, Clone)]
struct Part {
    name: String,
    data: Vec<u8>,
    is_dir: bool,
}

/// Output of [`DocxTemplate::render`].
#[derive(Debug, Clone)]
pub struct RenderedDocument {
    pub bytes: Vec<u8>,
    /// Pictures placed by `IMAGE` placeholders.
    pub images_embedded: usize,
}

impl DocxTemplate {
    /// Parse a `.docx` package. Fails unless it is a zip with `word/document.xml`.
    pub fn load(bytes: &[u8]) -> Result<Self, OfertusError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| load_error(format!("not a .docx package: {e}")))?;

        let mut parts = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let mut file = archive
                .by_index(i)
                .map_err(|e| load_error(format!("entry {i}: {e}")))?;
            let mut data = Vec::new();
            file.read_to_end(&mut data)
                .map_err(|e| load_error(format!("{}: {e}", file.name())))?;
            parts.push(Part {
                name: file.name().to_string(),
                is_dir: file.is_dir(),
                data,
            });
        }

        if !parts.iter().any(|p| p.name == DOCUMENT_PART) {
            return Err(load_error(format!("{DOCUMENT_PART} is missing")));
        }
        debug!("Loaded template with {} parts", parts.len());
        Ok(Self { parts })
    }

    /// Fill the template and serialise the resulting package.
    pub fn render(&self, context: &TemplateContext) -> Result<RenderedDocument, OfertusError> {
        let mut media = MediaRegistry::default();
        let mut rendered: Vec<(String, Vec<u8>, bool)> = Vec::with_capacity(self.parts.len());

        for part in &self.parts {
            if part.is_dir || !RE_STORY_PART.is_match(&part.name) {
                rendered.push((part.name.clone(), part.data.clone(), part.is_dir));
                continue;
            }
            let xml = std::str::from_utf8(&part.data)
                .map_err(|e| render_error(format!("{} is not UTF-8: {e}", part.name)))?;
            let media_slot = if part.name == DOCUMENT_PART {
                Some(&mut media)
            } else {
                None
            };
            let filled = fill_part(xml, context, media_slot)
                .map_err(|detail| render_error(format!("{}: {detail}", part.name)))?;
            rendered.push((part.name.clone(), filled.into_bytes(), false));
        }

        if !media.parts.is_empty() {
            register_media(&mut rendered, &media)?;
        }

        let bytes = write_package(&rendered, &media)
            .map_err(|e| render_error(format!("could not write package: {e}")))?;
        debug!(
            "Rendered document: {} bytes, {} images",
            bytes.len(),
            media.parts.len()
        );
        Ok(RenderedDocument {
            bytes,
            images_embedded: media.parts.len(),
        })
    }
}

fn load_error(detail: String) -> OfertusError {
    OfertusError::TemplateLoad { detail }
}

fn render_error(detail: String) -> OfertusError {
    OfertusError::TemplateRender { detail }
}

// ── Story parts ──────────────────────────────────────────────────────────

fn fill_part(
    xml: &str,
    context: &TemplateContext,
    mut media: Option<&mut MediaRegistry>,
) -> Result<String, String> {
    let xml = merge_split_tags(xml);
    let xml = expand_loops(&xml, context, media.as_deref_mut())?;
    Ok(fill_placeholders(&xml, media, |name| {
        if name.contains('.') {
            debug!("Placeholder '{}' used outside its loop", name);
            return Some(Fill::Text(String::new()));
        }
        Some(Fill::Text(match context.get(name) {
            Some(v) => document_text(v),
            None => {
                debug!("Placeholder '{}' is not in the context", name);
                String::new()
            }
        }))
    }))
}

/// Remove markup inside `{{ }}` / `{% %}` tags and preserve text spacing.
fn merge_split_tags(xml: &str) -> String {
    let merged = RE_SPLIT_TAG.replace_all(xml, |caps: &Captures| {
        let mut tag = String::with_capacity(caps[0].len());
        tag.push('{');
        tag.push_str(&caps[1]);
        tag.push_str(&RE_XML_TAG.replace_all(&caps[2], ""));
        tag.push_str(&caps[3]);
        tag.push('}');
        tag
    });
    merged.replace("<w:t>", "<w:t xml:space=\"preserve\">")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopKind {
    Row,
    Paragraph,
    Inline,
}

impl LoopKind {
    fn from_marker(marker: Option<&str>) -> Self {
        match marker {
            Some("tr") => LoopKind::Row,
            Some("p") => LoopKind::Paragraph,
            _ => LoopKind::Inline,
        }
    }

    /// Byte range the tag at `start..end` occupies once its container is included.
    fn container(self, xml: &str, start: usize, end: usize) -> Option<(usize, usize)> {
        match self {
            LoopKind::Row => enclosing_element(xml, start, end, "w:tr"),
            LoopKind::Paragraph => enclosing_element(xml, start, end, "w:p"),
            LoopKind::Inline => Some((start, end)),
        }
    }
}

fn enclosing_element(xml: &str, start: usize, end: usize, tag: &str) -> Option<(usize, usize)> {
    let head = &xml[..start];
    let open = [head.rfind(&format!("<{tag}>")), head.rfind(&format!("<{tag} "))]
        .into_iter()
        .flatten()
        .max()?;
    let close_tag = format!("</{tag}>");
    let close = xml[end..].find(&close_tag)? + end + close_tag.len();
    Some((open, close))
}

fn expand_loops(
    xml: &str,
    context: &TemplateContext,
    mut media: Option<&mut MediaRegistry>,
) -> Result<String, String> {
    let mut xml = xml.to_string();
    // Everything before `cursor` is expanded output and is never rescanned.
    let mut cursor = 0;

    while let Some(caps) = RE_FOR.captures_at(&xml, cursor) {
        let Some(open) = caps.get(0) else { break };
        let kind = LoopKind::from_marker(caps.get(1).map(|m| m.as_str()));
        let var = caps[2].to_string();
        let source = caps[3].to_string();
        let open_tag = open.as_str().to_string();
        let (open_start, open_end) = (open.start(), open.end());

        let close = RE_ENDFOR
            .captures_iter(&xml[open_end..])
            .filter(|c| LoopKind::from_marker(c.get(1).map(|m| m.as_str())) == kind)
            .find_map(|c| c.get(0).map(|m| (open_end + m.start(), open_end + m.end())))
            .ok_or_else(|| format!("'{open_tag}' has no matching endfor"))?;

        if let Some(nested) = RE_FOR.find(&xml[open_end..close.0]) {
            return Err(format!("nested loop '{}' is not supported", nested.as_str()));
        }

        let (outer_start, body_start) = kind
            .container(&xml, open_start, open_end)
            .ok_or_else(|| format!("'{open_tag}' is not inside a {kind:?} element"))?;
        let (body_end, outer_end) = kind
            .container(&xml, close.0, close.1)
            .ok_or_else(|| format!("endfor of '{open_tag}' is not inside a {kind:?} element"))?;
        if body_start > body_end {
            return Err(format!("'{open_tag}' and its endfor share one {kind:?} element"));
        }

        let body = xml[body_start..body_end].to_string();
        let expanded = repeat_body(&body, &var, &source, context, media.as_deref_mut());
        xml.replace_range(outer_start..outer_end, &expanded);
        cursor = outer_start + expanded.len();
    }

    if let Some(stray) = RE_ENDFOR.find(&xml) {
        return Err(format!("'{}' without a matching for", stray.as_str()));
    }
    Ok(xml)
}

fn repeat_body(
    body: &str,
    var: &str,
    source: &str,
    context: &TemplateContext,
    mut media: Option<&mut MediaRegistry>,
) -> String {
    let mut out = String::new();

    if source == ITEMS_KEY {
        for (idx, line) in context.items.iter().enumerate() {
            out.push_str(&fill_placeholders(body, media.as_deref_mut(), |name| {
                line_value(name, var, idx, line)
            }));
        }
    } else if let Some(Value::Array(values)) = context.get(source) {
        for (idx, value) in values.iter().enumerate() {
            out.push_str(&fill_placeholders(body, media.as_deref_mut(), |name| {
                if name == var {
                    Some(Fill::Text(display_text(value)))
                } else {
                    loop_counter(name, idx)
                }
            }));
        }
    } else {
        debug!("Loop source '{}' is not a list; rendering nothing", source);
    }

    out
}

fn line_value<'a>(name: &str, var: &str, idx: usize, line: &'a LineContext) -> Option<Fill<'a>> {
    if let Some(counter) = loop_counter(name, idx) {
        return Some(counter);
    }
    let field = name.strip_prefix(var)?.strip_prefix('.')?;
    if field.eq_ignore_ascii_case(IMAGE_KEY) {
        return Some(match &line.image {
            Some(img) => Fill::Image(img),
            None => Fill::Text(String::new()),
        });
    }
    Some(Fill::Text(line.get(field).map(display_text).unwrap_or_default()))
}

fn loop_counter<'a>(name: &str, idx: usize) -> Option<Fill<'a>> {
    match name {
        "loop.index" => Some(Fill::Text((idx + 1).to_string())),
        "loop.index0" => Some(Fill::Text(idx.to_string())),
        _ => None,
    }
}

/// What a placeholder turns into.
enum Fill<'a> {
    Text(String),
    Image(&'a InlineImage),
}

/// Replace every `{{ name }}` the resolver knows; leave the rest alone.
fn fill_placeholders<'a>(
    xml: &str,
    mut media: Option<&mut MediaRegistry>,
    mut resolve: impl FnMut(&str) -> Option<Fill<'a>>,
) -> String {
    RE_PLACEHOLDER
        .replace_all(xml, |caps: &Captures| match resolve(&caps[1]) {
            Some(Fill::Text(text)) => text_xml(&text),
            Some(Fill::Image(img)) => match media.as_deref_mut() {
                Some(registry) => registry.embed(img),
                None => String::new(),
            },
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Top-level value as document text; string lists read as "a, b, c".
fn document_text(value: &Value) -> String {
    match value {
        Value::Array(items) => items
            .iter()
            .map(display_text)
            .collect::<Vec<_>>()
            .join(", "),
        other => display_text(other),
    }
}

/// Escape a value for XML character data.
///
/// Braces go out as character references so a filled value can never form a
/// `{{ }}` or `{% %}` tag for a later pass to pick up. Characters XML 1.0
/// forbids (C0 controls other than tab, LF and CR, plus U+FFFE/U+FFFF) are
/// dropped.
fn escape_xml_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '{' => out.push_str("&#123;"),
            '}' => out.push_str("&#125;"),
            '\t' | '\n' | '\r' => out.push(c),
            c if c < '\u{20}' || c == '\u{FFFE}' || c == '\u{FFFF}' => {}
            c => out.push(c),
        }
    }
    out
}

/// Text for inside a `<w:t>`; newlines become Word line breaks.
fn text_xml(text: &str) -> String {
    escape_xml_text(&text.replace("\r\n", "\n"))
        .replace('\n', "</w:t><w:br/><w:t xml:space=\"preserve\">")
}

// ── Media ────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct MediaRegistry {
    parts: Vec<MediaPart>,
}

#[derive(Debug)]
struct MediaPart {
    rel_id: String,
    /// Relative to `word/`.
    target: String,
    extension: &'static str,
    content_type: &'static str,
    bytes: Vec<u8>,
}

impl MediaRegistry {
    /// Register `img` and return the run content that displays it.
    fn embed(&mut self, img: &InlineImage) -> String {
        let n = self.parts.len() + 1;
        let rel_id = format!("rIdOfertusImg{n}");
        let extension = img.format.extension();
        self.parts.push(MediaPart {
            rel_id: rel_id.clone(),
            target: format!("media/ofertus_image{n}.{extension}"),
            extension,
            content_type: img.format.media_type(),
            bytes: img.bytes.clone(),
        });
        drawing_xml(&rel_id, DRAWING_ID_BASE + n, img)
    }
}

fn drawing_xml(rel_id: &str, id: usize, img: &InlineImage) -> String {
    let (cx, cy) = (img.width_emu, img.height_emu);
    format!(
        concat!(
            "</w:t><w:drawing>",
            r#"<wp:inline xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing" distT="0" distB="0" distL="0" distR="0">"#,
            r#"<wp:extent cx="{cx}" cy="{cy}"/>"#,
            r#"<wp:docPr id="{id}" name="Picture {id}"/>"#,
            r#"<wp:cNvGraphicFramePr><a:graphicFrameLocks xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" noChangeAspect="1"/></wp:cNvGraphicFramePr>"#,
            r#"<a:graphic xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main">"#,
            r#"<a:graphicData uri="http://schemas.openxmlformats.org/drawingml/2006/picture">"#,
            r#"<pic:pic xmlns:pic="http://schemas.openxmlformats.org/drawingml/2006/picture">"#,
            r#"<pic:nvPicPr><pic:cNvPr id="{id}" name="Picture {id}"/><pic:cNvPicPr/></pic:nvPicPr>"#,
            r#"<pic:blipFill><a:blip xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" r:embed="{rel_id}"/><a:stretch><a:fillRect/></a:stretch></pic:blipFill>"#,
            r#"<pic:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm><a:prstGeom prst="rect"><a:avLst/></a:prstGeom></pic:spPr>"#,
            "</pic:pic></a:graphicData></a:graphic></wp:inline>",
            r#"</w:drawing><w:t xml:space="preserve">"#,
        ),
        cx = cx,
        cy = cy,
        id = id,
        rel_id = rel_id,
    )
}

/// Add relationships and content-type defaults for embedded media.
fn register_media(
    parts: &mut Vec<(String, Vec<u8>, bool)>,
    media: &MediaRegistry,
) -> Result<(), OfertusError> {
    let relationships: String = media
        .parts
        .iter()
        .map(|p| {
            format!(
                r#"<Relationship Id="{}" Type="{IMAGE_REL_TYPE}" Target="{}"/>"#,
                p.rel_id, p.target
            )
        })
        .collect();

    match parts.iter_mut().find(|(name, _, _)| name == DOCUMENT_RELS_PART) {
        Some((_, data, _)) => {
            let rels = String::from_utf8_lossy(data).into_owned();
            let updated = insert_before(&rels, "</Relationships>", &relationships)
                .ok_or_else(|| render_error(format!("{DOCUMENT_RELS_PART} is malformed")))?;
            *data = updated.into_bytes();
        }
        None => {
            let rels = format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="{NS_RELS}">{relationships}</Relationships>"#
            );
            parts.push((DOCUMENT_RELS_PART.to_string(), rels.into_bytes(), false));
        }
    }

    let mut defaults = String::new();
    let existing = parts
        .iter()
        .find(|(name, _, _)| name == CONTENT_TYPES_PART)
        .map(|(_, data, _)| String::from_utf8_lossy(data).to_ascii_lowercase())
        .unwrap_or_default();
    let mut seen: Vec<&str> = Vec::new();
    for p in &media.parts {
        if seen.contains(&p.extension)
            || existing.contains(&format!("extension=\"{}\"", p.extension))
        {
            continue;
        }
        seen.push(p.extension);
        defaults.push_str(&format!(
            r#"<Default Extension="{}" ContentType="{}"/>"#,
            p.extension, p.content_type
        ));
    }

    match parts.iter_mut().find(|(name, _, _)| name == CONTENT_TYPES_PART) {
        Some((_, data, _)) => {
            let types = String::from_utf8_lossy(data).into_owned();
            let updated = insert_before(&types, "</Types>", &defaults)
                .ok_or_else(|| render_error(format!("{CONTENT_TYPES_PART} is malformed")))?;
            *data = updated.into_bytes();
        }
        None => {
            let types = format!(
                concat!(
                    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="{ns}">"#,
                    r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
                    r#"<Default Extension="xml" ContentType="application/xml"/>{defaults}"#,
                    r#"<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>"#,
                    "</Types>"
                ),
                ns = NS_CT,
                defaults = defaults,
            );
            parts.insert(0, (CONTENT_TYPES_PART.to_string(), types.into_bytes(), false));
        }
    }
    Ok(())
}

fn insert_before(haystack: &str, marker: &str, insertion: &str) -> Option<String> {
    let pos = haystack.rfind(marker)?;
    let mut out = String::with_capacity(haystack.len() + insertion.len());
    out.push_str(&haystack[..pos]);
    out.push_str(insertion);
    out.push_str(&haystack[pos..]);
    Some(out)
}

fn write_package(
    parts: &[(String, Vec<u8>, bool)],
    media: &MediaRegistry,
) -> zip::result::ZipResult<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let opt = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (name, data, is_dir) in parts {
        if *is_dir {
            zip.add_directory(name.as_str(), opt)?;
        } else {
            zip.start_file(name.as_str(), opt)?;
            zip.write_all(data)?;
        }
    }
    for p in &media.parts {
        zip.start_file(format!("word/{}", p.target), opt)?;
        zip.write_all(&p.bytes)?;
    }

    Ok(zip.finish()?.into_inner())
}
