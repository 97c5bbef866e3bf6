//! Image resolution: data-URI → [`InlineImage`] ready for the renderer.
//!
//! Line items may carry a picture as `data:image/png;base64,....`. Anything
//! that goes wrong on the way from that string to pixels (no prefix, broken
//! base64, bytes that are not an image) yields [`ResolvedImage::Absent`]:
//! the line simply renders without a picture and the request carries on.
//!
//! Sizes are declared in EMU (English Metric Units), the OOXML length unit:
//! 360 000 EMU per centimetre.

use crate::config::ImageSizing;
use crate::context::TemplateContext;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::ImageFormat;
use serde::Serialize;
use std::io::Cursor;
use tracing::debug;

/// EMU per centimetre.
pub const EMU_PER_CM: f64 = 360_000.0;

/// EMU per millimetre.
pub const EMU_PER_MM: f64 = 36_000.0;

/// Raster formats the renderer can embed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RasterFormat {
    Png,
    Jpeg,
}

impl RasterFormat {
    pub fn extension(self) -> &'static str {
        match self {
            RasterFormat::Png => "png",
            RasterFormat::Jpeg => "jpeg",
        }
    }

    pub fn media_type(self) -> &'static str {
        match self {
            RasterFormat::Png => "image/png",
            RasterFormat::Jpeg => "image/jpeg",
        }
    }
}

/// Image bytes plus the physical size the document should show them at.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InlineImage {
    #[serde(skip_serializing)]
    pub bytes: Vec<u8>,
    pub format: RasterFormat,
    pub pixel_width: u32,
    pub pixel_height: u32,
    pub width_emu: u64,
    pub height_emu: u64,
    /// Name under which the decoded bytes were persisted, if they were.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored_as: Option<String>,
}

impl InlineImage {
    pub fn width_cm(&self) -> f64 {
        self.width_emu as f64 / EMU_PER_CM
    }

    pub fn height_cm(&self) -> f64 {
        self.height_emu as f64 / EMU_PER_CM
    }
}

/// Why a line item ended up without a picture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Absence {
    /// Nothing was supplied.
    Empty,
    /// The string is not a `data:image/...,` URI.
    NotDataUri,
    /// The payload is not valid base64.
    InvalidBase64,
    /// The bytes are not a PNG or JPEG image.
    Undecodable,
}

/// Outcome of [`resolve_image`].
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedImage {
    Decoded(InlineImage),
    Absent(Absence),
}

impl ResolvedImage {
    pub fn into_option(self) -> Option<InlineImage> {
        match self {
            ResolvedImage::Decoded(img) => Some(img),
            ResolvedImage::Absent(_) => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, ResolvedImage::Absent(_))
    }
}

/// Decode a data-URI image and size it for embedding. Never fails.
pub fn resolve_image(encoded: &str, sizing: ImageSizing) -> ResolvedImage {
    let encoded = encoded.trim();
    if encoded.is_empty() {
        return ResolvedImage::Absent(Absence::Empty);
    }

    let Some(payload) = data_uri_payload(encoded) else {
        return ResolvedImage::Absent(Absence::NotDataUri);
    };

    // Line breaks and spaces inside the payload are common in pasted data.
    let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = match STANDARD.decode(compact.as_bytes()) {
        Ok(b) if !b.is_empty() => b,
        Ok(_) => return ResolvedImage::Absent(Absence::Empty),
        Err(e) => {
            debug!("Image payload is not base64: {}", e);
            return ResolvedImage::Absent(Absence::InvalidBase64);
        }
    };

    match decode_and_size(bytes, sizing) {
        Ok(img) => ResolvedImage::Decoded(img),
        Err(e) => {
            debug!("Image bytes could not be decoded: {}", e);
            ResolvedImage::Absent(Absence::Undecodable)
        }
    }
}

/// Resolve every line item's image source in place.
///
/// Returns the number of images that resolved.
pub fn attach_images(context: &mut TemplateContext, sizing: ImageSizing) -> usize {
    let mut resolved = 0;
    for (idx, line) in context.items.iter_mut().enumerate() {
        match resolve_image(&line.image_source, sizing) {
            ResolvedImage::Decoded(img) => {
                debug!(
                    "Line {}: image {}x{} px → {:.2}x{:.2} cm",
                    idx + 1,
                    img.pixel_width,
                    img.pixel_height,
                    img.width_cm(),
                    img.height_cm()
                );
                line.image = Some(img);
                resolved += 1;
            }
            ResolvedImage::Absent(Absence::Empty) => line.image = None,
            ResolvedImage::Absent(reason) => {
                debug!("Line {}: image dropped ({:?})", idx + 1, reason);
                line.image = None;
            }
        }
    }
    resolved
}

/// The part after the first comma of a `data:image/...` URI.
fn data_uri_payload(encoded: &str) -> Option<&str> {
    let (descriptor, payload) = encoded.split_once(',')?;
    let media = descriptor.get(..11)?;
    if media.eq_ignore_ascii_case("data:image/") {
        Some(payload)
    } else {
        None
    }
}

fn decode_and_size(bytes: Vec<u8>, sizing: ImageSizing) -> Result<InlineImage, image::ImageError> {
    let source_format = image::guess_format(&bytes)?;
    let decoded = image::load_from_memory(&bytes)?;
    let (pixel_width, pixel_height) = (decoded.width(), decoded.height());

    match sizing {
        ImageSizing::FixedBox {
            width_cm,
            height_cm,
        } => {
            let mut png = Vec::new();
            decoded.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
            Ok(InlineImage {
                bytes: png,
                format: RasterFormat::Png,
                pixel_width,
                pixel_height,
                width_emu: (width_cm * EMU_PER_CM).round() as u64,
                height_emu: (height_cm * EMU_PER_CM).round() as u64,
                stored_as: None,
            })
        }
        ImageSizing::FixedWidth { width_mm } => {
            let width_emu = (width_mm * EMU_PER_MM).round() as u64;
            let height_emu = if pixel_width == 0 {
                width_emu
            } else {
                (width_emu as f64 * pixel_height as f64 / pixel_width as f64).round() as u64
            };
            let (bytes, format) = match source_format {
                ImageFormat::Jpeg => (bytes, RasterFormat::Jpeg),
                ImageFormat::Png => (bytes, RasterFormat::Png),
                _ => {
                    let mut png = Vec::new();
                    decoded.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
                    (png, RasterFormat::Png)
                }
            };
            Ok(InlineImage {
                bytes,
                format,
                pixel_width,
                pixel_height,
                width_emu,
                height_emu,
                stored_as: None,
            })
        }
    }
}
