//! Configuration types for offer generation and the HTTP server.
//!
//! Everything that changes *what* ends up in the document lives in
//! [`GeneratorConfig`], built via its [`GeneratorConfigBuilder`]. Where files
//! are kept and how the server listens lives in [`ServerConfig`]. The two are
//! separate so the library can render offers without ever touching a socket
//! or a directory.

use crate::error::OfertusError;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

/// Name of the default template inside the templates directory.
pub const DEFAULT_TEMPLATE_NAME: &str = "oferta_template.docx";

/// Configuration for turning an offer record into a document.
///
/// # Example
/// ```rust
/// use ofertus::{ContextLayout, GeneratorConfig, ImageSizing};
///
/// let config = GeneratorConfig::builder()
///     .layout(ContextLayout::List)
///     .image_sizing(ImageSizing::square_cm(4.7))
///     .build()
///     .unwrap();
/// assert_eq!(config.layout, ContextLayout::List);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Shape of the template context. Default: [`ContextLayout::Positional`].
    pub layout: ContextLayout,

    /// How line-item key aliases treat falsy values. Default: [`AliasPolicy::Truthy`].
    pub alias_policy: AliasPolicy,

    /// Physical size requested for embedded line-item images.
    /// Default: 70 mm wide, height from the aspect ratio.
    pub image_sizing: ImageSizing,

    /// Write every decoded line-item image to the output directory. Default: false.
    ///
    /// The files are never cleaned up.
    pub persist_images: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            layout: ContextLayout::default(),
            alias_policy: AliasPolicy::default(),
            image_sizing: ImageSizing::default(),
            persist_images: false,
        }
    }
}

impl GeneratorConfig {
    /// Create a new builder for `GeneratorConfig`.
    pub fn builder() -> GeneratorConfigBuilder {
        GeneratorConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`GeneratorConfig`].
#[derive(Debug)]
pub struct GeneratorConfigBuilder {
    config: GeneratorConfig,
}

impl GeneratorConfigBuilder {
    pub fn layout(mut self, layout: ContextLayout) -> Self {
        self.config.layout = layout;
        self
    }

    pub fn alias_policy(mut self, policy: AliasPolicy) -> Self {
        self.config.alias_policy = policy;
        self
    }

    pub fn image_sizing(mut self, sizing: ImageSizing) -> Self {
        self.config.image_sizing = sizing;
        self
    }

    pub fn persist_images(mut self, v: bool) -> Self {
        self.config.persist_images = v;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<GeneratorConfig, OfertusError> {
        let ok = match self.config.image_sizing {
            ImageSizing::FixedWidth { width_mm } => width_mm.is_finite() && width_mm > 0.0,
            ImageSizing::FixedBox {
                width_cm,
                height_cm,
            } => {
                width_cm.is_finite() && height_cm.is_finite() && width_cm > 0.0 && height_cm > 0.0
            }
        };
        if !ok {
            return Err(OfertusError::InvalidConfig(format!(
                "image size must be positive, got {:?}",
                self.config.image_sizing
            )));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Shape of the context handed to the template.
///
/// | Layout | Systems | Line-item keys | Aliases |
/// |--------|---------|----------------|---------|
/// | `Positional` | `SYSTEM1`…`SYSTEM5` | both cases (`lp` and `LP`) | lower, upper |
/// | `List` | `SYSTEMY` list | upper case only | lower, upper, English |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextLayout {
    /// Five fixed system slots, both-case line-item keys. (default)
    #[default]
    Positional,
    /// Variable-length system list, single upper-case line-item keys.
    List,
}

/// Which values an earlier-priority alias may hold and still win.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AliasPolicy {
    /// Skip falsy values (`null`, `false`, `0`, `""`, `[]`, `{}`). (default)
    ///
    /// An explicit `0` or `""` under `lp` loses to whatever `LP` holds.
    #[default]
    Truthy,
    /// Skip only missing keys and `null`.
    Present,
}

/// Physical size requested for an embedded line-item image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum ImageSizing {
    /// Fixed width; height follows the pixel aspect ratio. Original bytes kept.
    FixedWidth { width_mm: f64 },
    /// Fixed box regardless of pixel dimensions; image re-encoded to PNG.
    FixedBox { width_cm: f64, height_cm: f64 },
}

impl Default for ImageSizing {
    fn default() -> Self {
        ImageSizing::FixedWidth { width_mm: 70.0 }
    }
}

impl ImageSizing {
    /// Square box of `side_cm` × `side_cm`.
    pub fn square_cm(side_cm: f64) -> Self {
        ImageSizing::FixedBox {
            width_cm: side_cm,
            height_cm: side_cm,
        }
    }
}

// ── Server ───────────────────────────────────────────────────────────────

/// Where the HTTP server listens and keeps its files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address. Default: `0.0.0.0:8000`.
    pub bind: SocketAddr,

    /// Holds the default template and every uploaded one. Default: `templates`.
    pub templates_dir: PathBuf,

    /// Holds generated documents and persisted images. Default: `generated`.
    pub output_dir: PathBuf,

    /// File name of the default template inside `templates_dir`.
    pub default_template: String,

    /// Largest accepted request body in bytes. Default: 25 MiB.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8000),
            templates_dir: PathBuf::from("templates"),
            output_dir: PathBuf::from("generated"),
            default_template: DEFAULT_TEMPLATE_NAME.to_string(),
            max_body_bytes: 25 * 1024 * 1024,
        }
    }
}
