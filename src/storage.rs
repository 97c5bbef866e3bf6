//! Where templates come from and where generated files go.
//!
//! [`DocumentStore`] is the only thing in the crate that touches persistent
//! state. [`DiskStore`] keeps the classic two-directory layout:
//!
//! ```text
//! templates/
//!   oferta_template.docx      default template
//!   uploaded_<hex>.docx       ad-hoc uploads, kept indefinitely
//! generated/
//!   oferta_<hex>.docx         rendered offers
//!   image_<hex>.png           decoded line-item images (when persisted)
//! ```
//!
//! Nothing is ever deleted. [`MemoryStore`] does the same in RAM for tests.

use crate::error::OfertusError;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

/// A file handed to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// File name, unique per store.
    pub name: String,
    /// Human-readable location (a path for disk stores).
    pub location: String,
}

/// What is being written to the output area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// A rendered `.docx`.
    Document,
    /// A decoded line-item image with the given file extension.
    Image(&'static str),
}

impl OutputKind {
    /// Fresh, random file name for this kind of output.
    pub fn file_name(self) -> String {
        let id = Uuid::new_v4().simple();
        match self {
            OutputKind::Document => format!("oferta_{id}.docx"),
            OutputKind::Image(ext) => format!("image_{id}.{ext}"),
        }
    }
}

/// Fresh, random file name for an uploaded template.
pub fn uploaded_template_name() -> String {
    format!("uploaded_{}.docx", Uuid::new_v4().simple())
}

/// Storage collaborator for templates and generated files.
pub trait DocumentStore: Send + Sync {
    /// The default template, or `None` when there is none.
    fn default_template(&self) -> Result<Option<Vec<u8>>, OfertusError>;

    /// Keep an uploaded template. The default template is never touched.
    fn store_template(&self, bytes: &[u8]) -> Result<StoredFile, OfertusError>;

    /// Keep a generated file.
    fn store_output(&self, kind: OutputKind, bytes: &[u8]) -> Result<StoredFile, OfertusError>;

    /// Error to report when no template is available.
    fn missing_template(&self) -> OfertusError;
}

// ── Disk ─────────────────────────────────────────────────────────────────

/// Templates and outputs in two directories on disk.
#[derive(Debug, Clone)]
pub struct DiskStore {
    templates_dir: PathBuf,
    output_dir: PathBuf,
    default_template: String,
}

impl DiskStore {
    /// Open (creating if needed) the template and output directories.
    pub fn open(
        templates_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        default_template: impl Into<String>,
    ) -> Result<Self, OfertusError> {
        let store = Self {
            templates_dir: templates_dir.into(),
            output_dir: output_dir.into(),
            default_template: default_template.into(),
        };
        for dir in [&store.templates_dir, &store.output_dir] {
            std::fs::create_dir_all(dir).map_err(|e| OfertusError::Storage {
                path: dir.clone(),
                source: e,
            })?;
        }
        info!(
            "Storage ready: templates in {}, output in {}",
            store.templates_dir.display(),
            store.output_dir.display()
        );
        Ok(store)
    }

    pub fn templates_dir(&self) -> &Path {
        &self.templates_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn default_template_path(&self) -> PathBuf {
        self.templates_dir.join(&self.default_template)
    }
}

impl DocumentStore for DiskStore {
    fn default_template(&self) -> Result<Option<Vec<u8>>, OfertusError> {
        let path = self.default_template_path();
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(OfertusError::Storage { path, source: e }),
        }
    }

    fn store_template(&self, bytes: &[u8]) -> Result<StoredFile, OfertusError> {
        let name = uploaded_template_name();
        let path = self.templates_dir.join(&name);
        write_atomic(&path, bytes).map_err(|e| OfertusError::Storage {
            path: path.clone(),
            source: e,
        })?;
        debug!("Stored uploaded template: {}", path.display());
        Ok(StoredFile {
            name,
            location: path.display().to_string(),
        })
    }

    fn store_output(&self, kind: OutputKind, bytes: &[u8]) -> Result<StoredFile, OfertusError> {
        let name = kind.file_name();
        let path = self.output_dir.join(&name);
        write_atomic(&path, bytes).map_err(|e| OfertusError::OutputWriteFailed {
            path: path.clone(),
            source: e,
        })?;
        debug!("Stored {:?}: {} ({} bytes)", kind, path.display(), bytes.len());
        Ok(StoredFile {
            name,
            location: path.display().to_string(),
        })
    }

    fn missing_template(&self) -> OfertusError {
        OfertusError::MissingTemplate {
            name: self.default_template.clone(),
            dir: self.templates_dir.clone(),
        }
    }
}

/// Write `bytes` to `path` via a temp file in the same directory and a rename,
/// so readers never see a half-written file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

// ── Memory ───────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct MemoryState {
    default_template: Option<Vec<u8>>,
    templates: Vec<(String, Vec<u8>)>,
    outputs: Vec<(String, Vec<u8>)>,
}

/// In-memory store; everything written is kept for inspection.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with a default template.
    pub fn with_default_template(bytes: Vec<u8>) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                default_template: Some(bytes),
                ..Default::default()
            }),
        }
    }

    /// Uploaded templates, in the order they were stored.
    pub fn templates(&self) -> Vec<(String, Vec<u8>)> {
        self.state
            .lock()
            .map(|s| s.templates.clone())
            .unwrap_or_default()
    }

    /// Generated files, in the order they were stored.
    pub fn outputs(&self) -> Vec<(String, Vec<u8>)> {
        self.state
            .lock()
            .map(|s| s.outputs.clone())
            .unwrap_or_default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MemoryState) -> T) -> Result<T, OfertusError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| OfertusError::Internal("memory store lock poisoned".into()))?;
        Ok(f(&mut state))
    }
}

impl DocumentStore for MemoryStore {
    fn default_template(&self) -> Result<Option<Vec<u8>>, OfertusError> {
        self.with_state(|s| s.default_template.clone())
    }

    fn store_template(&self, bytes: &[u8]) -> Result<StoredFile, OfertusError> {
        let name = uploaded_template_name();
        self.with_state(|s| s.templates.push((name.clone(), bytes.to_vec())))?;
        Ok(StoredFile {
            location: format!("memory://templates/{name}"),
            name,
        })
    }

    fn store_output(&self, kind: OutputKind, bytes: &[u8]) -> Result<StoredFile, OfertusError> {
        let name = kind.file_name();
        self.with_state(|s| s.outputs.push((name.clone(), bytes.to_vec())))?;
        Ok(StoredFile {
            location: format!("memory://generated/{name}"),
            name,
        })
    }

    fn missing_template(&self) -> OfertusError {
        OfertusError::MissingTemplate {
            name: crate::config::DEFAULT_TEMPLATE_NAME.to_string(),
            dir: PathBuf::from("memory://templates"),
        }
    }
}
