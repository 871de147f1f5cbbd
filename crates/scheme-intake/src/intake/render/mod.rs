mod flatten;
mod layout;
mod pdf;

pub use flatten::{flatten, FlatFields, KEY_SEPARATOR, LIST_SEPARATOR};
pub use layout::{paginate, FontWeight, Page, PageGeometry, PlacedText};

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use super::domain::ApplicationId;

pub const ARTIFACT_EXTENSION: &str = ".pdf";
pub const DOWNLOAD_PREFIX: &str = "/download/application";

/// Produces the printable record for a submitted application.
pub trait DocumentRenderer: Send + Sync {
    fn render(
        &self,
        fields: &FlatFields,
        application_id: &ApplicationId,
    ) -> Result<ArtifactLocator, RenderError>;

    /// Bytes of a previously rendered artifact, addressed by its validated filename.
    fn load(&self, filename: &str) -> Result<Vec<u8>, RenderError>;
}

/// Name of a rendered artifact; download references are always derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactLocator {
    pub filename: String,
}

impl ArtifactLocator {
    pub fn for_application(application_id: &ApplicationId) -> Self {
        Self {
            filename: format!("{}{ARTIFACT_EXTENSION}", application_id.0),
        }
    }

    pub fn download_path(&self) -> String {
        format!("{DOWNLOAD_PREFIX}/{}", self.filename)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("invalid filename format: {0}")]
    InvalidFilename(String),
    #[error("rendered artifact {0} not found")]
    Missing(String),
    #[error("failed to write rendered artifact: {0}")]
    Io(#[from] io::Error),
}

/// Reject anything that could escape the artifact directory before it is joined to a path.
pub fn validate_filename(filename: &str) -> Result<&str, RenderError> {
    let traversal = filename.contains("..") || filename.contains('/') || filename.contains('\\');
    let stem = filename.strip_suffix(ARTIFACT_EXTENSION);
    match stem {
        Some(stem) if !traversal && !stem.is_empty() => Ok(filename),
        _ => Err(RenderError::InvalidFilename(filename.to_string())),
    }
}

/// Writes one PDF per application into a fixed directory.
#[derive(Debug, Clone)]
pub struct PdfRenderer {
    output_dir: PathBuf,
    geometry: PageGeometry,
}

impl PdfRenderer {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            geometry: PageGeometry::default(),
        }
    }

    pub fn with_geometry(mut self, geometry: PageGeometry) -> Self {
        self.geometry = geometry;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn artifact_path(&self, filename: &str) -> Result<PathBuf, RenderError> {
        let filename = validate_filename(filename)?;
        Ok(self.output_dir.join(filename))
    }

    pub fn read_artifact(&self, filename: &str) -> Result<Vec<u8>, RenderError> {
        let path = self.artifact_path(filename)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(RenderError::Missing(filename.to_string()))
            }
            Err(err) => Err(RenderError::Io(err)),
        }
    }
}

impl DocumentRenderer for PdfRenderer {
    fn render(
        &self,
        fields: &FlatFields,
        application_id: &ApplicationId,
    ) -> Result<ArtifactLocator, RenderError> {
        let locator = ArtifactLocator::for_application(application_id);
        let path = self.artifact_path(&locator.filename)?;

        let lossy: Vec<&str> = fields
            .iter()
            .filter(|(label, value)| {
                pdf::substituted_glyphs(label) + pdf::substituted_glyphs(value) > 0
            })
            .map(|(label, _)| label.as_str())
            .collect();
        if !lossy.is_empty() {
            warn!(
                application_id = %application_id,
                fields = ?lossy,
                "non-ASCII text printed as '?' in rendered record"
            );
        }

        let title = format!("Scheme Application {application_id}");
        let pages = paginate(&title, fields, &self.geometry);
        let bytes = pdf::encode(&pages, &self.geometry);

        fs::create_dir_all(&self.output_dir)?;
        let staging = path.with_extension("pdf.partial");
        fs::write(&staging, &bytes)?;
        fs::rename(&staging, &path)?;

        debug!(
            application_id = %application_id,
            pages = pages.len(),
            "rendered application record"
        );
        Ok(locator)
    }

    fn load(&self, filename: &str) -> Result<Vec<u8>, RenderError> {
        self.read_artifact(filename)
    }
}
