pub mod layout;
pub mod pdf;

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::models::InspectionResult;

pub use layout::{ReportLayout, build_layout};

#[derive(Error, Debug)]
pub enum ReportBuildError {
    #[error("Annotated image not found: {0:?}")]
    MissingImage(PathBuf),

    #[error("Failed to decode annotated image {path:?}: {reason}")]
    ImageDecode { path: PathBuf, reason: String },

    #[error("Failed to format report date: {0}")]
    Timestamp(#[from] time::error::Format),

    #[error("PDF generation failed: {0}")]
    Render(String),

    #[error("Failed to write report {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A finished report. Never mutated after `ReportBuilder::build` returns it.
#[derive(Debug, Clone)]
pub struct Report {
    file_name: String,
    path: PathBuf,
    bytes: Vec<u8>,
    layout: ReportLayout,
}

impl Report {
    /// `<inspection_id>.pdf`
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Local copy on disk. Not cleaned up by the pipeline.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The tabular content the PDF was rendered from.
    pub fn layout(&self) -> &ReportLayout {
        &self.layout
    }
}

/// Renders inspection results into PDF files under `output_dir`.
#[derive(Debug, Clone)]
pub struct ReportBuilder {
    output_dir: PathBuf,
}

impl ReportBuilder {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn build(&self, result: &InspectionResult) -> Result<Report, ReportBuildError> {
        let layout = build_layout(result)?;
        let bytes = pdf::render(&layout)?;

        let file_name = format!("{}.pdf", result.inspection_id);
        let path = self.output_dir.join(&file_name);
        std::fs::create_dir_all(&self.output_dir)
            .and_then(|_| std::fs::write(&path, &bytes))
            .map_err(|source| ReportBuildError::Write {
                path: path.clone(),
                source,
            })?;

        Ok(Report {
            file_name,
            path,
            bytes,
            layout,
        })
    }
}
