//
// pipeline.rs
// Dicom2Pdf-rs
//
// Drives a conversion end to end: optional archive extraction into a scoped temp directory,
// discovery, parallel decode/normalize per file, then PDF rendering in discovery order.
//

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use thiserror::Error;
use tracing::{info, warn};

use crate::archive::{self, ArchiveError};
use crate::decode::{self, DecodeOutcome};
use crate::discover;
use crate::models::{ConversionReport, PageSummary, SkippedFile};
use crate::normalize::{NormalizeError, NormalizeOptions};
use crate::render::{self, DocumentOptions, PageImage, RenderError};

/// Everything a conversion needs, passed explicitly into the pipeline entry points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    pub normalize: NormalizeOptions,
    /// Page resolution; caps the embedded raster and leaves normalization untouched.
    pub dpi: u32,
    /// Worker threads for per-file processing; `None` uses every core.
    pub workers: Option<usize>,
    pub title: Option<String>,
    pub footer: Option<String>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            normalize: NormalizeOptions::default(),
            dpi: 100,
            workers: None,
            title: None,
            footer: None,
        }
    }
}

impl ConversionConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        self.normalize.validate()?;
        if self.dpi == 0 {
            return Err(PipelineError::InvalidConfig("dpi must be positive".into()));
        }
        if self.workers == Some(0) {
            return Err(PipelineError::InvalidConfig(
                "worker count must be positive".into(),
            ));
        }
        Ok(())
    }

    fn document_options(&self) -> DocumentOptions {
        DocumentOptions {
            dpi: self.dpi,
            title: self.title.clone(),
            footer: self.footer.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
    #[error("input {0:?} does not exist")]
    InputNotFound(PathBuf),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error("no convertible DICOM images found ({candidates} candidate file(s) examined)")]
    NoImages { candidates: usize },
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("failed to start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A finished document and the report describing what went into it.
#[derive(Debug, Clone)]
pub struct Conversion {
    pub pdf: Vec<u8>,
    pub report: ConversionReport,
}

/// Convert a directory or a zip/rar/iso archive.
pub fn convert_input(input: &Path, config: &ConversionConfig) -> Result<Conversion, PipelineError> {
    if input.is_dir() {
        return convert_directory(input, config);
    }
    if !input.is_file() {
        return Err(PipelineError::InputNotFound(input.to_path_buf()));
    }

    config.validate()?;
    // Dropped on every return path, which removes the extracted tree.
    let workspace = TempDir::new()?;
    let extracted = archive::extract(input, workspace.path())?;
    info!("Extracted {} file(s) from {:?}", extracted, input);
    convert_directory(workspace.path(), config)
}

/// Convert every DICOM file under `dir`, one page each, in discovery order.
pub fn convert_directory(dir: &Path, config: &ConversionConfig) -> Result<Conversion, PipelineError> {
    config.validate()?;

    let discovery = discover::discover(dir)?;
    info!(
        "Discovered {} DICOM file(s) under {:?} ({} rejected)",
        discovery.candidates.len(),
        dir,
        discovery.rejected.len()
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.workers.unwrap_or(0))
        .build()?;
    // Indexed collect keeps discovery order regardless of completion order.
    let processed: Vec<Result<(PageImage, PageSummary), SkippedFile>> = pool.install(|| {
        discovery
            .candidates
            .par_iter()
            .map(|path| process_file(path, &config.normalize))
            .collect()
    });

    let mut pages = Vec::new();
    let mut report = ConversionReport {
        rejected: relative_skips(dir, discovery.rejected),
        ..ConversionReport::default()
    };
    for result in processed {
        match result {
            Ok((page, mut summary)) => {
                summary.path = relative(dir, &summary.path);
                pages.push(page);
                report.pages.push(summary);
            }
            Err(skipped) => {
                warn!("Skipping {:?}: {}", skipped.path, skipped.reason);
                report.skipped.push(SkippedFile {
                    path: relative(dir, &skipped.path),
                    reason: skipped.reason,
                });
            }
        }
    }

    if pages.is_empty() {
        return Err(PipelineError::NoImages {
            candidates: discovery.candidates.len(),
        });
    }

    let pdf = render::render_document(&pages, &config.document_options())?;
    info!(
        "Rendered {} page(s), skipped {} file(s)",
        report.pages.len(),
        report.skipped.len()
    );
    Ok(Conversion { pdf, report })
}

/// Convert `input` and write the PDF to `output`, creating parent directories as needed.
pub fn convert_to_file(
    input: &Path,
    output: &Path,
    config: &ConversionConfig,
) -> Result<ConversionReport, PipelineError> {
    let conversion = convert_input(input, config)?;
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(output, &conversion.pdf)?;
    info!("PDF written to {:?}", output);
    Ok(conversion.report)
}

fn process_file(
    path: &Path,
    options: &NormalizeOptions,
) -> Result<(PageImage, PageSummary), SkippedFile> {
    let skip = |reason: String| SkippedFile {
        path: path.to_path_buf(),
        reason,
    };

    let decoded = match decode::decode_file(path) {
        DecodeOutcome::Decoded(image) => image,
        DecodeOutcome::Unreadable { reason, .. } => return Err(skip(reason)),
    };
    let display = decoded
        .grid
        .normalize(options)
        .map_err(|e| skip(e.to_string()))?;
    let image = render::to_gray8(&display).map_err(|e| skip(e.to_string()))?;

    let caption = decoded.metadata.caption();
    Ok((
        PageImage {
            image,
            caption: caption.clone(),
        },
        PageSummary {
            path: decoded.path,
            caption,
            sample_type: decoded.grid.sample_type().to_string(),
            metadata: decoded.metadata,
        },
    ))
}

fn relative(root: &Path, path: &Path) -> PathBuf {
    path.strip_prefix(root).unwrap_or(path).to_path_buf()
}

fn relative_skips(root: &Path, skipped: Vec<SkippedFile>) -> Vec<SkippedFile> {
    skipped
        .into_iter()
        .map(|s| SkippedFile {
            path: relative(root, &s.path),
            reason: s.reason,
        })
        .collect()
}
