//
// models.rs
// Dicom2Pdf-rs
//
// Defines serializable data structures for page captions, conversion reports, and raw grid statistics.
//

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Placeholder shown wherever a caption field is absent from the file.
pub const UNKNOWN: &str = "Unknown";

/// Per-file fields used for page captions and summaries. Every field is optional; nothing is
/// substituted until [`PageMetadata::caption`] renders them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageMetadata {
    pub patient_name: Option<String>,
    pub series_description: Option<String>,
    pub instance_number: Option<i32>,
    pub slice_location: Option<f64>,
    pub study_date: Option<String>,
    pub modality: Option<String>,
    pub rows: Option<u32>,
    pub columns: Option<u32>,
}

impl PageMetadata {
    /// `"<subject> | <series>"`, with absent fields shown as "Unknown".
    pub fn caption(&self) -> String {
        let subject = self
            .patient_name
            .as_deref()
            .map(display_person_name)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| UNKNOWN.to_string());
        let series = self.series_description.as_deref().unwrap_or(UNKNOWN);
        format!("{} | {}", subject, series)
    }
}

/// DICOM person names separate components with `^`; show them space separated.
fn display_person_name(raw: &str) -> String {
    raw.split('^')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// A file that did not make it into the document, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// One rendered page, in document order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageSummary {
    pub path: PathBuf,
    pub caption: String,
    pub sample_type: String,
    pub metadata: PageMetadata,
}

/// Outcome of a whole conversion: pages written plus every file left out.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversionReport {
    pub pages: Vec<PageSummary>,
    /// Files that failed the DICOM probe during discovery.
    pub rejected: Vec<SkippedFile>,
    /// Probed DICOM files that could not be decoded or normalized.
    pub skipped: Vec<SkippedFile>,
}

/// Raw sample statistics over the finite values of a grid, alongside its clip bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridStatistics {
    pub rows: usize,
    pub columns: usize,
    pub sample_type: String,
    pub finite_samples: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub p_low: f64,
    pub p_high: f64,
    /// The clipped range is empty, so normalization takes the flat-image path.
    pub degenerate: bool,
}
