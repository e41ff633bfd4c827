//
// storage.rs
// Dicom2Pdf-rs
//
// Provides a safe file store for generated documents with path sanitization and content hashing.
//

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};

#[derive(Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        // Create the output directory eagerly so subsequent saves do not fail at runtime.
        fs::create_dir_all(&root).context("Failed to create document directory")?;
        Ok(Self { root })
    }

    /// Persist `bytes` as `<sanitized stem>-<hash prefix>.<extension>` and return that name.
    pub fn save(&self, original_name: Option<&str>, extension: &str, bytes: &[u8]) -> Result<String> {
        let stem = stem_for(original_name);
        let hash = hex::encode(Sha256::digest(bytes));
        let filename = format!("{}-{}.{}", stem, &hash[..12], extension);
        let path = self.root.join(&filename);
        fs::write(&path, bytes).context("Failed to persist generated file")?;
        Ok(filename)
    }

    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        let candidate = self.root.join(name);
        let canonical_root = self
            .root
            .canonicalize()
            .unwrap_or_else(|_| self.root.clone());
        let canonical = candidate
            .canonicalize()
            .context("Requested file not found")?;
        // Guard against path traversal by enforcing the canonical root prefix.
        if !canonical.starts_with(&canonical_root) {
            bail!("Attempt to access file outside storage root");
        }
        Ok(canonical)
    }
}

/// Sanitized file stem of an uploaded name, or `dicom_scan` when nothing usable remains.
pub fn stem_for(original_name: Option<&str>) -> String {
    original_name
        .and_then(|n| Path::new(n).file_stem().and_then(|s| s.to_str()))
        .map(sanitize_filename)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "dicom_scan".to_string())
}

fn sanitize_filename(input: &str) -> String {
    // Keep only ASCII word characters and a few safe separators to avoid filesystem surprises.
    input
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}
