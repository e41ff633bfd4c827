use std::io;
use std::path::{Path, PathBuf};

use dicom::dictionary_std::tags;
use dicom::object::OpenFileOptions;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::models::SkippedFile;

/// Files that parsed as DICOM, in walk order, plus the candidates that did not.
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    pub candidates: Vec<PathBuf>,
    pub rejected: Vec<SkippedFile>,
}

/// Walk `root` recursively and keep every file whose name and header look like DICOM.
///
/// Order is by file name within each directory, so it is stable across runs and platforms.
pub fn discover(root: &Path) -> io::Result<Discovery> {
    if !root.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} is not a directory", root.display()),
        ));
    }

    let mut discovery = Discovery::default();
    let entries = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping unreadable directory entry: {}", e);
                None
            }
        })
        .filter(|e| e.file_type().is_file() && has_dicom_name(e.path()));

    for entry in entries {
        let path = entry.into_path();
        match probe(&path) {
            Ok(()) => discovery.candidates.push(path),
            Err(reason) => {
                debug!("Not a DICOM file {:?}: {}", path, reason);
                discovery.rejected.push(SkippedFile { path, reason });
            }
        }
    }

    Ok(discovery)
}

/// `.dcm`, `.dicom` (any case) or no extension at all, as scanners often write bare names.
pub fn has_dicom_name(path: &Path) -> bool {
    match path.extension() {
        None => true,
        Some(ext) => {
            let ext = ext.to_string_lossy();
            ext.eq_ignore_ascii_case("dcm") || ext.eq_ignore_ascii_case("dicom")
        }
    }
}

/// Parse the header only; pixel data is left for the decoder.
fn probe(path: &Path) -> Result<(), String> {
    OpenFileOptions::new()
        .read_until(tags::PIXEL_DATA)
        .open_file(path)
        .map(|_| ())
        .map_err(|e| e.to_string())
}
