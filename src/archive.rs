//
// archive.rs
// Dicom2Pdf-rs
//
// Recognises uploaded archive containers and unpacks zip archives into a working directory.
//

use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};
use zip::ZipArchive;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    Rar,
    Iso,
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::Rar => "rar",
            ArchiveFormat::Iso => "iso",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("{0:?} is not a recognised archive (expected zip, rar or iso)")]
    Unrecognized(PathBuf),
    #[error("{0} archives cannot be extracted by this build")]
    Unsupported(ArchiveFormat),
    #[error("corrupt zip archive: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const ZIP_EMPTY_MAGIC: &[u8] = b"PK\x05\x06";
const RAR_MAGIC: &[u8] = b"Rar!\x1a\x07";
const ISO_MAGIC: &[u8] = b"CD001";
// The first ISO 9660 volume descriptor lives at sector 16; its identifier starts one byte in.
const ISO_MAGIC_OFFSET: usize = 16 * 2048 + 1;

impl ArchiveFormat {
    /// Sniff the container type from its leading bytes, falling back to the file extension.
    pub fn detect(path: &Path) -> io::Result<Option<Self>> {
        let mut head = Vec::with_capacity(ISO_MAGIC_OFFSET + ISO_MAGIC.len());
        File::open(path)?
            .take((ISO_MAGIC_OFFSET + ISO_MAGIC.len()) as u64)
            .read_to_end(&mut head)?;

        Ok(Self::from_magic(&head).or_else(|| Self::from_extension(path)))
    }

    pub fn from_magic(head: &[u8]) -> Option<Self> {
        if head.starts_with(ZIP_MAGIC) || head.starts_with(ZIP_EMPTY_MAGIC) {
            Some(ArchiveFormat::Zip)
        } else if head.starts_with(RAR_MAGIC) {
            Some(ArchiveFormat::Rar)
        } else if head.get(ISO_MAGIC_OFFSET..ISO_MAGIC_OFFSET + ISO_MAGIC.len()) == Some(ISO_MAGIC) {
            Some(ArchiveFormat::Iso)
        } else {
            None
        }
    }

    pub fn from_extension(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_string_lossy().to_ascii_lowercase();
        match ext.as_str() {
            "zip" => Some(ArchiveFormat::Zip),
            "rar" => Some(ArchiveFormat::Rar),
            "iso" => Some(ArchiveFormat::Iso),
            _ => None,
        }
    }
}

/// Unpack `archive` under `dest` and return the number of files written.
///
/// Entries whose names would land outside `dest` are skipped.
pub fn extract(archive: &Path, dest: &Path) -> Result<usize, ArchiveError> {
    match ArchiveFormat::detect(archive)? {
        Some(ArchiveFormat::Zip) => extract_zip(archive, dest),
        Some(format) => Err(ArchiveError::Unsupported(format)),
        None => Err(ArchiveError::Unrecognized(archive.to_path_buf())),
    }
}

fn extract_zip(zip_path: &Path, dest: &Path) -> Result<usize, ArchiveError> {
    let file = File::open(zip_path)?;
    let mut archive = ZipArchive::new(BufReader::new(file))?;
    let mut written = 0;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        let relative = match entry.enclosed_name() {
            Some(name) => name.to_path_buf(),
            None => {
                warn!("Skipping archive entry with unsafe path: {}", entry.name());
                continue;
            }
        };

        let target = dest.join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut output = File::create(&target)?;
        io::copy(&mut entry, &mut output)?;
        written += 1;
    }

    debug!("Extracted {} file(s) from {:?}", written, zip_path);
    Ok(written)
}
