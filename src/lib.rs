//
// lib.rs
// Dicom2Pdf-rs
//
// Exposes the crate's modules and re-exports the CLI entry point for both binary and library consumers.
//

// Public surface of the library: the normalizer, the pipeline stages around it, and the two shells.
pub mod archive;
pub mod cli;
pub mod decode;
pub mod dicom_access;
pub mod discover;
pub mod grid;
pub mod image;
pub mod metadata;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod render;
pub mod stats;
pub mod storage;
pub mod web;

pub use cli::{run as run_cli, Cli, Commands};
pub use normalize::{normalize, normalize_with, NormalizeError, NormalizeOptions};
pub use pipeline::{convert_input, convert_to_file, ConversionConfig};
