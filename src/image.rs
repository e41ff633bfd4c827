//
// image.rs
// Dicom2Pdf-rs
//
// Renders the normalized first frame of a single DICOM file as a standalone grayscale PNG preview.
//

use anyhow::{anyhow, Context, Result};
use image::{DynamicImage, GrayImage, ImageFormat};
use std::io::Cursor;
use std::path::{Path, PathBuf};

use crate::decode::{self, DecodeOutcome};
use crate::normalize::NormalizeOptions;
use crate::render;

/// Decode, normalize and quantise one file exactly as it would appear on a document page.
pub fn render_preview(input: &Path, options: &NormalizeOptions) -> Result<GrayImage> {
    let decoded = match decode::decode_file(input) {
        DecodeOutcome::Decoded(image) => image,
        DecodeOutcome::Unreadable { path, reason } => {
            return Err(anyhow!("{:?} is unreadable: {}", path, reason))
        }
    };
    let display = decoded
        .grid
        .normalize(options)
        .context("Failed to normalize pixel data")?;
    Ok(render::to_gray8(&display)?)
}

pub fn preview_png_bytes(input: &Path, options: &NormalizeOptions) -> Result<Vec<u8>> {
    let preview = render_preview(input, options)?;
    encode_image(&DynamicImage::ImageLuma8(preview), ImageFormat::Png)
}

/// Write the preview next to the input (`.png`) unless an output path is given.
pub fn convert(input: &Path, output: Option<PathBuf>, options: &NormalizeOptions) -> Result<PathBuf> {
    let output = output.unwrap_or_else(|| input.with_extension("png"));
    let preview = render_preview(input, options)?;
    preview
        .save(&output)
        .with_context(|| format!("Failed to save image to {:?}", output))?;
    Ok(output)
}

fn encode_image(image: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    image.write_to(&mut Cursor::new(&mut buffer), format)?;
    Ok(buffer)
}
