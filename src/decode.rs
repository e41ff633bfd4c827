//
// decode.rs
// Dicom2Pdf-rs
//
// Opens one DICOM file and yields its caption metadata plus the raw first-frame sample grid,
// or a typed reason why the file cannot become a page.
//

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use dicom::object::{open_file, DefaultDicomObject};
use dicom::pixeldata::PixelDecoder;
use dicom_pixeldata::{ConvertOptions, ModalityLutOption, PixelRepresentation, VoiLutOption};
use ndarray::{Array2, ArrayD, Axis, Ix3};

use crate::grid::RawGrid;
use crate::metadata;
use crate::models::PageMetadata;

#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub path: PathBuf,
    pub grid: RawGrid,
    pub metadata: PageMetadata,
}

/// Per-file decode result; unreadable files carry the reason instead of an error.
#[derive(Debug, Clone)]
pub enum DecodeOutcome {
    Decoded(DecodedImage),
    Unreadable { path: PathBuf, reason: String },
}

impl DecodeOutcome {
    pub fn path(&self) -> &Path {
        match self {
            DecodeOutcome::Decoded(image) => &image.path,
            DecodeOutcome::Unreadable { path, .. } => path,
        }
    }
}

pub fn decode_file(path: &Path) -> DecodeOutcome {
    match try_decode(path) {
        Ok(image) => DecodeOutcome::Decoded(image),
        Err(e) => DecodeOutcome::Unreadable {
            path: path.to_path_buf(),
            reason: format!("{:#}", e),
        },
    }
}

fn try_decode(path: &Path) -> Result<DecodedImage> {
    let obj = open_file(path).context("Failed to open DICOM file")?;
    let metadata = metadata::extract_page_metadata(&obj);
    let grid = decode_first_frame(&obj)?;
    Ok(DecodedImage {
        path: path.to_path_buf(),
        grid,
        metadata,
    })
}

/// Decode the stored sample values of the first frame, with no modality or VOI LUT applied.
pub fn decode_first_frame(obj: &DefaultDicomObject) -> Result<RawGrid> {
    let decoded = obj
        .decode_pixel_data()
        .context("Failed to decode pixel data")?;

    let options = ConvertOptions::new()
        .with_modality_lut(ModalityLutOption::None)
        .with_voi_lut(VoiLutOption::Identity);
    let bits_allocated = decoded.bits_allocated();

    let grid = if decoded.pixel_representation() == PixelRepresentation::Unsigned {
        if bits_allocated <= 8 {
            let arr = decoded
                .to_ndarray_with_options::<u8>(&options)
                .context("Failed to convert to u8 ndarray")?;
            first_frame(arr.into_dyn(), RawGrid::U8)?
        } else if bits_allocated <= 16 {
            let arr = decoded
                .to_ndarray_with_options::<u16>(&options)
                .context("Failed to convert to u16 ndarray")?;
            first_frame(arr.into_dyn(), RawGrid::U16)?
        } else {
            let arr = decoded
                .to_ndarray_with_options::<u32>(&options)
                .context("Failed to convert to u32 ndarray")?;
            first_frame(arr.into_dyn(), RawGrid::U32)?
        }
    } else if bits_allocated <= 8 {
        let arr = decoded
            .to_ndarray_with_options::<i8>(&options)
            .context("Failed to convert to i8 ndarray")?;
        first_frame(arr.into_dyn(), RawGrid::I8)?
    } else if bits_allocated <= 16 {
        let arr = decoded
            .to_ndarray_with_options::<i16>(&options)
            .context("Failed to convert to i16 ndarray")?;
        first_frame(arr.into_dyn(), RawGrid::I16)?
    } else {
        let arr = decoded
            .to_ndarray_with_options::<i32>(&options)
            .context("Failed to convert to i32 ndarray")?;
        first_frame(arr.into_dyn(), RawGrid::I32)?
    };

    Ok(grid)
}

/// Samples arrive as `[frame, row, column, sample]`. Keep frame 0; colour samples are averaged.
fn first_frame<T>(samples: ArrayD<T>, wrap: fn(Array2<T>) -> RawGrid) -> Result<RawGrid>
where
    T: Copy + Into<f64>,
{
    if samples.ndim() != 4 {
        bail!("Unexpected pixel array shape {:?}", samples.shape());
    }
    if samples.len_of(Axis(0)) == 0 || samples.len_of(Axis(3)) == 0 {
        bail!("Pixel data holds no frames");
    }

    let frame = samples
        .index_axis_move(Axis(0), 0)
        .into_dimensionality::<Ix3>()
        .context("Unexpected frame layout")?;

    if frame.len_of(Axis(2)) == 1 {
        return Ok(wrap(frame.index_axis_move(Axis(2), 0)));
    }

    let luminance = frame.map_axis(Axis(2), |pixel| {
        pixel.iter().map(|&v| Into::<f64>::into(v)).sum::<f64>() / pixel.len() as f64
    });
    Ok(RawGrid::F64(luminance))
}
