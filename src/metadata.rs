use std::path::Path;

use anyhow::{Context, Result};
use dicom::core::Tag;
use dicom::object::{open_file, DefaultDicomObject};

use crate::decode;
use crate::dicom_access::ElementAccess;
use crate::models::PageMetadata;
use crate::normalize::NormalizeOptions;
use crate::stats;

pub fn extract_page_metadata<T: ElementAccess>(obj: &T) -> PageMetadata {
    PageMetadata {
        patient_name: obj.element_str(Tag(0x0010, 0x0010)),
        series_description: obj.element_str(Tag(0x0008, 0x103E)),
        instance_number: obj.element_i32(Tag(0x0020, 0x0013)),
        slice_location: obj.element_f64(Tag(0x0020, 0x1041)),
        study_date: obj.element_str(Tag(0x0008, 0x0020)),
        modality: obj.element_str(Tag(0x0008, 0x0060)),
        rows: obj.element_u32(Tag(0x0028, 0x0010)),
        columns: obj.element_u32(Tag(0x0028, 0x0011)),
    }
}

pub fn read_page_metadata(path: &Path) -> Result<PageMetadata> {
    let obj: DefaultDicomObject = open_file(path).context("Failed to open DICOM file")?;
    Ok(extract_page_metadata(&obj))
}

fn or_na<T: ToString>(value: &Option<T>) -> String {
    value
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "N/A".to_string())
}

/// Print caption fields plus the raw sample statistics that drive normalization.
pub fn print_info(path: &Path, options: &NormalizeOptions) -> Result<()> {
    let obj: DefaultDicomObject = open_file(path).context("Failed to open DICOM file")?;
    let page = extract_page_metadata(&obj);

    println!("{}", "=".repeat(80));
    println!("DICOM File Information: {}", path.display());
    println!("{}", "=".repeat(80));

    println!("PATIENT");
    println!("  Name: {}", or_na(&page.patient_name));
    println!("  Caption: {}", page.caption());

    println!("\nSERIES");
    println!("  Description: {}", or_na(&page.series_description));
    println!("  Study Date:  {}", or_na(&page.study_date));
    println!("  Modality:    {}", or_na(&page.modality));
    println!("  Instance:    {}", or_na(&page.instance_number));
    println!("  Slice Loc.:  {}", or_na(&page.slice_location));

    println!("\nIMAGE");
    println!("  Rows:    {}", or_na(&page.rows));
    println!("  Columns: {}", or_na(&page.columns));

    // Pixel problems are reported, not fatal: the header is still worth showing.
    match decode::decode_first_frame(&obj) {
        Ok(grid) => {
            let stats = stats::grid_statistics(&grid, options)?;
            println!("\nSAMPLES ({})", stats.sample_type);
            println!("  Shape:  {}x{}", stats.rows, stats.columns);
            println!("  Min:    {:.2}", stats.min);
            println!("  Max:    {:.2}", stats.max);
            println!("  Mean:   {:.2}", stats.mean);
            println!("  StdDv:  {:.2}", stats.std_dev);
            println!(
                "  Clip:   [{:.2}, {:.2}] (p{} / p{})",
                stats.p_low, stats.p_high, options.low_percentile, options.high_percentile
            );
            if stats.degenerate {
                println!("  Range is flat after clipping; the page renders as a constant tone.");
            }
        }
        Err(e) => println!("\nSAMPLES\n  unreadable: {:#}", e),
    }

    Ok(())
}
