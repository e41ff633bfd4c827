use anyhow::{Context, Result};
use std::path::Path;

use crate::decode;
use crate::grid::RawGrid;
use crate::models::GridStatistics;
use crate::normalize::{NormalizeError, NormalizeOptions};

/// Summarise the finite samples of a grid together with the clip bounds normalization would use.
pub fn grid_statistics(
    grid: &RawGrid,
    options: &NormalizeOptions,
) -> Result<GridStatistics, NormalizeError> {
    let (p_low, p_high) = grid.percentile_bounds(options)?;
    let (rows, columns) = grid.dim();
    let wide = grid.to_f64();

    let finite: Vec<f64> = wide.iter().copied().filter(|v| v.is_finite()).collect();
    let (min, max, mean, std_dev) = compute_stats(&finite);

    Ok(GridStatistics {
        rows,
        columns,
        sample_type: grid.sample_type().to_string(),
        finite_samples: finite.len(),
        min,
        max,
        mean,
        std_dev,
        p_low,
        p_high,
        degenerate: p_high <= p_low,
    })
}

pub fn statistics_for_file(input: &Path, options: &NormalizeOptions) -> Result<GridStatistics> {
    let obj = dicom::object::open_file(input).context("Failed to open DICOM file")?;
    let grid = decode::decode_first_frame(&obj)?;
    Ok(grid_statistics(&grid, options)?)
}

fn compute_stats(values: &[f64]) -> (f64, f64, f64, f64) {
    let min = values.iter().fold(f64::INFINITY, |a, &b| a.min(b));
    let max = values.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
    let count = values.len() as f64;
    let mean = values.iter().sum::<f64>() / count;

    let variance = values
        .iter()
        .map(|x| {
            let diff = mean - x;
            diff * diff
        })
        .sum::<f64>()
        / count;

    (min, max, mean, variance.sqrt())
}
