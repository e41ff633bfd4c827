//
// normalize.rs
// Dicom2Pdf-rs
//
// Turns raw sample grids of any numeric type into display grids in [0, 1] using percentile clipping,
// a min/max rescale with a flat-image guard, and a gamma-style contrast exponent.
//

use clap::ValueEnum;
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_LOW_PERCENTILE: f64 = 2.0;
pub const DEFAULT_HIGH_PERCENTILE: f64 = 98.0;
pub const DEFAULT_CONTRAST_EXPONENT: f64 = 0.9;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NormalizeError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

fn invalid(reason: impl Into<String>) -> NormalizeError {
    NormalizeError::InvalidInput(reason.into())
}

/// How a percentile is read off the sorted samples when its rank falls between two of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum PercentileMethod {
    /// Linear interpolation between the two closest ranks.
    #[default]
    Linear,
    Lower,
    Higher,
    /// Closest rank, ties to even.
    Nearest,
    Midpoint,
}

/// Tuning knobs for [`normalize_with`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeOptions {
    pub low_percentile: f64,
    pub high_percentile: f64,
    /// Exponent applied after rescaling: below 1 brightens midtones, above 1 darkens them.
    pub contrast_exponent: f64,
    pub method: PercentileMethod,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            low_percentile: DEFAULT_LOW_PERCENTILE,
            high_percentile: DEFAULT_HIGH_PERCENTILE,
            contrast_exponent: DEFAULT_CONTRAST_EXPONENT,
            method: PercentileMethod::Linear,
        }
    }
}

impl NormalizeOptions {
    pub fn with_contrast(contrast_exponent: f64) -> Self {
        Self {
            contrast_exponent,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), NormalizeError> {
        if !self.contrast_exponent.is_finite() || self.contrast_exponent <= 0.0 {
            return Err(invalid(format!(
                "contrast exponent must be a positive number, got {}",
                self.contrast_exponent
            )));
        }
        let in_range = |p: f64| (0.0..=100.0).contains(&p);
        if !in_range(self.low_percentile) || !in_range(self.high_percentile) {
            return Err(invalid(format!(
                "percentiles must lie in [0, 100], got {} and {}",
                self.low_percentile, self.high_percentile
            )));
        }
        if self.low_percentile > self.high_percentile {
            return Err(invalid(format!(
                "low percentile {} exceeds high percentile {}",
                self.low_percentile, self.high_percentile
            )));
        }
        Ok(())
    }
}

/// Normalize a raw grid with the default 2nd/98th percentile clip and the given contrast exponent.
pub fn normalize<T>(raw: ArrayView2<'_, T>, contrast_exponent: f64) -> Result<Array2<f64>, NormalizeError>
where
    T: Copy + Into<f64>,
{
    normalize_with(raw, &NormalizeOptions::with_contrast(contrast_exponent))
}

/// Normalize a raw grid into a display grid whose values all lie in `[0, 1]`.
///
/// Samples are widened to `f64`, clipped to the configured percentile bounds, rescaled by the
/// clipped min and max and finally raised to `contrast_exponent`. Non-finite samples do not take
/// part in the percentile estimate: `+inf` clips to the upper bound, `-inf` and `NaN` to the lower.
///
/// A flat clipped grid (max <= min) is not divided; its value is clamped to `[0, 1]` before the
/// exponent, so a constant image of 500 renders white and a constant image of -20 renders black.
pub fn normalize_with<T>(
    raw: ArrayView2<'_, T>,
    options: &NormalizeOptions,
) -> Result<Array2<f64>, NormalizeError>
where
    T: Copy + Into<f64>,
{
    options.validate()?;
    let wide = raw.mapv(Into::into);
    let (p_low, p_high) = bounds(&wide, options)?;

    let mut display = wide.mapv(|v| clip(v, p_low, p_high));
    let (min, max) = display
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });

    if max > min {
        let range = max - min;
        if range.is_finite() {
            display.mapv_inplace(|v| (v - min) / range);
        } else {
            // Samples near f64::MAX overflow the span; halve before subtracting.
            let half_range = max / 2.0 - min / 2.0;
            display.mapv_inplace(|v| (v / 2.0 - min / 2.0) / half_range);
        }
    }

    let exponent = options.contrast_exponent;
    display.mapv_inplace(|v| v.clamp(0.0, 1.0).powf(exponent));
    Ok(display)
}

/// The `(p_low, p_high)` clip bounds that [`normalize_with`] would use for this grid.
pub fn percentile_bounds<T>(
    raw: ArrayView2<'_, T>,
    options: &NormalizeOptions,
) -> Result<(f64, f64), NormalizeError>
where
    T: Copy + Into<f64>,
{
    options.validate()?;
    bounds(&raw.mapv(Into::into), options)
}

fn bounds(wide: &Array2<f64>, options: &NormalizeOptions) -> Result<(f64, f64), NormalizeError> {
    if wide.is_empty() {
        return Err(invalid("sample grid is empty"));
    }
    let mut finite: Vec<f64> = wide.iter().copied().filter(|v| v.is_finite()).collect();
    finite.sort_unstable_by(f64::total_cmp);

    let no_finite = || invalid("sample grid has no finite values");
    let p_low = percentile(&finite, options.low_percentile, options.method).ok_or_else(no_finite)?;
    let p_high = percentile(&finite, options.high_percentile, options.method).ok_or_else(no_finite)?;
    // Interpolation rounding must never invert the bounds, `clamp` would panic.
    Ok((p_low, p_high.max(p_low)))
}

/// Read percentile `p` (0..=100) off an ascending slice of finite samples, `None` when it is empty.
pub fn percentile(sorted: &[f64], p: f64, method: PercentileMethod) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    let rank = (p / 100.0 * last as f64).clamp(0.0, last as f64);
    let below = rank.floor() as usize;
    let above = rank.ceil() as usize;
    let (lo, hi) = (sorted[below], sorted[above]);

    let value = match method {
        PercentileMethod::Linear => interpolate(lo, hi, rank - below as f64),
        PercentileMethod::Lower => lo,
        PercentileMethod::Higher => hi,
        PercentileMethod::Nearest => sorted[rank.round_ties_even() as usize],
        PercentileMethod::Midpoint => interpolate(lo, hi, 0.5),
    };
    Some(value)
}

fn interpolate(lo: f64, hi: f64, t: f64) -> f64 {
    let span = hi - lo;
    if span.is_finite() {
        lo + span * t
    } else {
        lo * (1.0 - t) + hi * t
    }
}

fn clip(value: f64, low: f64, high: f64) -> f64 {
    if value.is_nan() {
        low
    } else {
        value.clamp(low, high)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array2};

    fn assert_bounded(display: &Array2<f64>) {
        for &v in display.iter() {
            assert!(!v.is_nan(), "NaN in display grid");
            assert!((0.0..=1.0).contains(&v), "value {v} outside [0, 1]");
        }
    }

    #[test]
    fn linear_normalization_spans_unit_interval() {
        let raw: Array2<u16> = Array2::from_shape_fn((10, 10), |(r, c)| (r * 10 + c) as u16);
        let display = normalize(raw.view(), 1.0).expect("normalize");

        assert_eq!(display.dim(), (10, 10));
        assert_bounded(&display);
        assert_abs_diff_eq!(display[[0, 0]], 0.0);
        assert_abs_diff_eq!(display[[9, 9]], 1.0);
        // p2 = 1.98 and p98 = 97.02 for the values 0..=99.
        let expected = (50.0 - 1.98) / (97.02 - 1.98);
        assert_abs_diff_eq!(display[[5, 0]], expected, epsilon = 1e-9);
    }

    #[test]
    fn output_stays_bounded_for_any_positive_exponent() {
        let raw = array![[-3000_i16, -1024, 0], [40, 80, 1200], [3071, 12, -7]];
        for exponent in [0.1, 0.5, 0.9, 1.0, 1.5, 4.0] {
            let display = normalize(raw.view(), exponent).expect("normalize");
            assert_bounded(&display);
        }
    }

    #[test]
    fn flat_image_in_unit_range_keeps_its_value() {
        let raw = Array2::from_elem((4, 4), 0.25_f64);
        let display = normalize(raw.view(), 0.5).expect("normalize");
        for &v in display.iter() {
            assert_abs_diff_eq!(v, 0.5, epsilon = 1e-12);
        }
    }

    #[test]
    fn flat_image_above_unit_range_renders_white() {
        let raw = Array2::from_elem((3, 5), 500_u16);
        let display = normalize(raw.view(), 0.9).expect("normalize");
        assert!(display.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn flat_image_below_unit_range_renders_black() {
        let raw = Array2::from_elem((2, 2), -20_i32);
        let display = normalize(raw.view(), 1.5).expect("normalize");
        assert!(display.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn single_pixel_is_a_flat_image() {
        let raw = array![[7_u8]];
        let display = normalize(raw.view(), 1.0).expect("normalize");
        assert_eq!(display, array![[1.0]]);
    }

    #[test]
    fn larger_exponent_darkens_interior_values() {
        let raw: Array2<f64> = Array2::from_shape_fn((10, 10), |(r, c)| (r * 10 + c) as f64);
        let soft = normalize(raw.view(), 0.5).expect("soft");
        let linear = normalize(raw.view(), 1.0).expect("linear");
        let hard = normalize(raw.view(), 1.5).expect("hard");

        for ((&s, &l), &h) in soft.iter().zip(linear.iter()).zip(hard.iter()) {
            if l > 0.0 && l < 1.0 {
                assert!(s > l && l > h, "expected {s} > {l} > {h}");
            } else {
                assert_eq!(s, l);
                assert_eq!(l, h);
            }
        }
    }

    #[test]
    fn sparse_outlier_does_not_compress_the_cluster() {
        let mut raw: Array2<f64> = Array2::from_shape_fn((10, 10), |(r, c)| 100.0 + (r * 10 + c) as f64);
        raw[[9, 9]] = 1_000_000.0;

        let display = normalize(raw.view(), 1.0).expect("normalize");
        assert_bounded(&display);
        assert_abs_diff_eq!(display[[0, 0]], 0.0);
        assert_abs_diff_eq!(display[[9, 9]], 1.0);

        // Plain min/max would squeeze the cluster below 1e-4; the clip keeps mid-cluster near 0.5.
        let mid = display[[5, 0]];
        assert_abs_diff_eq!(mid, (150.0 - 101.98) / (197.02 - 101.98), epsilon = 1e-6);
        let cluster_max = display
            .iter()
            .take(97)
            .fold(0.0_f64, |acc, &v| acc.max(v));
        assert!(cluster_max > 0.95, "cluster only reaches {cluster_max}");
    }

    #[test]
    fn sample_type_does_not_change_the_result() {
        let as_u16: Array2<u16> = Array2::from_shape_fn((8, 8), |(r, c)| ((r * 37 + c * 101) % 4096) as u16);
        let as_f64 = as_u16.mapv(f64::from);
        let as_i32 = as_u16.mapv(i32::from);

        let from_u16 = normalize(as_u16.view(), 0.9).expect("u16");
        let from_f64 = normalize(as_f64.view(), 0.9).expect("f64");
        let from_i32 = normalize(as_i32.view(), 0.9).expect("i32");

        for ((a, b), c) in from_u16.iter().zip(from_f64.iter()).zip(from_i32.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-9);
            assert_abs_diff_eq!(a, c, epsilon = 1e-9);
        }
    }

    #[test]
    fn empty_grid_is_rejected() {
        let raw = Array2::<f64>::zeros((0, 3));
        assert!(matches!(
            normalize(raw.view(), 1.0),
            Err(NormalizeError::InvalidInput(_))
        ));
    }

    #[test]
    fn non_positive_exponent_is_rejected() {
        let raw = array![[1_u8, 2], [3, 4]];
        for exponent in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                normalize(raw.view(), exponent),
                Err(NormalizeError::InvalidInput(_))
            ));
        }
    }

    #[test]
    fn grid_without_finite_values_is_rejected() {
        let raw = array![[f64::NAN, f64::INFINITY], [f64::NEG_INFINITY, f64::NAN]];
        assert!(matches!(
            normalize(raw.view(), 1.0),
            Err(NormalizeError::InvalidInput(_))
        ));
    }

    #[test]
    fn inverted_percentiles_are_rejected() {
        let raw = array![[1.0_f64, 2.0]];
        let options = NormalizeOptions {
            low_percentile: 90.0,
            high_percentile: 10.0,
            ..NormalizeOptions::default()
        };
        assert!(normalize_with(raw.view(), &options).is_err());
    }

    #[test]
    fn non_finite_samples_are_clipped_into_range() {
        let raw = array![
            [f64::NAN, 0.0, 10.0, 20.0],
            [30.0, f64::INFINITY, 40.0, f64::NEG_INFINITY]
        ];
        let display = normalize(raw.view(), 1.0).expect("normalize");
        assert_bounded(&display);
        assert_eq!(display[[0, 0]], 0.0);
        assert_eq!(display[[1, 1]], 1.0);
        assert_eq!(display[[1, 3]], 0.0);
    }

    #[test]
    fn sparse_bright_pixel_with_linear_percentiles() {
        let raw = array![[0_u8, 0, 0], [0, 100, 0], [0, 0, 0]];
        let bounds = percentile_bounds(raw.view(), &NormalizeOptions::with_contrast(1.0)).expect("bounds");
        // Rank 7.84 sits between the last zero and the 100.
        assert_abs_diff_eq!(bounds.0, 0.0);
        assert_abs_diff_eq!(bounds.1, 84.0, epsilon = 1e-9);

        let display = normalize(raw.view(), 1.0).expect("normalize");
        assert_eq!(display, array![[0.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 0.0]]);
    }

    #[test]
    fn sparse_bright_pixel_with_lower_percentiles_is_clipped_away() {
        let raw = array![[0_u8, 0, 0], [0, 100, 0], [0, 0, 0]];
        let options = NormalizeOptions {
            contrast_exponent: 1.0,
            method: PercentileMethod::Lower,
            ..NormalizeOptions::default()
        };
        assert_eq!(percentile_bounds(raw.view(), &options).expect("bounds"), (0.0, 0.0));

        let display = normalize_with(raw.view(), &options).expect("normalize");
        assert_eq!(display, Array2::<f64>::zeros((3, 3)));
    }

    #[test]
    fn percentile_methods_pick_expected_ranks() {
        let sorted = [10.0, 20.0, 30.0, 40.0];
        // Rank of the 50th percentile is 1.5.
        let at = |p, method| percentile(&sorted, p, method).expect("non-empty");
        assert_abs_diff_eq!(at(50.0, PercentileMethod::Linear), 25.0);
        assert_abs_diff_eq!(at(50.0, PercentileMethod::Lower), 20.0);
        assert_abs_diff_eq!(at(50.0, PercentileMethod::Higher), 30.0);
        assert_abs_diff_eq!(at(50.0, PercentileMethod::Nearest), 30.0);
        assert_abs_diff_eq!(at(50.0, PercentileMethod::Midpoint), 25.0);
        assert_abs_diff_eq!(at(0.0, PercentileMethod::Linear), 10.0);
        assert_abs_diff_eq!(at(100.0, PercentileMethod::Linear), 40.0);
    }

    #[test]
    fn percentile_of_nothing_is_none() {
        assert_eq!(percentile(&[], 50.0, PercentileMethod::Linear), None);
        assert_eq!(percentile(&[], 0.0, PercentileMethod::Nearest), None);
    }

    #[test]
    fn samples_near_f64_limits_still_span_unit_interval() {
        let raw: Array2<f64> =
            Array2::from_shape_fn((10, 10), |(r, _)| if r < 5 { -1e308 } else { 1e308 });
        let display = normalize(raw.view(), 1.0).expect("normalize");

        assert_bounded(&display);
        assert!(display.rows().into_iter().take(5).flatten().all(|&v| v == 0.0));
        assert!(display.rows().into_iter().skip(5).flatten().all(|&v| v == 1.0));
    }

    #[test]
    fn percentile_between_extreme_samples_stays_finite() {
        let raw = array![[-1e308_f64, 1e308]];
        let (p_low, p_high) =
            percentile_bounds(raw.view(), &NormalizeOptions::default()).expect("bounds");
        assert!(p_low.is_finite() && p_high.is_finite());
        assert!(p_low < 0.0 && p_high > 0.0);

        let display = normalize(raw.view(), 0.9).expect("normalize");
        assert_eq!(display, array![[0.0, 1.0]]);
    }

    #[test]
    fn transposed_views_are_accepted() {
        let raw: Array2<u16> = Array2::from_shape_fn((3, 6), |(r, c)| (r * 6 + c) as u16);
        let straight = normalize(raw.view(), 1.0).expect("straight");
        let transposed = normalize(raw.t(), 1.0).expect("transposed");
        assert_eq!(transposed.dim(), (6, 3));
        assert_eq!(straight.t(), transposed);
    }
}
