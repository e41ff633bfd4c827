use ndarray::{Array2, ArrayView2};

use crate::normalize::{self, NormalizeError, NormalizeOptions};

/// A decoded single-frame sample grid, tagged with the sample type it was stored as.
#[derive(Debug, Clone, PartialEq)]
pub enum RawGrid {
    U8(Array2<u8>),
    U16(Array2<u16>),
    U32(Array2<u32>),
    I8(Array2<i8>),
    I16(Array2<i16>),
    I32(Array2<i32>),
    F64(Array2<f64>),
}

macro_rules! with_view {
    ($grid:expr, $view:ident => $body:expr) => {
        match $grid {
            RawGrid::U8(a) => {
                let $view = a.view();
                $body
            }
            RawGrid::U16(a) => {
                let $view = a.view();
                $body
            }
            RawGrid::U32(a) => {
                let $view = a.view();
                $body
            }
            RawGrid::I8(a) => {
                let $view = a.view();
                $body
            }
            RawGrid::I16(a) => {
                let $view = a.view();
                $body
            }
            RawGrid::I32(a) => {
                let $view = a.view();
                $body
            }
            RawGrid::F64(a) => {
                let $view = a.view();
                $body
            }
        }
    };
}

impl RawGrid {
    /// `(rows, columns)`
    pub fn dim(&self) -> (usize, usize) {
        with_view!(self, view => view.dim())
    }

    pub fn sample_type(&self) -> &'static str {
        match self {
            RawGrid::U8(_) => "u8",
            RawGrid::U16(_) => "u16",
            RawGrid::U32(_) => "u32",
            RawGrid::I8(_) => "i8",
            RawGrid::I16(_) => "i16",
            RawGrid::I32(_) => "i32",
            RawGrid::F64(_) => "f64",
        }
    }

    pub fn normalize(&self, options: &NormalizeOptions) -> Result<Array2<f64>, NormalizeError> {
        with_view!(self, view => normalize::normalize_with(view, options))
    }

    pub fn percentile_bounds(&self, options: &NormalizeOptions) -> Result<(f64, f64), NormalizeError> {
        with_view!(self, view => normalize::percentile_bounds(view, options))
    }

    pub fn to_f64(&self) -> Array2<f64> {
        with_view!(self, view => widen(view))
    }
}

fn widen<T: Copy + Into<f64>>(view: ArrayView2<'_, T>) -> Array2<f64> {
    view.mapv(Into::into)
}
