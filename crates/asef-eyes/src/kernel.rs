use crate::DimensionError;
use asef_core::PixelRect;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which of the two filters / eyes.
///
/// Left and right refer to positions in the image, not to the subject's eyes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EyeSide {
    Left,
    Right,
}

impl fmt::Display for EyeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EyeSide::Left => f.write_str("left"),
            EyeSide::Right => f.write_str("right"),
        }
    }
}

/// Single-channel spatial filter, `rows x cols`, row-major `f32`.
#[derive(Clone, Debug, PartialEq)]
pub struct FilterKernel {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl FilterKernel {
    pub fn new(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self, DimensionError> {
        if rows == 0 || cols == 0 {
            return Err(DimensionError::EmptyKernel { rows, cols });
        }
        let expected = rows
            .checked_mul(cols)
            .ok_or(DimensionError::EmptyKernel { rows, cols })?;
        if data.len() != expected {
            return Err(DimensionError::KernelDataLength {
                rows,
                cols,
                expected,
                got: data.len(),
            });
        }
        Ok(Self { rows, cols, data })
    }

    pub fn zeros(rows: usize, cols: usize) -> Result<Self, DimensionError> {
        Self::new(rows, cols, vec![0.0; rows.saturating_mul(cols)])
    }

    /// Kernel with a single `1.0` at `(x, y)`, zero elsewhere.
    pub fn impulse(rows: usize, cols: usize, x: usize, y: usize) -> Result<Self, DimensionError> {
        let mut k = Self::zeros(rows, cols)?;
        if let Some(v) = k.get_mut(x, y) {
            *v = 1.0;
        }
        Ok(k)
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> Option<f32> {
        (x < self.cols && y < self.rows).then(|| self.data[y * self.cols + x])
    }

    #[inline]
    pub fn get_mut(&mut self, x: usize, y: usize) -> Option<&mut f32> {
        if x < self.cols && y < self.rows {
            Some(&mut self.data[y * self.cols + x])
        } else {
            None
        }
    }
}

/// Left/right filter kernels of identical size.
#[derive(Clone, Debug, PartialEq)]
pub struct FilterPair {
    left: FilterKernel,
    right: FilterKernel,
}

impl FilterPair {
    pub fn new(left: FilterKernel, right: FilterKernel) -> Result<Self, DimensionError> {
        if left.rows != right.rows || left.cols != right.cols {
            return Err(DimensionError::FilterMismatch {
                left_rows: left.rows,
                left_cols: left.cols,
                right_rows: right.rows,
                right_cols: right.cols,
            });
        }
        Ok(Self { left, right })
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.left.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.left.cols
    }

    pub fn left(&self) -> &FilterKernel {
        &self.left
    }

    pub fn right(&self) -> &FilterKernel {
        &self.right
    }

    pub fn side(&self, side: EyeSide) -> &FilterKernel {
        match side {
            EyeSide::Left => &self.left,
            EyeSide::Right => &self.right,
        }
    }
}

/// Check that `roi` is a non-empty sub-rectangle of a `rows x cols` filter.
pub fn check_roi(
    side: EyeSide,
    roi: PixelRect,
    rows: usize,
    cols: usize,
) -> Result<(), DimensionError> {
    if roi.is_empty() || !roi.fits_within(cols, rows) {
        return Err(DimensionError::RoiOutOfBounds {
            side,
            roi,
            rows,
            cols,
        });
    }
    Ok(())
}
