//! Frequency-domain correlation of a preprocessed tile with the filter pair.
//!
//! Both filters are transformed once when the engine is built. Per call the
//! tile is transformed once, multiplied with the conjugate of each filter
//! spectrum, and transformed back, giving one real correlation surface per
//! side:
//!
//! `corr = Re(IDFT(DFT(tile) * conj(DFT(filter)))) / (rows * cols)`
//!
//! All buffers touched per call live in a [`CorrelationWorkspace`], so the
//! engine itself stays immutable and can be shared between threads.

use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::{DimensionError, EyeSide, FilterKernel, FilterPair};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// 2-D complex DFT of a fixed `rows x cols` row-major grid, computed as row
/// transforms followed by column transforms.
#[derive(Clone)]
pub struct Fft2d {
    rows: usize,
    cols: usize,
    row_fwd: Arc<dyn Fft<f32>>,
    row_inv: Arc<dyn Fft<f32>>,
    col_fwd: Arc<dyn Fft<f32>>,
    col_inv: Arc<dyn Fft<f32>>,
}

impl std::fmt::Debug for Fft2d {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fft2d")
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .finish_non_exhaustive()
    }
}

/// Scratch memory for [`Fft2d`].
#[derive(Clone, Debug, Default)]
pub struct FftScratch {
    transposed: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl Fft2d {
    pub fn new(rows: usize, cols: usize) -> Self {
        let mut planner = FftPlanner::new();
        Self {
            rows,
            cols,
            row_fwd: planner.plan_fft_forward(cols),
            row_inv: planner.plan_fft_inverse(cols),
            col_fwd: planner.plan_fft_forward(rows),
            col_inv: planner.plan_fft_inverse(rows),
        }
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
    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Scratch sized for this transform.
    pub fn make_scratch(&self) -> FftScratch {
        let scratch_len = [&self.row_fwd, &self.row_inv, &self.col_fwd, &self.col_inv]
            .iter()
            .map(|f| f.get_inplace_scratch_len())
            .max()
            .unwrap_or(0);
        FftScratch {
            transposed: vec![Complex::default(); self.len()],
            scratch: vec![Complex::default(); scratch_len],
        }
    }

    /// Unnormalized forward transform in place.
    ///
    /// `data` must hold exactly `len()` values; `scratch` is grown as needed.
    pub fn forward(
        &self,
        data: &mut [Complex<f32>],
        scratch: &mut FftScratch,
    ) -> Result<(), DimensionError> {
        self.process(data, &self.row_fwd, &self.col_fwd, scratch)
    }

    /// Unnormalized inverse transform in place (the caller divides by `len()`).
    pub fn inverse(
        &self,
        data: &mut [Complex<f32>],
        scratch: &mut FftScratch,
    ) -> Result<(), DimensionError> {
        self.process(data, &self.row_inv, &self.col_inv, scratch)
    }

    fn process(
        &self,
        data: &mut [Complex<f32>],
        row_fft: &Arc<dyn Fft<f32>>,
        col_fft: &Arc<dyn Fft<f32>>,
        scratch: &mut FftScratch,
    ) -> Result<(), DimensionError> {
        if data.len() != self.len() {
            return Err(DimensionError::BufferLength {
                rows: self.rows,
                cols: self.cols,
                got: data.len(),
            });
        }
        let (rows, cols) = (self.rows, self.cols);
        if scratch.transposed.len() != data.len() {
            scratch.transposed.resize(data.len(), Complex::default());
        }
        let needed = row_fft
            .get_inplace_scratch_len()
            .max(col_fft.get_inplace_scratch_len());
        if scratch.scratch.len() < needed {
            scratch.scratch.resize(needed, Complex::default());
        }

        // every row at once: the buffer is a sequence of `cols`-long transforms
        row_fft.process_with_scratch(data, &mut scratch.scratch);

        let t = &mut scratch.transposed;
        for r in 0..rows {
            for c in 0..cols {
                t[c * rows + r] = data[r * cols + c];
            }
        }
        col_fft.process_with_scratch(t, &mut scratch.scratch);
        for c in 0..cols {
            for r in 0..rows {
                data[r * cols + c] = t[c * rows + r];
            }
        }
        Ok(())
    }
}

/// Forward DFT of one spatial filter kernel.
#[derive(Clone, Debug)]
pub struct FrequencyFilter {
    spectrum: Vec<Complex<f32>>,
}

impl FrequencyFilter {
    pub fn from_kernel(fft: &Fft2d, kernel: &FilterKernel) -> Result<Self, DimensionError> {
        if kernel.rows() != fft.rows() || kernel.cols() != fft.cols() {
            return Err(DimensionError::FilterMismatch {
                left_rows: fft.rows(),
                left_cols: fft.cols(),
                right_rows: kernel.rows(),
                right_cols: kernel.cols(),
            });
        }
        let mut spectrum: Vec<Complex<f32>> =
            kernel.data().iter().map(|&v| Complex::new(v, 0.0)).collect();
        let mut scratch = fft.make_scratch();
        fft.forward(&mut spectrum, &mut scratch)?;
        Ok(Self { spectrum })
    }

    pub fn spectrum(&self) -> &[Complex<f32>] {
        &self.spectrum
    }
}

/// Real `width x height` correlation response, row-major.
#[derive(Clone, Debug, PartialEq)]
pub struct CorrelationSurface {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl CorrelationSurface {
    pub fn new(width: usize, height: usize, data: Vec<f32>) -> Option<Self> {
        (width.checked_mul(height)? == data.len()).then_some(Self {
            width,
            height,
            data,
        })
    }

    pub fn zeros(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0.0; width * height],
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> Option<f32> {
        (x < self.width && y < self.height).then(|| self.data[y * self.width + x])
    }
}

/// Per-call buffers of the correlation engine. Reused across calls.
#[derive(Clone, Debug)]
pub struct CorrelationWorkspace {
    tile: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    product: Vec<Complex<f32>>,
    fft_scratch: FftScratch,
    left: CorrelationSurface,
    right: CorrelationSurface,
}

impl CorrelationWorkspace {
    /// Preprocessed tile consumed by [`CorrelationEngine::correlate_prepared`].
    pub fn tile_mut(&mut self) -> &mut [f32] {
        &mut self.tile
    }

    pub fn left(&self) -> &CorrelationSurface {
        &self.left
    }

    pub fn right(&self) -> &CorrelationSurface {
        &self.right
    }

    pub fn surface(&self, side: EyeSide) -> &CorrelationSurface {
        match side {
            EyeSide::Left => &self.left,
            EyeSide::Right => &self.right,
        }
    }
}

/// Correlates tiles against a fixed filter pair.
#[derive(Clone, Debug)]
pub struct CorrelationEngine {
    fft: Fft2d,
    left: FrequencyFilter,
    right: FrequencyFilter,
}

impl CorrelationEngine {
    pub fn new(filters: &FilterPair) -> Result<Self, DimensionError> {
        let fft = Fft2d::new(filters.rows(), filters.cols());
        let left = FrequencyFilter::from_kernel(&fft, filters.left())?;
        let right = FrequencyFilter::from_kernel(&fft, filters.right())?;
        Ok(Self { fft, left, right })
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.fft.rows()
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.fft.cols()
    }

    pub fn filter(&self, side: EyeSide) -> &FrequencyFilter {
        match side {
            EyeSide::Left => &self.left,
            EyeSide::Right => &self.right,
        }
    }

    pub fn workspace(&self) -> CorrelationWorkspace {
        let n = self.fft.len();
        CorrelationWorkspace {
            tile: vec![0.0; n],
            spectrum: vec![Complex::default(); n],
            product: vec![Complex::default(); n],
            fft_scratch: self.fft.make_scratch(),
            left: CorrelationSurface::zeros(self.cols(), self.rows()),
            right: CorrelationSurface::zeros(self.cols(), self.rows()),
        }
    }

    /// Correlate a preprocessed `rows x cols` tile with both filters.
    ///
    /// The returned surfaces live in `ws` and are overwritten by the next call.
    pub fn correlate<'w>(
        &self,
        tile: &[f32],
        ws: &'w mut CorrelationWorkspace,
    ) -> Result<(&'w CorrelationSurface, &'w CorrelationSurface), DimensionError> {
        let n = self.fft.len();
        if tile.len() != n {
            return Err(DimensionError::KernelDataLength {
                rows: self.rows(),
                cols: self.cols(),
                expected: n,
                got: tile.len(),
            });
        }
        if self.check_workspace(ws).is_err() {
            *ws = self.workspace();
        }
        ws.tile.copy_from_slice(tile);
        self.correlate_prepared(ws)
    }

    /// Same as [`correlate`](Self::correlate) for a tile already written into
    /// [`CorrelationWorkspace::tile_mut`].
    ///
    /// The workspace must come from this engine's [`workspace`](Self::workspace)
    /// (or one of the same size); any other workspace is rejected.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip_all, fields(rows = self.rows(), cols = self.cols()))
    )]
    pub fn correlate_prepared<'w>(
        &self,
        ws: &'w mut CorrelationWorkspace,
    ) -> Result<(&'w CorrelationSurface, &'w CorrelationSurface), DimensionError> {
        self.check_workspace(ws)?;
        let n = self.fft.len();

        for (dst, &v) in ws.spectrum.iter_mut().zip(&ws.tile) {
            *dst = Complex::new(v, 0.0);
        }
        self.fft.forward(&mut ws.spectrum, &mut ws.fft_scratch)?;

        let norm = 1.0 / n as f32;
        for (filter, surface) in [(&self.left, &mut ws.left), (&self.right, &mut ws.right)] {
            for ((p, &t), &f) in ws
                .product
                .iter_mut()
                .zip(&ws.spectrum)
                .zip(&filter.spectrum)
            {
                *p = t * f.conj();
            }
            self.fft.inverse(&mut ws.product, &mut ws.fft_scratch)?;
            for (dst, p) in surface.data.iter_mut().zip(&ws.product) {
                *dst = p.re * norm;
            }
        }

        Ok((&ws.left, &ws.right))
    }

    fn check_workspace(&self, ws: &CorrelationWorkspace) -> Result<(), DimensionError> {
        let n = self.fft.len();
        let fits = ws.tile.len() == n
            && ws.spectrum.len() == n
            && ws.product.len() == n
            && [&ws.left, &ws.right]
                .iter()
                .all(|s| s.width == self.cols() && s.height == self.rows());
        if fits {
            return Ok(());
        }
        Err(DimensionError::WorkspaceSize {
            rows: self.rows(),
            cols: self.cols(),
            got_rows: ws.left.height,
            got_cols: ws.left.width,
        })
    }
}
