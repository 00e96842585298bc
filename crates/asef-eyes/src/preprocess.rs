//! Log-compression of tile intensities.

use asef_core::GrayImageView;

use crate::DimensionError;

/// Lookup table mapping an 8-bit intensity `i` to `ln(i + 1)`.
///
/// Log compression flattens illumination differences before correlation.
#[derive(Clone, Debug)]
pub struct LogLut {
    table: [f32; 256],
}

impl Default for LogLut {
    fn default() -> Self {
        Self::new()
    }
}

impl LogLut {
    pub fn new() -> Self {
        let mut table = [0.0f32; 256];
        for (i, v) in table.iter_mut().enumerate() {
            *v = ((i + 1) as f64).ln() as f32;
        }
        Self { table }
    }

    #[inline]
    pub fn get(&self, intensity: u8) -> f32 {
        self.table[intensity as usize]
    }

    /// Transform `tile` into `out`. Both must hold exactly `width * height` values.
    pub fn apply(&self, tile: &GrayImageView<'_>, out: &mut [f32]) -> Result<(), DimensionError> {
        if tile.data.len() != out.len() || tile.width * tile.height != out.len() {
            return Err(DimensionError::KernelDataLength {
                rows: tile.height,
                cols: tile.width,
                expected: out.len(),
                got: tile.data.len(),
            });
        }
        for (dst, &src) in out.iter_mut().zip(tile.data) {
            *dst = self.table[src as usize];
        }
        Ok(())
    }
}
