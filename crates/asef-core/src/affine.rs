use crate::PixelRect;
use nalgebra::{Matrix3, Point2, Vector3};

/// 2-D affine transform stored as a 3x3 matrix with last row `[0, 0, 1]`.
///
/// Used here to map a face rectangle in a source image onto the canonical
/// filter tile (`tile_from_img`), and back.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AffineTransform {
    pub m: Matrix3<f64>,
}

impl AffineTransform {
    pub fn new(m: Matrix3<f64>) -> Self {
        Self { m }
    }

    pub fn from_scale_translation(sx: f64, sy: f64, tx: f64, ty: f64) -> Self {
        Self::new(Matrix3::new(
            sx, 0.0, tx, //
            0.0, sy, ty, //
            0.0, 0.0, 1.0,
        ))
    }

    /// Transform taking `rect` in image coordinates onto a
    /// `tile_width x tile_height` tile.
    ///
    /// Scaling is anisotropic: x and y are stretched independently so that the
    /// rectangle fills the tile exactly, matching how the tile is resampled.
    /// Returns `None` for an empty rectangle or tile.
    pub fn from_rect_to_tile(rect: PixelRect, tile_width: usize, tile_height: usize) -> Option<Self> {
        if rect.is_empty() || tile_width == 0 || tile_height == 0 {
            return None;
        }
        let sx = tile_width as f64 / rect.width as f64;
        let sy = tile_height as f64 / rect.height as f64;
        Some(Self::from_scale_translation(
            sx,
            sy,
            -(rect.x as f64) * sx,
            -(rect.y as f64) * sy,
        ))
    }

    pub fn to_array(&self) -> [[f64; 3]; 2] {
        [
            [self.m[(0, 0)], self.m[(0, 1)], self.m[(0, 2)]],
            [self.m[(1, 0)], self.m[(1, 1)], self.m[(1, 2)]],
        ]
    }

    #[inline]
    pub fn map_point(&self, p: Point2<f32>) -> Point2<f32> {
        let v = self.m * Vector3::new(p.x as f64, p.y as f64, 1.0);
        Point2::new(v[0] as f32, v[1] as f32)
    }

    pub fn inverse(&self) -> Option<Self> {
        let inv = self.m.try_inverse()?;
        // Keep the affine form exact; inversion noise can leak into the last row.
        let mut m = inv;
        m[(2, 0)] = 0.0;
        m[(2, 1)] = 0.0;
        m[(2, 2)] = 1.0;
        Some(Self::new(m))
    }

    /// Map a point from the destination frame back into the source frame.
    ///
    /// Pure coordinate arithmetic; `None` only for singular transforms.
    pub fn invert_point(&self, p: Point2<f32>) -> Option<Point2<f32>> {
        self.inverse().map(|inv| inv.map_point(p))
    }

    /// `self` applied after `other`.
    pub fn compose(&self, other: &AffineTransform) -> AffineTransform {
        Self::new(self.m * other.m)
    }
}
