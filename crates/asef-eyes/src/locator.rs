//! Eye localization on face rectangles.
//!
//! [`EyeFilterModel`] holds everything that is fixed once the filters are
//! loaded: the filter spectra, FFT plans, regions of interest and the log
//! lookup table. It is immutable and `Send + Sync`, so one model can be
//! shared through an [`Arc`] by any number of [`EyeLocator`]s, each of which
//! owns the scratch buffers of its calls.

use std::path::Path;
use std::sync::Arc;

use asef_core::{extract_tile, GrayImageView, PixelRect};
use log::debug;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::filter_file::{load_filter_file, FilterFile, FilterStoreError, FormatError};
use crate::kernel::check_roi;
use crate::peak::{find_peak, Peak};
use crate::preprocess::LogLut;
use crate::{
    CorrelationEngine, CorrelationSurface, CorrelationWorkspace, DimensionError, EyeSide,
    FilterPair, LocateError,
};

/// Peaks of both filters in tile coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EyePeaks {
    pub left: Peak,
    pub right: Peak,
}

impl EyePeaks {
    pub fn side(&self, side: EyeSide) -> Peak {
        match side {
            EyeSide::Left => self.left,
            EyeSide::Right => self.right,
        }
    }

    /// Tile-space position of one peak.
    pub fn point(&self, side: EyeSide) -> Point2<f32> {
        let p = self.side(side);
        Point2::new(p.x as f32, p.y as f32)
    }
}

/// Result of [`EyeLocator::locate_tile`]: the peaks plus the correlation
/// surfaces they were found on. The surfaces are borrowed from the locator
/// and are overwritten by its next call.
#[derive(Clone, Copy, Debug)]
pub struct TileEyes<'a> {
    pub peaks: EyePeaks,
    pub left_surface: &'a CorrelationSurface,
    pub right_surface: &'a CorrelationSurface,
}

impl TileEyes<'_> {
    pub fn surface(&self, side: EyeSide) -> &CorrelationSurface {
        match side {
            EyeSide::Left => self.left_surface,
            EyeSide::Right => self.right_surface,
        }
    }
}

/// Eye positions for one face, in source-image coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EyeLocatorResult {
    pub face: PixelRect,
    pub left_eye: Point2<f32>,
    pub right_eye: Point2<f32>,
    /// Correlation value at the left peak.
    pub left_response: f32,
    /// Correlation value at the right peak.
    pub right_response: f32,
}

/// Immutable filter state shared by all locators.
#[derive(Clone, Debug)]
pub struct EyeFilterModel {
    lut: LogLut,
    engine: CorrelationEngine,
    left_roi: PixelRect,
    right_roi: PixelRect,
}

impl EyeFilterModel {
    pub fn new(
        filters: FilterPair,
        left_roi: PixelRect,
        right_roi: PixelRect,
    ) -> Result<Self, DimensionError> {
        let (rows, cols) = (filters.rows(), filters.cols());
        check_roi(EyeSide::Left, left_roi, rows, cols)?;
        check_roi(EyeSide::Right, right_roi, rows, cols)?;
        let engine = CorrelationEngine::new(&filters)?;
        debug!("eye filter model: {cols}x{rows} tile, left roi {left_roi}, right roi {right_roi}");
        Ok(Self {
            lut: LogLut::new(),
            engine,
            left_roi,
            right_roi,
        })
    }

    pub fn from_filter_file(file: &FilterFile) -> Result<Self, DimensionError> {
        Self::new(file.filters.clone(), file.left_roi, file.right_roi)
    }

    /// Load a CFEL filter file and build the model from it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, FilterStoreError> {
        let path = path.as_ref();
        let file = load_filter_file(path)?;
        Self::from_filter_file(&file).map_err(|e| FilterStoreError::Load {
            path: path.to_path_buf(),
            source: FormatError::Dimension(e),
        })
    }

    #[inline]
    pub fn tile_width(&self) -> usize {
        self.engine.cols()
    }

    #[inline]
    pub fn tile_height(&self) -> usize {
        self.engine.rows()
    }

    /// `(left, right)` regions of interest in tile coordinates.
    pub fn rois(&self) -> (PixelRect, PixelRect) {
        (self.left_roi, self.right_roi)
    }

    pub fn roi(&self, side: EyeSide) -> PixelRect {
        match side {
            EyeSide::Left => self.left_roi,
            EyeSide::Right => self.right_roi,
        }
    }

    pub fn engine(&self) -> &CorrelationEngine {
        &self.engine
    }

    /// Fresh scratch buffers for this model.
    pub fn workspace(&self) -> CorrelationWorkspace {
        self.engine.workspace()
    }

    /// Locate eyes on a tile using caller-provided scratch buffers.
    pub fn locate_tile_with<'w>(
        &self,
        tile: &GrayImageView<'_>,
        ws: &'w mut CorrelationWorkspace,
    ) -> Result<TileEyes<'w>, LocateError> {
        if tile.width != self.tile_width() || tile.height != self.tile_height() {
            return Err(DimensionError::TileSize {
                expected_width: self.tile_width(),
                expected_height: self.tile_height(),
                got_width: tile.width,
                got_height: tile.height,
            }
            .into());
        }
        self.lut.apply(tile, ws.tile_mut())?;
        let (left_surface, right_surface) = self.engine.correlate_prepared(ws)?;

        let left = find_peak(left_surface, self.left_roi).map_err(|source| LocateError::Peak {
            side: EyeSide::Left,
            source,
        })?;
        let right = find_peak(right_surface, self.right_roi).map_err(|source| {
            LocateError::Peak {
                side: EyeSide::Right,
                source,
            }
        })?;

        Ok(TileEyes {
            peaks: EyePeaks { left, right },
            left_surface,
            right_surface,
        })
    }

    /// Locate eyes on a tile with a freshly allocated workspace.
    pub fn locate_tile_owned(&self, tile: &GrayImageView<'_>) -> Result<EyePeaks, LocateError> {
        let mut ws = self.workspace();
        self.locate_tile_with(tile, &mut ws).map(|t| t.peaks)
    }

    /// Locate eyes for one face rectangle of `image`.
    pub fn locate_face_with(
        &self,
        image: &GrayImageView<'_>,
        face: PixelRect,
        ws: &mut CorrelationWorkspace,
    ) -> Result<EyeLocatorResult, LocateError> {
        let rectified = extract_tile(image, face, self.tile_width(), self.tile_height())
            .map_err(|source| LocateError::Extract { face, source })?;
        let peaks = self.locate_tile_with(&rectified.tile.view(), ws)?.peaks;

        Ok(EyeLocatorResult {
            face,
            left_eye: rectified.to_image(peaks.point(EyeSide::Left)),
            right_eye: rectified.to_image(peaks.point(EyeSide::Right)),
            left_response: peaks.left.value,
            right_response: peaks.right.value,
        })
    }

    /// Locate eyes for every face, in input order, with scratch buffers
    /// allocated for this call only.
    pub fn locate(
        &self,
        image: &GrayImageView<'_>,
        faces: &[PixelRect],
    ) -> Vec<Result<EyeLocatorResult, LocateError>> {
        let mut ws = self.workspace();
        locate_all(self, image, faces, &mut ws)
    }
}

/// Eye locator bound to one workspace.
///
/// Calls take `&mut self`; run one locator per thread and share the model.
#[derive(Clone, Debug)]
pub struct EyeLocator {
    model: Arc<EyeFilterModel>,
    workspace: CorrelationWorkspace,
}

impl EyeLocator {
    pub fn new(model: Arc<EyeFilterModel>) -> Self {
        let workspace = model.workspace();
        Self { model, workspace }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, FilterStoreError> {
        Ok(Self::new(Arc::new(EyeFilterModel::load(path)?)))
    }

    pub fn model(&self) -> &Arc<EyeFilterModel> {
        &self.model
    }

    /// Locate eyes on a preformatted tile of the model's size.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip_all, fields(width = tile.width, height = tile.height))
    )]
    pub fn locate_tile(&mut self, tile: &GrayImageView<'_>) -> Result<TileEyes<'_>, LocateError> {
        self.model.locate_tile_with(tile, &mut self.workspace)
    }

    /// Locate eyes for every face of `image`.
    ///
    /// Returns one entry per face in input order; a failing face does not
    /// affect the others.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip_all, fields(faces = faces.len()))
    )]
    pub fn locate(
        &mut self,
        image: &GrayImageView<'_>,
        faces: &[PixelRect],
    ) -> Vec<Result<EyeLocatorResult, LocateError>> {
        locate_all(&self.model, image, faces, &mut self.workspace)
    }
}

fn locate_all(
    model: &EyeFilterModel,
    image: &GrayImageView<'_>,
    faces: &[PixelRect],
    ws: &mut CorrelationWorkspace,
) -> Vec<Result<EyeLocatorResult, LocateError>> {
    faces
        .iter()
        .map(|&face| {
            let res = model.locate_face_with(image, face, ws);
            if let Err(err) = &res {
                debug!("eye location failed for face {face}: {err}");
            }
            res
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FilterKernel;
    use approx::assert_abs_diff_eq;
    use asef_core::{ExtractError, GrayImage};

    const N: usize = 32;

    fn impulse_model() -> EyeFilterModel {
        let k = FilterKernel::impulse(N, N, 0, 0).unwrap();
        let pair = FilterPair::new(k.clone(), k).unwrap();
        EyeFilterModel::new(
            pair,
            PixelRect::new(0, 0, 16, 16),
            PixelRect::new(16, 0, 16, 16),
        )
        .unwrap()
    }

    fn spots_tile() -> GrayImage {
        GrayImage::from_fn(N, N, |x, y| match (x, y) {
            (5, 9) | (25, 11) => 255,
            _ => 10,
        })
    }

    #[test]
    fn model_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<EyeFilterModel>();
        assert_send_sync::<EyeLocator>();
    }

    #[test]
    fn model_rejects_roi_outside_filter() {
        let k = FilterKernel::zeros(8, 8).unwrap();
        let pair = FilterPair::new(k.clone(), k).unwrap();
        let err = EyeFilterModel::new(pair, PixelRect::new(0, 0, 4, 4), PixelRect::new(6, 0, 4, 4))
            .unwrap_err();
        assert!(matches!(
            err,
            DimensionError::RoiOutOfBounds {
                side: EyeSide::Right,
                ..
            }
        ));
    }

    #[test]
    fn locate_tile_finds_bright_spots() {
        let model = Arc::new(impulse_model());
        let mut locator = EyeLocator::new(model);
        let tile = spots_tile();
        let eyes = locator.locate_tile(&tile.view()).unwrap();
        assert_eq!((eyes.peaks.left.x, eyes.peaks.left.y), (5, 9));
        assert_eq!((eyes.peaks.right.x, eyes.peaks.right.y), (25, 11));
        assert_abs_diff_eq!(eyes.peaks.left.value, 256.0f32.ln(), epsilon = 1e-3);
        assert_eq!(eyes.left_surface.width(), N);
        assert_eq!(eyes.surface(EyeSide::Right).height(), N);
    }

    #[test]
    fn offset_filters_shift_peaks_by_their_offset() {
        let left = FilterKernel::impulse(N, N, 2, 3).unwrap();
        let right = FilterKernel::impulse(N, N, 1, 2).unwrap();
        let model = EyeFilterModel::new(
            FilterPair::new(left, right).unwrap(),
            PixelRect::new(0, 0, 16, 16),
            PixelRect::new(16, 0, 16, 16),
        )
        .unwrap();
        let tile = GrayImage::from_fn(N, N, |x, y| match (x, y) {
            (7, 9) | (25, 11) => 255,
            _ => 10,
        });

        let mut locator = EyeLocator::new(Arc::new(model));
        let eyes = locator.locate_tile(&tile.view()).unwrap();
        // tile spot p, filter impulse q: peak at p - q
        assert_eq!((eyes.peaks.left.x, eyes.peaks.left.y), (5, 6));
        assert_eq!((eyes.peaks.right.x, eyes.peaks.right.y), (24, 9));
        assert_abs_diff_eq!(eyes.peaks.left.value, 256.0f32.ln(), epsilon = 1e-3);
        assert_abs_diff_eq!(eyes.peaks.right.value, 256.0f32.ln(), epsilon = 1e-3);
    }

    #[test]
    fn stateless_and_workspace_paths_agree() {
        let model = Arc::new(impulse_model());
        let tile = spots_tile();
        let owned = model.locate_tile_owned(&tile.view()).unwrap();
        let mut locator = EyeLocator::new(model);
        assert_eq!(locator.locate_tile(&tile.view()).unwrap().peaks, owned);
    }

    #[test]
    fn wrong_tile_size_is_rejected() {
        let model = impulse_model();
        let tile = GrayImage::new(N, N - 1);
        assert!(matches!(
            model.locate_tile_owned(&tile.view()),
            Err(LocateError::Tile(DimensionError::TileSize { .. }))
        ));
    }

    #[test]
    fn locate_maps_peaks_back_to_image() {
        let model = impulse_model();
        // face at (10, 20), 64x64 -> scale 2 onto the 32x32 tile
        let face = PixelRect::new(10, 20, 64, 64);
        let image = GrayImage::from_fn(100, 100, |x, y| {
            let in_left = (20..24).contains(&x) && (38..42).contains(&y);
            let in_right = (60..64).contains(&x) && (42..46).contains(&y);
            if in_left || in_right {
                250
            } else {
                20
            }
        });
        let results = model.locate(&image.view(), &[face]);
        let r = results[0].as_ref().unwrap();
        assert_eq!(r.face, face);
        assert!((r.left_eye.x - 21.0).abs() <= 2.0, "{:?}", r.left_eye);
        assert!((r.left_eye.y - 39.0).abs() <= 2.0, "{:?}", r.left_eye);
        assert!((r.right_eye.x - 61.0).abs() <= 2.0, "{:?}", r.right_eye);
        assert!((r.right_eye.y - 43.0).abs() <= 2.0, "{:?}", r.right_eye);
        assert!(r.left_response > 0.0 && r.right_response > 0.0);
    }

    #[test]
    fn degenerate_face_fails_alone_and_order_is_kept() {
        let mut locator = EyeLocator::new(Arc::new(impulse_model()));
        let image = GrayImage::from_fn(64, 64, |x, y| ((x * 3 + y * 5) % 251) as u8);
        let faces = [
            PixelRect::new(0, 0, 32, 32),
            PixelRect::new(5, 5, 0, 10),
            PixelRect::new(16, 16, 48, 48),
            PixelRect::new(500, 500, 10, 10),
        ];
        let results = locator.locate(&image.view(), &faces);
        assert_eq!(results.len(), faces.len());

        assert_eq!(results[0].as_ref().unwrap().face, faces[0]);
        assert!(matches!(
            &results[1],
            Err(LocateError::Extract {
                face,
                source: ExtractError::DegenerateRect { .. }
            }) if *face == faces[1]
        ));
        assert_eq!(results[2].as_ref().unwrap().face, faces[2]);
        assert!(matches!(
            &results[3],
            Err(LocateError::Extract {
                source: ExtractError::OutsideImage { .. },
                ..
            })
        ));
    }

    #[test]
    fn eyes_stay_inside_their_rois() {
        let model = impulse_model();
        let tile = GrayImage::from_fn(N, N, |x, y| ((x * 17 + y * 31) % 256) as u8);
        let peaks = model.locate_tile_owned(&tile.view()).unwrap();
        let (left_roi, right_roi) = model.rois();
        assert!(left_roi.contains(peaks.left.x as i64, peaks.left.y as i64));
        assert!(right_roi.contains(peaks.right.x as i64, peaks.right.y as i64));
    }
}
