use crate::CorrelationSurface;
use asef_core::PixelRect;
use serde::{Deserialize, Serialize};

/// Maximum of a correlation surface inside a region of interest.
///
/// `x`/`y` are full-surface coordinates, not relative to the ROI.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    pub x: usize,
    pub y: usize,
    pub value: f32,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PeakError {
    #[error("region of interest {roi} is empty")]
    EmptyRoi { roi: PixelRect },
    #[error("region of interest {roi} lies outside the {width}x{height} surface")]
    RoiOutsideSurface {
        roi: PixelRect,
        width: usize,
        height: usize,
    },
    #[error("no finite response inside region of interest {roi}")]
    NoResponse { roi: PixelRect },
}

/// Location and value of the largest response inside `roi`.
///
/// The ROI is clipped to the surface. NaN responses are ignored and ties go
/// to the first maximum in row-major order.
pub fn find_peak(surface: &CorrelationSurface, roi: PixelRect) -> Result<Peak, PeakError> {
    if roi.is_empty() {
        return Err(PeakError::EmptyRoi { roi });
    }
    let (x0, y0, x1, y1) = roi.clip_to(surface.width(), surface.height()).ok_or(
        PeakError::RoiOutsideSurface {
            roi,
            width: surface.width(),
            height: surface.height(),
        },
    )?;

    let stride = surface.width();
    let data = surface.data();
    let mut best: Option<Peak> = None;
    for y in y0..y1 {
        let row = &data[y * stride + x0..y * stride + x1];
        for (dx, &value) in row.iter().enumerate() {
            if value.is_nan() {
                continue;
            }
            if best.is_none_or(|b| value > b.value) {
                best = Some(Peak {
                    x: x0 + dx,
                    y,
                    value,
                });
            }
        }
    }

    best.ok_or(PeakError::NoResponse { roi })
}
