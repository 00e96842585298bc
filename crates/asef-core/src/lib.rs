//! Core image and geometry utilities for the ASEF eye locator.
//!
//! Holds grayscale pixels, maps a face rectangle onto a fixed-size tile and
//! back, and resamples that tile. Nothing here knows about correlation
//! filters.

mod affine;
mod image;
mod logger;
mod rect;
mod rectify;

pub use affine::AffineTransform;
pub use image::{sample_bilinear_clamped, GrayImage, GrayImageView};
pub use rect::{ParseRectError, PixelRect};
pub use rectify::{extract_tile, warp_affine_gray, ExtractError, RectifiedTile};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_with_level, level_for_verbosity};
