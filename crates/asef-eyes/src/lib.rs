//! ASEF eye locator built on top of `asef-core`.
//!
//! ## Quickstart
//!
//! ```
//! use std::sync::Arc;
//! use asef_core::{GrayImage, PixelRect};
//! use asef_eyes::{EyeFilterModel, EyeLocator, FilterKernel, FilterPair};
//!
//! let k = FilterKernel::impulse(32, 32, 0, 0).unwrap();
//! let filters = FilterPair::new(k.clone(), k).unwrap();
//! let model = EyeFilterModel::new(
//!     filters,
//!     PixelRect::new(0, 0, 16, 16),
//!     PixelRect::new(16, 0, 16, 16),
//! )
//! .unwrap();
//!
//! let mut locator = EyeLocator::new(Arc::new(model));
//! let image = GrayImage::new(200, 200);
//! let results = locator.locate(&image.view(), &[PixelRect::new(40, 40, 96, 96)]);
//! assert_eq!(results.len(), 1);
//! ```
//!
//! Per face the pipeline is:
//! 1. Resample the face rectangle onto a tile of the filter size.
//! 2. Log-compress the tile intensities.
//! 3. Correlate the tile with the left and right filters in the frequency domain.
//! 4. Take the maximum of each correlation surface inside its region of interest.
//! 5. Map both peaks back to source image coordinates.
//!
//! Filters and regions of interest are stored in `.cfel` files, see
//! [`filter_file`].

mod correlation;
mod error;
pub mod filter_file;
mod kernel;
mod locator;
mod peak;
mod preprocess;

pub use correlation::{
    CorrelationEngine, CorrelationSurface, CorrelationWorkspace, Fft2d, FftScratch,
    FrequencyFilter,
};
pub use error::{DimensionError, LocateError};
pub use filter_file::{
    load_filter_file, read_filter_file, read_filter_file_with_order, save_filter_file,
    save_filter_file_with_order, write_filter_file, ByteOrder, FilterFile, FilterStoreError, FormatError,
};
pub use kernel::{check_roi, EyeSide, FilterKernel, FilterPair};
pub use locator::{EyeFilterModel, EyeLocator, EyeLocatorResult, EyePeaks, TileEyes};
pub use peak::{find_peak, Peak, PeakError};
pub use preprocess::LogLut;
