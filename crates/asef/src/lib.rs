//! High-level facade crate for the `asef-*` workspace.
//!
//! This crate provides:
//! - re-exports of the geometry crate (`asef-core`) and the eye locator
//!   (`asef-eyes`)
//! - (feature-gated) helpers that run the eye locator on `image` buffers
//! - JSON configuration and report types used by the `asef-eyes` binary
//!
//! ## Quickstart
//!
//! ```no_run
//! use asef::detect;
//! use asef::eyes::EyeLocator;
//! use asef::core::PixelRect;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut locator = EyeLocator::from_file("eyes.cfel")?;
//! let img = detect::load_gray("portrait.png")?;
//! let faces = [PixelRect::new(120, 80, 200, 200)];
//!
//! for res in detect::locate_eyes(&mut locator, &img, &faces) {
//!     match res {
//!         Ok(r) => println!("left {:?} right {:?}", r.left_eye, r.right_eye),
//!         Err(e) => println!("failed: {e}"),
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `asef::core`: image buffers, rectangles, rect-to-tile affine, tile extraction.
//! - `asef::eyes`: filter files, correlation engine, peak search, eye locator.
//! - `asef::io`: JSON config and report for batch runs.
//! - `asef::detect` (feature `image`): helpers from `image::GrayImage` / `DynamicImage`.

pub use asef_core as core;
pub use asef_eyes as eyes;

pub use asef_core::PixelRect;
pub use asef_eyes::{EyeFilterModel, EyeLocator, EyeLocatorResult, LocateError};

#[cfg(feature = "image")]
pub mod detect;
pub mod io;
