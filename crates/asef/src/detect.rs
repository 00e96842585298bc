use crate::core::{GrayImageView, PixelRect};
use crate::eyes::{EyeFilterModel, EyeLocator, EyeLocatorResult, LocateError};
use std::path::Path;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Errors produced by the image helpers.
#[derive(thiserror::Error, Debug)]
pub enum DetectError {
    #[error("invalid grayscale image buffer length (expected {expected} bytes, got {got})")]
    InvalidGrayBuffer { expected: usize, got: usize },

    #[error("invalid grayscale image dimensions (width={width}, height={height})")]
    InvalidGrayDimensions { width: u32, height: u32 },

    #[error(transparent)]
    Image(#[from] ::image::ImageError),
}

/// Convert an `image::GrayImage` into the lightweight `asef-core` view type.
pub fn gray_view(img: &::image::GrayImage) -> GrayImageView<'_> {
    GrayImageView {
        width: img.width() as usize,
        height: img.height() as usize,
        data: img.as_raw(),
    }
}

/// Build an `image::GrayImage` from a raw grayscale buffer.
pub fn gray_image_from_slice(
    width: u32,
    height: u32,
    pixels: &[u8],
) -> Result<::image::GrayImage, DetectError> {
    let w = usize::try_from(width).ok();
    let h = usize::try_from(height).ok();
    let Some((w, h)) = w.zip(h) else {
        return Err(DetectError::InvalidGrayDimensions { width, height });
    };
    let Some(expected) = w.checked_mul(h) else {
        return Err(DetectError::InvalidGrayDimensions { width, height });
    };
    if pixels.len() != expected {
        return Err(DetectError::InvalidGrayBuffer {
            expected,
            got: pixels.len(),
        });
    }
    ::image::GrayImage::from_raw(width, height, pixels.to_vec())
        .ok_or(DetectError::InvalidGrayDimensions { width, height })
}

/// Decode an image file of any supported format and convert it to luma.
pub fn load_gray(path: impl AsRef<Path>) -> Result<::image::GrayImage, DetectError> {
    Ok(::image::open(path)?.to_luma8())
}

/// Run the eye locator on every face of `img`.
#[cfg_attr(
    feature = "tracing",
    instrument(
        level = "info",
        skip(locator, img, faces),
        fields(width = img.width(), height = img.height(), faces = faces.len())
    )
)]
pub fn locate_eyes(
    locator: &mut EyeLocator,
    img: &::image::GrayImage,
    faces: &[PixelRect],
) -> Vec<Result<EyeLocatorResult, LocateError>> {
    locator.locate(&gray_view(img), faces)
}

/// Same as [`locate_eyes`] for any decoded image; color images are converted to luma.
pub fn locate_eyes_dynamic(
    locator: &mut EyeLocator,
    img: &::image::DynamicImage,
    faces: &[PixelRect],
) -> Vec<Result<EyeLocatorResult, LocateError>> {
    match img {
        ::image::DynamicImage::ImageLuma8(gray) => locate_eyes(locator, gray, faces),
        other => locate_eyes(locator, &other.to_luma8(), faces),
    }
}

/// Stateless variant working directly on the shared model.
pub fn locate_eyes_with_model(
    model: &EyeFilterModel,
    img: &::image::GrayImage,
    faces: &[PixelRect],
) -> Vec<Result<EyeLocatorResult, LocateError>> {
    model.locate(&gray_view(img), faces)
}

/// Run the eye locator on a raw row-major grayscale buffer.
pub fn locate_eyes_from_gray_u8(
    locator: &mut EyeLocator,
    width: u32,
    height: u32,
    pixels: &[u8],
    faces: &[PixelRect],
) -> Result<Vec<Result<EyeLocatorResult, LocateError>>, DetectError> {
    let Some(view) = GrayImageView::new(width as usize, height as usize, pixels) else {
        return Err(DetectError::InvalidGrayBuffer {
            expected: (width as usize).saturating_mul(height as usize),
            got: pixels.len(),
        });
    };
    Ok(locator.locate(&view, faces))
}
