use crate::{sample_bilinear_clamped, AffineTransform, GrayImage, GrayImageView, PixelRect};
use nalgebra::Point2;

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("rectangle {rect} has zero width or height")]
    DegenerateRect { rect: PixelRect },
    #[error("rectangle {rect} does not overlap the {width}x{height} image")]
    OutsideImage {
        rect: PixelRect,
        width: usize,
        height: usize,
    },
    #[error("tile size {width}x{height} is empty")]
    EmptyTile { width: usize, height: usize },
}

/// A rectangle of a source image resampled onto a fixed-size tile.
#[derive(Clone, Debug)]
pub struct RectifiedTile {
    pub tile: GrayImage,
    /// Maps source image coordinates to tile coordinates.
    pub tile_from_img: AffineTransform,
    /// Maps tile coordinates back to source image coordinates.
    pub img_from_tile: AffineTransform,
}

impl RectifiedTile {
    /// Source-image position of a tile-space point.
    pub fn to_image(&self, p_tile: Point2<f32>) -> Point2<f32> {
        self.img_from_tile.map_point(p_tile)
    }
}

/// Resample `rect` of `src` into a `tile_width x tile_height` tile.
///
/// Every tile pixel center is mapped back through the rect-to-tile transform
/// and sampled bilinearly; pixels that fall outside the image replicate the
/// border. The rectangle must have positive area and overlap the image.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(src), fields(width = src.width, height = src.height))
)]
pub fn extract_tile(
    src: &GrayImageView<'_>,
    rect: PixelRect,
    tile_width: usize,
    tile_height: usize,
) -> Result<RectifiedTile, ExtractError> {
    if tile_width == 0 || tile_height == 0 {
        return Err(ExtractError::EmptyTile {
            width: tile_width,
            height: tile_height,
        });
    }
    if rect.is_empty() {
        return Err(ExtractError::DegenerateRect { rect });
    }
    if rect.clip_to(src.width, src.height).is_none() {
        return Err(ExtractError::OutsideImage {
            rect,
            width: src.width,
            height: src.height,
        });
    }

    let tile_from_img = AffineTransform::from_rect_to_tile(rect, tile_width, tile_height)
        .ok_or(ExtractError::DegenerateRect { rect })?;
    let img_from_tile = tile_from_img
        .inverse()
        .ok_or(ExtractError::DegenerateRect { rect })?;

    let tile = warp_affine_gray(src, &img_from_tile, tile_width, tile_height);

    Ok(RectifiedTile {
        tile,
        tile_from_img,
        img_from_tile,
    })
}

/// Warp into a tile: for each destination pixel, map its center into the source
/// via `img_from_tile` and sample with border replication.
pub fn warp_affine_gray(
    src: &GrayImageView<'_>,
    img_from_tile: &AffineTransform,
    out_w: usize,
    out_h: usize,
) -> GrayImage {
    let mut out = vec![0u8; out_w * out_h];
    if src.width == 0 || src.height == 0 {
        return GrayImage {
            width: out_w,
            height: out_h,
            data: out,
        };
    }

    for y in 0..out_h {
        for x in 0..out_w {
            let pt = Point2::new(x as f32 + 0.5, y as f32 + 0.5);
            let pi = img_from_tile.map_point(pt);
            // sampler places pixel centers on integer coordinates
            let v = sample_bilinear_clamped(src, pi.x - 0.5, pi.y - 0.5);
            out[y * out_w + x] = v.round().clamp(0.0, 255.0) as u8;
        }
    }

    GrayImage {
        width: out_w,
        height: out_h,
        data: out,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_downscale_averages_blocks() {
        // 4x4 image of 2x2 blocks, each block a single value
        let img = GrayImage::from_fn(4, 4, |x, y| match (x / 2, y / 2) {
            (0, 0) => 10,
            (1, 0) => 60,
            (0, 1) => 110,
            _ => 160,
        });
        let out = extract_tile(&img.view(), PixelRect::new(0, 0, 4, 4), 2, 2).expect("tile");
        assert_eq!(out.tile.data, vec![10, 60, 110, 160]);
    }

    #[test]
    fn identity_sized_extraction_copies_pixels() {
        let img = GrayImage::from_fn(10, 8, |x, y| (x * 20 + y) as u8);
        let rect = PixelRect::new(3, 2, 4, 5);
        let out = extract_tile(&img.view(), rect, 4, 5).expect("tile");
        for ty in 0..5 {
            for tx in 0..4 {
                assert_eq!(
                    out.tile.data[ty * 4 + tx],
                    img.data[(ty + 2) * 10 + tx + 3],
                    "pixel ({tx},{ty})"
                );
            }
        }
        let p = out.to_image(Point2::new(1.0, 1.0));
        assert!((p.x - 4.0).abs() < 1e-5 && (p.y - 3.0).abs() < 1e-5);
    }

    #[test]
    fn partially_outside_rect_replicates_border() {
        let img = GrayImage::from_fn(6, 6, |_, _| 200);
        let out = extract_tile(&img.view(), PixelRect::new(-3, -3, 6, 6), 3, 3).expect("tile");
        assert!(out.tile.data.iter().all(|&v| v == 200));
    }

    #[test]
    fn degenerate_and_disjoint_rects_fail() {
        let img = GrayImage::new(16, 16);
        let view = img.view();

        assert_eq!(
            extract_tile(&view, PixelRect::new(2, 2, 0, 5), 8, 8).unwrap_err(),
            ExtractError::DegenerateRect {
                rect: PixelRect::new(2, 2, 0, 5)
            }
        );
        assert!(matches!(
            extract_tile(&view, PixelRect::new(40, 2, 5, 5), 8, 8),
            Err(ExtractError::OutsideImage { .. })
        ));
        assert!(matches!(
            extract_tile(&view, PixelRect::new(0, 0, 5, 5), 0, 8),
            Err(ExtractError::EmptyTile { .. })
        ));
    }

    #[test]
    fn huge_rect_samples_border_instead_of_overflowing() {
        let img = GrayImage::from_fn(16, 16, |x, _| if x == 15 { 77 } else { 5 });
        let rect = PixelRect::new(0, 0, 4_000_000_000, 10);
        let out = extract_tile(&img.view(), rect, 8, 8).expect("tile");
        // every tile column maps far right of the image onto the last column
        assert!(out.tile.data.iter().all(|&v| v == 77));
    }
}
