use std::sync::Arc;

use asef_core::{GrayImage, PixelRect};
use asef_eyes::{
    load_filter_file, save_filter_file_with_order, ByteOrder, EyeFilterModel, EyeLocator,
    FilterFile, FilterKernel, FilterPair, FilterStoreError, FormatError, LocateError,
};

const TILE: usize = 64;

/// Gaussian centered on the origin with wrap-around, so the correlation
/// response peaks on bright blobs of the tile.
fn blob_filter(sigma: f32) -> FilterKernel {
    let cyclic = |v: usize| {
        let v = v as f32;
        v.min(TILE as f32 - v)
    };
    let data = (0..TILE * TILE)
        .map(|i| {
            let dx = cyclic(i % TILE);
            let dy = cyclic(i / TILE);
            (-(dx * dx + dy * dy) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    FilterKernel::new(TILE, TILE, data).unwrap()
}

fn filter_file() -> FilterFile {
    let filters = FilterPair::new(blob_filter(2.0), blob_filter(2.0)).unwrap();
    FilterFile::new(
        filters,
        PixelRect::new(0, 0, 32, 64),
        PixelRect::new(32, 0, 32, 64),
    )
    .unwrap()
    .with_comment("synthetic blob filters")
    .with_attribution("test fixture")
}

fn face_image(eyes: &[(f32, f32)]) -> GrayImage {
    GrayImage::from_fn(320, 240, |x, y| {
        let v = eyes
            .iter()
            .map(|&(ex, ey)| {
                let dx = x as f32 - ex;
                let dy = y as f32 - ey;
                200.0 * (-(dx * dx + dy * dy) / 32.0).exp()
            })
            .fold(30.0f32, f32::max);
        v.round().clamp(0.0, 255.0) as u8
    })
}

#[test]
fn locates_eyes_from_saved_filters() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("blobs.cfel");
    save_filter_file_with_order(&path, &filter_file(), ByteOrder::Big).unwrap();

    let loaded = load_filter_file(&path).unwrap();
    assert_eq!(loaded.comment, "synthetic blob filters");
    assert_eq!(loaded.attribution, "test fixture");

    let mut locator = EyeLocator::from_file(&path).unwrap();
    assert_eq!(locator.model().tile_width(), TILE);

    let left = (132.0, 100.0);
    let right = (196.0, 104.0);
    let image = face_image(&[left, right]);
    let face = PixelRect::new(100, 60, 128, 128);

    let results = locator.locate(&image.view(), &[face]);
    assert_eq!(results.len(), 1);
    let r = results[0].as_ref().unwrap();
    assert_eq!(r.face, face);
    assert!((r.left_eye.x - left.0).abs() <= 3.0, "left {:?}", r.left_eye);
    assert!((r.left_eye.y - left.1).abs() <= 3.0, "left {:?}", r.left_eye);
    assert!((r.right_eye.x - right.0).abs() <= 3.0, "right {:?}", r.right_eye);
    assert!((r.right_eye.y - right.1).abs() <= 3.0, "right {:?}", r.right_eye);
}

#[test]
fn locators_share_one_model_across_threads() {
    let model = Arc::new(EyeFilterModel::from_filter_file(&filter_file()).unwrap());
    let image = Arc::new(face_image(&[(132.0, 100.0), (196.0, 104.0)]));
    let faces = vec![
        PixelRect::new(100, 60, 128, 128),
        PixelRect::new(0, 0, 0, 0),
        PixelRect::new(90, 50, 150, 140),
    ];

    let handles: Vec<_> = (0..3)
        .map(|_| {
            let model = Arc::clone(&model);
            let image = Arc::clone(&image);
            let faces = faces.clone();
            std::thread::spawn(move || {
                let mut locator = EyeLocator::new(model);
                locator.locate(&image.view(), &faces)
            })
        })
        .collect();

    let expected = model.locate(&image.view(), &faces);
    for h in handles {
        let got = h.join().unwrap();
        assert_eq!(got, expected);
    }
    assert!(expected[0].is_ok());
    assert!(matches!(expected[1], Err(LocateError::Extract { .. })));
    assert!(expected[2].is_ok());
}

#[test]
fn truncated_file_reports_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("short.cfel");
    save_filter_file_with_order(&path, &filter_file(), ByteOrder::Little).unwrap();
    let bytes = std::fs::read(&path).unwrap();
    std::fs::write(&path, &bytes[..bytes.len() - 10]).unwrap();

    match EyeLocator::from_file(&path) {
        Err(FilterStoreError::Load { path: p, source }) => {
            assert_eq!(p, path);
            assert!(matches!(source, FormatError::ShortPayload { .. }));
        }
        other => panic!("expected load error, got {other:?}"),
    }
}
