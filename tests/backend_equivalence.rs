#![cfg(feature = "rayon")]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use stereomatch::lowlevel::partition_rows;
use stereomatch::{
    apply_filter, downscale, match_disparity, to_grayscale, ChannelMode, Direction,
    ExecutionBackend, FillStrategy, Filter, Raster, SearchParams, StereoError,
};

/// Smooth textured scene with a horizontally shifted copy, plus noise.
fn stereo_pair(width: usize, height: usize, shift: usize, seed: u64) -> (Raster, Raster) {
    let mut rng = StdRng::seed_from_u64(seed);
    let base: Vec<u8> = (0..width * height)
        .map(|i| {
            let (x, y) = (i % width, i / width);
            (((x * 13) ^ (y * 7) ^ (x * y)) & 0xFF) as u8
        })
        .collect();
    let mut right = vec![0u8; width * height];
    for y in 0..height {
        for x in 0..width {
            let sx = (x + shift).min(width - 1);
            let noise: i16 = rng.random_range(-3..=3);
            let v = i16::from(base[y * width + sx]) + noise;
            right[y * width + x] = v.clamp(0, 255) as u8;
        }
    }
    (
        Raster::from_vec(base, width, height, ChannelMode::Gray).unwrap(),
        Raster::from_vec(right, width, height, ChannelMode::Gray).unwrap(),
    )
}

fn backends() -> Vec<ExecutionBackend> {
    vec![
        ExecutionBackend::Sequential,
        ExecutionBackend::thread_pool(1).unwrap(),
        ExecutionBackend::thread_pool(3).unwrap(),
        ExecutionBackend::thread_pool(4).unwrap(),
        ExecutionBackend::cpu_device(),
    ]
}

#[test]
fn all_backends_produce_identical_disparity_maps() {
    let (left, right) = stereo_pair(64, 48, 4, 11);
    for direction in [Direction::Left, Direction::Right] {
        let params = SearchParams::new(5, 10, direction);
        let (reference, other) = match direction {
            Direction::Left => (&left, &right),
            Direction::Right => (&right, &left),
        };
        let expected =
            match_disparity(reference, other, params, &ExecutionBackend::Sequential).unwrap();
        for backend in backends() {
            let map = match_disparity(reference, other, params, &backend).unwrap();
            assert_eq!(map, expected, "{} {:?}", backend.name(), direction);
        }
    }
}

#[test]
fn uneven_heights_are_fully_covered() {
    for height in 37..=45 {
        let (left, right) = stereo_pair(24, height, 2, height as u64);
        let params = SearchParams::new(9, 4, Direction::Left);
        let expected =
            match_disparity(&left, &right, params, &ExecutionBackend::Sequential).unwrap();
        let pool = ExecutionBackend::thread_pool(4).unwrap();
        let map = match_disparity(&left, &right, params, &pool).unwrap();
        assert_eq!(map, expected, "height {height}");
    }
}

#[test]
fn thread_pool_rejects_thin_bands() {
    let (left, right) = stereo_pair(32, 40, 2, 3);
    let pool = ExecutionBackend::thread_pool(8).unwrap();
    let params = SearchParams::new(5, 4, Direction::Left);
    let err = match_disparity(&left, &right, params, &pool).unwrap_err();
    assert_eq!(
        err,
        StereoError::InsufficientRows {
            height: 40,
            workers: 8,
            window_size: 5,
        }
    );
}

#[test]
fn partitions_cover_searchable_rows_exactly() {
    for (height, window, workers) in [(48, 5, 4), (100, 9, 3), (41, 9, 4), (64, 3, 7)] {
        let bands = partition_rows(height, window, workers).unwrap();
        let half = window / 2;
        assert_eq!(bands.len(), workers);
        assert_eq!(bands[0].row_start, half);
        assert_eq!(bands[workers - 1].row_end, height - half);
        for pair in bands.windows(2) {
            assert_eq!(pair[0].row_end, pair[1].row_start);
        }
        assert!(bands.iter().all(|b| !b.is_empty()));
    }
}

#[test]
fn post_processing_matches_across_backends() {
    let (left, right) = stereo_pair(40, 30, 3, 21);
    let params = SearchParams::new(5, 8, Direction::Left);
    let seq = ExecutionBackend::Sequential;
    let l2r = match_disparity(&left, &right, params, &seq).unwrap();
    let r2l = match_disparity(&right, &left, params.reversed(), &seq).unwrap();
    let checked = seq.cross_check(&l2r, &r2l, 2).unwrap();

    for backend in backends() {
        assert_eq!(backend.cross_check(&l2r, &r2l, 2).unwrap(), checked);
        for strategy in [FillStrategy::Left, FillStrategy::Nearest] {
            let mut expected = checked.clone();
            seq.occlusion_fill(&mut expected, strategy).unwrap();
            let mut filled = checked.clone();
            backend.occlusion_fill(&mut filled, strategy).unwrap();
            assert_eq!(filled, expected, "{} {:?}", backend.name(), strategy);
        }
    }
}

fn random_rgba(width: usize, height: usize, seed: u64) -> Raster {
    let mut rng = StdRng::seed_from_u64(seed);
    let data = (0..width * height * 4).map(|_| rng.random::<u8>()).collect();
    Raster::from_vec(data, width, height, ChannelMode::Rgba).unwrap()
}

#[test]
fn grayscale_matches_across_backends() {
    let rgba = random_rgba(37, 21, 5);
    let expected = to_grayscale(rgba.clone()).unwrap();
    for backend in backends() {
        let gray = backend.grayscale(rgba.clone()).unwrap();
        assert_eq!(gray, expected, "{}", backend.name());
    }
}

#[test]
fn filters_match_across_backends() {
    let rgba = random_rgba(29, 18, 6);
    let (gray, _) = stereo_pair(29, 18, 0, 7);
    let weights = vec![0.0, -1.0, 0.0, -1.0, 5.0, -1.0, 0.0, -1.0, 0.0];
    let sharpen = Filter::new(3, 1.0, weights).unwrap();
    for filter in [Filter::mean(5).unwrap(), sharpen] {
        for raster in [&rgba, &gray] {
            let expected = apply_filter(raster, &filter).unwrap();
            for backend in backends() {
                let out = backend.filter(raster, &filter).unwrap();
                assert_eq!(out, expected, "{} size {}", backend.name(), filter.size());
            }
        }
    }
}

#[test]
fn downscale_matches_across_backends() {
    let rgba = random_rgba(41, 33, 8);
    for factor in [2, 3, 4] {
        let expected = downscale(rgba.clone(), factor).unwrap();
        for backend in backends() {
            let out = backend.downscale(rgba.clone(), factor).unwrap();
            assert_eq!(out, expected, "{} factor {factor}", backend.name());
        }
    }
}

#[test]
fn even_masks_fail_on_every_backend() {
    let (gray, _) = stereo_pair(8, 8, 0, 9);
    let filter = Filter::mean(4).unwrap();
    for backend in backends() {
        assert!(matches!(
            backend.filter(&gray, &filter),
            Err(StereoError::InvalidFilter { size: 4, .. })
        ));
    }
}
