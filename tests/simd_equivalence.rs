#![cfg(feature = "simd")]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use stereomatch::lowlevel::{best_disparity, ZnccKernel, ZnccScalar, ZnccSimd};
use stereomatch::{Direction, ImageView, SearchParams};

fn random_image(width: usize, height: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..width * height).map(|_| rng.random::<u8>()).collect()
}

#[test]
fn window_sums_match_scalar_exactly() {
    let (width, height) = (64, 40);
    let a = random_image(width, height, 1);
    let b = random_image(width, height, 2);
    let ra = ImageView::from_slice(&a, width, height).unwrap();
    let rb = ImageView::from_slice(&b, width, height).unwrap();

    for half in [1, 4, 8, 12] {
        for (x, ox, y) in [(half, half, half), (30, 27, 19), (63 - half, 40, 39 - half)] {
            let ma = ra.window_mean(x, y, half);
            let mb = rb.window_mean(ox, y, half);
            assert_eq!(
                ZnccSimd::window_sums(ra, rb, x, ox, y, half, ma, mb),
                ZnccScalar::window_sums(ra, rb, x, ox, y, half, ma, mb),
                "half {half} at ({x}, {y})"
            );
        }
    }
}

#[test]
fn best_disparity_matches_scalar() {
    let (width, height) = (48, 24);
    let a = random_image(width, height, 3);
    let b = random_image(width, height, 4);
    let ra = ImageView::from_slice(&a, width, height).unwrap();
    let rb = ImageView::from_slice(&b, width, height).unwrap();
    for direction in [Direction::Left, Direction::Right] {
        let params = SearchParams::new(9, 12, direction);
        for y in 4..height - 4 {
            for x in 4..width - 4 {
                assert_eq!(
                    best_disparity::<ZnccSimd>(ra, rb, x, y, &params),
                    best_disparity::<ZnccScalar>(ra, rb, x, y, &params)
                );
            }
        }
    }
}

#[test]
fn wide_windows_stay_exact() {
    // Full-contrast checkerboard: every deviation is about 127, so a
    // 1031-pixel window sums far past i32::MAX.
    let side = 1031;
    let data: Vec<u8> = (0..side * side)
        .map(|i| (((i % side + i / side) % 2) * 255) as u8)
        .collect();
    let view = ImageView::from_slice(&data, side, side).unwrap();
    let half = side / 2;
    let mean = view.window_mean(half, half, half);
    let simd = ZnccSimd::window_sums(view, view, half, half, half, half, mean, mean);
    assert_eq!(
        simd,
        ZnccScalar::window_sums(view, view, half, half, half, half, mean, mean)
    );
    assert!(simd.ref_sq > i64::from(i32::MAX));
}
