#![cfg(feature = "gpu")]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use stereomatch::{
    match_disparity, ChannelMode, Direction, ExecutionBackend, FillStrategy, Filter, Raster,
    SearchParams,
};

/// Opens the GPU backend, or `None` on machines without an adapter.
fn gpu() -> Option<ExecutionBackend> {
    match ExecutionBackend::gpu() {
        Ok(backend) => Some(backend),
        Err(err) => {
            eprintln!("skipping: {err}");
            None
        }
    }
}

fn random_raster(width: usize, height: usize, mode: ChannelMode, seed: u64) -> Raster {
    let mut rng = StdRng::seed_from_u64(seed);
    let len = width * height * mode.channels();
    let data = (0..len).map(|_| rng.random::<u8>()).collect();
    Raster::from_vec(data, width, height, mode).unwrap()
}

#[test]
fn gpu_disparity_matches_sequential() {
    let Some(gpu) = gpu() else {
        return;
    };
    let seq = ExecutionBackend::Sequential;
    let left = random_raster(96, 64, ChannelMode::Gray, 1);
    let right = random_raster(96, 64, ChannelMode::Gray, 2);
    let params = SearchParams::new(9, 32, Direction::Left);

    let expected_l2r = match_disparity(&left, &right, params, &seq).unwrap();
    let expected_r2l = match_disparity(&right, &left, params.reversed(), &seq).unwrap();
    let l2r = match_disparity(&left, &right, params, &gpu).unwrap();
    let r2l = match_disparity(&right, &left, params.reversed(), &gpu).unwrap();
    assert_eq!(l2r, expected_l2r);
    assert_eq!(r2l, expected_r2l);

    let expected = seq.cross_check(&expected_l2r, &expected_r2l, 8).unwrap();
    let checked = gpu.cross_check(&l2r, &r2l, 8).unwrap();
    assert_eq!(checked, expected);

    for strategy in [FillStrategy::Left, FillStrategy::Nearest] {
        let mut want = expected.clone();
        seq.occlusion_fill(&mut want, strategy).unwrap();
        let mut got = checked.clone();
        gpu.occlusion_fill(&mut got, strategy).unwrap();
        assert_eq!(got, want, "{strategy:?}");
    }
}

#[test]
fn gpu_image_stages_match_sequential() {
    let Some(gpu) = gpu() else {
        return;
    };
    let seq = ExecutionBackend::Sequential;
    let rgba = random_raster(53, 41, ChannelMode::Rgba, 3);

    assert_eq!(
        gpu.grayscale(rgba.clone()).unwrap(),
        seq.grayscale(rgba.clone()).unwrap()
    );
    for size in [3, 5, 9] {
        let filter = Filter::mean(size).unwrap();
        assert_eq!(
            gpu.filter(&rgba, &filter).unwrap(),
            seq.filter(&rgba, &filter).unwrap(),
            "mean {size}"
        );
    }
    for factor in [2, 4] {
        assert_eq!(
            gpu.downscale(rgba.clone(), factor).unwrap(),
            seq.downscale(rgba.clone(), factor).unwrap(),
            "factor {factor}"
        );
    }
}
