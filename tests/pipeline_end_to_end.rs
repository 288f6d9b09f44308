use stereomatch::{
    ChannelMode, ExecutionBackend, FillStrategy, Pixel, Raster, Stage, StereoConfig, StereoError,
    StereoPipeline,
};

/// RGBA scene where the right view sees everything `shift` pixels further left.
fn rgba_pair(width: usize, height: usize, shift: usize) -> (Raster, Raster) {
    let texture = |x: usize, y: usize| (((x * 7) ^ (y * 5) ^ (x * y / 3)) & 0xFF) as u8;
    let pixel = |v: u8| Pixel::new(v, v / 2, 255 - v, 255);
    let mut left = Raster::new(width, height, ChannelMode::Rgba).unwrap();
    let mut right = Raster::new(width, height, ChannelMode::Rgba).unwrap();
    for y in 0..height {
        for x in 0..width {
            let (v, w) = (texture(x, y), texture(x + shift, y));
            left.put_pixel(x, y, pixel(v)).unwrap();
            right.put_pixel(x, y, pixel(w)).unwrap();
        }
    }
    (left, right)
}

fn config() -> StereoConfig {
    StereoConfig {
        window_size: 5,
        max_search_distance: 8,
        cross_check_threshold: 2,
        downscale_factor: 2,
        fill: FillStrategy::Left,
    }
}

#[test]
fn pipeline_produces_every_stage_at_downscaled_size() {
    let (left, right) = rgba_pair(96, 64, 6);
    let pipeline = StereoPipeline::new(config(), ExecutionBackend::Sequential);
    let out = pipeline.run(left, right).unwrap();

    for raster in [
        &out.gray_left,
        &out.gray_right,
        &out.disparity_left,
        &out.disparity_right,
        &out.cross_checked,
        &out.filled,
    ] {
        assert_eq!((raster.width(), raster.height()), (48, 32));
        assert_eq!(raster.mode(), ChannelMode::Gray);
    }
    assert!(out.disparity_left.data().iter().all(|&d| d <= 8));
    assert!(out.disparity_right.data().iter().all(|&d| d <= 8));

    let zeros = |r: &Raster| r.data().iter().filter(|&&v| v == 0).count();
    assert!(zeros(&out.filled) <= zeros(&out.cross_checked));
    for (checked, filled) in out.cross_checked.data().iter().zip(out.filled.data()) {
        if *checked != 0 {
            assert_eq!(checked, filled);
        }
    }
}

#[cfg(feature = "rayon")]
#[test]
fn pipeline_output_is_backend_independent() {
    let (left, right) = rgba_pair(96, 64, 6);
    let reference = StereoPipeline::new(config(), ExecutionBackend::Sequential)
        .run(left.clone(), right.clone())
        .unwrap();
    for backend in [
        ExecutionBackend::thread_pool(2).unwrap(),
        ExecutionBackend::cpu_device(),
    ] {
        let name = backend.name().to_string();
        let out = StereoPipeline::new(config(), backend)
            .run(left.clone(), right.clone())
            .unwrap();
        assert_eq!(out.disparity_left, reference.disparity_left, "{name}");
        assert_eq!(out.disparity_right, reference.disparity_right, "{name}");
        assert_eq!(out.filled, reference.filled, "{name}");
    }
}

#[test]
fn mismatched_inputs_fail_in_first_matching_stage() {
    let (left, _) = rgba_pair(32, 32, 0);
    let (right, _) = rgba_pair(32, 28, 0);
    let err = StereoPipeline::new(config(), ExecutionBackend::Sequential)
        .run(left, right)
        .unwrap_err();
    assert_eq!(err.stage, Stage::DisparityLeftToRight);
    assert!(matches!(err.source, StereoError::SizeMismatch { .. }));
    let message = err.to_string();
    assert!(message.starts_with("left-to-right disparity failed"));
}

#[cfg(feature = "rayon")]
#[test]
fn thin_images_fail_on_thread_pool() {
    let (left, right) = rgba_pair(64, 40, 2);
    let pipeline = StereoPipeline::new(config(), ExecutionBackend::thread_pool(4).unwrap());
    let err = pipeline.run(left, right).unwrap_err();
    assert_eq!(err.stage, Stage::DisparityLeftToRight);
    assert!(matches!(err.source, StereoError::InsufficientRows { .. }));
}

#[test]
fn default_config_matches_documented_values() {
    let cfg = StereoConfig::default();
    assert_eq!(cfg.window_size, 9);
    assert_eq!(cfg.max_search_distance, 32);
    assert_eq!(cfg.cross_check_threshold, 8);
    assert_eq!(cfg.downscale_factor, 4);
    assert_eq!(cfg.fill, FillStrategy::Left);
}
