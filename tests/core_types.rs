use stereomatch::{
    apply_filter, downscale, filter_mean, to_grayscale, ChannelMode, Filter, ImageView, Pixel,
    Raster, StereoError,
};

fn gray(data: Vec<u8>, width: usize, height: usize) -> Raster {
    Raster::from_vec(data, width, height, ChannelMode::Gray).unwrap()
}

#[test]
fn image_view_rejects_invalid_dimensions() {
    let data = [0u8; 4];

    let err = ImageView::from_slice(&data, 0, 1).err().unwrap();
    assert_eq!(
        err,
        StereoError::InvalidDimensions {
            width: 0,
            height: 1,
        }
    );

    let err = ImageView::new(&data[..3], 2, 2, 2).err().unwrap();
    assert_eq!(err, StereoError::BufferTooSmall { needed: 4, got: 3 });
}

#[test]
fn raster_new_is_zero_filled_and_sized_by_mode() {
    let rgba = Raster::new(3, 2, ChannelMode::Rgba).unwrap();
    assert_eq!(rgba.data().len(), 24);
    assert!(rgba.data().iter().all(|&v| v == 0));
    assert!(rgba.get_pixel(2, 1).unwrap().is_zero());

    let gray = Raster::new(3, 2, ChannelMode::Gray).unwrap();
    assert_eq!(gray.data().len(), 6);

    assert_eq!(
        Raster::new(0, 2, ChannelMode::Gray),
        Err(StereoError::InvalidDimensions {
            width: 0,
            height: 2,
        })
    );
}

#[test]
fn pixel_access_is_bounds_checked() {
    let mut raster = Raster::new(4, 3, ChannelMode::Rgba).unwrap();
    raster.put_pixel(3, 2, Pixel::new(1, 2, 3, 4)).unwrap();
    assert_eq!(raster.get_pixel(3, 2).unwrap(), Pixel::new(1, 2, 3, 4));

    assert_eq!(
        raster.get_pixel(4, 0),
        Err(StereoError::OutOfBounds {
            x: 4,
            y: 0,
            width: 4,
            height: 3,
        })
    );
    assert!(matches!(
        raster.put_pixel(0, 3, Pixel::gray(9)),
        Err(StereoError::OutOfBounds { .. })
    ));
}

#[test]
fn gray_values_round_trip_through_both_layouts() {
    let mut rgba = Raster::new(2, 2, ChannelMode::Rgba).unwrap();
    rgba.put_gray(1, 0, 77).unwrap();
    assert_eq!(rgba.get_pixel(1, 0).unwrap(), Pixel::new(77, 77, 77, 255));

    let mut single = Raster::new(2, 2, ChannelMode::Gray).unwrap();
    single.put_gray(0, 1, 12).unwrap();
    assert_eq!(single.get_pixel(0, 1).unwrap(), Pixel::gray(12));
    assert_eq!(single.get_gray(0, 1).unwrap(), 12);
}

#[test]
fn replace_takes_over_the_other_buffer() {
    let mut a = Raster::new(2, 2, ChannelMode::Gray).unwrap();
    let b = gray(vec![1, 2, 3, 4, 5, 6], 3, 2);
    a.replace(b.clone());
    assert_eq!(a, b);
    assert_eq!(a.width(), 3);
}

#[test]
fn gray_average_uses_integer_mean_and_rejects_overhang() {
    let raster = gray(vec![1, 2, 3, 4, 5, 6, 7, 8, 9], 3, 3);
    assert_eq!(raster.gray_average(0, 0, 2, 2).unwrap(), 3);
    assert_eq!(raster.gray_average(0, 0, 3, 3).unwrap(), 5);
    assert!(matches!(
        raster.gray_average(2, 2, 2, 1),
        Err(StereoError::OutOfBounds { .. })
    ));
}

#[test]
fn filter_rejects_even_size_at_apply_time() {
    let filter = Filter::new(2, 4.0, vec![1.0; 4]).unwrap();
    let raster = gray(vec![10; 9], 3, 3);
    assert!(matches!(
        apply_filter(&raster, &filter),
        Err(StereoError::InvalidFilter { size: 2, .. })
    ));
    assert!(Filter::new(3, 0.0, vec![1.0; 9]).is_err());
    assert!(Filter::new(3, 9.0, vec![1.0; 8]).is_err());
}

#[test]
fn mean_filter_zero_pads_edges() {
    let raster = gray(vec![90; 9], 3, 3);
    let out = filter_mean(&raster, 3).unwrap();
    // Corners see 4 of 9 pixels, edges 6, the centre all 9.
    assert_eq!(out.data(), &[40, 60, 40, 60, 90, 60, 40, 60, 40]);
    assert_eq!(raster.data(), &[90; 9]);
}

#[test]
fn filter_output_saturates() {
    let filter = Filter::new(1, 1.0, vec![-2.0]).unwrap();
    let out = apply_filter(&gray(vec![5, 200], 2, 1), &filter).unwrap();
    assert_eq!(out.data(), &[0, 0]);

    let filter = Filter::new(1, 1.0, vec![2.0]).unwrap();
    let out = apply_filter(&gray(vec![5, 200], 2, 1), &filter).unwrap();
    assert_eq!(out.data(), &[10, 255]);
}

#[test]
fn downscale_by_one_is_identity() {
    let raster = gray((0..20).collect(), 5, 4);
    assert_eq!(downscale(raster.clone(), 1).unwrap(), raster);
    assert_eq!(downscale(raster.clone(), 0).unwrap(), raster);
}

#[test]
fn downscale_keeps_flat_interior_and_floors_dimensions() {
    let raster = gray(vec![100; 9 * 7], 9, 7);
    let out = downscale(raster, 2).unwrap();
    assert_eq!((out.width(), out.height()), (4, 3));
    // (2, 2) in the source is far enough from the border to see no padding.
    assert_eq!(out.get_gray(1, 1).unwrap(), 100);
    // (0, 0) sees a zero-padded 3x3 window.
    assert_eq!(out.get_gray(0, 0).unwrap(), 44);
}

#[test]
fn downscale_to_nothing_is_rejected() {
    let raster = gray(vec![1; 6], 3, 2);
    assert!(matches!(
        downscale(raster, 4),
        Err(StereoError::InvalidDimensions { .. })
    ));
}

#[test]
fn grayscale_uses_ntsc_weights_rounded_up() {
    let mut rgba = Raster::new(3, 1, ChannelMode::Rgba).unwrap();
    let white = Pixel::new(255, 255, 255, 255);
    rgba.put_pixel(0, 0, white).unwrap();
    rgba.put_pixel(1, 0, Pixel::new(100, 0, 0, 255)).unwrap();
    rgba.put_pixel(2, 0, Pixel::new(0, 0, 0, 0)).unwrap();
    let gray = to_grayscale(rgba).unwrap();
    assert_eq!(gray.mode(), ChannelMode::Gray);
    assert_eq!(gray.get_gray(0, 0).unwrap(), 255);
    // 0.299 * 100 = 29.9 -> 30
    assert_eq!(gray.get_gray(1, 0).unwrap(), 30);
    assert_eq!(gray.get_gray(2, 0).unwrap(), 0);
}
