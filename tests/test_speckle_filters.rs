use approx::assert_relative_eq;
use ndarray::Array2;
use num_complex::Complex;
use sardine_speckle::core::{collect_neighborhood, IdanFilter, SampleDomain, SourceTile};
use sardine_speckle::{
    BandUnit, MemoryRaster, Rectangle, SarError, SarRealImage, SpeckleFilter, SpeckleFilterParams,
    SpeckleFilterProcessor, SpeckleFilterType,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Fully developed single-look speckle: exponential intensity around `mean`
fn speckled_field(rows: usize, cols: usize, mean: f64, seed: u64) -> SarRealImage {
    let mut state = seed;
    Array2::from_shape_fn((rows, cols), |_| {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let u = ((state >> 11) as f64 + 0.5) / (1u64 << 53) as f64;
        -u.ln() * mean
    })
}

fn image_mean(image: &SarRealImage) -> f64 {
    image.sum() / image.len() as f64
}

fn image_variance(image: &SarRealImage) -> f64 {
    let mean = image_mean(image);
    image.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / (image.len() - 1) as f64
}

fn processor(filter: SpeckleFilterType) -> SpeckleFilterProcessor {
    SpeckleFilterProcessor::with_filter(filter).expect("default parameters are valid")
}

#[test]
fn test_frost_on_constant_tile() {
    init_logging();
    let image = Array2::from_elem((9, 9), 100.0);
    let params = SpeckleFilterParams {
        damping_factor: 2.0,
        ..SpeckleFilterParams::for_filter(SpeckleFilterType::Frost)
    };
    let processor = SpeckleFilterProcessor::new(params).unwrap();

    let output = processor.filter_array(&image, BandUnit::Intensity, 0.0).unwrap();
    assert_eq!(output.dim(), (9, 9));
    for &v in output.iter() {
        assert_relative_eq!(v, 100.0, epsilon = 1e-9);
    }
}

#[test]
fn test_idan_keeps_isolated_spike() {
    init_logging();
    let mut image = Array2::from_elem((21, 21), 100.0);
    image[[10, 10]] = 1000.0;

    let raster = MemoryRaster::from_array("Intensity_VV", image.clone(), BandUnit::Intensity, 0.0).unwrap();
    let region = Rectangle::new(0, 0, 21, 21);
    let tile = SourceTile::fetch(&raster, &["Intensity_VV"], &region).unwrap();
    let filter = IdanFilter::new(50, 1).unwrap();
    assert_eq!(filter.adaptive_neighborhood(&tile, 10, 10), vec![(10, 10)]);

    let params = SpeckleFilterParams {
        num_looks_str: "1".to_string(),
        an_size: 50,
        ..SpeckleFilterParams::for_filter(SpeckleFilterType::Idan)
    };
    let output = SpeckleFilterProcessor::new(params)
        .unwrap()
        .filter_band(&raster, &["Intensity_VV"])
        .unwrap();

    assert_eq!(output[[10, 10]], 1000.0);
    // neighbours of the spike never grow into it
    for (y, x) in [(9, 10), (11, 10), (10, 9), (10, 11), (9, 9), (0, 0)] {
        assert_relative_eq!(output[[y, x]], 100.0, epsilon = 1e-9);
    }
}

#[test]
fn test_lee_sigma_keeps_bright_cluster() {
    init_logging();
    let mut image = Array2::from_elem((32, 32), 10.0);
    for r in 14..17 {
        for c in 14..17 {
            image[[r, c]] = 1000.0;
        }
    }
    let params = SpeckleFilterParams {
        num_looks_str: "1".to_string(),
        window_size: "7x7".to_string(),
        target_window_size_str: "5x5".to_string(),
        sigma_str: "0.9".to_string(),
        ..SpeckleFilterParams::for_filter(SpeckleFilterType::LeeSigma)
    };
    let output = SpeckleFilterProcessor::new(params)
        .unwrap()
        .filter_array(&image, BandUnit::Intensity, 0.0)
        .unwrap();

    for r in 14..17 {
        for c in 14..17 {
            assert_eq!(output[[r, c]], 1000.0, "cluster pixel ({}, {}) was filtered", r, c);
        }
    }
    assert_relative_eq!(output[[2, 2]], 10.0, epsilon = 1e-9);
}

#[test]
fn test_homogeneous_regions_keep_their_level() {
    init_logging();
    let image = Array2::from_elem((20, 20), 50.0);
    for filter in [
        SpeckleFilterType::GammaMap,
        SpeckleFilterType::LeeSigma,
        SpeckleFilterType::Lee,
        SpeckleFilterType::RefinedLee,
        SpeckleFilterType::Idan,
    ] {
        let output = processor(filter).filter_array(&image, BandUnit::Intensity, 0.0).unwrap();
        for &v in output.iter() {
            assert_relative_eq!(v, 50.0, epsilon = 1e-9);
        }
    }
}

#[test]
fn test_speckle_is_reduced() {
    init_logging();
    let image = speckled_field(64, 64, 100.0, 42);
    let input_variance = image_variance(&image);

    for filter in [
        SpeckleFilterType::Mean,
        SpeckleFilterType::GammaMap,
        SpeckleFilterType::LeeSigma,
        SpeckleFilterType::RefinedLee,
    ] {
        let params = SpeckleFilterParams {
            filter_size_x: 5,
            filter_size_y: 5,
            ..SpeckleFilterParams::for_filter(filter)
        };
        let output = SpeckleFilterProcessor::new(params)
            .unwrap()
            .filter_array(&image, BandUnit::Intensity, 0.0)
            .unwrap();
        assert!(output.iter().all(|v| v.is_finite() && *v > 0.0), "{} produced invalid values", filter);

        let variance = image_variance(&output);
        assert!(
            variance < 0.5 * input_variance,
            "{}: variance {} not reduced from {}",
            filter,
            variance,
            input_variance
        );
        let relative_bias = (image_mean(&output) - image_mean(&image)).abs() / image_mean(&image);
        assert!(relative_bias < 0.25, "{}: mean drifted by {:.1}%", filter, relative_bias * 100.0);
    }
}

#[test]
fn test_no_data_pixels_stay_no_data() {
    init_logging();
    let no_data = -1.0;
    let mut image = speckled_field(24, 24, 100.0, 7);
    image[[10, 10]] = no_data;
    for c in 0..24 {
        image[[17, c]] = no_data;
    }

    for filter in SpeckleFilterType::ALL {
        let output = processor(filter).filter_array(&image, BandUnit::Intensity, no_data).unwrap();
        for ((r, c), &v) in output.indexed_iter() {
            if image[[r, c]] == no_data {
                assert_eq!(v, no_data, "{} filled no-data pixel ({}, {})", filter, r, c);
            } else {
                assert!(v.is_finite() && v != no_data, "{} lost pixel ({}, {}): {}", filter, r, c, v);
            }
        }
    }
}

#[test]
fn test_refined_lee_border_windows_are_clipped() {
    init_logging();
    let image = speckled_field(16, 16, 100.0, 3);
    let raster = MemoryRaster::from_array("band", image.clone(), BandUnit::Intensity, 0.0).unwrap();
    let tile = SourceTile::fetch(&raster, &["band"], &Rectangle::new(0, 0, 16, 16)).unwrap();

    for (x, y) in [(0, 0), (2, 8), (8, 13), (15, 15)] {
        let nb = collect_neighborhood(&tile, x, y, 3, 3, SampleDomain::Intensity);
        assert!(nb.valid_count() < 49);
        assert!(!nb.is_full());
    }
    assert!(collect_neighborhood(&tile, 8, 8, 3, 3, SampleDomain::Intensity).is_full());

    // the clipped-window estimate is an MMSE blend, so it lies between the
    // window mean and the center value
    let output = processor(SpeckleFilterType::RefinedLee)
        .filter_array(&image, BandUnit::Intensity, 0.0)
        .unwrap();
    let nb = collect_neighborhood(&tile, 0, 0, 3, 3, SampleDomain::Intensity);
    let window_mean = nb.mean();
    let (lo, hi) = if window_mean < image[[0, 0]] {
        (window_mean, image[[0, 0]])
    } else {
        (image[[0, 0]], window_mean)
    };
    assert!(output[[0, 0]] >= lo - 1e-9 && output[[0, 0]] <= hi + 1e-9);
}

#[test]
fn test_tiled_processing_matches_single_tile() {
    init_logging();
    let image = speckled_field(37, 29, 100.0, 11);

    for filter in [
        SpeckleFilterType::Mean,
        SpeckleFilterType::Median,
        SpeckleFilterType::Frost,
        SpeckleFilterType::GammaMap,
        SpeckleFilterType::Lee,
        SpeckleFilterType::RefinedLee,
        SpeckleFilterType::Idan,
    ] {
        let whole = SpeckleFilterParams {
            filter_size_x: 5,
            filter_size_y: 5,
            an_size: 12,
            ..SpeckleFilterParams::for_filter(filter)
        };
        let tiled = SpeckleFilterParams { tile_size: 8, ..whole.clone() };

        let expected = SpeckleFilterProcessor::new(whole)
            .unwrap()
            .filter_array(&image, BandUnit::Intensity, 0.0)
            .unwrap();
        let actual = SpeckleFilterProcessor::new(tiled)
            .unwrap()
            .filter_array(&image, BandUnit::Intensity, 0.0)
            .unwrap();

        for ((r, c), &v) in actual.indexed_iter() {
            assert!(
                (v - expected[[r, c]]).abs() <= 1e-9 * expected[[r, c]].abs().max(1.0),
                "{}: tiled {} != whole {} at ({}, {})",
                filter,
                v,
                expected[[r, c]],
                r,
                c
            );
        }
    }
}

#[test]
fn test_complex_pair_is_filtered_as_intensity() {
    init_logging();
    let slc = Array2::from_elem((12, 12), Complex::new(3.0, 4.0));
    let mut raster = MemoryRaster::new(12, 12);
    raster.add_complex_bands("i_VV", "q_VV", &slc, 0.0).unwrap();

    let output = processor(SpeckleFilterType::Mean)
        .filter_band(&raster, &["i_VV", "q_VV"])
        .unwrap();
    for &v in output.iter() {
        assert_relative_eq!(v, 25.0, epsilon = 1e-9);
    }

    // one half of a pair has no meaning on its own
    assert!(matches!(
        processor(SpeckleFilterType::Mean).filter_band(&raster, &["i_VV"]),
        Err(SarError::UnsupportedUnit(_))
    ));
    assert!(matches!(
        processor(SpeckleFilterType::Mean).filter_band(&raster, &["i_VV", "q_VV", "i_VV"]),
        Err(SarError::InvalidParameter(_))
    ));
}

#[test]
fn test_output_stays_in_band_unit() {
    init_logging();
    let db = Array2::from_elem((10, 10), -7.5);
    let output = processor(SpeckleFilterType::Mean)
        .filter_array(&db, BandUnit::IntensityDb, f64::NAN)
        .unwrap();
    for &v in output.iter() {
        assert_relative_eq!(v, -7.5, epsilon = 1e-9);
    }

    let amplitude = Array2::from_elem((10, 10), 4.0);
    for filter in [SpeckleFilterType::Frost, SpeckleFilterType::Idan, SpeckleFilterType::LeeSigma] {
        let output = processor(filter)
            .filter_array(&amplitude, BandUnit::Amplitude, 0.0)
            .unwrap();
        for &v in output.iter() {
            assert_relative_eq!(v, 4.0, epsilon = 1e-9);
        }
    }
}

#[test]
fn test_unsupported_unit_fails_the_band() {
    init_logging();
    let phase = Array2::from_elem((8, 8), 0.5);
    let result = processor(SpeckleFilterType::Frost).filter_array(&phase, BandUnit::Phase, 0.0);
    assert!(matches!(result, Err(SarError::UnsupportedUnit(_))));
}

#[test]
fn test_missing_band_is_reported() {
    init_logging();
    let raster = MemoryRaster::from_array("Amplitude_VH", Array2::from_elem((4, 4), 1.0), BandUnit::Amplitude, 0.0)
        .unwrap();
    let result = processor(SpeckleFilterType::Lee).filter_band(&raster, &["Amplitude_VV"]);
    assert!(matches!(result, Err(SarError::BandNotFound(_))));
}

#[test]
fn test_filters_expose_their_window() {
    let params = SpeckleFilterParams {
        filter_size_x: 5,
        filter_size_y: 7,
        ..SpeckleFilterParams::for_filter(SpeckleFilterType::Frost)
    };
    let processor = SpeckleFilterProcessor::new(params).unwrap();
    let filter: &dyn SpeckleFilter = processor.filter();
    assert_eq!(filter.half_window(), (2, 3));
    assert_eq!(processor.tiles(1000, 600).len(), 4);
}
