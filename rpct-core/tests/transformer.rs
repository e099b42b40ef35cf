use std::sync::Arc;

use approx::assert_abs_diff_eq;
use ndarray::Array2;
use rpct_core::options::{DebugSettings, RPC_DEM_MISSING_VALUE, RPC_MAX_ITERATIONS};
use rpct_core::{
    DemOpener, DemResampling, GeoTransform, ImageCoord, LlaCoord, MemoryRaster, ProjectionError,
    RpcCoefficients, RpcTransformer, TransformerOptions,
};

/// Mildly non-linear model around (10E, 45N), 100000 pixels per degree
fn curved_coeffs() -> RpcCoefficients {
    let mut coeffs = RpcCoefficients {
        lon_off: 10.0,
        lat_off: 45.0,
        lon_scale: 0.05,
        lat_scale: 0.05,
        height_off: 0.0,
        height_scale: 500.0,
        samp_off: 5000.0,
        samp_scale: 5000.0,
        line_off: 5000.0,
        line_scale: 5000.0,
        ..RpcCoefficients::default()
    };
    coeffs.samp_num_coeff[1] = 1.0;
    coeffs.samp_num_coeff[2] = 0.01;
    coeffs.samp_num_coeff[3] = 0.02;
    coeffs.samp_num_coeff[4] = 0.001;
    coeffs.samp_den_coeff[0] = 1.0;
    coeffs.samp_den_coeff[1] = 0.001;
    coeffs.line_num_coeff[1] = 0.02;
    coeffs.line_num_coeff[2] = -1.0;
    coeffs.line_num_coeff[3] = 0.03;
    coeffs.line_num_coeff[8] = 0.002;
    coeffs.line_den_coeff[0] = 1.0;
    coeffs.line_den_coeff[2] = 0.001;
    coeffs
}

fn identity_like() -> RpcCoefficients {
    let mut coeffs = RpcCoefficients::default();
    coeffs.line_num_coeff[1] = 1.0;
    coeffs.line_den_coeff[0] = 1.0;
    coeffs.samp_num_coeff[2] = 1.0;
    coeffs.samp_den_coeff[0] = 1.0;
    coeffs
}

/// Geographic DEM over [0, 75] x [0, 12.5] with 0.25 degree pixels
fn wavy_dem() -> MemoryRaster {
    let data = Array2::from_shape_fn((50, 300), |(r, c)| {
        100.0 + 10.0 * (c as f64 * 0.1).sin() + 2.0 * r as f64
    });
    MemoryRaster::new(data, GeoTransform::new([0.0, 0.25, 0.0, 12.5, 0.0, -0.25]))
}

/// Model over the wavy DEM, with a height term so the DEM matters
fn dem_coeffs() -> RpcCoefficients {
    let mut coeffs = RpcCoefficients {
        lon_off: 30.0,
        lat_off: 6.0,
        lon_scale: 10.0,
        lat_scale: 5.0,
        height_scale: 1000.0,
        samp_off: 10000.0,
        samp_scale: 10000.0,
        line_off: 5000.0,
        line_scale: 5000.0,
        ..RpcCoefficients::default()
    };
    coeffs.samp_num_coeff[1] = 1.0;
    coeffs.samp_num_coeff[3] = 0.01;
    coeffs.samp_den_coeff[0] = 1.0;
    coeffs.line_num_coeff[2] = -1.0;
    coeffs.line_num_coeff[3] = 0.01;
    coeffs.line_den_coeff[0] = 1.0;
    coeffs
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn dem_options(resampling: DemResampling) -> TransformerOptions {
    TransformerOptions {
        dem_path: Some("wavy.tif".to_string()),
        dem_resampling: resampling,
        ..TransformerOptions::default()
    }
}

fn dem_transformer(raster: &MemoryRaster, options: &TransformerOptions) -> RpcTransformer {
    let opener: Arc<dyn DemOpener> = Arc::new(raster.clone());
    RpcTransformer::new(dem_coeffs(), false, options, Some(opener)).unwrap()
}

#[test]
fn test_round_trip_without_dem() {
    let t = RpcTransformer::new(curved_coeffs(), false, &TransformerOptions::default(), None)
        .unwrap();

    let lons = [10.01, 9.97, 10.03, 10.0, 9.99];
    let lats = [44.98, 45.02, 45.01, 45.0, 44.97];
    let heights = [100.0, -20.0, 350.0, 0.0, 42.0];

    let mut xs = lons.to_vec();
    let mut ys = lats.to_vec();
    let mut zs = heights.to_vec();

    let forward = t.transform(true, &mut xs, &mut ys, Some(&mut zs)).unwrap();
    assert!(forward.all_succeeded());

    let inverse = t.transform(false, &mut xs, &mut ys, Some(&mut zs)).unwrap();
    assert!(inverse.all_succeeded());

    // 0.1 pixel is 1e-6 degree at this scale
    for i in 0..lons.len() {
        assert_abs_diff_eq!(xs[i], lons[i], epsilon = 1e-5);
        assert_abs_diff_eq!(ys[i], lats[i], epsilon = 1e-5);
    }
}

#[test]
fn test_forward_is_idempotent() {
    let t = RpcTransformer::new(curved_coeffs(), false, &TransformerOptions::default(), None)
        .unwrap();

    let a = t.geo_to_image(10.02, 44.99, 123.0).unwrap();
    let b = t.geo_to_image(10.02, 44.99, 123.0).unwrap();
    assert_eq!(a.pixel.to_bits(), b.pixel.to_bits());
    assert_eq!(a.line.to_bits(), b.line.to_bits());
}

#[test]
fn test_identity_like_scenario() {
    let t = RpcTransformer::new(identity_like(), false, &TransformerOptions::default(), None)
        .unwrap();

    let image = t.geo_to_image(0.3, 0.2, 0.0).unwrap();
    assert_abs_diff_eq!(image.pixel, 0.7, epsilon = 1e-12);
    assert_abs_diff_eq!(image.line, 0.8, epsilon = 1e-12);

    let ground = t.image_to_geo(0.7, 0.8, 0.0).unwrap();
    assert_abs_diff_eq!(ground.lon, 0.3, epsilon = 1e-9);
    assert_abs_diff_eq!(ground.lat, 0.2, epsilon = 1e-9);
}

#[test]
fn test_dateline_longitudes_wrap() {
    let mut coeffs = curved_coeffs();
    coeffs.lon_off = 179.5;
    coeffs.lon_scale = 1.0;
    let t = RpcTransformer::new(coeffs, false, &TransformerOptions::default(), None).unwrap();

    let west = t.geo_to_image(-179.9, 45.0, 0.0).unwrap();
    let east = t.geo_to_image(180.1, 45.0, 0.0).unwrap();
    assert_abs_diff_eq!(west.pixel, east.pixel, epsilon = 1e-6);
    assert_abs_diff_eq!(west.line, east.line, epsilon = 1e-6);
}

#[test]
fn test_missing_value_outside_dem() {
    let raster = wavy_dem();
    let options = TransformerOptions::from_pairs([
        ("RPC_DEM", "wavy.tif"),
        (RPC_DEM_MISSING_VALUE, "7"),
    ])
    .unwrap();
    let t = dem_transformer(&raster, &options);
    assert_eq!(t.height_at(-40.0, 6.0).unwrap(), 7.0);

    let t = dem_transformer(&raster, &dem_options(DemResampling::Bilinear));
    assert_eq!(
        t.height_at(-40.0, 6.0),
        Err(ProjectionError::ElevationUnavailable {
            lon: -40.0,
            lat: 6.0
        })
    );
}

#[test]
fn test_whole_line_matches_single_points() {
    for resampling in [
        DemResampling::Nearest,
        DemResampling::Bilinear,
        DemResampling::Cubic,
    ] {
        let raster = wavy_dem();
        let t = dem_transformer(&raster, &dem_options(resampling));

        let lat = 6.3;
        let mut xs: Vec<f64> = (0..25).map(|i| 2.6 + 2.7 * i as f64).collect();
        let mut ys = vec![lat; xs.len()];
        let mut zs: Vec<f64> = (0..25).map(|i| (i % 4) as f64 * 15.0).collect();
        let lons = xs.clone();
        let heights = zs.clone();

        let reads_before = raster.read_count();
        let outcome = t.transform(true, &mut xs, &mut ys, Some(&mut zs)).unwrap();
        assert!(outcome.all_succeeded());
        assert_eq!(raster.read_count() - reads_before, 1, "{}", resampling);

        for i in 0..lons.len() {
            let single = t.geo_to_image(lons[i], lat, heights[i]).unwrap();
            assert_eq!(xs[i].to_bits(), single.pixel.to_bits(), "{} point {}", resampling, i);
            assert_eq!(ys[i].to_bits(), single.line.to_bits(), "{} point {}", resampling, i);
        }
    }
}

#[test]
fn test_whole_line_can_be_disabled() {
    let raster = wavy_dem();
    let mut options = dem_options(DemResampling::Bilinear);
    options.debug = DebugSettings {
        dem_optim: false,
        ..DebugSettings::default()
    };
    let t = dem_transformer(&raster, &options);

    let mut xs: Vec<f64> = (0..25).map(|i| 2.6 + 2.7 * i as f64).collect();
    let mut ys = vec![6.3; xs.len()];

    let reads_before = raster.read_count();
    let outcome = t.transform(true, &mut xs, &mut ys, None).unwrap();
    assert!(outcome.all_succeeded());
    // One read per 64x64 block touched
    assert!(raster.read_count() - reads_before > 1);
}

#[test]
fn test_footprint_gates_both_directions() {
    let options = TransformerOptions {
        footprint: Some("POLYGON((9.9 44.9,10.1 44.9,10.1 45.1,9.9 45.1,9.9 44.9))".to_string()),
        ..TransformerOptions::default()
    };
    let t = RpcTransformer::new(curved_coeffs(), false, &options, None).unwrap();

    let mut xs = vec![10.0, 10.2, 10.05];
    let mut ys = vec![45.0, 45.0, 44.95];
    let outcome = t.transform(true, &mut xs, &mut ys, None).unwrap();

    assert_eq!(outcome.success_flags(), vec![true, false, true]);
    assert!(matches!(
        outcome.error(1),
        Some(ProjectionError::FootprintViolation { .. })
    ));
    assert!(xs[1].is_infinite() && ys[1].is_infinite());
    assert!(xs[0].is_finite() && xs[2].is_finite());

    // Image point of a ground point outside the polygon
    let plain = RpcTransformer::new(curved_coeffs(), false, &TransformerOptions::default(), None)
        .unwrap();
    let outside = plain.geo_to_image(10.2, 45.0, 0.0).unwrap();
    assert!(matches!(
        t.image_to_geo(outside.pixel, outside.line, 0.0),
        Err(ProjectionError::FootprintViolation { .. })
    ));
}

#[test]
fn test_geojson_footprint_on_whole_line_path() {
    let raster = wavy_dem();
    let mut options = dem_options(DemResampling::Bilinear);
    options.footprint = Some(
        r#"{"type":"Polygon","coordinates":[[[0,0],[40,0],[40,12],[0,12],[0,0]]]}"#.to_string(),
    );
    let t = dem_transformer(&raster, &options);

    let mut xs: Vec<f64> = (0..20).map(|i| 5.0 + 3.0 * i as f64).collect();
    let mut ys = vec![6.3; xs.len()];
    let lons = xs.clone();

    let outcome = t.transform(true, &mut xs, &mut ys, None).unwrap();
    for (i, lon) in lons.iter().enumerate() {
        assert_eq!(outcome.succeeded(i), *lon < 40.0, "lon {}", lon);
    }
    assert!(!outcome.all_succeeded());
    assert_eq!(outcome.failures().count(), lons.iter().filter(|&&l| l >= 40.0).count());
}

#[test]
fn test_inverse_respects_iteration_cap() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("inverse.csv");

    let mut options = TransformerOptions::from_pairs([(RPC_MAX_ITERATIONS, "2")]).unwrap();
    options.pixel_error_threshold = 1e-9;
    options.debug.inverse_log = Some(path.clone());
    options.debug.inverse_verbose = true;
    let t = RpcTransformer::new(curved_coeffs(), false, &options, None).unwrap();

    let target = t.geo_to_image(10.03, 44.97, 0.0).unwrap();
    let result = t.solve_inverse(target.pixel, target.line, 0.0);
    assert!(matches!(
        result,
        Err(ProjectionError::ConvergenceFailed { iterations: 2, .. })
    ));

    // Header plus one row per polynomial evaluation
    let contents = std::fs::read_to_string(&path).unwrap();
    assert_eq!(contents.lines().count(), 3);
    assert!(path.with_extension("csvt").exists());

    let relaxed = RpcTransformer::new(curved_coeffs(), false, &TransformerOptions::default(), None)
        .unwrap();
    let solution = relaxed.solve_inverse(target.pixel, target.line, 0.0).unwrap();
    assert!(solution.iterations <= relaxed.max_iterations());
}

#[test]
fn test_inverse_over_dem() {
    init_logging();
    let raster = wavy_dem();
    let t = dem_transformer(&raster, &dem_options(DemResampling::Bilinear));
    assert_eq!(t.max_iterations(), 20);

    for (lon, lat) in [(25.3, 5.1), (33.7, 7.9), (30.0, 6.0)] {
        let image = t.geo_to_image(lon, lat, 5.0).unwrap();
        let ground = t.image_to_geo(image.pixel, image.line, 5.0).unwrap();
        // 0.1 pixel is 1e-4 degree here
        assert_abs_diff_eq!(ground.lon, lon, epsilon = 2e-4);
        assert_abs_diff_eq!(ground.lat, lat, epsilon = 2e-4);
        assert_eq!(ground.alt, 5.0);
    }
}

#[test]
fn test_create_similar_halves_image() {
    let raster = wavy_dem();
    let mut options = dem_options(DemResampling::Cubic);
    options.pixel_error_threshold = 0.05;
    options.footprint = Some("POLYGON((20 2,40 2,40 10,20 10,20 2))".to_string());
    let t = dem_transformer(&raster, &options);

    let half = t.create_similar(2.0, 2.0).unwrap();
    assert_eq!(half.options(), t.options());
    assert!(half.elevation().is_some());
    assert!(half.footprint().is_some());

    let full = t.geo_to_image(31.0, 6.5, 0.0).unwrap();
    let reduced = half.geo_to_image(31.0, 6.5, 0.0).unwrap();
    assert_abs_diff_eq!(reduced.pixel, (full.pixel - 0.5) / 2.0 + 0.5, epsilon = 1e-6);
    assert_abs_diff_eq!(reduced.line, (full.line - 0.5) / 2.0 + 0.5, epsilon = 1e-6);
}

#[test]
fn test_xml_round_trip_preserves_behaviour() {
    let raster = wavy_dem();
    let opener: Arc<dyn DemOpener> = Arc::new(raster.clone());
    let mut options = dem_options(DemResampling::Cubic);
    options.height_offset = 3.0;
    options.footprint = Some("POLYGON((20 2,40 2,40 10,20 10,20 2))".to_string());
    let t = RpcTransformer::new(dem_coeffs(), true, &options, Some(opener.clone())).unwrap();

    let xml = t.to_xml().unwrap();
    let back = RpcTransformer::from_xml(&xml, Some(opener)).unwrap();

    assert!(back.is_reversed());
    assert_eq!(back.coefficients(), t.coefficients());
    let points = [
        LlaCoord {
            lon: 27.0,
            lat: 4.0,
            alt: 0.0,
        },
        LlaCoord {
            lon: 45.0,
            lat: 4.0,
            alt: 0.0,
        },
    ];
    for point in points {
        assert_eq!(
            back.geo_to_image(point.lon, point.lat, point.alt),
            t.geo_to_image(point.lon, point.lat, point.alt)
        );
    }
}

#[test]
fn test_point_helpers_report_per_point() {
    let options = TransformerOptions {
        footprint: Some("POLYGON((9.9 44.9,10.1 44.9,10.1 45.1,9.9 45.1,9.9 44.9))".to_string()),
        ..TransformerOptions::default()
    };
    let t = RpcTransformer::new(curved_coeffs(), false, &options, None).unwrap();

    let images = t.geo_to_image_points(&[
        LlaCoord {
            lon: 10.0,
            lat: 45.0,
            alt: 0.0,
        },
        LlaCoord {
            lon: 11.0,
            lat: 45.0,
            alt: 0.0,
        },
    ]);
    assert!(images[0].is_ok());
    assert!(images[1].is_err());

    let image: ImageCoord = *images[0].as_ref().unwrap();
    let grounds = t.image_to_geo_points(&[(image, 0.0)]);
    let ground = grounds[0].as_ref().unwrap();
    assert_abs_diff_eq!(ground.lon, 10.0, epsilon = 1e-5);
    assert_abs_diff_eq!(ground.lat, 45.0, epsilon = 1e-5);
}
