//! Converter outputs written to disk and inspected.

use std::fs::File;

use era5_export::{to_array, to_geotiff, to_netcdf};
use era5_subset::{Era5Client, Era5Config, QueryRequest};
use test_utils::{assert_slice_approx_eq, sample_dataset, synthetic_value, utc, SyntheticSource};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;

#[test]
fn test_single_step_download_to_geotiff() {
    let dir = tempfile::tempdir().unwrap();
    let client = Era5Client::new(
        SyntheticSource::new(),
        Era5Config::with_data_dir(dir.path().join("state")),
    )
    .unwrap();

    let t = utc(2023, 1, 1, 0);
    let subset = client
        .download(&QueryRequest::new(["temperature"], t, t))
        .unwrap();
    assert_eq!(subset.time.len(), 1);
    assert_eq!(subset.variables.len(), 1);

    let path = dir.path().join("temperature.tif");
    to_geotiff(&subset, "temperature", Some(500.0), t, &path).unwrap();

    let mut decoder = Decoder::new(File::open(&path).unwrap()).unwrap();
    let (width, height) = decoder.dimensions().unwrap();
    assert_eq!(height as usize, subset.latitude.len());
    assert_eq!(width as usize, subset.longitude.len());

    let scale = decoder.get_tag_f64_vec(Tag::Unknown(33550)).unwrap();
    assert_slice_approx_eq!(&scale, &[90.0, 45.0, 0.0], 1e-9);
    let tiepoint = decoder.get_tag_f64_vec(Tag::Unknown(33922)).unwrap();
    assert_slice_approx_eq!(&tiepoint, &[0.0, 0.0, 0.0, -225.0, 112.5, 0.0], 1e-9);
    assert_eq!(
        decoder.get_tag_ascii_string(Tag::Unknown(42113)).unwrap(),
        "nan"
    );

    let DecodingResult::F32(pixels) = decoder.read_image().unwrap() else {
        panic!("expected a float32 raster");
    };
    assert_eq!(pixels.len(), (width * height) as usize);
    // First pixel is latitude 90, longitude 180 (rewrapped to -180), level 500.
    assert_eq!(pixels[0], synthetic_value(0, &[0, 1, 0, 2]));
}

#[test]
fn test_geotiff_rejects_bad_extension_and_tiny_grids() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = sample_dataset(&[0.0, 90.0, 180.0, 270.0]);
    let t = utc(2023, 1, 1, 0);

    let err = to_geotiff(&dataset, "2m_temperature", None, t, &dir.path().join("out.png")).unwrap_err();
    assert!(err.is_validation());

    let narrow = sample_dataset(&[0.0]);
    let err = to_geotiff(&narrow, "2m_temperature", None, t, &dir.path().join("out.tif")).unwrap_err();
    assert!(err.is_validation());
}

#[test]
fn test_to_array_rewraps() {
    let dataset = sample_dataset(&[0.0, 90.0, 180.0, 270.0]);
    let array = to_array(&dataset, "temperature", Some(500.0), utc(2023, 1, 1, 0)).unwrap();

    assert_eq!(array.dim(), (3, 4));
    assert_eq!(array[[0, 0]], synthetic_value(0, &[0, 0, 0, 2]));
    assert_eq!(array[[0, 3]], synthetic_value(0, &[0, 0, 0, 1]));
}

#[test]
fn test_to_netcdf_checks_extension_and_writes() {
    let dir = tempfile::tempdir().unwrap();
    let dataset = sample_dataset(&[0.0, 90.0]);

    assert!(to_netcdf(&dataset, &dir.path().join("subset.txt")).is_err());

    let path = dir.path().join("subset.NC");
    to_netcdf(&dataset, &path).unwrap();
    let loaded = era5_netcdf::read_dataset(&path).unwrap();
    assert_eq!(loaded.variable_names(), dataset.variable_names());
}
