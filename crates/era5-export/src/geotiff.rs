//! Single-band float32 GeoTIFF output.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use era5_common::{Dataset, Era5Error, Era5Result, TimeInput};
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;
use tracing::{debug, instrument};

use crate::select::{rotate_longitudes, select_grid, Grid2D};
use crate::check_extension;

// GeoTIFF tags not named by the tiff crate.
const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

/// GeoKeyDirectory: version 1.1.0 with three keys, GTModelType =
/// geographic, GTRasterType = PixelIsArea, GeographicType = EPSG:4326.
const GEO_KEYS: [u16; 16] = [
    1, 1, 0, 3, //
    1024, 0, 1, 2, //
    1025, 0, 1, 1, //
    2048, 0, 1, 4326,
];

/// North-up affine georeference of a raster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    /// Longitude of the west edge of the first column.
    pub west: f64,
    /// Latitude of the north edge of the first row.
    pub north: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// Transform for cell-centred coordinates, from the first two samples
    /// of each axis. Spacing is assumed uniform.
    pub fn from_centers(latitude: &[f64], longitude: &[f64]) -> Era5Result<Self> {
        let (lat0, lat1, lon0, lon1) = match (latitude, longitude) {
            ([lat0, lat1, ..], [lon0, lon1, ..]) => (*lat0, *lat1, *lon0, *lon1),
            _ => {
                return Err(Era5Error::validation(
                    "grid",
                    format!("{} x {}", latitude.len(), longitude.len()),
                    "at least 2 latitudes and 2 longitudes to derive a cell size",
                ))
            }
        };

        let pixel_height = (lat1 - lat0).abs();
        let pixel_width = (lon1 - lon0).abs();
        Ok(Self {
            west: lon0 - pixel_width / 2.0,
            north: lat0 + pixel_height / 2.0,
            pixel_width,
            pixel_height,
        })
    }
}

/// Write one variable/level/time of `dataset` as a GeoTIFF in -180..180.
#[instrument(skip(dataset, time), fields(path = %path.display()))]
pub fn to_geotiff(
    dataset: &Dataset,
    variable: &str,
    level: Option<f64>,
    time: impl Into<TimeInput>,
    path: &Path,
) -> Era5Result<()> {
    check_extension(path, &["tif", "tiff"])?;

    let grid = select_grid(dataset, variable, level, time)?;
    // Cell size comes from the grid as stored, before the rewrap.
    let size = GeoTransform::from_centers(&grid.latitude, &grid.longitude)?;
    let grid = rotate_longitudes(grid);
    let transform = GeoTransform {
        west: grid.longitude[0] - size.pixel_width / 2.0,
        ..size
    };

    write_geotiff(path, &grid, &transform)
}

/// Encode `grid` with `transform` to `path`.
pub fn write_geotiff(path: &Path, grid: &Grid2D, transform: &GeoTransform) -> Era5Result<()> {
    let (height, width) = grid.data.dim();
    let tiff_err = |e: tiff::TiffError| {
        Era5Error::format(format!("failed to encode GeoTIFF {}: {}", path.display(), e))
    };

    let file = File::create(path).map_err(|e| Era5Error::filesystem(path, e))?;
    let mut encoder = TiffEncoder::new(BufWriter::new(file)).map_err(tiff_err)?;
    let mut image = encoder
        .new_image::<colortype::Gray32Float>(width as u32, height as u32)
        .map_err(tiff_err)?;

    let directory = image.encoder();
    directory
        .write_tag(
            Tag::Unknown(MODEL_PIXEL_SCALE),
            &[transform.pixel_width, transform.pixel_height, 0.0][..],
        )
        .map_err(tiff_err)?;
    directory
        .write_tag(
            Tag::Unknown(MODEL_TIEPOINT),
            &[0.0, 0.0, 0.0, transform.west, transform.north, 0.0][..],
        )
        .map_err(tiff_err)?;
    directory
        .write_tag(Tag::Unknown(GEO_KEY_DIRECTORY), &GEO_KEYS[..])
        .map_err(tiff_err)?;
    directory
        .write_tag(Tag::Unknown(GDAL_NODATA), "nan")
        .map_err(tiff_err)?;

    let contiguous = grid.data.as_standard_layout();
    let pixels = contiguous
        .as_slice()
        .ok_or_else(|| Era5Error::format("raster data is not contiguous"))?;
    image.write_data(pixels).map_err(tiff_err)?;

    debug!(width, height, west = transform.west, north = transform.north, "Wrote GeoTIFF");
    Ok(())
}
