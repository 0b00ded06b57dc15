//! Output formats for materialized ERA5 subsets.
//!
//! - [`to_netcdf`]: the whole subset as a netCDF file
//! - [`to_geotiff`]: one variable/level/time as a georeferenced raster
//! - [`to_array`]: the same selection as a plain 2-D array
//!
//! The raster and array outputs are rewrapped from 0..360 to -180..180
//! longitudes (see [`rotate_longitudes`]).

pub mod geotiff;
pub mod select;

use std::path::Path;

use era5_common::{Dataset, Era5Error, Era5Result, TimeInput};
use ndarray::Array2;

pub use geotiff::{to_geotiff, write_geotiff, GeoTransform};
pub use select::{rotate_longitudes, select_grid, Grid2D};

/// Write the whole subset to a `.nc` file.
pub fn to_netcdf(dataset: &Dataset, path: &Path) -> Era5Result<()> {
    check_extension(path, &["nc"])?;
    era5_netcdf::write_dataset(path, dataset)
}

/// One variable/level/time of `dataset` as a (latitude, longitude) array
/// in the -180..180 frame.
pub fn to_array(
    dataset: &Dataset,
    variable: &str,
    level: Option<f64>,
    time: impl Into<TimeInput>,
) -> Era5Result<Array2<f32>> {
    let grid = select_grid(dataset, variable, level, time)?;
    Ok(rotate_longitudes(grid).data)
}

/// Fail unless `path` ends in one of `extensions` (case-insensitive).
pub(crate) fn check_extension(path: &Path, extensions: &[&str]) -> Era5Result<()> {
    let matches = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| ext.eq_ignore_ascii_case(e)));

    if matches {
        Ok(())
    } else {
        let expected: Vec<String> = extensions.iter().map(|e| format!(".{}", e)).collect();
        Err(Era5Error::validation(
            "path",
            path.display(),
            format!("a file ending in {}", expected.join(" or ")),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_extension() {
        assert!(check_extension(Path::new("out.nc"), &["nc"]).is_ok());
        assert!(check_extension(Path::new("OUT.TIFF"), &["tif", "tiff"]).is_ok());
        assert!(check_extension(Path::new("out.nc4"), &["nc"]).is_err());
        assert!(check_extension(Path::new("out"), &["tif", "tiff"]).is_err());
    }
}
