use std::path::Path;

use era5_common::time::is_hour_aligned;
use era5_common::{Dataset, Dimension, Era5Error, Era5Result, HoursSinceUnits};
use tracing::{debug, instrument};

use crate::{nc_error, silence_hdf5_errors, UNITS};

/// Time units written to every file.
pub(crate) const TIME_UNITS: &str = "hours since 1900-01-01 00:00:00";

/// Write a dataset to a new netCDF-4 file, replacing any file at `path`.
#[instrument(skip(dataset), fields(path = %path.display(), variables = dataset.variables.len()))]
pub fn write_dataset(path: &Path, dataset: &Dataset) -> Era5Result<()> {
    silence_hdf5_errors();
    dataset.check_consistency()?;

    let units = HoursSinceUnits::parse(TIME_UNITS)?;
    let hours = dataset
        .time
        .iter()
        .map(|t| {
            if is_hour_aligned(t) {
                Ok(units.to_hours(t))
            } else {
                Err(Era5Error::format(format!(
                    "time {} is not on an hour boundary and cannot be stored as {}",
                    t.to_rfc3339(),
                    TIME_UNITS
                )))
            }
        })
        .collect::<Era5Result<Vec<i64>>>()?;

    let mut file = netcdf::create(path).map_err(nc_error(path, "create"))?;

    for (name, value) in &dataset.attributes {
        file.add_attribute(name, value.as_str())
            .map_err(nc_error(path, "write attribute"))?;
    }

    file.add_dimension(Dimension::Time.name(), hours.len())
        .map_err(nc_error(path, "add dimension"))?;
    {
        let mut var = file
            .add_variable::<i64>(Dimension::Time.name(), &[Dimension::Time.name()])
            .map_err(nc_error(path, "add variable"))?;
        var.put_attribute(UNITS, TIME_UNITS)
            .map_err(nc_error(path, "write attribute"))?;
        var.put_attribute("calendar", "proleptic_gregorian")
            .map_err(nc_error(path, "write attribute"))?;
        var.put_values(&hours, ..)
            .map_err(nc_error(path, "write time"))?;
    }

    let mut coordinates = vec![
        (Dimension::Latitude, dataset.latitude.as_slice(), "degrees_north"),
        (Dimension::Longitude, dataset.longitude.as_slice(), "degrees_east"),
    ];
    if let Some(levels) = &dataset.level {
        coordinates.insert(0, (Dimension::Level, levels.as_slice(), "millibars"));
    }

    for (dim, values, unit) in coordinates {
        file.add_dimension(dim.name(), values.len())
            .map_err(nc_error(path, "add dimension"))?;
        let mut var = file
            .add_variable::<f64>(dim.name(), &[dim.name()])
            .map_err(nc_error(path, "add variable"))?;
        var.put_attribute(UNITS, unit)
            .map_err(nc_error(path, "write attribute"))?;
        var.put_values(values, ..)
            .map_err(nc_error(path, "write coordinate"))?;
    }

    for (name, variable) in &dataset.variables {
        let dim_names: Vec<&str> = variable.dims.iter().map(|d| d.name()).collect();
        let mut var = file
            .add_variable::<f32>(name, &dim_names)
            .map_err(nc_error(path, "add variable"))?;
        for (key, value) in &variable.attributes {
            var.put_attribute(key, value.as_str())
                .map_err(nc_error(path, "write attribute"))?;
        }

        let contiguous = variable.data.as_standard_layout();
        let values = contiguous
            .as_slice()
            .ok_or_else(|| Era5Error::format(format!("variable {} is not contiguous", name)))?;
        var.put_values(values, ..)
            .map_err(nc_error(path, "write data"))?;

        debug!(variable = %name, shape = ?variable.data.shape(), "Wrote variable");
    }

    Ok(())
}
