use std::collections::BTreeMap;
use std::path::Path;

use era5_common::{DataVariable, Dataset, Dimension, Era5Error, Era5Result, HoursSinceUnits};
use ndarray::{ArrayD, IxDyn};
use tracing::{debug, instrument};

use crate::{nc_error, silence_hdf5_errors, UNITS};

/// Load a dataset previously written by [`crate::write_dataset`] (or any
/// CF file using the same dimension names and hourly time units).
#[instrument(fields(path = %path.display()))]
pub fn read_dataset(path: &Path) -> Era5Result<Dataset> {
    silence_hdf5_errors();

    if !path.exists() {
        return Err(Era5Error::filesystem(
            path,
            std::io::Error::new(std::io::ErrorKind::NotFound, "netCDF file does not exist"),
        ));
    }

    let file = netcdf::open(path).map_err(nc_error(path, "open"))?;

    let time_var = file
        .variable(Dimension::Time.name())
        .ok_or_else(|| Era5Error::format(format!("{} has no time variable", path.display())))?;
    let units = string_attr(&time_var, UNITS)
        .ok_or_else(|| Era5Error::format(format!("{} time has no units", path.display())))?;
    let units = HoursSinceUnits::parse(&units)?;
    let time = read_hours(&time_var, path)?
        .into_iter()
        .map(|h| units.to_datetime(h))
        .collect();

    let level = match file.variable(Dimension::Level.name()) {
        Some(var) => Some(read_f64(&var, path)?),
        None => None,
    };
    let latitude = read_coordinate(&file, Dimension::Latitude, path)?;
    let longitude = read_coordinate(&file, Dimension::Longitude, path)?;

    let mut variables = BTreeMap::new();
    for var in file.variables() {
        let name = var.name();
        if Dimension::from_name(&name).is_some() {
            continue;
        }

        let dims: Option<Vec<Dimension>> = var
            .dimensions()
            .iter()
            .map(|d| Dimension::from_name(&d.name()))
            .collect();
        let Some(dims) = dims else {
            debug!(variable = %name, "Skipping variable with unknown dimensions");
            continue;
        };
        let shape: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();

        let values = read_f32(&var, path)?;
        let data = ArrayD::from_shape_vec(IxDyn(&shape), values).map_err(|e| {
            Era5Error::format(format!("variable {} in {}: {}", name, path.display(), e))
        })?;

        let mut variable = DataVariable::new(dims, data);
        variable.attributes = string_attrs(var.attributes());
        variables.insert(name, variable);
    }

    let dataset = Dataset {
        time,
        level,
        latitude,
        longitude,
        variables,
        attributes: string_attrs(file.attributes()),
    };
    dataset.check_consistency()?;

    debug!(
        variables = dataset.variables.len(),
        times = dataset.time.len(),
        "Read dataset"
    );
    Ok(dataset)
}

fn read_coordinate(file: &netcdf::File, dim: Dimension, path: &Path) -> Era5Result<Vec<f64>> {
    let var = file.variable(dim.name()).ok_or_else(|| {
        Era5Error::format(format!("{} has no {} variable", path.display(), dim))
    })?;
    read_f64(&var, path)
}

fn read_hours(var: &netcdf::Variable, path: &Path) -> Era5Result<Vec<i64>> {
    if let Ok(values) = var.get_values::<i64, _>(..) {
        return Ok(values);
    }
    let values = read_f64(var, path)?;
    Ok(values.into_iter().map(|h| h.round() as i64).collect())
}

fn read_f64(var: &netcdf::Variable, path: &Path) -> Era5Result<Vec<f64>> {
    if let Ok(values) = var.get_values::<f64, _>(..) {
        return Ok(values);
    }
    var.get_values::<f32, _>(..)
        .map(|v| v.into_iter().map(f64::from).collect())
        .map_err(nc_error(path, "read"))
}

fn read_f32(var: &netcdf::Variable, path: &Path) -> Era5Result<Vec<f32>> {
    if let Ok(values) = var.get_values::<f32, _>(..) {
        return Ok(values);
    }
    var.get_values::<f64, _>(..)
        .map(|v| v.into_iter().map(|x| x as f32).collect())
        .map_err(nc_error(path, "read"))
}

fn string_attr(var: &netcdf::Variable, name: &str) -> Option<String> {
    // Check first: a missing attribute would otherwise go through libhdf5's
    // error path.
    if !var.attributes().any(|attr| attr.name() == name) {
        return None;
    }
    match var.attribute_value(name)?.ok()? {
        netcdf::AttributeValue::Str(s) => Some(s),
        _ => None,
    }
}

fn string_attrs<'a>(attrs: impl Iterator<Item = netcdf::Attribute<'a>>) -> BTreeMap<String, String> {
    attrs
        .filter_map(|attr| match attr.value().ok()? {
            netcdf::AttributeValue::Str(s) => Some((attr.name().to_string(), s)),
            _ => None,
        })
        .collect()
}
