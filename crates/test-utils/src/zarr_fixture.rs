//! Writes a small Zarr v2 hierarchy shaped like the ARCO ERA5 store.
//!
//! Layout mirrors the real store: consolidated `.zmetadata`, a root
//! `.zattrs` carrying `valid_time_start`/`valid_time_stop`, 1-D coordinate
//! arrays and data variables with `_ARRAY_DIMENSIONS`. Every array is a
//! single uncompressed chunk.

use std::fs;
use std::io;
use std::path::Path;

use chrono::{TimeZone, Utc};
use era5_common::DomainIndex;
use ndarray::{ArrayD, IxDyn};
use serde_json::{json, Map, Value};

use crate::generators::{synthetic_value, variable_code};

const TIME_UNITS: &str = "hours since 1900-01-01";

/// Write `domain` (with synthetic variable values) as a Zarr v2 store.
pub fn write_zarr_v2_store(root: &Path, domain: &DomainIndex) -> io::Result<()> {
    fs::create_dir_all(root)?;
    let mut consolidated = Map::new();

    let root_attrs = json!({
        "valid_time_start": domain.valid_time_start.format("%Y-%m-%d").to_string(),
        "valid_time_stop": domain.valid_time_stop.format("%Y-%m-%d").to_string(),
    });
    write_json(&root.join(".zgroup"), &json!({"zarr_format": 2}))?;
    write_json(&root.join(".zattrs"), &root_attrs)?;
    consolidated.insert(".zgroup".to_string(), json!({"zarr_format": 2}));
    consolidated.insert(".zattrs".to_string(), root_attrs);

    let epoch = Utc.with_ymd_and_hms(1900, 1, 1, 0, 0, 0).unwrap();
    let first_hour = (domain.time_origin - epoch).num_hours();
    let time: Vec<i64> = (0..domain.time_len as i64)
        .map(|i| first_hour + i * domain.time_step_hours)
        .collect();
    let time_bytes: Vec<u8> = time.iter().flat_map(|v| v.to_le_bytes()).collect();
    write_array(
        root,
        &mut consolidated,
        "time",
        &[time.len()],
        "<i8",
        json!(0),
        json!({"_ARRAY_DIMENSIONS": ["time"], "units": TIME_UNITS, "calendar": "proleptic_gregorian"}),
        &time_bytes,
    )?;

    let levels: Vec<u8> = domain
        .levels
        .iter()
        .flat_map(|v| (*v as i64).to_le_bytes())
        .collect();
    write_array(
        root,
        &mut consolidated,
        "level",
        &[domain.levels.len()],
        "<i8",
        json!(0),
        json!({"_ARRAY_DIMENSIONS": ["level"], "units": "millibars"}),
        &levels,
    )?;

    let latitude: Vec<u8> = domain
        .latitude
        .iter()
        .flat_map(|v| (*v as f32).to_le_bytes())
        .collect();
    write_array(
        root,
        &mut consolidated,
        "latitude",
        &[domain.latitude.len()],
        "<f4",
        json!("NaN"),
        json!({"_ARRAY_DIMENSIONS": ["latitude"], "units": "degrees_north"}),
        &latitude,
    )?;

    let longitude: Vec<u8> = domain.longitude.iter().flat_map(|v| v.to_le_bytes()).collect();
    write_array(
        root,
        &mut consolidated,
        "longitude",
        &[domain.longitude.len()],
        "<f8",
        json!("NaN"),
        json!({"_ARRAY_DIMENSIONS": ["longitude"], "units": "degrees_east"}),
        &longitude,
    )?;

    for (name, dims) in &domain.variables {
        let shape: Vec<usize> = dims
            .iter()
            .map(|d| match d {
                era5_common::Dimension::Time => domain.time_len as usize,
                era5_common::Dimension::Level => domain.levels.len(),
                era5_common::Dimension::Latitude => domain.latitude.len(),
                era5_common::Dimension::Longitude => domain.longitude.len(),
            })
            .collect();

        let code = variable_code(name);
        let values = ArrayD::from_shape_fn(IxDyn(&shape), |idx| {
            let indices: Vec<usize> = (0..shape.len()).map(|axis| idx[axis]).collect();
            synthetic_value(code, &indices)
        });
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        let dim_names: Vec<&str> = dims.iter().map(|d| d.name()).collect();

        write_array(
            root,
            &mut consolidated,
            name,
            &shape,
            "<f4",
            json!("NaN"),
            json!({"_ARRAY_DIMENSIONS": dim_names, "units": "K"}),
            &bytes,
        )?;
    }

    write_json(
        &root.join(".zmetadata"),
        &json!({"metadata": consolidated, "zarr_consolidated_format": 1}),
    )
}

#[allow(clippy::too_many_arguments)]
fn write_array(
    root: &Path,
    consolidated: &mut Map<String, Value>,
    name: &str,
    shape: &[usize],
    dtype: &str,
    fill_value: Value,
    attrs: Value,
    bytes: &[u8],
) -> io::Result<()> {
    let dir = root.join(name);
    fs::create_dir_all(&dir)?;

    let zarray = json!({
        "zarr_format": 2,
        "shape": shape,
        "chunks": shape,
        "dtype": dtype,
        "compressor": null,
        "fill_value": fill_value,
        "filters": null,
        "order": "C",
        "dimension_separator": ".",
    });
    write_json(&dir.join(".zarray"), &zarray)?;
    write_json(&dir.join(".zattrs"), &attrs)?;

    let chunk_key = vec!["0"; shape.len()].join(".");
    fs::write(dir.join(chunk_key), bytes)?;

    consolidated.insert(format!("{}/.zarray", name), zarray);
    consolidated.insert(format!("{}/.zattrs", name), attrs);
    Ok(())
}

fn write_json(path: &Path, value: &Value) -> io::Result<()> {
    let text = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
    fs::write(path, text)
}
