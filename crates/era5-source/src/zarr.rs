//! ERA5 source implementation over a Zarr v2 hierarchy.

use std::collections::{BTreeMap, HashMap};
use std::ops::Range;
use std::sync::{Arc, Mutex};

use ndarray::{ArrayD, IxDyn};
use serde_json::{Map, Value};
use tracing::{debug, instrument};
use zarrs::array::{Array, DataType};
use zarrs::array_subset::ArraySubset;
use zarrs::storage::{ReadableStorageTraits, StoreKey};

use era5_common::time::parse_date_attr;
use era5_common::{
    Dimension, DomainIndex, Era5Error, Era5Result, Era5Source, HoursSinceUnits, SourceAttributes,
};

/// Reads ERA5 metadata and data from any readable Zarr storage.
///
/// The remote store is used through [`crate::open_remote`]; tests point the
/// same reader at a local filesystem store.
pub struct ZarrEra5Source<S: ?Sized + ReadableStorageTraits + 'static> {
    storage: Arc<S>,
    /// Human readable location (for logs and errors).
    location: String,
    /// Opened data variable arrays, keyed by name.
    arrays: Mutex<HashMap<String, Arc<Array<S>>>>,
}

impl<S: ?Sized + ReadableStorageTraits + 'static> ZarrEra5Source<S> {
    pub fn new(storage: Arc<S>, location: impl Into<String>) -> Self {
        Self {
            storage,
            location: location.into(),
            arrays: Mutex::new(HashMap::new()),
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Read and parse a JSON document at the given store key.
    fn read_json(&self, key: &str) -> Era5Result<Map<String, Value>> {
        let store_key = StoreKey::new(key)
            .map_err(|e| Era5Error::format(format!("invalid store key {}: {}", key, e)))?;

        let bytes = self
            .storage
            .get(&store_key)
            .map_err(|e| {
                Era5Error::connectivity(format!("failed to read {}/{}: {}", self.location, key, e))
            })?
            .ok_or_else(|| Era5Error::format(format!("{}/{} does not exist", self.location, key)))?;

        match serde_json::from_slice::<Value>(&bytes)? {
            Value::Object(map) => Ok(map),
            other => Err(Era5Error::format(format!(
                "{}/{} is not a JSON object: {}",
                self.location, key, other
            ))),
        }
    }

    fn open_array(&self, name: &str) -> Era5Result<Arc<Array<S>>> {
        if let Some(array) = self.lock_arrays().get(name) {
            return Ok(array.clone());
        }

        let array = Array::open(self.storage.clone(), &format!("/{}", name))
            .map_err(|e| Era5Error::format(format!("failed to open array {}: {}", name, e)))?;
        let array = Arc::new(array);

        self.lock_arrays().insert(name.to_string(), array.clone());
        Ok(array)
    }

    fn lock_arrays(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<Array<S>>>> {
        // A poisoned map only ever holds fully opened arrays.
        self.arrays.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Read a 1-D coordinate array (or a range of it) as f64.
    fn read_coordinate(&self, name: &str, range: Option<Range<u64>>) -> Era5Result<Vec<f64>> {
        let array = Array::open(self.storage.clone(), &format!("/{}", name))
            .map_err(|e| Era5Error::format(format!("failed to open coordinate {}: {}", name, e)))?;

        let shape = array.shape();
        if shape.len() != 1 {
            return Err(Era5Error::format(format!(
                "coordinate {} should be 1-D, has shape {:?}",
                name, shape
            )));
        }
        let len = shape[0];
        let range = range.unwrap_or(0..len);
        let range = range.start.min(len)..range.end.min(len);
        let subset = ArraySubset::new_with_ranges(&[range]);

        let read_err =
            |e: zarrs::array::ArrayError| Era5Error::connectivity(format!("failed to read {}: {}", name, e));

        let values = match array.data_type() {
            DataType::Float32 => array
                .retrieve_array_subset_elements::<f32>(&subset)
                .map_err(read_err)?
                .into_iter()
                .map(f64::from)
                .collect(),
            DataType::Float64 => array
                .retrieve_array_subset_elements::<f64>(&subset)
                .map_err(read_err)?,
            DataType::Int64 => array
                .retrieve_array_subset_elements::<i64>(&subset)
                .map_err(read_err)?
                .into_iter()
                .map(|v| v as f64)
                .collect(),
            DataType::Int32 => array
                .retrieve_array_subset_elements::<i32>(&subset)
                .map_err(read_err)?
                .into_iter()
                .map(f64::from)
                .collect(),
            other => {
                return Err(Era5Error::format(format!(
                    "coordinate {} has unsupported data type {:?}",
                    name, other
                )))
            }
        };

        Ok(values)
    }

    fn coordinate_len(&self, name: &str) -> Era5Result<u64> {
        let array = Array::open(self.storage.clone(), &format!("/{}", name))
            .map_err(|e| Era5Error::format(format!("failed to open coordinate {}: {}", name, e)))?;
        array
            .shape()
            .first()
            .copied()
            .ok_or_else(|| Era5Error::format(format!("coordinate {} has no dimensions", name)))
    }
}

impl<S: ?Sized + ReadableStorageTraits + 'static> Era5Source for ZarrEra5Source<S> {
    #[instrument(skip(self), fields(location = %self.location))]
    fn fetch_attributes(&self) -> Era5Result<SourceAttributes> {
        let attrs = self.read_json(".zattrs")?;
        source_attributes(&attrs)
    }

    #[instrument(skip(self), fields(location = %self.location))]
    fn load_domain(&self) -> Era5Result<DomainIndex> {
        let consolidated = self.read_json(".zmetadata")?;
        let metadata = consolidated
            .get("metadata")
            .and_then(Value::as_object)
            .ok_or_else(|| Era5Error::format(".zmetadata has no 'metadata' object"))?;

        let root_attrs = metadata
            .get(".zattrs")
            .and_then(Value::as_object)
            .cloned()
            .map(Ok)
            .unwrap_or_else(|| self.read_json(".zattrs"))?;
        let attributes = source_attributes(&root_attrs)?;

        let variables = discover_variables(metadata);
        debug!(count = variables.len(), "Discovered data variables");

        let time_units = metadata
            .get("time/.zattrs")
            .and_then(|v| v.get("units"))
            .and_then(Value::as_str)
            .ok_or_else(|| Era5Error::format("time coordinate has no 'units' attribute"))
            .and_then(HoursSinceUnits::parse)?;

        let time_len = self.coordinate_len("time")?;
        let head = self.read_coordinate("time", Some(0..2))?;
        let first = *head
            .first()
            .ok_or_else(|| Era5Error::format("time coordinate is empty"))?;
        let step = head.get(1).map(|second| second - first).unwrap_or(1.0);
        if step <= 0.0 || step.fract() != 0.0 {
            return Err(Era5Error::format(format!(
                "time coordinate step {} is not a positive whole number of hours",
                step
            )));
        }

        let levels = if metadata.contains_key("level/.zarray") {
            self.read_coordinate("level", None)?
        } else {
            Vec::new()
        };

        let domain = DomainIndex {
            variables,
            valid_time_start: attributes.valid_time_start,
            valid_time_stop: attributes.valid_time_stop,
            time_origin: time_units.to_datetime(first as i64),
            time_step_hours: step as i64,
            time_len,
            levels,
            latitude: self.read_coordinate("latitude", None)?,
            longitude: self.read_coordinate("longitude", None)?,
        };

        debug!(
            levels = domain.levels.len(),
            latitudes = domain.latitude.len(),
            longitudes = domain.longitude.len(),
            time_len = domain.time_len,
            "Loaded domain index"
        );

        Ok(domain)
    }

    fn read_block(&self, variable: &str, ranges: &[Range<u64>]) -> Era5Result<ArrayD<f32>> {
        let array = self.open_array(variable)?;

        if array.shape().len() != ranges.len() {
            return Err(Era5Error::format(format!(
                "variable {} has {} dimensions, {} ranges requested",
                variable,
                array.shape().len(),
                ranges.len()
            )));
        }
        for (range, len) in ranges.iter().zip(array.shape()) {
            if range.start > range.end || range.end > *len {
                return Err(Era5Error::format(format!(
                    "range {:?} outside {} (shape {:?})",
                    ranges,
                    variable,
                    array.shape()
                )));
            }
        }

        let subset = ArraySubset::new_with_ranges(ranges);
        let shape: Vec<usize> = ranges.iter().map(|r| (r.end - r.start) as usize).collect();

        let read_err = |e: zarrs::array::ArrayError| {
            Era5Error::connectivity(format!("failed to read {} {:?}: {}", variable, ranges, e))
        };

        let values: Vec<f32> = match array.data_type() {
            DataType::Float32 => array
                .retrieve_array_subset_elements::<f32>(&subset)
                .map_err(read_err)?,
            DataType::Float64 => array
                .retrieve_array_subset_elements::<f64>(&subset)
                .map_err(read_err)?
                .into_iter()
                .map(|v| v as f32)
                .collect(),
            other => {
                return Err(Era5Error::format(format!(
                    "variable {} has unsupported data type {:?}",
                    variable, other
                )))
            }
        };

        ArrayD::from_shape_vec(IxDyn(&shape), values)
            .map_err(|e| Era5Error::format(format!("block shape mismatch for {}: {}", variable, e)))
    }
}

/// Extract the valid time window from the root attribute record.
fn source_attributes(attrs: &Map<String, Value>) -> Era5Result<SourceAttributes> {
    let get = |name: &str| -> Era5Result<&str> {
        attrs
            .get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| Era5Error::format(format!("root attributes have no '{}'", name)))
    };

    Ok(SourceAttributes {
        valid_time_start: parse_date_attr("valid_time_start", get("valid_time_start")?)?,
        valid_time_stop: parse_date_attr("valid_time_stop", get("valid_time_stop")?)?,
    })
}

/// Find data variables in consolidated metadata.
///
/// A data variable is any array whose `_ARRAY_DIMENSIONS` are all known
/// dimensions and include time, latitude and longitude. Coordinate arrays
/// (1-D, named after their own dimension) never qualify.
fn discover_variables(metadata: &Map<String, Value>) -> BTreeMap<String, Vec<Dimension>> {
    let mut variables = BTreeMap::new();

    for key in metadata.keys() {
        let Some(name) = key.strip_suffix("/.zarray") else {
            continue;
        };

        let dim_names: Vec<&str> = metadata
            .get(&format!("{}/.zattrs", name))
            .and_then(|attrs| attrs.get("_ARRAY_DIMENSIONS"))
            .and_then(Value::as_array)
            .map(|dims| dims.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let dims: Option<Vec<Dimension>> = dim_names.iter().map(|d| Dimension::from_name(d)).collect();
        let Some(dims) = dims else {
            debug!(array = %name, dims = ?dim_names, "Skipping array with unknown dimensions");
            continue;
        };

        let is_data_variable = dims.contains(&Dimension::Time)
            && dims.contains(&Dimension::Latitude)
            && dims.contains(&Dimension::Longitude);
        if is_data_variable {
            variables.insert(name.to_string(), dims);
        }
    }

    variables
}
