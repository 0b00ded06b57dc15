//! In-memory named-dimension subsets of the ERA5 dataset.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

use crate::error::{Era5Error, Era5Result};

/// Dimensions used by ERA5 variables, in storage order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Time,
    Level,
    Latitude,
    Longitude,
}

impl Dimension {
    pub const ALL: [Dimension; 4] = [
        Dimension::Time,
        Dimension::Level,
        Dimension::Latitude,
        Dimension::Longitude,
    ];

    /// The coordinate/dimension name used in Zarr and netCDF.
    pub fn name(&self) -> &'static str {
        match self {
            Dimension::Time => "time",
            Dimension::Level => "level",
            Dimension::Latitude => "latitude",
            Dimension::Longitude => "longitude",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "time" => Some(Dimension::Time),
            "level" => Some(Dimension::Level),
            "latitude" => Some(Dimension::Latitude),
            "longitude" => Some(Dimension::Longitude),
            _ => None,
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single data variable: values laid out along `dims`.
#[derive(Debug, Clone, PartialEq)]
pub struct DataVariable {
    pub dims: Vec<Dimension>,
    pub data: ArrayD<f32>,
    pub attributes: BTreeMap<String, String>,
}

impl DataVariable {
    pub fn new(dims: Vec<Dimension>, data: ArrayD<f32>) -> Self {
        Self {
            dims,
            data,
            attributes: BTreeMap::new(),
        }
    }

    pub fn has_dim(&self, dim: Dimension) -> bool {
        self.dims.contains(&dim)
    }

    pub fn axis_of(&self, dim: Dimension) -> Option<usize> {
        self.dims.iter().position(|d| *d == dim)
    }
}

/// A materialized subset: coordinates plus the selected variables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub time: Vec<DateTime<Utc>>,
    /// `None` when none of the variables has a level dimension.
    pub level: Option<Vec<f64>>,
    /// Descending (north to south).
    pub latitude: Vec<f64>,
    pub longitude: Vec<f64>,
    pub variables: BTreeMap<String, DataVariable>,
    pub attributes: BTreeMap<String, String>,
}

impl Dataset {
    pub fn variable_names(&self) -> Vec<String> {
        self.variables.keys().cloned().collect()
    }

    /// Look up a variable, failing with the list of available names.
    pub fn variable(&self, name: &str) -> Era5Result<&DataVariable> {
        self.variables
            .get(name)
            .ok_or_else(|| Era5Error::selection("variable", name, &self.variable_names()))
    }

    /// Length of a coordinate, `None` for an absent level coordinate.
    pub fn coord_len(&self, dim: Dimension) -> Option<usize> {
        match dim {
            Dimension::Time => Some(self.time.len()),
            Dimension::Level => self.level.as_ref().map(Vec::len),
            Dimension::Latitude => Some(self.latitude.len()),
            Dimension::Longitude => Some(self.longitude.len()),
        }
    }

    /// The array shape implied by the coordinates for the given dimensions.
    pub fn shape_for(&self, dims: &[Dimension]) -> Era5Result<Vec<usize>> {
        dims.iter()
            .map(|d| {
                self.coord_len(*d)
                    .ok_or_else(|| Era5Error::MissingDimension(d.name().to_string()))
            })
            .collect()
    }

    /// Check that every variable's array agrees with the coordinate lengths.
    pub fn check_consistency(&self) -> Era5Result<()> {
        for (name, var) in &self.variables {
            let expected = self.shape_for(&var.dims)?;
            if var.data.shape() != expected.as_slice() {
                return Err(Era5Error::format(format!(
                    "variable {} has shape {:?}, coordinates imply {:?}",
                    name,
                    var.data.shape(),
                    expected
                )));
            }
        }
        Ok(())
    }

    /// Position of a timestamp on the time coordinate.
    pub fn time_index(&self, time: &DateTime<Utc>) -> Era5Result<usize> {
        self.time.iter().position(|t| t == time).ok_or_else(|| {
            let available: Vec<String> = self.time.iter().map(|t| t.to_rfc3339()).collect();
            Era5Error::selection("time", time.to_rfc3339(), &available)
        })
    }

    /// Position of a level on the level coordinate.
    pub fn level_index(&self, level: f64) -> Era5Result<usize> {
        let levels = self.level.as_deref().unwrap_or(&[]);
        levels
            .iter()
            .position(|l| *l == level)
            .ok_or_else(|| Era5Error::selection("level", level, levels))
    }
}
