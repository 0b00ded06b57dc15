//! The discovered valid domain of the remote dataset.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::dataset::Dimension;
use crate::time::start_of_day;

/// The lightweight attribute record published next to the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceAttributes {
    pub valid_time_start: NaiveDate,
    pub valid_time_stop: NaiveDate,
}

/// Plain metadata extracted from the remote dataset.
///
/// This is what gets persisted as the local snapshot: no live handle,
/// only the fields needed to validate a query and plan a read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainIndex {
    /// Data variables and their dimensions, in storage order.
    pub variables: BTreeMap<String, Vec<Dimension>>,
    pub valid_time_start: NaiveDate,
    pub valid_time_stop: NaiveDate,
    /// Timestamp of the first element of the time coordinate.
    pub time_origin: DateTime<Utc>,
    pub time_step_hours: i64,
    pub time_len: u64,
    /// Level coordinate in storage order.
    pub levels: Vec<f64>,
    /// Latitude coordinate in storage order (descending).
    pub latitude: Vec<f64>,
    /// Longitude coordinate in storage order (ascending, 0..360).
    pub longitude: Vec<f64>,
}

impl DomainIndex {
    pub fn variable_names(&self) -> Vec<String> {
        self.variables.keys().cloned().collect()
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    pub fn dims_of(&self, name: &str) -> Option<&[Dimension]> {
        self.variables.get(name).map(Vec::as_slice)
    }

    pub fn attributes(&self) -> SourceAttributes {
        SourceAttributes {
            valid_time_start: self.valid_time_start,
            valid_time_stop: self.valid_time_stop,
        }
    }

    /// Inclusive (min, max) of the level coordinate.
    pub fn level_domain(&self) -> Option<(f64, f64)> {
        let min = self.levels.iter().copied().reduce(f64::min)?;
        let max = self.levels.iter().copied().reduce(f64::max)?;
        Some((min, max))
    }

    /// Inclusive valid time window, each bound at midnight UTC.
    pub fn valid_time_range(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        (
            start_of_day(self.valid_time_start),
            start_of_day(self.valid_time_stop),
        )
    }

    /// Index of `dt` on the time coordinate, if it falls exactly on a sample.
    pub fn time_index(&self, dt: &DateTime<Utc>) -> Option<u64> {
        if self.time_step_hours <= 0 {
            return None;
        }
        let hours = (*dt - self.time_origin).num_hours();
        if hours < 0 || hours % self.time_step_hours != 0 {
            return None;
        }
        let index = (hours / self.time_step_hours) as u64;
        (index < self.time_len).then_some(index)
    }

    pub fn time_at(&self, index: u64) -> DateTime<Utc> {
        self.time_origin + Duration::hours(index as i64 * self.time_step_hours)
    }
}
