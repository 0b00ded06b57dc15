//! Common test fixtures for ERA5 subset tests.
//!
//! The synthetic domain is a coarse 45/90 degree grid with a two day time
//! window, small enough to materialize completely in every test.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use era5_common::{DataVariable, Dataset, Dimension, DomainIndex};
use ndarray::{ArrayD, IxDyn};

use crate::generators::synthetic_value;

/// Variables exposed by the synthetic domain, with their dimensions.
pub fn synthetic_variables() -> BTreeMap<String, Vec<Dimension>> {
    use Dimension::*;
    BTreeMap::from([
        ("temperature".to_string(), vec![Time, Level, Latitude, Longitude]),
        ("geopotential".to_string(), vec![Time, Level, Latitude, Longitude]),
        ("2m_temperature".to_string(), vec![Time, Latitude, Longitude]),
    ])
}

/// Latitudes of the synthetic grid (descending, as stored).
pub const LATITUDES: [f64; 5] = [90.0, 45.0, 0.0, -45.0, -90.0];

/// Longitudes of the synthetic grid (0..360 native convention).
pub const LONGITUDES: [f64; 4] = [0.0, 90.0, 180.0, 270.0];

/// Pressure levels of the synthetic grid (ascending, as stored).
pub const LEVELS: [f64; 4] = [1.0, 500.0, 850.0, 1000.0];

/// Number of hourly samples on the synthetic time coordinate.
pub const TIME_LEN: u64 = 48;

/// UTC timestamp helper.
pub fn utc(year: i32, month: u32, day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, 0, 0)
        .single()
        .unwrap_or_else(|| panic!("invalid fixture timestamp {year}-{month}-{day} {hour}h"))
}

/// Domain of the synthetic store: 2023-01-01 .. 2023-01-02, hourly.
pub fn synthetic_domain() -> DomainIndex {
    DomainIndex {
        variables: synthetic_variables(),
        valid_time_start: date(2023, 1, 1),
        valid_time_stop: date(2023, 1, 2),
        time_origin: utc(2023, 1, 1, 0),
        time_step_hours: 1,
        time_len: TIME_LEN,
        levels: LEVELS.to_vec(),
        latitude: LATITUDES.to_vec(),
        longitude: LONGITUDES.to_vec(),
    }
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day)
        .unwrap_or_else(|| panic!("invalid fixture date {year}-{month}-{day}"))
}

/// A single-time dataset on the given longitudes, for converter tests.
///
/// `temperature` has a level dimension (levels 500 and 850), `2m_temperature`
/// does not. Values follow [`synthetic_value`] so tests can predict them.
pub fn sample_dataset(longitudes: &[f64]) -> Dataset {
    let time = vec![utc(2023, 1, 1, 0)];
    let level = vec![500.0, 850.0];
    let latitude = vec![10.0, 0.0, -10.0];

    let mut variables = BTreeMap::new();

    let shape = [1, level.len(), latitude.len(), longitudes.len()];
    let temperature = ArrayD::from_shape_fn(IxDyn(&shape), |idx| {
        synthetic_value(0, &[idx[0], idx[1], idx[2], idx[3]])
    });
    variables.insert(
        "temperature".to_string(),
        DataVariable::new(
            vec![Dimension::Time, Dimension::Level, Dimension::Latitude, Dimension::Longitude],
            temperature,
        ),
    );

    let shape = [1, latitude.len(), longitudes.len()];
    let surface = ArrayD::from_shape_fn(IxDyn(&shape), |idx| {
        synthetic_value(2, &[idx[0], idx[1], idx[2]])
    });
    variables.insert(
        "2m_temperature".to_string(),
        DataVariable::new(
            vec![Dimension::Time, Dimension::Latitude, Dimension::Longitude],
            surface,
        ),
    );

    Dataset {
        time,
        level: Some(level),
        latitude,
        longitude: longitudes.to_vec(),
        variables,
        attributes: BTreeMap::new(),
    }
}
