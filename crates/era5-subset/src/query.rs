//! Query request types and validation against the discovered domain.
//!
//! A [`QueryRequest`] is raw user input. [`validate_and_normalize`] turns it
//! into a [`Query`] or fails with a validation error naming the field, the
//! offending value and what would have been accepted. Nothing here touches
//! the remote store.
//!
//! # Example
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use era5_subset::{LevelSelection, LonConvention, QueryRequest};
//!
//! let t = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
//! let request = QueryRequest::new(["temperature"], t, t)
//!     .level(LevelSelection::Single(850.0))
//!     .latitude(60.0, 30.0)
//!     .longitude(-10.0, 40.0)
//!     .convention(LonConvention::Shifted);
//! assert_eq!(request.time_interval, 1);
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use era5_common::time::is_hour_aligned;
use era5_common::{Dimension, DomainIndex, Era5Error, Era5Result, TimeInput};
use serde::{Deserialize, Serialize};

use crate::fetch::{latitude_indices, level_indices, longitude_indices};

/// Which vertical levels to select.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum LevelSelection {
    /// The whole level coordinate.
    #[default]
    All,
    /// One level, which must lie within the level coordinate.
    Single(f64),
    /// Closed interval, bounds in either order. The first bound may not lie
    /// below the coordinate and the second may not lie above it; the
    /// ordered interval is then clipped to the coordinate. The descending
    /// `Range(1000.0, 0.0)` therefore selects every level, like `All`.
    Range(f64, f64),
}

impl fmt::Display for LevelSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LevelSelection::All => f.write_str("all"),
            LevelSelection::Single(level) => write!(f, "{}", level),
            LevelSelection::Range(a, b) => write!(f, "({}, {})", a, b),
        }
    }
}

/// Longitude convention of the query bounds and of the returned subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LonConvention {
    /// The store's own 0..360 coordinate.
    #[default]
    Native,
    /// -180..180, with the subset re-sorted along the shifted coordinate.
    Shifted,
}

impl LonConvention {
    /// Valid longitude bounds under this convention.
    pub fn bounds(&self) -> (f64, f64) {
        match self {
            LonConvention::Native => (0.0, 360.0),
            LonConvention::Shifted => (-180.0, 180.0),
        }
    }

    /// Short token used in cache keys.
    pub fn token(&self) -> &'static str {
        match self {
            LonConvention::Native => "lon360",
            LonConvention::Shifted => "lon180",
        }
    }
}

/// Raw query input, with the public entrypoint's defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub variables: Vec<String>,
    pub from: TimeInput,
    pub to: TimeInput,
    /// Step along the time coordinate, in hours.
    pub time_interval: i64,
    pub level: LevelSelection,
    pub latitude: (f64, f64),
    pub longitude: (f64, f64),
    pub convention: LonConvention,
}

impl QueryRequest {
    pub fn new<I, V>(variables: I, from: impl Into<TimeInput>, to: impl Into<TimeInput>) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        Self {
            variables: variables.into_iter().map(Into::into).collect(),
            from: from.into(),
            to: to.into(),
            time_interval: 1,
            level: LevelSelection::All,
            latitude: (-90.0, 90.0),
            longitude: (0.0, 360.0),
            convention: LonConvention::Native,
        }
    }

    pub fn time_interval(mut self, hours: i64) -> Self {
        self.time_interval = hours;
        self
    }

    pub fn level(mut self, level: LevelSelection) -> Self {
        self.level = level;
        self
    }

    pub fn latitude(mut self, a: f64, b: f64) -> Self {
        self.latitude = (a, b);
        self
    }

    pub fn longitude(mut self, a: f64, b: f64) -> Self {
        self.longitude = (a, b);
        self
    }

    /// Set the longitude convention. Bounds are not converted.
    pub fn convention(mut self, convention: LonConvention) -> Self {
        self.convention = convention;
        self
    }
}

/// A validated, normalized query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// Sorted and deduplicated.
    pub variables: Vec<String>,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub time_interval: u32,
    /// Ascending (min, max); `None` when the dataset has no level coordinate.
    pub level: Option<(f64, f64)>,
    /// Descending (north, south), matching storage order.
    pub latitude: (f64, f64),
    /// Ascending (west, east) in the query's convention.
    pub longitude: (f64, f64),
    pub convention: LonConvention,
}

impl Query {
    /// Whether any selected variable has a level dimension.
    pub fn has_level_variables(&self, domain: &DomainIndex) -> bool {
        self.variables.iter().any(|v| {
            domain
                .dims_of(v)
                .is_some_and(|dims| dims.contains(&Dimension::Level))
        })
    }
}

fn within(value: f64, (lo, hi): (f64, f64)) -> bool {
    value >= lo && value <= hi
}

fn ordered(a: f64, b: f64) -> (f64, f64) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Validate `request` against `domain` and normalize it.
///
/// Checks run in a fixed order and the first failure is returned: variables,
/// timezone presence, hour alignment, ordering, the valid time window, the
/// time step, levels, latitude, then longitude. Ranges that select no grid
/// point are rejected here too, so an empty read never reaches the store.
pub fn validate_and_normalize(request: &QueryRequest, domain: &DomainIndex) -> Era5Result<Query> {
    let variables = validate_variables(&request.variables, domain)?;

    let from = request.from.to_utc().ok_or_else(|| {
        Era5Error::validation("from_dt", request.from, "a timezone-aware datetime")
    })?;
    let to = request.to.to_utc().ok_or_else(|| {
        Era5Error::validation("to_dt", request.to, "a timezone-aware datetime")
    })?;

    for (field, dt) in [("from_dt", &from), ("to_dt", &to)] {
        if !is_hour_aligned(dt) {
            return Err(Era5Error::validation(
                field,
                dt.to_rfc3339(),
                "a datetime on an exact hour (minute, second and fraction zero)",
            ));
        }
    }

    if from > to {
        return Err(Era5Error::validation(
            "from_dt",
            format!("{} > to_dt {}", from.to_rfc3339(), to.to_rfc3339()),
            "from_dt <= to_dt",
        ));
    }

    let (valid_start, valid_stop) = domain.valid_time_range();
    for (field, dt) in [("from_dt", &from), ("to_dt", &to)] {
        if *dt < valid_start || *dt > valid_stop {
            return Err(Era5Error::validation(
                field,
                dt.to_rfc3339(),
                format!("a datetime within [{}, {}]", valid_start.to_rfc3339(), valid_stop.to_rfc3339()),
            ));
        }
        if domain.time_index(dt).is_none() {
            return Err(Era5Error::validation(
                field,
                dt.to_rfc3339(),
                format!(
                    "a sample of the time coordinate ({} steps of {}h from {})",
                    domain.time_len,
                    domain.time_step_hours,
                    domain.time_origin.to_rfc3339()
                ),
            ));
        }
    }

    let time_interval = u32::try_from(request.time_interval)
        .ok()
        .filter(|step| *step > 0)
        .ok_or_else(|| {
            Era5Error::validation("time_interval", request.time_interval, "a positive number of hours")
        })?;

    let mut query = Query {
        variables,
        from,
        to,
        time_interval,
        level: None,
        latitude: (0.0, 0.0),
        longitude: (0.0, 0.0),
        convention: request.convention,
    };

    query.level = validate_level(request.level, domain)?;
    if let Some(level) = query.level {
        if query.has_level_variables(domain) && level_indices(&domain.levels, level).is_empty() {
            return Err(Era5Error::validation(
                "level",
                request.level,
                format!("a range containing at least one of {:?}", domain.levels),
            ));
        }
    }

    let (lat_a, lat_b) = request.latitude;
    for value in [lat_a, lat_b] {
        if !within(value, (-90.0, 90.0)) {
            return Err(Era5Error::validation(
                "lat_range",
                format!("({}, {})", lat_a, lat_b),
                "values within [-90, 90]",
            ));
        }
    }
    let (south, north) = ordered(lat_a, lat_b);
    query.latitude = (north, south);
    if latitude_indices(&domain.latitude, query.latitude).is_empty() {
        return Err(Era5Error::validation(
            "lat_range",
            format!("({}, {})", lat_a, lat_b),
            "a range containing at least one grid latitude",
        ));
    }

    let (lon_a, lon_b) = request.longitude;
    let bounds = request.convention.bounds();
    for value in [lon_a, lon_b] {
        if !within(value, bounds) {
            return Err(Era5Error::validation(
                "lon_range",
                format!("({}, {})", lon_a, lon_b),
                format!(
                    "values within [{}, {}] for the {:?} convention",
                    bounds.0, bounds.1, request.convention
                ),
            ));
        }
    }
    query.longitude = ordered(lon_a, lon_b);
    if longitude_indices(&domain.longitude, query.longitude, query.convention).is_empty() {
        return Err(Era5Error::validation(
            "lon_range",
            format!("({}, {})", lon_a, lon_b),
            "a range containing at least one grid longitude",
        ));
    }

    Ok(query)
}

fn validate_variables(requested: &[String], domain: &DomainIndex) -> Era5Result<Vec<String>> {
    if requested.is_empty() {
        return Err(Era5Error::validation(
            "variables",
            "[]",
            "at least one variable name",
        ));
    }

    if let Some(unknown) = requested.iter().find(|v| !domain.has_variable(v)) {
        return Err(Era5Error::validation(
            "variables",
            unknown,
            format!("one of {:?}", domain.variable_names()),
        ));
    }

    let mut variables = requested.to_vec();
    variables.sort();
    variables.dedup();
    Ok(variables)
}

fn validate_level(selection: LevelSelection, domain: &DomainIndex) -> Era5Result<Option<(f64, f64)>> {
    let Some(valid) = domain.level_domain() else {
        return match selection {
            LevelSelection::All => Ok(None),
            other => Err(Era5Error::validation(
                "level",
                other,
                "no level selection, the dataset has no level coordinate",
            )),
        };
    };

    let accepted = match selection {
        LevelSelection::All => return Ok(Some(valid)),
        LevelSelection::Single(level) => within(level, valid),
        LevelSelection::Range(first, second) => first >= valid.0 && second <= valid.1,
    };
    if !accepted {
        return Err(Era5Error::validation(
            "level",
            selection,
            format!("levels within [{}, {}]", valid.0, valid.1),
        ));
    }

    Ok(Some(match selection {
        LevelSelection::Range(first, second) => {
            let (lo, hi) = ordered(first, second);
            (lo.max(valid.0), hi.min(valid.1))
        }
        LevelSelection::Single(level) => (level, level),
        LevelSelection::All => valid,
    }))
}
