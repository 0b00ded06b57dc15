//! Subset fetch engine.
//!
//! A normalized [`Query`] becomes, per dimension, the list of storage
//! indices to keep (in output order). Each list is grouped into contiguous
//! runs, and every combination of runs is read from the source as one block
//! and copied into place. With the shifted longitude convention the
//! longitude list wraps around the antimeridian, which typically gives two
//! runs: the `>= 180` half first, then the rest.

use std::collections::BTreeMap;
use std::ops::Range;

use chrono::{DateTime, Utc};
use era5_common::{DataVariable, Dataset, Dimension, DomainIndex, Era5Error, Era5Result, Era5Source};
use ndarray::{ArrayD, IxDyn, Slice};
use tracing::{debug, instrument};

use crate::query::{LonConvention, Query};

/// Map a native 0..360 longitude onto -180..180.
pub fn shift_longitude(lon: f64) -> f64 {
    if lon >= 180.0 {
        lon - 360.0
    } else {
        lon
    }
}

/// Indices of levels inside the closed (min, max) range, in storage order.
pub fn level_indices(levels: &[f64], (min, max): (f64, f64)) -> Vec<u64> {
    levels
        .iter()
        .enumerate()
        .filter(|(_, l)| **l >= min && **l <= max)
        .map(|(i, _)| i as u64)
        .collect()
}

/// Indices of latitudes inside the closed (north, south) range, in storage order.
pub fn latitude_indices(latitudes: &[f64], (north, south): (f64, f64)) -> Vec<u64> {
    latitudes
        .iter()
        .enumerate()
        .filter(|(_, lat)| **lat <= north && **lat >= south)
        .map(|(i, _)| i as u64)
        .collect()
}

/// Indices of longitudes inside the closed (west, east) range.
///
/// For [`LonConvention::Native`] the order is storage order. For
/// [`LonConvention::Shifted`] the bounds apply to the shifted coordinate and
/// the indices are ordered by it, ascending.
pub fn longitude_indices(longitudes: &[f64], (west, east): (f64, f64), convention: LonConvention) -> Vec<u64> {
    let mut selected: Vec<(f64, u64)> = longitudes
        .iter()
        .enumerate()
        .map(|(i, lon)| match convention {
            LonConvention::Native => (*lon, i as u64),
            LonConvention::Shifted => (shift_longitude(*lon), i as u64),
        })
        .filter(|(lon, _)| *lon >= west && *lon <= east)
        .collect();

    if convention == LonConvention::Shifted {
        selected.sort_by(|a, b| a.0.total_cmp(&b.0));
    }
    selected.into_iter().map(|(_, i)| i).collect()
}

/// Indices of `from..=to` on the time coordinate, every `step` samples.
pub fn time_indices(domain: &DomainIndex, query: &Query) -> Era5Result<Vec<u64>> {
    let locate = |field: &str, dt: &DateTime<Utc>| {
        domain.time_index(dt).ok_or_else(|| {
            Era5Error::validation(field, dt.to_rfc3339(), "a sample of the time coordinate")
        })
    };
    let start = locate("from_dt", &query.from)?;
    let stop = locate("to_dt", &query.to)?;

    Ok((start..=stop).step_by(query.time_interval as usize).collect())
}

/// Group indices into maximal runs of consecutive ascending values.
///
/// ```
/// use era5_subset::fetch::runs;
///
/// assert_eq!(runs(&[2, 3, 0, 1]), vec![2..4, 0..2]);
/// assert_eq!(runs(&[0, 2, 4]), vec![0..1, 2..3, 4..5]);
/// ```
pub fn runs(indices: &[u64]) -> Vec<Range<u64>> {
    let mut runs: Vec<Range<u64>> = Vec::new();
    for &i in indices {
        match runs.last_mut() {
            Some(run) if run.end == i => run.end += 1,
            _ => runs.push(i..i + 1),
        }
    }
    runs
}

/// Storage indices selected along each dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub time: Vec<u64>,
    /// `None` when no selected variable has a level dimension.
    pub level: Option<Vec<u64>>,
    pub latitude: Vec<u64>,
    pub longitude: Vec<u64>,
}

impl Selection {
    fn indices(&self, dim: Dimension) -> Era5Result<&[u64]> {
        match dim {
            Dimension::Time => Ok(&self.time),
            Dimension::Level => self
                .level
                .as_deref()
                .ok_or_else(|| Era5Error::MissingDimension(dim.name().to_string())),
            Dimension::Latitude => Ok(&self.latitude),
            Dimension::Longitude => Ok(&self.longitude),
        }
    }
}

/// Work out what to read for `query`.
///
/// A level range is dropped when none of the selected variables has a
/// level dimension.
pub fn plan(query: &Query, domain: &DomainIndex) -> Era5Result<Selection> {
    let has_level = query.has_level_variables(domain);

    let level = match (query.level, has_level) {
        (Some(range), false) => {
            debug!(?range, "Selected variables have no level dimension, ignoring level selection");
            None
        }
        (Some(range), true) => Some(level_indices(&domain.levels, range)),
        (None, true) => Some((0..domain.levels.len() as u64).collect()),
        (None, false) => None,
    };

    let selection = Selection {
        time: time_indices(domain, query)?,
        level,
        latitude: latitude_indices(&domain.latitude, query.latitude),
        longitude: longitude_indices(&domain.longitude, query.longitude, query.convention),
    };

    let empty = [
        ("time", selection.time.is_empty()),
        ("level", selection.level.as_ref().is_some_and(Vec::is_empty)),
        ("latitude", selection.latitude.is_empty()),
        ("longitude", selection.longitude.is_empty()),
    ];
    if let Some((axis, _)) = empty.iter().find(|(_, is_empty)| *is_empty) {
        return Err(Era5Error::validation(
            *axis,
            "an empty selection",
            "a range containing at least one grid point",
        ));
    }

    Ok(selection)
}

/// Read the subset described by `query` from `source`.
#[instrument(skip_all, fields(variables = ?query.variables, from = %query.from, to = %query.to))]
pub fn fetch<S: Era5Source + ?Sized>(source: &S, query: &Query, domain: &DomainIndex) -> Era5Result<Dataset> {
    let selection = plan(query, domain)?;

    let mut variables = BTreeMap::new();
    for name in &query.variables {
        let dims = domain
            .dims_of(name)
            .ok_or_else(|| Era5Error::selection("variable", name, &domain.variable_names()))?;
        let data = read_variable(source, name, dims, &selection)?;
        variables.insert(name.clone(), DataVariable::new(dims.to_vec(), data));
    }

    let pick = |coord: &[f64], indices: &[u64]| -> Vec<f64> {
        indices.iter().map(|&i| coord[i as usize]).collect()
    };

    let mut longitude = pick(&domain.longitude, &selection.longitude);
    if query.convention == LonConvention::Shifted {
        longitude.iter_mut().for_each(|lon| *lon = shift_longitude(*lon));
    }

    let mut attributes = BTreeMap::new();
    attributes.insert(
        "longitude_convention".to_string(),
        match query.convention {
            LonConvention::Native => "0..360",
            LonConvention::Shifted => "-180..180",
        }
        .to_string(),
    );

    let dataset = Dataset {
        time: selection.time.iter().map(|&i| domain.time_at(i)).collect(),
        level: selection.level.as_ref().map(|idx| pick(&domain.levels, idx)),
        latitude: pick(&domain.latitude, &selection.latitude),
        longitude,
        variables,
        attributes,
    };
    dataset.check_consistency()?;

    debug!(
        times = dataset.time.len(),
        latitudes = dataset.latitude.len(),
        longitudes = dataset.longitude.len(),
        "Materialized subset"
    );
    Ok(dataset)
}

/// Read one variable block by block and assemble it in output order.
fn read_variable<S: Era5Source + ?Sized>(
    source: &S,
    name: &str,
    dims: &[Dimension],
    selection: &Selection,
) -> Era5Result<ArrayD<f32>> {
    let per_axis: Vec<&[u64]> = dims
        .iter()
        .map(|d| selection.indices(*d))
        .collect::<Era5Result<_>>()?;
    let shape: Vec<usize> = per_axis.iter().map(|idx| idx.len()).collect();

    // Runs per axis, each paired with its offset in the output.
    let axis_runs: Vec<Vec<(Range<u64>, usize)>> = per_axis
        .iter()
        .map(|idx| {
            let mut offset = 0;
            runs(idx)
                .into_iter()
                .map(|run| {
                    let at = offset;
                    offset += (run.end - run.start) as usize;
                    (run, at)
                })
                .collect()
        })
        .collect();

    let mut out = ArrayD::<f32>::from_elem(IxDyn(&shape), f32::NAN);
    let mut blocks = 0usize;

    // Odometer over the cartesian product of runs.
    let mut cursor = vec![0usize; axis_runs.len()];
    loop {
        let ranges: Vec<Range<u64>> = cursor
            .iter()
            .zip(&axis_runs)
            .map(|(&c, runs)| runs[c].0.clone())
            .collect();
        let offsets: Vec<usize> = cursor.iter().zip(&axis_runs).map(|(&c, runs)| runs[c].1).collect();

        let block = source.read_block(name, &ranges)?;
        let expected: Vec<usize> = ranges.iter().map(|r| (r.end - r.start) as usize).collect();
        if block.shape() != expected.as_slice() {
            return Err(Era5Error::format(format!(
                "block of {} at {:?} has shape {:?}, expected {:?}",
                name,
                ranges,
                block.shape(),
                expected
            )));
        }

        out.slice_each_axis_mut(|ax| {
            let axis = ax.axis.index();
            let start = offsets[axis];
            Slice::from(start..start + expected[axis])
        })
        .assign(&block);
        blocks += 1;

        let mut axis = cursor.len();
        loop {
            if axis == 0 {
                debug!(variable = %name, blocks, shape = ?shape, "Read variable");
                return Ok(out);
            }
            axis -= 1;
            cursor[axis] += 1;
            if cursor[axis] < axis_runs[axis].len() {
                break;
            }
            cursor[axis] = 0;
        }
    }
}
