//! Single variable/level/time selection and longitude rewrap.

use era5_common::{Dataset, Dimension, Era5Error, Era5Result, TimeInput};
use ndarray::{Array2, Axis, Ix2};

/// A 2-D (latitude, longitude) slice with its coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid2D {
    pub latitude: Vec<f64>,
    pub longitude: Vec<f64>,
    /// Shape `(latitude.len(), longitude.len())`.
    pub data: Array2<f32>,
}

/// Select one `variable` at one `level` and `time` from `dataset`.
///
/// `level` must be `None` exactly when the variable has no level
/// dimension. A `time` without offset is read as UTC.
pub fn select_grid(
    dataset: &Dataset,
    variable: &str,
    level: Option<f64>,
    time: impl Into<TimeInput>,
) -> Era5Result<Grid2D> {
    let var = dataset.variable(variable)?;

    let level_index = match (var.has_dim(Dimension::Level), level) {
        (true, Some(level)) => Some(dataset.level_index(level)?),
        (true, None) => {
            let levels = dataset.level.as_deref().unwrap_or(&[]);
            return Err(Era5Error::selection(
                format!("level of {}", variable),
                "none",
                levels,
            ));
        }
        (false, Some(level)) => {
            return Err(Era5Error::selection(
                format!("level of {} (no level dimension)", variable),
                level,
                &["none"],
            ));
        }
        (false, None) => None,
    };

    let time = time.into().assume_utc();
    let time_index = dataset.time_index(&time)?;

    let mut dims = var.dims.clone();
    let mut view = var.data.view();
    for (dim, index) in [(Dimension::Time, Some(time_index)), (Dimension::Level, level_index)] {
        let (Some(axis), Some(index)) = (dims.iter().position(|d| *d == dim), index) else {
            continue;
        };
        view = view.index_axis_move(Axis(axis), index);
        dims.remove(axis);
    }

    let view = match dims.as_slice() {
        [Dimension::Latitude, Dimension::Longitude] => view,
        [Dimension::Longitude, Dimension::Latitude] => view.reversed_axes(),
        other => {
            return Err(Era5Error::format(format!(
                "{} reduces to dimensions {:?}, expected latitude and longitude",
                variable, other
            )))
        }
    };

    let data = view
        .to_owned()
        .into_dimensionality::<Ix2>()
        .map_err(|e| Era5Error::format(format!("{} is not 2-D after selection: {}", variable, e)))?;

    Ok(Grid2D {
        latitude: dataset.latitude.clone(),
        longitude: dataset.longitude.clone(),
        data,
    })
}

/// Rewrap a 0..360 grid onto -180..180.
///
/// The first longitude `>= 180` becomes the new first column and every
/// longitude `>= 180` is reduced by 360. A grid with no such longitude is
/// already in the -180..180 frame and is returned unchanged.
pub fn rotate_longitudes(grid: Grid2D) -> Grid2D {
    let Some(split) = grid.longitude.iter().position(|lon| *lon >= 180.0) else {
        return grid;
    };

    let order: Vec<usize> = (split..grid.longitude.len()).chain(0..split).collect();
    let longitude = order
        .iter()
        .map(|&i| {
            let lon = grid.longitude[i];
            if lon >= 180.0 {
                lon - 360.0
            } else {
                lon
            }
        })
        .collect();

    Grid2D {
        latitude: grid.latitude,
        longitude,
        data: grid.data.select(Axis(1), &order),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::{sample_dataset, synthetic_value, utc};

    #[test]
    fn test_rotate_native_grid() {
        let dataset = sample_dataset(&[0.0, 90.0, 180.0, 270.0]);
        let grid = select_grid(&dataset, "2m_temperature", None, utc(2023, 1, 1, 0)).unwrap();
        let rotated = rotate_longitudes(grid);

        assert_eq!(rotated.longitude, vec![-180.0, -90.0, 0.0, 90.0]);
        assert!(rotated.longitude.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(rotated.data[[1, 0]], synthetic_value(2, &[0, 1, 2]));
        assert_eq!(rotated.data[[1, 2]], synthetic_value(2, &[0, 1, 0]));
    }

    #[test]
    fn test_rotate_already_shifted_grid_is_identity() {
        let dataset = sample_dataset(&[-180.0, -90.0, 0.0, 90.0]);
        let grid = select_grid(&dataset, "2m_temperature", None, utc(2023, 1, 1, 0)).unwrap();
        let rotated = rotate_longitudes(grid.clone());
        assert_eq!(rotated, grid);
    }

    #[test]
    fn test_select_level() {
        let dataset = sample_dataset(&[0.0, 90.0]);
        let grid = select_grid(&dataset, "temperature", Some(850.0), utc(2023, 1, 1, 0)).unwrap();
        assert_eq!(grid.data.dim(), (3, 2));
        assert_eq!(grid.data[[2, 1]], synthetic_value(0, &[0, 1, 2, 1]));
    }

    #[test]
    fn test_selection_errors_list_available_values() {
        let dataset = sample_dataset(&[0.0, 90.0]);
        let t = utc(2023, 1, 1, 0);

        let err = select_grid(&dataset, "wind", None, t).unwrap_err();
        assert!(err.is_selection());
        assert!(err.to_string().contains("2m_temperature"));

        let err = select_grid(&dataset, "temperature", Some(1000.0), t).unwrap_err();
        assert!(err.to_string().contains("850"));

        let err = select_grid(&dataset, "temperature", None, t).unwrap_err();
        assert!(err.is_selection());

        let err = select_grid(&dataset, "2m_temperature", Some(500.0), t).unwrap_err();
        assert!(err.is_selection());

        let err = select_grid(&dataset, "2m_temperature", None, utc(2023, 1, 1, 1)).unwrap_err();
        assert!(err.to_string().contains("2023-01-01T00:00:00"));
    }

    #[test]
    fn test_naive_time_is_utc() {
        let dataset = sample_dataset(&[0.0, 90.0]);
        let naive = utc(2023, 1, 1, 0).naive_utc();
        assert!(select_grid(&dataset, "2m_temperature", None, naive).is_ok());
    }
}
