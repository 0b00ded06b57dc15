//! netCDF persistence for ERA5 subsets.
//!
//! Cache payloads and the serialized-file converter both go through this
//! crate. The on-disk layout follows CF conventions as written by common
//! array libraries:
//!
//! - one netCDF dimension and coordinate variable per [`Dimension`] present
//! - `time` stored as `int64` with `units = "hours since 1900-01-01 00:00:00"`
//! - data variables stored as `float32` with their string attributes
//! - dataset attributes stored as global string attributes
//!
//! [`Dimension`]: era5_common::Dimension

mod reader;
mod writer;

use std::path::Path;
use std::sync::Once;

use era5_common::Era5Error;

pub use reader::read_dataset;
pub use writer::write_dataset;

/// Name of the CF units attribute.
pub(crate) const UNITS: &str = "units";

/// Silence HDF5's automatic error printing to stderr.
///
/// libhdf5 prints diagnostics for errors that are handled on the Rust side
/// (probing for an optional attribute, for one). Safe to call repeatedly;
/// only the first call does anything.
pub fn silence_hdf5_errors() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        // SAFETY: H5Eset_auto2 with null handlers is a documented way to
        // disable the default error stack printer.
        unsafe {
            hdf5_metno_sys::h5e::H5Eset_auto2(
                hdf5_metno_sys::h5e::H5E_DEFAULT,
                None,
                std::ptr::null_mut(),
            );
        }
    });
}

/// Map a netCDF library error on `path` to a format error with context.
pub(crate) fn nc_error(path: &Path, action: &str) -> impl Fn(netcdf::Error) -> Era5Error + '_ {
    let action = action.to_string();
    move |e| Era5Error::format(format!("netCDF {} failed for {}: {}", action, path.display(), e))
}
