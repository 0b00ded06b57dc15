//! The seam between the subset pipeline and the remote chunked-array store.

use std::ops::Range;

use ndarray::ArrayD;

use crate::domain::{DomainIndex, SourceAttributes};
use crate::error::Era5Result;

/// Read access to the remote ERA5 store.
///
/// Implementations block the caller; every method may perform remote I/O.
pub trait Era5Source {
    /// Fetch only the small attribute record (valid time window).
    fn fetch_attributes(&self) -> Era5Result<SourceAttributes>;

    /// Discover variables, coordinates and the valid domain.
    fn load_domain(&self) -> Era5Result<DomainIndex>;

    /// Read one hyper-rectangle of a variable.
    ///
    /// `ranges` are index ranges in the variable's own dimension order; the
    /// returned array has shape `ranges[i].end - ranges[i].start`.
    fn read_block(&self, variable: &str, ranges: &[Range<u64>]) -> Era5Result<ArrayD<f32>>;
}

impl<T: Era5Source + ?Sized> Era5Source for &T {
    fn fetch_attributes(&self) -> Era5Result<SourceAttributes> {
        (**self).fetch_attributes()
    }

    fn load_domain(&self) -> Era5Result<DomainIndex> {
        (**self).load_domain()
    }

    fn read_block(&self, variable: &str, ranges: &[Range<u64>]) -> Era5Result<ArrayD<f32>> {
        (**self).read_block(variable, ranges)
    }
}

impl<T: Era5Source + ?Sized> Era5Source for Box<T> {
    fn fetch_attributes(&self) -> Era5Result<SourceAttributes> {
        (**self).fetch_attributes()
    }

    fn load_domain(&self) -> Era5Result<DomainIndex> {
        (**self).load_domain()
    }

    fn read_block(&self, variable: &str, ranges: &[Range<u64>]) -> Era5Result<ArrayD<f32>> {
        (**self).read_block(variable, ranges)
    }
}
