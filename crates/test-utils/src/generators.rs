//! Synthetic data generators and an in-memory ERA5 source.
//!
//! Values are predictable: each cell holds
//! `code * 1_000_000 + (i0 * 10 + i1) * 10 + ...` over its storage indices,
//! so a test can check exactly which source cell ended up where.

use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use chrono::NaiveDate;
use era5_common::{DomainIndex, Era5Error, Era5Result, Era5Source, SourceAttributes};
use ndarray::{ArrayD, IxDyn};

use crate::fixtures::synthetic_domain;

/// Numeric code used to distinguish variables in synthetic values.
pub fn variable_code(name: &str) -> usize {
    match name {
        "temperature" => 0,
        "geopotential" => 1,
        "2m_temperature" => 2,
        _ => 9,
    }
}

/// The value stored at the given storage indices of a variable.
///
/// # Example
///
/// ```
/// use test_utils::synthetic_value;
///
/// assert_eq!(synthetic_value(0, &[0, 1, 2, 3]), 123.0);
/// assert_eq!(synthetic_value(2, &[1, 0, 0]), 2_000_100.0);
/// ```
pub fn synthetic_value(code: usize, indices: &[usize]) -> f32 {
    let cell = indices.iter().fold(0usize, |acc, i| acc * 10 + i);
    (code * 1_000_000 + cell) as f32
}

/// An in-memory [`Era5Source`] over [`synthetic_domain`].
///
/// Counts every call so tests can assert that cache hits never reach the
/// "remote" side, and can simulate upstream advancing or going away.
pub struct SyntheticSource {
    domain: Mutex<DomainIndex>,
    fail_remote: AtomicBool,
    fail_reads: AtomicBool,
    attribute_fetches: AtomicUsize,
    domain_loads: AtomicUsize,
    block_reads: AtomicUsize,
}

impl Default for SyntheticSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntheticSource {
    pub fn new() -> Self {
        Self::with_domain(synthetic_domain())
    }

    pub fn with_domain(domain: DomainIndex) -> Self {
        Self {
            domain: Mutex::new(domain),
            fail_remote: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            attribute_fetches: AtomicUsize::new(0),
            domain_loads: AtomicUsize::new(0),
            block_reads: AtomicUsize::new(0),
        }
    }

    /// Simulate the upstream publishing data up to a later date.
    pub fn advance_valid_time_stop(&self, stop: NaiveDate) {
        self.domain_mut().valid_time_stop = stop;
    }

    /// Make every remote call fail with a connectivity error.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.fail_remote.store(unreachable, Ordering::SeqCst);
    }

    /// Make only block reads fail, leaving metadata reachable.
    pub fn set_reads_failing(&self, failing: bool) {
        self.fail_reads.store(failing, Ordering::SeqCst);
    }

    pub fn attribute_fetches(&self) -> usize {
        self.attribute_fetches.load(Ordering::SeqCst)
    }

    pub fn domain_loads(&self) -> usize {
        self.domain_loads.load(Ordering::SeqCst)
    }

    pub fn block_reads(&self) -> usize {
        self.block_reads.load(Ordering::SeqCst)
    }

    fn domain_mut(&self) -> std::sync::MutexGuard<'_, DomainIndex> {
        self.domain.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_reachable(&self) -> Era5Result<()> {
        if self.fail_remote.load(Ordering::SeqCst) {
            return Err(Era5Error::connectivity("synthetic store is unreachable"));
        }
        Ok(())
    }
}

impl Era5Source for SyntheticSource {
    fn fetch_attributes(&self) -> Era5Result<SourceAttributes> {
        self.attribute_fetches.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()?;
        Ok(self.domain_mut().attributes())
    }

    fn load_domain(&self) -> Era5Result<DomainIndex> {
        self.domain_loads.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()?;
        Ok(self.domain_mut().clone())
    }

    fn read_block(&self, variable: &str, ranges: &[Range<u64>]) -> Era5Result<ArrayD<f32>> {
        self.block_reads.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()?;
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Era5Error::connectivity(format!("synthetic read of {} failed", variable)));
        }

        let domain = self.domain_mut().clone();
        let dims = domain
            .dims_of(variable)
            .ok_or_else(|| Era5Error::format(format!("no array named {}", variable)))?;
        if dims.len() != ranges.len() {
            return Err(Era5Error::format(format!(
                "variable {} has {} dimensions, {} ranges requested",
                variable,
                dims.len(),
                ranges.len()
            )));
        }

        let code = variable_code(variable);
        let shape: Vec<usize> = ranges.iter().map(|r| (r.end - r.start) as usize).collect();
        Ok(ArrayD::from_shape_fn(IxDyn(&shape), |idx| {
            let absolute: Vec<usize> = ranges
                .iter()
                .enumerate()
                .map(|(axis, r)| idx[axis] + r.start as usize)
                .collect();
            synthetic_value(code, &absolute)
        }))
    }
}
