//! Common types shared by every crate in the ERA5 subset workspace.
//!
//! - [`DomainIndex`]: the discovered valid domain of the remote dataset
//! - [`Dataset`]: an in-memory, named-dimension subset
//! - [`Era5Source`]: the seam to the remote chunked-array store
//! - [`Era5Error`]: the error taxonomy used throughout

pub mod dataset;
pub mod domain;
pub mod error;
pub mod source;
pub mod time;

pub use dataset::{DataVariable, Dataset, Dimension};
pub use domain::{DomainIndex, SourceAttributes};
pub use error::{Era5Error, Era5Result};
pub use source::Era5Source;
pub use time::{HoursSinceUnits, TimeInput};
