//! Remote access to the ARCO ERA5 Zarr store.
//!
//! The store is a Zarr v2 hierarchy with consolidated metadata. Only three
//! kinds of reads happen here:
//!
//! - the root `.zattrs` record, to learn the valid time window cheaply
//! - `.zmetadata` plus the small coordinate arrays, to build a [`DomainIndex`]
//! - hyper-rectangles of data variables, for subset materialization
//!
//! [`DomainIndex`]: era5_common::DomainIndex

pub mod config;
pub mod http;
pub mod zarr;

pub use config::SourceConfig;
pub use http::{create_http_storage, open_remote, HttpZarrStorage, RuntimeBlockOn};
pub use zarr::ZarrEra5Source;
