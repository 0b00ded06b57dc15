//! Cached, range-sliced subsets of the ARCO ERA5 reanalysis.
//!
//! # Architecture
//!
//! ```text
//! Era5Client::download(request)
//!      │
//!      ├─► DomainIndexCache::refresh_if_stale (attribute record only)
//!      │
//!      ├─► validate_and_normalize (no remote I/O)
//!      │
//!      ├─► cache_key ─► CacheStore::find
//!      │         │
//!      │         ├─► hit: load payload, rename to new expiry
//!      │         │
//!      │         └─► miss: fetch blocks from the source, persist
//!      │
//!      └─► CacheStore::sweep
//! ```
//!
//! The source is any [`era5_common::Era5Source`], passed in explicitly.

pub mod cache;
pub mod client;
pub mod config;
pub mod domain_cache;
pub mod fetch;
pub mod query;

pub use cache::{cache_key, CacheEntry, CacheFileName, CacheNameError, CacheStore};
pub use client::Era5Client;
pub use config::Era5Config;
pub use domain_cache::DomainIndexCache;
pub use fetch::fetch;
pub use query::{validate_and_normalize, LevelSelection, LonConvention, Query, QueryRequest};
