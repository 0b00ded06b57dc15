//! Anonymous HTTP storage backend for Zarr access.
//!
//! The zarrs API used by [`ZarrEra5Source`] is synchronous, while
//! `object_store` is async. The HTTP store is wrapped in `AsyncObjectStore`
//! and then in an async-to-sync adapter driven by a private tokio runtime.

use std::sync::Arc;
use std::time::Duration;

use object_store::http::{HttpBuilder, HttpStore};
use object_store::ClientOptions;
use tokio::runtime::Runtime;
use zarrs_object_store::AsyncObjectStore;
use zarrs_storage::storage_adapter::async_to_sync::{
    AsyncToSyncBlockOn, AsyncToSyncStorageAdapter,
};

use era5_common::{Era5Error, Era5Result};

use crate::config::SourceConfig;
use crate::zarr::ZarrEra5Source;

/// Blocking executor backed by a runtime owned by the source.
///
/// Callers of the sync API are never inside an async context, so the
/// runtime can be driven directly with `Runtime::block_on`.
#[derive(Clone)]
pub struct RuntimeBlockOn {
    runtime: Arc<Runtime>,
}

impl RuntimeBlockOn {
    pub fn new() -> Era5Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("era5-http")
            .enable_all()
            .build()
            .map_err(|e| Era5Error::connectivity(format!("failed to start I/O runtime: {}", e)))?;

        Ok(Self {
            runtime: Arc::new(runtime),
        })
    }
}

impl AsyncToSyncBlockOn for RuntimeBlockOn {
    fn block_on<F: core::future::Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }
}

/// Storage type for the remote store (sync adapter over async HTTP).
pub type HttpZarrStorage = AsyncToSyncStorageAdapter<AsyncObjectStore<HttpStore>, RuntimeBlockOn>;

/// Create an anonymous HTTP storage backend for Zarr access.
pub fn create_http_storage(config: &SourceConfig) -> Era5Result<Arc<HttpZarrStorage>> {
    config.validate().map_err(Era5Error::connectivity)?;

    let mut options = ClientOptions::new();
    if let Some(secs) = config.timeout_secs {
        options = options.with_timeout(Duration::from_secs(secs));
    }

    let http = HttpBuilder::new()
        .with_url(config.base_url.trim_end_matches('/'))
        .with_client_options(options)
        .build()
        .map_err(|e| {
            Era5Error::connectivity(format!("failed to create HTTP client for {}: {}", config.base_url, e))
        })?;

    let async_store = Arc::new(AsyncObjectStore::new(http));
    let sync_store = AsyncToSyncStorageAdapter::new(async_store, RuntimeBlockOn::new()?);

    Ok(Arc::new(sync_store))
}

/// Open the configured remote store as an [`ZarrEra5Source`].
pub fn open_remote(config: &SourceConfig) -> Era5Result<ZarrEra5Source<HttpZarrStorage>> {
    let storage = create_http_storage(config)?;
    Ok(ZarrEra5Source::new(storage, config.base_url.clone()))
}
