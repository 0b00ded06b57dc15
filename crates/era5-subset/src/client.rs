//! The public entrypoints, wired over an explicitly passed source.

use chrono::{DateTime, Utc};
use era5_common::{Dataset, DomainIndex, Era5Error, Era5Result, Era5Source};
use metrics::counter;
use tracing::{debug, info, instrument};

use crate::cache::{cache_key, CacheStore};
use crate::config::Era5Config;
use crate::domain_cache::DomainIndexCache;
use crate::fetch::fetch;
use crate::query::{validate_and_normalize, QueryRequest};

/// Cached subset access to one ERA5 store.
///
/// # Example
///
/// ```rust,ignore
/// let source = era5_source::open_remote(&SourceConfig::from_env())?;
/// let client = Era5Client::new(source, Era5Config::from_env())?;
///
/// let t = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
/// let subset = client.download(&QueryRequest::new(["temperature"], t, t))?;
/// ```
pub struct Era5Client<S> {
    source: S,
    config: Era5Config,
    domain: DomainIndexCache,
    cache: CacheStore,
}

impl<S: Era5Source> Era5Client<S> {
    pub fn new(source: S, config: Era5Config) -> Era5Result<Self> {
        config
            .validate()
            .map_err(|msg| Era5Error::validation("config", msg, "a valid configuration"))?;

        Ok(Self {
            domain: DomainIndexCache::new(config.snapshot_path.clone()),
            cache: CacheStore::new(config.cache_dir.clone(), config.expire_after()),
            source,
            config,
        })
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn config(&self) -> &Era5Config {
        &self.config
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// The current domain index, refreshed first if the remote advanced.
    pub fn domain_index(&self) -> Era5Result<DomainIndex> {
        if self.domain.refresh_if_stale(&self.source)? {
            counter!("era5_domain_refreshes_total").increment(1);
        }
        self.domain.get_domain_index(&self.source)
    }

    /// Return the subset described by `request`, from cache when possible.
    ///
    /// A hit extends the entry's expiry. A miss reads from the source and
    /// stores the result. Expired entries are swept before the source is
    /// read, so nothing the sweep does can fail a completed fetch.
    #[instrument(skip_all, fields(variables = ?request.variables))]
    pub fn download(&self, request: &QueryRequest) -> Era5Result<Dataset> {
        let domain = self.domain_index()?;
        let query = validate_and_normalize(request, &domain)?;
        let key = cache_key(&query);

        let now = Utc::now();
        let expiry = self.cache.expiry_from(now)?;

        match self.cache.find(&key)? {
            Some(entry) if !entry.is_expired(now) => {
                counter!("era5_cache_hits_total").increment(1);
                info!(key = %key, "Cache hit");

                let dataset = self.cache.load(&entry)?;
                self.cache.touch(&entry, expiry)?;
                self.sweep(now)?;
                return Ok(dataset);
            }
            Some(stale) => {
                debug!(path = %stale.path.display(), "Cached entry already expired");
            }
            None => {}
        }

        // Removes the stale entry above along with every other expired one.
        self.sweep(now)?;

        counter!("era5_cache_misses_total").increment(1);
        info!(key = %key, "Cache miss, reading from source");

        let dataset = fetch(&self.source, &query, &domain)?;
        self.cache.persist(&key, &dataset, expiry)?;
        Ok(dataset)
    }

    /// Names of all data variables in the store, sorted.
    pub fn list_variables(&self) -> Era5Result<Vec<String>> {
        Ok(self.domain.get_domain_index(&self.source)?.variable_names())
    }

    /// Delete expired cache entries. Returns how many were removed.
    pub fn evict_expired_cache(&self) -> Era5Result<usize> {
        self.sweep(Utc::now())
    }

    fn sweep(&self, now: DateTime<Utc>) -> Era5Result<usize> {
        let removed = self.cache.sweep(now)?;
        counter!("era5_cache_evictions_total").increment(removed as u64);
        Ok(removed)
    }
}
