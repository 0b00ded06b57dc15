//! File-backed snapshot of the remote domain index.
//!
//! The snapshot is plain JSON holding only the extracted [`DomainIndex`]
//! fields. It is replaced wholesale, never edited in place.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use era5_common::{DomainIndex, Era5Error, Era5Result, Era5Source};
use tracing::{debug, info};

pub struct DomainIndexCache {
    snapshot_path: PathBuf,
}

impl DomainIndexCache {
    pub fn new(snapshot_path: impl Into<PathBuf>) -> Self {
        Self {
            snapshot_path: snapshot_path.into(),
        }
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    /// The local domain index, fetched from `source` and persisted when no
    /// snapshot exists yet.
    pub fn get_domain_index<S: Era5Source + ?Sized>(&self, source: &S) -> Era5Result<DomainIndex> {
        if let Some(domain) = self.load_snapshot()? {
            return Ok(domain);
        }

        info!(path = %self.snapshot_path.display(), "No domain snapshot, loading from remote");
        let domain = source.load_domain()?;
        self.save_snapshot(&domain)?;
        Ok(domain)
    }

    /// Refetch the snapshot if the remote reports a later end of data.
    ///
    /// Only the lightweight attribute record is read unless a refresh is
    /// needed. Returns whether the snapshot was replaced. Without a local
    /// snapshot there is nothing to compare and nothing is fetched.
    pub fn refresh_if_stale<S: Era5Source + ?Sized>(&self, source: &S) -> Era5Result<bool> {
        let Some(local) = self.load_snapshot()? else {
            return Ok(false);
        };

        let remote = source.fetch_attributes()?;
        if remote.valid_time_stop <= local.valid_time_stop {
            debug!(
                local = %local.valid_time_stop,
                remote = %remote.valid_time_stop,
                "Domain snapshot is current"
            );
            return Ok(false);
        }

        info!(
            local = %local.valid_time_stop,
            remote = %remote.valid_time_stop,
            "Remote data advanced, refreshing domain snapshot"
        );
        self.remove_snapshot()?;
        let domain = source.load_domain()?;
        self.save_snapshot(&domain)?;
        Ok(true)
    }

    fn load_snapshot(&self) -> Era5Result<Option<DomainIndex>> {
        let bytes = match fs::read(&self.snapshot_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Era5Error::filesystem(&self.snapshot_path, e)),
        };

        let domain = serde_json::from_slice(&bytes).map_err(|e| {
            Era5Error::Serialization(format!(
                "domain snapshot {} is unreadable: {}",
                self.snapshot_path.display(),
                e
            ))
        })?;
        Ok(Some(domain))
    }

    fn save_snapshot(&self, domain: &DomainIndex) -> Era5Result<()> {
        if let Some(parent) = self.snapshot_path.parent() {
            fs::create_dir_all(parent).map_err(|e| Era5Error::filesystem(parent, e))?;
        }

        let json = serde_json::to_vec(domain)?;
        let tmp = self.snapshot_path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| Era5Error::filesystem(&tmp, e))?;
        fs::rename(&tmp, &self.snapshot_path)
            .map_err(|e| Era5Error::filesystem(&self.snapshot_path, e))?;

        debug!(
            path = %self.snapshot_path.display(),
            variables = domain.variables.len(),
            "Saved domain snapshot"
        );
        Ok(())
    }

    fn remove_snapshot(&self) -> Era5Result<()> {
        match fs::remove_file(&self.snapshot_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Era5Error::filesystem(&self.snapshot_path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::{date, SyntheticSource};

    fn cache_in(dir: &tempfile::TempDir) -> DomainIndexCache {
        DomainIndexCache::new(dir.path().join("asset").join("full_era5.json"))
    }

    #[test]
    fn test_first_access_fetches_once_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        let source = SyntheticSource::new();

        let first = cache.get_domain_index(&source).unwrap();
        let second = cache.get_domain_index(&source).unwrap();

        assert_eq!(first, second);
        assert_eq!(source.domain_loads(), 1);
        assert!(cache.snapshot_path().exists());
    }

    #[test]
    fn test_refresh_without_snapshot_does_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        let source = SyntheticSource::new();

        assert!(!cache.refresh_if_stale(&source).unwrap());
        assert_eq!(source.attribute_fetches(), 0);
        assert_eq!(source.domain_loads(), 0);
    }

    #[test]
    fn test_refresh_when_remote_advances() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        let source = SyntheticSource::new();
        cache.get_domain_index(&source).unwrap();

        assert!(!cache.refresh_if_stale(&source).unwrap());
        assert_eq!(source.domain_loads(), 1);

        source.advance_valid_time_stop(date(2023, 1, 5));
        assert!(cache.refresh_if_stale(&source).unwrap());
        assert_eq!(source.domain_loads(), 2);

        let domain = cache.get_domain_index(&source).unwrap();
        assert_eq!(domain.valid_time_stop, date(2023, 1, 5));
        assert_eq!(source.domain_loads(), 2);
    }

    #[test]
    fn test_unreachable_remote_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        let source = SyntheticSource::new();
        cache.get_domain_index(&source).unwrap();

        source.set_unreachable(true);
        let err = cache.refresh_if_stale(&source).unwrap_err();
        assert!(matches!(err, Era5Error::Connectivity(_)));
    }

    #[test]
    fn test_corrupt_snapshot_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(&dir);
        fs::create_dir_all(cache.snapshot_path().parent().unwrap()).unwrap();
        fs::write(cache.snapshot_path(), b"not json").unwrap();

        let source = SyntheticSource::new();
        assert!(cache.get_domain_index(&source).is_err());
        assert_eq!(source.domain_loads(), 0);
    }
}
