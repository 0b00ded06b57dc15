//! On-disk subset cache with sliding expiry.
//!
//! Every entry is a netCDF file named `<key>_<expiry>.nc`, where `expiry` is
//! a UTC `%Y%m%d%H%M%S` timestamp. The expiry lives only in the filename:
//! a hit extends it by renaming the file, and the sweep deletes entries
//! whose encoded expiry has passed. [`CacheFileName`] is the only place the
//! grammar is written or parsed.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use era5_common::{Dataset, Era5Error, Era5Result};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::query::Query;

/// Every cache key starts with this.
pub const KEY_PREFIX: &str = "era5";

const EXPIRY_FORMAT: &str = "%Y%m%d%H%M%S";
const EXTENSION: &str = ".nc";

/// Why a directory entry is not a usable cache filename.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheNameError {
    /// Not written by this cache (wrong prefix or extension).
    #[error("{0} is not a cache file")]
    NotCacheFile(String),

    /// Looks like a cache file but the expiry segment does not parse.
    #[error("cache file {name} has a corrupt expiry segment {segment:?}")]
    CorruptExpiry { name: String, segment: String },
}

/// A parsed `<key>_<expiry>.nc` filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheFileName {
    pub key: String,
    pub expiry: DateTime<Utc>,
}

impl CacheFileName {
    /// Expiry is truncated to whole seconds, the filename's resolution.
    pub fn new(key: impl Into<String>, expiry: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            expiry: expiry.trunc_subsecs(0),
        }
    }

    pub fn encode(&self) -> String {
        format!("{}_{}{}", self.key, self.expiry.format(EXPIRY_FORMAT), EXTENSION)
    }

    /// Parse a filename produced by [`CacheFileName::encode`].
    ///
    /// ```
    /// use era5_subset::{CacheFileName, CacheNameError};
    ///
    /// let name = CacheFileName::decode("era5_x_20240101120000.nc").unwrap();
    /// assert_eq!(name.key, "era5_x");
    ///
    /// assert!(matches!(
    ///     CacheFileName::decode("notes.txt"),
    ///     Err(CacheNameError::NotCacheFile(_))
    /// ));
    /// ```
    pub fn decode(name: &str) -> Result<Self, CacheNameError> {
        let not_cache = || CacheNameError::NotCacheFile(name.to_string());

        let stem = name.strip_suffix(EXTENSION).ok_or_else(not_cache)?;
        if !stem
            .strip_prefix(KEY_PREFIX)
            .is_some_and(|rest| rest.starts_with('_'))
        {
            return Err(not_cache());
        }
        let (key, segment) = stem.rsplit_once('_').ok_or_else(not_cache)?;
        if key.is_empty() {
            return Err(not_cache());
        }

        let expiry = NaiveDateTime::parse_from_str(segment, EXPIRY_FORMAT)
            .ok()
            .filter(|_| segment.len() == 14 && segment.bytes().all(|b| b.is_ascii_digit()))
            .ok_or_else(|| CacheNameError::CorruptExpiry {
                name: name.to_string(),
                segment: segment.to_string(),
            })?;

        Ok(Self {
            key: key.to_string(),
            expiry: expiry.and_utc(),
        })
    }
}

/// Format a coordinate bound for a key. `-0` and `0` render the same.
fn key_number(value: f64) -> String {
    format!("{}", value + 0.0)
}

/// Deterministic cache key of a normalized query.
///
/// Every field that distinguishes two queries appears verbatim, so distinct
/// queries never share a key. Variables are already sorted by
/// normalization, which makes the key independent of request order.
pub fn cache_key(query: &Query) -> String {
    let level = match query.level {
        Some((min, max)) => format!("lev{}-{}", key_number(min), key_number(max)),
        None => "levnone".to_string(),
    };

    format!(
        "{}_{}_{}_{}h_{}_{}_lat{}-{}_lon{}-{}_{}",
        KEY_PREFIX,
        query.from.format("%Y%m%d%H"),
        query.to.format("%Y%m%d%H"),
        query.time_interval,
        query.variables.join("+"),
        level,
        key_number(query.latitude.0),
        key_number(query.latitude.1),
        key_number(query.longitude.0),
        key_number(query.longitude.1),
        query.convention.token(),
    )
}

/// A cache entry found on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub path: PathBuf,
    pub name: CacheFileName,
}

impl CacheEntry {
    fn in_dir(dir: &Path, name: CacheFileName) -> Self {
        Self {
            path: dir.join(name.encode()),
            name,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.name.expiry < now
    }
}

/// The cache directory.
pub struct CacheStore {
    dir: PathBuf,
    expire_after: chrono::Duration,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>, expire_after: chrono::Duration) -> Self {
        Self {
            dir: dir.into(),
            expire_after,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Expiry for an entry created or hit at `now`.
    pub fn expiry_from(&self, now: DateTime<Utc>) -> Era5Result<DateTime<Utc>> {
        now.checked_add_signed(self.expire_after).ok_or_else(|| {
            Era5Error::validation(
                "expire_after",
                self.expire_after,
                format!("an expiry window that keeps {} representable", now),
            )
        })
    }

    /// Parsed names of every file in the cache directory, with failures.
    fn scan(&self) -> Era5Result<Vec<(PathBuf, Result<CacheFileName, CacheNameError>)>> {
        let read_dir = match fs::read_dir(&self.dir) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Era5Error::filesystem(&self.dir, e)),
        };

        let mut entries = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|e| Era5Error::filesystem(&self.dir, e))?;
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            let file_name = entry.file_name();
            let parsed = match file_name.to_str() {
                Some(name) => CacheFileName::decode(name),
                None => Err(CacheNameError::NotCacheFile(file_name.to_string_lossy().into_owned())),
            };
            entries.push((entry.path(), parsed));
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }

    /// The entry stored under `key`, if any.
    ///
    /// Should several exist (two processes racing on a miss, or an expired
    /// entry that could not be removed), the latest expiry wins.
    pub fn find(&self, key: &str) -> Era5Result<Option<CacheEntry>> {
        let matches: Vec<CacheEntry> = self
            .scan()?
            .into_iter()
            .filter_map(|(path, parsed)| parsed.ok().map(|name| CacheEntry { path, name }))
            .filter(|entry| entry.name.key == key)
            .collect();

        if matches.len() > 1 {
            warn!(
                key = %key,
                duplicates = matches.len() - 1,
                "Multiple cache entries for one key, using the latest expiry"
            );
        }
        Ok(matches.into_iter().max_by_key(|entry| entry.name.expiry))
    }

    /// Move `entry` to a new expiry by renaming it.
    pub fn touch(&self, entry: &CacheEntry, expiry: DateTime<Utc>) -> Era5Result<CacheEntry> {
        let renamed = CacheEntry::in_dir(&self.dir, CacheFileName::new(entry.name.key.clone(), expiry));
        if renamed.path != entry.path {
            fs::rename(&entry.path, &renamed.path)
                .map_err(|e| Era5Error::filesystem(&entry.path, e))?;
            debug!(
                from = %entry.path.display(),
                to = %renamed.path.display(),
                "Extended cache entry"
            );
        }
        Ok(renamed)
    }

    /// Write `dataset` as a new entry for `key` expiring at `expiry`.
    ///
    /// The payload is written under a temporary name first, so a partially
    /// written file never carries a cache name.
    pub fn persist(&self, key: &str, dataset: &Dataset, expiry: DateTime<Utc>) -> Era5Result<CacheEntry> {
        fs::create_dir_all(&self.dir).map_err(|e| Era5Error::filesystem(&self.dir, e))?;

        let entry = CacheEntry::in_dir(&self.dir, CacheFileName::new(key, expiry));
        let tmp = self.dir.join(format!(".{}.tmp", entry.name.encode()));

        if let Err(e) = era5_netcdf::write_dataset(&tmp, dataset) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        fs::rename(&tmp, &entry.path).map_err(|e| Era5Error::filesystem(&entry.path, e))?;

        info!(path = %entry.path.display(), "Stored cache entry");
        Ok(entry)
    }

    /// Read an entry's payload.
    pub fn load(&self, entry: &CacheEntry) -> Era5Result<Dataset> {
        era5_netcdf::read_dataset(&entry.path)
    }

    /// Remove an entry.
    pub fn remove(&self, entry: &CacheEntry) -> Era5Result<()> {
        match fs::remove_file(&entry.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Era5Error::filesystem(&entry.path, e)),
        }
    }

    /// Delete every entry whose expiry is strictly before `now`.
    ///
    /// Files that are not cache entries, or whose expiry does not parse, are
    /// left alone. An entry that cannot be deleted is logged and skipped.
    /// Returns the number of entries deleted.
    pub fn sweep(&self, now: DateTime<Utc>) -> Era5Result<usize> {
        let mut removed = 0;
        let mut failed = 0;

        for (path, parsed) in self.scan()? {
            match parsed {
                Ok(name) => {
                    let entry = CacheEntry { path, name };
                    if !entry.is_expired(now) {
                        continue;
                    }
                    match self.remove(&entry) {
                        Ok(()) => {
                            debug!(path = %entry.path.display(), expiry = %entry.name.expiry, "Evicted cache entry");
                            removed += 1;
                        }
                        Err(e) => {
                            warn!(path = %entry.path.display(), error = %e, "Failed to evict expired cache entry");
                            failed += 1;
                        }
                    }
                }
                Err(err @ CacheNameError::NotCacheFile(_)) => {
                    debug!(path = %path.display(), "{}", err);
                }
                Err(err @ CacheNameError::CorruptExpiry { .. }) => {
                    warn!(path = %path.display(), "{}", err);
                }
            }
        }

        if removed > 0 || failed > 0 {
            info!(removed, failed, dir = %self.dir.display(), "Swept expired cache entries");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{validate_and_normalize, LevelSelection, LonConvention, QueryRequest};
    use chrono::Duration;
    use test_utils::{sample_dataset, synthetic_domain, utc};

    fn key_of(request: QueryRequest) -> String {
        cache_key(&validate_and_normalize(&request, &synthetic_domain()).unwrap())
    }

    fn base() -> QueryRequest {
        QueryRequest::new(["temperature", "2m_temperature"], utc(2023, 1, 1, 0), utc(2023, 1, 1, 6))
    }

    #[test]
    fn test_key_ignores_variable_order_and_bound_order() {
        let a = key_of(base());
        let b = key_of(QueryRequest::new(
            ["2m_temperature", "temperature", "temperature"],
            utc(2023, 1, 1, 0),
            utc(2023, 1, 1, 6),
        ));
        assert_eq!(a, b);

        let c = key_of(base().latitude(-90.0, 90.0).level(LevelSelection::Range(1000.0, 1.0)));
        assert_eq!(a, c);

        let d = key_of(base().level(LevelSelection::Range(1000.0, 0.0)));
        assert_eq!(a, d);
    }

    #[test]
    fn test_key_changes_with_every_field() {
        let reference = key_of(base());
        let variants = [
            QueryRequest::new(["temperature"], utc(2023, 1, 1, 0), utc(2023, 1, 1, 6)),
            QueryRequest::new(["temperature", "2m_temperature"], utc(2023, 1, 1, 1), utc(2023, 1, 1, 6)),
            QueryRequest::new(["temperature", "2m_temperature"], utc(2023, 1, 1, 0), utc(2023, 1, 1, 7)),
            base().time_interval(2),
            base().level(LevelSelection::Single(500.0)),
            base().latitude(45.0, -90.0),
            base().longitude(0.0, 270.0),
            base().longitude(0.0, 180.0).convention(LonConvention::Shifted),
        ];

        let mut keys: Vec<String> = variants.into_iter().map(key_of).collect();
        keys.push(reference);
        let total = keys.len();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), total);
    }

    #[test]
    fn test_key_decodes_from_its_filename() {
        let key = key_of(base());
        let name = CacheFileName::new(key.clone(), utc(2023, 2, 1, 12));
        let decoded = CacheFileName::decode(&name.encode()).unwrap();
        assert_eq!(decoded.key, key);
        assert_eq!(decoded.expiry, utc(2023, 2, 1, 12));
    }

    #[test]
    fn test_decode_distinguishes_foreign_and_corrupt_names() {
        assert!(matches!(
            CacheFileName::decode("README.md"),
            Err(CacheNameError::NotCacheFile(_))
        ));
        assert!(matches!(
            CacheFileName::decode("other_20240101000000.nc"),
            Err(CacheNameError::NotCacheFile(_))
        ));
        assert!(matches!(
            CacheFileName::decode("era5_abc_2024013.nc"),
            Err(CacheNameError::CorruptExpiry { .. })
        ));
        assert!(matches!(
            CacheFileName::decode("era5_abc_20241399000000.nc"),
            Err(CacheNameError::CorruptExpiry { .. })
        ));
    }

    #[test]
    fn test_find_requires_exact_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path(), Duration::days(14));

        let long = CacheFileName::new("era5_a_b", utc(2030, 1, 1, 0));
        fs::write(dir.path().join(long.encode()), b"").unwrap();

        assert!(store.find("era5_a").unwrap().is_none());
        assert_eq!(store.find("era5_a_b").unwrap().unwrap().name, long);
    }

    #[test]
    fn test_find_in_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path().join("absent"), Duration::days(14));
        assert!(store.find("era5_x").unwrap().is_none());
        assert_eq!(store.sweep(Utc::now()).unwrap(), 0);
    }

    #[test]
    fn test_touch_renames_without_duplicating() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path(), Duration::days(14));
        let entry = store
            .persist("era5_k", &sample_dataset(&[0.0, 90.0]), utc(2030, 1, 1, 0))
            .unwrap();

        let touched = store.touch(&entry, utc(2030, 2, 1, 0)).unwrap();
        assert!(!entry.path.exists());
        assert!(touched.path.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
        assert_eq!(store.find("era5_k").unwrap().unwrap().name.expiry, utc(2030, 2, 1, 0));

        let loaded = store.load(&touched).unwrap();
        assert_eq!(loaded.longitude, vec![0.0, 90.0]);
    }

    #[test]
    fn test_sweep_removes_only_expired_cache_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path(), Duration::days(14));
        let now = utc(2024, 6, 1, 0);

        let past = CacheFileName::new("era5_old", now - Duration::seconds(1)).encode();
        let future = CacheFileName::new("era5_new", now + Duration::days(1)).encode();
        let at_now = CacheFileName::new("era5_now", now).encode();
        for name in [past.as_str(), future.as_str(), at_now.as_str(), "era5_bad_20241.nc", "notes.txt"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }

        assert_eq!(store.sweep(now).unwrap(), 1);
        assert!(!dir.path().join(&past).exists());
        assert!(dir.path().join(&future).exists());
        assert!(dir.path().join(&at_now).exists());
        assert!(dir.path().join("era5_bad_20241.nc").exists());
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn test_find_prefers_latest_expiry() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path(), Duration::days(14));

        let stale = CacheFileName::new("era5_k", utc(2020, 1, 1, 0));
        let fresh = CacheFileName::new("era5_k", utc(2030, 1, 1, 0));
        for name in [&fresh, &stale] {
            fs::write(dir.path().join(name.encode()), b"").unwrap();
        }

        assert_eq!(store.find("era5_k").unwrap().unwrap().name, fresh);
    }

    #[test]
    fn test_expiry_from_out_of_range_is_an_error() {
        let store = CacheStore::new("unused", Duration::days(14));
        assert!(store.expiry_from(DateTime::<Utc>::MAX_UTC).unwrap_err().is_validation());
        assert_eq!(
            store.expiry_from(utc(2024, 1, 1, 0)).unwrap(),
            utc(2024, 1, 15, 0)
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_sweep_skips_entries_it_cannot_delete() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let cache_dir = dir.path().join("cache");
        fs::create_dir(&cache_dir).unwrap();
        let store = CacheStore::new(&cache_dir, Duration::days(14));
        let now = utc(2024, 6, 1, 0);

        let old = CacheFileName::new("era5_old", now - Duration::days(1)).encode();
        let older = CacheFileName::new("era5_older", now - Duration::days(2)).encode();
        for name in [&old, &older] {
            fs::write(cache_dir.join(name), b"").unwrap();
        }

        fs::set_permissions(&cache_dir, fs::Permissions::from_mode(0o555)).unwrap();
        // Privileged users ignore directory permissions.
        let enforced = fs::write(cache_dir.join("writable"), b"").is_err();
        let swept = store.sweep(now);
        fs::set_permissions(&cache_dir, fs::Permissions::from_mode(0o755)).unwrap();

        if enforced {
            assert_eq!(swept.unwrap(), 0);
            assert!(cache_dir.join(&old).exists());
            assert!(cache_dir.join(&older).exists());
        } else {
            assert_eq!(swept.unwrap(), 2);
        }
    }

    #[test]
    fn test_failed_persist_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path(), Duration::days(14));
        let mut broken = sample_dataset(&[0.0, 90.0]);
        broken.longitude.push(180.0);

        assert!(store.persist("era5_k", &broken, utc(2030, 1, 1, 0)).is_err());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
