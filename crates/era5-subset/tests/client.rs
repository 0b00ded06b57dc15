//! End-to-end behaviour of `Era5Client` over the synthetic source.

use std::fs;
use std::path::PathBuf;

use chrono::{Duration, Utc};
use era5_common::Era5Error;
use era5_subset::{CacheFileName, Era5Client, Era5Config, LevelSelection, QueryRequest};
use test_utils::{date, utc, SyntheticSource};

fn client(dir: &tempfile::TempDir) -> Era5Client<SyntheticSource> {
    Era5Client::new(SyntheticSource::new(), Era5Config::with_data_dir(dir.path())).unwrap()
}

fn cache_files(client: &Era5Client<SyntheticSource>) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = match fs::read_dir(client.cache().dir()) {
        Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
        Err(_) => Vec::new(),
    };
    files.sort();
    files
}

fn single_step() -> QueryRequest {
    let t = utc(2023, 1, 1, 0);
    QueryRequest::new(["temperature"], t, t)
}

#[test]
fn test_single_time_step_download() {
    let dir = tempfile::tempdir().unwrap();
    let client = client(&dir);

    let dataset = client.download(&single_step()).unwrap();

    assert_eq!(dataset.time.len(), 1);
    assert_eq!(dataset.variables.len(), 1);
    assert!(dataset.variables.contains_key("temperature"));
    assert_eq!(cache_files(&client).len(), 1);
}

#[test]
fn test_repeat_download_hits_cache_and_extends_expiry() {
    let dir = tempfile::tempdir().unwrap();
    let client = client(&dir);

    let first = client.download(&single_step()).unwrap();
    let reads = client.source().block_reads();

    // Pull the entry's expiry close so an extension is observable.
    let files = cache_files(&client);
    assert_eq!(files.len(), 1);
    let name = CacheFileName::decode(files[0].file_name().unwrap().to_str().unwrap()).unwrap();
    let soon = CacheFileName::new(name.key.clone(), Utc::now() + Duration::hours(1));
    fs::rename(&files[0], client.cache().dir().join(soon.encode())).unwrap();

    let second = client.download(&single_step()).unwrap();
    assert_eq!(first, second);
    assert_eq!(client.source().block_reads(), reads);

    let files = cache_files(&client);
    assert_eq!(files.len(), 1);
    let extended = CacheFileName::decode(files[0].file_name().unwrap().to_str().unwrap()).unwrap();
    assert_eq!(extended.key, name.key);
    assert!(extended.expiry > soon.expiry + Duration::days(13));
}

#[test]
fn test_variable_order_shares_one_entry() {
    let dir = tempfile::tempdir().unwrap();
    let client = client(&dir);
    let t = utc(2023, 1, 1, 0);

    client
        .download(&QueryRequest::new(["temperature", "geopotential"], t, t))
        .unwrap();
    let reads = client.source().block_reads();
    client
        .download(&QueryRequest::new(["geopotential", "temperature"], t, t))
        .unwrap();

    assert_eq!(client.source().block_reads(), reads);
    assert_eq!(cache_files(&client).len(), 1);
}

#[test]
fn test_expired_entry_is_refetched() {
    let dir = tempfile::tempdir().unwrap();
    let client = client(&dir);

    client.download(&single_step()).unwrap();
    let files = cache_files(&client);
    let name = CacheFileName::decode(files[0].file_name().unwrap().to_str().unwrap()).unwrap();
    let expired = CacheFileName::new(name.key, Utc::now() - Duration::hours(1));
    fs::rename(&files[0], client.cache().dir().join(expired.encode())).unwrap();

    let reads = client.source().block_reads();
    client.download(&single_step()).unwrap();

    assert!(client.source().block_reads() > reads);
    let files = cache_files(&client);
    assert_eq!(files.len(), 1);
    let name = CacheFileName::decode(files[0].file_name().unwrap().to_str().unwrap()).unwrap();
    assert!(name.expiry > Utc::now());
}

#[test]
fn test_invalid_query_never_reaches_source() {
    let dir = tempfile::tempdir().unwrap();
    let client = client(&dir);

    let t = utc(2023, 1, 1, 0);
    let bad = QueryRequest::new(["temperature"], t, t).level(LevelSelection::Single(5000.0));
    let err = client.download(&bad).unwrap_err();

    assert!(err.is_validation());
    assert_eq!(client.source().block_reads(), 0);
    assert!(cache_files(&client).is_empty());
}

#[test]
fn test_source_failure_stores_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let client = client(&dir);
    client.list_variables().unwrap();

    client.source().set_unreachable(true);
    let err = client.download(&single_step()).unwrap_err();

    assert!(matches!(err, Era5Error::Connectivity(_)));
    assert!(cache_files(&client).is_empty());
}

#[test]
fn test_list_variables() {
    let dir = tempfile::tempdir().unwrap();
    let client = client(&dir);

    assert_eq!(
        client.list_variables().unwrap(),
        vec!["2m_temperature", "geopotential", "temperature"]
    );
    assert_eq!(client.source().domain_loads(), 1);
    client.list_variables().unwrap();
    assert_eq!(client.source().domain_loads(), 1);
}

#[test]
fn test_download_refreshes_stale_domain() {
    let dir = tempfile::tempdir().unwrap();
    let client = client(&dir);
    client.download(&single_step()).unwrap();
    assert_eq!(client.source().domain_loads(), 1);

    client.source().advance_valid_time_stop(date(2023, 1, 3));
    let t = utc(2023, 1, 2, 12);
    client
        .download(&QueryRequest::new(["2m_temperature"], t, t))
        .unwrap();
    assert_eq!(client.source().domain_loads(), 2);
}

#[test]
fn test_evict_expired_cache() {
    let dir = tempfile::tempdir().unwrap();
    let client = client(&dir);
    let cache_dir = client.cache().dir().to_path_buf();
    fs::create_dir_all(&cache_dir).unwrap();

    let now = Utc::now();
    let past = CacheFileName::new("era5_past", now - Duration::days(1)).encode();
    let future = CacheFileName::new("era5_future", now + Duration::days(1)).encode();
    let malformed = "era5_broken_20xx0101000000.nc";
    for name in [past.as_str(), future.as_str(), malformed] {
        fs::write(cache_dir.join(name), b"").unwrap();
    }

    assert_eq!(client.evict_expired_cache().unwrap(), 1);
    assert!(!cache_dir.join(&past).exists());
    assert!(cache_dir.join(&future).exists());
    assert!(cache_dir.join(malformed).exists());
}

#[test]
fn test_out_of_range_expiry_is_rejected_not_panicking() {
    let dir = tempfile::tempdir().unwrap();
    for days in [1_000_000_000, i64::MAX] {
        let config = Era5Config {
            expire_days: days,
            ..Era5Config::with_data_dir(dir.path())
        };
        let err = Era5Client::new(SyntheticSource::new(), config)
            .err()
            .expect("expiry out of range");
        assert!(err.is_validation());
    }
}

#[test]
fn test_expired_entries_are_swept_before_the_source_is_read() {
    let dir = tempfile::tempdir().unwrap();
    let client = client(&dir);
    client.list_variables().unwrap();

    let cache_dir = client.cache().dir().to_path_buf();
    fs::create_dir_all(&cache_dir).unwrap();
    let past = CacheFileName::new("era5_past", Utc::now() - Duration::days(1)).encode();
    fs::write(cache_dir.join(&past), b"").unwrap();

    client.source().set_reads_failing(true);
    let err = client.download(&single_step()).unwrap_err();
    assert!(matches!(err, Era5Error::Connectivity(_)));
    assert!(client.source().block_reads() > 0);
    assert!(!cache_dir.join(&past).exists());
    assert_eq!(cache_files(&client), Vec::<PathBuf>::new());
}

#[test]
fn test_leftover_expired_duplicate_does_not_shadow_fresh_entry() {
    let dir = tempfile::tempdir().unwrap();
    let client = client(&dir);
    client.download(&single_step()).unwrap();

    // An expired copy the sweep could not delete sits next to the live entry.
    let files = cache_files(&client);
    let name = CacheFileName::decode(files[0].file_name().unwrap().to_str().unwrap()).unwrap();
    let leftover = CacheFileName::new(name.key.clone(), Utc::now() - Duration::days(30));
    fs::copy(&files[0], client.cache().dir().join(leftover.encode())).unwrap();

    let entry = client.cache().find(&name.key).unwrap().unwrap();
    assert_eq!(entry.name.expiry, name.expiry);

    let reads = client.source().block_reads();
    client.download(&single_step()).unwrap();
    assert_eq!(client.source().block_reads(), reads);
    assert_eq!(cache_files(&client).len(), 1);
}
