//! Durable per-subdomain check history.
//!
//! The record file is a JSON document of the form
//!
//! ```json
//! {
//!   "data": {
//!     "xyz.mooo.com": {
//!       "ip": "1.2.3.4",
//!       "new": "2024-05-01 10:00:00",
//!       "checked": "2024-05-03 10:00:00",
//!       "same_count": 2
//!     }
//!   }
//! }
//! ```
//!
//! with timestamps in local time. It is read once at start and written at most once per
//! run; concurrent runs against the same file are not coordinated.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime, SubsecRound};
use log::{debug, error, warn};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct SubdomainRecord {
    pub ip: Option<String>,
    /// When `ip` last changed to its current value.
    #[serde(rename = "new", with = "timestamp")]
    pub first_seen_at_this_ip: Option<NaiveDateTime>,
    #[serde(rename = "checked", with = "timestamp")]
    pub last_checked_at: Option<NaiveDateTime>,
    /// Checks since `ip` last changed.
    #[serde(rename = "same_count")]
    pub unchanged_count: u64,
}

#[derive(Deserialize)]
struct RecordFile {
    data: BTreeMap<String, SubdomainRecord>,
}

#[derive(Serialize)]
struct RecordFileRef<'a> {
    data: &'a BTreeMap<String, SubdomainRecord>,
}

pub struct RecordStore {
    path: PathBuf,
    records: BTreeMap<String, SubdomainRecord>,
    dirty: bool,
}

impl RecordStore {
    /// Loads the record file, or starts a blank record for each of `subdomains` when
    /// there is no file yet.
    pub fn load<P: AsRef<Path>>(path: P, subdomains: &[String]) -> Result<RecordStore> {
        let path = path.as_ref().to_path_buf();
        let content = match fs::read_to_string(&path) {
            Ok(content) => Some(content),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(source) => return Err(Error::StorageUnavailable { path, source }),
        };

        let mut store = RecordStore {
            path,
            records: BTreeMap::new(),
            dirty: false,
        };
        match content {
            Some(content) => {
                let file: RecordFile =
                    serde_json::from_str(&content).map_err(|source| Error::RecordsMalformed {
                        path: store.path.clone(),
                        source,
                    })?;
                store.records = file.data;
                debug!(
                    "Loaded {} records from {}",
                    store.records.len(),
                    store.path.display()
                );
            }
            None => {
                debug!("No record file at {}, starting fresh", store.path.display());
                for subdomain in subdomains {
                    store.create_subdomain(subdomain)?;
                }
                // A fresh store only becomes worth writing once something is recorded.
                store.dirty = false;
            }
        }
        Ok(store)
    }

    /// Loads the store, runs `f` against it and flushes on the way out, whether `f`
    /// succeeded or not. An error from `f` takes precedence over a flush error.
    pub fn scoped<P, T, F>(path: P, subdomains: &[String], f: F) -> Result<T>
    where
        P: AsRef<Path>,
        F: FnOnce(&mut RecordStore) -> Result<T>,
    {
        let mut store = RecordStore::load(path, subdomains)?;
        let outcome = f(&mut store);
        store.finish(outcome)
    }

    /// Flushes and folds the flush result into `outcome`. A failed flush is reported
    /// here only: the store is marked clean so teardown does not retry it.
    fn finish<T>(&mut self, outcome: Result<T>) -> Result<T> {
        let flushed = self.flush();
        if flushed.is_err() {
            self.dirty = false;
        }
        match outcome {
            Ok(value) => flushed.map(|_| value),
            Err(e) => {
                if let Err(flush_err) = flushed {
                    error!("Failed to save records after an earlier error: {}", flush_err);
                }
                Err(e)
            }
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// All records, sorted by subdomain.
    pub fn records(&self) -> impl Iterator<Item = (&str, &SubdomainRecord)> {
        self.records.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn lookup(&mut self, subdomain: &str) -> &SubdomainRecord {
        self.entry(subdomain)
    }

    fn entry(&mut self, subdomain: &str) -> &mut SubdomainRecord {
        if !self.records.contains_key(subdomain) {
            self.dirty = true;
        }
        self.records.entry(subdomain.to_string()).or_default()
    }

    pub fn create_subdomain(&mut self, subdomain: &str) -> Result<()> {
        if self.records.contains_key(subdomain) {
            return Err(Error::DuplicateSubdomain(subdomain.to_string()));
        }
        self.records
            .insert(subdomain.to_string(), SubdomainRecord::default());
        self.dirty = true;
        Ok(())
    }

    pub fn record_check(&mut self, subdomain: &str, observed_ip: &str) -> &SubdomainRecord {
        // The file keeps whole seconds only.
        let now = Local::now().naive_local().trunc_subsecs(0);
        self.record_check_at(subdomain, observed_ip, now)
    }

    /// Logs one check of `subdomain` at time `at`.
    pub fn record_check_at(
        &mut self,
        subdomain: &str,
        observed_ip: &str,
        at: NaiveDateTime,
    ) -> &SubdomainRecord {
        let record = self.entry(subdomain);
        if record.ip.as_deref() == Some(observed_ip) {
            record.unchanged_count += 1;
        } else {
            record.ip = Some(observed_ip.to_string());
            record.unchanged_count = 0;
            record.first_seen_at_this_ip = Some(at);
        }
        record.last_checked_at = Some(at);
        self.dirty = true;
        &self.records[subdomain]
    }

    /// Writes the records out if anything changed since the last write.
    pub fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            debug!("Records unchanged, not writing {}", self.path.display());
            return Ok(());
        }
        self.write()?;
        self.dirty = false;
        Ok(())
    }

    fn write(&self) -> Result<()> {
        let unavailable = |source: std::io::Error| Error::StorageUnavailable {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(unavailable)?;
            }
        }

        let file = RecordFileRef {
            data: &self.records,
        };
        let json = serde_json::to_string_pretty(&file).map_err(|source| {
            Error::RecordsUnencodable {
                path: self.path.clone(),
                source,
            }
        })?;

        // Write beside the target and rename over it so a crash never leaves half a file.
        let temp_path = self.temp_path();
        fs::write(&temp_path, json).map_err(unavailable)?;
        fs::rename(&temp_path, &self.path).map_err(unavailable)?;

        debug!(
            "Wrote {} records to {}",
            self.records.len(),
            self.path.display()
        );
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone().into_os_string();
        temp.push(".tmp");
        PathBuf::from(temp)
    }
}

impl Drop for RecordStore {
    fn drop(&mut self) {
        if self.is_dirty() {
            warn!(
                "Records dropped with unsaved changes, writing {}",
                self.path.display()
            );
            if let Err(e) = self.flush() {
                error!("Failed to save records: {}", e);
            }
        }
    }
}

/// `YYYY-MM-DD HH:MM:SS` timestamps, `null` when absent.
mod timestamp {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S>(value: &Option<NaiveDateTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(at) => serializer.serialize_some(&at.format(FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer)?
            .map(|s| NaiveDateTime::parse_from_str(&s, FORMAT).map_err(serde::de::Error::custom))
            .transpose()
    }

    pub fn display(value: &Option<NaiveDateTime>) -> Option<String> {
        value.map(|at| at.format(FORMAT).to_string())
    }
}

pub use timestamp::display as format_timestamp;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Timelike};
    use tempfile::tempdir;

    fn at(hour: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(hour, min, 0)
            .unwrap()
    }

    fn subdomains() -> Vec<String> {
        vec!["a.example.com".to_string(), "b.example.com".to_string()]
    }

    #[test]
    fn fresh_store_has_blank_record_per_subdomain() {
        let dir = tempdir().unwrap();
        let store = RecordStore::load(dir.path().join("records.json"), &subdomains()).unwrap();

        let records: Vec<_> = store.records().collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].0, "a.example.com");
        assert_eq!(records[1].0, "b.example.com");
        for (_, record) in records {
            assert_eq!(record, &SubdomainRecord::default());
        }
        assert!(!store.is_dirty());
    }

    #[test]
    fn check_history_follows_ip_changes() {
        let dir = tempdir().unwrap();
        let mut store = RecordStore::load(dir.path().join("records.json"), &subdomains()).unwrap();

        let first = store.record_check_at("a.example.com", "1.2.3.4", at(10, 0)).clone();
        assert_eq!(first.ip.as_deref(), Some("1.2.3.4"));
        assert_eq!(first.unchanged_count, 0);
        assert_eq!(first.first_seen_at_this_ip, Some(at(10, 0)));
        assert_eq!(first.last_checked_at, Some(at(10, 0)));
        assert!(store.is_dirty());

        let second = store.record_check_at("a.example.com", "1.2.3.4", at(10, 5)).clone();
        assert_eq!(second.unchanged_count, 1);
        assert_eq!(second.first_seen_at_this_ip, Some(at(10, 0)));
        assert_eq!(second.last_checked_at, Some(at(10, 5)));

        let third = store.record_check_at("a.example.com", "5.6.7.8", at(10, 10)).clone();
        assert_eq!(third.ip.as_deref(), Some("5.6.7.8"));
        assert_eq!(third.unchanged_count, 0);
        assert_eq!(third.first_seen_at_this_ip, Some(at(10, 10)));
        assert_eq!(third.last_checked_at, Some(at(10, 10)));
    }

    #[test]
    fn repeated_equal_checks_count_up() {
        let dir = tempdir().unwrap();
        let mut store = RecordStore::load(dir.path().join("records.json"), &[]).unwrap();

        for n in 1..=5u32 {
            let record = store.record_check_at("a.example.com", "1.2.3.4", at(11, n));
            assert_eq!(record.unchanged_count, u64::from(n - 1));
            assert_eq!(record.first_seen_at_this_ip, Some(at(11, 1)));
            assert_eq!(record.last_checked_at, Some(at(11, n)));
        }
    }

    #[test]
    fn lookup_creates_once() {
        let dir = tempdir().unwrap();
        let mut store = RecordStore::load(dir.path().join("records.json"), &[]).unwrap();
        assert!(!store.is_dirty());

        assert_eq!(store.lookup("c.example.com"), &SubdomainRecord::default());
        assert!(store.is_dirty());
        store.flush().unwrap();

        assert_eq!(store.lookup("c.example.com"), &SubdomainRecord::default());
        assert!(!store.is_dirty());
    }

    #[test]
    fn explicit_create_rejects_duplicates() {
        let dir = tempdir().unwrap();
        let mut store = RecordStore::load(dir.path().join("records.json"), &subdomains()).unwrap();
        assert!(matches!(
            store.create_subdomain("a.example.com"),
            Err(Error::DuplicateSubdomain(ref s)) if s == "a.example.com"
        ));
        assert!(store.create_subdomain("c.example.com").is_ok());
    }

    #[test]
    fn flush_without_changes_writes_nothing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.json");
        let mut store = RecordStore::load(&path, &subdomains()).unwrap();
        store.flush().unwrap();
        drop(store);
        assert!(!path.exists());
    }

    #[test]
    fn round_trip_reproduces_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("records.json");

        let mut store = RecordStore::load(&path, &subdomains()).unwrap();
        store.record_check_at("a.example.com", "1.2.3.4", at(9, 0));
        store.record_check_at("a.example.com", "1.2.3.4", at(9, 30));
        store.flush().unwrap();
        assert!(!store.is_dirty());
        let before: Vec<(String, SubdomainRecord)> = store
            .records()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        drop(store);

        assert!(!dir.path().join("nested").join("records.json.tmp").exists());
        let reloaded = RecordStore::load(&path, &[]).unwrap();
        let after: Vec<(String, SubdomainRecord)> = reloaded
            .records()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        assert_eq!(before, after);
    }

    #[test]
    fn round_trip_with_wall_clock_checks() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.json");

        let mut store = RecordStore::load(&path, &subdomains()).unwrap();
        let checked = store.record_check("a.example.com", "1.2.3.4").clone();
        assert_eq!(checked.last_checked_at.map(|at| at.nanosecond()), Some(0));
        store.flush().unwrap();
        let before: Vec<(String, SubdomainRecord)> = store
            .records()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        drop(store);

        let reloaded = RecordStore::load(&path, &[]).unwrap();
        let after: Vec<(String, SubdomainRecord)> = reloaded
            .records()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        assert_eq!(before, after);
    }

    #[test]
    fn failed_flush_is_reported_once() {
        let dir = tempdir().unwrap();
        // The parent "directory" is a plain file, so nothing can be written below it.
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "").unwrap();
        let mut store = RecordStore::load(dir.path().join("records.json"), &[]).unwrap();
        store.path = blocker.join("records.json");
        store.record_check_at("a.example.com", "1.2.3.4", at(14, 0));

        let result = store.finish(Ok(()));
        assert!(matches!(result, Err(Error::StorageUnavailable { .. })));
        assert!(!store.is_dirty());

        store.record_check_at("a.example.com", "1.2.3.4", at(14, 5));
        let result: Result<()> =
            store.finish(Err(Error::UnknownSubdomain("b.example.com".to_string())));
        assert!(matches!(result, Err(Error::UnknownSubdomain(_))));
        assert!(!store.is_dirty());
    }

    #[test]
    fn file_format_uses_short_field_names() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.json");
        let mut store = RecordStore::load(&path, &subdomains()).unwrap();
        store.record_check_at("a.example.com", "1.2.3.4", at(8, 15));
        store.flush().unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "data": {
                    "a.example.com": {
                        "ip": "1.2.3.4",
                        "new": "2024-05-01 08:15:00",
                        "checked": "2024-05-01 08:15:00",
                        "same_count": 0
                    },
                    "b.example.com": {
                        "ip": null,
                        "new": null,
                        "checked": null,
                        "same_count": 0
                    }
                }
            })
        );
    }

    #[test]
    fn existing_file_is_not_reseeded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.json");
        fs::write(
            &path,
            r#"{"data": {"z.example.com": {"ip": "9.9.9.9", "new": "2023-01-02 03:04:05", "checked": "2023-01-02 03:04:05", "same_count": 7}}}"#,
        )
        .unwrap();

        let store = RecordStore::load(&path, &subdomains()).unwrap();
        let records: Vec<_> = store.records().collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].0, "z.example.com");
        assert_eq!(records[0].1.unchanged_count, 7);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            RecordStore::load(&path, &[]),
            Err(Error::RecordsMalformed { .. })
        ));
    }

    #[test]
    fn unreadable_path_is_unavailable() {
        let dir = tempdir().unwrap();
        // A directory where the file should be cannot be read as one.
        assert!(matches!(
            RecordStore::load(dir.path(), &[]),
            Err(Error::StorageUnavailable { .. })
        ));
    }

    #[test]
    fn scoped_flushes_even_when_the_body_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.json");

        let result: Result<()> = RecordStore::scoped(&path, &subdomains(), |store| {
            store.record_check_at("a.example.com", "1.2.3.4", at(12, 0));
            Err(Error::UnknownSubdomain("b.example.com".to_string()))
        });
        assert!(matches!(result, Err(Error::UnknownSubdomain(_))));

        let reloaded = RecordStore::load(&path, &[]).unwrap();
        let a = reloaded
            .records()
            .find(|(k, _)| *k == "a.example.com")
            .map(|(_, v)| v.clone())
            .unwrap();
        assert_eq!(a.ip.as_deref(), Some("1.2.3.4"));
    }

    #[test]
    fn dropping_a_dirty_store_saves_it() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.json");
        {
            let mut store = RecordStore::load(&path, &[]).unwrap();
            store.record_check_at("a.example.com", "1.2.3.4", at(13, 0));
        }
        assert!(path.exists());
    }
}
