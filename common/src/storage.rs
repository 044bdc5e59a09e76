//! JSON file backed throttle storage.
//!
//! The file holds one JSON object mapping throttle names to snapshots:
//!
//! ```text
//! {
//!   "api.example.com": { "sleep": 0.02, "interval": 100, "max_rate": 50, ... },
//!   "default": { "sleep": 0.001, "interval": 1000 }
//! }
//! ```
//!
//! Saves rewrite the whole file through a temporary sibling and a rename, so a reader never sees
//! a partially written file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use throttle::{Snapshot, Storage, StorageError};
use tracing::{debug, instrument};

type Entries = BTreeMap<String, Snapshot>;

#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    // serializes read-modify-write cycles of throttles sharing this store
    write_lock: Mutex<()>,
}

impl FileStorage {
    /// Store backed by `path`. The file is created on the first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Result<Entries, StorageError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Entries::new());
            }
            Err(error) => return Err(error.into()),
        };
        if text.trim().is_empty() {
            return Ok(Entries::new());
        }
        serde_json::from_str(&text).map_err(|error| StorageError::Format {
            name: self.path.display().to_string(),
            reason: error.to_string(),
        })
    }

    fn write_entries(&self, entries: &Entries) -> Result<(), StorageError> {
        let text = serde_json::to_string_pretty(entries).map_err(|error| StorageError::Format {
            name: self.path.display().to_string(),
            reason: error.to_string(),
        })?;
        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);
        std::fs::write(&tmp_path, text)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

impl Storage for FileStorage {
    fn get(&self, name: &str) -> Result<Option<Snapshot>, StorageError> {
        Ok(self.read_entries()?.remove(name))
    }

    #[instrument(skip(self, entry), fields(path = %self.path.display()))]
    fn save(&self, name: &str, entry: Snapshot) -> Result<(), StorageError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| StorageError::Unavailable("file storage lock poisoned".to_string()))?;
        let mut entries = self.read_entries()?;
        entries.insert(name.to_string(), entry);
        self.write_entries(&entries)?;
        debug!("saved snapshot for {:?}", name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;
    use tracing_test::traced_test;

    fn snapshot(sleep: f64, interval: u64) -> Snapshot {
        Snapshot {
            sleep: Some(sleep),
            interval: Some(interval),
            max_rate: Some(0),
            delta: Some(0.0),
            rate: Some(0.0),
            updates: Some(interval),
        }
    }

    #[test]
    fn missing_file_has_no_entries() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let storage = FileStorage::new(dir.path().join("throttles.json"));
        assert_eq!(storage.get("default")?, None);
        assert_eq!(
            storage.get_or("default", snapshot(1.0, 1))?,
            snapshot(1.0, 1)
        );
        Ok(())
    }

    #[test]
    #[traced_test]
    fn save_then_get_round_trips() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let storage = FileStorage::new(dir.path().join("throttles.json"));
        storage.save("a", snapshot(0.25, 10))?;
        storage.save("b", snapshot(0.5, 20))?;
        storage.save("a", snapshot(0.75, 30))?;
        assert_eq!(storage.get("a")?, Some(snapshot(0.75, 30)));
        assert_eq!(storage.get("b")?, Some(snapshot(0.5, 20)));
        // a fresh handle on the same file sees the same records
        let reopened = FileStorage::new(storage.path());
        assert_eq!(reopened.get("b")?, Some(snapshot(0.5, 20)));
        assert!(!dir.path().join("throttles.json.tmp").exists());
        assert!(logs_contain("saved snapshot for \"a\""));
        Ok(())
    }

    proptest! {
        #[test]
        fn saved_floats_read_back_exactly(
            sleep in any::<f64>().prop_filter("finite", |v| v.is_finite()),
            delta in any::<f64>().prop_filter("finite", |v| v.is_finite()),
            rate in 0.0f64..1e9,
        ) {
            let dir = tempfile::tempdir().unwrap();
            let storage = FileStorage::new(dir.path().join("throttles.json"));
            let entry = Snapshot {
                sleep: Some(sleep),
                delta: Some(delta),
                rate: Some(rate),
                ..snapshot(0.0, 1)
            };
            storage.save("x", entry).unwrap();
            prop_assert_eq!(storage.get("x").unwrap(), Some(entry));
        }
    }

    #[test]
    fn last_digit_sensitive_sleep_survives_the_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let storage = FileStorage::new(dir.path().join("throttles.json"));
        // 0.30000000000000004 needs all 17 significant digits to read back
        let sleep = 0.1 + 0.2;
        let entry = Snapshot {
            sleep: Some(sleep),
            ..Default::default()
        };
        storage.save("x", entry)?;
        assert_eq!(storage.get("x")?.and_then(|entry| entry.sleep), Some(sleep));
        Ok(())
    }

    #[test]
    fn float_counts_in_file_are_truncated() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("throttles.json");
        std::fs::write(
            &path,
            r#"{"by-hand": {"sleep": 0.5, "interval": 5.0, "max_rate": 100.0}}"#,
        )?;
        let storage = Arc::new(FileStorage::new(&path));
        let throttle = throttle::Throttle::builder()
            .name("by-hand")
            .storage(storage)
            .build()?;
        assert_eq!(throttle.interval(), 5);
        assert_eq!(throttle.max_rate(), 100);
        Ok(())
    }

    #[test]
    fn corrupt_file_is_a_format_error() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("throttles.json");
        std::fs::write(&path, "{ not json")?;
        let storage = FileStorage::new(&path);
        assert!(matches!(
            storage.get("default"),
            Err(StorageError::Format { .. })
        ));
        assert!(matches!(
            storage.save("default", snapshot(0.1, 1)),
            Err(StorageError::Format { .. })
        ));
        Ok(())
    }

    #[test]
    fn unwritable_location_is_an_io_error() {
        let storage = FileStorage::new("/nonexistent-dir/throttles.json");
        assert!(matches!(
            storage.save("default", snapshot(0.1, 1)),
            Err(StorageError::Io(_))
        ));
    }

    #[test]
    fn throttle_resumes_from_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let storage = Arc::new(FileStorage::new(dir.path().join("throttles.json")));
        let mut first = throttle::Throttle::builder()
            .name("file-backed")
            .interval(3)
            .max_rate(250)
            .storage(storage.clone())
            .build()?;
        first.scoped(|inner| -> throttle::Result<()> {
            inner.sleep()?;
            inner.sleep()?;
            Ok(())
        })?;
        let second = throttle::Throttle::builder()
            .name("file-backed")
            .storage(storage.clone())
            .build()?;
        assert_eq!(second.interval(), 3);
        assert_eq!(second.max_rate(), 250);
        assert_eq!(Some(second.state().sleep()), storage.get("file-backed")?.unwrap().sleep);
        Ok(())
    }
}
