//! Persistence of per-name throttle snapshots.
//!
//! The throttle reads a snapshot once at construction to resolve configuration it was not given
//! explicitly, and writes one every `interval` invocations. Anything that can look up and replace
//! a record by name can serve as a store; [`MemoryStorage`] is the in-process reference
//! implementation.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::StorageError;

/// Name of the entry [`MemoryStorage::new`] is seeded with.
pub const EXAMPLE_ENTRY: &str = "name:example-throttle";

/// Persisted state of one throttle.
///
/// Every field is optional so that hand-written or partially populated records can be stored;
/// records written by the throttle itself always carry all of them.
#[derive(Copy, Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Snapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sleep: Option<f64>,
    #[serde(
        default,
        deserialize_with = "truncating_count",
        skip_serializing_if = "Option::is_none"
    )]
    pub interval: Option<u64>,
    #[serde(
        default,
        deserialize_with = "truncating_count",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_rate: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updates: Option<u64>,
}

/// Reads a count written either as an integer or as a float (`5.0`), truncating the latter.
/// Negative, non-finite and non-numeric values are rejected.
fn truncating_count<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(serde::Deserialize)]
    #[serde(untagged)]
    enum Count {
        Integer(u64),
        Float(f64),
    }

    match <Option<Count> as serde::Deserialize>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Count::Integer(count)) => Ok(Some(count)),
        Some(Count::Float(count)) if count.is_finite() && count >= 0.0 => {
            Ok(Some(count.trunc() as u64))
        }
        Some(Count::Float(count)) => Err(serde::de::Error::custom(format!(
            "expected a non-negative count, got {count}"
        ))),
    }
}

impl From<&crate::State> for Snapshot {
    fn from(state: &crate::State) -> Self {
        Self {
            sleep: Some(state.sleep()),
            interval: Some(state.interval()),
            max_rate: Some(state.max_rate()),
            delta: Some(state.delta()),
            rate: Some(state.rate()),
            updates: Some(state.update_count()),
        }
    }
}

/// Key-value store for [`Snapshot`]s.
///
/// Implementations must report an unknown name as `Ok(None)`, never as an error. Errors are
/// reserved for the backing medium failing, and the throttle passes them on to its caller as-is.
pub trait Storage: Send + Sync {
    /// Returns the snapshot stored under `name`, or `None` if there is none.
    fn get(&self, name: &str) -> Result<Option<Snapshot>, StorageError>;

    /// Replaces (or creates) the snapshot stored under `name`.
    fn save(&self, name: &str, entry: Snapshot) -> Result<(), StorageError>;

    /// Returns the snapshot stored under `name`, or `default` if there is none. Unknown names
    /// are never an error.
    fn get_or(&self, name: &str, default: Snapshot) -> Result<Snapshot, StorageError> {
        Ok(self.get(name)?.unwrap_or(default))
    }
}

/// Process-local store. Not durable across restarts.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, Snapshot>>,
}

impl MemoryStorage {
    /// Creates a store holding one example entry under [`EXAMPLE_ENTRY`].
    pub fn new() -> Self {
        let storage = Self::empty();
        storage.insert(
            EXAMPLE_ENTRY,
            Snapshot {
                sleep: Some(crate::DEFAULT_SLEEP * 100.0),
                interval: Some(crate::DEFAULT_INTERVAL),
                ..Default::default()
            },
        );
        storage
    }

    pub fn empty() -> Self {
        Self::default()
    }

    fn insert(&self, name: &str, entry: Snapshot) {
        self.lock().insert(name.to_string(), entry);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Snapshot>> {
        // a panic mid-insert cannot leave a HashMap entry half written
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn entry(&self, name: &str) -> Option<Snapshot> {
        self.lock().get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, name: &str) -> Result<Option<Snapshot>, StorageError> {
        Ok(self.entry(name))
    }

    fn save(&self, name: &str, entry: Snapshot) -> Result<(), StorageError> {
        self.insert(name, entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_with_example_entry() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.len(), 1);
        let entry = storage.entry(EXAMPLE_ENTRY).unwrap();
        assert_eq!(entry.interval, Some(1000));
        assert!((entry.sleep.unwrap() - 0.1).abs() < 1e-12);
        assert_eq!(entry.max_rate, None);
        assert!(MemoryStorage::empty().is_empty());
    }

    #[test]
    fn unknown_name_returns_default() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.get("missing").unwrap(), None);
        let default = Snapshot {
            interval: Some(7),
            ..Default::default()
        };
        assert_eq!(storage.get_or("missing", default).unwrap(), default);
    }

    #[test]
    fn save_replaces_whole_entry() {
        let storage = MemoryStorage::empty();
        let first = Snapshot {
            sleep: Some(0.5),
            rate: Some(3.0),
            ..Default::default()
        };
        storage.save("a", first).unwrap();
        let second = Snapshot {
            interval: Some(2),
            ..Default::default()
        };
        storage.save("a", second).unwrap();
        assert_eq!(storage.get("a").unwrap(), Some(second));
        assert_eq!(storage.get("b").unwrap(), None);
    }

    #[test]
    fn snapshot_skips_absent_fields() {
        let snapshot = Snapshot {
            sleep: Some(0.1),
            interval: Some(1000),
            ..Default::default()
        };
        let json = serde_json::to_string(&snapshot).unwrap();
        assert_eq!(json, r#"{"sleep":0.1,"interval":1000}"#);
        let parsed: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, snapshot);
    }

    #[test]
    fn float_counts_are_truncated() {
        let parsed: Snapshot =
            serde_json::from_str(r#"{"interval": 5.0, "max_rate": 100.9}"#).unwrap();
        assert_eq!(parsed.interval, Some(5));
        assert_eq!(parsed.max_rate, Some(100));
        let parsed: Snapshot = serde_json::from_str(r#"{"interval": null}"#).unwrap();
        assert_eq!(parsed.interval, None);
    }

    #[test]
    fn non_numeric_or_negative_counts_are_rejected() {
        for text in [
            r#"{"interval": "often"}"#,
            r#"{"interval": true}"#,
            r#"{"max_rate": -5}"#,
            r#"{"max_rate": -0.5}"#,
        ] {
            assert!(serde_json::from_str::<Snapshot>(text).is_err(), "{text}");
        }
    }
}
