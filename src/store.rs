use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::models::WeekKey;

pub const CREATED_DATES: &str = "createdDates";
pub const MANUAL_SCORES: &str = "manualScores";
pub const SCHEMA_VERSION: &str = "schemaVersion";

pub const TABLES_PREFIX: &str = "tables_";
pub const VISITOR_TABLES_PREFIX: &str = "visitorTables_";
pub const SCORE_SETTINGS_PREFIX: &str = "scoreSettings_";
pub const SCORE_ROWS_PREFIX: &str = "scoreRows_";
pub const OFFERING_TABLE_PREFIX: &str = "offeringTable_";

/// Every per-week partition prefix.
pub const WEEK_PREFIXES: [&str; 5] = [
    TABLES_PREFIX,
    VISITOR_TABLES_PREFIX,
    SCORE_SETTINGS_PREFIX,
    SCORE_ROWS_PREFIX,
    OFFERING_TABLE_PREFIX,
];

pub fn week_key(prefix: &str, week: WeekKey) -> String {
    format!("{prefix}{week}")
}

/// Durable string-keyed storage supplied by the host.
pub trait RecordStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&mut self, key: &str, value: String) -> Result<(), StoreError>;
    fn remove(&mut self, key: &str) -> Result<(), StoreError>;
    fn keys(&self) -> Result<Vec<String>, StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to encode record '{key}'")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A pending write recorded by [`MemoryStore`]; `None` marks a removal.
pub type Change = (String, Option<String>);

/// In-process store that remembers which keys changed so adapters can flush them.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: BTreeMap<String, String>,
    changes: BTreeMap<String, Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads existing records without marking them as changed.
    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Self {
            records: records.into_iter().collect(),
            changes: BTreeMap::new(),
        }
    }

    pub fn records(&self) -> &BTreeMap<String, String> {
        &self.records
    }

    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    pub fn take_changes(&mut self) -> Vec<Change> {
        std::mem::take(&mut self.changes).into_iter().collect()
    }
}

impl RecordStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.records.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), StoreError> {
        self.records.insert(key.to_string(), value.clone());
        self.changes.insert(key.to_string(), Some(value));
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        if self.records.remove(key).is_some() {
            self.changes.insert(key.to_string(), None);
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.records.keys().cloned().collect())
    }
}

pub fn contains<S: RecordStore + ?Sized>(store: &S, key: &str) -> Result<bool, StoreError> {
    Ok(store.get(key)?.is_some())
}

/// Reads a JSON record. Absent and malformed records both come back as `None`;
/// malformed ones are logged and otherwise ignored.
pub fn load_json<T, S>(store: &S, key: &str) -> Result<Option<T>, StoreError>
where
    T: DeserializeOwned,
    S: RecordStore + ?Sized,
{
    let Some(raw) = store.get(key)? else {
        return Ok(None);
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Ok(Some(value)),
        Err(err) => {
            warn!(%key, error = %err, "discarding malformed record");
            Ok(None)
        }
    }
}

pub fn load_json_or_default<T, S>(store: &S, key: &str) -> Result<T, StoreError>
where
    T: DeserializeOwned + Default,
    S: RecordStore + ?Sized,
{
    Ok(load_json(store, key)?.unwrap_or_default())
}

pub fn save_json<T, S>(store: &mut S, key: &str, value: &T) -> Result<(), StoreError>
where
    T: Serialize + ?Sized,
    S: RecordStore + ?Sized,
{
    let encoded = serde_json::to_string(value).map_err(|source| StoreError::Encode {
        key: key.to_string(),
        source,
    })?;
    store.set(key, encoded)
}

/// The `createdDates` index exactly as stored, in insertion order.
pub fn created_dates<S: RecordStore + ?Sized>(store: &S) -> Result<Vec<String>, StoreError> {
    load_json_or_default(store, CREATED_DATES)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_tracks_sets_and_removals() {
        let mut store = MemoryStore::from_records([("a".to_string(), "1".to_string())]);
        assert!(!store.has_changes());

        store.set("b", "2".to_string()).expect("set");
        store.remove("a").expect("remove");
        store.remove("missing").expect("remove missing");

        let changes = store.take_changes();
        assert_eq!(
            changes,
            vec![
                ("a".to_string(), None),
                ("b".to_string(), Some("2".to_string())),
            ]
        );
        assert_eq!(store.keys().expect("keys"), vec!["b".to_string()]);
        assert!(!store.has_changes());
    }

    #[test]
    fn malformed_json_falls_back_to_default() {
        let mut store = MemoryStore::new();
        store.set(CREATED_DATES, "{not json".to_string()).expect("set");
        assert!(created_dates(&store).expect("load").is_empty());

        let loaded: Option<Vec<String>> = load_json(&store, "absent").expect("load");
        assert!(loaded.is_none());
    }

    #[test]
    fn week_keys_use_prefix_and_display_format() {
        let week = WeekKey::from_ymd(2025, 3, 2).expect("valid date");
        assert_eq!(week_key(SCORE_ROWS_PREFIX, week), "scoreRows_2025.03.02");
    }
}
