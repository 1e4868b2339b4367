//! Local persistence: a directory of JSON documents, one per key.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::models::Prospect;
use crate::store::RecordSource;

pub const PROSPECTS_KEY: &str = "simpler_crm_prospects";
pub const SETTINGS_KEY: &str = "simpler_crm_settings";

#[derive(Debug, Clone)]
pub struct KeyValueStore {
    dir: PathBuf,
}

impl KeyValueStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Replaces the value for `key`. The new document is written beside the
    /// old one and renamed over it, so readers see either version whole.
    pub fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        let mut file = tempfile::NamedTempFile::new_in(&self.dir)?;
        file.write_all(value.as_bytes())?;
        file.as_file().sync_all()?;
        file.persist(self.path(key))?;
        debug!("Wrote {} bytes to {}", value.len(), key);
        Ok(())
    }

    /// Reads and decodes `key`. Missing or undecodable documents yield `None`.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let contents = match self.get(key) {
            Ok(Some(contents)) => contents,
            Ok(None) => return None,
            Err(err) => {
                warn!("Failed to read {}: {}", key, err);
                return None;
            }
        };
        match serde_json::from_str(&contents) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!("Ignoring unreadable {}: {}", key, err);
                None
            }
        }
    }

    pub fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let json = serde_json::to_string(value)?;
        self.set(key, &json)
    }
}

/// The full prospect collection, saved as a single JSON array.
#[derive(Debug, Clone)]
pub struct DurableCache {
    storage: KeyValueStore,
    key: String,
}

impl DurableCache {
    pub fn new(storage: KeyValueStore) -> Self {
        Self {
            storage,
            key: PROSPECTS_KEY.to_string(),
        }
    }

    /// Every saved prospect, or an empty list when nothing usable is stored.
    pub fn load(&self) -> Vec<Prospect> {
        self.storage.get_json(&self.key).unwrap_or_default()
    }

    pub fn save(&self, records: &[Prospect]) -> Result<(), StoreError> {
        self.storage.set_json(&self.key, records)
    }
}

#[async_trait]
impl RecordSource for DurableCache {
    fn name(&self) -> &'static str {
        "local cache"
    }

    async fn fetch_all(&self) -> Result<Vec<Prospect>, StoreError> {
        Ok(self.load())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::prospect;

    #[test]
    fn load_is_empty_before_first_save() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DurableCache::new(KeyValueStore::new(dir.path()));
        assert!(cache.load().is_empty());
    }

    #[test]
    fn save_replaces_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DurableCache::new(KeyValueStore::new(dir.path()));

        cache
            .save(&[prospect("a", "Alpha"), prospect("b", "Beta")])
            .unwrap();
        cache.save(&[prospect("c", "Gamma")]).unwrap();

        let loaded = cache.load();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "c");
    }

    #[test]
    fn snapshot_survives_a_new_handle() {
        let dir = tempfile::tempdir().unwrap();
        let records = vec![prospect("a", "Alpha"), prospect("b", "Beta")];
        DurableCache::new(KeyValueStore::new(dir.path()))
            .save(&records)
            .unwrap();

        let reopened = DurableCache::new(KeyValueStore::new(dir.path()));
        assert_eq!(reopened.load(), records);
    }

    #[test]
    fn corrupt_snapshot_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = KeyValueStore::new(dir.path());
        storage.set(PROSPECTS_KEY, "{not json").unwrap();

        let cache = DurableCache::new(storage);
        assert!(cache.load().is_empty());
    }

    #[test]
    fn snapshot_is_stored_under_its_key() {
        let dir = tempfile::tempdir().unwrap();
        let storage = KeyValueStore::new(dir.path());
        DurableCache::new(storage.clone())
            .save(&[prospect("a", "Alpha")])
            .unwrap();

        let raw = storage.get(PROSPECTS_KEY).unwrap().unwrap();
        assert!(raw.starts_with('['));
        assert!(raw.contains("\"companyName\":\"Alpha\""));
        assert!(dir.path().join("simpler_crm_prospects.json").exists());
    }

    #[tokio::test]
    async fn fetch_all_reads_the_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DurableCache::new(KeyValueStore::new(dir.path()));
        cache.save(&[prospect("a", "Alpha")]).unwrap();

        let records = cache.fetch_all().await.unwrap();
        assert_eq!(records[0].id, "a");
    }
}
