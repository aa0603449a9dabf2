//! Per-process persisted settings
//!
//! Each process owns one flat JSON object keyed by component id (or any other
//! key the process chooses). `set` writes through to the backing file so a
//! crash never loses an accepted change.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::{Map, Value as JsonValue};
use tracing::{debug, warn};

use crate::error::SettingsError;

/// Key-value store scoped to one process
pub trait SettingsStore: Send + Sync {
    /// Stored value for `key`, or `default` if absent
    fn get(&self, key: &str, default: JsonValue) -> JsonValue;

    /// Store a value and write it through
    fn set(&self, key: &str, value: JsonValue) -> Result<(), SettingsError>;

    /// Flush the whole document
    fn save(&self) -> Result<(), SettingsError>;
}

/// Opens the settings store for a process id
pub trait SettingsBackend: Send + Sync {
    fn open(&self, process_id: &str) -> Result<Arc<dyn SettingsStore>, SettingsError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// JSON File Store
// ─────────────────────────────────────────────────────────────────────────────

/// One JSON document on disk
pub struct JsonFileStore {
    path: PathBuf,
    process_id: String,
    document: Mutex<Map<String, JsonValue>>,
}

impl JsonFileStore {
    /// Open (or lazily create) the document at `path`
    pub fn open(path: impl Into<PathBuf>, process_id: &str) -> Result<Self, SettingsError> {
        let path = path.into();

        let document = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                Map::new()
            } else {
                match serde_json::from_str::<JsonValue>(&content)? {
                    JsonValue::Object(map) => map,
                    _ => return Err(SettingsError::NotAnObject(process_id.to_string())),
                }
            }
        } else {
            debug!(path = %path.display(), "No settings file yet");
            Map::new()
        };

        Ok(Self {
            path,
            process_id: process_id.to_string(),
            document: Mutex::new(document),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_document(&self, document: &Map<String, JsonValue>) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(document)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.path)?;

        debug!(process_id = %self.process_id, path = %self.path.display(), "Saved settings");
        Ok(())
    }
}

impl SettingsStore for JsonFileStore {
    fn get(&self, key: &str, default: JsonValue) -> JsonValue {
        self.document.lock().get(key).cloned().unwrap_or(default)
    }

    fn set(&self, key: &str, value: JsonValue) -> Result<(), SettingsError> {
        let mut document = self.document.lock();
        if document.get(key) == Some(&value) {
            return Ok(());
        }
        document.insert(key.to_string(), value);
        self.write_document(&document)
    }

    fn save(&self) -> Result<(), SettingsError> {
        let document = self.document.lock();
        self.write_document(&document)
    }
}

/// Stores one `<process_id>.json` per process under a directory
pub struct JsonDirectory {
    dir: PathBuf,
    stores: DashMap<String, Arc<JsonFileStore>>,
}

impl JsonDirectory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            stores: DashMap::new(),
        }
    }

    /// File holding a process's settings. Path separators in the id are
    /// flattened to dots.
    pub fn path_for(&self, process_id: &str) -> PathBuf {
        let file = process_id.replace(['/', '\\'], ".");
        self.dir.join(format!("{}.json", file))
    }
}

impl SettingsBackend for JsonDirectory {
    fn open(&self, process_id: &str) -> Result<Arc<dyn SettingsStore>, SettingsError> {
        if let Some(store) = self.stores.get(process_id) {
            let store: Arc<dyn SettingsStore> = Arc::clone(store.value()) as Arc<dyn SettingsStore>;
            return Ok(store);
        }

        let store = Arc::new(JsonFileStore::open(self.path_for(process_id), process_id)?);
        self.stores.insert(process_id.to_string(), Arc::clone(&store));
        Ok(store)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Memory Store
// ─────────────────────────────────────────────────────────────────────────────

/// Non-persistent store, used in tests and for throwaway processes
#[derive(Default)]
pub struct MemoryStore {
    document: Mutex<Map<String, JsonValue>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemoryStore {
    fn get(&self, key: &str, default: JsonValue) -> JsonValue {
        self.document.lock().get(key).cloned().unwrap_or(default)
    }

    fn set(&self, key: &str, value: JsonValue) -> Result<(), SettingsError> {
        self.document.lock().insert(key.to_string(), value);
        Ok(())
    }

    fn save(&self) -> Result<(), SettingsError> {
        Ok(())
    }
}

/// Hands out one [`MemoryStore`] per process id
#[derive(Default)]
pub struct MemoryBackend {
    stores: DashMap<String, Arc<MemoryStore>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsBackend for MemoryBackend {
    fn open(&self, process_id: &str) -> Result<Arc<dyn SettingsStore>, SettingsError> {
        let store: Arc<dyn SettingsStore> = self
            .stores
            .entry(process_id.to_string())
            .or_insert_with(|| Arc::new(MemoryStore::new()))
            .clone();
        Ok(store)
    }
}

/// Write a value through, logging instead of failing. Used from listeners.
pub(crate) fn persist_quietly(store: &dyn SettingsStore, key: &str, value: JsonValue) {
    if let Err(e) = store.set(key, value) {
        warn!(key, error = %e, "Failed to persist setting");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_set_writes_through() {
        let temp = TempDir::new().unwrap();
        let backend = JsonDirectory::new(temp.path());

        let store = backend.open("processes/still").unwrap();
        assert_eq!(store.get("boil_temp", json!(98)), json!(98));
        store.set("boil_temp", json!(97.5)).unwrap();

        let path = temp.path().join("processes.still.json");
        let content = std::fs::read_to_string(&path).unwrap();
        let doc: JsonValue = serde_json::from_str(&content).unwrap();
        assert_eq!(doc["boil_temp"], json!(97.5));
    }

    #[test]
    fn test_reopen_restores_values() {
        let temp = TempDir::new().unwrap();
        {
            let backend = JsonDirectory::new(temp.path());
            let store = backend.open("resources").unwrap();
            store.set("pump_assignment", json!("RELAY_1A_0")).unwrap();
        }

        let backend = JsonDirectory::new(temp.path());
        let store = backend.open("resources").unwrap();
        assert_eq!(store.get("pump_assignment", json!("")), json!("RELAY_1A_0"));
    }

    #[test]
    fn test_rejects_non_object_document() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.json");
        std::fs::write(&path, "[1, 2, 3]").unwrap();

        let result = JsonFileStore::open(&path, "bad");
        assert!(matches!(result, Err(SettingsError::NotAnObject(_))));
    }

    #[test]
    fn test_memory_backend_shares_store_per_id() {
        let backend = MemoryBackend::new();
        backend.open("a").unwrap().set("x", json!(1)).unwrap();
        assert_eq!(backend.open("a").unwrap().get("x", json!(0)), json!(1));
        assert_eq!(backend.open("b").unwrap().get("x", json!(0)), json!(0));
    }
}
