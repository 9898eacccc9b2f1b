use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::SessionStoreError;

/// String-valued persisted state.
pub trait KeyValueStore: Send + Sync + 'static {
    fn get(&self, key: &str) -> Result<Option<String>, SessionStoreError>;

    fn set(&self, key: &str, value: &str) -> Result<(), SessionStoreError>;
}

/// JSON-object file store. Every read goes to disk; writes replace the file atomically.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, SessionStoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(source) if source.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(source) => {
                return Err(SessionStoreError::io("reading state file", &self.path, source))
            }
        };

        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        let value: Value = serde_json::from_str(&raw)
            .map_err(|source| SessionStoreError::parse(&self.path, source))?;
        let Value::Object(object) = value else {
            return Err(SessionStoreError::InvalidShape {
                path: self.path.clone(),
            });
        };

        let mut values = BTreeMap::new();
        for (key, value) in object {
            let Value::String(value) = value else {
                return Err(SessionStoreError::InvalidShape {
                    path: self.path.clone(),
                });
            };
            values.insert(key, value);
        }

        Ok(values)
    }

    fn write_all(&self, values: &BTreeMap<String, String>) -> Result<(), SessionStoreError> {
        let parent = self
            .path
            .parent()
            .ok_or_else(|| SessionStoreError::NoParent {
                path: self.path.clone(),
            })?;
        fs::create_dir_all(parent)
            .map_err(|source| SessionStoreError::io("creating state directory", parent, source))?;

        let object: Map<String, Value> = values
            .iter()
            .map(|(key, value)| (key.clone(), Value::String(value.clone())))
            .collect();
        let serialized = serde_json::to_string_pretty(&Value::Object(object))
            .map_err(|source| SessionStoreError::serialize(&self.path, source))?;

        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, serialized)
            .map_err(|source| SessionStoreError::io("writing state file", &temp_path, source))?;
        fs::rename(&temp_path, &self.path)
            .map_err(|source| SessionStoreError::io("replacing state file", &self.path, source))?;

        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, SessionStoreError> {
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SessionStoreError> {
        let _guard = lock_unpoisoned(&self.write_lock);
        let mut values = self.read_all()?;
        values.insert(key.to_string(), value.to_string());
        self.write_all(&values)?;
        debug!(path = %self.path.display(), key, "persisted state value");
        Ok(())
    }
}

/// In-process store. Counts writes so callers can assert persistence side effects.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<BTreeMap<String, String>>,
    writes: Mutex<Vec<(String, String)>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `values` without recording writes.
    pub fn with_values<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let values = values
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        Self {
            values: Mutex::new(values),
            writes: Mutex::new(Vec::new()),
        }
    }

    /// Returns every `set` call in order.
    #[must_use]
    pub fn writes(&self) -> Vec<(String, String)> {
        lock_unpoisoned(&self.writes).clone()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, SessionStoreError> {
        Ok(lock_unpoisoned(&self.values).get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SessionStoreError> {
        lock_unpoisoned(&self.values).insert(key.to_string(), value.to_string());
        lock_unpoisoned(&self.writes).push((key.to_string(), value.to_string()));
        Ok(())
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
