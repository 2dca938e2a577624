//! Data stores for the local backend

use crate::collaborators::DataStore;
use crate::errors::DataError;
use dashmap::DashMap;
use run_types::{DataBundle, DataPath};
use serde_json::Value;
use std::path::PathBuf;

/// Values kept in memory, keyed by bundle root and path
#[derive(Debug, Default)]
pub struct InMemoryDataStore {
    values: DashMap<(PathBuf, DataPath), Value>,
}

impl InMemoryDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl DataStore for InMemoryDataStore {
    fn read_value(&self, bundle: &DataBundle, path: &DataPath) -> Result<Value, DataError> {
        self.values
            .get(&(bundle.root().to_path_buf(), path.clone()))
            .map(|v| v.value().clone())
            .ok_or_else(|| DataError::NotFound(path.clone()))
    }

    fn write_value(
        &self,
        bundle: &DataBundle,
        path: &DataPath,
        value: Value,
    ) -> Result<(), DataError> {
        self.values
            .insert((bundle.root().to_path_buf(), path.clone()), value);
        Ok(())
    }
}

/// Values stored as JSON files under the bundle root
#[derive(Debug, Default, Clone)]
pub struct FileDataStore;

impl FileDataStore {
    pub fn new() -> Self {
        Self
    }
}

impl DataStore for FileDataStore {
    fn read_value(&self, bundle: &DataBundle, path: &DataPath) -> Result<Value, DataError> {
        let file = bundle.resolve(path);
        let bytes = match std::fs::read(&file) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DataError::NotFound(path.clone()))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn write_value(
        &self,
        bundle: &DataBundle,
        path: &DataPath,
        value: Value,
    ) -> Result<(), DataError> {
        let file = bundle.resolve(path);
        if let Some(parent) = file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&file, serde_json::to_vec(&value)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_round_trip() {
        let store = InMemoryDataStore::new();
        let bundle = DataBundle::new("/runs/a");
        let path = store.locator(&bundle, "name");
        assert_eq!(path.as_str(), "inputs/name");

        assert!(matches!(
            store.read_value(&bundle, &path),
            Err(DataError::NotFound(_))
        ));
        store
            .write_value(&bundle, &path, Value::from("John Doe"))
            .unwrap();
        assert_eq!(store.read_value(&bundle, &path).unwrap(), "John Doe");
    }

    #[test]
    fn test_in_memory_bundles_isolated() {
        let store = InMemoryDataStore::new();
        let path = DataPath::input("x");
        store
            .write_value(&DataBundle::new("/runs/a"), &path, Value::from(1))
            .unwrap();
        assert!(store.read_value(&DataBundle::new("/runs/b"), &path).is_err());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_file_store_writes_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = DataBundle::new(dir.path());
        let store = FileDataStore::new();
        let path = DataPath::intermediate("wf0/proc-hello0", "value");

        store
            .write_value(&bundle, &path, serde_json::json!({"greeting": "Hello"}))
            .unwrap();
        assert!(dir.path().join("intermediates/wf0/proc-hello0/value").is_file());
        assert_eq!(
            store.read_value(&bundle, &path).unwrap()["greeting"],
            "Hello"
        );
        assert!(matches!(
            store.read_value(&bundle, &DataPath::output("missing")),
            Err(DataError::NotFound(_))
        ));
    }
}
