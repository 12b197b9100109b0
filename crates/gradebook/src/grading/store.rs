use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Key under which the policy registry snapshot is persisted.
pub const REGISTRY_KEY: &str = "grading-policies";

/// Key for a custom late policy.
pub fn late_policy_key(id: &str) -> String {
    format!("late-policy-{id}")
}

/// Error enumeration for store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid store key '{0}'")]
    InvalidKey(String),
    #[error("stored value for '{key}' is not valid JSON: {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Key-value persistence of JSON documents.
pub trait PolicyStore: Send + Sync {
    fn load_raw(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn save_raw(&self, key: &str, json: String) -> Result<(), StoreError>;
    fn keys(&self) -> Result<Vec<String>, StoreError>;
}

/// Typed `load`/`save` on top of any [`PolicyStore`].
pub trait PolicyStoreExt: PolicyStore {
    fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let Some(raw) = self.load_raw(key)? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| StoreError::Serialization {
                key: key.to_string(),
                source,
            })
    }

    fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let json =
            serde_json::to_string_pretty(value).map_err(|source| StoreError::Serialization {
                key: key.to_string(),
                source,
            })?;
        self.save_raw(key, json)
    }
}

impl<S: PolicyStore + ?Sized> PolicyStoreExt for S {}

fn check_key(key: &str) -> Result<(), StoreError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryPolicyStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl PolicyStore for InMemoryPolicyStore {
    fn load_raw(&self, key: &str) -> Result<Option<String>, StoreError> {
        check_key(key)?;
        let guard = self.entries.lock().expect("store mutex poisoned");
        Ok(guard.get(key).cloned())
    }

    fn save_raw(&self, key: &str, json: String) -> Result<(), StoreError> {
        check_key(key)?;
        let mut guard = self.entries.lock().expect("store mutex poisoned");
        guard.insert(key.to_string(), json);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let guard = self.entries.lock().expect("store mutex poisoned");
        let mut keys: Vec<String> = guard.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

/// One pretty-printed JSON file per key inside a directory.
#[derive(Debug, Clone)]
pub struct JsonFilePolicyStore {
    root: PathBuf,
}

impl JsonFilePolicyStore {
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        check_key(key)?;
        Ok(self.root.join(format!("{key}.json")))
    }
}

impl PolicyStore for JsonFilePolicyStore {
    fn load_raw(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(path) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn save_raw(&self, key: &str, json: String) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        // Readers never observe a half-written document.
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, json)?;
        fs::rename(staging, path)?;
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                keys.push(stem.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}
