use std::collections::HashMap;
use std::future::Future;
use std::fs;
use std::io::{self, Write};
use std::sync::Mutex;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::PesuError;

/// Store keys for the cached documents.
pub mod keys {
    pub const SESSION: &str = "session";
    pub const PROFILE: &str = "userProfile";
    pub const PROFILE_RAW: &str = "userProfileRaw";
    pub const TREE: &str = "pesuData";
    pub const SEMESTERS: &str = "semestersData";
    pub const GPA: &str = "gpaData";
}

/// Durable key-value store. A `save` replaces the whole value under a key;
/// nothing spans more than one key.
pub trait KeyValueStore: Send + Sync {
    fn save(&self, key: &str, value: Value) -> impl Future<Output = Result<(), PesuError>> + Send;
    fn load(&self, key: &str) -> impl Future<Output = Result<Option<Value>, PesuError>> + Send;
    fn remove(&self, key: &str) -> impl Future<Output = Result<(), PesuError>> + Send;
}

pub async fn save_record<S, T>(store: &S, key: &str, value: &T) -> Result<(), PesuError>
where
    S: KeyValueStore + ?Sized,
    T: Serialize + ?Sized,
{
    let value = serde_json::to_value(value).map_err(|err| PesuError::Store(err.to_string()))?;
    store.save(key, value).await
}

pub async fn load_record<S, T>(store: &S, key: &str) -> Result<Option<T>, PesuError>
where
    S: KeyValueStore + ?Sized,
    T: DeserializeOwned,
{
    match store.load(key).await? {
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|err| PesuError::Store(format!("decode {key}: {err}"))),
        None => Ok(None),
    }
}

/// One pretty-printed JSON file per key under a root directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: Utf8PathBuf,
}

impl FileStore {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn path_for(&self, key: &str) -> Result<Utf8PathBuf, PesuError> {
        let is_valid = !key.is_empty()
            && key
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
        if !is_valid {
            return Err(PesuError::Store(format!("invalid store key: {key}")));
        }
        Ok(self.root.join(format!("{key}.json")))
    }
}

impl KeyValueStore for FileStore {
    async fn save(&self, key: &str, value: Value) -> Result<(), PesuError> {
        let path = self.path_for(key)?;
        let root = self.root.clone();
        let content =
            serde_json::to_vec_pretty(&value).map_err(|err| PesuError::Store(err.to_string()))?;
        tokio::task::spawn_blocking(move || persist_atomic(&root, &path, &content))
            .await
            .map_err(|err| PesuError::Store(err.to_string()))?
    }

    async fn load(&self, key: &str) -> Result<Option<Value>, PesuError> {
        let path = self.path_for(key)?;
        let content = match tokio::fs::read(path.as_std_path()).await {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(PesuError::Store(err.to_string())),
        };
        serde_json::from_slice(&content)
            .map(Some)
            .map_err(|err| PesuError::Store(format!("corrupt {path}: {err}")))
    }

    async fn remove(&self, key: &str) -> Result<(), PesuError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(path.as_std_path()).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(PesuError::Store(err.to_string())),
        }
    }
}

/// Each writer gets its own temp file in `root`, so concurrent saves of one
/// key never share a temp path. The last rename wins.
fn persist_atomic(root: &Utf8Path, path: &Utf8Path, content: &[u8]) -> Result<(), PesuError> {
    fs::create_dir_all(root.as_std_path()).map_err(|err| PesuError::Store(err.to_string()))?;
    let mut temp = tempfile::Builder::new()
        .prefix(".pesu-store")
        .tempfile_in(root.as_std_path())
        .map_err(|err| PesuError::Store(err.to_string()))?;
    temp.write_all(content)
        .map_err(|err| PesuError::Store(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| PesuError::Store(format!("persist {path}: {err}")))?;
    Ok(())
}

/// Process-local store, used when nothing needs to survive a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values
            .lock()
            .map(|values| values.contains_key(key))
            .unwrap_or(false)
    }
}

impl KeyValueStore for MemoryStore {
    async fn save(&self, key: &str, value: Value) -> Result<(), PesuError> {
        let mut values = self
            .values
            .lock()
            .map_err(|err| PesuError::Store(err.to_string()))?;
        values.insert(key.to_string(), value);
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<Value>, PesuError> {
        let values = self
            .values
            .lock()
            .map_err(|err| PesuError::Store(err.to_string()))?;
        Ok(values.get(key).cloned())
    }

    async fn remove(&self, key: &str) -> Result<(), PesuError> {
        let mut values = self
            .values
            .lock()
            .map_err(|err| PesuError::Store(err.to_string()))?;
        values.remove(key);
        Ok(())
    }
}
