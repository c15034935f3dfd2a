//! Durable key-value storage for client-side state.
//!
//! Provides the `KeyValueStore` seam plus two adapters: an in-process
//! map and a single JSON file on disk. Everything stored is a string.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use tokio::sync::{Mutex, RwLock};
use tracing::warn;

/// Key holding the signed-in username.
pub const USERNAME_KEY: &str = "jailbreak_username";

/// Key holding the tutorial-seen flag.
pub const TUTORIAL_SEEN_KEY: &str = "jailbreak_tutorial_seen";

/// Errors from storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt store: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// A durable, string-keyed string store.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    async fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Read-modify-write one key atomically with respect to other calls on
    /// this store. `f` sees the current value; returning `Ok(None)` leaves
    /// the entry untouched and an error aborts without writing.
    async fn update(&self, key: &str, f: &mut Updater<'_>) -> Result<(), StorageError>;
}

/// Callback passed to [`KeyValueStore::update`].
pub type Updater<'a> = dyn FnMut(Option<&str>) -> Result<Option<String>, StorageError> + Send + 'a;

#[async_trait]
impl<S: KeyValueStore + ?Sized> KeyValueStore for Arc<S> {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        (**self).remove(key).await
    }

    async fn update(&self, key: &str, f: &mut Updater<'_>) -> Result<(), StorageError> {
        (**self).update(key, f).await
    }
}

/// In-process store. Contents vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with the given entries already present.
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: RwLock::new(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn update(&self, key: &str, f: &mut Updater<'_>) -> Result<(), StorageError> {
        let mut entries = self.entries.write().await;
        let next = f(entries.get(key).map(String::as_str))?;
        if let Some(value) = next {
            entries.insert(key.to_string(), value);
        }
        Ok(())
    }
}

/// Store backed by one JSON object file.
///
/// A missing file reads as an empty store. Every write rewrites the
/// whole file; the lock is held across each read-modify-write cycle.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<HashMap<String, String>, StorageError> {
        match fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(HashMap::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_all(&self, entries: &HashMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let content = serde_json::to_string_pretty(entries)?;
        fs::write(&self.path, content).await?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.lock.lock().await;
        Ok(self.read_all().await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read_all().await?;
        entries.insert(key.to_string(), value.to_string());
        self.write_all(&entries).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read_all().await?;
        if entries.remove(key).is_some() {
            self.write_all(&entries).await?;
        }
        Ok(())
    }

    async fn update(&self, key: &str, f: &mut Updater<'_>) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read_all().await?;
        let next = f(entries.get(key).map(String::as_str))?;
        if let Some(value) = next {
            entries.insert(key.to_string(), value);
            self.write_all(&entries).await?;
        }
        Ok(())
    }
}

/// Per-browser player preferences. All reads and writes are best-effort.
pub struct PlayerPrefs<S> {
    store: S,
}

impl<S: KeyValueStore> PlayerPrefs<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// The stored username, or empty when none is stored or storage fails.
    pub async fn username(&self) -> String {
        match self.store.get(USERNAME_KEY).await {
            Ok(name) => name.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "failed to read username");
                String::new()
            }
        }
    }

    pub async fn set_username(&self, username: &str) {
        if let Err(e) = self.store.set(USERNAME_KEY, username.trim()).await {
            warn!(error = %e, "failed to save username");
        }
    }

    pub async fn clear_username(&self) {
        if let Err(e) = self.store.remove(USERNAME_KEY).await {
            warn!(error = %e, "failed to clear username");
        }
    }

    pub async fn tutorial_seen(&self) -> bool {
        match self.store.get(TUTORIAL_SEEN_KEY).await {
            Ok(flag) => flag.as_deref() == Some("true"),
            Err(e) => {
                warn!(error = %e, "failed to read tutorial flag");
                false
            }
        }
    }

    pub async fn mark_tutorial_seen(&self) {
        if let Err(e) = self.store.set(TUTORIAL_SEEN_KEY, "true").await {
            warn!(error = %e, "failed to save tutorial flag");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FailingStore;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);

        store.set("k", "v").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        store.remove("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_store_missing_file_is_empty() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = FileStore::new(temp_dir.path().join("nested").join("store.json"));

        assert_eq!(store.get("anything").await.unwrap(), None);
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_file_store_persists_across_instances() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("nested").join("store.json");

        let store = FileStore::new(&path);
        store.set("a", "1").await.unwrap();
        store.set("b", "2").await.unwrap();
        store.remove("a").await.unwrap();

        let reopened = FileStore::new(&path);
        assert_eq!(reopened.get("a").await.unwrap(), None);
        assert_eq!(reopened.get("b").await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_file_store_corrupt_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("store.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = FileStore::new(&path);
        assert!(matches!(store.get("a").await, Err(StorageError::Corrupt(_))));
    }

    #[tokio::test]
    async fn test_update_sees_current_value() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = FileStore::new(temp_dir.path().join("store.json"));
        store.set("n", "1").await.unwrap();

        let mut seen = None;
        store
            .update("n", &mut |current| {
                seen = current.map(str::to_string);
                Ok(Some("2".to_string()))
            })
            .await
            .unwrap();
        assert_eq!(seen.as_deref(), Some("1"));
        assert_eq!(store.get("n").await.unwrap().as_deref(), Some("2"));

        store.update("n", &mut |_| Ok(None)).await.unwrap();
        assert_eq!(store.get("n").await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_concurrent_updates_are_serialised() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = Arc::new(FileStore::new(temp_dir.path().join("store.json")));

        let bump = |store: Arc<FileStore>| async move {
            store
                .update("count", &mut |current| {
                    let n: u32 = current.and_then(|v| v.parse().ok()).unwrap_or(0);
                    Ok(Some((n + 1).to_string()))
                })
                .await
        };
        let (a, b, c) = tokio::join!(bump(store.clone()), bump(store.clone()), bump(store.clone()));
        a.unwrap();
        b.unwrap();
        c.unwrap();

        assert_eq!(store.get("count").await.unwrap().as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn test_prefs_username_trimmed() {
        let prefs = PlayerPrefs::new(MemoryStore::new());
        assert_eq!(prefs.username().await, "");

        prefs.set_username("  alice  ").await;
        assert_eq!(prefs.username().await, "alice");

        prefs.clear_username().await;
        assert_eq!(prefs.username().await, "");
    }

    #[tokio::test]
    async fn test_prefs_tutorial_flag() {
        let prefs = PlayerPrefs::new(MemoryStore::new());
        assert!(!prefs.tutorial_seen().await);
        prefs.mark_tutorial_seen().await;
        assert!(prefs.tutorial_seen().await);
    }

    #[tokio::test]
    async fn test_prefs_degrade_when_storage_fails() {
        let prefs = PlayerPrefs::new(FailingStore);
        prefs.set_username("bob").await;
        assert_eq!(prefs.username().await, "");
        assert!(!prefs.tutorial_seen().await);
    }
}
