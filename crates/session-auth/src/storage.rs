//! Key/value persistence backends
//!
//! Credentials and CSRF state are stored as flat string values under fixed
//! keys. [`MemoryStore`] lives as long as the process (the navigation-session
//! scope); [`FileStore`] is a JSON object on disk that survives restarts and
//! the round-trip through the identity provider.
//!
//! Multi-key writes go through `set_many` / `remove_many` and are applied
//! under a single lock, so a concurrent reader sees either the old pair or
//! the new pair, never a mix.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Boxed future returned by [`KeyValueStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Durable string key/value storage.
///
/// Uses `Pin<Box<dyn Future>>` return types so backends can be held as
/// `Arc<dyn KeyValueStore>` and swapped per deployment or per test.
pub trait KeyValueStore: Send + Sync {
    /// Backend label for logging
    fn name(&self) -> &str;

    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>>;

    /// Write every entry as one logical unit.
    fn set_many<'a>(&'a self, entries: &'a [(&'a str, &'a str)]) -> StoreFuture<'a, ()>;

    /// Remove every key as one logical unit. Missing keys are ignored.
    fn remove_many<'a>(&'a self, keys: &'a [&'a str]) -> StoreFuture<'a, ()>;
}

/// In-process store scoped to the lifetime of the current session.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
        Box::pin(async move { Ok(self.entries.lock().await.get(key).cloned()) })
    }

    fn set_many<'a>(&'a self, entries: &'a [(&'a str, &'a str)]) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut map = self.entries.lock().await;
            for (key, value) in entries {
                map.insert((*key).to_string(), (*value).to_string());
            }
            Ok(())
        })
    }

    fn remove_many<'a>(&'a self, keys: &'a [&'a str]) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut map = self.entries.lock().await;
            for key in keys {
                map.remove(*key);
            }
            Ok(())
        })
    }
}

/// JSON-file store with atomic replace-on-write.
///
/// The whole map is held in memory behind a tokio Mutex; every mutation
/// rewrites the file via temp file + rename while the lock is held. The
/// in-memory map only changes once the file write succeeded.
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl FileStore {
    /// Load the store from `path`.
    ///
    /// A missing file (and missing parent directories) is created as `{}`.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let entries = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Storage(format!("reading {}: {e}", path.display())))?;
            let entries: HashMap<String, String> = serde_json::from_str(&contents)
                .map_err(|e| Error::Storage(format!("parsing {}: {e}", path.display())))?;
            debug!(path = %path.display(), keys = entries.len(), "loaded store");
            entries
        } else {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(dir)
                    .await
                    .map_err(|e| Error::Storage(format!("creating {}: {e}", dir.display())))?;
            }
            info!(path = %path.display(), "store file not found, starting empty");
            let entries = HashMap::new();
            write_atomic(&path, &entries).await?;
            entries
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyValueStore for FileStore {
    fn name(&self) -> &str {
        "file"
    }

    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
        Box::pin(async move { Ok(self.entries.lock().await.get(key).cloned()) })
    }

    fn set_many<'a>(&'a self, entries: &'a [(&'a str, &'a str)]) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut map = self.entries.lock().await;
            let mut updated = map.clone();
            for (key, value) in entries {
                updated.insert((*key).to_string(), (*value).to_string());
            }
            write_atomic(&self.path, &updated).await?;
            *map = updated;
            Ok(())
        })
    }

    fn remove_many<'a>(&'a self, keys: &'a [&'a str]) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut map = self.entries.lock().await;
            if !keys.iter().any(|key| map.contains_key(*key)) {
                return Ok(());
            }
            let mut updated = map.clone();
            for key in keys {
                updated.remove(*key);
            }
            write_atomic(&self.path, &updated).await?;
            *map = updated;
            Ok(())
        })
    }
}

/// Write the map to `path` atomically.
///
/// Writes a sibling temp file, restricts it to 0600 on unix (the file holds
/// bearer tokens), then renames it over the target.
async fn write_atomic(path: &Path, data: &HashMap<String, String>) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::Storage(format!("serializing store: {e}")))?;

    let file_name = path
        .file_name()
        .ok_or_else(|| Error::Storage(format!("{} has no file name", path.display())))?;
    let tmp_path = path.with_file_name(format!(
        ".{}.tmp.{}",
        file_name.to_string_lossy(),
        std::process::id()
    ));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Storage(format!("writing temp store file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Storage(format!("setting store file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Storage(format!("renaming temp store file: {e}")))?;

    debug!(path = %path.display(), "persisted store");
    Ok(())
}
