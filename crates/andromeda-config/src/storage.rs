// ── Persistent session backends ──
//
// `FileStorage` keeps one small JSON object per profile in the data
// directory; `KeyringStorage` puts each key in the OS keychain. Both
// implement `andromeda_core::SessionStorage`.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use andromeda_core::{MemoryStorage, SessionStorage, StorageError, StorageKey};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::{KEYRING_SERVICE, TokenStore, sessions_dir};

/// Open the session backend selected by `kind` for `profile`.
pub fn open_storage(kind: TokenStore, profile: &str) -> Arc<dyn SessionStorage> {
    match kind {
        TokenStore::File => Arc::new(FileStorage::new(
            sessions_dir().join(format!("{profile}.json")),
        )),
        TokenStore::Keyring => Arc::new(KeyringStorage::new(profile)),
        TokenStore::Memory => Arc::new(MemoryStorage::new()),
    }
}

// ── File ────────────────────────────────────────────────────────────

/// JSON file holding `{ "access_token": ..., "refresh_token": ..., "user": ... }`.
///
/// Every write replaces the whole file through an owner-only temporary
/// file and a rename; a file left without keys is deleted. A file that
/// does not parse is treated as empty by writes, so a new login or a
/// logout replaces it.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Result<BTreeMap<String, String>, StorageError> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_entries(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if entries.is_empty() {
            return self.remove_file();
        }

        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent)?;

        // NamedTempFile is created 0600 on unix
        let mut file = NamedTempFile::new_in(parent)?;
        file.write_all(serde_json::to_string_pretty(entries)?.as_bytes())?;
        file.as_file().sync_all()?;
        file.persist(&self.path).map_err(|e| e.error)?;
        debug!(path = %self.path.display(), "session file written");
        Ok(())
    }

    fn remove_file(&self) -> Result<(), StorageError> {
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    fn modify(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, String>),
    ) -> Result<(), StorageError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = match self.read_entries() {
            Ok(entries) => entries,
            Err(StorageError::Serde(e)) => {
                warn!(path = %self.path.display(), error = %e, "discarding unreadable session file");
                BTreeMap::new()
            }
            Err(e) => return Err(e),
        };
        f(&mut entries);
        self.write_entries(&entries)
    }
}

impl SessionStorage for FileStorage {
    fn load(&self, key: StorageKey) -> Result<Option<String>, StorageError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.read_entries()?.remove(key.as_ref()))
    }

    fn store(&self, key: StorageKey, value: &str) -> Result<(), StorageError> {
        self.modify(|entries| {
            entries.insert(key.to_string(), value.to_owned());
        })
    }

    fn remove(&self, key: StorageKey) -> Result<(), StorageError> {
        self.modify(|entries| {
            entries.remove(key.as_ref());
        })
    }

    fn clear(&self) -> Result<(), StorageError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.remove_file()
    }
}

// ── Keyring ─────────────────────────────────────────────────────────

/// One keychain entry per key, named `{profile}/{key}`.
#[derive(Debug, Clone)]
pub struct KeyringStorage {
    profile: String,
}

impl KeyringStorage {
    pub fn new(profile: impl Into<String>) -> Self {
        Self {
            profile: profile.into(),
        }
    }

    fn entry(&self, key: StorageKey) -> Result<keyring::Entry, StorageError> {
        keyring::Entry::new(KEYRING_SERVICE, &format!("{}/{key}", self.profile))
            .map_err(keyring_error)
    }
}

impl SessionStorage for KeyringStorage {
    fn load(&self, key: StorageKey) -> Result<Option<String>, StorageError> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(keyring_error(e)),
        }
    }

    fn store(&self, key: StorageKey, value: &str) -> Result<(), StorageError> {
        self.entry(key)?.set_password(value).map_err(keyring_error)
    }

    fn remove(&self, key: StorageKey) -> Result<(), StorageError> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(keyring_error(e)),
        }
    }
}

#[allow(clippy::needless_pass_by_value)]
fn keyring_error(err: keyring::Error) -> StorageError {
    StorageError::Backend(err.to_string())
}
