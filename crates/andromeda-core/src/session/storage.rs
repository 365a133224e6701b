// ── Persisted session state ──
//
// The session survives restarts through a small key/value backend. Each
// piece of state lives under its own key; all keys are cleared together.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use strum::{AsRefStr, Display, EnumIter, IntoEnumIterator};
use thiserror::Error;

/// Keys of the persisted session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum StorageKey {
    AccessToken,
    RefreshToken,
    /// The current user's profile, as JSON.
    User,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid stored data: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Key/value backend for the session store.
///
/// Calls are synchronous and expected to be quick (a small file, the OS
/// keychain, memory).
pub trait SessionStorage: Send + Sync + 'static {
    fn load(&self, key: StorageKey) -> Result<Option<String>, StorageError>;

    fn store(&self, key: StorageKey, value: &str) -> Result<(), StorageError>;

    fn remove(&self, key: StorageKey) -> Result<(), StorageError>;

    /// Remove every key. Keeps going past individual failures and reports
    /// the first one.
    fn clear(&self) -> Result<(), StorageError> {
        let mut first_error = None;
        for key in StorageKey::iter() {
            if let Err(e) = self.remove(key) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// Volatile storage: the session lasts as long as the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<StorageKey, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStorage for MemoryStorage {
    fn load(&self, key: StorageKey) -> Result<Option<String>, StorageError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(&key).cloned())
    }

    fn store(&self, key: StorageKey, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key, value.to_owned());
        Ok(())
    }

    fn remove(&self, key: StorageKey) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(&key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_render_snake_case() {
        assert_eq!(StorageKey::AccessToken.as_ref(), "access_token");
        assert_eq!(StorageKey::RefreshToken.to_string(), "refresh_token");
        assert_eq!(StorageKey::User.as_ref(), "user");
        assert_eq!(StorageKey::iter().count(), 3);
    }

    #[test]
    fn memory_storage_round_trip_and_clear() {
        let storage = MemoryStorage::new();
        storage.store(StorageKey::AccessToken, "a").expect("store");
        storage.store(StorageKey::User, "{}").expect("store");
        assert_eq!(storage.load(StorageKey::AccessToken).expect("load").as_deref(), Some("a"));
        assert_eq!(storage.load(StorageKey::RefreshToken).expect("load"), None);

        storage.clear().expect("clear");
        for key in StorageKey::iter() {
            assert_eq!(storage.load(key).expect("load"), None);
        }
    }

    struct FailingRemove;

    impl SessionStorage for FailingRemove {
        fn load(&self, _key: StorageKey) -> Result<Option<String>, StorageError> {
            Ok(None)
        }

        fn store(&self, _key: StorageKey, _value: &str) -> Result<(), StorageError> {
            Ok(())
        }

        fn remove(&self, key: StorageKey) -> Result<(), StorageError> {
            Err(StorageError::Backend(format!("cannot remove {key}")))
        }
    }

    #[test]
    fn clear_reports_first_failure() {
        let err = FailingRemove.clear().expect_err("every remove fails");
        assert_eq!(err.to_string(), "Storage backend error: cannot remove access_token");
    }
}
