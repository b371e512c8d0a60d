//! Process-wide credential slot
//!
//! `TokenStore` is the single owner of the `Session`. Every read returns a
//! fresh copy of the current pair and every mutation writes through to
//! `Storage`, so a value read before an `.await` must be re-read afterwards:
//! a refresh may have replaced it in the meantime.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use common::Secret;
use tracing::{debug, info, warn};

use crate::constants::{ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
use crate::error::Result;
use crate::storage::Storage;

/// Snapshot of the access/refresh credential pair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub access: Option<Secret<String>>,
    pub refresh: Option<Secret<String>>,
}

impl Session {
    pub fn new(access: impl Into<Secret<String>>, refresh: impl Into<Secret<String>>) -> Self {
        Self {
            access: Some(access.into()),
            refresh: Some(refresh.into()),
        }
    }

    /// Both credentials present.
    pub fn is_authenticated(&self) -> bool {
        self.access.is_some() && self.refresh.is_some()
    }

    pub fn access_str(&self) -> Option<&str> {
        self.access.as_ref().map(Secret::as_str)
    }

    pub fn refresh_str(&self) -> Option<&str> {
        self.refresh.as_ref().map(Secret::as_str)
    }
}

/// Thread-safe owner of the current `Session`.
///
/// The lock is only ever held for the duration of a synchronous read or
/// write; it is never held across an await.
pub struct TokenStore {
    storage: Arc<dyn Storage>,
    slot: RwLock<Session>,
}

impl TokenStore {
    /// Build the store from persisted credentials.
    ///
    /// Missing keys mean an unauthenticated start. Empty values are treated
    /// as missing.
    pub fn load(storage: Arc<dyn Storage>) -> Result<Self> {
        let access = storage
            .get(ACCESS_TOKEN_KEY)?
            .filter(|v| !v.is_empty())
            .map(Secret::new);
        let refresh = storage
            .get(REFRESH_TOKEN_KEY)?
            .filter(|v| !v.is_empty())
            .map(Secret::new);

        let session = Session { access, refresh };
        info!(
            authenticated = session.is_authenticated(),
            has_access = session.access.is_some(),
            has_refresh = session.refresh.is_some(),
            "loaded session"
        );

        Ok(Self {
            storage,
            slot: RwLock::new(session),
        })
    }

    /// Current session (a copy; never cache it across a suspension point).
    pub fn get(&self) -> Session {
        self.read().clone()
    }

    /// Current access credential, if any.
    pub fn access(&self) -> Option<Secret<String>> {
        self.read().access.clone()
    }

    /// Current refresh credential, if any.
    pub fn refresh(&self) -> Option<Secret<String>> {
        self.read().refresh.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.read().is_authenticated()
    }

    /// Replace the access credential, keeping the refresh credential.
    pub fn set_access(&self, access: impl Into<Secret<String>>) {
        let access = access.into();
        let mut slot = self.write();
        self.persist(ACCESS_TOKEN_KEY, Some(access.as_str()));
        slot.access = Some(access);
        debug!("access credential replaced");
    }

    /// Replace both credentials (login, or a refresh that rotated the pair).
    pub fn set_session(
        &self,
        access: impl Into<Secret<String>>,
        refresh: impl Into<Secret<String>>,
    ) {
        let session = Session::new(access, refresh);
        let mut slot = self.write();
        self.persist(ACCESS_TOKEN_KEY, session.access_str());
        self.persist(REFRESH_TOKEN_KEY, session.refresh_str());
        *slot = session;
        debug!("session replaced");
    }

    /// Drop both credentials.
    pub fn clear(&self) {
        let mut slot = self.write();
        self.persist(ACCESS_TOKEN_KEY, None);
        self.persist(REFRESH_TOKEN_KEY, None);
        *slot = Session::default();
        info!("session cleared");
    }

    /// Write one key through to storage. The in-memory slot stays
    /// authoritative when persistence fails.
    fn persist(&self, key: &str, value: Option<&str>) {
        let result = match value {
            Some(v) => self.storage.set(key, v),
            None => self.storage.remove(key),
        };
        if let Err(e) = result {
            warn!(key, error = %e, "failed to persist credential");
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Session> {
        self.slot.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Session> {
        self.slot.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::storage::{FileStorage, MemoryStorage};

    fn store_with(entries: &[(&str, &str)]) -> (Arc<MemoryStorage>, TokenStore) {
        let storage = Arc::new(MemoryStorage::with_entries(entries.iter().copied()));
        let store = TokenStore::load(storage.clone()).unwrap();
        (storage, store)
    }

    #[test]
    fn empty_storage_is_unauthenticated() {
        let (_, store) = store_with(&[]);
        let session = store.get();
        assert!(!session.is_authenticated());
        assert!(session.access.is_none());
        assert!(session.refresh.is_none());
    }

    #[test]
    fn authenticated_requires_both_credentials() {
        let (_, store) = store_with(&[(ACCESS_TOKEN_KEY, "A1")]);
        assert!(!store.is_authenticated());
        assert_eq!(store.get().access_str(), Some("A1"));

        let (_, store) = store_with(&[(ACCESS_TOKEN_KEY, "A1"), (REFRESH_TOKEN_KEY, "R1")]);
        assert!(store.is_authenticated());
    }

    #[test]
    fn empty_values_load_as_missing() {
        let (_, store) = store_with(&[(ACCESS_TOKEN_KEY, ""), (REFRESH_TOKEN_KEY, "R1")]);
        assert!(store.access().is_none());
        assert_eq!(store.refresh().unwrap().as_str(), "R1");
    }

    #[test]
    fn set_access_keeps_refresh_and_persists() {
        let (storage, store) =
            store_with(&[(ACCESS_TOKEN_KEY, "A1"), (REFRESH_TOKEN_KEY, "R1")]);

        store.set_access("A2");

        assert_eq!(store.get(), Session::new("A2", "R1"));
        assert_eq!(
            storage.get(ACCESS_TOKEN_KEY).unwrap().as_deref(),
            Some("A2")
        );
        assert_eq!(
            storage.get(REFRESH_TOKEN_KEY).unwrap().as_deref(),
            Some("R1")
        );
    }

    #[test]
    fn set_session_replaces_both() {
        let (storage, store) = store_with(&[]);
        store.set_session("A1", "R1");

        assert!(store.is_authenticated());
        assert_eq!(
            storage.get(REFRESH_TOKEN_KEY).unwrap().as_deref(),
            Some("R1")
        );
    }

    #[test]
    fn clear_removes_both_from_storage() {
        let (storage, store) =
            store_with(&[(ACCESS_TOKEN_KEY, "A1"), (REFRESH_TOKEN_KEY, "R1")]);

        store.clear();

        assert_eq!(store.get(), Session::default());
        assert_eq!(storage.get(ACCESS_TOKEN_KEY).unwrap(), None);
        assert_eq!(storage.get(REFRESH_TOKEN_KEY).unwrap(), None);
    }

    #[test]
    fn session_survives_restart_with_file_storage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");

        let store = TokenStore::load(Arc::new(FileStorage::open(&path).unwrap())).unwrap();
        store.set_session("A1", "R1");
        store.set_access("A2");

        let restarted = TokenStore::load(Arc::new(FileStorage::open(&path).unwrap())).unwrap();
        assert_eq!(restarted.get(), Session::new("A2", "R1"));
    }

    struct FailingStorage;

    impl Storage for FailingStorage {
        fn get(&self, _key: &str) -> Result<Option<String>> {
            Ok(None)
        }
        fn set(&self, _key: &str, _value: &str) -> Result<()> {
            Err(Error::Storage("disk full".into()))
        }
        fn remove(&self, _key: &str) -> Result<()> {
            Err(Error::Storage("disk full".into()))
        }
    }

    #[test]
    fn persistence_failure_keeps_in_memory_update() {
        let store = TokenStore::load(Arc::new(FailingStorage)).unwrap();
        store.set_session("A1", "R1");
        assert!(store.is_authenticated());
        store.clear();
        assert!(!store.is_authenticated());
    }

    #[test]
    fn session_debug_does_not_leak_tokens() {
        let debug = format!("{:?}", Session::new("A1-secret", "R1-secret"));
        assert!(!debug.contains("A1-secret"));
        assert!(!debug.contains("R1-secret"));
    }
}
