//! Local key-value persistence.
//!
//! [`KeyValueStore`] is the adapter the catalog talks to. It stores one
//! serialized JSON payload per key and never propagates storage or
//! serialization failures: reads fall back to a caller-supplied default and
//! writes report `false`, leaving the previous value in place.
//!
//! The raw byte storage is pluggable through [`KvBackend`]:
//!
//! - [`LmdbBackend`]: durable storage in an LMDB environment (`<name>.lmdb`)
//! - [`MemoryBackend`]: in-process storage with an optional byte quota and a
//!   write-denial switch, mirroring what a browser's local storage can do to
//!   its callers

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use lmdb::{Database, DatabaseFlags, Environment, Transaction, WriteFlags};
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::app_response::AppError;

/// Raw byte storage behind a [`KeyValueStore`].
///
/// A `set` either replaces the whole value or leaves the old one untouched.
pub trait KvBackend {
    /// Returns `Ok(None)` when the key has never been written.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AppError>;

    fn set(&self, key: &str, value: &[u8]) -> Result<(), AppError>;

    /// Returns whether the key existed. Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> Result<bool, AppError>;
}

/// LMDB-backed durable storage.
pub struct LmdbBackend {
    env: Environment,
    db: Database,
    path: PathBuf,
}

impl LmdbBackend {
    /// Default map size: 10 MiB, the usual per-origin budget of browser storage.
    pub const DEFAULT_MAP_SIZE: usize = 10 * 1024 * 1024;

    /// Opens (or creates) the environment at `<name>.lmdb`.
    pub fn open(name: &str, map_size: usize) -> Result<Self, AppError> {
        let path = PathBuf::from(format!("{name}.lmdb"));
        Self::open_dir(&path, map_size)
    }

    /// Opens (or creates) the environment directly inside `dir`.
    pub fn open_dir(dir: &Path, map_size: usize) -> Result<Self, AppError> {
        fs::create_dir_all(dir).map_err(|e| {
            AppError::DatabaseError(format!("Cannot create directory {}: {e}", dir.display()))
        })?;

        let env = Environment::new().set_map_size(map_size).open(dir)?;
        let db = env.create_db(None, DatabaseFlags::empty())?;

        info!("LMDB environment opened at {}", dir.display());
        Ok(Self {
            env,
            db,
            path: dir.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KvBackend for LmdbBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AppError> {
        let txn = self.env.begin_ro_txn()?;
        let value = match txn.get(self.db, &key) {
            Ok(bytes) => Some(bytes.to_vec()),
            Err(lmdb::Error::NotFound) => None,
            Err(e) => return Err(AppError::from(e)),
        };
        txn.commit()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), AppError> {
        let mut txn = self.env.begin_rw_txn()?;
        // Dropping the txn on error aborts it, so the previous value survives.
        txn.put(self.db, &key, &value, WriteFlags::empty())?;
        txn.commit()?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, AppError> {
        let mut txn = self.env.begin_rw_txn()?;
        let existed = match txn.del(self.db, &key, None) {
            Ok(()) => true,
            Err(lmdb::Error::NotFound) => false,
            Err(e) => return Err(AppError::from(e)),
        };
        txn.commit()?;
        Ok(existed)
    }
}

#[derive(Default)]
struct MemoryState {
    entries: HashMap<String, Vec<u8>>,
    quota: Option<usize>,
    deny_writes: bool,
}

impl MemoryState {
    fn used_bytes_without(&self, key: &str) -> usize {
        self.entries
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(k, v)| k.len() + v.len())
            .sum()
    }
}

/// In-process storage. Cloning shares the same underlying entries, so a test
/// can keep a handle and flip [`MemoryBackend::deny_writes`] while the
/// catalog owns another clone.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend that rejects any write pushing the total of key and value
    /// bytes above `quota`.
    pub fn with_quota(quota: usize) -> Self {
        let backend = Self::new();
        backend.set_quota(Some(quota));
        backend
    }

    pub fn set_quota(&self, quota: Option<usize>) {
        if let Ok(mut state) = self.state.write() {
            state.quota = quota;
        }
    }

    /// Makes every subsequent `set` and `delete` fail, as disabled storage would.
    pub fn deny_writes(&self, deny: bool) {
        if let Ok(mut state) = self.state.write() {
            state.deny_writes = deny;
        }
    }

    /// Stores raw bytes, bypassing quota and denial. Used to seed corrupt payloads.
    pub fn insert_raw(&self, key: &str, value: &[u8]) {
        if let Ok(mut state) = self.state.write() {
            state.entries.insert(key.to_string(), value.to_vec());
        }
    }

    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.state
            .read()
            .ok()
            .and_then(|state| state.entries.get(key).cloned())
    }
}

impl KvBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AppError> {
        let state = self
            .state
            .read()
            .map_err(|_| AppError::DatabaseError("lock poisoned".into()))?;
        Ok(state.entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), AppError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| AppError::DatabaseError("lock poisoned".into()))?;

        if state.deny_writes {
            return Err(AppError::PersistenceError("Storage is disabled".into()));
        }
        if let Some(quota) = state.quota {
            let needed = state.used_bytes_without(key) + key.len() + value.len();
            if needed > quota {
                return Err(AppError::PersistenceError(format!(
                    "Storage quota exceeded: {needed} bytes needed, {quota} allowed"
                )));
            }
        }

        state.entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, AppError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| AppError::DatabaseError("lock poisoned".into()))?;

        if state.deny_writes {
            return Err(AppError::PersistenceError("Storage is disabled".into()));
        }
        Ok(state.entries.remove(key).is_some())
    }
}

/// Receives errors the store swallowed.
pub type ErrorSink = Box<dyn Fn(&AppError)>;

/// JSON key-value adapter over a [`KvBackend`].
pub struct KeyValueStore<B: KvBackend> {
    backend: B,
    on_error: Option<ErrorSink>,
}

impl<B: KvBackend> KeyValueStore<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            on_error: None,
        }
    }

    pub fn with_error_sink(mut self, sink: impl Fn(&AppError) + 'static) -> Self {
        self.on_error = Some(Box::new(sink));
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn report(&self, operation: &str, key: &str, err: AppError) {
        warn!("[local_store::{operation}] key \"{key}\": {err}");
        if let Some(sink) = &self.on_error {
            sink(&err);
        }
    }

    /// Reads and deserializes `key`.
    ///
    /// A missing key, an unreadable backend and a payload that doesn't parse
    /// as `T` all yield `default`. Only the last two are reported.
    pub fn read<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        let bytes = match self.backend.get(key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!("[local_store::read] key \"{key}\" not present, using default");
                return default;
            }
            Err(e) => {
                self.report("read", key, e);
                return default;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(value) => value,
            Err(e) => {
                self.report("read", key, AppError::from(e));
                default
            }
        }
    }

    /// Serializes and stores `value` under `key`. Returns `false` on any
    /// failure; the previously stored value is left untouched.
    pub fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> bool {
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.report("write", key, AppError::from(e));
                return false;
            }
        };

        match self.backend.set(key, &bytes) {
            Ok(()) => true,
            Err(e) => {
                self.report("write", key, e);
                false
            }
        }
    }

    pub fn remove(&self, key: &str) {
        if let Err(e) = self.backend.delete(key) {
            self.report("remove", key, e);
        }
    }

    /// Reads `key` (or `default`), applies `transform` and writes the result back.
    pub fn read_modify_write<T, F>(&self, key: &str, transform: F, default: T) -> bool
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(T) -> T,
    {
        let current = self.read(key, default);
        let next = transform(current);
        self.write(key, &next)
    }
}
