//! Opaque key-value persistence.
//!
//! The room and matching layers persist small JSON blobs (matching state,
//! code TTLs) so a restarted client can tell stale in-flight state from
//! live state. What backs the store (a file, platform preferences, a
//! browser's local storage) is up to the embedding app.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::SessionError;

/// A blob store keyed by string.
///
/// Calls are synchronous: blobs are tiny and written at human-scale rates
/// (a state transition, a room creation).
pub trait KeyValueStore: Send + Sync + 'static {
    fn save(&self, key: &str, blob: Vec<u8>) -> Result<(), SessionError>;

    /// `Ok(None)` when nothing is stored under `key`.
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, SessionError>;

    fn remove(&self, key: &str) -> Result<(), SessionError>;
}

/// An in-memory store. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    blobs: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn blobs(&self) -> MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.blobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.blobs().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.blobs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn save(&self, key: &str, blob: Vec<u8>) -> Result<(), SessionError> {
        self.blobs().insert(key.to_owned(), blob);
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, SessionError> {
        Ok(self.blobs().get(key).cloned())
    }

    fn remove(&self, key: &str) -> Result<(), SessionError> {
        self.blobs().remove(key);
        Ok(())
    }
}
