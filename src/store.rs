use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// In-memory key/value map behind the example SET/GET/DEL commands. Cheap to clone, clones share
/// the same data.
#[derive(Clone, Default)]
pub struct Store {
    inner: Arc<Mutex<HashMap<Bytes, Bytes>>>,
}

impl Store {
    pub fn new() -> Store {
        Store::default()
    }

    pub fn lock(&self) -> StoreLocked<'_> {
        StoreLocked {
            keys: self.inner.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }
}

pub struct StoreLocked<'a> {
    keys: MutexGuard<'a, HashMap<Bytes, Bytes>>,
}

impl<'a> StoreLocked<'a> {
    pub fn set(&mut self, key: Bytes, value: Bytes) {
        self.keys.insert(key, value);
    }

    pub fn get(&self, key: &[u8]) -> Option<&Bytes> {
        self.keys.get(key)
    }

    pub fn remove(&mut self, key: &[u8]) -> Option<Bytes> {
        self.keys.remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
