// Wallet store: small key-value persistence for per-account preferences
//
// Storage format:
//   Tree: "amipay_prefs"
//   Key: caller-chosen string (e.g., "amipay-priority-0xabc...")
//   Value: UTF-8 JSON text

use std::collections::HashMap;
use std::path::Path;

use parking_lot::RwLock;

use crate::error::StoreError;

const PREFS_TREE: &str = "amipay_prefs";

/// String key-value storage. Values are opaque to the store.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// Store backed by a sled tree
pub struct SledStore {
    tree: sled::Tree,
}

impl SledStore {
    /// Open (or create) a sled database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path.as_ref())?;
        Self::from_db(&db)
    }

    pub fn from_db(db: &sled::Db) -> Result<Self, StoreError> {
        let tree = db.open_tree(PREFS_TREE)?;
        tracing::debug!(tree = PREFS_TREE, "opened preference store");
        Ok(Self { tree })
    }
}

impl KvStore for SledStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self.tree.get(key.as_bytes())? {
            // Non-UTF-8 bytes surface as corrupt JSON to the caller
            Some(value) => Ok(Some(String::from_utf8_lossy(&value).into_owned())),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.tree.insert(key.as_bytes(), value.as_bytes())?;
        self.tree.flush()?;
        Ok(())
    }
}

/// In-process store, used by tests and ephemeral sessions
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.inner.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.inner.write().insert(key.to_string(), value.to_string());
        Ok(())
    }
}
