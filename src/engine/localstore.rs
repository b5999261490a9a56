use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use serde_json::Value;

use crate::engine::Persistence;
use crate::{Error, Result, StorageRead, StorageWrite};

/// Key-scoped storage engine backed by an in-memory map with optional file
/// persistence.
///
/// Every write is flushed to disk before the call returns, so a failing
/// persistence layer surfaces to the caller (and its retry wrapper) instead
/// of being dropped in the background. No lock is held across the flush.
pub struct LocalStore {
    data: RwLock<HashMap<String, Value>>,
    persistence: Option<Arc<Persistence>>,
}

impl LocalStore {
    pub fn new(initial_data: HashMap<String, Value>, persistence: Option<Arc<Persistence>>) -> Self {
        Self {
            data: RwLock::new(initial_data),
            persistence,
        }
    }

    /// Opens a store bound to `data_dir`, loading whatever a previous process
    /// persisted there. Data written through the returned store survives
    /// process restarts on the same directory.
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let persistence = Arc::new(Persistence::new(data_dir)?);
        let initial_data = persistence.load_all()?;
        Ok(Self::new(initial_data, Some(persistence)))
    }

    /// A poisoned lock means another thread panicked mid-write; the map may
    /// be inconsistent, so it is reported as the transient class.
    fn poisoned<G>(_: PoisonError<G>) -> Error {
        Error::InvalidState("storage lock poisoned".to_string())
    }

    async fn flush(&self, key: &str) -> Result<()> {
        if let Some(p) = &self.persistence {
            let value = {
                let data = self.data.read().map_err(Self::poisoned)?;
                data.get(key).cloned()
            };
            let p = p.clone();
            let key = key.to_string();
            tokio::task::spawn_blocking(move || match value {
                Some(v) => p.save_key(&key, &v),
                None => p.remove_key(&key),
            })
            .await
            .map_err(|e| Error::Internal(format!("persistence task failed: {}", e)))??;
        }
        Ok(())
    }
}

#[async_trait]
impl StorageRead for LocalStore {
    async fn get_item(&self, key: &str) -> Result<Option<Value>> {
        let data = self.data.read().map_err(Self::poisoned)?;
        Ok(data.get(key).cloned())
    }
}

#[async_trait]
impl StorageWrite for LocalStore {
    async fn set_item(&self, key: &str, value: Value) -> Result<()> {
        {
            let mut data = self.data.write().map_err(Self::poisoned)?;
            data.insert(key.to_string(), value);
        }
        self.flush(key).await
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        {
            let mut data = self.data.write().map_err(Self::poisoned)?;
            data.remove(key);
        }
        self.flush(key).await
    }
}
