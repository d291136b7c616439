//! Persistent key-value storage.
//!
//! Capability discovery writes its results through a [`KeyValueStore`] so
//! they survive restarts and can be shared between processes.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store backend error: {message}")]
    Backend { message: String },
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait::async_trait]
pub trait KeyValueStore: Send + Sync + std::fmt::Debug {
    /// Store name for logging.
    fn name(&self) -> &str;

    async fn get_raw(&self, key: &str) -> StoreResult<Option<String>>;

    async fn set_raw(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Returns whether the key existed.
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    async fn list_keys(&self, prefix: &str) -> StoreResult<Vec<String>>;
}

/// Typed JSON access on top of the raw string interface.
pub trait KeyValueStoreExt: KeyValueStore {
    fn get<T: DeserializeOwned + Send>(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = StoreResult<Option<T>>> + Send
    where
        Self: Sync,
    {
        async move {
            match self.get_raw(key).await? {
                Some(raw) => {
                    let value: T =
                        serde_json::from_str(&raw).map_err(|e| StoreError::InvalidValue {
                            key: key.to_string(),
                            message: e.to_string(),
                        })?;
                    Ok(Some(value))
                }
                None => Ok(None),
            }
        }
    }

    fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
    ) -> impl std::future::Future<Output = StoreResult<()>> + Send
    where
        Self: Sync,
    {
        async move {
            let raw = serde_json::to_string(value)?;
            self.set_raw(key, &raw).await
        }
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStoreExt for S {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Entry {
        name: String,
        score: u32,
    }

    #[tokio::test]
    async fn test_typed_access_through_trait_object() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let entry = Entry {
            name: "qwen3".into(),
            score: 3,
        };

        store.set("entry", &entry).await.unwrap();
        let loaded: Option<Entry> = store.get("entry").await.unwrap();
        assert_eq!(loaded, Some(entry));

        let missing: Option<Entry> = store.get("missing").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_value_is_invalid() {
        let store = MemoryStore::new();
        store.set_raw("entry", "{not json").await.unwrap();

        let result: StoreResult<Option<Entry>> = store.get("entry").await;
        assert!(matches!(result, Err(StoreError::InvalidValue { key, .. }) if key == "entry"));
    }
}
