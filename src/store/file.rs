//! JSON-file store.
//!
//! The whole map lives in one JSON object on disk and is rewritten on
//! every mutation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use directories::BaseDirs;
use tokio::sync::RwLock;

use super::{KeyValueStore, StoreResult};

const GATE_DIR: &str = ".llm-gate";
const CAPABILITIES_FILE: &str = "capabilities.json";

pub struct FileStore {
    path: PathBuf,
    data: RwLock<Option<BTreeMap<String, String>>>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            data: RwLock::new(None),
        }
    }

    /// `~/.llm-gate/capabilities.json`, if a home directory can be found.
    pub fn default_path() -> Option<PathBuf> {
        BaseDirs::new().map(|dirs| dirs.home_dir().join(GATE_DIR).join(CAPABILITIES_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> StoreResult<BTreeMap<String, String>> {
        if !tokio::fs::try_exists(&self.path).await? {
            return Ok(BTreeMap::new());
        }
        let content = tokio::fs::read_to_string(&self.path).await?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    async fn save(&self, data: &BTreeMap<String, String>) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(data)?;
        tokio::fs::write(&self.path, content).await?;
        Ok(())
    }

    /// Rereads the file, discarding the in-memory copy.
    pub async fn reload(&self) -> StoreResult<()> {
        let fresh = self.load().await?;
        *self.data.write().await = Some(fresh);
        Ok(())
    }

    async fn with_data<R>(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, String>) -> (R, bool),
    ) -> StoreResult<R> {
        let mut guard = self.data.write().await;
        if guard.is_none() {
            *guard = Some(self.load().await?);
        }
        let map = guard.get_or_insert_with(BTreeMap::new);
        let (result, dirty) = f(map);
        if dirty {
            self.save(map).await?;
        }
        Ok(result)
    }
}

#[async_trait::async_trait]
impl KeyValueStore for FileStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn get_raw(&self, key: &str) -> StoreResult<Option<String>> {
        self.with_data(|map| (map.get(key).cloned(), false)).await
    }

    async fn set_raw(&self, key: &str, value: &str) -> StoreResult<()> {
        self.with_data(|map| {
            map.insert(key.to_string(), value.to_string());
            ((), true)
        })
        .await
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        self.with_data(|map| {
            let existed = map.remove(key).is_some();
            (existed, existed)
        })
        .await
    }

    async fn list_keys(&self, prefix: &str) -> StoreResult<Vec<String>> {
        self.with_data(|map| {
            let keys = map
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect();
            (keys, false)
        })
        .await
    }
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore")
            .field("path", &self.path)
            .finish()
    }
}
