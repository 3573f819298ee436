//! Durable key-value settings store
//!
//! A small JSON-file-backed map used for pointers and flags that must
//! survive restarts (e.g. the active configuration profile). Writes are
//! persisted immediately; a corrupt file is logged and treated as empty
//! rather than taking the process down.

use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::warn;

pub struct JsonKvStore {
    path: PathBuf,
    inner: RwLock<HashMap<String, Value>>,
}

impl JsonKvStore {
    pub fn open(path: PathBuf) -> Result<Self> {
        let map = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(map) => map,
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "corrupt settings store, starting empty");
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("cannot read settings store {}", path.display()));
            }
        };
        Ok(Self {
            path,
            inner: RwLock::new(map),
        })
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        self.inner.read().await.get(key).cloned()
    }

    pub async fn get_str(&self, key: &str) -> Option<String> {
        match self.get(key).await {
            Some(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    pub async fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut map = self.inner.write().await;
        map.insert(key.to_string(), value);
        self.persist(&map)
    }

    pub async fn remove(&self, key: &str) -> Result<()> {
        let mut map = self.inner.write().await;
        map.remove(key);
        self.persist(&map)
    }

    fn persist(&self, map: &HashMap<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("cannot create {}", parent.display()))?;
        }
        let raw = serde_json::to_string_pretty(map).context("settings store serialization")?;
        fs::write(&self.path, raw)
            .with_context(|| format!("cannot write settings store {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn set_get_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let store = JsonKvStore::open(path.clone()).unwrap();
        store.set("active_profile_id", json!("my-camera")).await.unwrap();
        assert_eq!(
            store.get_str("active_profile_id").await,
            Some("my-camera".to_string())
        );

        let reopened = JsonKvStore::open(path).unwrap();
        assert_eq!(
            reopened.get_str("active_profile_id").await,
            Some("my-camera".to_string())
        );
    }

    #[tokio::test]
    async fn remove_clears_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonKvStore::open(dir.path().join("settings.json")).unwrap();
        store.set("k", json!(1)).await.unwrap();
        store.remove("k").await.unwrap();
        assert_eq!(store.get("k").await, None);
    }

    #[tokio::test]
    async fn corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{not json").unwrap();
        let store = JsonKvStore::open(path).unwrap();
        assert_eq!(store.get("anything").await, None);
    }
}
