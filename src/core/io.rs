use crate::core::ServiceBounds;
use anyhow::Result;
use async_trait::async_trait;

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait Storage: ServiceBounds {
    async fn read(&self, path: &str) -> Result<Vec<u8>>;
    async fn write(&self, path: &str, content: &[u8]) -> Result<()>;
    async fn exists(&self, path: &str) -> Result<bool>;
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

// --- Native Implementation ---

#[cfg(not(target_arch = "wasm32"))]
pub struct NativeStorage {
    root: std::path::PathBuf,
}

#[cfg(not(target_arch = "wasm32"))]
impl NativeStorage {
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> std::path::PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

#[cfg(not(target_arch = "wasm32"))]
#[async_trait]
impl Storage for NativeStorage {
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(self.resolve(path)).await?)
    }

    async fn write(&self, path: &str, content: &[u8]) -> Result<()> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(full, content).await?;
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.resolve(path)).await?)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let dir_path = self.resolve(prefix);
        let mut entries = Vec::new();

        if dir_path.is_dir() {
            let mut dir = tokio::fs::read_dir(&dir_path).await?;
            while let Some(entry) = dir.next_entry().await? {
                let name = entry.file_name().to_string_lossy().to_string();
                entries.push(format!("{}/{}", prefix.trim_end_matches('/'), name));
            }
        }

        entries.sort();
        Ok(entries)
    }
}

// --- Web Implementation ---

#[cfg(target_arch = "wasm32")]
use anyhow::anyhow;
#[cfg(target_arch = "wasm32")]
use idb::{Factory, ObjectStoreParams, TransactionMode};
#[cfg(target_arch = "wasm32")]
use wasm_bindgen::JsValue;

#[cfg(target_arch = "wasm32")]
const DB_NAME: &str = "storyreel_db";
#[cfg(target_arch = "wasm32")]
const STORE_NAME: &str = "records";

#[cfg(target_arch = "wasm32")]
pub struct WebStorage {
    db: idb::Database,
}

#[cfg(target_arch = "wasm32")]
impl WebStorage {
    pub async fn new() -> Result<Self> {
        let factory = Factory::new().map_err(|e| anyhow!("Failed to create factory: {:?}", e))?;
        let mut open_request = factory
            .open(DB_NAME, Some(1))
            .map_err(|e| anyhow!("Failed to open DB: {:?}", e))?;

        open_request.on_upgrade_needed(|event| {
            let Ok(db) = event.database() else {
                log::error!("IndexedDB upgrade without a database");
                return;
            };
            if !db.store_names().iter().any(|n| n.as_str() == STORE_NAME) {
                if let Err(e) = db.create_object_store(STORE_NAME, ObjectStoreParams::new()) {
                    log::error!("Failed to create object store: {:?}", e);
                }
            }
        });

        let db = open_request
            .await
            .map_err(|e| anyhow!("Failed to await DB open: {:?}", e))?;
        Ok(Self { db })
    }

    fn store(&self, mode: TransactionMode) -> Result<(idb::Transaction, idb::ObjectStore)> {
        let transaction = self
            .db
            .transaction(&[STORE_NAME], mode)
            .map_err(|e| anyhow!("Tx error: {:?}", e))?;
        let store = transaction
            .object_store(STORE_NAME)
            .map_err(|e| anyhow!("Store error: {:?}", e))?;
        Ok((transaction, store))
    }
}

#[cfg(target_arch = "wasm32")]
#[async_trait(?Send)]
impl Storage for WebStorage {
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let (_tx, store) = self.store(TransactionMode::ReadOnly)?;
        let value = store
            .get(JsValue::from_str(path))
            .map_err(|e| anyhow!("Get error: {:?}", e))?
            .await
            .map_err(|e| anyhow!("Get await error: {:?}", e))?;

        match value {
            Some(v) => Ok(js_sys::Uint8Array::new(&v).to_vec()),
            None => Err(anyhow!("Record not found: {}", path)),
        }
    }

    async fn write(&self, path: &str, content: &[u8]) -> Result<()> {
        let (transaction, store) = self.store(TransactionMode::ReadWrite)?;
        let array = js_sys::Uint8Array::from(content);

        store
            .put(&array, Some(&JsValue::from_str(path)))
            .map_err(|e| anyhow!("Put error: {:?}", e))?
            .await
            .map_err(|e| anyhow!("Put await error: {:?}", e))?;

        transaction
            .commit()
            .map_err(|e| anyhow!("Commit error: {:?}", e))?
            .await
            .map_err(|e| anyhow!("Commit await error: {:?}", e))?;
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let (_tx, store) = self.store(TransactionMode::ReadOnly)?;
        let key = store
            .get_key(JsValue::from_str(path))
            .map_err(|e| anyhow!("GetKey error: {:?}", e))?
            .await
            .map_err(|e| anyhow!("GetKey await error: {:?}", e))?;
        Ok(key.is_some())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let (_tx, store) = self.store(TransactionMode::ReadOnly)?;
        let keys = store
            .get_all_keys(None, None)
            .map_err(|e| anyhow!("GetAllKeys error: {:?}", e))?
            .await
            .map_err(|e| anyhow!("GetAllKeys await error: {:?}", e))?;

        let dir = format!("{}/", prefix.trim_end_matches('/'));
        let mut results: Vec<String> = keys
            .into_iter()
            .filter_map(|k| k.as_string())
            .filter(|k| k.strip_prefix(&dir).is_some_and(|rest| !rest.contains('/')))
            .collect();
        results.sort();
        Ok(results)
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_native_storage_roundtrip() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let storage = NativeStorage::new(dir.path());

        assert!(!storage.exists("user/a.json").await?);
        storage.write("user/a.json", b"{}").await?;
        storage.write("user/b.json", b"[]").await?;

        assert!(storage.exists("user/a.json").await?);
        assert_eq!(storage.read("user/b.json").await?, b"[]");
        assert_eq!(
            storage.list("user").await?,
            vec!["user/a.json".to_string(), "user/b.json".to_string()]
        );

        assert_eq!(storage.list("user/").await?.len(), 2);
        assert!(storage.list("nobody").await?.is_empty());
        Ok(())
    }
}
