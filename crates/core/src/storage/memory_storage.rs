use std::collections::BTreeMap;
use std::sync::Arc;
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Storage, StorageError, StorageResult, WriteBatch};

/// In-memory ledger backend
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    /// Ordered so that `list` is deterministic across replicas
    data: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
    /// Create a new empty memory storage
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    /// Whether nothing has been stored yet
    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn put(&self, key: &str, data: &[u8]) -> StorageResult<()> {
        let mut store = self.data.write().await;
        store.insert(key.to_string(), data.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        let store = self.data.read().await;
        store.get(key)
            .cloned()
            .ok_or_else(|| StorageError::KeyNotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let mut store = self.data.write().await;
        store.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let store = self.data.read().await;
        Ok(store.contains_key(key))
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let store = self.data.read().await;
        let keys = store.range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect();
        Ok(keys)
    }

    async fn apply_batch(&self, batch: &WriteBatch) -> StorageResult<()> {
        let mut store = self.data.write().await;
        for (key, value) in batch {
            match value {
                Some(data) => store.insert(key.clone(), data.clone()),
                None => store.remove(key),
            };
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::JsonStorage;

    #[tokio::test]
    async fn test_memory_storage_basic_operations() {
        let storage = MemoryStorage::new();
        assert!(storage.is_empty().await);

        storage.put("test1", b"Hello World").await.unwrap();
        assert_eq!(storage.get("test1").await.unwrap(), b"Hello World");

        storage.put("test1", b"Updated Content").await.unwrap();
        assert_eq!(storage.get("test1").await.unwrap(), b"Updated Content");

        storage.put("prefix/key2", b"Value 2").await.unwrap();
        storage.put("prefix/key1", b"Value 1").await.unwrap();
        storage.put("other/key3", b"Value 3").await.unwrap();

        let keys = storage.list("prefix/").await.unwrap();
        assert_eq!(keys, vec!["prefix/key1".to_string(), "prefix/key2".to_string()]);

        assert!(storage.exists("test1").await.unwrap());
        assert!(!storage.exists("nonexistent").await.unwrap());

        storage.delete("test1").await.unwrap();
        assert!(!storage.exists("test1").await.unwrap());
        assert!(matches!(
            storage.get("test1").await,
            Err(StorageError::KeyNotFound(_))
        ));
        assert_eq!(storage.len().await, 3);
    }

    #[test]
    fn test_json_storage() {
        tokio_test::block_on(async {
            let storage = MemoryStorage::new();
            let data = BTreeMap::from([
                ("key1".to_string(), "value1".to_string()),
                ("key2".to_string(), "value2".to_string()),
            ]);

            storage.put_json("json_test", &data).await.unwrap();

            let retrieved: BTreeMap<String, String> = storage.get_json("json_test").await.unwrap();
            assert_eq!(retrieved, data);
        });
    }
}
