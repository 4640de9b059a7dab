use std::collections::BTreeMap;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Storage-related errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Unexpected error: {0}")]
    Other(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Writes applied together by [`Storage::apply_batch`]; `None` deletes the key
pub type WriteBatch = BTreeMap<String, Option<Vec<u8>>>;

/// The key-value primitives every ledger backend must support
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    /// Store data at the specified key
    async fn put(&self, key: &str, data: &[u8]) -> StorageResult<()>;

    /// Retrieve data from the specified key
    async fn get(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Delete data at the specified key
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Check if a key exists
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// List all keys with a given prefix, in ascending key order
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Apply every write of `batch` or none of them
    async fn apply_batch(&self, batch: &WriteBatch) -> StorageResult<()>;
}

/// Extension trait for JSON serialization/deserialization
#[async_trait]
pub trait JsonStorage: Storage {
    /// Store a serializable value at the specified key
    async fn put_json<T>(&self, key: &str, value: &T) -> StorageResult<()>
    where
        T: Serialize + Send + Sync,
    {
        let json_data = serde_json::to_vec(value)?;
        self.put(key, &json_data).await
    }

    /// Retrieve and deserialize a value from the specified key
    async fn get_json<T: DeserializeOwned + Send>(&self, key: &str) -> StorageResult<T> {
        let data = self.get(key).await?;
        Ok(serde_json::from_slice(&data)?)
    }
}

// Implement JsonStorage for any type that implements Storage
#[async_trait]
impl<T: Storage> JsonStorage for T {}

/// An entity persisted in the ledger state, addressed by `"{TABLE}/{id}"`
pub trait Record: Serialize + DeserializeOwned + Send + Sync {
    /// Table name, also used as the identifier prefix for new rows
    const TABLE: &'static str;

    /// Build the storage key for a record id
    fn key(id: &str) -> String {
        format!("{}/{}", Self::TABLE, id)
    }
}

pub mod file_storage;
pub mod ledger_state;
pub mod memory_storage;
pub mod mock_storage;

pub use file_storage::FileStorage;
pub use ledger_state::{Checkpoint, LedgerState};
pub use memory_storage::MemoryStorage;
pub use mock_storage::MockStorage;
