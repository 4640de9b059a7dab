//! Mock storage implementation for testing
//!
//! Behaves like [`MemoryStorage`](super::MemoryStorage) until told to fail,
//! after which operations on keys under the failing prefix return
//! `StorageError::Other`. A failing batch is rejected before any of its
//! writes is applied.

use async_trait::async_trait;
use std::sync::{Arc, RwLock};

use super::{MemoryStorage, Storage, StorageError, StorageResult, WriteBatch};

#[derive(Debug, Clone)]
struct Fault {
    prefix: String,
    writes_only: bool,
}

/// A memory-based storage with fault injection
#[derive(Debug, Clone, Default)]
pub struct MockStorage {
    inner: MemoryStorage,
    fault: Arc<RwLock<Option<Fault>>>,
}

impl MockStorage {
    /// Create a new MockStorage
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation on keys starting with `prefix` fail
    pub fn fail_on(&self, prefix: impl Into<String>) {
        self.inject(Some(Fault { prefix: prefix.into(), writes_only: false }));
    }

    /// Make writes and deletes of keys starting with `prefix` fail; reads still work
    pub fn fail_writes_on(&self, prefix: impl Into<String>) {
        self.inject(Some(Fault { prefix: prefix.into(), writes_only: true }));
    }

    /// Stop injecting failures
    pub fn heal(&self) {
        self.inject(None);
    }

    fn inject(&self, fault: Option<Fault>) {
        if let Ok(mut current) = self.fault.write() {
            *current = fault;
        }
    }

    fn check(&self, key: &str, write: bool) -> StorageResult<()> {
        let fault = self.fault.read()
            .map_err(|_| StorageError::Other("fault injection lock poisoned".to_string()))?;
        match fault.as_ref() {
            Some(f) if key.starts_with(&f.prefix) && (write || !f.writes_only) => {
                Err(StorageError::Other(format!("injected failure for {}", key)))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl Storage for MockStorage {
    async fn put(&self, key: &str, data: &[u8]) -> StorageResult<()> {
        self.check(key, true)?;
        self.inner.put(key, data).await
    }

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        self.check(key, false)?;
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.check(key, true)?;
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.check(key, false)?;
        self.inner.exists(key).await
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        self.check(prefix, false)?;
        self.inner.list(prefix).await
    }

    async fn apply_batch(&self, batch: &WriteBatch) -> StorageResult<()> {
        for key in batch.keys() {
            self.check(key, true)?;
        }
        self.inner.apply_batch(batch).await
    }
}
