//! Block-scoped transactional view over a [`Storage`] backend
//!
//! Every write made while applying a block lands in an ordered overlay.
//! The host either commits the overlay once the block has been applied or
//! discards it when block application aborts, so a block is never partially
//! committed.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use super::{Record, Storage, StorageError, StorageResult, WriteBatch};

/// A saved overlay, restorable with [`LedgerState::rollback`]
#[derive(Debug, Clone)]
pub struct Checkpoint(WriteBatch);

/// Transactional ledger state handle for a single block
pub struct LedgerState {
    backing: Arc<dyn Storage>,
    /// `None` marks a deletion
    pending: WriteBatch,
}

impl LedgerState {
    /// Open a fresh, empty overlay on top of `backing`
    pub fn new(backing: Arc<dyn Storage>) -> Self {
        Self {
            backing,
            pending: WriteBatch::new(),
        }
    }

    /// Read raw bytes, preferring uncommitted writes
    pub async fn get_raw(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        if let Some(pending) = self.pending.get(key) {
            return Ok(pending.clone());
        }

        match self.backing.get(key).await {
            Ok(data) => Ok(Some(data)),
            Err(StorageError::KeyNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Load a record; an absent record is `None`, not an error
    pub async fn get_record<T: Record>(&self, id: &str) -> StorageResult<Option<T>> {
        match self.get_raw(&T::key(id)).await? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    /// Write a record into the overlay and hand back its id
    pub fn update_record<T: Record>(&mut self, id: &str, value: &T) -> StorageResult<String> {
        let data = serde_json::to_vec(value)?;
        self.pending.insert(T::key(id), Some(data));
        Ok(id.to_string())
    }

    /// Mark a record as deleted
    pub fn delete_record<T: Record>(&mut self, id: &str) {
        self.pending.insert(T::key(id), None);
    }

    /// Ids of every visible record of type `T`, in ascending order
    pub async fn list_ids<T: Record>(&self) -> StorageResult<Vec<String>> {
        let prefix = format!("{}/", T::TABLE);
        let mut keys: BTreeSet<String> = self.backing.list(&prefix).await?.into_iter().collect();

        for (key, value) in self.pending.range(prefix.clone()..) {
            if !key.starts_with(&prefix) {
                break;
            }
            match value {
                Some(_) => keys.insert(key.clone()),
                None => keys.remove(key),
            };
        }

        Ok(keys
            .into_iter()
            .map(|key| key[prefix.len()..].to_string())
            .collect())
    }

    /// Snapshot the overlay
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint(self.pending.clone())
    }

    /// Drop every write made after `checkpoint` was taken
    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        self.pending = checkpoint.0;
    }

    /// Number of uncommitted writes
    pub fn pending_writes(&self) -> usize {
        self.pending.len()
    }

    /// Flush the overlay to the backend as one batch
    ///
    /// On failure nothing reaches the backend and the overlay is kept.
    pub async fn commit(&mut self) -> StorageResult<usize> {
        self.backing.apply_batch(&self.pending).await?;
        let count = self.pending.len();
        self.pending.clear();

        debug!("Committed {} ledger writes", count);
        Ok(count)
    }

    /// Abandon every uncommitted write
    pub fn discard(&mut self) {
        let dropped = self.pending.len();
        self.pending.clear();
        debug!("Discarded {} ledger writes", dropped);
    }
}

impl fmt::Debug for LedgerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LedgerState")
            .field("pending_writes", &self.pending.len())
            .finish()
    }
}
