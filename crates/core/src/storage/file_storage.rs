use std::path::{Path, PathBuf};
use std::sync::Arc;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{Storage, StorageError, StorageResult, WriteBatch};

const JOURNAL: &str = "journal";
const JOURNAL_TMP: &str = "journal.tmp";
const STAGED_SUFFIX: &str = ".staged";

/// One step of a committed batch
#[derive(Debug, Clone, Serialize, Deserialize)]
struct JournalEntry {
    /// File name of the key
    file: String,
    /// Move the staged file into place, or delete the key
    write: bool,
}

/// A directory-backed ledger
///
/// Every key lives in its own file named after the hex encoding of the key,
/// so record ids never have to be valid path components. Batches are staged
/// next to their targets and become visible through a journal: once the
/// journal is in place the batch is replayed to completion, also by the
/// next [`FileStorage::new`] after a crash.
#[derive(Debug, Clone)]
pub struct FileStorage {
    base_path: PathBuf,
    sync_write: bool,
    batch_lock: Arc<Mutex<()>>,
}

impl FileStorage {
    /// Open (creating if needed) a storage directory and finish any interrupted batch
    pub async fn new(base_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path).await?;

        let storage = Self {
            base_path,
            sync_write: false,
            batch_lock: Arc::new(Mutex::new(())),
        };
        storage.recover().await?;
        Ok(storage)
    }

    /// fsync every write
    pub fn with_sync_write(mut self, sync_write: bool) -> Self {
        self.sync_write = sync_write;
        self
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn file_name(key: &str) -> String {
        hex::encode(key.as_bytes())
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.base_path.join(Self::file_name(key))
    }

    fn staged_path(&self, file: &str) -> PathBuf {
        self.base_path.join(format!("{}{}", file, STAGED_SUFFIX))
    }

    async fn write_file(&self, path: &Path, data: &[u8]) -> StorageResult<()> {
        let mut file = fs::File::create(path).await?;
        file.write_all(data).await?;
        if self.sync_write {
            file.sync_all().await?;
        }
        Ok(())
    }

    async fn remove_if_present(path: &Path) -> StorageResult<()> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Move staged files into place and apply deletions, then drop the journal
    async fn replay(&self, entries: &[JournalEntry]) -> StorageResult<()> {
        for entry in entries {
            let target = self.base_path.join(&entry.file);
            if entry.write {
                let staged = self.staged_path(&entry.file);
                // already moved by an earlier, interrupted replay
                if fs::try_exists(&staged).await? {
                    fs::rename(&staged, &target).await?;
                }
            } else {
                Self::remove_if_present(&target).await?;
            }
        }
        Self::remove_if_present(&self.base_path.join(JOURNAL)).await
    }

    /// Finish a journaled batch and sweep staging leftovers of an uncommitted one
    async fn recover(&self) -> StorageResult<()> {
        let journal = self.base_path.join(JOURNAL);
        if fs::try_exists(&journal).await? {
            let entries: Vec<JournalEntry> = serde_json::from_slice(&fs::read(&journal).await?)?;
            info!("Replaying interrupted batch of {} writes", entries.len());
            self.replay(&entries).await?;
        }

        let mut dir = fs::read_dir(&self.base_path).await?;
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.ends_with(STAGED_SUFFIX) || name == JOURNAL_TMP {
                Self::remove_if_present(&entry.path()).await?;
            }
        }
        Ok(())
    }

    async fn discard_staged(&self, entries: &[JournalEntry]) {
        for entry in entries.iter().filter(|e| e.write) {
            if let Err(e) = Self::remove_if_present(&self.staged_path(&entry.file)).await {
                debug!("Could not remove staged file {}: {}", entry.file, e);
            }
        }
    }

    async fn stage(&self, batch: &WriteBatch, entries: &[JournalEntry]) -> StorageResult<()> {
        for ((_, value), entry) in batch.iter().zip(entries) {
            if let Some(data) = value {
                self.write_file(&self.staged_path(&entry.file), data).await?;
            }
        }

        let journal = serde_json::to_vec(entries)?;
        let tmp = self.base_path.join(JOURNAL_TMP);
        self.write_file(&tmp, &journal).await?;
        fs::rename(&tmp, self.base_path.join(JOURNAL)).await?;
        Ok(())
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn put(&self, key: &str, data: &[u8]) -> StorageResult<()> {
        self.write_file(&self.path_for(key), data).await?;
        debug!("Stored {} bytes at {}", data.len(), key);
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        match fs::read(self.path_for(key)).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::KeyNotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        Self::remove_if_present(&self.path_for(key)).await
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(fs::try_exists(self.path_for(key)).await?)
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut entries = fs::read_dir(&self.base_path).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(encoded) = name.to_str() else { continue };
            // foreign files in the directory are skipped
            let Ok(raw) = hex::decode(encoded) else { continue };
            let Ok(key) = String::from_utf8(raw) else { continue };
            if key.starts_with(prefix) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn apply_batch(&self, batch: &WriteBatch) -> StorageResult<()> {
        let _guard = self.batch_lock.lock().await;
        let entries: Vec<JournalEntry> = batch
            .iter()
            .map(|(key, value)| JournalEntry {
                file: Self::file_name(key),
                write: value.is_some(),
            })
            .collect();

        if let Err(e) = self.stage(batch, &entries).await {
            self.discard_staged(&entries).await;
            return Err(e);
        }
        self.replay(&entries).await?;

        debug!("Applied batch of {} writes", entries.len());
        Ok(())
    }
}
