//! Durable persistence for the offline queue.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::queue::QueueItem;

/// Persistence contract for the queue.
///
/// `save` replaces the whole list; callers serialize their writes (single
/// writer), so the store itself needs no internal ordering.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Load all persisted items. A store that has never been written to
    /// returns an empty list.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` on read or decode failures.
    async fn load(&self) -> Result<Vec<QueueItem>, StoreError>;

    /// Persist the full item list, replacing any previous contents.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` on write failures.
    async fn save(&self, items: &[QueueItem]) -> Result<(), StoreError>;
}

/// JSON file store. Writes go to a sibling temp file first and are renamed
/// into place, so a crash mid-write never corrupts the queue.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        PathBuf::from(tmp)
    }
}

#[async_trait]
impl QueueStore for FileStore {
    async fn load(&self) -> Result<Vec<QueueItem>, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn save(&self, items: &[QueueItem]) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(items)?;
        let tmp = self.tmp_path();
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

/// In-memory store for tests and prototyping.
#[derive(Default)]
pub struct MemoryStore {
    items: Mutex<Vec<QueueItem>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the persisted items, for assertions.
    ///
    /// # Panics
    ///
    /// Panics if the lock is poisoned.
    #[must_use]
    pub fn snapshot(&self) -> Vec<QueueItem> {
        self.items.lock().expect("store lock poisoned").clone()
    }
}

#[async_trait]
impl QueueStore for MemoryStore {
    async fn load(&self) -> Result<Vec<QueueItem>, StoreError> {
        Ok(self.snapshot())
    }

    async fn save(&self, items: &[QueueItem]) -> Result<(), StoreError> {
        *self.items.lock().expect("store lock poisoned") = items.to_vec();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use workout_core::Pointer;
    use workout_core::model::{EventId, ProgressUpdate};
    use workout_core::time::fixed_now;

    fn item() -> QueueItem {
        QueueItem::new(
            EventId::generate(),
            ProgressUpdate {
                event_id: None,
                current_pointer: Some(Pointer::origin()),
                set_update: None,
            },
            fixed_now(),
        )
    }

    #[tokio::test]
    async fn missing_file_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("queue.json"));
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn file_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("queue.json"));
        let items = vec![item(), item()];

        store.save(&items).await.unwrap();
        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, items);

        // No temp file left behind after a successful write.
        assert!(!store.tmp_path().exists());
    }

    #[tokio::test]
    async fn save_replaces_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("queue.json"));

        store.save(&[item(), item()]).await.unwrap();
        store.save(&[item()]).await.unwrap();
        assert_eq!(store.load().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn memory_store_round_trips() {
        let store = MemoryStore::new();
        let items = vec![item()];
        store.save(&items).await.unwrap();
        assert_eq!(store.load().await.unwrap(), items);
    }
}
