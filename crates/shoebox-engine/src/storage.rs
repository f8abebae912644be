//! Object-storage collaborator
//!
//! The engine never touches photo bytes. It asks a [`StorageBackend`] to move
//! an object between tiers or delete it, and commits the new tier only after
//! the backend has confirmed.

use async_trait::async_trait;
use shoebox_domain::{PhotoId, StorageTier};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

/// Errors reported by a storage backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The backend could not be reached or failed transiently
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// The call did not complete within the configured timeout
    #[error("Backend call timed out after {0:?}")]
    Timeout(Duration),

    /// The backend refused the operation
    #[error("Backend rejected operation: {0}")]
    Rejected(String),
}

/// Tier placement and deletion of photo objects
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Move the photo's objects to `tier`
    async fn move_to_tier(&self, photo_id: PhotoId, tier: StorageTier) -> Result<(), StorageError>;

    /// Delete the photo's objects and release their bytes
    async fn delete(&self, photo_id: PhotoId) -> Result<(), StorageError>;
}

/// In-process backend that records placements
///
/// Used when no external backend is wired and by tests, which can inject
/// failures and latency.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    placements: Mutex<HashMap<PhotoId, StorageTier>>,
    failures_remaining: AtomicU32,
    latency_ms: AtomicU32,
    calls: AtomicUsize,
}

impl InMemoryStorage {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` calls fail with `Unavailable`
    pub fn fail_next(&self, count: u32) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Delay every call by `latency`
    pub fn set_latency(&self, latency: Duration) {
        let ms = latency.as_millis().min(u32::MAX as u128) as u32;
        self.latency_ms.store(ms, Ordering::SeqCst);
    }

    /// Tier the backend believes the photo is in, if it has seen it
    pub fn placement(&self, photo_id: PhotoId) -> Option<StorageTier> {
        self.placements
            .lock()
            .ok()
            .and_then(|p| p.get(&photo_id).copied())
    }

    /// Number of calls received, failed ones included
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn begin_call(&self) -> Result<(), StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency as u64)).await;
        }

        let injected = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StorageError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }

    fn place(&self, photo_id: PhotoId, tier: StorageTier) -> Result<(), StorageError> {
        let mut placements = self
            .placements
            .lock()
            .map_err(|_| StorageError::Unavailable("placement table poisoned".to_string()))?;
        if placements.get(&photo_id) == Some(&StorageTier::Deleted) && tier != StorageTier::Deleted {
            return Err(StorageError::Rejected(format!("photo {} is deleted", photo_id)));
        }
        placements.insert(photo_id, tier);
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for InMemoryStorage {
    async fn move_to_tier(&self, photo_id: PhotoId, tier: StorageTier) -> Result<(), StorageError> {
        self.begin_call().await?;
        if tier == StorageTier::Deleted {
            return Err(StorageError::Rejected(
                "use delete to remove a photo".to_string(),
            ));
        }
        self.place(photo_id, tier)
    }

    async fn delete(&self, photo_id: PhotoId) -> Result<(), StorageError> {
        self.begin_call().await?;
        self.place(photo_id, StorageTier::Deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_placements() {
        let storage = InMemoryStorage::new();
        let id = PhotoId::new();
        assert_eq!(storage.placement(id), None);

        storage.move_to_tier(id, StorageTier::Cold).await.unwrap();
        assert_eq!(storage.placement(id), Some(StorageTier::Cold));

        // Moves are idempotent
        storage.move_to_tier(id, StorageTier::Cold).await.unwrap();
        storage.delete(id).await.unwrap();
        assert_eq!(storage.placement(id), Some(StorageTier::Deleted));
        assert_eq!(storage.calls(), 3);
    }

    #[tokio::test]
    async fn test_deleted_objects_cannot_move() {
        let storage = InMemoryStorage::new();
        let id = PhotoId::new();
        storage.delete(id).await.unwrap();
        assert!(matches!(
            storage.move_to_tier(id, StorageTier::Cold).await,
            Err(StorageError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn test_injected_failures_run_out() {
        let storage = InMemoryStorage::new();
        let id = PhotoId::new();
        storage.fail_next(2);

        assert!(storage.delete(id).await.is_err());
        assert!(storage.delete(id).await.is_err());
        assert!(storage.delete(id).await.is_ok());
        assert_eq!(storage.calls(), 3);
    }
}
