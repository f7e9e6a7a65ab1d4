//! Site storage seam for publish and unpublish jobs.
//!
//! The handle is constructed lazily: the orchestrator only builds one when
//! the resolved handler declares it needs storage, so check-only
//! deployments never touch the backend at all.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use vellum_core::types::VersionId;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage backend unavailable: {message}")]
    Unavailable { message: String },
}

pub trait StorageBackend: Send + Sync {
    /// Makes the version available on the public site.
    fn put_published(&self, version_id: &VersionId) -> Result<(), StorageError>;
    /// Retracts the version from the public site.
    fn remove_published(&self, version_id: &VersionId) -> Result<(), StorageError>;
    fn is_published(&self, version_id: &VersionId) -> Result<bool, StorageError>;
}

/// Builds a storage handle on demand.
pub type StorageFactory =
    Arc<dyn Fn() -> Result<Arc<dyn StorageBackend>, StorageError> + Send + Sync>;

/// In-memory reference backend. Tracks published version ids; enough for
/// tests and single-process deployments.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    published: Mutex<BTreeSet<VersionId>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryStorage {
    fn put_published(&self, version_id: &VersionId) -> Result<(), StorageError> {
        self.published
            .lock()
            .expect("storage lock")
            .insert(version_id.clone());
        Ok(())
    }

    fn remove_published(&self, version_id: &VersionId) -> Result<(), StorageError> {
        self.published
            .lock()
            .expect("storage lock")
            .remove(version_id);
        Ok(())
    }

    fn is_published(&self, version_id: &VersionId) -> Result<bool, StorageError> {
        Ok(self
            .published
            .lock()
            .expect("storage lock")
            .contains(version_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_then_unpublish_roundtrip() {
        let storage = MemoryStorage::new();
        let id = VersionId::new("V1");

        assert!(!storage.is_published(&id).unwrap());
        storage.put_published(&id).unwrap();
        assert!(storage.is_published(&id).unwrap());
        storage.remove_published(&id).unwrap();
        assert!(!storage.is_published(&id).unwrap());
    }

    #[test]
    fn remove_of_unknown_version_is_a_no_op() {
        let storage = MemoryStorage::new();
        storage.remove_published(&VersionId::new("ghost")).unwrap();
        assert!(!storage.is_published(&VersionId::new("ghost")).unwrap());
    }
}
