use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use super::{ArtifactStore, StorageError, WriteLease, validate_name};

/// In-process store used by tests and ephemeral pipelines.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
    loads: Mutex<HashMap<String, usize>>,
    writing: Arc<AtomicBool>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful loads served for `name`.
    pub fn load_count(&self, name: &str) -> usize {
        self.loads
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    /// Stored keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn save(&self, name: &str, bytes: &[u8]) -> Result<(), StorageError> {
        validate_name(name)?;
        self.entries
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .insert(name.to_string(), bytes.to_vec());
        Ok(())
    }

    fn load(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        validate_name(name)?;
        let bytes = self
            .entries
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                name: name.to_string(),
            })?;
        *self
            .loads
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .entry(name.to_string())
            .or_insert(0) += 1;
        Ok(bytes)
    }

    fn exists(&self, name: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .contains_key(name)
    }

    fn remove(&self, name: &str) -> Result<(), StorageError> {
        validate_name(name)?;
        self.entries
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .remove(name);
        Ok(())
    }

    fn acquire_write(&self) -> Result<WriteLease, StorageError> {
        WriteLease::try_acquire(&self.writing)
    }
}
