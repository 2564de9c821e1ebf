//! Named artifact storage for fitted transforms, models and explainers.
//!
//! Artifacts are JSON envelopes stamped with a format version and the id of
//! the training run that produced them. A run stages its artifacts under
//! run-scoped keys and becomes visible only when the `current` pointer is
//! replaced, so readers see either the whole previous run or the whole new
//! one.

mod fs_store;
mod lazy;
mod memory;

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub use fs_store::FsArtifactStore;
pub use lazy::LazyArtifact;
pub use memory::MemoryArtifactStore;

/// Envelope format understood by this build.
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;
/// Key of the pointer naming the published run.
pub const CURRENT_RUN: &str = "current";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("artifact `{name}` not found")]
    NotFound { name: String },
    #[error("invalid artifact name {0:?}")]
    InvalidName(String),
    #[error("artifact storage is locked by another training run")]
    Busy,
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("artifact `{name}` has unsupported format version {found}")]
    UnsupportedFormat { name: String, found: u32 },
    #[error("artifact `{name}` holds a `{found}` payload")]
    KindMismatch { name: String, found: String },
    #[error("artifact `{name}` belongs to run {found}, expected run {expected}")]
    RunMismatch {
        name: String,
        expected: Uuid,
        found: Uuid,
    },
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}

/// Key-value persistence surface for artifacts.
pub trait ArtifactStore: Send + Sync {
    /// Publish `bytes` under `name`, replacing any previous value atomically.
    fn save(&self, name: &str, bytes: &[u8]) -> Result<(), StorageError>;

    /// Read the bytes stored under `name`; missing keys yield [`StorageError::NotFound`].
    fn load(&self, name: &str) -> Result<Vec<u8>, StorageError>;

    fn exists(&self, name: &str) -> bool;

    /// Delete `name`; removing a missing key is not an error.
    fn remove(&self, name: &str) -> Result<(), StorageError>;

    /// Take the exclusive write lease held for the duration of a training run.
    fn acquire_write(&self) -> Result<WriteLease, StorageError>;
}

/// Exclusive write access to a store; released on drop.
#[derive(Debug)]
pub struct WriteLease {
    flag: Arc<AtomicBool>,
    lock_file: Option<File>,
}

impl WriteLease {
    pub(crate) fn try_acquire(flag: &Arc<AtomicBool>) -> Result<Self, StorageError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| StorageError::Busy)?;
        Ok(Self {
            flag: Arc::clone(flag),
            lock_file: None,
        })
    }

    /// Hold `file`, already locked exclusively, until the lease drops.
    pub(crate) fn with_lock_file(mut self, file: File) -> Self {
        self.lock_file = Some(file);
        self
    }
}

impl Drop for WriteLease {
    fn drop(&mut self) {
        if let Some(file) = self.lock_file.take() {
            let _ = file.unlock();
        }
        self.flag.store(false, Ordering::Release);
    }
}

/// Artifact payload together with the run that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub run_id: Uuid,
    pub created_at: i64,
    pub value: T,
}

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    format_version: u32,
    kind: String,
    run_id: Uuid,
    created_at: i64,
    payload: T,
}

/// Artifacts written by one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: Uuid,
    pub artifacts: Vec<String>,
}

impl RunManifest {
    pub fn new(run_id: Uuid, artifacts: &[&str]) -> Self {
        Self {
            run_id,
            artifacts: artifacts.iter().map(|name| name.to_string()).collect(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.artifacts.iter().any(|artifact| artifact == name)
    }
}

/// Published run plus the one it replaced, kept for readers mid-load.
#[derive(Serialize, Deserialize)]
struct RunPointer {
    current: RunManifest,
    #[serde(default)]
    previous: Option<RunManifest>,
}

/// Store key of artifact `name` written by `run_id`.
pub fn run_key(name: &str, run_id: Uuid) -> String {
    format!("{name}-{}", run_id.simple())
}

/// Write `payload` for `run_id` without making it visible to readers.
pub fn stage_artifact<T: Serialize>(
    store: &dyn ArtifactStore,
    name: &str,
    run_id: Uuid,
    payload: &T,
) -> Result<(), StorageError> {
    let bytes = write_envelope(store, &run_key(name, run_id), name, run_id, payload)?;
    debug!("Staged artifact `{name}` ({bytes} bytes, run {run_id})");
    Ok(())
}

/// Make `manifest` the current run with a single atomic pointer swap.
///
/// Runs older than the one being replaced are deleted afterwards; failures
/// there are logged and leave orphaned keys behind.
pub fn publish_run(store: &dyn ArtifactStore, manifest: RunManifest) -> Result<(), StorageError> {
    let replaced = match read_envelope::<RunPointer>(store, CURRENT_RUN, CURRENT_RUN) {
        Ok(pointer) => Some(pointer.payload),
        Err(StorageError::NotFound { .. }) => None,
        Err(err) => return Err(err),
    };
    let run_id = manifest.run_id;
    let pointer = RunPointer {
        current: manifest,
        previous: replaced.as_ref().map(|pointer| pointer.current.clone()),
    };
    write_envelope(store, CURRENT_RUN, CURRENT_RUN, run_id, &pointer)?;
    info!("Published run {run_id}");
    if let Some(stale) = replaced.and_then(|pointer| pointer.previous)
        && stale.run_id != run_id
    {
        discard_run(store, &stale);
    }
    Ok(())
}

/// Best-effort removal of every key a run staged.
pub fn discard_run(store: &dyn ArtifactStore, manifest: &RunManifest) {
    for name in &manifest.artifacts {
        if let Err(err) = store.remove(&run_key(name, manifest.run_id)) {
            warn!("Failed to remove `{name}` of run {}: {err}", manifest.run_id);
        }
    }
}

/// Manifest of the published run.
pub fn current_run(store: &dyn ArtifactStore) -> Result<RunManifest, StorageError> {
    Ok(read_envelope::<RunPointer>(store, CURRENT_RUN, CURRENT_RUN)?
        .payload
        .current)
}

/// Load `name` from the published run.
pub fn load_artifact<T: DeserializeOwned>(
    store: &dyn ArtifactStore,
    name: &str,
) -> Result<Versioned<T>, StorageError> {
    let manifest = current_run(store).map_err(|err| match err {
        StorageError::NotFound { .. } => not_found(name),
        other => other,
    })?;
    load_run_artifact(store, &manifest, name)
}

/// Load `name` from the run described by `manifest`.
pub fn load_run_artifact<T: DeserializeOwned>(
    store: &dyn ArtifactStore,
    manifest: &RunManifest,
    name: &str,
) -> Result<Versioned<T>, StorageError> {
    if !manifest.contains(name) {
        return Err(not_found(name));
    }
    let envelope = read_envelope::<T>(store, &run_key(name, manifest.run_id), name)?;
    if envelope.run_id != manifest.run_id {
        return Err(StorageError::RunMismatch {
            name: name.to_string(),
            expected: manifest.run_id,
            found: envelope.run_id,
        });
    }
    Ok(Versioned {
        run_id: envelope.run_id,
        created_at: envelope.created_at,
        value: envelope.payload,
    })
}

fn write_envelope<T: Serialize>(
    store: &dyn ArtifactStore,
    key: &str,
    kind: &str,
    run_id: Uuid,
    payload: &T,
) -> Result<usize, StorageError> {
    let envelope = Envelope {
        format_version: ARTIFACT_FORMAT_VERSION,
        kind: kind.to_string(),
        run_id,
        created_at: time::OffsetDateTime::now_utc().unix_timestamp(),
        payload,
    };
    let bytes = serde_json::to_vec(&envelope)?;
    store.save(key, &bytes)?;
    Ok(bytes.len())
}

fn read_envelope<T: DeserializeOwned>(
    store: &dyn ArtifactStore,
    key: &str,
    kind: &str,
) -> Result<Envelope<T>, StorageError> {
    let bytes = store.load(key).map_err(|err| match err {
        StorageError::NotFound { .. } => not_found(kind),
        other => other,
    })?;
    let envelope: Envelope<T> = serde_json::from_slice(&bytes)?;
    if envelope.format_version != ARTIFACT_FORMAT_VERSION {
        return Err(StorageError::UnsupportedFormat {
            name: kind.to_string(),
            found: envelope.format_version,
        });
    }
    if envelope.kind != kind {
        return Err(StorageError::KindMismatch {
            name: kind.to_string(),
            found: envelope.kind,
        });
    }
    Ok(envelope)
}

fn not_found(name: &str) -> StorageError {
    StorageError::NotFound {
        name: name.to_string(),
    }
}

pub(crate) fn validate_name(name: &str) -> Result<(), StorageError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidName(name.to_string()))
    }
}
