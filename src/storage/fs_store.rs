use std::fs::{self, OpenOptions, TryLockError};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use tempfile::NamedTempFile;

use super::{ArtifactStore, StorageError, WriteLease, validate_name};

const LOCK_FILE_NAME: &str = ".train.lock";

/// Directory-backed store writing one `<name>.json` file per artifact.
///
/// Saves go through a temporary file in the same directory followed by a
/// rename, so concurrent readers never observe a partially written file.
/// Training runs in other processes are excluded by an OS lock on
/// `.train.lock`, which the kernel releases if the holder dies.
#[derive(Debug)]
pub struct FsArtifactStore {
    dir: PathBuf,
    writing: Arc<AtomicBool>,
}

impl FsArtifactStore {
    /// Open (and create if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StorageError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self {
            dir,
            writing: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, StorageError> {
        validate_name(name)?;
        Ok(self.dir.join(format!("{name}.json")))
    }
}

impl ArtifactStore for FsArtifactStore {
    fn save(&self, name: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let dest = self.path_for(name)?;
        let io_err = |source| StorageError::Io {
            path: dest.clone(),
            source,
        };
        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(io_err)?;
        tmp.write_all(bytes).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(&dest).map_err(|err| io_err(err.error))?;
        Ok(())
    }

    fn load(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path_for(name)?;
        fs::read(&path).map_err(|source| match source.kind() {
            ErrorKind::NotFound => StorageError::NotFound {
                name: name.to_string(),
            },
            _ => StorageError::Io { path, source },
        })
    }

    fn exists(&self, name: &str) -> bool {
        self.path_for(name).map(|path| path.is_file()).unwrap_or(false)
    }

    fn remove(&self, name: &str) -> Result<(), StorageError> {
        let path = self.path_for(name)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io { path, source }),
        }
    }

    fn acquire_write(&self) -> Result<WriteLease, StorageError> {
        let lease = WriteLease::try_acquire(&self.writing)?;
        let lock_path = self.dir.join(LOCK_FILE_NAME);
        let io_err = |source| StorageError::Io {
            path: lock_path.clone(),
            source,
        };
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(io_err)?;
        match file.try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => return Err(StorageError::Busy),
            Err(TryLockError::Error(source)) => return Err(io_err(source)),
        }
        // Holder pid, for operators only.
        let _ = file.set_len(0).and_then(|()| writeln!(file, "{}", std::process::id()));
        Ok(lease.with_lock_file(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn save_then_load_round_trips_bytes() {
        let dir = tempdir().unwrap();
        let store = FsArtifactStore::open(dir.path().join("artifacts")).unwrap();
        store.save("model", b"{\"a\":1}").unwrap();
        assert!(store.exists("model"));
        assert_eq!(store.load("model").unwrap(), b"{\"a\":1}");
        assert!(store.dir().join("model.json").is_file());
    }

    #[test]
    fn overwrite_replaces_previous_contents() {
        let dir = tempdir().unwrap();
        let store = FsArtifactStore::open(dir.path()).unwrap();
        store.save("model", b"first").unwrap();
        store.save("model", b"second").unwrap();
        assert_eq!(store.load("model").unwrap(), b"second");
        let leftovers = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn missing_key_is_not_found() {
        let dir = tempdir().unwrap();
        let store = FsArtifactStore::open(dir.path()).unwrap();
        assert!(store.load("explainer").unwrap_err().is_not_found());
        assert!(!store.exists("explainer"));
    }

    #[test]
    fn remove_deletes_and_tolerates_missing_keys() {
        let dir = tempdir().unwrap();
        let store = FsArtifactStore::open(dir.path()).unwrap();
        store.save("model", b"{}").unwrap();
        store.remove("model").unwrap();
        assert!(!store.exists("model"));
        store.remove("model").unwrap();
        assert!(store.remove("../model").is_err());
    }

    #[test]
    fn lock_file_excludes_second_store_on_same_dir() {
        let dir = tempdir().unwrap();
        let first = FsArtifactStore::open(dir.path()).unwrap();
        let second = FsArtifactStore::open(dir.path()).unwrap();
        let lease = first.acquire_write().unwrap();
        assert!(matches!(second.acquire_write(), Err(StorageError::Busy)));
        drop(lease);
        assert!(second.acquire_write().is_ok());
    }

    #[test]
    fn lock_left_by_a_dead_process_is_reclaimed() {
        let dir = tempdir().unwrap();
        // A crashed run leaves the file behind but no OS lock on it.
        fs::write(dir.path().join(LOCK_FILE_NAME), "4194303\n").unwrap();
        let store = FsArtifactStore::open(dir.path()).unwrap();
        let lease = store.acquire_write().unwrap();
        drop(lease);
        let holder = fs::read_to_string(dir.path().join(LOCK_FILE_NAME)).unwrap();
        assert_eq!(holder.trim(), std::process::id().to_string());
        assert!(store.acquire_write().is_ok());
    }
}
