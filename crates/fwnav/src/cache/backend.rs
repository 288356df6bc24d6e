//! Storage backends for cache entries.
//!
//! A write is two steps: [`CacheBackend::stage`] makes the bytes durable
//! somewhere readers cannot see them, and [`StagedWrite::commit`] publishes
//! them atomically. Dropping a staged write without committing discards it.

use std::fmt;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap as HashMap;
use tempfile::NamedTempFile;

use super::CacheError;
use super::key::CacheKey;

/// File extension of promoted entries.
pub const ENTRY_EXTENSION: &str = "entry";

/// Key-value storage for encoded cache entries.
pub trait CacheBackend: Send + Sync + fmt::Debug {
    /// Encoded entry for `key`, or `None` when the slot is empty.
    fn read(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, CacheError>;

    /// Stage `bytes` for `key` without making them visible.
    fn stage(&self, key: &CacheKey, bytes: &[u8]) -> Result<Box<dyn StagedWrite>, CacheError>;

    fn remove(&self, key: &CacheKey) -> Result<(), CacheError>;

    fn clear(&self) -> Result<(), CacheError>;

    /// Every promoted entry with its size in bytes.
    fn entries(&self) -> Result<Vec<(CacheKey, u64)>, CacheError>;
}

/// A staged entry waiting to be published.
pub trait StagedWrite: Send {
    fn commit(self: Box<Self>) -> Result<(), CacheError>;
}

/// Entries stored as `<dir>/<key>.entry`, staged in a temporary file in the
/// same directory and renamed into place.
#[derive(Debug, Clone)]
pub struct FsBackend {
    dir: PathBuf,
}

impl FsBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{}.{ENTRY_EXTENSION}", key.as_hex()))
    }
}

struct FsStaged {
    temp: NamedTempFile,
    target: PathBuf,
}

impl StagedWrite for FsStaged {
    fn commit(self: Box<Self>) -> Result<(), CacheError> {
        let FsStaged { temp, target } = *self;
        temp.persist(&target).map_err(|e| CacheError::IoError(e.error))?;
        Ok(())
    }
}

// The cache directory is navigator-owned state, not workspace input, so it
// bypasses the Runtime.
#[allow(clippy::disallowed_methods)]
impl CacheBackend for FsBackend {
    fn read(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, CacheError> {
        match std::fs::read(self.entry_path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn stage(&self, key: &CacheKey, bytes: &[u8]) -> Result<Box<dyn StagedWrite>, CacheError> {
        std::fs::create_dir_all(&self.dir)?;
        let mut temp = NamedTempFile::new_in(&self.dir)?;
        temp.write_all(bytes)?;
        temp.as_file().sync_all()?;
        Ok(Box::new(FsStaged {
            temp,
            target: self.entry_path(key),
        }))
    }

    fn remove(&self, key: &CacheKey) -> Result<(), CacheError> {
        match std::fs::remove_file(self.entry_path(key)) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    fn clear(&self) -> Result<(), CacheError> {
        for (key, _) in self.entries()? {
            self.remove(&key)?;
        }
        Ok(())
    }

    fn entries(&self) -> Result<Vec<(CacheKey, u64)>, CacheError> {
        let listing = match std::fs::read_dir(&self.dir) {
            Ok(listing) => listing,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for item in listing {
            let item = item?;
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            entries.push((CacheKey::from_hex(stem), item.metadata()?.len()));
        }
        entries.sort_by(|a, b| a.0.as_hex().cmp(b.0.as_hex()));
        Ok(entries)
    }
}

/// In-process backend. Clones share storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    entries: Arc<RwLock<HashMap<CacheKey, Vec<u8>>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a slot directly, bypassing staging.
    pub fn insert_raw(&self, key: CacheKey, bytes: Vec<u8>) {
        self.entries.write().insert(key, bytes);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

struct MemoryStaged {
    entries: Arc<RwLock<HashMap<CacheKey, Vec<u8>>>>,
    key: CacheKey,
    bytes: Vec<u8>,
}

impl StagedWrite for MemoryStaged {
    fn commit(self: Box<Self>) -> Result<(), CacheError> {
        let MemoryStaged { entries, key, bytes } = *self;
        entries.write().insert(key, bytes);
        Ok(())
    }
}

impl CacheBackend for MemoryBackend {
    fn read(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn stage(&self, key: &CacheKey, bytes: &[u8]) -> Result<Box<dyn StagedWrite>, CacheError> {
        Ok(Box::new(MemoryStaged {
            entries: Arc::clone(&self.entries),
            key: key.clone(),
            bytes: bytes.to_vec(),
        }))
    }

    fn remove(&self, key: &CacheKey) -> Result<(), CacheError> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<(), CacheError> {
        self.entries.write().clear();
        Ok(())
    }

    fn entries(&self) -> Result<Vec<(CacheKey, u64)>, CacheError> {
        let mut entries: Vec<_> = self
            .entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.len() as u64))
            .collect();
        entries.sort_by(|a, b| a.0.as_hex().cmp(b.0.as_hex()));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(n: u8) -> CacheKey {
        CacheKey::from_hex(format!("{n:02x}"))
    }

    #[test]
    fn fs_staged_write_is_invisible_until_commit() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FsBackend::new(dir.path().join("cache"));

        let staged = backend.stage(&key(1), b"payload").unwrap();
        assert_eq!(backend.read(&key(1)).unwrap(), None);
        assert!(backend.entries().unwrap().is_empty());

        staged.commit().unwrap();
        assert_eq!(backend.read(&key(1)).unwrap().as_deref(), Some(&b"payload"[..]));
        assert_eq!(backend.entries().unwrap(), vec![(key(1), 7)]);
    }

    #[test]
    fn fs_dropped_stage_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FsBackend::new(dir.path());

        drop(backend.stage(&key(2), b"payload").unwrap());

        assert_eq!(backend.read(&key(2)).unwrap(), None);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn fs_remove_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FsBackend::new(dir.path());
        for n in 0..3 {
            backend.stage(&key(n), b"x").unwrap().commit().unwrap();
        }
        std::fs::write(dir.path().join("notes.txt"), "keep").unwrap();

        backend.remove(&key(0)).unwrap();
        backend.remove(&key(9)).unwrap();
        assert_eq!(backend.entries().unwrap().len(), 2);

        backend.clear().unwrap();
        assert!(backend.entries().unwrap().is_empty());
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn missing_directory_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FsBackend::new(dir.path().join("never-created"));
        assert_eq!(backend.read(&key(1)).unwrap(), None);
        assert!(backend.entries().unwrap().is_empty());
    }

    #[test]
    fn memory_backend_stages_and_shares() {
        let backend = MemoryBackend::new();
        let handle = backend.clone();

        let staged = backend.stage(&key(1), b"abc").unwrap();
        assert!(handle.is_empty());
        staged.commit().unwrap();
        assert_eq!(handle.len(), 1);

        drop(backend.stage(&key(2), b"def").unwrap());
        assert_eq!(handle.entries().unwrap(), vec![(key(1), 3)]);
    }
}
