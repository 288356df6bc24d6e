//! In-memory runtime for tests.

use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use path_clean::PathClean;
use rustc_hash::FxHashMap as HashMap;

use super::{Runtime, RuntimeError, RuntimeResult};

/// A `Runtime` over a map of cleaned absolute paths to file contents.
///
/// Directories exist implicitly as prefixes of stored files.
#[derive(Debug)]
pub struct MemoryRuntime {
    cwd: PathBuf,
    files: RwLock<HashMap<PathBuf, Vec<u8>>>,
}

impl MemoryRuntime {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into().clean(),
            files: RwLock::new(HashMap::default()),
        }
    }

    /// Add a file, builder style. Relative paths are taken from the cwd.
    pub fn with_file(self, path: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> Self {
        self.insert(path, contents);
        self
    }

    pub fn insert(&self, path: impl AsRef<Path>, contents: impl AsRef<[u8]>) {
        let key = self.key(path.as_ref());
        self.files.write().insert(key, contents.as_ref().to_vec());
    }

    pub fn remove(&self, path: impl AsRef<Path>) -> bool {
        let key = self.key(path.as_ref());
        self.files.write().remove(&key).is_some()
    }

    pub fn file_count(&self) -> usize {
        self.files.read().len()
    }

    fn key(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.clean()
        } else {
            self.cwd.join(path).clean()
        }
    }
}

impl Runtime for MemoryRuntime {
    fn read_file(&self, path: &Path) -> RuntimeResult<Vec<u8>> {
        let key = self.key(path);
        self.files
            .read()
            .get(&key)
            .cloned()
            .ok_or(RuntimeError::FileNotFound(key))
    }

    fn exists(&self, path: &Path) -> bool {
        let key = self.key(path);
        let files = self.files.read();
        files.contains_key(&key) || files.keys().any(|k| k.starts_with(&key))
    }

    fn is_file(&self, path: &Path) -> bool {
        self.files.read().contains_key(&self.key(path))
    }

    fn get_cwd(&self) -> RuntimeResult<PathBuf> {
        Ok(self.cwd.clone())
    }
}
