//! Filesystem abstraction for the resolution pipeline.
//!
//! The parser, resolver and source indexer never touch `std::fs` directly.
//! They go through [`Runtime`], so tests can drive the whole pipeline from an
//! in-memory tree and embedders can supply their own storage.

pub mod native;

#[cfg(any(test, feature = "test-utils"))]
pub mod memory;

use std::path::{Path, PathBuf};

pub use native::NativeRuntime;

#[cfg(any(test, feature = "test-utils"))]
pub use memory::MemoryRuntime;

/// Result type for runtime operations
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Errors that can occur during runtime operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("I/O error on {}: {message}", .path.display())]
    Io { path: PathBuf, message: String },

    #[error("runtime error: {0}")]
    Other(String),
}

/// Platform runtime trait.
///
/// Implementations must be safe to share across the rayon pool used by the
/// source indexer.
pub trait Runtime: Send + Sync + std::fmt::Debug {
    /// Read a file's bytes.
    fn read_file(&self, path: &Path) -> RuntimeResult<Vec<u8>>;

    /// Read a file as text, replacing invalid UTF-8.
    fn read_to_string(&self, path: &Path) -> RuntimeResult<String> {
        let bytes = self.read_file(path)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn exists(&self, path: &Path) -> bool;

    /// Whether `path` names a regular file.
    fn is_file(&self, path: &Path) -> bool {
        self.exists(path)
    }

    /// Current working directory, used when no workspace root is configured.
    fn get_cwd(&self) -> RuntimeResult<PathBuf>;
}
