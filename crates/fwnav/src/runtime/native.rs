//! Native runtime backed by the host filesystem.

// NativeRuntime is the one place that wraps std::fs
#![allow(clippy::disallowed_methods)]

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::{Runtime, RuntimeError, RuntimeResult};

/// `Runtime` over `std::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeRuntime;

impl NativeRuntime {
    pub fn new() -> Self {
        Self
    }
}

impl Runtime for NativeRuntime {
    fn read_file(&self, path: &Path) -> RuntimeResult<Vec<u8>> {
        std::fs::read(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => RuntimeError::FileNotFound(path.to_path_buf()),
            _ => RuntimeError::Io {
                path: path.to_path_buf(),
                message: e.to_string(),
            },
        })
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn get_cwd(&self) -> RuntimeResult<PathBuf> {
        std::env::current_dir().map_err(|e| RuntimeError::Other(format!("cannot read cwd: {e}")))
    }
}
