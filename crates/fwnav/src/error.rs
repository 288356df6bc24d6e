//! Error types for the resolution pipeline and the query surface.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use fwnav_config::ConfigError;
use fwnav_graph::{Arch, ModuleId, ModuleIdError, ModuleType, UnknownValue};
use thiserror::Error;

use crate::cache::CacheError;
use crate::runtime::RuntimeError;

/// File and line a descriptor construct came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    pub file: Arc<PathBuf>,
    pub line: usize,
}

impl Location {
    pub fn new(file: Arc<PathBuf>, line: usize) -> Self {
        Self { file, line }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file.display(), self.line)
    }
}

/// Malformed descriptor input. Fatal to the resolution pass.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("{location}: {message}")]
    Syntax { location: Location, message: String },

    #[error("{location}: invalid expression '{expression}': {reason}")]
    Expression {
        location: Location,
        expression: String,
        reason: String,
    },

    #[error("{location}: cannot resolve include '{path}'")]
    IncludeNotFound { location: Location, path: String },

    #[error("{location}: include cycle {}", format_chain(.chain))]
    IncludeCycle {
        location: Location,
        chain: Vec<PathBuf>,
    },

    #[error("{location}: includes nested deeper than {limit}")]
    IncludeDepth { location: Location, limit: usize },

    #[error("{location}: '{directive}' block is never closed")]
    UnterminatedBlock {
        location: Location,
        directive: String,
    },

    #[error("{location}: '{directive}' without a matching '!if'")]
    UnmatchedDirective {
        location: Location,
        directive: String,
    },

    #[error("{location}: !error {message}")]
    ErrorDirective { location: Location, message: String },

    #[error("{location}: {source}")]
    InvalidValue {
        location: Location,
        source: UnknownValue,
    },

    #[error("{file}: missing required define '{key}'")]
    MissingDefine { file: PathBuf, key: &'static str },

    #[error("{location}: module descriptor '{path}' not found")]
    DescriptorNotFound { location: Location, path: String },

    #[error("{location}: invalid module path: {source}")]
    InvalidModulePath {
        location: Location,
        source: ModuleIdError,
    },
}

fn format_chain(chain: &[PathBuf]) -> String {
    chain
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Library or module resolution failure. Fatal to the resolution pass.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("module {module}: no library instance resolves class '{class}'")]
    UnresolvedLibraryClass { module: ModuleId, class: String },

    #[error("module {module}: source file {} does not exist", .file.display())]
    MissingSourceFile { module: ModuleId, file: PathBuf },

    #[error("module {module}: instance {instance} bound to '{class}' does not produce that class")]
    LibraryClassMismatch {
        module: ModuleId,
        class: String,
        instance: ModuleId,
    },

    #[error(
        "module {module} ({module_type}): instance {instance} of '{class}' does not support that module type"
    )]
    IncompatibleLibrary {
        module: ModuleId,
        module_type: ModuleType,
        class: String,
        instance: ModuleId,
    },

    #[error("module {module} does not support architecture {arch}")]
    UnsupportedArchitecture { module: ModuleId, arch: Arch },

    #[error("dependency cycle: {}", fwnav_graph::format_path(.path))]
    Cycle { path: Vec<ModuleId> },
}

/// Bad query input. Local to the call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("module '{0}' is not part of this build")]
    ModuleNotFound(String),

    #[error("module name '{name}' is ambiguous: {}", fwnav_graph::format_path(.candidates))]
    AmbiguousModule {
        name: String,
        candidates: Vec<ModuleId>,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Top-level error for navigator operations.
#[derive(Debug, Error)]
pub enum NavError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Graph(#[from] fwnav_graph::Error),

    #[error("resolution exceeded its {0:?} deadline")]
    Timeout(Duration),

    #[error("resolution worker failed: {0}")]
    Worker(String),
}

impl NavError {
    /// Whether this is an I/O or cache fault rather than bad input.
    pub fn is_system(&self) -> bool {
        matches!(self, Self::Runtime(_) | Self::Cache(_) | Self::Worker(_))
    }
}

/// Result type alias for navigator operations.
pub type Result<T> = std::result::Result<T, NavError>;
