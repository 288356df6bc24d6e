//! Navigator configuration schema.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fwnav_graph::CyclePolicy;
use serde::{Deserialize, Serialize};

use crate::settings::GlobalSettings;

/// Default cache time-to-live: one day.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 24 * 60 * 60;

/// Default bound on call-path depth.
pub const DEFAULT_MAX_TRACE_DEPTH: usize = 16;

/// Hard bound on the depth a caller may request.
pub const MAX_TRACE_DEPTH_LIMIT: usize = 256;

/// Default bound on the number of call paths one trace may return.
pub const DEFAULT_MAX_CALL_PATHS: usize = 1000;

/// Directory under the workspace root used when no cache dir is configured.
pub const DEFAULT_CACHE_DIR: &str = ".fwnav/cache";

/// How call-path tracing treats call sites that cannot be bound to exactly
/// one in-scope function.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AmbiguousCallMode {
    /// Leave indirect and multiply-defined callees out of every path.
    #[default]
    Drop,
    /// Keep them, marking the step as uncertain.
    Surface,
}

/// Top-level navigator configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigatorConfig {
    #[serde(default)]
    pub workspace: WorkspaceConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub resolution: ResolutionConfig,

    #[serde(default)]
    pub query: QueryConfig,

    #[serde(default)]
    pub settings: GlobalSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Workspace root; descriptor paths are resolved against it.
    #[serde(default)]
    pub root: Option<PathBuf>,

    /// Additional package search roots (`PACKAGES_PATH`).
    #[serde(default)]
    pub packages_path: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Cache directory. Relative paths are resolved against the workspace root.
    #[serde(default)]
    pub dir: Option<PathBuf>,

    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
            ttl_secs: DEFAULT_CACHE_TTL_SECS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionConfig {
    #[serde(default)]
    pub cycle_policy: CyclePolicy,

    /// Deadline for one resolution pass, in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Flags applied to every resolution, beneath per-call flags.
    #[serde(default)]
    pub flags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryConfig {
    #[serde(default)]
    pub ambiguous_calls: AmbiguousCallMode,

    #[serde(default = "default_max_trace_depth")]
    pub max_trace_depth: usize,

    #[serde(default = "default_max_call_paths")]
    pub max_call_paths: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            ambiguous_calls: AmbiguousCallMode::Drop,
            max_trace_depth: DEFAULT_MAX_TRACE_DEPTH,
            max_call_paths: DEFAULT_MAX_CALL_PATHS,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_ttl_secs() -> u64 {
    DEFAULT_CACHE_TTL_SECS
}

fn default_max_trace_depth() -> usize {
    DEFAULT_MAX_TRACE_DEPTH
}

fn default_max_call_paths() -> usize {
    DEFAULT_MAX_CALL_PATHS
}

impl NavigatorConfig {
    /// Workspace root, falling back to `fallback` when unset.
    pub fn workspace_root(&self, fallback: &Path) -> PathBuf {
        match &self.workspace.root {
            Some(root) if root.is_absolute() => root.clone(),
            Some(root) => fallback.join(root),
            None => fallback.to_path_buf(),
        }
    }

    /// Cache directory resolved against the workspace root.
    pub fn cache_dir(&self, workspace_root: &Path) -> PathBuf {
        match &self.cache.dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => workspace_root.join(dir),
            None => workspace_root.join(DEFAULT_CACHE_DIR),
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }

    pub fn resolution_timeout(&self) -> Option<Duration> {
        self.resolution.timeout_ms.map(Duration::from_millis)
    }

    /// Serialize to TOML, e.g. to write a starter `fwnav.toml`.
    pub fn to_toml_string(&self) -> crate::Result<String> {
        toml::to_string_pretty(self).map_err(|e| crate::ConfigError::InvalidValue {
            field: "configuration".to_string(),
            hint: format!("cannot render as TOML: {e}"),
        })
    }
}
