//! Global settings that are not tied to one pipeline stage.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalSettings {
    /// `trace`, `debug`, `info`, `warn` or `error`.
    #[serde(default)]
    pub log_level: Option<String>,
}

pub(crate) const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
