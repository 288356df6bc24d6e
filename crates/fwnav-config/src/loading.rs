//! Layered loading: defaults, then `fwnav.toml`, then `FWNAV_*` environment variables.

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format as _, Serialized, Toml},
};

use crate::config::NavigatorConfig;
use crate::error::Result;

/// Environment prefix; nested keys are separated by `__`
/// (`FWNAV_CACHE__TTL_SECS=600`).
pub const ENV_PREFIX: &str = "FWNAV_";

/// Builds a [`NavigatorConfig`] from layered sources.
///
/// Priority: environment variables > config file > defaults.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    file: Option<PathBuf>,
    env_prefix: String,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self {
            file: None,
            env_prefix: ENV_PREFIX.to_string(),
        }
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge this TOML file over the defaults. Missing files are skipped.
    pub fn file(mut self, path: impl AsRef<Path>) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    pub fn figment(&self) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(NavigatorConfig::default()));

        if let Some(path) = &self.file {
            figment = figment.merge(Toml::file(path));
        }

        figment.merge(Env::prefixed(&self.env_prefix).split("__"))
    }

    pub fn load(&self) -> Result<NavigatorConfig> {
        let config: NavigatorConfig = self.figment().extract()?;
        tracing::debug!(file = ?self.file, "loaded navigator configuration");
        Ok(config)
    }
}
