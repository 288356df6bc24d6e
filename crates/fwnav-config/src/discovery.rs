//! File-based config discovery.

use std::path::{Path, PathBuf};

use crate::config::NavigatorConfig;
use crate::error::{ConfigError, Result};
use crate::loading::ConfigLoader;

/// Conventional config file name.
pub const CONFIG_FILE_NAME: &str = "fwnav.toml";

/// Searches for `fwnav.toml` from a start directory upwards.
///
/// # Example
///
/// ```no_run
/// use fwnav_config::ConfigDiscovery;
///
/// let config = ConfigDiscovery::new(".").load().unwrap();
/// ```
pub struct ConfigDiscovery {
    root: PathBuf,
}

impl ConfigDiscovery {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Nearest `fwnav.toml` in the root or any ancestor.
    pub fn find(&self) -> Option<PathBuf> {
        self.root
            .ancestors()
            .map(|dir| dir.join(CONFIG_FILE_NAME))
            .find(|candidate| candidate.is_file())
    }

    /// Load the discovered config file.
    ///
    /// A discovered file without `workspace.root` gets the file's directory as root.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotFound` if no config file is found.
    pub fn load(&self) -> Result<NavigatorConfig> {
        let path = self.find().ok_or(ConfigError::NotFound)?;
        let mut config = ConfigLoader::new().file(&path).load()?;

        if let Some(dir) = path.parent() {
            let root = config.workspace_root(dir);
            config.workspace.root = Some(root);
        }
        Ok(config)
    }

    /// Load the discovered file, or defaults plus environment when none exists.
    pub fn load_or_default(&self) -> Result<NavigatorConfig> {
        match self.load() {
            Err(ConfigError::NotFound) => ConfigLoader::new().load(),
            other => other,
        }
    }
}

/// Discover and load config from the current directory.
pub fn discover() -> Result<NavigatorConfig> {
    let root = std::env::current_dir()?;
    ConfigDiscovery::new(&root).load()
}
