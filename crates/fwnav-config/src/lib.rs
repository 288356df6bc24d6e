//! Configuration for the platform build navigator.
//!
//! Configuration is layered with `figment`: built-in defaults, then an
//! optional `fwnav.toml`, then `FWNAV_*` environment variables.

pub mod config;
pub mod discovery;
pub mod error;
pub mod loading;
pub mod settings;
pub mod validation;

// Re-export main types
pub use config::*;
pub use error::*;
pub use settings::*;

pub use discovery::{CONFIG_FILE_NAME, ConfigDiscovery, discover};
pub use loading::{ConfigLoader, ENV_PREFIX};
pub use validation::{ConfigValidator, FsValidator, SchemaValidator, validate_schema};
