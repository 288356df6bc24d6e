//! Pluggable config validation strategies
//!
//! Separates schema rules from checks that touch the filesystem.

use std::path::Path;

use crate::config::{MAX_TRACE_DEPTH_LIMIT, NavigatorConfig};
use crate::error::{ConfigError, Result};
use crate::settings::LOG_LEVELS;

/// Trait for pluggable config validation strategies
pub trait ConfigValidator {
    fn validate(&self, config: &NavigatorConfig) -> Result<()>;
}

/// Schema-only validation (no filesystem checks)
///
/// ```
/// use fwnav_config::{ConfigValidator, NavigatorConfig, SchemaValidator};
///
/// SchemaValidator.validate(&NavigatorConfig::default()).unwrap();
/// ```
pub struct SchemaValidator;

impl ConfigValidator for SchemaValidator {
    fn validate(&self, config: &NavigatorConfig) -> Result<()> {
        if config.cache.ttl_secs == 0 {
            return Err(schema(
                "cache.ttl_secs must be greater than zero",
                "Disable the cache with cache.enabled = false instead",
            ));
        }

        if config.resolution.timeout_ms == Some(0) {
            return Err(schema(
                "resolution.timeout_ms must be greater than zero",
                "Remove the key to resolve without a deadline",
            ));
        }

        for name in config.resolution.flags.keys() {
            let valid = !name.is_empty()
                && name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_');
            if !valid {
                return Err(ConfigError::InvalidValue {
                    field: format!("resolution.flags.{name}"),
                    hint: "flag names may only contain letters, digits and '_'".to_string(),
                });
            }
        }

        let depth = config.query.max_trace_depth;
        if depth == 0 || depth > MAX_TRACE_DEPTH_LIMIT {
            return Err(schema(
                &format!("query.max_trace_depth {depth} is out of range (1 to {MAX_TRACE_DEPTH_LIMIT})"),
                "Use a depth between 1 and 256",
            ));
        }

        if config.query.max_call_paths == 0 {
            return Err(schema(
                "query.max_call_paths must be greater than zero",
                "Use a positive path budget",
            ));
        }

        if let Some(level) = &config.settings.log_level {
            if !LOG_LEVELS.contains(&level.to_ascii_lowercase().as_str()) {
                return Err(ConfigError::InvalidValue {
                    field: "settings.log_level".to_string(),
                    hint: format!("expected one of {}", LOG_LEVELS.join(", ")),
                });
            }
        }

        Ok(())
    }
}

fn schema(message: &str, hint: &str) -> ConfigError {
    ConfigError::SchemaValidation {
        message: message.to_string(),
        hint: Some(hint.to_string()),
    }
}

/// Filesystem validator: schema rules plus workspace and package paths exist.
pub struct FsValidator {
    root: std::path::PathBuf,
}

impl FsValidator {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }
}

impl ConfigValidator for FsValidator {
    fn validate(&self, config: &NavigatorConfig) -> Result<()> {
        SchemaValidator.validate(config)?;

        let root = config.workspace_root(&self.root);
        if !root.is_dir() {
            return Err(ConfigError::WorkspaceNotFound(root));
        }

        for package in &config.workspace.packages_path {
            let path = if package.is_absolute() {
                package.clone()
            } else {
                root.join(package)
            };
            if !path.is_dir() {
                return Err(ConfigError::PackagePathNotFound(path));
            }
        }

        Ok(())
    }
}

/// Validate schema rules only.
pub fn validate_schema(config: &NavigatorConfig) -> Result<()> {
    SchemaValidator.validate(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn rejects_zero_ttl() {
        let mut config = NavigatorConfig::default();
        config.cache.ttl_secs = 0;
        assert!(matches!(
            validate_schema(&config),
            Err(ConfigError::SchemaValidation { .. })
        ));
    }

    #[test]
    fn rejects_depth_out_of_range() {
        let mut config = NavigatorConfig::default();
        config.query.max_trace_depth = 0;
        assert!(validate_schema(&config).is_err());
        config.query.max_trace_depth = MAX_TRACE_DEPTH_LIMIT + 1;
        assert!(validate_schema(&config).is_err());
        config.query.max_trace_depth = 2;
        assert!(validate_schema(&config).is_ok());
    }

    #[test]
    fn rejects_malformed_flag_names() {
        let mut config = NavigatorConfig::default();
        config
            .resolution
            .flags
            .insert("BAD NAME".to_string(), "TRUE".to_string());
        let err = validate_schema(&config).unwrap_err();
        assert!(err.to_string().contains("resolution.flags.BAD NAME"));
    }

    #[test]
    fn rejects_unknown_log_level() {
        let mut config = NavigatorConfig::default();
        config.settings.log_level = Some("loud".to_string());
        assert!(validate_schema(&config).is_err());
        config.settings.log_level = Some("DEBUG".to_string());
        assert!(validate_schema(&config).is_ok());
    }

    #[test]
    fn fs_validator_checks_package_paths() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("edk2-platforms")).unwrap();

        let mut config = NavigatorConfig::default();
        config.workspace.packages_path = vec![PathBuf::from("edk2-platforms")];
        FsValidator::new(dir.path()).validate(&config).unwrap();

        config.workspace.packages_path.push(PathBuf::from("missing"));
        assert!(matches!(
            FsValidator::new(dir.path()).validate(&config),
            Err(ConfigError::PackagePathNotFound(_))
        ));
    }
}
