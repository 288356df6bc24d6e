use std::fmt;
use std::path::{Component, Path};

use path_clean::PathClean;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

const VARIANT_SEPARATOR: char = '#';

/// Canonical identifier for a module in a resolved build.
///
/// The identifier is the workspace-relative path of the module descriptor,
/// lexically cleaned and always `/`-separated so that `Pkg\Foo\Foo.inf`,
/// `Pkg/Foo/./Foo.inf` and `Pkg/Bar/../Foo/Foo.inf` compare equal.
///
/// When one descriptor file is resolved into several effective variants in
/// the same build context, every variant after the first carries a `#<n>`
/// suffix (`Pkg/Foo/Foo.inf#2`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(String);

impl ModuleId {
    /// Create a new module identifier from a workspace-relative path.
    pub fn new(path: impl AsRef<str>) -> Result<Self, ModuleIdError> {
        let raw = path.as_ref().trim();

        if raw.is_empty() {
            return Err(ModuleIdError::EmptyPath);
        }

        let (path_part, variant) = match raw.rsplit_once(VARIANT_SEPARATOR) {
            Some((head, tail)) => {
                let n: u32 = tail
                    .parse()
                    .map_err(|_| ModuleIdError::InvalidVariant(raw.to_string()))?;
                (head, Some(n))
            }
            None => (raw, None),
        };

        let normalized = normalize(path_part)?;
        Ok(match variant {
            Some(n) if n > 1 => Self(format!("{normalized}{VARIANT_SEPARATOR}{n}")),
            _ => Self(normalized),
        })
    }

    /// Build an identifier from a path relative to `root`.
    ///
    /// Paths outside `root` keep their cleaned absolute form.
    pub fn from_path(root: &Path, path: &Path) -> Result<Self, ModuleIdError> {
        let cleaned = path.clean();
        let relative = cleaned.strip_prefix(root.clean()).unwrap_or(&cleaned);
        Self::new(relative.to_string_lossy())
    }

    /// Identifier of the `n`-th effective variant of the same descriptor.
    ///
    /// Variant 1 is the plain path.
    pub fn with_variant(&self, n: u32) -> Self {
        let base = self.path_str();
        if n <= 1 {
            Self(base.to_string())
        } else {
            Self(format!("{base}{VARIANT_SEPARATOR}{n}"))
        }
    }

    /// The descriptor path without any variant suffix.
    pub fn path_str(&self) -> &str {
        match self.0.rsplit_once(VARIANT_SEPARATOR) {
            Some((head, _)) => head,
            None => &self.0,
        }
    }

    /// Variant number, `1` for the plain path.
    pub fn variant(&self) -> u32 {
        self.0
            .rsplit_once(VARIANT_SEPARATOR)
            .and_then(|(_, n)| n.parse().ok())
            .unwrap_or(1)
    }

    /// File stem of the descriptor (`DxeMain` for `MdeModulePkg/Core/Dxe/DxeMain.inf`).
    pub fn file_stem(&self) -> &str {
        let path = self.path_str();
        let file = path.rsplit('/').next().unwrap_or(path);
        file.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(file)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn normalize(raw: &str) -> Result<String, ModuleIdError> {
    let unified = raw.replace('\\', "/");
    let cleaned = Path::new(&unified).clean();

    if cleaned
        .components()
        .next()
        .is_some_and(|c| matches!(c, Component::ParentDir))
    {
        return Err(ModuleIdError::EscapesWorkspace(raw.to_string()));
    }

    let text = cleaned.to_string_lossy().replace('\\', "/");
    if text.is_empty() || text == "." {
        return Err(ModuleIdError::EmptyPath);
    }
    Ok(text)
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ModuleId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for ModuleId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ModuleId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::new(&raw).map_err(serde::de::Error::custom)
    }
}

/// Errors raised when constructing module identifiers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModuleIdError {
    #[error("module path cannot be empty")]
    EmptyPath,

    #[error("module path '{0}' escapes the workspace")]
    EscapesWorkspace(String),

    #[error("invalid variant suffix in module id '{0}'")]
    InvalidVariant(String),
}
