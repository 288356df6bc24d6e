use std::fmt;

use serde::{Deserialize, Serialize};

use super::ModuleId;

/// Where a library-class binding came from.
///
/// Variants are declared from strongest to weakest, so the derived `Ord`
/// sorts winning scopes first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResolutionScope {
    /// `<LibraryClasses>` inside the component's override block.
    ModuleOverride,
    /// `[LibraryClasses.<ARCH>.<MODULE_TYPE>]`
    ArchitectureModuleType,
    /// `[LibraryClasses.<ARCH>]`
    Architecture,
    /// `[LibraryClasses.common.<MODULE_TYPE>]`
    GlobalModuleType,
    /// `[LibraryClasses]` / `[LibraryClasses.common]`
    Global,
    /// `Class|Default.inf` in the consuming module's own descriptor.
    DefaultBinding,
}

impl ResolutionScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ModuleOverride => "module-override",
            Self::ArchitectureModuleType => "arch-module-type",
            Self::Architecture => "arch",
            Self::GlobalModuleType => "global-module-type",
            Self::Global => "global",
            Self::DefaultBinding => "default-binding",
        }
    }
}

impl fmt::Display for ResolutionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The winning binding of one library class for one consumer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LibraryClassMapping {
    pub consumer: ModuleId,
    pub class: String,
    pub implementation: ModuleId,
    pub scope: ResolutionScope,
}

impl LibraryClassMapping {
    pub fn new(
        consumer: ModuleId,
        class: impl Into<String>,
        implementation: ModuleId,
        scope: ResolutionScope,
    ) -> Self {
        Self {
            consumer,
            class: class.into(),
            implementation,
            scope,
        }
    }
}

impl fmt::Display for LibraryClassMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} -> {} ({})",
            self.consumer, self.class, self.implementation, self.scope
        )
    }
}
