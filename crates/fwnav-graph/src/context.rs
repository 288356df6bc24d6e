use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::{Arch, LibraryClassMapping, ModuleDescriptor, ModuleId, ModuleRole, ModuleType};

/// Platform-level facts taken from the platform descriptor's `[Defines]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformInfo {
    /// `PLATFORM_NAME`
    pub name: String,
    /// `PLATFORM_GUID`
    pub guid: Option<String>,
    /// The platform descriptor this context was resolved from.
    pub descriptor: PathBuf,
    pub supported_archs: Vec<Arch>,
    pub build_targets: Vec<String>,
    /// Remaining `[Defines]` values.
    pub defines: BTreeMap<String, String>,
}

/// The immutable outcome of resolving one platform descriptor under one flag set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildContext {
    pub platform: PlatformInfo,
    pub workspace_root: PathBuf,
    /// Caller-supplied flags, sorted by name.
    pub flags: BTreeMap<String, String>,
    /// Final macro environment after every active `DEFINE`.
    pub macros: BTreeMap<String, String>,
    pub arch: Arch,
    /// Build profile, e.g. `DEBUG` or `RELEASE`.
    pub target: String,
    pub toolchain: String,
    /// Every resolved module (components and library instances) in resolution order.
    pub modules: IndexMap<ModuleId, Arc<ModuleDescriptor>>,
    /// Winning library-class bindings, one per (consumer, class).
    pub library_mappings: Vec<LibraryClassMapping>,
    /// Always-linked `NULL` library instances per consumer.
    pub null_libraries: Vec<LibraryClassMapping>,
    /// Every descriptor file read during resolution, root first.
    pub inputs: Vec<PathBuf>,
    /// Seconds since the Unix epoch.
    pub created_at: u64,
}

impl BuildContext {
    pub fn module(&self, id: &ModuleId) -> Option<&Arc<ModuleDescriptor>> {
        self.modules.get(id)
    }

    pub fn contains(&self, id: &ModuleId) -> bool {
        self.modules.contains_key(id)
    }

    /// Modules whose `BASE_NAME` equals `name`.
    pub fn modules_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Arc<ModuleDescriptor>> {
        self.modules.values().filter(move |m| m.name == name)
    }

    pub fn modules_of_type(&self, module_type: ModuleType) -> impl Iterator<Item = &Arc<ModuleDescriptor>> {
        self.modules
            .values()
            .filter(move |m| m.module_type == module_type)
    }

    pub fn components(&self) -> impl Iterator<Item = &Arc<ModuleDescriptor>> {
        self.modules
            .values()
            .filter(|m| m.role == ModuleRole::Component)
    }

    /// Library bindings resolved for `consumer`, in declaration order.
    pub fn mappings_for<'a>(&'a self, consumer: &'a ModuleId) -> impl Iterator<Item = &'a LibraryClassMapping> {
        self.library_mappings
            .iter()
            .filter(move |m| &m.consumer == consumer)
    }

    /// Compare everything except the creation timestamp.
    pub fn same_content(&self, other: &Self) -> bool {
        self.platform == other.platform
            && self.workspace_root == other.workspace_root
            && self.flags == other.flags
            && self.macros == other.macros
            && self.arch == other.arch
            && self.target == other.target
            && self.toolchain == other.toolchain
            && self.modules.len() == other.modules.len()
            && self
                .modules
                .iter()
                .zip(other.modules.iter())
                .all(|(a, b)| a == b)
            && self.library_mappings == other.library_mappings
            && self.null_libraries == other.null_libraries
            && self.inputs == other.inputs
    }
}
