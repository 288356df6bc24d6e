use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{Arch, ModuleId, ModuleType};

/// Whether a module was listed as a platform component or pulled in as a
/// library instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModuleRole {
    Component,
    Library,
}

/// Abstract library class a module depends on (`[LibraryClasses]` entry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryClassDependency {
    pub class: String,
    /// Instance named in the module descriptor itself (`Class|Path.inf`),
    /// used only when the platform does not map the class.
    pub default_binding: Option<String>,
}

impl LibraryClassDependency {
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            default_binding: None,
        }
    }

    pub fn with_default(class: impl Into<String>, binding: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            default_binding: Some(binding.into()),
        }
    }
}

/// Library class produced by a library instance (`LIBRARY_CLASS = Class|TYPES`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducedLibraryClass {
    pub class: String,
    /// Consumer module types allowed to link this class. Empty means any.
    pub module_types: Vec<ModuleType>,
}

impl ProducedLibraryClass {
    pub fn accepts(&self, consumer: ModuleType) -> bool {
        self.module_types.is_empty() || self.module_types.contains(&consumer)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InterfaceKind {
    Protocol,
    Ppi,
    Guid,
}

/// Usage tag from the `## PRODUCES` / `## CONSUMES` comment of an interface line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InterfaceUsage {
    Produces,
    Consumes,
    SometimesProduces,
    SometimesConsumes,
}

impl InterfaceUsage {
    /// Parse a usage tag. Unknown or missing tags mean the interface is consumed.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_uppercase().as_str() {
            "PRODUCES" | "ALWAYS_PRODUCES" => Self::Produces,
            "SOMETIMES_PRODUCES" => Self::SometimesProduces,
            "SOMETIMES_CONSUMES" => Self::SometimesConsumes,
            _ => Self::Consumes,
        }
    }

    pub fn is_produced(&self) -> bool {
        matches!(self, Self::Produces | Self::SometimesProduces)
    }
}

/// Protocol, PPI or GUID referenced by a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceRef {
    pub kind: InterfaceKind,
    pub name: String,
    pub usage: InterfaceUsage,
}

/// Fully parsed module record, after inline platform overrides are applied.
///
/// Records are immutable once built and are shared through `Arc` by the
/// build context and every query engine over it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    pub id: ModuleId,
    /// Location of the descriptor file on disk.
    pub path: PathBuf,
    /// `BASE_NAME`
    pub name: String,
    /// `FILE_GUID`
    pub guid: Option<String>,
    pub module_type: ModuleType,
    pub role: ModuleRole,
    /// `VALID_ARCHITECTURES`; empty means every architecture.
    pub archs: BTreeSet<Arch>,
    pub entry_point: Option<String>,
    pub library_classes: Vec<LibraryClassDependency>,
    pub produced_classes: Vec<ProducedLibraryClass>,
    /// Source files, resolved against the descriptor directory.
    pub sources: Vec<PathBuf>,
    pub include_dirs: Vec<PathBuf>,
    pub build_options: BTreeMap<String, String>,
    pub pcds: BTreeMap<String, String>,
    pub interfaces: Vec<InterfaceRef>,
    /// `[Defines]` values, including those set by a platform override block.
    pub defines: BTreeMap<String, String>,
    /// Library classes bound by the platform override block of this component.
    pub library_overrides: BTreeMap<String, String>,
    /// `NULL` library instances linked by the platform override block.
    pub null_overrides: Vec<String>,
}

impl ModuleDescriptor {
    /// Create a new descriptor builder with empty collections.
    pub fn builder(
        id: ModuleId,
        path: impl Into<PathBuf>,
        name: impl Into<String>,
        module_type: ModuleType,
    ) -> ModuleDescriptorBuilder {
        ModuleDescriptorBuilder {
            module: Self {
                id,
                path: path.into(),
                name: name.into(),
                guid: None,
                module_type,
                role: ModuleRole::Component,
                archs: BTreeSet::new(),
                entry_point: None,
                library_classes: Vec::new(),
                produced_classes: Vec::new(),
                sources: Vec::new(),
                include_dirs: Vec::new(),
                build_options: BTreeMap::new(),
                pcds: BTreeMap::new(),
                interfaces: Vec::new(),
                defines: BTreeMap::new(),
                library_overrides: BTreeMap::new(),
                null_overrides: Vec::new(),
            },
        }
    }

    pub fn supports_arch(&self, arch: Arch) -> bool {
        self.archs.is_empty() || self.archs.contains(&arch)
    }

    pub fn is_library(&self) -> bool {
        self.role == ModuleRole::Library || !self.produced_classes.is_empty()
    }

    /// Look up the `LIBRARY_CLASS` entry for `class`, if this module produces it.
    pub fn produced_class(&self, class: &str) -> Option<&ProducedLibraryClass> {
        self.produced_classes.iter().find(|p| p.class == class)
    }

    pub fn dependency(&self, class: &str) -> Option<&LibraryClassDependency> {
        self.library_classes.iter().find(|d| d.class == class)
    }

    pub fn owns_source(&self, file: &Path) -> bool {
        self.sources.iter().any(|s| s == file)
    }

    pub fn produced_interfaces(&self) -> impl Iterator<Item = &InterfaceRef> {
        self.interfaces.iter().filter(|i| i.usage.is_produced())
    }

    pub fn consumed_interfaces(&self) -> impl Iterator<Item = &InterfaceRef> {
        self.interfaces.iter().filter(|i| !i.usage.is_produced())
    }

    /// Compare every effective attribute except the identifier.
    ///
    /// Two parses of one descriptor file are the same resolved module exactly
    /// when this returns `true`.
    pub fn same_attributes(&self, other: &Self) -> bool {
        self.path == other.path
            && self.name == other.name
            && self.guid == other.guid
            && self.module_type == other.module_type
            && self.role == other.role
            && self.archs == other.archs
            && self.entry_point == other.entry_point
            && self.library_classes == other.library_classes
            && self.produced_classes == other.produced_classes
            && self.sources == other.sources
            && self.include_dirs == other.include_dirs
            && self.build_options == other.build_options
            && self.pcds == other.pcds
            && self.interfaces == other.interfaces
            && self.defines == other.defines
            && self.library_overrides == other.library_overrides
            && self.null_overrides == other.null_overrides
    }

    /// Copy of this record under a different identifier.
    pub fn with_id(&self, id: ModuleId) -> Self {
        Self {
            id,
            ..self.clone()
        }
    }
}

/// Builder for [`ModuleDescriptor`].
#[derive(Debug)]
pub struct ModuleDescriptorBuilder {
    module: ModuleDescriptor,
}

impl ModuleDescriptorBuilder {
    pub fn guid(mut self, guid: impl Into<String>) -> Self {
        self.module.guid = Some(guid.into());
        self
    }

    pub fn role(mut self, role: ModuleRole) -> Self {
        self.module.role = role;
        self
    }

    pub fn archs(mut self, archs: impl IntoIterator<Item = Arch>) -> Self {
        self.module.archs = archs.into_iter().collect();
        self
    }

    pub fn entry_point(mut self, entry: impl Into<String>) -> Self {
        self.module.entry_point = Some(entry.into());
        self
    }

    pub fn library_class(mut self, dependency: LibraryClassDependency) -> Self {
        self.module.library_classes.push(dependency);
        self
    }

    pub fn produces(mut self, class: ProducedLibraryClass) -> Self {
        self.module.produced_classes.push(class);
        self.module.role = ModuleRole::Library;
        self
    }

    pub fn source(mut self, file: impl Into<PathBuf>) -> Self {
        self.module.sources.push(file.into());
        self
    }

    pub fn include_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.module.include_dirs.push(dir.into());
        self
    }

    pub fn build_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.module.build_options.insert(key.into(), value.into());
        self
    }

    pub fn pcd(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.module.pcds.insert(name.into(), value.into());
        self
    }

    pub fn interface(mut self, interface: InterfaceRef) -> Self {
        self.module.interfaces.push(interface);
        self
    }

    pub fn define(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.module.defines.insert(key.into(), value.into());
        self
    }

    pub fn library_override(mut self, class: impl Into<String>, instance: impl Into<String>) -> Self {
        self.module
            .library_overrides
            .insert(class.into(), instance.into());
        self
    }

    pub fn null_override(mut self, instance: impl Into<String>) -> Self {
        self.module.null_overrides.push(instance.into());
        self
    }

    pub fn build(self) -> ModuleDescriptor {
        self.module
    }
}
