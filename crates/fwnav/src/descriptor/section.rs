//! Section headers shared by platform and module descriptors.

use fwnav_graph::{Arch, ModuleType, UnknownValue};

/// Sections the parsers understand. Everything else is skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Defines,
    LibraryClasses,
    Components,
    BuildOptions,
    Pcds,
    Sources,
    Packages,
    Protocols,
    Ppis,
    Guids,
    Other,
}

impl SectionKind {
    fn from_name(name: &str) -> Self {
        let lower = name.trim().to_ascii_lowercase();
        match lower.as_str() {
            "defines" => Self::Defines,
            "libraryclasses" => Self::LibraryClasses,
            "components" => Self::Components,
            "buildoptions" => Self::BuildOptions,
            "sources" => Self::Sources,
            "packages" => Self::Packages,
            "protocols" => Self::Protocols,
            "ppis" => Self::Ppis,
            "guids" => Self::Guids,
            _ if lower.contains("pcd") => Self::Pcds,
            _ => Self::Other,
        }
    }

    fn takes_arch(self) -> bool {
        !matches!(self, Self::Defines | Self::Other)
    }
}

/// One `Name.Arch.ModuleType` entry of a section header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionTag {
    pub kind: SectionKind,
    /// `None` for `common` or no qualifier.
    pub arch: Option<Arch>,
    /// Only ever set for `LibraryClasses`.
    pub module_type: Option<ModuleType>,
}

impl SectionTag {
    pub fn applies_to(&self, arch: Arch) -> bool {
        self.arch.is_none_or(|a| a == arch)
    }
}

/// A parsed `[A.X64, B.IA32]` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionHeader {
    pub tags: Vec<SectionTag>,
}

impl SectionHeader {
    /// Parse the text between the brackets.
    pub fn parse(inner: &str) -> Result<Self, UnknownValue> {
        let mut tags = Vec::new();
        for entry in inner.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let mut parts = entry.split('.').map(str::trim);
            let kind = SectionKind::from_name(parts.next().unwrap_or_default());

            let mut arch = None;
            let mut module_type = None;
            if kind.takes_arch() {
                if let Some(q) = parts.next().filter(|q| !q.eq_ignore_ascii_case("common")) {
                    arch = Some(q.parse::<Arch>()?);
                }
                if kind == SectionKind::LibraryClasses {
                    if let Some(q) = parts.next() {
                        module_type = Some(q.parse::<ModuleType>()?);
                    }
                }
            }
            tags.push(SectionTag {
                kind,
                arch,
                module_type,
            });
        }
        Ok(Self { tags })
    }

    /// The section kind, taken from the first entry.
    pub fn kind(&self) -> SectionKind {
        self.tags.first().map_or(SectionKind::Other, |t| t.kind)
    }

    /// Entries of this header that apply to `arch`.
    pub fn matching(&self, arch: Arch) -> impl Iterator<Item = &SectionTag> {
        self.tags.iter().filter(move |t| t.applies_to(arch))
    }

    pub fn applies_to(&self, arch: Arch) -> bool {
        self.matching(arch).next().is_some()
    }
}

/// Inner text of a `[...]` header line, or `None` for other lines.
pub fn header_text(line: &str) -> Option<&str> {
    line.strip_prefix('[')?.strip_suffix(']')
}

/// `key = value` with both sides trimmed.
pub fn key_value(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    (!key.is_empty()).then(|| (key, value.trim()))
}
