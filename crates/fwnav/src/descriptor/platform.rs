//! Platform descriptor (`.dsc`) records.

use std::collections::BTreeMap;

use fwnav_graph::{Arch, ModuleType, ResolutionScope};

use super::section::{SectionHeader, SectionKind, header_text, key_value};
use crate::directive::EvaluatedText;
use crate::error::{Location, ParseError};

/// Library-class name that marks an always-linked instance.
pub const NULL_CLASS: &str = "NULL";

/// One `Class|Path.inf` line of a `[LibraryClasses]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryClassEntry {
    pub class: String,
    pub instance: String,
    pub arch: Option<Arch>,
    pub module_type: Option<ModuleType>,
    pub location: Location,
}

impl LibraryClassEntry {
    pub fn is_null(&self) -> bool {
        self.class.eq_ignore_ascii_case(NULL_CLASS)
    }

    /// Whether this entry applies to a consumer of `module_type`.
    pub fn applies_to(&self, module_type: ModuleType) -> bool {
        self.module_type.is_none_or(|t| t == module_type)
    }

    pub fn scope(&self) -> ResolutionScope {
        match (self.arch, self.module_type) {
            (Some(_), Some(_)) => ResolutionScope::ArchitectureModuleType,
            (Some(_), None) => ResolutionScope::Architecture,
            (None, Some(_)) => ResolutionScope::GlobalModuleType,
            (None, None) => ResolutionScope::Global,
        }
    }
}

/// Contents of a component's inline `{ ... }` block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComponentOverrides {
    pub defines: BTreeMap<String, String>,
    /// `Class|Path.inf` pairs, `NULL` entries included, in file order.
    pub library_classes: Vec<(String, String)>,
    pub build_options: BTreeMap<String, String>,
    pub pcds: BTreeMap<String, String>,
}

impl ComponentOverrides {
    pub fn is_empty(&self) -> bool {
        self.defines.is_empty()
            && self.library_classes.is_empty()
            && self.build_options.is_empty()
            && self.pcds.is_empty()
    }
}

/// One `[Components]` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentEntry {
    /// Module descriptor path as written, after macro expansion.
    pub path: String,
    pub location: Location,
    pub overrides: ComponentOverrides,
}

/// Parsed platform descriptor, already filtered for one architecture.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlatformDescriptor {
    pub name: Option<String>,
    pub guid: Option<String>,
    pub supported_archs: Vec<Arch>,
    pub build_targets: Vec<String>,
    /// Remaining `[Defines]` keys.
    pub defines: BTreeMap<String, String>,
    /// Non-`NULL` library class entries in file order.
    pub library_classes: Vec<LibraryClassEntry>,
    pub null_libraries: Vec<LibraryClassEntry>,
    pub components: Vec<ComponentEntry>,
    pub build_options: BTreeMap<String, String>,
    pub pcds: BTreeMap<String, String>,
}

impl PlatformDescriptor {
    /// Strongest platform binding of `class` for a consumer of `module_type`.
    ///
    /// Within one scope the entry written last wins.
    pub fn library_binding(&self, class: &str, module_type: ModuleType) -> Option<&LibraryClassEntry> {
        self.library_classes
            .iter()
            .filter(|e| e.class == class && e.applies_to(module_type))
            .fold(None, |best: Option<&LibraryClassEntry>, entry| match best {
                Some(b) if b.scope() < entry.scope() => Some(b),
                _ => Some(entry),
            })
    }

    /// `NULL` instances from platform sections that apply to `module_type`.
    pub fn null_libraries_for(&self, module_type: ModuleType) -> impl Iterator<Item = &LibraryClassEntry> {
        self.null_libraries
            .iter()
            .filter(move |e| e.applies_to(module_type))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Subsection {
    Defines,
    LibraryClasses,
    BuildOptions,
    Pcds,
    Other,
}

impl Subsection {
    fn parse(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        match lower.as_str() {
            "defines" => Self::Defines,
            "libraryclasses" => Self::LibraryClasses,
            "buildoptions" => Self::BuildOptions,
            _ if lower.starts_with("pcd") => Self::Pcds,
            _ => Self::Other,
        }
    }
}

struct OpenBlock {
    component: ComponentEntry,
    subsection: Subsection,
}

/// Parse an evaluated platform descriptor for `arch`.
pub fn parse_platform(text: &EvaluatedText, arch: Arch) -> Result<PlatformDescriptor, ParseError> {
    let mut platform = PlatformDescriptor::default();
    let mut header: Option<SectionHeader> = None;
    let mut pending: Option<ComponentEntry> = None;
    let mut block: Option<OpenBlock> = None;

    for line in &text.lines {
        let code = line.text.trim();

        if let Some(open) = block.as_mut() {
            if let Some(rest) = code.strip_prefix('}') {
                if !rest.trim().is_empty() {
                    return Err(syntax(line, "unexpected text after '}'"));
                }
                if let Some(done) = block.take() {
                    platform.components.push(done.component);
                }
            } else if let Some(name) = code.strip_prefix('<').and_then(|c| c.strip_suffix('>')) {
                open.subsection = Subsection::parse(name.trim());
            } else {
                override_line(&mut open.component.overrides, open.subsection, code, line)?;
            }
            continue;
        }

        if code == "{" {
            let Some(component) = pending.take() else {
                return Err(syntax(line, "'{' without a component"));
            };
            block = Some(OpenBlock {
                component,
                subsection: Subsection::Other,
            });
            continue;
        }

        if let Some(done) = pending.take() {
            platform.components.push(done);
        }

        if let Some(inner) = header_text(code) {
            let parsed = SectionHeader::parse(inner).map_err(|source| ParseError::InvalidValue {
                location: line.location.clone(),
                source,
            })?;
            header = Some(parsed);
            continue;
        }

        let Some(section) = header.as_ref() else {
            return Err(syntax(line, "text before the first section header"));
        };
        if !section.applies_to(arch) {
            continue;
        }

        match section.kind() {
            SectionKind::Defines => platform_define(&mut platform, code, line)?,
            SectionKind::LibraryClasses => {
                let (class, instance) = split_binding(code, line)?;
                for tag in section.matching(arch) {
                    let entry = LibraryClassEntry {
                        class: class.to_string(),
                        instance: instance.to_string(),
                        arch: tag.arch,
                        module_type: tag.module_type,
                        location: line.location.clone(),
                    };
                    if entry.is_null() {
                        platform.null_libraries.push(entry);
                    } else {
                        platform.library_classes.push(entry);
                    }
                }
            }
            SectionKind::Components => {
                let (path, opens_block) = match code.strip_suffix('{') {
                    Some(path) => (path.trim(), true),
                    None => (code, false),
                };
                let component = ComponentEntry {
                    path: path.to_string(),
                    location: line.location.clone(),
                    overrides: ComponentOverrides::default(),
                };
                if opens_block {
                    block = Some(OpenBlock {
                        component,
                        subsection: Subsection::Other,
                    });
                } else {
                    pending = Some(component);
                }
            }
            SectionKind::BuildOptions => {
                if let Some((key, value)) = key_value(code) {
                    platform.build_options.insert(key.to_string(), value.to_string());
                }
            }
            SectionKind::Pcds => {
                let (name, value) = pcd_entry(code);
                platform.pcds.insert(name.to_string(), value.to_string());
            }
            _ => {}
        }
    }

    if let Some(open) = block {
        return Err(ParseError::UnterminatedBlock {
            location: open.component.location,
            directive: "{".to_string(),
        });
    }
    if let Some(done) = pending {
        platform.components.push(done);
    }

    Ok(platform)
}

fn platform_define(
    platform: &mut PlatformDescriptor,
    code: &str,
    line: &crate::directive::FilteredLine,
) -> Result<(), ParseError> {
    let Some((key, value)) = key_value(code) else {
        return Err(syntax(line, "expected KEY = value"));
    };
    match key {
        "PLATFORM_NAME" => platform.name = Some(value.to_string()),
        "PLATFORM_GUID" => platform.guid = Some(value.to_string()),
        "SUPPORTED_ARCHITECTURES" => {
            platform.supported_archs = list(value)
                .map(|a| {
                    a.parse::<Arch>().map_err(|source| ParseError::InvalidValue {
                        location: line.location.clone(),
                        source,
                    })
                })
                .collect::<Result<_, _>>()?;
        }
        "BUILD_TARGETS" => platform.build_targets = list(value).map(str::to_string).collect(),
        _ => {
            platform.defines.insert(key.to_string(), value.to_string());
        }
    }
    Ok(())
}

fn override_line(
    overrides: &mut ComponentOverrides,
    subsection: Subsection,
    code: &str,
    line: &crate::directive::FilteredLine,
) -> Result<(), ParseError> {
    match subsection {
        Subsection::Defines => {
            let Some((key, value)) = key_value(code) else {
                return Err(syntax(line, "expected KEY = value"));
            };
            overrides.defines.insert(key.to_string(), value.to_string());
        }
        Subsection::LibraryClasses => {
            let (class, instance) = split_binding(code, line)?;
            overrides
                .library_classes
                .push((class.to_string(), instance.to_string()));
        }
        Subsection::BuildOptions => {
            if let Some((key, value)) = key_value(code) {
                overrides.build_options.insert(key.to_string(), value.to_string());
            }
        }
        Subsection::Pcds => {
            let (name, value) = pcd_entry(code);
            overrides.pcds.insert(name.to_string(), value.to_string());
        }
        Subsection::Other => {}
    }
    Ok(())
}

fn split_binding<'l>(
    code: &'l str,
    line: &crate::directive::FilteredLine,
) -> Result<(&'l str, &'l str), ParseError> {
    match code.split_once('|') {
        Some((class, instance)) if !class.trim().is_empty() && !instance.trim().is_empty() => {
            Ok((class.trim(), instance.trim()))
        }
        _ => Err(syntax(line, "expected Class|Path.inf")),
    }
}

/// `Space.Name|Value|...` into name and value.
pub(crate) fn pcd_entry(code: &str) -> (&str, &str) {
    let mut fields = code.split('|').map(str::trim);
    let name = fields.next().unwrap_or_default();
    (name, fields.next().unwrap_or_default())
}

pub(crate) fn list(value: &str) -> impl Iterator<Item = &str> {
    value
        .split(['|', ',', ' ', '\t'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn syntax(line: &crate::directive::FilteredLine, message: &str) -> ParseError {
    ParseError::Syntax {
        location: line.location.clone(),
        message: message.to_string(),
    }
}
