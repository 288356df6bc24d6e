//! Module descriptor (`.inf`) parsing.

use std::path::Path;
use std::sync::Arc;

use fwnav_graph::{
    Arch, InterfaceKind, InterfaceRef, InterfaceUsage, LibraryClassDependency, ModuleDescriptor,
    ModuleId, ModuleType, ProducedLibraryClass,
};
use path_clean::PathClean;

use super::platform::{list, pcd_entry};
use super::section::{SectionHeader, SectionKind, header_text, key_value};
use crate::directive::{EvaluatedText, FilteredLine};
use crate::error::{Location, ParseError};

/// Parse an evaluated module descriptor.
///
/// `path` is the descriptor's location on disk; sources resolve against its
/// directory and `[Packages]` entries against `workspace_root`.
pub fn parse_module(
    text: &EvaluatedText,
    id: ModuleId,
    path: &Path,
    workspace_root: &Path,
    arch: Arch,
) -> Result<ModuleDescriptor, ParseError> {
    let module_dir = path.parent().unwrap_or(workspace_root).to_path_buf();
    let mut fields = Fields::default();
    let mut interfaces = Vec::new();
    let mut sources = Vec::new();
    let mut include_dirs = vec![module_dir.clone()];
    let mut library_classes = Vec::new();
    let mut build_options = Vec::new();
    let mut pcds = Vec::new();
    let mut header: Option<SectionHeader> = None;

    for line in &text.lines {
        let code = line.text.trim();
        if let Some(inner) = header_text(code) {
            header = Some(SectionHeader::parse(inner).map_err(|source| invalid(line, source))?);
            continue;
        }
        let Some(section) = header.as_ref() else {
            return Err(syntax(line, "text before the first section header"));
        };
        if !section.applies_to(arch) {
            continue;
        }

        match section.kind() {
            SectionKind::Defines => fields.define(code, line)?,
            SectionKind::Sources => {
                let file = code.split('|').next().unwrap_or_default().trim();
                if !file.is_empty() {
                    sources.push(module_dir.join(file.replace('\\', "/")).clean());
                }
            }
            SectionKind::LibraryClasses => {
                let mut parts = code.split('|').map(str::trim);
                let class = parts.next().unwrap_or_default();
                let dependency = match parts.next() {
                    Some(binding) if binding.to_ascii_lowercase().ends_with(".inf") => {
                        LibraryClassDependency::with_default(class, binding)
                    }
                    _ => LibraryClassDependency::new(class),
                };
                if !library_classes
                    .iter()
                    .any(|d: &LibraryClassDependency| d.class == dependency.class)
                {
                    library_classes.push(dependency);
                }
            }
            SectionKind::Protocols | SectionKind::Ppis | SectionKind::Guids => {
                let kind = match section.kind() {
                    SectionKind::Protocols => InterfaceKind::Protocol,
                    SectionKind::Ppis => InterfaceKind::Ppi,
                    _ => InterfaceKind::Guid,
                };
                let name = code.split('|').next().unwrap_or_default().trim();
                let tag = line
                    .comment
                    .as_deref()
                    .and_then(|c| c.split_whitespace().next())
                    .unwrap_or_default();
                interfaces.push(InterfaceRef {
                    kind,
                    name: name.to_string(),
                    usage: InterfaceUsage::from_tag(tag),
                });
            }
            SectionKind::Packages => {
                let dec = workspace_root.join(code.replace('\\', "/")).clean();
                if let Some(package_dir) = dec.parent() {
                    include_dirs.push(package_dir.join("Include"));
                }
            }
            SectionKind::BuildOptions => {
                if let Some((key, value)) = key_value(code) {
                    build_options.push((key.to_string(), value.to_string()));
                }
            }
            SectionKind::Pcds => {
                let (name, value) = pcd_entry(code);
                pcds.push((name.to_string(), value.to_string()));
            }
            SectionKind::Components | SectionKind::Other => {}
        }
    }

    let name = fields.base_name.ok_or_else(|| ParseError::MissingDefine {
        file: path.to_path_buf(),
        key: "BASE_NAME",
    })?;
    let module_type = fields.module_type.ok_or_else(|| ParseError::MissingDefine {
        file: path.to_path_buf(),
        key: "MODULE_TYPE",
    })?;
    if name.is_empty() {
        return Err(ParseError::Syntax {
            location: Location::new(Arc::new(path.to_path_buf()), 1),
            message: "BASE_NAME is empty".to_string(),
        });
    }

    let mut builder = ModuleDescriptor::builder(id, path, name, module_type).archs(fields.archs);
    if let Some(guid) = fields.guid {
        builder = builder.guid(guid);
    }
    if let Some(entry) = fields.entry_point {
        builder = builder.entry_point(entry);
    }
    for produced in fields.produced {
        builder = builder.produces(produced);
    }
    for dependency in library_classes {
        builder = builder.library_class(dependency);
    }
    for source in sources {
        builder = builder.source(source);
    }
    for dir in include_dirs {
        builder = builder.include_dir(dir);
    }
    for (key, value) in build_options {
        builder = builder.build_option(key, value);
    }
    for (key, value) in pcds {
        builder = builder.pcd(key, value);
    }
    for interface in interfaces {
        builder = builder.interface(interface);
    }
    for (key, value) in fields.defines {
        builder = builder.define(key, value);
    }

    Ok(builder.build())
}

#[derive(Default)]
struct Fields {
    base_name: Option<String>,
    guid: Option<String>,
    module_type: Option<ModuleType>,
    archs: Vec<Arch>,
    entry_point: Option<String>,
    produced: Vec<ProducedLibraryClass>,
    defines: Vec<(String, String)>,
}

impl Fields {
    fn define(&mut self, code: &str, line: &FilteredLine) -> Result<(), ParseError> {
        let Some((key, value)) = key_value(code) else {
            return Err(syntax(line, "expected KEY = value"));
        };
        match key {
            "BASE_NAME" => self.base_name = Some(value.to_string()),
            "FILE_GUID" => self.guid = Some(value.to_string()),
            "MODULE_TYPE" => {
                self.module_type = Some(value.parse().map_err(|source| invalid(line, source))?);
            }
            "VALID_ARCHITECTURES" => {
                self.archs = list(value)
                    .map(|a| a.parse::<Arch>().map_err(|source| invalid(line, source)))
                    .collect::<Result<_, _>>()?;
            }
            "ENTRY_POINT" => self.entry_point = Some(value.to_string()),
            "LIBRARY_CLASS" => {
                let (class, types) = value.split_once('|').unwrap_or((value, ""));
                let module_types = list(types)
                    .map(|t| t.parse::<ModuleType>().map_err(|source| invalid(line, source)))
                    .collect::<Result<_, _>>()?;
                self.produced.push(ProducedLibraryClass {
                    class: class.trim().to_string(),
                    module_types,
                });
            }
            _ => self.defines.push((key.to_string(), value.to_string())),
        }
        Ok(())
    }
}

fn invalid(line: &FilteredLine, source: fwnav_graph::UnknownValue) -> ParseError {
    ParseError::InvalidValue {
        location: line.location.clone(),
        source,
    }
}

fn syntax(line: &FilteredLine, message: &str) -> ParseError {
    ParseError::Syntax {
        location: line.location.clone(),
        message: message.to_string(),
    }
}
