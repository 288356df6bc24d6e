//! Function and call-site index over the C sources of a resolved build.
//!
//! Only files listed in the `[Sources]` of a resolved module are indexed, so
//! every lookup is scoped to the build by construction. The `#include` lines
//! of each file are kept as well and resolved against the indexed files to
//! relate modules by the headers they share.

mod lexer;
mod signature;

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fwnav_graph::{ModuleDescriptor, ModuleId};
use indexmap::IndexMap;
use rayon::prelude::*;
use rustc_hash::FxHashMap as HashMap;
use serde::Serialize;

pub use signature::{CALLING_CONVENTIONS, CallKind, FunctionKind, Parameter};

use crate::runtime::Runtime;
use signature::{ParsedCall, ParsedFunction, parse_functions};

const C_EXTENSIONS: &[&str] = &["c", "h", "cpp", "cc", "cxx", "hpp", "hh"];

/// Where a function is defined or declared.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FunctionLocation {
    pub module: ModuleId,
    pub file: PathBuf,
    pub line: usize,
    /// Last line of the body, or of the declaration.
    pub end_line: usize,
    pub name: String,
    pub kind: FunctionKind,
    pub return_type: String,
    pub calling_convention: Option<String>,
    pub signature: String,
    pub parameters: Vec<Parameter>,
    pub is_static: bool,
    pub is_inline: bool,
    pub documentation: Option<String>,
}

impl FunctionLocation {
    pub fn is_definition(&self) -> bool {
        self.kind == FunctionKind::Definition
    }
}

/// One call expression inside a function body.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CallSite {
    pub caller: String,
    pub callee: String,
    pub module: ModuleId,
    pub file: PathBuf,
    pub line: usize,
    pub kind: CallKind,
}

#[derive(Debug)]
pub(crate) struct IndexedFunction {
    pub location: FunctionLocation,
    calls: Vec<ParsedCall>,
}

impl IndexedFunction {
    pub fn calls(&self) -> impl Iterator<Item = (&str, usize, CallKind)> {
        self.calls.iter().map(|c| (c.callee.as_str(), c.line, c.kind))
    }
}

#[derive(Debug)]
struct IndexedFile {
    path: PathBuf,
    owners: Vec<ModuleId>,
    includes: Vec<String>,
}

#[derive(Debug, Default)]
pub struct SourceIndex {
    functions: Vec<IndexedFunction>,
    by_name: HashMap<String, Vec<usize>>,
    callers: HashMap<String, Vec<CallSite>>,
    files: Vec<IndexedFile>,
}

impl SourceIndex {
    /// Parse every C source and header owned by `modules`.
    ///
    /// Files are parsed in parallel. Unreadable files are skipped with a
    /// warning; the resolver has already checked that they exist.
    pub fn build(runtime: &dyn Runtime, modules: &IndexMap<ModuleId, Arc<ModuleDescriptor>>) -> Self {
        let mut owners: IndexMap<&Path, Vec<&ModuleId>> = IndexMap::new();
        for (id, module) in modules {
            for source in module.sources.iter().filter(|s| is_c_file(s)) {
                let entry = owners.entry(source.as_path()).or_default();
                if !entry.contains(&id) {
                    entry.push(id);
                }
            }
        }

        let files: Vec<(&Path, Vec<&ModuleId>)> = owners.into_iter().collect();
        let parsed: Vec<Option<(Vec<ParsedFunction>, Vec<String>)>> = files
            .par_iter()
            .map(|(path, _)| match runtime.read_to_string(path) {
                Ok(text) => Some((parse_functions(&text), includes_in(&text))),
                Err(err) => {
                    tracing::warn!(file = %path.display(), error = %err, "skipping unreadable source");
                    None
                }
            })
            .collect();

        let mut index = Self::default();
        for ((path, owners), parsed) in files.iter().zip(parsed) {
            let Some((functions, includes)) = parsed else {
                continue;
            };
            for owner in owners {
                for function in &functions {
                    index.insert(owner, path, function.clone());
                }
            }
            index.files.push(IndexedFile {
                path: path.to_path_buf(),
                owners: owners.iter().map(|&id| id.clone()).collect(),
                includes,
            });
        }

        tracing::debug!(
            files = index.files.len(),
            functions = index.functions.len(),
            "source index built"
        );
        index
    }

    fn insert(&mut self, module: &ModuleId, file: &Path, function: ParsedFunction) {
        let ParsedFunction {
            name,
            kind,
            line,
            end_line,
            return_type,
            calling_convention,
            signature,
            parameters,
            is_static,
            is_inline,
            documentation,
            calls,
        } = function;

        for call in &calls {
            self.callers.entry(call.callee.clone()).or_default().push(CallSite {
                caller: name.clone(),
                callee: call.callee.clone(),
                module: module.clone(),
                file: file.to_path_buf(),
                line: call.line,
                kind: call.kind,
            });
        }

        self.by_name.entry(name.clone()).or_default().push(self.functions.len());
        self.functions.push(IndexedFunction {
            location: FunctionLocation {
                module: module.clone(),
                file: file.to_path_buf(),
                line,
                end_line,
                name,
                kind,
                return_type,
                calling_convention,
                signature,
                parameters,
                is_static,
                is_inline,
                documentation,
            },
            calls,
        });
    }

    /// Definitions and declarations named `name`, in module then file order.
    pub fn functions_named(&self, name: &str) -> impl Iterator<Item = &FunctionLocation> {
        self.entries_named(name).map(|f| &f.location)
    }

    pub(crate) fn entries_named(&self, name: &str) -> impl Iterator<Item = &IndexedFunction> {
        self.by_name
            .get(name)
            .into_iter()
            .flatten()
            .map(|&i| &self.functions[i])
    }

    /// Slots of the definitions named `name`, usable with [`Self::entry`].
    pub(crate) fn definition_ids(&self, name: &str) -> impl Iterator<Item = usize> + '_ {
        self.by_name
            .get(name)
            .into_iter()
            .flatten()
            .copied()
            .filter(|&i| self.functions[i].location.is_definition())
    }

    /// Slots of every definition, in index order.
    pub(crate) fn definitions(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.functions.len()).filter(|&i| self.functions[i].location.is_definition())
    }

    pub(crate) fn entry(&self, id: usize) -> &IndexedFunction {
        &self.functions[id]
    }

    /// Call sites whose callee is `name`.
    pub fn calls_to(&self, name: &str) -> &[CallSite] {
        self.callers.get(name).map_or(&[], Vec::as_slice)
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Modules whose indexed files are `#include`d by each module's files.
    ///
    /// An include resolves to every indexed file whose path ends with the
    /// included path. Headers that no module lists in `[Sources]` relate
    /// nothing, and a module never includes itself. Only modules with at
    /// least one edge appear, in index order.
    pub fn include_graph(&self) -> IndexMap<ModuleId, Vec<ModuleId>> {
        let mut by_file_name: HashMap<&OsStr, Vec<&IndexedFile>> = HashMap::default();
        for file in &self.files {
            if let Some(name) = file.path.file_name() {
                by_file_name.entry(name).or_default().push(file);
            }
        }

        let mut graph: IndexMap<ModuleId, Vec<ModuleId>> = IndexMap::new();
        for file in &self.files {
            for include in &file.includes {
                let include = include_path(include);
                let Some(name) = include.file_name() else {
                    continue;
                };
                let targets = by_file_name
                    .get(name)
                    .into_iter()
                    .flatten()
                    .filter(|target| target.path.ends_with(&include));
                for target in targets {
                    for from in &file.owners {
                        for to in target.owners.iter().filter(|&to| to != from) {
                            let edges = graph.entry(from.clone()).or_default();
                            if !edges.contains(to) {
                                edges.push(to.clone());
                            }
                        }
                    }
                }
            }
        }
        graph
    }
}

/// Paths named by `#include "..."` and `#include <...>` lines, in order.
fn includes_in(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| {
            let rest = line.trim_start().strip_prefix('#')?.trim_start();
            let rest = rest.strip_prefix("include")?.trim_start();
            let close = match rest.chars().next()? {
                '"' => '"',
                '<' => '>',
                _ => return None,
            };
            let body = &rest[1..];
            let end = body.find(close)?;
            Some(body[..end].trim().to_string()).filter(|s| !s.is_empty())
        })
        .collect()
}

fn include_path(include: &str) -> PathBuf {
    PathBuf::from(include.replace('\\', "/"))
}

fn is_c_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| C_EXTENSIONS.iter().any(|c| c.eq_ignore_ascii_case(ext)))
}
