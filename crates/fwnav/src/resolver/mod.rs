//! Library-class resolution.
//!
//! Components are loaded first, in platform order, with their inline
//! overrides applied. Each component then gets a link context made of its
//! `<LibraryClasses>` block and its module type, and its whole library
//! closure is bound under that context: a library pulled in by a
//! `UEFI_DRIVER` binds its own classes as a `UEFI_DRIVER` would, and an
//! override in the component's block reaches every level below it.
//!
//! A FIFO worklist walks `(descriptor, context)` pairs until the set is
//! closed. Pairs whose effective record and links agree collapse into one
//! module afterwards; a descriptor that links differently under two contexts
//! becomes two `#n` variants.
//!
//! Binding precedence, strongest first:
//!
//! 1. the `<LibraryClasses>` block of the component being linked
//! 2. `[LibraryClasses.<ARCH>.<MODULE_TYPE>]`
//! 3. `[LibraryClasses.<ARCH>]`
//! 4. `[LibraryClasses.common.<MODULE_TYPE>]`
//! 5. `[LibraryClasses]`
//! 6. the `Class|Default.inf` binding in the consumer's own descriptor

mod registry;

use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fwnav_graph::{
    Arch, LibraryClassDependency, LibraryClassMapping, ModuleDescriptor, ModuleId, ModuleRole,
    ModuleType, ResolutionScope,
};
use indexmap::IndexMap;
use path_clean::PathClean;
use rustc_hash::FxHashMap as HashMap;

pub use registry::ModuleRegistry;

use crate::descriptor::{ComponentOverrides, NULL_CLASS, PlatformDescriptor, parse_module};
use crate::directive::{DirectiveEvaluator, InputRecord, MacroEnv, record_input};
use crate::error::{Location, ParseError, ResolutionError, Result};
use crate::pipeline::Deadline;
use crate::runtime::Runtime;

/// Everything a resolution pass produced besides the graph.
#[derive(Debug)]
pub struct ResolvedModules {
    pub modules: IndexMap<ModuleId, Arc<ModuleDescriptor>>,
    pub library_mappings: Vec<LibraryClassMapping>,
    pub null_libraries: Vec<LibraryClassMapping>,
    /// Module descriptor files read, in first-read order.
    pub inputs: Vec<InputRecord>,
    /// Number of module descriptor evaluations performed.
    pub parses: usize,
}

/// Resolves the modules of one platform under one macro environment.
pub struct LibraryResolver<'a> {
    runtime: &'a dyn Runtime,
    platform: &'a PlatformDescriptor,
    env: &'a MacroEnv,
    arch: Arch,
    search_roots: &'a [PathBuf],
    deadline: &'a Deadline<'a>,
    parsed: HashMap<PathBuf, Arc<ModuleDescriptor>>,
    contexts: Vec<LinkContext>,
    libraries: Vec<LibraryNode>,
    slots: HashMap<(PathBuf, usize), usize>,
    queue: VecDeque<usize>,
    registry: ModuleRegistry,
    inputs: Vec<InputRecord>,
    parses: usize,
}

/// The component-wide settings a library closure is bound under.
struct LinkContext {
    module_type: ModuleType,
    overrides: BTreeMap<String, String>,
    origin: Location,
}

/// One library descriptor as linked under one context.
struct LibraryNode {
    module: Arc<ModuleDescriptor>,
    context: usize,
    links: Vec<Link>,
}

struct Link {
    class: String,
    target: usize,
    scope: ResolutionScope,
}

struct ComponentLinks {
    id: ModuleId,
    links: Vec<Link>,
    null_links: Vec<Link>,
}

struct Binding {
    scope: ResolutionScope,
    instance: String,
    location: Location,
}

impl<'a> LibraryResolver<'a> {
    /// `search_roots` starts with the workspace root, followed by the
    /// package search path.
    pub fn new(
        runtime: &'a dyn Runtime,
        platform: &'a PlatformDescriptor,
        env: &'a MacroEnv,
        arch: Arch,
        search_roots: &'a [PathBuf],
        deadline: &'a Deadline<'a>,
    ) -> Self {
        Self {
            runtime,
            platform,
            env,
            arch,
            search_roots,
            deadline,
            parsed: HashMap::default(),
            contexts: Vec::new(),
            libraries: Vec::new(),
            slots: HashMap::default(),
            queue: VecDeque::new(),
            registry: ModuleRegistry::new(),
            inputs: Vec::new(),
            parses: 0,
        }
    }

    pub fn resolve(mut self) -> Result<ResolvedModules> {
        let platform = self.platform;
        let mut fresh_components = Vec::new();
        for component in &platform.components {
            self.deadline.check()?;
            let raw = self.load(&component.path, &component.location)?;
            let module = self.effective(&raw, Some(&component.overrides), ModuleRole::Component);
            self.check(&module)?;
            let (id, fresh) = self.registry.intern(module);
            if fresh {
                tracing::debug!(module = %id, "component");
                fresh_components.push((id, component.location.clone()));
            }
        }

        let mut components = Vec::with_capacity(fresh_components.len());
        for (id, location) in fresh_components {
            self.deadline.check()?;
            let Some(component) = self.registry.get(&id).cloned() else {
                continue;
            };
            let context = self.context_for(&component, location);
            let links = self.link_classes(&component, context)?;
            let mut null_links = Vec::new();
            for binding in self.null_bindings(&component, context) {
                let target = self.node(&binding.instance, &binding.location, context)?;
                null_links.push(Link {
                    class: NULL_CLASS.to_string(),
                    target,
                    scope: binding.scope,
                });
            }
            components.push(ComponentLinks { id, links, null_links });
        }

        while let Some(index) = self.queue.pop_front() {
            self.deadline.check()?;
            let consumer = Arc::clone(&self.libraries[index].module);
            let context = self.libraries[index].context;
            let links = self.link_classes(&consumer, context)?;
            self.libraries[index].links = links;
        }

        Ok(self.finish(components))
    }

    fn context_for(&mut self, component: &ModuleDescriptor, origin: Location) -> usize {
        if let Some(index) = self.contexts.iter().position(|c| {
            c.module_type == component.module_type && c.overrides == component.library_overrides
        }) {
            return index;
        }
        self.contexts.push(LinkContext {
            module_type: component.module_type,
            overrides: component.library_overrides.clone(),
            origin,
        });
        self.contexts.len() - 1
    }

    /// Bind every declared class of `consumer` under `context`.
    fn link_classes(&mut self, consumer: &ModuleDescriptor, context: usize) -> Result<Vec<Link>> {
        let mut links = Vec::with_capacity(consumer.library_classes.len());
        for dependency in &consumer.library_classes {
            // an instance never links against its own class
            if consumer.produced_class(&dependency.class).is_some() {
                continue;
            }
            let binding = self.binding(consumer, dependency, context)?;
            let target = self.node(&binding.instance, &binding.location, context)?;
            self.verify_class(consumer, &dependency.class, target)?;

            tracing::debug!(
                consumer = %consumer.id,
                class = %dependency.class,
                instance = %self.libraries[target].module.id,
                scope = %binding.scope,
                "library class bound"
            );
            links.push(Link {
                class: dependency.class.clone(),
                target,
                scope: binding.scope,
            });
        }
        Ok(links)
    }

    /// The library node for `raw_path` under `context`, queued when new.
    fn node(&mut self, raw_path: &str, location: &Location, context: usize) -> Result<usize> {
        let (_, path) = self.locate(raw_path, location)?;
        if let Some(&index) = self.slots.get(&(path.clone(), context)) {
            return Ok(index);
        }

        let raw = self.load(raw_path, location)?;
        let module = self.effective(&raw, None, ModuleRole::Library);
        self.check(&module)?;

        let index = self.libraries.len();
        self.libraries.push(LibraryNode {
            module: Arc::new(module),
            context,
            links: Vec::new(),
        });
        self.slots.insert((path, context), index);
        self.queue.push_back(index);
        Ok(index)
    }

    /// Collapse equivalent library nodes, assign ids and emit the mappings.
    fn finish(mut self, components: Vec<ComponentLinks>) -> ResolvedModules {
        // blocks are numbered in first-seen order
        let blocks = equivalence_blocks(&self.libraries);
        let mut ids = Vec::new();
        let mut representatives = Vec::new();
        for (index, &block) in blocks.iter().enumerate() {
            if block == ids.len() {
                let module = self.libraries[index].module.as_ref().clone();
                ids.push(self.registry.push_variant(module));
                representatives.push(index);
            }
        }
        let id_of = |target: usize| ids[blocks[target]].clone();

        let mut library_mappings = Vec::new();
        let mut null_libraries = Vec::new();
        for component in &components {
            for link in &component.links {
                library_mappings.push(LibraryClassMapping::new(
                    component.id.clone(),
                    link.class.clone(),
                    id_of(link.target),
                    link.scope,
                ));
            }
            for link in &component.null_links {
                null_libraries.push(LibraryClassMapping::new(
                    component.id.clone(),
                    NULL_CLASS,
                    id_of(link.target),
                    link.scope,
                ));
            }
        }
        for (consumer, &index) in ids.iter().zip(&representatives) {
            for link in &self.libraries[index].links {
                library_mappings.push(LibraryClassMapping::new(
                    consumer.clone(),
                    link.class.clone(),
                    id_of(link.target),
                    link.scope,
                ));
            }
        }

        if self.libraries.len() > representatives.len() {
            tracing::debug!(
                linked = self.libraries.len(),
                distinct = representatives.len(),
                "library contexts merged"
            );
        }

        ResolvedModules {
            modules: self.registry.into_modules(),
            library_mappings,
            null_libraries,
            inputs: self.inputs,
            parses: self.parses,
        }
    }

    fn binding(
        &self,
        consumer: &ModuleDescriptor,
        dependency: &LibraryClassDependency,
        context: usize,
    ) -> Result<Binding> {
        let class = dependency.class.as_str();
        let context = &self.contexts[context];

        if let Some(instance) = context.overrides.get(class) {
            return Ok(Binding {
                scope: ResolutionScope::ModuleOverride,
                instance: instance.clone(),
                location: context.origin.clone(),
            });
        }

        if let Some(entry) = self.platform.library_binding(class, context.module_type) {
            return Ok(Binding {
                scope: entry.scope(),
                instance: entry.instance.clone(),
                location: entry.location.clone(),
            });
        }

        if let Some(default) = &dependency.default_binding {
            return Ok(Binding {
                scope: ResolutionScope::DefaultBinding,
                instance: default.clone(),
                location: Location::new(Arc::new(consumer.path.clone()), 1),
            });
        }

        Err(ResolutionError::UnresolvedLibraryClass {
            module: consumer.id.clone(),
            class: class.to_string(),
        }
        .into())
    }

    fn null_bindings(&self, component: &ModuleDescriptor, context: usize) -> Vec<Binding> {
        let origin = &self.contexts[context].origin;
        let platform = self
            .platform
            .null_libraries_for(component.module_type)
            .map(|entry| Binding {
                scope: entry.scope(),
                instance: entry.instance.clone(),
                location: entry.location.clone(),
            });
        let overrides = component.null_overrides.iter().map(|instance| Binding {
            scope: ResolutionScope::ModuleOverride,
            instance: instance.clone(),
            location: origin.clone(),
        });
        platform.chain(overrides).collect()
    }

    /// The bound instance must produce `class` for the module type being linked.
    fn verify_class(&self, consumer: &ModuleDescriptor, class: &str, target: usize) -> Result<()> {
        let node = &self.libraries[target];
        let library = &node.module;
        if library.produced_classes.is_empty() {
            return Ok(());
        }
        let module_type = self.contexts[node.context].module_type;
        match library.produced_class(class) {
            None => Err(ResolutionError::LibraryClassMismatch {
                module: consumer.id.clone(),
                class: class.to_string(),
                instance: library.id.clone(),
            }
            .into()),
            Some(produced) if !produced.accepts(module_type) => {
                Err(ResolutionError::IncompatibleLibrary {
                    module: consumer.id.clone(),
                    module_type,
                    class: class.to_string(),
                    instance: library.id.clone(),
                }
                .into())
            }
            Some(_) => Ok(()),
        }
    }

    /// Find `raw_path` under the search roots and return the matching root too.
    ///
    /// Roots tried before the match are recorded as absent inputs.
    fn locate(&mut self, raw_path: &str, location: &Location) -> Result<(PathBuf, PathBuf)> {
        let relative = PathBuf::from(raw_path.trim().replace('\\', "/"));
        let mut misses = Vec::new();
        let found = self
            .search_roots
            .iter()
            .map(|root| (root.clean(), root.join(&relative).clean()))
            .find(|(_, candidate)| {
                let exists = self.runtime.is_file(candidate);
                if !exists {
                    misses.push(candidate.clone());
                }
                exists
            })
            .ok_or_else(|| ParseError::DescriptorNotFound {
                location: location.clone(),
                path: raw_path.to_string(),
            })?;
        for miss in misses {
            record_input(&mut self.inputs, InputRecord::absent(miss));
        }
        Ok(found)
    }

    /// Parse a module descriptor once per resolution pass.
    fn load(&mut self, raw_path: &str, location: &Location) -> Result<Arc<ModuleDescriptor>> {
        let (root, path) = self.locate(raw_path, location)?;
        if let Some(module) = self.parsed.get(&path) {
            return Ok(Arc::clone(module));
        }

        let id = ModuleId::from_path(&root, &path).map_err(|source| ParseError::InvalidModulePath {
            location: location.clone(),
            source,
        })?;
        let text = DirectiveEvaluator::new(self.runtime, self.search_roots).evaluate(&path, self.env.clone())?;
        self.parses += 1;
        for input in &text.inputs {
            record_input(&mut self.inputs, input.clone());
        }

        let module = Arc::new(parse_module(&text, id, &path, &root, self.arch)?);
        self.parsed.insert(path, Arc::clone(&module));
        Ok(module)
    }

    /// Apply platform settings and, for components, the inline override block.
    fn effective(
        &self,
        raw: &ModuleDescriptor,
        overrides: Option<&ComponentOverrides>,
        role: ModuleRole,
    ) -> ModuleDescriptor {
        let mut module = raw.clone();
        module.role = role;

        module.build_options.extend(
            self.platform
                .build_options
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        for (name, value) in module.pcds.iter_mut() {
            if let Some(platform_value) = self.platform.pcds.get(name) {
                value.clone_from(platform_value);
            }
        }

        let Some(overrides) = overrides else {
            return module;
        };

        for (key, value) in &overrides.defines {
            match key.as_str() {
                "BASE_NAME" => module.name.clone_from(value),
                "FILE_GUID" => module.guid = Some(value.clone()),
                _ => {}
            }
            module.defines.insert(key.clone(), value.clone());
        }
        for (class, instance) in &overrides.library_classes {
            if class.eq_ignore_ascii_case(NULL_CLASS) {
                module.null_overrides.push(instance.clone());
            } else {
                module.library_overrides.insert(class.clone(), instance.clone());
            }
        }
        module.build_options.extend(
            overrides
                .build_options
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        module
            .pcds
            .extend(overrides.pcds.iter().map(|(k, v)| (k.clone(), v.clone())));
        module
    }

    fn check(&self, module: &ModuleDescriptor) -> Result<()> {
        if !module.supports_arch(self.arch) {
            return Err(ResolutionError::UnsupportedArchitecture {
                module: module.id.clone(),
                arch: self.arch,
            }
            .into());
        }
        if let Some(missing) = module.sources.iter().find(|s| !self.runtime.is_file(s)) {
            return Err(ResolutionError::MissingSourceFile {
                module: module.id.clone(),
                file: missing.clone(),
            }
            .into());
        }
        Ok(())
    }
}

/// Partition library nodes into groups that link identically.
///
/// Nodes start grouped by descriptor and effective attributes; groups are
/// split until every member binds each class into the same group.
fn equivalence_blocks(nodes: &[LibraryNode]) -> Vec<usize> {
    let mut blocks = Vec::with_capacity(nodes.len());
    let mut firsts: Vec<usize> = Vec::new();
    for node in nodes {
        let block = firsts
            .iter()
            .position(|&first| nodes[first].module.same_attributes(&node.module))
            .unwrap_or_else(|| {
                firsts.push(blocks.len());
                firsts.len() - 1
            });
        blocks.push(block);
    }

    let mut count = firsts.len();
    loop {
        let mut signatures: HashMap<(usize, Vec<(&str, usize)>), usize> = HashMap::default();
        let next: Vec<usize> = nodes
            .iter()
            .zip(&blocks)
            .map(|(node, &block)| {
                let links = node
                    .links
                    .iter()
                    .map(|link| (link.class.as_str(), blocks[link.target]))
                    .collect();
                let fresh = signatures.len();
                *signatures.entry((block, links)).or_insert(fresh)
            })
            .collect();
        blocks = next;
        if signatures.len() == count {
            return blocks;
        }
        count = signatures.len();
    }
}

/// Workspace root followed by every package search root, without duplicates.
pub fn search_roots(workspace_root: &Path, packages_path: &[PathBuf]) -> Vec<PathBuf> {
    let mut roots = vec![workspace_root.clean()];
    for extra in packages_path {
        let root = if extra.is_absolute() {
            extra.clean()
        } else {
            workspace_root.join(extra).clean()
        };
        if !roots.contains(&root) {
            roots.push(root);
        }
    }
    roots
}
