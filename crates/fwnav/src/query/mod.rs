//! Read-only queries over one resolved build.
//!
//! A [`QueryEngine`] wraps an immutable [`BuildContext`] and its
//! [`DependencyGraph`]. Module queries are answered from the precomputed
//! graph indexes. Function queries go through a [`SourceIndex`] built on the
//! first function query and shared by every later one; it only covers the
//! sources of modules in the build, so nothing outside the build scope is
//! ever reported.

mod analysis;
mod trace;
mod types;

use std::sync::{Arc, OnceLock};

use fwnav_graph::{BuildContext, ChainAnalysis, DependencyGraph, ModuleDescriptor, ModuleId, ModuleType};
use indexmap::IndexMap;

pub use types::{
    CallCycle, CallDepth, CallPath, CallStep, Certainty, FunctionMetrics, ModuleDependencies, QueryOptions,
    StopReason,
};

use crate::error::QueryError;
use crate::runtime::Runtime;
use crate::source::{CallSite, FunctionLocation, SourceIndex};
use analysis::CycleFinder;
use trace::{CallResolver, Tracer};

pub type QueryResult<T> = std::result::Result<T, QueryError>;

pub struct QueryEngine {
    context: Arc<BuildContext>,
    graph: Arc<DependencyGraph>,
    runtime: Arc<dyn Runtime>,
    options: QueryOptions,
    index: OnceLock<SourceIndex>,
}

impl std::fmt::Debug for QueryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEngine")
            .field("platform", &self.context.platform.name)
            .field("modules", &self.context.modules.len())
            .field("options", &self.options)
            .field("indexed", &self.index.get().is_some())
            .finish()
    }
}

impl QueryEngine {
    pub fn new(
        context: Arc<BuildContext>,
        graph: Arc<DependencyGraph>,
        runtime: Arc<dyn Runtime>,
        options: QueryOptions,
    ) -> Self {
        Self {
            context,
            graph,
            runtime,
            options,
            index: OnceLock::new(),
        }
    }

    pub fn context(&self) -> &BuildContext {
        &self.context
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    /// The function index, built on first use.
    pub fn source_index(&self) -> &SourceIndex {
        self.index
            .get_or_init(|| SourceIndex::build(self.runtime.as_ref(), &self.context.modules))
    }

    /// Resolved modules in build order, optionally only those of one type.
    pub fn list_modules(&self, module_type: Option<ModuleType>) -> Vec<Arc<ModuleDescriptor>> {
        self.context
            .modules
            .values()
            .filter(|m| module_type.is_none_or(|ty| m.module_type == ty))
            .cloned()
            .collect()
    }

    /// Modules listed in the platform `[Components]` section.
    pub fn list_components(&self) -> Vec<Arc<ModuleDescriptor>> {
        self.context.components().cloned().collect()
    }

    /// Definitions and declarations of `name` in the build's sources.
    ///
    /// A function that exists nowhere in scope yields an empty list.
    pub fn find_function(&self, name: &str) -> QueryResult<Vec<FunctionLocation>> {
        let name = function_name(name)?;
        Ok(self.source_index().functions_named(name).cloned().collect())
    }

    /// Direct dependencies, dependents and bindings of `module`, plus the full
    /// closure when `transitive` is set.
    ///
    /// `module` is a module id (`Pkg/Foo/Foo.inf`) or an unambiguous
    /// `BASE_NAME`.
    pub fn module_dependencies(&self, module: &str, transitive: bool) -> QueryResult<ModuleDependencies> {
        let id = self.lookup_module(module)?;
        Ok(ModuleDependencies {
            direct: self.graph.dependencies(&id).to_vec(),
            transitive: transitive.then(|| self.graph.transitive_dependencies(&id).to_vec()),
            dependents: self.graph.dependents(&id).to_vec(),
            library_mappings: self.context.mappings_for(&id).cloned().collect(),
            module: id,
        })
    }

    /// Call paths rooted at every definition of `name`, at most `max_depth`
    /// calls long.
    ///
    /// Callees are bound to in-scope definitions only; calls into code outside
    /// the build end the path there. Indirect and ambiguous calls follow the
    /// configured [`AmbiguousCallMode`](fwnav_config::AmbiguousCallMode).
    pub fn trace_call_path(&self, name: &str, max_depth: usize) -> QueryResult<Vec<CallPath>> {
        let name = function_name(name)?;
        self.check_depth(max_depth)?;

        let paths = Tracer::new(self.source_index(), &self.graph, &self.options, max_depth).trace(name);
        tracing::debug!(function = name, max_depth, paths = paths.len(), "call paths traced");
        Ok(paths)
    }

    /// Call sites of `name` inside the build.
    pub fn trace_callers(&self, name: &str) -> QueryResult<Vec<CallSite>> {
        let name = function_name(name)?;
        Ok(self.source_index().calls_to(name).to_vec())
    }

    /// Every recursive call cycle among the build's definitions, each once.
    ///
    /// Calls bind as in [`Self::trace_call_path`]. Cycles longer than the
    /// trace depth limit are not reported, and the search stops after the
    /// configured path limit.
    pub fn recursive_calls(&self) -> Vec<CallCycle> {
        let cycles = CycleFinder::new(
            self.resolver(),
            self.options.max_trace_depth.max(1),
            self.options.max_call_paths,
        )
        .find();
        tracing::debug!(cycles = cycles.len(), "recursive calls found");
        cycles
    }

    /// Shortest call distance from `name` to every definition it reaches
    /// within `max_depth` calls, roots included at depth `0`.
    pub fn call_depths(&self, name: &str, max_depth: usize) -> QueryResult<Vec<CallDepth>> {
        let name = function_name(name)?;
        self.check_depth(max_depth)?;
        Ok(analysis::call_depths(self.resolver(), name, max_depth))
    }

    /// Call counts and reach of `name`.
    ///
    /// A name with no definition in scope still reports its call sites.
    pub fn function_metrics(&self, name: &str) -> QueryResult<FunctionMetrics> {
        let name = function_name(name)?;
        Ok(analysis::function_metrics(
            self.resolver(),
            name,
            self.options.max_trace_depth,
        ))
    }

    /// Modules each module reaches through `#include` lines in its sources.
    pub fn include_graph(&self) -> IndexMap<ModuleId, Vec<ModuleId>> {
        self.source_index().include_graph()
    }

    /// Every component-rooted chain of links that pulls `module` into the build.
    pub fn dependency_chains(&self, module: &str) -> QueryResult<ChainAnalysis> {
        let target = self.lookup_module(module)?;
        let components: Vec<ModuleId> = self.context.components().map(|m| m.id.clone()).collect();
        Ok(self.graph.dependency_chains_to(&components, &target))
    }

    /// Resolve a module id or `BASE_NAME` to the id of a module in the build.
    pub fn lookup_module(&self, module: &str) -> QueryResult<ModuleId> {
        let query = module.trim();
        if query.is_empty() {
            return Err(QueryError::InvalidArgument("module name is empty".into()));
        }

        if let Ok(id) = ModuleId::new(query) {
            if self.context.contains(&id) {
                return Ok(id);
            }
        }

        let mut candidates: Vec<ModuleId> = self.context.modules_named(query).map(|m| m.id.clone()).collect();
        match candidates.len() {
            0 => Err(QueryError::ModuleNotFound(query.to_string())),
            1 => Ok(candidates.remove(0)),
            _ => {
                candidates.sort();
                Err(QueryError::AmbiguousModule {
                    name: query.to_string(),
                    candidates,
                })
            }
        }
    }

    fn resolver(&self) -> CallResolver<'_> {
        CallResolver::new(self.source_index(), &self.graph, &self.options)
    }

    fn check_depth(&self, max_depth: usize) -> QueryResult<()> {
        if max_depth > self.options.max_trace_depth {
            return Err(QueryError::InvalidArgument(format!(
                "max_depth {max_depth} exceeds the configured limit of {}",
                self.options.max_trace_depth
            )));
        }
        Ok(())
    }
}

fn function_name(name: &str) -> QueryResult<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(QueryError::InvalidArgument("function name is empty".into()));
    }
    Ok(name)
}
