use std::path::PathBuf;

use fwnav_config::{
    AmbiguousCallMode, DEFAULT_MAX_CALL_PATHS, DEFAULT_MAX_TRACE_DEPTH, QueryConfig,
};
use fwnav_graph::{LibraryClassMapping, ModuleId};
use serde::Serialize;

/// Dependency view of one resolved module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleDependencies {
    pub module: ModuleId,
    /// Library instances linked directly into the module.
    pub direct: Vec<ModuleId>,
    /// Full dependency closure, when requested.
    pub transitive: Option<Vec<ModuleId>>,
    /// Modules that link this one directly.
    pub dependents: Vec<ModuleId>,
    /// The class bindings the module resolved, in declaration order.
    pub library_mappings: Vec<LibraryClassMapping>,
}

/// Whether a call-path step was bound to exactly one in-scope definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Certainty {
    Certain,
    /// Reached through an indirect call or a name with several definitions.
    Uncertain,
}

/// One function on a call path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallStep {
    pub function: String,
    pub module: ModuleId,
    pub file: PathBuf,
    /// Line of the definition.
    pub line: usize,
    /// Line of the call in the previous step's body. `None` for the root.
    pub call_line: Option<usize>,
    pub certainty: Certainty,
}

/// Why a call path ends where it does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StopReason {
    /// The last function calls nothing that resolves in scope.
    Leaf,
    /// The path reached the requested depth with callees left.
    DepthLimit,
    /// The next call would revisit a function already on the path.
    Recursion,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallPath {
    pub steps: Vec<CallStep>,
    pub stop: StopReason,
}

impl CallPath {
    /// Number of call edges.
    pub fn depth(&self) -> usize {
        self.steps.len().saturating_sub(1)
    }

    pub fn functions(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|s| s.function.as_str())
    }

    pub fn is_certain(&self) -> bool {
        self.steps.iter().all(|s| s.certainty == Certainty::Certain)
    }
}

/// A cycle in the call graph. The last step calls back into the first, so a
/// function that calls itself yields two steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallCycle {
    pub steps: Vec<CallStep>,
}

impl CallCycle {
    /// Distinct functions on the cycle.
    pub fn len(&self) -> usize {
        self.steps.len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn functions(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|s| s.function.as_str())
    }
}

/// Shortest call distance from a root to one reachable definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallDepth {
    pub function: String,
    pub module: ModuleId,
    pub file: PathBuf,
    pub line: usize,
    /// `0` for the root itself.
    pub depth: usize,
}

/// Call statistics for every in-scope definition of one function name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FunctionMetrics {
    pub function: String,
    pub definitions: usize,
    /// Call expressions in the definitions' bodies.
    pub calls_made: usize,
    /// Distinct callee names among them.
    pub unique_callees: usize,
    /// Call sites of the function anywhere in the build.
    pub call_sites: usize,
    /// Distinct functions containing those call sites.
    pub called_by: usize,
    /// Deepest shortest-path distance reachable within the trace limit.
    pub max_call_depth: usize,
}

/// Limits and ambiguity handling for one engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    pub ambiguous_calls: AmbiguousCallMode,
    /// Largest `max_depth` a trace may request.
    pub max_trace_depth: usize,
    /// Traces stop collecting after this many paths.
    pub max_call_paths: usize,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            ambiguous_calls: AmbiguousCallMode::default(),
            max_trace_depth: DEFAULT_MAX_TRACE_DEPTH,
            max_call_paths: DEFAULT_MAX_CALL_PATHS,
        }
    }
}

impl From<&QueryConfig> for QueryOptions {
    fn from(config: &QueryConfig) -> Self {
        Self {
            ambiguous_calls: config.ambiguous_calls,
            max_trace_depth: config.max_trace_depth,
            max_call_paths: config.max_call_paths,
        }
    }
}

impl QueryOptions {
    pub fn with_ambiguous_calls(mut self, mode: AmbiguousCallMode) -> Self {
        self.ambiguous_calls = mode;
        self
    }
}
