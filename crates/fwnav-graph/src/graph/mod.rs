//! Dependency graph over resolved modules.
//!
//! Storage lives in [`DependencyGraph`]; construction, queries, chain
//! analysis, statistics and export are split across the submodules as
//! separate `impl` blocks.

mod chains;
mod construction;
mod queries;
mod serialization;
mod statistics;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::ModuleId;

pub use construction::{CyclePolicy, GraphBuilder};

/// Directed "depends-on" graph for one build context.
///
/// All indexes are computed once by [`GraphBuilder::build`] and never change
/// afterwards. Every key and every listed endpoint is a node of the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyGraph {
    /// Direct dependencies per node, in insertion order.
    pub(crate) dependencies: IndexMap<ModuleId, Vec<ModuleId>>,
    /// Transitive dependencies per node.
    pub(crate) transitive: IndexMap<ModuleId, Vec<ModuleId>>,
    /// Reverse edges: modules that directly depend on the key.
    pub(crate) dependents: IndexMap<ModuleId, Vec<ModuleId>>,
    /// Cycles broken while building in tolerant mode.
    pub(crate) cycles: Vec<Vec<ModuleId>>,
}
