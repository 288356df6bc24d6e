//! Dependency chain analysis for understanding module relationships.
//!
//! A chain is one path from a platform component down to a target module,
//! answering "why is this library linked into the build".

use rustc_hash::FxHashSet as HashSet;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use super::ModuleId;

/// Upper bound on path length while enumerating chains.
const MAX_DEPENDENCY_CHAIN_DEPTH: usize = 64;

/// Upper bound on the number of chains collected for one target.
const MAX_CHAINS: usize = 1024;

/// A chain of dependencies from a component to a target module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyChain {
    /// Module ids from the component to the target.
    pub path: Vec<ModuleId>,
    /// Number of edges in the chain.
    pub depth: usize,
}

impl DependencyChain {
    pub fn new(path: Vec<ModuleId>) -> Self {
        let depth = path.len().saturating_sub(1);
        Self { path, depth }
    }

    /// The component the chain starts from.
    pub fn entry_point(&self) -> Option<&ModuleId> {
        self.path.first()
    }

    pub fn target(&self) -> Option<&ModuleId> {
        self.path.last()
    }

    /// Format the chain as `App.inf -> UefiLib.inf -> BaseLib.inf`.
    pub fn format_chain(&self) -> String {
        super::format_path(&self.path)
    }
}

/// All chains from a set of entry points to one module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainAnalysis {
    pub target: ModuleId,
    pub chains: Vec<DependencyChain>,
    pub min_depth: Option<usize>,
    pub max_depth: Option<usize>,
    /// Number of distinct entry points that reach the target.
    pub entry_point_count: usize,
    /// Set when enumeration stopped early at [`MAX_CHAINS`].
    pub truncated: bool,
}

impl ChainAnalysis {
    pub fn from_chains(target: ModuleId, chains: Vec<DependencyChain>, truncated: bool) -> Self {
        let min_depth = chains.iter().map(|c| c.depth).min();
        let max_depth = chains.iter().map(|c| c.depth).max();
        let entry_point_count = chains
            .iter()
            .filter_map(DependencyChain::entry_point)
            .collect::<HashSet<_>>()
            .len();

        Self {
            target,
            chains,
            min_depth,
            max_depth,
            entry_point_count,
            truncated,
        }
    }

    pub fn is_reachable(&self) -> bool {
        !self.chains.is_empty()
    }

    pub fn shortest_chain(&self) -> Option<&DependencyChain> {
        self.chains.iter().min_by_key(|c| c.depth)
    }
}

/// Breadth-first enumeration of simple paths from `entry_points` to `target`.
///
/// Returns the chains found and whether the search was cut short.
pub(crate) fn find_chains<'a, F>(
    entry_points: &[ModuleId],
    target: &ModuleId,
    mut get_dependencies: F,
) -> (Vec<DependencyChain>, bool)
where
    F: FnMut(&ModuleId) -> &'a [ModuleId],
{
    let mut chains = Vec::new();
    let mut queue: VecDeque<Vec<ModuleId>> = entry_points.iter().map(|e| vec![e.clone()]).collect();

    while let Some(current_path) = queue.pop_front() {
        let Some(current) = current_path.last() else {
            continue;
        };

        if current == target {
            chains.push(DependencyChain::new(current_path));
            if chains.len() >= MAX_CHAINS {
                return (chains, true);
            }
            continue;
        }

        if current_path.len() > MAX_DEPENDENCY_CHAIN_DEPTH {
            continue;
        }

        for dep in get_dependencies(current) {
            if current_path.contains(dep) {
                continue;
            }
            let mut next = current_path.clone();
            next.push(dep.clone());
            queue.push_back(next);
        }
    }

    (chains, false)
}
