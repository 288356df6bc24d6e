//! Dependency chain methods for DependencyGraph.

use super::DependencyGraph;
use crate::ModuleId;
use crate::dependency_chain::{ChainAnalysis, find_chains};

impl DependencyGraph {
    /// Every simple path from `entry_points` down to `target`.
    ///
    /// Unknown entry points contribute no chains.
    pub fn dependency_chains_to(&self, entry_points: &[ModuleId], target: &ModuleId) -> ChainAnalysis {
        let entries: Vec<ModuleId> = entry_points
            .iter()
            .filter(|e| self.contains(e))
            .cloned()
            .collect();

        let (chains, truncated) = find_chains(&entries, target, |id| self.dependencies(id));
        ChainAnalysis::from_chains(target.clone(), chains, truncated)
    }
}
