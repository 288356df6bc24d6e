//! Query operations for DependencyGraph.

use std::collections::VecDeque;

use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};

use super::DependencyGraph;
use crate::ModuleId;

impl DependencyGraph {
    /// All nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &ModuleId> {
        self.dependencies.keys()
    }

    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    pub fn contains(&self, id: &ModuleId) -> bool {
        self.dependencies.contains_key(id)
    }

    pub fn edge_count(&self) -> usize {
        self.dependencies.values().map(Vec::len).sum()
    }

    /// Direct dependencies of `id`; empty for unknown modules.
    pub fn dependencies(&self, id: &ModuleId) -> &[ModuleId] {
        self.dependencies.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every module reachable from `id`, read from the precomputed closure.
    pub fn transitive_dependencies(&self, id: &ModuleId) -> &[ModuleId] {
        self.transitive.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Modules that directly depend on `id`.
    pub fn dependents(&self, id: &ModuleId) -> &[ModuleId] {
        self.dependents.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every module that reaches `id`, nearest first.
    pub fn transitive_dependents(&self, id: &ModuleId) -> Vec<ModuleId> {
        let mut seen: HashSet<&ModuleId> = HashSet::default();
        let mut order = Vec::new();
        let mut queue: VecDeque<&ModuleId> = self.dependents(id).iter().collect();

        while let Some(next) = queue.pop_front() {
            if !seen.insert(next) {
                continue;
            }
            order.push(next.clone());
            queue.extend(self.dependents(next).iter());
        }

        order
    }

    /// Whether `from` reaches `to` through one or more edges.
    pub fn depends_on(&self, from: &ModuleId, to: &ModuleId) -> bool {
        self.transitive_dependencies(from).contains(to)
    }

    /// Nodes nothing depends on.
    pub fn roots(&self) -> Vec<ModuleId> {
        self.dependents
            .iter()
            .filter(|(_, list)| list.is_empty())
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Nodes with no dependencies.
    pub fn leaves(&self) -> Vec<ModuleId> {
        self.dependencies
            .iter()
            .filter(|(_, list)| list.is_empty())
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Cycles that were broken during construction.
    pub fn cycles(&self) -> &[Vec<ModuleId>] {
        &self.cycles
    }

    /// Nodes ordered so that every module comes after all of its dependencies.
    pub fn topological_order(&self) -> Vec<ModuleId> {
        let mut remaining: HashMap<&ModuleId, usize> = self
            .dependencies
            .iter()
            .map(|(id, deps)| (id, deps.len()))
            .collect();

        let mut queue: VecDeque<&ModuleId> = self
            .dependencies
            .iter()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(id, _)| id)
            .collect();

        let mut order = Vec::with_capacity(self.len());
        while let Some(id) = queue.pop_front() {
            order.push(id.clone());
            for dependent in self.dependents(id) {
                if let Some(count) = remaining.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        queue.push_back(dependent);
                    }
                }
            }
        }

        order
    }
}
