//! Graph construction, cycle detection and closure computation.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use super::DependencyGraph;
use crate::{Error, ModuleId, Result};

/// What to do when construction finds a dependency cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CyclePolicy {
    /// Abort with [`Error::Cycle`] carrying the full path.
    #[default]
    Fail,
    /// Drop the edge that closes each cycle, record the cycle and continue.
    BreakCycle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Accumulates nodes and edges, then produces an immutable [`DependencyGraph`].
#[derive(Debug, Default)]
pub struct GraphBuilder {
    nodes: IndexSet<ModuleId>,
    edges: Vec<IndexSet<usize>>,
    policy: CyclePolicy,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(mut self, policy: CyclePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Add a node. Adding an existing node is a no-op.
    pub fn add_node(&mut self, id: ModuleId) -> &mut Self {
        let (index, inserted) = self.nodes.insert_full(id);
        if inserted {
            debug_assert_eq!(index, self.edges.len());
            self.edges.push(IndexSet::new());
        }
        self
    }

    /// Add a `from` depends-on `to` edge between two existing nodes.
    ///
    /// Duplicate edges collapse into one.
    pub fn add_edge(&mut self, from: &ModuleId, to: &ModuleId) -> Result<&mut Self> {
        let (Some(source), Some(target)) = (self.nodes.get_index_of(from), self.nodes.get_index_of(to))
        else {
            return Err(Error::UnknownNode {
                from: from.clone(),
                to: to.clone(),
            });
        };
        self.edges[source].insert(target);
        Ok(self)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Detect cycles, compute the transitive closure and reverse edges.
    ///
    /// Traversal is an explicit-stack depth-first search that visits roots
    /// and edges in insertion order, so reported cycle paths are stable.
    /// Each node's closure is assembled when the node finishes, from the
    /// already-finished closures of its dependencies, so overlapping
    /// subgraphs are walked once.
    pub fn build(self) -> Result<DependencyGraph> {
        let count = self.nodes.len();
        let mut marks = vec![Mark::Unvisited; count];
        let mut kept: Vec<Vec<usize>> = vec![Vec::new(); count];
        let mut closure: Vec<IndexSet<usize>> = vec![IndexSet::new(); count];
        let mut cycles = Vec::new();

        for root in 0..count {
            if marks[root] != Mark::Unvisited {
                continue;
            }

            marks[root] = Mark::InProgress;
            let mut stack: Vec<(usize, usize)> = vec![(root, 0)];

            while let Some(frame) = stack.last_mut() {
                let node = frame.0;
                let next = self.edges[node].get_index(frame.1).copied();
                frame.1 += 1;

                let Some(dep) = next else {
                    stack.pop();
                    marks[node] = Mark::Done;
                    let mut reach = IndexSet::new();
                    for &d in &kept[node] {
                        reach.insert(d);
                        reach.extend(closure[d].iter().copied());
                    }
                    closure[node] = reach;
                    continue;
                };

                match marks[dep] {
                    Mark::Unvisited => {
                        kept[node].push(dep);
                        marks[dep] = Mark::InProgress;
                        stack.push((dep, 0));
                    }
                    Mark::Done => kept[node].push(dep),
                    Mark::InProgress => {
                        let start = stack.iter().position(|&(n, _)| n == dep).unwrap_or(0);
                        let mut path: Vec<ModuleId> = stack[start..]
                            .iter()
                            .map(|&(n, _)| self.nodes[n].clone())
                            .collect();
                        path.push(self.nodes[dep].clone());

                        match self.policy {
                            CyclePolicy::Fail => return Err(Error::Cycle { path }),
                            // The closing edge is simply not kept.
                            CyclePolicy::BreakCycle => cycles.push(path),
                        }
                    }
                }
            }
        }

        let mut dependencies = IndexMap::with_capacity(count);
        let mut transitive = IndexMap::with_capacity(count);
        let mut dependents: IndexMap<ModuleId, Vec<ModuleId>> = self
            .nodes
            .iter()
            .map(|id| (id.clone(), Vec::new()))
            .collect();

        for (index, id) in self.nodes.iter().enumerate() {
            let direct: Vec<ModuleId> = kept[index].iter().map(|&d| self.nodes[d].clone()).collect();
            for dep in &direct {
                if let Some(list) = dependents.get_mut(dep) {
                    list.push(id.clone());
                }
            }
            dependencies.insert(id.clone(), direct);
            transitive.insert(
                id.clone(),
                closure[index].iter().map(|&d| self.nodes[d].clone()).collect(),
            );
        }

        Ok(DependencyGraph {
            dependencies,
            transitive,
            dependents,
            cycles,
        })
    }
}
