use serde::{Deserialize, Serialize};

/// Snapshot of graph size and shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphStatistics {
    pub module_count: usize,
    pub edge_count: usize,
    pub root_count: usize,
    pub leaf_count: usize,
    /// Longest dependency chain, in edges.
    pub max_depth: usize,
    pub avg_dependencies: f64,
    pub broken_cycle_count: usize,
}

impl GraphStatistics {
    pub fn new(
        module_count: usize,
        edge_count: usize,
        root_count: usize,
        leaf_count: usize,
        max_depth: usize,
        broken_cycle_count: usize,
    ) -> Self {
        let avg_dependencies = if module_count == 0 {
            0.0
        } else {
            edge_count as f64 / module_count as f64
        };

        Self {
            module_count,
            edge_count,
            root_count,
            leaf_count,
            max_depth,
            avg_dependencies,
            broken_cycle_count,
        }
    }
}
