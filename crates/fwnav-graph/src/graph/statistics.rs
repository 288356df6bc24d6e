//! Statistics methods for DependencyGraph.

use rustc_hash::FxHashMap as HashMap;

use super::DependencyGraph;
use crate::{GraphStatistics, ModuleId};

impl DependencyGraph {
    /// Compute a statistics snapshot.
    pub fn statistics(&self) -> GraphStatistics {
        let mut depth: HashMap<&ModuleId, usize> = HashMap::default();
        let order = self.topological_order();

        for id in &order {
            let d = self
                .dependencies(id)
                .iter()
                .filter_map(|dep| depth.get(dep))
                .map(|d| d + 1)
                .max()
                .unwrap_or(0);
            depth.insert(id, d);
        }

        GraphStatistics::new(
            self.len(),
            self.edge_count(),
            self.roots().len(),
            self.leaves().len(),
            depth.values().copied().max().unwrap_or(0),
            self.cycles.len(),
        )
    }
}
