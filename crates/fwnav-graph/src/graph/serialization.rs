//! Export methods for DependencyGraph.

use super::DependencyGraph;
use crate::{Error, ModuleId, Result};

/// Helper to escape labels for DOT format.
fn escape_label(label: &str) -> String {
    label.replace('\\', "\\\\").replace('"', "\\\"")
}

impl DependencyGraph {
    /// Export the graph as DOT format for visualization.
    ///
    /// Edges that were dropped to break cycles are drawn dashed in red.
    pub fn to_dot_format(&self) -> String {
        let mut output = String::from("digraph DependencyGraph {\n");

        for id in self.nodes() {
            output.push_str(&format!("    \"{}\";\n", escape_label(id.as_str())));
        }

        for (from, deps) in &self.dependencies {
            for to in deps {
                output.push_str(&format!(
                    "    \"{}\" -> \"{}\";\n",
                    escape_label(from.as_str()),
                    escape_label(to.as_str())
                ));
            }
        }

        for cycle in &self.cycles {
            if let [.., last, first] = cycle.as_slice() {
                output.push_str(&format!(
                    "    \"{}\" -> \"{}\" [style=dashed, color=red];\n",
                    escape_label(last.as_str()),
                    escape_label(first.as_str())
                ));
            }
        }

        output.push_str("}\n");
        output
    }

    /// Export nodes, edges and broken cycles to JSON.
    pub fn to_json(&self) -> Result<String> {
        #[derive(serde::Serialize)]
        struct Edge<'a> {
            from: &'a ModuleId,
            to: &'a ModuleId,
        }

        #[derive(serde::Serialize)]
        struct GraphJson<'a> {
            nodes: Vec<&'a ModuleId>,
            edges: Vec<Edge<'a>>,
            cycles: &'a [Vec<ModuleId>],
        }

        let graph_json = GraphJson {
            nodes: self.nodes().collect(),
            edges: self
                .dependencies
                .iter()
                .flat_map(|(from, deps)| deps.iter().map(move |to| Edge { from, to }))
                .collect(),
            cycles: &self.cycles,
        };

        serde_json::to_string_pretty(&graph_json)
            .map_err(|e| Error::Serialization(format!("failed to serialize graph: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use crate::{CyclePolicy, GraphBuilder, ModuleId};

    fn id(name: &str) -> ModuleId {
        ModuleId::new(format!("{name}.inf")).unwrap()
    }

    #[test]
    fn dot_output_marks_broken_cycles() {
        let mut builder = GraphBuilder::new().with_policy(CyclePolicy::BreakCycle);
        builder.add_node(id("A"));
        builder.add_node(id("B"));
        builder.add_edge(&id("A"), &id("B")).unwrap();
        builder.add_edge(&id("B"), &id("A")).unwrap();
        let dot = builder.build().unwrap().to_dot_format();

        assert!(dot.starts_with("digraph DependencyGraph {"));
        assert!(dot.contains("\"A.inf\" -> \"B.inf\";"));
        assert!(dot.contains("\"B.inf\" -> \"A.inf\" [style=dashed, color=red];"));
    }

    #[test]
    fn json_lists_edges() {
        let mut builder = GraphBuilder::new();
        builder.add_node(id("A"));
        builder.add_node(id("B"));
        builder.add_edge(&id("A"), &id("B")).unwrap();
        let json = builder.build().unwrap().to_json().unwrap();

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["nodes"].as_array().unwrap().len(), 2);
        assert_eq!(value["edges"][0]["from"], "A.inf");
        assert_eq!(value["edges"][0]["to"], "B.inf");
    }
}
